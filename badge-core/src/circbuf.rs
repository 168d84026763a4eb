//! Fixed-capacity FIFO ring buffer with contiguous subsequence matching.
//!
//! Grounded on `original_source/main/inc/CircularBuffer.h`. That C version
//! overwrites the oldest element when full; this core intentionally does
//! not (`spec.md` §3: "this core uses non-overwriting push semantics; full
//! returns error") so callers (touch buffer, ocarina buffer) observe a
//! clean `Full` error instead of silently losing a key press.

use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CircularBufferError {
    #[error("circular buffer is full")]
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    Found,
    NotFound,
}

pub struct CircularBuffer<T> {
    capacity: usize,
    buf: VecDeque<T>,
}

impl<T: Clone + PartialEq> CircularBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buf: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push_back(&mut self, item: T) -> Result<(), CircularBufferError> {
        if self.buf.len() >= self.capacity {
            return Err(CircularBufferError::Full);
        }
        self.buf.push_back(item);
        Ok(())
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.buf.pop_front()
    }

    pub fn count(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Scans the buffer's current contents for `pattern` as a contiguous
    /// subsequence. Used both for the ocarina melody matcher and, generally,
    /// any table-driven sequence recognizer.
    pub fn match_sequence(&self, pattern: &[T]) -> MatchResult {
        if pattern.is_empty() || pattern.len() > self.buf.len() {
            return MatchResult::NotFound;
        }
        let (front, back) = self.buf.as_slices();
        let contiguous: Vec<T> = if back.is_empty() {
            front.to_vec()
        } else {
            front.iter().chain(back.iter()).cloned().collect()
        };
        for window in contiguous.windows(pattern.len()) {
            if window == pattern {
                return MatchResult::Found;
            }
        }
        MatchResult::NotFound
    }

    /// True iff the buffer's contents, read oldest-to-newest, *end* with
    /// `pattern` — the shape the ocarina matcher actually needs (a melody
    /// must be the most recent `num_keys` presses, not merely present
    /// somewhere in the last 8).
    pub fn ends_with(&self, pattern: &[T]) -> bool {
        if pattern.is_empty() || pattern.len() > self.buf.len() {
            return false;
        }
        let (front, back) = self.buf.as_slices();
        let contiguous: Vec<T> = if back.is_empty() {
            front.to_vec()
        } else {
            front.iter().chain(back.iter()).cloned().collect()
        };
        &contiguous[contiguous.len() - pattern.len()..] == pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_respects_capacity() {
        let mut cb: CircularBuffer<u8> = CircularBuffer::new(2);
        assert_eq!(cb.push_back(1), Ok(()));
        assert_eq!(cb.push_back(2), Ok(()));
        assert_eq!(cb.push_back(3), Err(CircularBufferError::Full));
        assert_eq!(cb.count(), 2);
    }

    #[test]
    fn pop_front_is_fifo() {
        let mut cb: CircularBuffer<u8> = CircularBuffer::new(3);
        cb.push_back(1).unwrap();
        cb.push_back(2).unwrap();
        assert_eq!(cb.pop_front(), Some(1));
        assert_eq!(cb.pop_front(), Some(2));
        assert_eq!(cb.pop_front(), None);
    }

    #[test]
    fn match_sequence_finds_contiguous_pattern() {
        let mut cb: CircularBuffer<u8> = CircularBuffer::new(8);
        for v in [1, 2, 3, 4, 5] {
            cb.push_back(v).unwrap();
        }
        assert_eq!(cb.match_sequence(&[2, 3, 4]), MatchResult::Found);
        assert_eq!(cb.match_sequence(&[3, 2]), MatchResult::NotFound);
    }

    #[test]
    fn match_sequence_wraps_across_the_ring() {
        let mut cb: CircularBuffer<u8> = CircularBuffer::new(3);
        cb.push_back(1).unwrap();
        cb.push_back(2).unwrap();
        cb.push_back(3).unwrap();
        cb.pop_front(); // evict 1, head now at 2
        cb.push_back(4).unwrap(); // wraps internally inside the VecDeque
        assert_eq!(cb.match_sequence(&[2, 3, 4]), MatchResult::Found);
    }

    #[test]
    fn ends_with_requires_suffix_match() {
        let mut cb: CircularBuffer<u8> = CircularBuffer::new(8);
        for v in [1, 2, 3, 4] {
            cb.push_back(v).unwrap();
        }
        assert!(cb.ends_with(&[3, 4]));
        assert!(!cb.ends_with(&[2, 3]));
    }

    #[test]
    fn clear_resets_count() {
        let mut cb: CircularBuffer<u8> = CircularBuffer::new(4);
        cb.push_back(1).unwrap();
        cb.clear();
        assert_eq!(cb.count(), 0);
        assert_eq!(cb.match_sequence(&[1]), MatchResult::NotFound);
    }
}
