//! LED render pipeline: JSON sequence player, overlay mode handlers, and
//! the pixel buffer/strip-flush driver.

pub mod color;
pub mod modes;
pub mod pipeline;
pub mod sequence;

pub use color::Rgb;
pub use pipeline::{LedMode, RenderPipeline};
