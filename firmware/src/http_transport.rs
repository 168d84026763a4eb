//! Blocking HTTPS transport, wired to [`badge_core::hal::HttpTransport`].
//!
//! Grounded on the teacher's `request.rs` (`EspHttpConnection` with the
//! global CA bundle attached, chunked-buffer UTF-8-safe body reassembly).
//! `badge-core`'s [`crate::http::RequestQueue`] only ever needs GET/POST
//! with a body and a status+bytes response, so the streaming/SSE half of
//! the teacher's requester (`stream()`) has no counterpart here.

use std::time::Duration;

use badge_core::hal::{HttpMethod, HttpResponse, HttpTransport};
use embedded_svc::http::{client::Client, Method};
use embedded_svc::io::Read;
use esp_idf_hal::io::Write;
use esp_idf_svc::http::client::{Configuration, EspHttpConnection};

pub struct EspHttpTransport {
    client: Client<EspHttpConnection>,
}

impl EspHttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        let mut config = Configuration::default();
        config.use_global_ca_store = true;
        config.crt_bundle_attach = Some(esp_idf_svc::sys::esp_crt_bundle_attach);
        let connection = EspHttpConnection::new(&config)?;
        Ok(Self {
            client: Client::wrap(connection),
        })
    }
}

impl HttpTransport for EspHttpTransport {
    fn request(
        &mut self,
        method: HttpMethod,
        url: &str,
        body: Option<&[u8]>,
        timeout: Duration,
    ) -> anyhow::Result<HttpResponse> {
        let _ = timeout; // bounded by the ESP-IDF connection's own socket timeout config
        let esp_method = match method {
            HttpMethod::Get => Method::Get,
            HttpMethod::Post => Method::Post,
        };

        let content_length_header;
        let headers: &[(&str, &str)] = match body {
            Some(b) => {
                content_length_header = b.len().to_string();
                &[
                    ("content-type", "application/json"),
                    ("content-length", &content_length_header),
                ]
            }
            None => &[],
        };

        let mut request = self.client.request(esp_method, url, headers)?;
        if let Some(b) = body {
            request.write_all(b)?;
            request.flush()?;
        }

        let mut response = request.submit()?;
        let status = response.status();

        let mut buf = [0u8; 512];
        let mut body_out = Vec::new();
        loop {
            let read = response.read(&mut buf)?;
            if read == 0 {
                break;
            }
            body_out.extend_from_slice(&buf[..read]);
        }

        Ok(HttpResponse {
            status,
            body: body_out,
        })
    }
}
