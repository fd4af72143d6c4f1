use async_trait::async_trait;
use std::time::Duration;
use timelapse_collector::{CaptureError, CaptureSource};
use timelapse_common::config::CaptureConfig;
use tracing::debug;

use crate::RecorderError;

/// Capture source backed by an HTTP frame endpoint: each capture is a
/// single GET returning one encoded image.
pub struct HttpCaptureSource {
    client: reqwest::Client,
    url: String,
}

impl HttpCaptureSource {
    pub fn new(config: &CaptureConfig) -> Result<Self, RecorderError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(RecorderError::HttpClient)?;
        let url = format!("{}?quality={}", config.url, config.quality);
        Ok(Self { client, url })
    }
}

#[async_trait]
impl CaptureSource for HttpCaptureSource {
    async fn capture(&self) -> Result<Vec<u8>, CaptureError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| CaptureError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CaptureError::Unavailable(format!(
                "HTTP status {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CaptureError::Unavailable(e.to_string()))?;
        debug!(bytes = bytes.len(), "fetched frame");
        Ok(bytes.to_vec())
    }

    fn name(&self) -> &str {
        "http-poll"
    }
}
