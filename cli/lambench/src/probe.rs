use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use std::time::Instant;

/// Times one request against a freshly reset function.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Wall time in milliseconds for a single request to complete.
    async fn first_hit(&self, url: &str) -> Result<f64>;
}

/// Issues a GET to `<url><health_path>` and reads the whole body.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: ReqwestClient,
    health_path: String,
}

impl HttpProber {
    pub fn new(client: ReqwestClient, health_path: impl Into<String>) -> Self {
        Self {
            client,
            health_path: health_path.into(),
        }
    }

    pub fn target(&self, url: &str) -> String {
        format!(
            "{}/{}",
            url.trim_end_matches('/'),
            self.health_path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl Prober for HttpProber {
    #[tracing::instrument(skip(self))]
    async fn first_hit(&self, url: &str) -> Result<f64> {
        let target = self.target(url);
        let start = Instant::now();
        let response = self
            .client
            .get(&target)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", target))?;
        let status = response.status();
        response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", target))?;
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;

        if !status.is_success() {
            tracing::warn!(%status, %target, "first hit returned a non-success status");
        }
        Ok(elapsed)
    }
}
