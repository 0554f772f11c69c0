use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Url};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::OrthoError;
use crate::throttle::RateLimiter;

#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// One raw GET. Implementations report network or decoding failures as
/// `OrthoError::Http`; status handling belongs to [`ApiClient`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpReply, OrthoError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, OrthoError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-om/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| OrthoError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| OrthoError::Http(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<HttpReply, OrthoError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| OrthoError::Http(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| OrthoError::Http(err.to_string()))?;
        Ok(HttpReply { status, body })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based): base, 2*base, 4*base, ...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// Long-lived client shared by every adapter of a job. Clones share the
/// transport and the limiter.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            limiter,
            retry,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, OrthoError> {
        let transport = HttpTransport::new(settings.request_timeout())?;
        Ok(Self::new(
            Arc::new(transport),
            Arc::new(RateLimiter::per_second(settings.requests_per_second)),
            RetryPolicy {
                max_attempts: settings.max_attempts,
                base_delay: Duration::from_millis(settings.backoff_base_ms),
                max_delay: Duration::from_millis(settings.backoff_max_ms),
            },
        ))
    }

    pub async fn fetch(
        &self,
        base_url: &str,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<String, OrthoError> {
        let url = build_url(base_url, path, params)?;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.limiter.acquire().await;
            debug!(url = %url, attempt, "upstream request");

            let cause = match self.transport.get(&url).await {
                Ok(reply) if (200..300).contains(&reply.status) => return Ok(reply.body),
                Ok(reply) if reply.status == 404 => return Err(OrthoError::NotFound(url)),
                Ok(reply) if is_retryable_status(reply.status) => {
                    format!("status {}", reply.status)
                }
                Ok(reply) => {
                    return Err(OrthoError::UpstreamStatus {
                        status: reply.status,
                        path: url,
                        message: truncate(&reply.body, 200),
                    });
                }
                Err(err) if err.is_transient() => err.to_string(),
                Err(err) => return Err(err),
            };

            if attempt >= self.retry.max_attempts {
                return Err(OrthoError::TransientFetch {
                    path: url,
                    attempts: attempt,
                    cause,
                });
            }
            let delay = self.retry.delay_after(attempt);
            warn!(
                url = %url,
                attempt,
                max_attempts = self.retry.max_attempts,
                delay_ms = delay.as_millis() as u64,
                cause = %cause,
                "transient upstream failure, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn build_url(base_url: &str, path: &str, params: &[(&str, &str)]) -> Result<String, OrthoError> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    if params.is_empty() {
        return Ok(joined);
    }
    Url::parse_with_params(&joined, params)
        .map(|url| url.to_string())
        .map_err(|err| OrthoError::Http(format!("invalid url {joined}: {err}")))
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 403 | 429 | 500..=599)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(4), Duration::from_secs(3));
    }

    #[test]
    fn url_joining() {
        let url = build_url("https://rest.kegg.jp/", "/list/eco", &[]).unwrap();
        assert_eq!(url, "https://rest.kegg.jp/list/eco");
        let url = build_url("https://example.org", "ssdb/ortholog/eco:b0002", &[("max", "50")])
            .unwrap();
        assert!(url.ends_with("?max=50"));
    }
}
