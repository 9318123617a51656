//! HTTP client for the State Refresher's conditional CDN fetch and the
//! Telemetry Flusher's log-sink POST, with retry and backoff.

use std::future::Future;

use tracing::{instrument, warn};

use crate::config::ClientConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::retry::RetryPolicy;

/// The outcome of a conditional GET against the state CDN.
#[derive(Debug, Clone)]
pub enum ConditionalGetOutcome {
    /// A 200 response: the full body, and its ETag if the server sent one.
    Fresh { etag: Option<String>, body: Vec<u8> },
    /// A 304: the caller's cached payload is still current.
    NotModified,
}

/// Thin reqwest-backed client shared by the refresher and flusher
/// background tasks.
#[derive(Debug, Clone)]
pub struct TransportClient {
    inner: reqwest::Client,
    config: ClientConfig,
}

impl TransportClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent)
            .gzip(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::with_source(ErrorKind::Config(e.to_string()), e))?;
        Ok(Self { inner, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `GET <url>`, sending `If-None-Match: <etag>` when one is supplied.
    #[instrument(skip(self), fields(%url))]
    pub async fn get_conditional(
        &self,
        url: &str,
        if_none_match: Option<&str>,
    ) -> Result<ConditionalGetOutcome> {
        self.with_retry(|| self.get_conditional_once(url, if_none_match))
            .await
    }

    async fn get_conditional_once(
        &self,
        url: &str,
        if_none_match: Option<&str>,
    ) -> Result<ConditionalGetOutcome> {
        let url = url::Url::parse(url)?;
        let mut req = self.inner.get(url);
        if let Some(etag) = if_none_match {
            req = req.header("If-None-Match", etag);
        }
        let resp = req.send().await?;
        let status = resp.status();

        if status.as_u16() == 304 {
            return Ok(ConditionalGetOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(Error::new(ErrorKind::Http {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unknown").to_string(),
            }));
        }

        let etag = resp
            .headers()
            .get("ETag")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = resp.bytes().await?.to_vec();
        Ok(ConditionalGetOutcome::Fresh { etag, body })
    }

    /// `POST <url>` with the given `Content-Type` and raw body bytes.
    #[instrument(skip(self, body), fields(%url, body_len = body.len()))]
    pub async fn post_bytes(&self, url: &str, content_type: &str, body: Vec<u8>) -> Result<()> {
        self.with_retry(|| self.post_bytes_once(url, content_type, &body))
            .await
    }

    async fn post_bytes_once(&self, url: &str, content_type: &str, body: &[u8]) -> Result<()> {
        let url = url::Url::parse(url)?;
        let resp = self
            .inner
            .post(url)
            .header("Content-Type", content_type)
            .body(body.to_vec())
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::Http {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unknown").to_string(),
            }))
        }
    }

    /// Drive a request closure through the configured [`RetryPolicy`].
    /// This client only ever has two call shapes (conditional GET, POST),
    /// so retry wraps a closure rather than a full REST-verb dispatcher.
    async fn with_retry<F, Fut, T>(&self, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry_policy = self
            .config
            .retry
            .as_ref()
            .map(|c| RetryPolicy::new(c.clone()));

        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => {
                    if let Some(ref mut policy) = retry_policy {
                        if let Some(delay) = policy.next_delay(err.retry_after()) {
                            warn!(
                                attempt = policy.attempt(),
                                delay_ms = delay.as_millis(),
                                error = %err,
                                "request failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        return Err(Error::new(ErrorKind::RetriesExhausted {
                            attempts: policy.attempt(),
                        }));
                    }
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retry_config() -> ClientConfig {
        ClientConfig::builder()
            .with_retry(
                RetryConfig::default()
                    .with_max_attempts(2)
                    .with_initial_delay(std::time::Duration::from_millis(1)),
            )
            .build()
    }

    #[tokio::test]
    async fn fresh_response_carries_etag_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/state/secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"v1\"")
                    .set_body_bytes(b"rules".to_vec()),
            )
            .mount(&server)
            .await;

        let client = TransportClient::new(ClientConfig::default()).unwrap();
        let outcome = client
            .get_conditional(&format!("{}/state/secret", server.uri()), None)
            .await
            .unwrap();

        match outcome {
            ConditionalGetOutcome::Fresh { etag, body } => {
                assert_eq!(etag.as_deref(), Some("\"v1\""));
                assert_eq!(body, b"rules".to_vec());
            }
            ConditionalGetOutcome::NotModified => panic!("expected a fresh response"),
        }
    }

    #[tokio::test]
    async fn not_modified_is_reported_without_a_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/state/secret"))
            .and(header("If-None-Match", "\"v1\""))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let client = TransportClient::new(ClientConfig::default()).unwrap();
        let outcome = client
            .get_conditional(&format!("{}/state/secret", server.uri()), Some("\"v1\""))
            .await
            .unwrap();

        assert!(matches!(outcome, ConditionalGetOutcome::NotModified));
    }

    #[tokio::test]
    async fn retries_on_503_then_succeeds() {
        let server = MockServer::start().await;
        let attempts = std::sync::Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        Mock::given(method("GET"))
            .and(path("/state/secret"))
            .respond_with(move |_: &wiremock::Request| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    ResponseTemplate::new(503)
                } else {
                    ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec())
                }
            })
            .mount(&server)
            .await;

        let client = TransportClient::new(fast_retry_config()).unwrap();
        let outcome = client
            .get_conditional(&format!("{}/state/secret", server.uri()), None)
            .await
            .unwrap();

        assert!(matches!(outcome, ConditionalGetOutcome::Fresh { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn post_bytes_succeeds_on_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/flagLogs:write"))
            .and(header("Content-Type", "application/x-protobuf"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = TransportClient::new(ClientConfig::default()).unwrap();
        client
            .post_bytes(
                &format!("{}/v1/flagLogs:write", server.uri()),
                "application/x-protobuf",
                b"chunk".to_vec(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn post_bytes_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/flagLogs:write"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = TransportClient::new(ClientConfig::builder().without_retry().build()).unwrap();
        let err = client
            .post_bytes(
                &format!("{}/v1/flagLogs:write", server.uri()),
                "application/x-protobuf",
                b"chunk".to_vec(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Http { status: 500, .. }));
    }
}
