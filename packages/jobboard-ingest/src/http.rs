//! Resilient outbound HTTP: jittered politeness delay plus bounded
//! exponential-backoff retry.
//!
//! The client is generic over a [`Transport`] so tests can substitute a
//! scripted transport without network access. `ReqwestTransport` is the
//! production implementation.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{FetchError, FetchResult};
use crate::types::RawPayload;

/// HTTP method accepted by [`ResilientClient::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Minimal transport seam under the resilient client.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> FetchResult<RawPayload>;

    async fn post(&self, url: &str, body: &serde_json::Value) -> FetchResult<RawPayload>;
}

/// Production transport backed by `reqwest`.
pub struct ReqwestTransport {
    client: reqwest::Client,
    user_agent: String,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FetchError::Transient(Box::new(e)))?;
        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
        })
    }

    async fn execute(&self, request: reqwest::RequestBuilder, url: &str) -> FetchResult<RawPayload> {
        let response = request
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    FetchError::Transient(Box::new(e))
                }
            })?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::Transient(Box::new(std::io::Error::other(
                format!("HTTP {status} from {url}"),
            ))));
        }
        if !status.is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response.text().await.map_err(|e| FetchError::Malformed {
            url: url.to_string(),
            reason: format!("unreadable body: {e}"),
        })?;

        let mut payload =
            RawPayload::new(url, body).with_metadata("http_status", status.as_u16().to_string());
        if let Some(ct) = content_type {
            payload = payload.with_content_type(ct);
        }
        Ok(payload)
    }
}

fn parse_url(raw: &str) -> FetchResult<url::Url> {
    url::Url::parse(raw).map_err(|_| FetchError::InvalidUrl {
        url: raw.to_string(),
    })
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> FetchResult<RawPayload> {
        let parsed = parse_url(url)?;
        self.execute(self.client.get(parsed), url).await
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> FetchResult<RawPayload> {
        let parsed = parse_url(url)?;
        self.execute(self.client.post(parsed).json(body), url).await
    }
}

/// HTTP client wrapper that smooths request bursts and retries
/// transient failures.
///
/// Before every request it sleeps a duration drawn uniformly from the
/// configured `[min_delay, max_delay]`. Transient errors are retried
/// with exponential backoff up to `max_attempts`; a malformed response
/// body fails immediately, since retrying cannot change it.
pub struct ResilientClient<T: Transport = ReqwestTransport> {
    transport: T,
    config: ClientConfig,
}

impl ResilientClient<ReqwestTransport> {
    pub fn new(config: ClientConfig) -> FetchResult<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self { transport, config })
    }
}

impl<T: Transport> ResilientClient<T> {
    pub fn with_transport(transport: T, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// GET with politeness delay and transient-error retry.
    pub async fn get(&self, url: &str) -> FetchResult<RawPayload> {
        self.request(Method::Get, url, None).await
    }

    /// POST with politeness delay and transient-error retry.
    pub async fn post(&self, url: &str, body: &serde_json::Value) -> FetchResult<RawPayload> {
        self.request(Method::Post, url, Some(body)).await
    }

    /// GET and decode a JSON body.
    ///
    /// A body that fails to decode is malformed, not transient: the
    /// request is not retried.
    pub async fn get_json<D: DeserializeOwned>(&self, url: &str) -> FetchResult<D> {
        let payload = self.get(url).await?;
        serde_json::from_str(&payload.body).map_err(|e| FetchError::Malformed {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// Issue one request with the politeness delay and retry policy.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> FetchResult<RawPayload> {
        tokio::time::sleep(self.politeness_delay()).await;

        let mut attempt = 0;
        loop {
            let result = match (method, body) {
                (Method::Get, _) => self.transport.get(url).await,
                (Method::Post, Some(json)) => self.transport.post(url, json).await,
                (Method::Post, None) => self.transport.post(url, &serde_json::Value::Null).await,
            };
            match result {
                Ok(payload) => return Ok(payload),
                Err(err) if err.is_transient() && attempt + 1 < self.config.max_attempts => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        url = %url,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient fetch error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    debug!(url = %url, attempts = attempt + 1, error = %err, "Fetch failed");
                    return Err(err);
                }
            }
        }
    }

    fn politeness_delay(&self) -> Duration {
        let min = self.config.min_delay.as_millis() as u64;
        let max = self.config.max_delay.as_millis() as u64;
        if max <= min {
            return self.config.min_delay;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// Backoff before retry number `attempt + 1`: base doubled per
    /// attempt, capped at `max_backoff`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.base_backoff.as_millis() as u64;
        let capped = base.saturating_mul(1u64 << attempt.min(16));
        Duration::from_millis(capped).min(self.config.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Transport that fails every call with a transient error.
    struct AlwaysTransient {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Transport for AlwaysTransient {
        async fn get(&self, _url: &str) -> FetchResult<RawPayload> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Transient(Box::new(std::io::Error::other(
                "connection reset",
            ))))
        }

        async fn post(&self, url: &str, _body: &serde_json::Value) -> FetchResult<RawPayload> {
            self.get(url).await
        }
    }

    /// Transport that serves a fixed body after a number of transient failures.
    struct FlakyThenOk {
        failures_left: AtomicU32,
        body: String,
    }

    #[async_trait]
    impl Transport for FlakyThenOk {
        async fn get(&self, url: &str) -> FetchResult<RawPayload> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(FetchError::Transient(Box::new(std::io::Error::other(
                    "flaky",
                ))));
            }
            Ok(RawPayload::new(url, self.body.clone()))
        }

        async fn post(&self, url: &str, _body: &serde_json::Value) -> FetchResult<RawPayload> {
            self.get(url).await
        }
    }

    fn instant_config(max_attempts: u32) -> ClientConfig {
        ClientConfig::new()
            .with_delay_bounds(Duration::ZERO, Duration::ZERO)
            .with_backoff(Duration::ZERO, Duration::ZERO)
            .with_max_attempts(max_attempts)
    }

    #[tokio::test]
    async fn always_transient_raises_after_exactly_max_attempts() {
        let transport = AlwaysTransient {
            calls: AtomicU32::new(0),
        };
        let client = ResilientClient::with_transport(transport, instant_config(4));

        let err = client.get("http://example.test/listing").await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(client.transport.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn recovers_when_failures_stop_before_the_bound() {
        let transport = FlakyThenOk {
            failures_left: AtomicU32::new(2),
            body: "ok".to_string(),
        };
        let client = ResilientClient::with_transport(transport, instant_config(3));

        let payload = client.get("http://example.test/detail").await.unwrap();
        assert_eq!(payload.body, "ok");
    }

    #[tokio::test]
    async fn malformed_body_is_not_retried() {
        struct MalformedOnce {
            calls: AtomicU32,
        }

        #[async_trait]
        impl Transport for MalformedOnce {
            async fn get(&self, url: &str) -> FetchResult<RawPayload> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(RawPayload::new(url, "not json at all"))
            }

            async fn post(&self, url: &str, _body: &serde_json::Value) -> FetchResult<RawPayload> {
                self.get(url).await
            }
        }

        let client = ResilientClient::with_transport(
            MalformedOnce {
                calls: AtomicU32::new(0),
            },
            instant_config(5),
        );

        let err = client
            .get_json::<serde_json::Value>("http://example.test/api")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
        assert_eq!(client.transport.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_delays_never_decrease_and_respect_the_cap() {
        let config = ClientConfig::new()
            .with_backoff(Duration::from_millis(100), Duration::from_secs(2));
        let client = ResilientClient::with_transport(
            AlwaysTransient {
                calls: AtomicU32::new(0),
            },
            config,
        );

        let mut previous = Duration::ZERO;
        for attempt in 0..10 {
            let delay = client.backoff_delay(attempt);
            assert!(delay >= previous);
            assert!(delay <= Duration::from_secs(2));
            previous = delay;
        }
        assert_eq!(client.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(client.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(client.backoff_delay(10), Duration::from_secs(2));
    }
}
