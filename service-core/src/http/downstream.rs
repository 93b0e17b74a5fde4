use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use reqwest::header::HeaderMap;
use thiserror::Error;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitOpen};
use crate::middleware::tracing::current_request_id;
use crate::observability::inject_trace_headers;

#[derive(Clone, Debug)]
pub struct DownstreamConfig {
    pub name: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub breaker: CircuitBreakerConfig,
}

impl DownstreamConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(15),
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DownstreamError {
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpen),

    #[error("request to {downstream} failed: {source}")]
    Transport {
        downstream: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build request to {downstream}: {reason}")]
    Build { downstream: String, reason: String },
}

/// A reqwest client guarded by a circuit breaker.
///
/// Every request carries the current request id and trace context. Transport
/// errors and 5xx responses count as failures; any other response is handed
/// back to the caller for interpretation.
#[derive(Clone, Debug)]
pub struct DownstreamClient {
    client: reqwest::Client,
    breaker: Arc<CircuitBreaker>,
}

impl DownstreamClient {
    pub fn new(config: DownstreamConfig) -> Result<Self, DownstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DownstreamError::Build {
                downstream: config.name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            breaker: Arc::new(CircuitBreaker::new(config.name, config.breaker)),
        })
    }

    pub fn name(&self) -> &str {
        self.breaker.name()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client.request(method, url)
    }

    pub async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, DownstreamError> {
        self.breaker.acquire().await?;

        let mut headers = HeaderMap::new();
        inject_trace_headers(&mut headers, current_request_id().as_deref());

        match request.headers(headers).send().await {
            Ok(response) => {
                if response.status().is_server_error() {
                    self.record_failure().await;
                } else {
                    self.breaker.on_success().await;
                }
                Ok(response)
            }
            Err(source) => {
                self.record_failure().await;
                Err(DownstreamError::Transport {
                    downstream: self.name().to_string(),
                    source,
                })
            }
        }
    }

    async fn record_failure(&self) {
        counter!("paylink_downstream_failures_total", "downstream" => self.name().to_string())
            .increment(1);
        self.breaker.on_failure().await;
    }
}
