//! REST client for the embedding provider endpoint.
//!
//! One [`EmbeddingApi`] per process, sharing a pooled [`reqwest::Client`]
//! with a builder-set request timeout. Transient transport failures and
//! 5xx responses are retried under the configured backoff policy; 4xx
//! responses are permanent and surface immediately with their body.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use vigil_core::embedding::{embedding_input, validate_dimension};
use vigil_core::retry::{retry_async, RetryPolicy};

/// Settings for the embedding provider connection.
#[derive(Debug, Clone)]
pub struct EmbeddingApiConfig {
    /// Embeddings endpoint, e.g. `https://api.jina.ai/v1/embeddings`.
    pub endpoint: String,
    /// Bearer token for the provider.
    pub api_key: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Vector length the provider must return.
    pub dimension: usize,
    /// Character cap applied to input text before submission.
    pub max_input_chars: usize,
    /// Bound on a single HTTP round-trip.
    pub request_timeout: Duration,
    /// Backoff policy for transient failures.
    pub retry: RetryPolicy,
}

impl EmbeddingApiConfig {
    /// Config with the provider defaults: 1024-dim vectors, 8000-char
    /// input cap, 30s request timeout, 3 attempts backing off 2s -> 10s.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimension: vigil_core::embedding::DEFAULT_EMBEDDING_DIMENSION,
            max_input_chars: vigil_core::embedding::DEFAULT_MAX_INPUT_CHARS,
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_secs(2),
                multiplier: 2.0,
                max_delay: Duration::from_secs(10),
            },
        }
    }
}

/// Errors from the embedding provider layer.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Embedding API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The provider was unreachable after exhausting retries.
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),

    /// The response carried no embedding where one was expected.
    #[error("Embedding response contained no vector")]
    Empty,

    /// The returned vector length does not match the configured dimension.
    #[error("Embedding has wrong dimension: expected {expected}, got {got}")]
    InvalidDimension { expected: usize, got: usize },
}

impl EmbeddingApiError {
    /// Whether the failure is transient: transport errors, timeouts, and
    /// 5xx responses. 4xx application errors are permanent.
    fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) | Self::Unavailable(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Empty | Self::InvalidDimension { .. } => false,
        }
    }
}

/// Request body for the provider's embeddings endpoint.
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    task: &'a str,
    dimensions: usize,
    input: [&'a str; 1],
}

/// Response body: one embedding per input.
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// HTTP client for the embedding provider.
pub struct EmbeddingApi {
    client: reqwest::Client,
    config: EmbeddingApiConfig,
}

impl EmbeddingApi {
    /// Build the client, setting the request timeout on the underlying
    /// connection pool.
    pub fn new(config: EmbeddingApiConfig) -> Result<Self, EmbeddingApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// Vector length this client is configured to accept.
    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Embed one text input.
    ///
    /// Returns `Ok(None)` when the input is empty or whitespace-only --
    /// the caller must treat this as a skip, not a failure. Otherwise
    /// retries transient failures up to the policy's attempt count and
    /// validates the vector length before returning it.
    pub async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingApiError> {
        let Some(input) = embedding_input(text, self.config.max_input_chars) else {
            return Ok(None);
        };

        let result = retry_async(
            &self.config.retry,
            EmbeddingApiError::is_retryable,
            || async { self.request_embedding(&input).await },
        )
        .await;

        let vector = match result {
            Ok(v) => v,
            Err(e) if e.is_retryable() => {
                return Err(EmbeddingApiError::Unavailable(format!(
                    "exhausted {} attempts: {e}",
                    self.config.retry.max_attempts
                )));
            }
            Err(e) => return Err(e),
        };

        validate_dimension(&vector, self.config.dimension).map_err(|_| {
            EmbeddingApiError::InvalidDimension {
                expected: self.config.dimension,
                got: vector.len(),
            }
        })?;

        Ok(Some(vector))
    }

    // ---- private helpers ----

    /// One POST to the provider, returning the raw (unvalidated) vector.
    async fn request_embedding(&self, input: &str) -> Result<Vec<f32>, EmbeddingApiError> {
        let body = EmbeddingRequest {
            model: &self.config.model,
            task: "text-matching",
            dimensions: self.config.dimension,
            input: [input],
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::error!(
                status = status.as_u16(),
                body = %body,
                "Embedding provider returned an error",
            );
            return Err(EmbeddingApiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        extract_vector(parsed)
    }
}

/// Pull the single expected vector out of a provider response.
fn extract_vector(response: EmbeddingResponse) -> Result<Vec<f32>, EmbeddingApiError> {
    response
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or(EmbeddingApiError::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn test_config() -> EmbeddingApiConfig {
        let mut config = EmbeddingApiConfig::new("http://127.0.0.1:1/embeddings", "key", "model");
        config.dimension = 4;
        config.request_timeout = Duration::from_millis(200);
        config.retry = RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(2),
        };
        config
    }

    #[tokio::test]
    async fn empty_text_short_circuits_without_any_request() {
        // The endpoint is unreachable; a skip must never touch it.
        let api = EmbeddingApi::new(test_config()).unwrap();
        assert_matches!(api.embed("").await, Ok(None));
        assert_matches!(api.embed("   \n ").await, Ok(None));
    }

    #[tokio::test]
    async fn unreachable_provider_maps_to_unavailable() {
        let api = EmbeddingApi::new(test_config()).unwrap();
        let result = api.embed("flood warning").await;
        assert_matches!(result, Err(EmbeddingApiError::Unavailable(_)));
    }

    #[test]
    fn request_body_matches_provider_contract() {
        let body = EmbeddingRequest {
            model: "jina-embeddings-v3",
            task: "text-matching",
            dimensions: 1024,
            input: ["flood warning"],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "jina-embeddings-v3");
        assert_eq!(json["task"], "text-matching");
        assert_eq!(json["dimensions"], 1024);
        assert_eq!(json["input"], serde_json::json!(["flood warning"]));
    }

    #[test]
    fn response_parsing_takes_first_vector() {
        let parsed: EmbeddingResponse = serde_json::from_str(
            r#"{"data":[{"embedding":[0.1,0.2]},{"embedding":[0.9]}]}"#,
        )
        .unwrap();
        assert_eq!(extract_vector(parsed).unwrap(), vec![0.1, 0.2]);
    }

    #[test]
    fn empty_response_data_is_an_error() {
        let parsed: EmbeddingResponse = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        assert_matches!(extract_vector(parsed), Err(EmbeddingApiError::Empty));
    }

    #[test]
    fn retryable_classification() {
        assert!(EmbeddingApiError::Api {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!EmbeddingApiError::Api {
            status: 401,
            body: String::new()
        }
        .is_retryable());
        assert!(!EmbeddingApiError::InvalidDimension {
            expected: 1024,
            got: 512
        }
        .is_retryable());
        assert!(!EmbeddingApiError::Empty.is_retryable());
    }
}
