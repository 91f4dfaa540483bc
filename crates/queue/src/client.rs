//! Redis queue client with an explicit connection-state machine.
//!
//! Every operation goes through an idempotent [`QueueClient::ensure_connected`]
//! guard; any broker error drops the state back to `Disconnected` so the
//! next call reconnects. Publishing retries with exponential backoff;
//! consuming treats an empty bounded wait as the normal no-work case.

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde_json::Value;
use tokio::sync::Mutex;
use vigil_core::message::EmbeddingTask;
use vigil_core::normalize::generate_alert_id;
use vigil_core::retry::{retry_async, RetryPolicy};

/// Connection settings for the queue broker.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Broker URL, e.g. `redis://localhost:6379`.
    pub url: String,
    /// Bound on establishing a new connection.
    pub connect_timeout: Duration,
    /// Bound on any single non-blocking operation.
    pub op_timeout: Duration,
    /// Backoff policy for publish retries.
    pub retry: RetryPolicy,
}

impl QueueConfig {
    /// Config with default timeouts (5s connect, 5s op) and the default
    /// 3-attempt backoff policy.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(5),
            op_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

/// Connection lifecycle for the broker link.
///
/// `Connecting` is observable only while a connect attempt holds the
/// state lock; it exists so status reporting can tell "idle with no
/// connection" apart from "dialing".
#[derive(Debug)]
enum ConnectionState {
    Disconnected,
    Connecting,
    Connected(MultiplexedConnection),
}

impl ConnectionState {
    fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected(_) => "connected",
        }
    }
}

/// Errors from the queue layer.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The broker URL could not be parsed.
    #[error("Invalid broker URL: {0}")]
    InvalidUrl(String),

    /// The broker was unreachable after exhausting retries.
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    /// A single broker operation failed.
    #[error("Queue operation failed: {0}")]
    Operation(#[from] redis::RedisError),

    /// The payload could not be serialized to JSON.
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl QueueError {
    /// Whether retrying the operation could help.
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Operation(_))
    }
}

/// Client for a Redis list-backed FIFO queue.
///
/// FIFO discipline: producers `RPUSH` to the tail, the consumer `BLPOP`s
/// from the head. One long-lived multiplexed connection is reused across
/// batches and transparently re-established on failure.
#[derive(Debug)]
pub struct QueueClient {
    client: redis::Client,
    config: QueueConfig,
    state: Mutex<ConnectionState>,
}

impl QueueClient {
    /// Create a client for the configured broker. Does not connect yet;
    /// the first operation does.
    pub fn new(config: QueueConfig) -> Result<Self, QueueError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| QueueError::InvalidUrl(format!("{}: {e}", config.url)))?;
        Ok(Self {
            client,
            config,
            state: Mutex::new(ConnectionState::Disconnected),
        })
    }

    /// Current connection-state name (`disconnected`/`connecting`/`connected`).
    pub async fn connection_state(&self) -> &'static str {
        self.state.lock().await.name()
    }

    /// Append a JSON-serializable payload to the tail of `queue`.
    ///
    /// Retried under the configured backoff policy; exhaustion maps to
    /// [`QueueError::Unavailable`].
    pub async fn publish<T: serde::Serialize>(
        &self,
        queue: &str,
        payload: &T,
    ) -> Result<(), QueueError> {
        let encoded = serde_json::to_string(payload)?;
        self.publish_raw(queue, &encoded).await
    }

    /// Append a pre-encoded payload to the tail of `queue`, with retry.
    pub async fn publish_raw(&self, queue: &str, payload: &str) -> Result<(), QueueError> {
        let result = retry_async(&self.config.retry, QueueError::is_retryable, || async {
            self.try_rpush(queue, payload).await
        })
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(QueueError::Operation(e)) => Err(QueueError::Unavailable(format!(
                "publish to '{queue}' failed after {} attempts: {e}",
                self.config.retry.max_attempts
            ))),
            Err(e) => Err(e),
        }
    }

    /// Publish an inbound alert payload to `queue`, returning its id.
    ///
    /// Missing fields are stamped before the push: a generated `id`, a
    /// `created_at` timestamp, and `status: "pending"`.
    pub async fn publish_alert(&self, queue: &str, mut alert: Value) -> Result<String, QueueError> {
        let obj = alert.as_object_mut().ok_or_else(|| {
            QueueError::Encode(serde::ser::Error::custom("alert payload must be an object"))
        })?;

        let id = match obj.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = generate_alert_id();
                obj.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };
        obj.entry("created_at")
            .or_insert_with(|| Value::String(chrono::Utc::now().to_rfc3339()));
        obj.entry("status")
            .or_insert_with(|| Value::String("pending".to_string()));

        self.publish(queue, &alert).await?;
        tracing::info!(alert_uid = %id, queue, "Alert published");
        Ok(id)
    }

    /// Publish a second-stage embedding task.
    pub async fn publish_embedding_task(
        &self,
        queue: &str,
        task: &EmbeddingTask,
    ) -> Result<(), QueueError> {
        self.publish(queue, task).await?;
        tracing::debug!(alert_uid = %task.alert_id, queue, "Embedding task published");
        Ok(())
    }

    /// Pop one payload from the head of `queue`, waiting at most `timeout`.
    ///
    /// `Ok(None)` on timeout is the normal "no work" case, not a failure.
    pub async fn consume_one(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<String>, QueueError> {
        let mut conn = self.ensure_connected().await?;

        // The broker already bounds the wait; the outer timeout only
        // fires when the connection itself is wedged.
        let pop = conn.blpop::<_, Option<(String, String)>>(queue, timeout.as_secs_f64());
        match tokio::time::timeout(timeout + self.config.op_timeout, pop).await {
            Ok(Ok(Some((_queue, payload)))) => Ok(Some(payload)),
            Ok(Ok(None)) => Ok(None),
            Ok(Err(e)) => {
                self.mark_disconnected().await;
                Err(QueueError::Operation(e))
            }
            Err(_) => {
                self.mark_disconnected().await;
                Err(QueueError::Unavailable(format!(
                    "blocking pop on '{queue}' stalled past its {timeout:?} bound"
                )))
            }
        }
    }

    /// Number of payloads currently waiting on `queue`.
    pub async fn depth(&self, queue: &str) -> Result<i64, QueueError> {
        let mut conn = self.ensure_connected().await?;
        self.bounded(conn.llen::<_, i64>(queue)).await
    }

    /// Repair a misconfigured key before use.
    ///
    /// If a non-list value occupies the queue's name, it is deleted and
    /// the queue starts empty. This repair is lossy by design: the
    /// wrong-typed value is unusable as a queue and keeping it would
    /// wedge every subsequent push and pop.
    pub async fn ensure_queue_shape(&self, queue: &str) -> Result<(), QueueError> {
        let mut conn = self.ensure_connected().await?;

        let key_type: String = self
            .bounded(redis::cmd("TYPE").arg(queue).query_async(&mut conn))
            .await?;

        match key_type.as_str() {
            "none" | "list" => Ok(()),
            other => {
                tracing::warn!(
                    queue,
                    key_type = other,
                    "Queue key holds a non-list value, deleting it",
                );
                self.bounded(conn.del::<_, ()>(queue)).await?;
                Ok(())
            }
        }
    }

    // ---- private helpers ----

    /// One RPUSH attempt over the current connection.
    async fn try_rpush(&self, queue: &str, payload: &str) -> Result<(), QueueError> {
        let mut conn = self.ensure_connected().await?;
        self.bounded(conn.rpush::<_, _, i64>(queue, payload))
            .await
            .map(|_len: i64| ())
    }

    /// Idempotent connection guard: reuse the live connection or dial a
    /// new one under the connect timeout.
    async fn ensure_connected(&self) -> Result<MultiplexedConnection, QueueError> {
        let mut state = self.state.lock().await;

        if let ConnectionState::Connected(conn) = &*state {
            return Ok(conn.clone());
        }

        *state = ConnectionState::Connecting;
        tracing::debug!(url = %self.config.url, "Connecting to queue broker");

        let connect = self.client.get_multiplexed_async_connection();
        match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Ok(Ok(conn)) => {
                tracing::info!(url = %self.config.url, "Connected to queue broker");
                *state = ConnectionState::Connected(conn.clone());
                Ok(conn)
            }
            Ok(Err(e)) => {
                *state = ConnectionState::Disconnected;
                Err(QueueError::Unavailable(format!(
                    "connect to {} failed: {e}",
                    self.config.url
                )))
            }
            Err(_) => {
                *state = ConnectionState::Disconnected;
                Err(QueueError::Unavailable(format!(
                    "connect to {} timed out after {:?}",
                    self.config.url, self.config.connect_timeout
                )))
            }
        }
    }

    /// Drop the cached connection so the next operation redials.
    async fn mark_disconnected(&self) {
        let mut state = self.state.lock().await;
        *state = ConnectionState::Disconnected;
    }

    /// Apply the operation timeout to a broker future. Any failure drops
    /// the cached connection so the next operation redials.
    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, redis::RedisError>>,
    ) -> Result<T, QueueError> {
        match tokio::time::timeout(self.config.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                self.mark_disconnected().await;
                Err(QueueError::Operation(e))
            }
            Err(_) => {
                self.mark_disconnected().await;
                Err(QueueError::Unavailable(format!(
                    "operation timed out after {:?}",
                    self.config.op_timeout
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn unreachable_client() -> QueueClient {
        // Nothing listens on this port; connects fail fast.
        let mut config = QueueConfig::new("redis://127.0.0.1:1");
        config.connect_timeout = Duration::from_millis(200);
        config.retry = RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(2),
        };
        QueueClient::new(config).unwrap()
    }

    #[test]
    fn invalid_url_is_rejected() {
        let result = QueueClient::new(QueueConfig::new("not a url"));
        assert_matches!(result, Err(QueueError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn starts_disconnected() {
        let client = unreachable_client();
        assert_eq!(client.connection_state().await, "disconnected");
    }

    #[tokio::test]
    async fn failed_connect_returns_unavailable_and_stays_disconnected() {
        let client = unreachable_client();
        let result = client.consume_one("alerts", Duration::from_millis(10)).await;
        assert_matches!(result, Err(QueueError::Unavailable(_)));
        assert_eq!(client.connection_state().await, "disconnected");
    }

    #[tokio::test]
    async fn publish_exhausts_retries_into_unavailable() {
        let client = unreachable_client();
        let result = client.publish_raw("alerts", "{}").await;
        assert_matches!(result, Err(QueueError::Unavailable(_)));
    }

    #[tokio::test]
    async fn publish_alert_rejects_non_object_payload() {
        let client = unreachable_client();
        let result = client
            .publish_alert("alerts", Value::String("nope".into()))
            .await;
        assert_matches!(result, Err(QueueError::Encode(_)));
    }
}
