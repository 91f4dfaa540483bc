//! HTTP client for the remote embedding provider.
//!
//! Wraps the provider's embeddings endpoint using [`reqwest`], with
//! bounded retry on transient failures and strict validation of the
//! returned vector dimension.

pub mod api;

pub use api::{EmbeddingApi, EmbeddingApiConfig, EmbeddingApiError};
