//! Embedding dimension contract and input preparation.
//!
//! The provider returns fixed-length vectors; anything with a different
//! length is rejected before it reaches the store. Input preparation
//! decides the skip-vs-embed question: the emptiness check runs on the
//! trimmed full text *before* the length cap is applied, so content that
//! is empty, whitespace-only, or would only survive as whitespace is
//! uniformly a skip, never a failure.

use crate::error::CoreError;

/// Vector length the provider is configured to return.
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1024;

/// Character cap applied to provider input (provider request limit).
pub const DEFAULT_MAX_INPUT_CHARS: usize = 8000;

/// Validate that an embedding vector matches the configured dimension.
pub fn validate_dimension(embedding: &[f32], expected: usize) -> Result<(), CoreError> {
    if embedding.len() != expected {
        return Err(CoreError::Validation(format!(
            "Embedding must be {expected}-dimensional, got {}",
            embedding.len()
        )));
    }
    Ok(())
}

/// Prepare alert content for the embedding provider.
///
/// Returns `None` when there is nothing to embed (the caller must treat
/// this as a skip, not a failure). Otherwise returns the text truncated
/// to at most `max_chars` characters, respecting char boundaries.
pub fn embedding_input(content: &str, max_chars: usize) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_chars).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_dimension_accepts_exact_length() {
        let v = vec![0.0f32; DEFAULT_EMBEDDING_DIMENSION];
        assert!(validate_dimension(&v, DEFAULT_EMBEDDING_DIMENSION).is_ok());
    }

    #[test]
    fn validate_dimension_rejects_short_and_long() {
        assert!(validate_dimension(&[0.0; 512], 1024).is_err());
        assert!(validate_dimension(&vec![0.0; 1025], 1024).is_err());
        assert!(validate_dimension(&[], 1024).is_err());
    }

    #[test]
    fn empty_content_is_a_skip() {
        assert_eq!(embedding_input("", 100), None);
    }

    #[test]
    fn whitespace_only_content_is_a_skip() {
        assert_eq!(embedding_input("   \n\t  ", 100), None);
    }

    #[test]
    fn content_is_trimmed_then_capped() {
        assert_eq!(
            embedding_input("  flood warning  ", 100).as_deref(),
            Some("flood warning")
        );
        assert_eq!(embedding_input("abcdef", 3).as_deref(), Some("abc"));
    }

    #[test]
    fn cap_respects_char_boundaries() {
        // Multi-byte characters must not be split.
        assert_eq!(embedding_input("ééé", 2).as_deref(), Some("éé"));
    }
}
