//! Error types for payload rendering.

/// Errors produced while rendering a bootstrap payload.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("User-data payload is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("Unknown payload template '{0}' (expected: nlp, training)")]
    UnknownTemplate(String),

    #[error("Failed to render payload: {0}")]
    Render(String),
}
