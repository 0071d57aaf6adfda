//! Error types for the Dukat engine cores

use thiserror::Error;

/// Main error type for the engine
#[derive(Debug, Error)]
pub enum Error {
    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Clipmap level size must be `2^k - 1` and at least 7
    #[error("invalid clipmap level size {0}: expected 2^k - 1 and >= 7")]
    InvalidLevelSize(u32),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("body pool exhausted (capacity {capacity})")]
    PoolExhausted { capacity: usize },

    /// Handle refers to a body that was destroyed or never existed
    #[error("invalid or destroyed body handle")]
    InvalidBody,
}
