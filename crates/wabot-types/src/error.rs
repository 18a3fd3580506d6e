//! Error types shared across all wabot crates.

/// Errors that can occur while bringing the bot up.
///
/// Policy rejections are never represented here; they travel as typed
/// decision values through the guard crate.
#[derive(Debug, thiserror::Error)]
pub enum WabotError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
