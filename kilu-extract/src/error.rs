//! Error types for the kilu-extract crate.
//!
//! Messages are stable and safe to surface to an approver: they carry the
//! reason a page was refused, never page content or credentials.

/// Errors that can occur while driving a render surface.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// An operation was attempted before [`initialize`](crate::SandboxedExtractor::initialize).
    #[error("surface not initialized")]
    NotInitialized,

    /// Navigation did not complete within the page-load timeout.
    #[error("page load timed out: {0}")]
    Timeout(String),

    /// The page was refused by a fail-closed navigation check.
    #[error("page blocked: {0}")]
    Blocked(String),

    /// The surface could not fetch the document.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Invalid extractor configuration.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience type alias for kilu-extract results.
pub type Result<T> = std::result::Result<T, ExtractError>;
