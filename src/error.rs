//! Error types for the Hub runtime.

use crate::control_plane::ControlPlaneError;

/// Top-level error type for the Hub runtime.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Session token storage error.
    #[error("session error: {0}")]
    Session(String),

    /// Control Plane request failed.
    #[error("control plane error: {0}")]
    ControlPlane(#[from] ControlPlaneError),

    /// Local persisted state (escalation cache) error.
    #[error("store error: {0}")]
    Store(String),

    /// Page extraction error.
    #[error("extract error: {0}")]
    Extract(#[from] kilu_extract::ExtractError),

    /// Service supervision error.
    #[error("service error: {0}")]
    Service(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, HubError>;
