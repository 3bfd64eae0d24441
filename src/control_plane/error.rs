//! Control Plane request errors.

/// Errors returned by Control Plane calls.
///
/// The task loop maps these onto operating states: `Unauthorized` to
/// `ErrorAuth`, `Quota` to `ErrorQuota`, everything else to `ErrorNetwork`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlPlaneError {
    /// Session rejected (401/403 on an authenticated read).
    #[error("{0}")]
    Unauthorized(String),

    /// Step quota exhausted or rate limited (403/429 on mint).
    #[error("{0}")]
    Quota(String),

    /// Any other non-success status.
    #[error("{message}")]
    Status { status: u16, message: String },

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(String),

    /// The response body did not match the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),

    /// No usable base URL or session.
    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl ControlPlaneError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Human-readable message for an error `status`, preferring the server's
/// own explanation when it sent one.
pub fn status_message(status: u16, server_message: Option<&str>) -> String {
    let or = |fallback: &str| server_message.map_or_else(|| fallback.to_owned(), str::to_owned);
    match status {
        400 => format!("Invalid Request: {}", or("Check your inputs.")),
        401 => format!("Unauthorized: {}", or("Session expired or invalid.")),
        403 => format!(
            "Forbidden: {}",
            or("You do not have permission for this action.")
        ),
        404 => format!(
            "Not Found: {}",
            or("The requested resource does not exist.")
        ),
        409 => format!(
            "Conflict: {}",
            or("The resource state has changed. Please refresh.")
        ),
        429 => format!(
            "Rate Limited: {}",
            or("Too many requests. Please slow down and try again later.")
        ),
        500..=599 => format!(
            "Server Error ({status}): {}",
            or("Our systems are experiencing issues.")
        ),
        _ => format!("Error {status}: {}", or("An unknown error occurred.")),
    }
}

/// Pull `message` (else `error`) out of a Control Plane error envelope.
pub fn envelope_message(body: &str) -> Option<String> {
    if body.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<super::types::ErrorEnvelope>(body) {
        Ok(envelope) => envelope.message.or(envelope.error),
        Err(_) => Some("Failed to parse server error format.".to_owned()),
    }
}
