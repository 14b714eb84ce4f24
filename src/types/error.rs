//! Error types for metagate
//!
//! Engine outcomes are values; these errors cover configuration,
//! transport and mapping failures surfaced by the collaborators.

use crate::protocol::ResultCode;

/// Main error type for gateway operations
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Target unavailable: {0}")]
    Unavailable(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unwilling to perform: {0}")]
    Unwilling(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    /// Convert error to the directory result code reported to clients
    pub fn result_code(&self) -> ResultCode {
        match self {
            Self::Config(_) => ResultCode::Other,
            Self::Unavailable(_) => ResultCode::Unavailable,
            Self::Transport(_) => ResultCode::Unavailable,
            Self::Protocol(_) => ResultCode::ProtocolError,
            Self::Unwilling(_) => ResultCode::UnwillingToPerform,
            Self::Internal(_) => ResultCode::Other,
            Self::Io(_) => ResultCode::Other,
            Self::Json(_) => ResultCode::Other,
        }
    }

    /// Whether the error means the transport handle can no longer be used
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Unavailable(_))
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
