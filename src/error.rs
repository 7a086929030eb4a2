//! Error types for a3s-teleport

use thiserror::Error;

/// Errors that can occur while orchestrating teleports
#[derive(Debug, Error)]
pub enum TeleportError {
    /// No region, or the region did not grant the capability
    #[error("Capability '{capability}' unavailable: {reason}")]
    CapabilityUnavailable {
        capability: String,
        reason: String,
    },

    /// Reliable-message transport rejected an outbound message
    #[error("Transport error: {0}")]
    Transport(String),

    /// Capability HTTP call failed
    #[error("HTTP error: {0}")]
    Http(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Preference persistence failure
    #[error("Store error: {0}")]
    Store(String),

    /// `restart_failed` called without a failed, restartable request
    #[error("No restartable failed teleport request")]
    NoRestartableRequest,

    /// The agent's account may not select this maturity rating
    #[error("Maturity rating '{0}' is not allowed for this agent")]
    MaturityNotAllowed(String),

    /// The service task has shut down
    #[error("Teleport service stopped")]
    ServiceStopped,
}

/// Result type alias for teleport operations
pub type Result<T> = std::result::Result<T, TeleportError>;
