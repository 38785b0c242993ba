//! Pairing errors
//!
//! | Variant | Severity | Surfaced by |
//! |---------|----------|-------------|
//! | `Transport` | fatal | router fault signal |
//! | `MalformedPayload` | fatal | router fault signal |
//! | `Handshake` | recoverable | `connect()` |
//! | `TransportUnavailable` | recoverable | `connect()` |
//! | `AssetQuery` | logged only | asset refresh |
//! | `Config` | recoverable | `PairingConfig::from_env` / `validate` |

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PairingError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PairingError {
    #[error("Transport error on '{event}': {message}")]
    Transport { event: String, message: String },

    #[error("Malformed '{event}' payload: {reason}")]
    MalformedPayload { event: String, reason: String },

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Asset query failed: {0}")]
    AssetQuery(String),

    #[error("Invalid config: {0}")]
    Config(String),
}

impl PairingError {
    /// Faults that leave the session untrustworthy.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PairingError::Transport { .. } | PairingError::MalformedPayload { .. })
    }
}
