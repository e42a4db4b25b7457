//! Error types for fleetdeck operations

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Failure of a remote operation, as surfaced by a dispatcher.
///
/// These are values, not exceptions: the store records them in collection
/// state and returns them to the caller, and never retries on its own.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteError {
    #[error("Transport failure: {reason}")]
    Transport { reason: String },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("{model} {key} not found")]
    NotFound { model: String, key: String },

    #[error("Request rejected: {payload}")]
    Rejected { payload: JsonValue },

    #[error("Malformed response: {reason}")]
    Decode { reason: String },
}

impl RemoteError {
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    pub fn rejected(payload: impl Into<JsonValue>) -> Self {
        Self::Rejected {
            payload: payload.into(),
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(err.to_string())
    }
}

/// Entity store errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A keyed mutation was issued for a key the collection does not hold.
    /// This is a caller defect, not a runtime condition.
    #[error("Unknown {model} key: {key}")]
    UnknownKey { model: String, key: String },

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Operation aborted: {reason}")]
    Aborted { reason: String },
}

impl StoreError {
    pub fn unknown_key(model: &str, key: impl ToString) -> Self {
        Self::UnknownKey {
            model: model.to_string(),
            key: key.to_string(),
        }
    }

    /// The remote failure behind this error, if any.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            StoreError::Remote(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Master error type for all fleetdeck errors.
#[derive(Debug, Clone, Error)]
pub enum FleetError {
    #[error("Remote error: {0}")]
    Remote(RemoteError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Unknown entity kind: {0}")]
    UnknownKind(String),

    #[error("Invalid key {key} for {model}")]
    InvalidKey { model: String, key: String },
}

impl From<RemoteError> for FleetError {
    fn from(err: RemoteError) -> Self {
        FleetError::Remote(err)
    }
}

/// Result type alias for fleetdeck operations.
pub type FleetResult<T> = Result<T, FleetError>;
