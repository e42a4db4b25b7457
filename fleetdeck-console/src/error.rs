//! Error types for the console.

use crate::config::ConfigError;
use crate::dispatcher::DispatchError;
use crate::logging::LoggingError;
use crate::persistence::PersistenceError;
use fleetdeck_core::{FleetError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Logging(#[from] LoggingError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Fleet(#[from] FleetError),
    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

impl From<StoreError> for ConsoleError {
    fn from(err: StoreError) -> Self {
        ConsoleError::Fleet(FleetError::from(err))
    }
}

pub type ConsoleResult<T> = Result<T, ConsoleError>;
