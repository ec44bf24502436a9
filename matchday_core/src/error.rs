//! Errors raised by the simulation engine.

use matchday_env::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimulatorError {
    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    
    /// Match store call failed
    #[error(transparent)]
    Store(#[from] StoreError),
}
