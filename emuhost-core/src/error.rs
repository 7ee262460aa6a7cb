//! Error handling.

use crate::engine::EngineError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Error {
    /// The engine failed while advancing a frame. The session is faulted until reset or a new
    /// cartridge is inserted.
    #[error("engine fault: {0}")]
    Engine(#[from] EngineError),
    /// The engine rejected a cartridge image.
    #[error("failed to insert cartridge: {0}")]
    Cartridge(EngineError),
    #[error("invalid configuration {value:?} for {field:?}")]
    InvalidConfig { field: &'static str, value: String },
}

impl Error {
    pub fn invalid_config(field: &'static str, value: impl ToString) -> Self {
        Self::InvalidConfig {
            field,
            value: value.to_string(),
        }
    }

    /// Whether this error faulted the session.
    #[must_use]
    pub const fn is_fault(&self) -> bool {
        matches!(self, Self::Engine(_))
    }
}
