// warden-core/src/error.rs

use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::connector::ConnectorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WardenError {
    // --- DOMAIN ERRORS (rules, issues, transitions) ---
    #[error(transparent)]
    Domain(#[from] DomainError),

    // --- INFRASTRUCTURE ERRORS (IO, parsing, storage) ---
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    // --- DATA SOURCE ERRORS ---
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error("Internal Error: {0}")]
    InternalError(String),
}

impl WardenError {
    /// A systemic failure rejects a whole batch instead of a single unit.
    pub fn is_systemic(&self) -> bool {
        matches!(self, Self::Connector(e) if e.is_systemic())
    }
}

impl From<std::io::Error> for WardenError {
    fn from(err: std::io::Error) -> Self {
        WardenError::Infrastructure(InfrastructureError::Io(err))
    }
}

pub type Result<T, E = WardenError> = std::result::Result<T, E>;
