//! Error types for the registration service
//!
//! The display strings are returned verbatim to API clients.

use licreg_storage::StoreError;
use licreg_types::EmptyField;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to connect backend DB")]
    Backend(#[from] StoreError),

    #[error("Invalid Registeration code!")]
    UnknownSerial,

    #[error("Already registered")]
    AlreadyRegistered,

    /// The registration code is bound to a different serial number.
    #[error("Already registered")]
    CodeInUse,

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] EmptyField),
}

impl RegistryError {
    /// Metric label for the failure class.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            RegistryError::Backend(_) => "backend_unavailable",
            RegistryError::UnknownSerial => "unknown_serial",
            RegistryError::AlreadyRegistered => "already_registered",
            RegistryError::CodeInUse => "code_in_use",
            RegistryError::InvalidRequest(_) => "invalid_request",
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Raised when a configuration value names an unknown option.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {setting} '{value}' (expected one of: {expected})")]
pub struct ConfigValueError {
    pub setting: &'static str,
    pub value: String,
    pub expected: &'static str,
}
