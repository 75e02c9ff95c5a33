use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Raised when a request carries an empty identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} must not be empty")]
pub struct EmptyField {
    pub field: &'static str,
}

/// Externally issued activation serial number (primary key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerialNumber(String);

impl SerialNumber {
    /// Wire name of the field carrying a serial number.
    pub const FIELD: &'static str = "serial_number";

    pub fn parse(value: impl Into<String>) -> Result<Self, EmptyField> {
        let value = value.into();
        if value.is_empty() {
            return Err(EmptyField { field: Self::FIELD });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Machine code presented by a client when activating a serial number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationCode(String);

impl RegistrationCode {
    /// Wire name used by `/register`.
    pub const FIELD: &'static str = "registration_code";
    /// Wire name used by `/reverse` (the misspelling is part of the API).
    pub const REVERSE_FIELD: &'static str = "registeration_code";

    pub fn parse(value: impl Into<String>) -> Result<Self, EmptyField> {
        Self::parse_field(value, Self::FIELD)
    }

    /// Parse while reporting `field` on failure.
    pub fn parse_field(value: impl Into<String>, field: &'static str) -> Result<Self, EmptyField> {
        let value = value.into();
        if value.is_empty() {
            return Err(EmptyField { field });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RegistrationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
