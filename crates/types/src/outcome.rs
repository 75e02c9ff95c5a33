//! Results of the three registration operations.
//!
//! Every business and infrastructure failure is carried in the `error` field;
//! callers never see a transport-level error for them.

use serde::{Deserialize, Serialize};

/// Result of binding a serial number to a registration code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterOutcome {
    pub verified: bool,
    pub error: Option<String>,
}

impl RegisterOutcome {
    pub fn verified() -> Self {
        Self {
            verified: true,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            verified: false,
            error: Some(error.into()),
        }
    }
}

/// Result of checking whether a serial number has been bound.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidateOutcome {
    pub used: bool,
    pub error: Option<String>,
    pub regkey: Option<String>,
    pub regtime: Option<String>,
}

impl ValidateOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Result of resolving a registration code back to its serial number.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReverseOutcome {
    pub serial_number: Option<String>,
    pub register_time: Option<String>,
    pub error: Option<String>,
}

impl ReverseOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}
