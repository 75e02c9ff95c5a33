//! JSON request and response bodies.
//!
//! Field names are part of the public contract, including the
//! `registeration_code` spelling accepted by `/reverse`.

use licreg_types::{RegisterOutcome, ReverseOutcome, ValidateOutcome};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Activation serial number.
    pub serial_number: String,
    /// Machine code.
    pub registration_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub serial_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseRequest {
    pub registeration_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterResponse {
    pub verified: bool,
    pub error: Option<String>,
}

impl From<RegisterOutcome> for RegisterResponse {
    fn from(outcome: RegisterOutcome) -> Self {
        Self {
            verified: outcome.verified,
            error: outcome.error,
        }
    }
}

/// `regtime` is omitted entirely when registration times are not tracked,
/// and serialized as `null` when tracked but unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidateResponse {
    pub used: bool,
    pub error: Option<String>,
    pub regkey: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regtime: Option<Option<String>>,
}

impl ValidateResponse {
    pub fn from_outcome(outcome: ValidateOutcome, timestamps: bool) -> Self {
        Self {
            used: outcome.used,
            error: outcome.error,
            regkey: outcome.regkey,
            regtime: timestamps.then_some(outcome.regtime),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReverseResponse {
    pub serial_number: Option<String>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register_time: Option<Option<String>>,
}

impl ReverseResponse {
    pub fn from_outcome(outcome: ReverseOutcome, timestamps: bool) -> Self {
        Self {
            serial_number: outcome.serial_number,
            error: outcome.error,
            register_time: timestamps.then_some(outcome.register_time),
        }
    }
}
