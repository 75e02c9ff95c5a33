use crate::errors::ConfigValueError;
use std::fmt;
use std::str::FromStr;

/// Which serial numbers may be bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationPolicy {
    /// Any serial number not yet bound may be registered.
    #[default]
    Open,
    /// Only serial numbers provisioned with an empty placeholder may be
    /// registered; unknown ones are rejected as invalid.
    IssuedOnly,
}

impl FromStr for RegistrationPolicy {
    type Err = ConfigValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "open" => Ok(RegistrationPolicy::Open),
            "issued-only" | "issued_only" => Ok(RegistrationPolicy::IssuedOnly),
            _ => Err(ConfigValueError {
                setting: "registration policy",
                value: value.to_string(),
                expected: "open, issued-only",
            }),
        }
    }
}

impl fmt::Display for RegistrationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RegistrationPolicy::Open => "open",
            RegistrationPolicy::IssuedOnly => "issued-only",
        })
    }
}

/// What `reverse` does with the timestamp namespace when the registration
/// code resolves to no serial number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownCodeTimeLookup {
    /// Do not touch the timestamp namespace; `register_time` is null.
    #[default]
    Skip,
    /// Read the timestamp namespace anyway (keyed by the empty serial). The
    /// value is discarded, but a store failure on that read is reported.
    Attempt,
}

impl FromStr for UnknownCodeTimeLookup {
    type Err = ConfigValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "skip" => Ok(UnknownCodeTimeLookup::Skip),
            "attempt" => Ok(UnknownCodeTimeLookup::Attempt),
            _ => Err(ConfigValueError {
                setting: "reverse time lookup mode",
                value: value.to_string(),
                expected: "skip, attempt",
            }),
        }
    }
}

impl fmt::Display for UnknownCodeTimeLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnknownCodeTimeLookup::Skip => "skip",
            UnknownCodeTimeLookup::Attempt => "attempt",
        })
    }
}

/// Behavioural switches of [`crate::RegistrationService`].
///
/// Whether registration times are tracked is a property of the store (it
/// either has a timestamp namespace or not), not of this config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryConfig {
    pub policy: RegistrationPolicy,
    pub unknown_code_time_lookup: UnknownCodeTimeLookup,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!("open".parse(), Ok(RegistrationPolicy::Open));
        assert_eq!(" Issued-Only ".parse(), Ok(RegistrationPolicy::IssuedOnly));
        assert_eq!("issued_only".parse(), Ok(RegistrationPolicy::IssuedOnly));
        let err = "closed".parse::<RegistrationPolicy>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown registration policy 'closed' (expected one of: open, issued-only)"
        );
    }

    #[test]
    fn test_time_lookup_parsing_round_trips_display() {
        for mode in [UnknownCodeTimeLookup::Skip, UnknownCodeTimeLookup::Attempt] {
            assert_eq!(mode.to_string().parse(), Ok(mode));
        }
        assert!("always".parse::<UnknownCodeTimeLookup>().is_err());
    }
}
