use chrono::{Local, NaiveDateTime};
use std::fmt;
use std::sync::Arc;

/// Layout of stored registration timestamps (local server time).
pub const REGISTRATION_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Moment a serial number was bound, rendered as `YYYY-MM-DD HH:MM:SS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RegistrationTime(NaiveDateTime);

impl RegistrationTime {
    pub fn new(at: NaiveDateTime) -> Self {
        Self(at)
    }

    /// Parse a stored timestamp; returns `None` for foreign layouts.
    pub fn parse(value: &str) -> Option<Self> {
        NaiveDateTime::parse_from_str(value, REGISTRATION_TIME_FORMAT)
            .ok()
            .map(Self)
    }
}

impl fmt::Display for RegistrationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(REGISTRATION_TIME_FORMAT))
    }
}

/// Source of registration timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> RegistrationTime;
}

/// Wall clock in the server's local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> RegistrationTime {
        RegistrationTime(Local::now().naive_local())
    }
}

/// Clock frozen at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub RegistrationTime);

impl Clock for FixedClock {
    fn now(&self) -> RegistrationTime {
        self.0
    }
}

pub type SharedClock = Arc<dyn Clock>;
