//! Storage backends for serial-number registrations.
//!
//! Records live in three independent namespaces (primary, reverse lookup and
//! optional timestamps). Creating a registration touches all of them, so the
//! [`RegistrationStore::bind`] operation is required to be atomic.

use async_trait::async_trait;
use licreg_types::{RegistrationCode, RegistrationTime, SerialNumber};
use std::fmt;

mod memory;
mod redis_backend;

pub use memory::MemoryStore;
pub use redis_backend::{RedisStore, RedisStoreConfig};

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("unexpected store reply: {0}")]
    UnexpectedReply(String),
    #[error("namespace {0} is not configured")]
    NamespaceNotConfigured(Namespace),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Logical keyspace a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// serial number -> registration code
    Primary,
    /// registration code -> serial number
    Reverse,
    /// serial number -> registration time
    Timestamp,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Primary => "primary",
            Namespace::Reverse => "reverse",
            Namespace::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First-write-wins binding of a serial number to a registration code.
#[derive(Debug, Clone)]
pub struct BindRequest {
    pub serial: SerialNumber,
    pub code: RegistrationCode,
    /// Written to the timestamp namespace when present.
    pub registered_at: Option<RegistrationTime>,
    /// Refuse serials that were never provisioned with a placeholder.
    pub require_issued: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// Primary, reverse (and timestamp) records were written.
    Created,
    /// The serial number was already bound to the contained code.
    AlreadyBound(String),
    /// `require_issued` was set and the serial number is unknown.
    NotIssued,
    /// The code is already bound to the contained (different) serial number.
    CodeInUse(String),
}

/// Abstract registration store.
///
/// An empty primary value marks a serial number that was issued but never
/// bound; implementations treat it like an absent entry when binding.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Short backend label used in logs and `/health`.
    fn backend(&self) -> &'static str;

    fn has_namespace(&self, namespace: Namespace) -> bool;

    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<String>>;

    /// Atomically check the primary and reverse records and, when both are
    /// free, create every record belonging to the registration.
    ///
    /// A code already owned by another serial is never rebound, so every
    /// primary record keeps a matching reverse record.
    async fn bind(&self, request: &BindRequest) -> Result<BindOutcome>;

    async fn ping(&self) -> Result<()>;
}
