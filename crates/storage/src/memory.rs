use crate::{BindOutcome, BindRequest, Namespace, RegistrationStore, Result, StoreError};
use async_trait::async_trait;
use licreg_types::SerialNumber;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Namespaces {
    primary: HashMap<String, String>,
    reverse: HashMap<String, String>,
    timestamps: HashMap<String, String>,
}

impl Namespaces {
    fn map(&self, namespace: Namespace) -> &HashMap<String, String> {
        match namespace {
            Namespace::Primary => &self.primary,
            Namespace::Reverse => &self.reverse,
            Namespace::Timestamp => &self.timestamps,
        }
    }

    fn map_mut(&mut self, namespace: Namespace) -> &mut HashMap<String, String> {
        match namespace {
            Namespace::Primary => &mut self.primary,
            Namespace::Reverse => &mut self.reverse,
            Namespace::Timestamp => &mut self.timestamps,
        }
    }
}

/// In-memory store used for development and tests.
///
/// All namespaces sit behind one lock, which makes `bind` atomic.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    namespaces: Arc<RwLock<Namespaces>>,
    timestamps: bool,
    unavailable: Arc<AtomicBool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(true)
    }
}

impl MemoryStore {
    pub fn new(timestamps: bool) -> Self {
        Self {
            namespaces: Arc::new(RwLock::new(Namespaces::default())),
            timestamps,
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Provision an unbound placeholder for `serial`. Existing entries are kept.
    pub fn issue(&self, serial: &SerialNumber) {
        self.namespaces
            .write()
            .primary
            .entry(serial.as_str().to_string())
            .or_default();
    }

    /// Write a raw record, bypassing bind semantics.
    pub fn insert(&self, namespace: Namespace, key: impl Into<String>, value: impl Into<String>) {
        self.namespaces
            .write()
            .map_mut(namespace)
            .insert(key.into(), value.into());
    }

    pub fn len(&self, namespace: Namespace) -> usize {
        self.namespaces.read().map(namespace).len()
    }

    pub fn is_empty(&self) -> bool {
        let namespaces = self.namespaces.read();
        namespaces.primary.is_empty()
            && namespaces.reverse.is_empty()
            && namespaces.timestamps.is_empty()
    }

    /// Simulate an outage: every operation fails until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unavailable".into()));
        }
        Ok(())
    }

    fn check_namespace(&self, namespace: Namespace) -> Result<()> {
        if self.has_namespace(namespace) {
            Ok(())
        } else {
            Err(StoreError::NamespaceNotConfigured(namespace))
        }
    }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn has_namespace(&self, namespace: Namespace) -> bool {
        namespace != Namespace::Timestamp || self.timestamps
    }

    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        self.check_namespace(namespace)?;
        Ok(self.namespaces.read().map(namespace).get(key).cloned())
    }

    async fn bind(&self, request: &BindRequest) -> Result<BindOutcome> {
        self.check_available()?;
        if request.registered_at.is_some() {
            self.check_namespace(Namespace::Timestamp)?;
        }

        let serial = request.serial.as_str();
        let code = request.code.as_str();

        let mut namespaces = self.namespaces.write();
        match namespaces.primary.get(serial) {
            Some(existing) if !existing.is_empty() => {
                return Ok(BindOutcome::AlreadyBound(existing.clone()));
            }
            None if request.require_issued => return Ok(BindOutcome::NotIssued),
            _ => {}
        }
        if let Some(owner) = namespaces.reverse.get(code) {
            if owner != serial {
                return Ok(BindOutcome::CodeInUse(owner.clone()));
            }
        }

        namespaces
            .primary
            .insert(serial.to_string(), code.to_string());
        namespaces
            .reverse
            .insert(code.to_string(), serial.to_string());
        if let Some(at) = request.registered_at {
            namespaces
                .timestamps
                .insert(serial.to_string(), at.to_string());
        }

        Ok(BindOutcome::Created)
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use licreg_types::{RegistrationCode, RegistrationTime};

    fn request(serial: &str, code: &str) -> BindRequest {
        BindRequest {
            serial: SerialNumber::parse(serial).unwrap(),
            code: RegistrationCode::parse(code).unwrap(),
            registered_at: RegistrationTime::parse("2024-01-02 03:04:05"),
            require_issued: false,
        }
    }

    #[tokio::test]
    async fn bind_writes_all_namespaces() {
        let store = MemoryStore::new(true);
        let outcome = store.bind(&request("SN-1", "CODE-1")).await.unwrap();
        assert_eq!(outcome, BindOutcome::Created);

        assert_eq!(
            store.get(Namespace::Primary, "SN-1").await.unwrap().as_deref(),
            Some("CODE-1")
        );
        assert_eq!(
            store.get(Namespace::Reverse, "CODE-1").await.unwrap().as_deref(),
            Some("SN-1")
        );
        assert_eq!(
            store.get(Namespace::Timestamp, "SN-1").await.unwrap().as_deref(),
            Some("2024-01-02 03:04:05")
        );
    }

    #[tokio::test]
    async fn second_bind_reports_existing_code() {
        let store = MemoryStore::new(false);
        let mut first = request("SN-1", "CODE-1");
        first.registered_at = None;
        store.bind(&first).await.unwrap();

        let mut second = request("SN-1", "CODE-2");
        second.registered_at = None;
        let outcome = store.bind(&second).await.unwrap();
        assert_eq!(outcome, BindOutcome::AlreadyBound("CODE-1".into()));
        assert_eq!(store.len(Namespace::Reverse), 1);
    }

    #[tokio::test]
    async fn placeholder_is_bindable_and_required_when_issued_only() {
        let store = MemoryStore::new(true);
        let mut req = request("SN-9", "CODE-9");
        req.require_issued = true;
        assert_eq!(store.bind(&req).await.unwrap(), BindOutcome::NotIssued);
        assert!(store.is_empty());

        store.issue(&req.serial);
        assert_eq!(store.bind(&req).await.unwrap(), BindOutcome::Created);
    }

    #[tokio::test]
    async fn code_owned_by_another_serial_is_not_rebound() {
        let store = MemoryStore::new(true);
        store.bind(&request("SN-A", "CODE-SHARED")).await.unwrap();

        let outcome = store.bind(&request("SN-B", "CODE-SHARED")).await.unwrap();
        assert_eq!(outcome, BindOutcome::CodeInUse("SN-A".into()));
        assert_eq!(store.len(Namespace::Primary), 1);
        assert_eq!(store.len(Namespace::Timestamp), 1);
        assert_eq!(
            store
                .get(Namespace::Reverse, "CODE-SHARED")
                .await
                .unwrap()
                .as_deref(),
            Some("SN-A")
        );
    }

    #[tokio::test]
    async fn timestamp_namespace_must_be_configured() {
        let store = MemoryStore::new(false);
        let err = store.bind(&request("SN-1", "CODE-1")).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::NamespaceNotConfigured(Namespace::Timestamp)
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn outage_fails_every_operation() {
        let store = MemoryStore::default();
        store.set_unavailable(true);
        assert!(store.ping().await.is_err());
        assert!(store.get(Namespace::Primary, "SN-1").await.is_err());
        assert!(store.bind(&request("SN-1", "CODE-1")).await.is_err());

        store.set_unavailable(false);
        assert!(store.ping().await.is_ok());
    }
}
