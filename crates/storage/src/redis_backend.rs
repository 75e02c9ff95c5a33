//! Redis-backed registration store.
//!
//! Each namespace is a logical Redis database. Plain lookups go through one
//! connection per database; `bind` runs a server-side script that selects the
//! databases itself, so the check and the writes execute as one unit.

use crate::{BindOutcome, BindRequest, Namespace, RegistrationStore, Result, StoreError};
use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client, RedisError, Script};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

// Failures surface to the caller instead of being retried at length.
const CONNECT_BACKOFF_BASE: u64 = 2;
const CONNECT_BACKOFF_FACTOR_MS: u64 = 100;
const CONNECT_RETRIES: usize = 1;

const BIND_SCRIPT: &str = r#"
redis.call('SELECT', ARGV[1])
local existing = redis.call('GET', KEYS[1])
if existing and existing ~= '' then
  return {'bound', existing}
end
if (not existing) and ARGV[4] == '1' then
  return {'not_issued'}
end
redis.call('SELECT', ARGV[2])
local owner = redis.call('GET', KEYS[2])
if owner and owner ~= KEYS[1] then
  return {'code_in_use', owner}
end
redis.call('SET', KEYS[2], KEYS[1])
redis.call('SELECT', ARGV[1])
redis.call('SET', KEYS[1], KEYS[2])
if ARGV[3] ~= '' then
  redis.call('SELECT', ARGV[3])
  redis.call('SET', KEYS[1], ARGV[5])
end
return {'created'}
"#;

/// Connection settings for [`RedisStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisStoreConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub primary_db: i64,
    pub reverse_db: i64,
    pub timestamp_db: Option<i64>,
}

impl RedisStoreConfig {
    /// `redis://` URL selecting database `db`.
    pub fn connection_url(&self, db: i64) -> Result<String> {
        let mut url = Url::parse(&format!("redis://{}:{}/{}", self.host, self.port, db))
            .map_err(|err| StoreError::Unavailable(format!("invalid redis address: {err}")))?;
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|_| StoreError::Unavailable("cannot embed redis password".into()))?;
        }
        Ok(url.into())
    }

    fn db(&self, namespace: Namespace) -> Option<i64> {
        match namespace {
            Namespace::Primary => Some(self.primary_db),
            Namespace::Reverse => Some(self.reverse_db),
            Namespace::Timestamp => self.timestamp_db,
        }
    }
}

/// Connection to one logical database, established on first use and
/// re-established by the manager afterwards.
struct LazyConnection {
    db: i64,
    client: Client,
    manager: Mutex<Option<ConnectionManager>>,
}

impl LazyConnection {
    fn new(config: &RedisStoreConfig, db: i64) -> Result<Self> {
        let client = Client::open(config.connection_url(db)?.as_str()).map_err(unavailable)?;
        Ok(Self {
            db,
            client,
            manager: Mutex::new(None),
        })
    }

    async fn get(&self) -> Result<ConnectionManager> {
        let mut guard = self.manager.lock().await;
        if let Some(manager) = guard.as_ref() {
            return Ok(manager.clone());
        }
        let manager = ConnectionManager::new_with_backoff(
            self.client.clone(),
            CONNECT_BACKOFF_BASE,
            CONNECT_BACKOFF_FACTOR_MS,
            CONNECT_RETRIES,
        )
        .await
        .map_err(|err| {
            debug!(db = self.db, error = %err, "redis connection attempt failed");
            unavailable(err)
        })?;
        debug!(db = self.db, "connected to redis");
        *guard = Some(manager.clone());
        Ok(manager)
    }
}

/// Registration store backed by Redis logical databases.
#[derive(Clone)]
pub struct RedisStore {
    primary: Arc<LazyConnection>,
    reverse: Arc<LazyConnection>,
    timestamps: Option<Arc<LazyConnection>>,
    config: RedisStoreConfig,
    bind_script: Arc<Script>,
}

impl RedisStore {
    /// Prepare clients for every configured database. No connection is made
    /// until the first operation.
    pub fn new(config: RedisStoreConfig) -> Result<Self> {
        let primary = Arc::new(LazyConnection::new(&config, config.primary_db)?);
        let reverse = Arc::new(LazyConnection::new(&config, config.reverse_db)?);
        let timestamps = config
            .timestamp_db
            .map(|db| LazyConnection::new(&config, db).map(Arc::new))
            .transpose()?;

        info!(
            host = %config.host,
            port = config.port,
            primary_db = config.primary_db,
            reverse_db = config.reverse_db,
            timestamp_db = ?config.timestamp_db,
            "redis store configured"
        );

        Ok(Self {
            primary,
            reverse,
            timestamps,
            config,
            bind_script: Arc::new(Script::new(BIND_SCRIPT)),
        })
    }

    pub fn config(&self) -> &RedisStoreConfig {
        &self.config
    }

    fn connection(&self, namespace: Namespace) -> Result<&LazyConnection> {
        match namespace {
            Namespace::Primary => Ok(&self.primary),
            Namespace::Reverse => Ok(&self.reverse),
            Namespace::Timestamp => self
                .timestamps
                .as_deref()
                .ok_or(StoreError::NamespaceNotConfigured(namespace)),
        }
    }
}

#[async_trait]
impl RegistrationStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    fn has_namespace(&self, namespace: Namespace) -> bool {
        self.config.db(namespace).is_some()
    }

    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection(namespace)?.get().await?;
        let value: Option<String> = conn.get(key).await.map_err(unavailable)?;
        Ok(value)
    }

    async fn bind(&self, request: &BindRequest) -> Result<BindOutcome> {
        let timestamp_db = match (request.registered_at, self.config.timestamp_db) {
            (Some(_), None) => return Err(StoreError::NamespaceNotConfigured(Namespace::Timestamp)),
            (Some(_), Some(db)) => db.to_string(),
            (None, _) => String::new(),
        };
        let registered_at = request
            .registered_at
            .map(|at| at.to_string())
            .unwrap_or_default();

        let mut conn = self.primary.get().await?;
        let reply: Vec<String> = self
            .bind_script
            .key(request.serial.as_str())
            .key(request.code.as_str())
            .arg(self.config.primary_db)
            .arg(self.config.reverse_db)
            .arg(timestamp_db)
            .arg(if request.require_issued { "1" } else { "0" })
            .arg(registered_at)
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;

        parse_bind_reply(reply)
    }

    async fn ping(&self) -> Result<()> {
        let namespaces = [Namespace::Primary, Namespace::Reverse, Namespace::Timestamp];
        for namespace in namespaces.into_iter().filter(|ns| self.has_namespace(*ns)) {
            let mut conn = self.connection(namespace)?.get().await?;
            let _: String = ::redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(unavailable)?;
        }
        Ok(())
    }
}

fn parse_bind_reply(reply: Vec<String>) -> Result<BindOutcome> {
    let mut parts = reply.into_iter();
    match (parts.next().as_deref(), parts.next()) {
        (Some("created"), None) => Ok(BindOutcome::Created),
        (Some("not_issued"), None) => Ok(BindOutcome::NotIssued),
        (Some("bound"), Some(code)) => Ok(BindOutcome::AlreadyBound(code)),
        (Some("code_in_use"), Some(serial)) => Ok(BindOutcome::CodeInUse(serial)),
        (tag, _) => Err(StoreError::UnexpectedReply(format!(
            "bind script returned {tag:?}"
        ))),
    }
}

fn unavailable(err: RedisError) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RedisStoreConfig {
        RedisStoreConfig {
            host: "127.0.0.1".into(),
            port: 6379,
            password: Some("p@ss/word".into()),
            primary_db: 0,
            reverse_db: 1,
            timestamp_db: None,
        }
    }

    #[test]
    fn connection_url_selects_database_and_escapes_password() {
        let url = config().connection_url(3).unwrap();
        assert!(url.starts_with("redis://:p%40ss%2Fword@127.0.0.1:6379/3"));
    }

    #[test]
    fn empty_password_is_omitted() {
        let mut cfg = config();
        cfg.password = Some(String::new());
        assert_eq!(cfg.connection_url(0).unwrap(), "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn timestamp_namespace_follows_config() {
        let mut cfg = config();
        let store = RedisStore::new(cfg.clone()).unwrap();
        assert!(store.has_namespace(Namespace::Reverse));
        assert!(!store.has_namespace(Namespace::Timestamp));

        cfg.timestamp_db = Some(2);
        let store = RedisStore::new(cfg).unwrap();
        assert!(store.has_namespace(Namespace::Timestamp));
    }

    #[test]
    fn bind_replies_are_decoded() {
        assert_eq!(
            parse_bind_reply(vec!["created".into()]).unwrap(),
            BindOutcome::Created
        );
        assert_eq!(
            parse_bind_reply(vec!["bound".into(), "CODE-A".into()]).unwrap(),
            BindOutcome::AlreadyBound("CODE-A".into())
        );
        assert_eq!(
            parse_bind_reply(vec!["not_issued".into()]).unwrap(),
            BindOutcome::NotIssued
        );
        assert_eq!(
            parse_bind_reply(vec!["code_in_use".into(), "SN-A".into()]).unwrap(),
            BindOutcome::CodeInUse("SN-A".into())
        );
        assert!(matches!(
            parse_bind_reply(vec!["bound".into()]),
            Err(StoreError::UnexpectedReply(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_reported_as_unavailable() {
        let mut cfg = config();
        // Port 1 is reserved and refuses connections.
        cfg.port = 1;
        cfg.password = None;
        let store = RedisStore::new(cfg).unwrap();
        let err = store.get(Namespace::Primary, "SN-1").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
