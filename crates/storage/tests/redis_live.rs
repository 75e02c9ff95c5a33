//! Runs against a real Redis server. Enable with
//! `--features integration-tests` and point `LICREG_TEST_REDIS_HOST` /
//! `LICREG_TEST_REDIS_PORT` at a disposable instance.

#![cfg(feature = "integration-tests")]

use licreg_storage::{
    BindOutcome, BindRequest, Namespace, RedisStore, RedisStoreConfig, RegistrationStore,
};
use licreg_types::{RegistrationCode, RegistrationTime, SerialNumber};
use std::time::{SystemTime, UNIX_EPOCH};

fn live_config() -> RedisStoreConfig {
    RedisStoreConfig {
        host: std::env::var("LICREG_TEST_REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
        port: std::env::var("LICREG_TEST_REDIS_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(6379),
        password: std::env::var("LICREG_TEST_REDIS_PASSWORD").ok(),
        primary_db: 13,
        reverse_db: 14,
        timestamp_db: Some(15),
    }
}

fn unique(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{prefix}-{nanos}")
}

#[tokio::test]
async fn bind_script_writes_every_database() {
    let store = RedisStore::new(live_config()).expect("config");
    store.ping().await.expect("redis reachable");

    let serial = unique("SN");
    let code = unique("CODE");
    let request = BindRequest {
        serial: SerialNumber::parse(serial.clone()).unwrap(),
        code: RegistrationCode::parse(code.clone()).unwrap(),
        registered_at: RegistrationTime::parse("2024-05-06 07:08:09"),
        require_issued: false,
    };

    assert_eq!(store.bind(&request).await.unwrap(), BindOutcome::Created);
    assert_eq!(
        store.bind(&request).await.unwrap(),
        BindOutcome::AlreadyBound(code.clone())
    );

    assert_eq!(
        store.get(Namespace::Primary, &serial).await.unwrap(),
        Some(code.clone())
    );
    assert_eq!(
        store.get(Namespace::Reverse, &code).await.unwrap(),
        Some(serial.clone())
    );
    assert_eq!(
        store.get(Namespace::Timestamp, &serial).await.unwrap().as_deref(),
        Some("2024-05-06 07:08:09")
    );
}

#[tokio::test]
async fn issued_only_bind_rejects_unknown_serial() {
    let store = RedisStore::new(live_config()).expect("config");
    let request = BindRequest {
        serial: SerialNumber::parse(unique("SN")).unwrap(),
        code: RegistrationCode::parse(unique("CODE")).unwrap(),
        registered_at: None,
        require_issued: true,
    };
    assert_eq!(store.bind(&request).await.unwrap(), BindOutcome::NotIssued);
}

#[tokio::test]
async fn bind_script_refuses_code_owned_by_another_serial() {
    let store = RedisStore::new(live_config()).expect("config");
    let code = unique("CODE");
    let first = unique("SN-A");
    let bind = |serial: &str| BindRequest {
        serial: SerialNumber::parse(serial).unwrap(),
        code: RegistrationCode::parse(code.clone()).unwrap(),
        registered_at: None,
        require_issued: false,
    };

    assert_eq!(store.bind(&bind(&first)).await.unwrap(), BindOutcome::Created);
    let second = unique("SN-B");
    assert_eq!(
        store.bind(&bind(&second)).await.unwrap(),
        BindOutcome::CodeInUse(first.clone())
    );
    assert_eq!(store.get(Namespace::Primary, &second).await.unwrap(), None);
    assert_eq!(
        store.get(Namespace::Reverse, &code).await.unwrap(),
        Some(first)
    );
}
