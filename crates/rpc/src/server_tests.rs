//! Router-level tests for the registration endpoints.

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use licreg_registry::{RegistrationService, RegistryConfig};
    use licreg_storage::{MemoryStore, Namespace};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::server::{build_router, AppState};

    fn create_test_state(store: &MemoryStore) -> AppState {
        let service = RegistrationService::new(Arc::new(store.clone()), RegistryConfig::default());
        AppState::new(service, None)
    }

    async fn post_json(state: &AppState, uri: &str, body: Value) -> (StatusCode, Value) {
        let app = build_router(Arc::new(state.clone()));
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        let response = app.oneshot(request).await.expect("router response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn get(state: &AppState, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
        let app = build_router(Arc::new(state.clone()));
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("router response");
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        (status, content_type, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_activation_scenario_over_http() {
        let store = MemoryStore::new(false);
        let state = create_test_state(&store);

        let (status, body) = post_json(
            &state,
            "/register",
            json!({"serial_number": "SN-001", "registration_code": "CODE-A"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"verified": true, "error": null}));

        let (_, body) = post_json(&state, "/validate", json!({"serial_number": "SN-001"})).await;
        assert_eq!(
            body,
            json!({"used": true, "error": null, "regkey": "CODE-A"})
        );

        let (_, body) =
            post_json(&state, "/reverse", json!({"registeration_code": "CODE-A"})).await;
        assert_eq!(body, json!({"serial_number": "SN-001", "error": null}));

        let (status, body) = post_json(
            &state,
            "/register",
            json!({"serial_number": "SN-001", "registration_code": "CODE-B"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"verified": false, "error": "Already registered"})
        );
    }

    #[tokio::test]
    async fn test_timestamp_fields_present_when_tracked() {
        let store = MemoryStore::new(true);
        store.insert(Namespace::Primary, "SN-T", "CODE-T");
        store.insert(Namespace::Reverse, "CODE-T", "SN-T");
        store.insert(Namespace::Timestamp, "SN-T", "2024-02-03 04:05:06");
        let state = create_test_state(&store);

        let (_, body) = post_json(&state, "/validate", json!({"serial_number": "SN-T"})).await;
        assert_eq!(body["regtime"], json!("2024-02-03 04:05:06"));

        let (_, body) =
            post_json(&state, "/reverse", json!({"registeration_code": "CODE-T"})).await;
        assert_eq!(body["register_time"], json!("2024-02-03 04:05:06"));

        let (_, body) =
            post_json(&state, "/reverse", json!({"registeration_code": "CODE-NONE"})).await;
        assert_eq!(
            body,
            json!({"serial_number": null, "error": null, "register_time": null})
        );
    }

    #[tokio::test]
    async fn test_unknown_serial_validate_is_business_error() {
        let store = MemoryStore::new(true);
        let state = create_test_state(&store);

        let (status, body) =
            post_json(&state, "/validate", json!({"serial_number": "SN-UNKNOWN"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "used": false,
                "error": "Invalid Registeration code!",
                "regkey": null,
                "regtime": null
            })
        );
    }

    #[tokio::test]
    async fn test_backend_outage_still_returns_ok_status() {
        let store = MemoryStore::new(false);
        store.set_unavailable(true);
        let state = create_test_state(&store);

        let (status, body) = post_json(
            &state,
            "/register",
            json!({"serial_number": "SN-1", "registration_code": "CODE-1"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"verified": false, "error": "Failed to connect backend DB"})
        );

        let (status, body) = post_json(&state, "/validate", json!({"serial_number": "SN-1"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], json!("Failed to connect backend DB"));
        assert_eq!(body["used"], json!(false));

        let (status, body) =
            post_json(&state, "/reverse", json!({"registeration_code": "CODE-1"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"serial_number": null, "error": "Failed to connect backend DB"})
        );
    }

    #[tokio::test]
    async fn test_missing_fields_are_rejected_by_extractor() {
        let store = MemoryStore::new(false);
        let state = create_test_state(&store);

        let (status, _) = post_json(&state, "/register", json!({"serial_number": "SN-1"})).await;
        assert!(status.is_client_error());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_health_reports_store_state() {
        let store = MemoryStore::new(true);
        let state = create_test_state(&store);

        let (status, _, bytes) = get(&state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], json!("ok"));
        assert_eq!(body["store"], json!("memory"));
        assert_eq!(body["timestamps"], json!(true));

        store.set_unavailable(true);
        let (_, _, bytes) = get(&state, "/health").await;
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], json!("degraded"));
        assert_eq!(body["store_healthy"], json!(false));
    }

    #[tokio::test]
    async fn test_metrics_endpoint_follows_exporter() {
        let store = MemoryStore::new(false);
        let disabled = create_test_state(&store);
        let (status, _, _) = get(&disabled, "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let handle = PrometheusBuilder::new().build_recorder().handle();
        let mut enabled = create_test_state(&store);
        enabled.metrics = Some(handle);
        let (status, content_type, _) = get(&enabled, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("text/plain; version=0.0.4"));
    }
}
