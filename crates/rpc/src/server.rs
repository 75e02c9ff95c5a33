use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use licreg_registry::RegistrationService;
use licreg_types::HealthStatus;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::api::{
    RegisterRequest, RegisterResponse, ReverseRequest, ReverseResponse, ValidateRequest,
    ValidateResponse,
};

#[derive(Clone)]
pub struct AppState {
    pub service: RegistrationService,
    pub start_time: Instant,
    pub req_count: Arc<AtomicUsize>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(service: RegistrationService, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            service,
            start_time: Instant::now(),
            req_count: Arc::new(AtomicUsize::new(0)),
            metrics,
        }
    }

    fn record_request(&self) -> u64 {
        self.req_count.fetch_add(1, Ordering::Relaxed) as u64 + 1
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn timestamps(&self) -> bool {
        self.service.tracks_timestamps()
    }
}

pub type SharedState = Arc<AppState>;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, payload).into_response()
    }
}

/// Serve until the process is stopped.
pub async fn start_server(state: AppState, addr: &str) -> Result<()> {
    start_server_with_shutdown(state, addr, std::future::pending()).await
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn start_server_with_shutdown<F>(state: AppState, addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let shared = Arc::new(state);
    let app = build_router(shared);
    let listener = bind_listener(addr).await?;
    let local = listener
        .local_addr()
        .context("failed to read listener address")?;
    info!("Registration API listening on http://{}", local);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("registration API terminated unexpectedly")
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind API listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind API listener on {addr}"))
    }
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/register", post(handle_register))
        .route("/validate", post(handle_validate))
        .route("/reverse", post(handle_reverse))
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_register(
    State(state): State<SharedState>,
    Json(req): Json<RegisterRequest>,
) -> Json<RegisterResponse> {
    state.record_request();
    debug!(serial = %req.serial_number, "register request");
    let outcome = state
        .service
        .register(&req.serial_number, &req.registration_code)
        .await;
    Json(outcome.into())
}

async fn handle_validate(
    State(state): State<SharedState>,
    Json(req): Json<ValidateRequest>,
) -> Json<ValidateResponse> {
    state.record_request();
    let outcome = state.service.validate(&req.serial_number).await;
    Json(ValidateResponse::from_outcome(outcome, state.timestamps()))
}

async fn handle_reverse(
    State(state): State<SharedState>,
    Json(req): Json<ReverseRequest>,
) -> Json<ReverseResponse> {
    state.record_request();
    let outcome = state.service.reverse(&req.registeration_code).await;
    Json(ReverseResponse::from_outcome(outcome, state.timestamps()))
}

async fn handle_health(State(state): State<SharedState>) -> Json<HealthStatus> {
    let requests_served = state.record_request();
    let store = state.service.store();
    let store_healthy = match store.ping().await {
        Ok(()) => true,
        Err(err) => {
            debug!("health probe failed: {}", err);
            false
        }
    };

    Json(HealthStatus {
        status: HealthStatus::status_label(store_healthy),
        store: store.backend(),
        store_healthy,
        timestamps: state.timestamps(),
        uptime_seconds: state.uptime_seconds(),
        requests_served,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_metrics(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let handle = state
        .metrics
        .as_ref()
        .ok_or_else(|| ApiError::not_found("metrics exporter disabled"))?;

    let mut response = handle.render().into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    Ok(response)
}
