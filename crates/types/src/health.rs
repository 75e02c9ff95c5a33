use serde::Serialize;

/// Payload returned by `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub store: &'static str,
    pub store_healthy: bool,
    pub timestamps: bool,
    pub uptime_seconds: u64,
    pub requests_served: u64,
    pub version: String,
}

impl HealthStatus {
    pub fn status_label(store_healthy: bool) -> &'static str {
        if store_healthy {
            "ok"
        } else {
            "degraded"
        }
    }
}
