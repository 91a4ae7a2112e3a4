use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::api::middleware::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub dependencies: DependencyStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub database: ServiceHealth,
    pub object_storage: ServiceHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    pub response_time_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    fn from_check<E: std::fmt::Display>(started: Instant, result: Result<(), E>) -> Self {
        let response_time_ms = started.elapsed().as_millis();
        match result {
            Ok(()) => ServiceHealth {
                status: "healthy".to_string(),
                response_time_ms,
                error: None,
            },
            Err(e) => ServiceHealth {
                status: "unhealthy".to_string(),
                response_time_ms,
                error: Some(e.to_string()),
            },
        }
    }

    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Health check endpoint
/// Returns 200 if all dependencies are healthy, 503 if any are down
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = Instant::now();

    let db_start = Instant::now();
    let database = ServiceHealth::from_check(db_start, state.repos.health.ping().await);

    let storage_start = Instant::now();
    let object_storage = ServiceHealth::from_check(storage_start, state.storage.ping().await);

    let all_healthy = database.is_healthy() && object_storage.is_healthy();

    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dependencies: DependencyStatus {
            database,
            object_storage,
        },
    };

    tracing::info!(
        status = %response.status,
        duration_ms = start.elapsed().as_millis(),
        "Health check completed"
    );

    (status_code, Json(response))
}
