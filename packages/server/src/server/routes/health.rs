use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    database: DatabaseHealth,
    connection_pool: ConnectionPoolHealth,
}

#[derive(Serialize)]
pub struct DatabaseHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
pub struct ConnectionPoolHealth {
    size: u32,
    idle_connections: usize,
}

/// Health check endpoint
///
/// Checks database connectivity and reports connection pool utilization.
/// Returns 200 OK when healthy, 503 Service Unavailable otherwise.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let pool = &state.deps.db_pool;

    let database = match sqlx::query("SELECT 1").execute(pool).await {
        Ok(_) => DatabaseHealth {
            status: "ok".to_string(),
            error: None,
        },
        Err(e) => DatabaseHealth {
            status: "error".to_string(),
            error: Some(e.to_string()),
        },
    };

    let healthy = database.status == "ok";

    let response = HealthResponse {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        database,
        connection_pool: ConnectionPoolHealth {
            size: pool.size(),
            idle_connections: pool.num_idle(),
        },
    };

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(response))
}
