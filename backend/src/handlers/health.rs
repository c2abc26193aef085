use axum::{extract::State, Json};

use crate::models::HealthResponse;
use crate::state::AppState;

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (store, database) = match &state.database {
        Some(db) if db.is_healthy().await => ("postgres", "connected"),
        Some(_) => ("postgres", "unreachable"),
        None => ("memory", "not configured"),
    };

    let status = if database == "unreachable" {
        "unhealthy"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        database: database.to_string(),
        store: store.to_string(),
        approval_policy: state.ledger.policy_name().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
