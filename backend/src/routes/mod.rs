//! Route definitions for AgriVault API

mod collateral;
mod loan;
mod risk;

pub use collateral::collateral_routes;
pub use loan::loan_routes;
pub use risk::risk_routes;

use axum::{routing::get, Router};

use crate::handlers::health_check;
use crate::middleware::request_tracing;
use crate::state::AppState;

/// Every API route with request tracing, bound to `state`
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(collateral_routes())
        .merge(loan_routes())
        .merge(risk_routes())
        .with_state(state)
        .layer(axum::middleware::from_fn(request_tracing))
}
