//! Collateral route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn collateral_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/collateral",
            get(list_collateral).post(register_collateral),
        )
        .route("/api/collateral/:id", get(get_collateral))
        .route(
            "/api/collateral/:id/eligibility",
            get(get_collateral_eligibility),
        )
}
