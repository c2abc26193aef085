//! Risk classification route definitions

use axum::{
    routing::{get, put},
    Router,
};

use crate::handlers::risk::{get_risk_profile, update_credit_score};
use crate::state::AppState;

pub fn risk_routes() -> Router<AppState> {
    Router::new()
        .route("/api/risk/:credit_score", get(get_risk_profile))
        .route("/api/borrowers/:id/credit-score", put(update_credit_score))
}
