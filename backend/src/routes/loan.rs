//! Loan route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn loan_routes() -> Router<AppState> {
    Router::new()
        .route("/api/loans", post(apply_loan).get(list_loans))
        .route("/api/loans/:id", get(get_loan))
        .route("/api/loans/:id/repay", post(repay_loan))
        .route("/api/loans/:id/review", post(submit_loan_for_review))
        .route("/api/loans/:id/approve", post(approve_loan))
        .route("/api/loans/:id/disburse", post(disburse_loan))
        .route("/api/loans/:id/activate", post(activate_loan))
        .route("/api/loans/:id/reject", post(reject_loan))
        .route("/api/loans/:id/overdue", post(mark_loan_overdue))
        .route("/api/loans/:id/default", post(mark_loan_defaulted))
}
