use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::error::ApiError;
use crate::loan::{
    ApplyLoanRequest, ApproveLoanRequest, Borrower, LoanLedger, LoanRecord, RejectLoanRequest,
    RepayLoanRequest, RepaymentOutcome,
};
use crate::middleware::{Caller, StaffUser};
use crate::models::ApiResponse;
use crate::state::AppState;

/// POST /api/loans - Apply for a loan against a warehouse receipt
pub async fn apply_loan(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<ApplyLoanRequest>,
) -> Result<(StatusCode, Json<ApiResponse<LoanRecord>>), ApiError> {
    request.validate()?;

    let borrower = state
        .borrowers
        .find_borrower(&caller.user_id)
        .await?
        .unwrap_or_else(|| Borrower::new(caller.user_id.as_str()));

    let loan = state.ledger.apply(&borrower, request).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(loan))))
}

/// GET /api/loans - Loans of the caller, newest first
pub async fn list_loans(
    State(ledger): State<Arc<LoanLedger>>,
    caller: Caller,
) -> Result<Json<ApiResponse<Vec<LoanRecord>>>, ApiError> {
    let loans = ledger.list_loans(&caller.user_id).await?;

    Ok(Json(ApiResponse::ok(loans)))
}

/// GET /api/loans/:id
pub async fn get_loan(
    State(ledger): State<Arc<LoanLedger>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<LoanRecord>>, ApiError> {
    let loan = if caller.role.is_staff() {
        ledger.find_loan(&id).await?
    } else {
        ledger.get_loan(&caller.user_id, &id).await?
    };

    Ok(Json(ApiResponse::ok(loan)))
}

/// POST /api/loans/:id/repay
pub async fn repay_loan(
    State(ledger): State<Arc<LoanLedger>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(request): Json<RepayLoanRequest>,
) -> Result<Json<ApiResponse<RepaymentOutcome>>, ApiError> {
    let outcome = ledger.repay(&caller.user_id, &id, request).await?;

    Ok(Json(ApiResponse::ok(outcome)))
}

/// POST /api/loans/:id/review
pub async fn submit_loan_for_review(
    State(ledger): State<Arc<LoanLedger>>,
    _staff: StaffUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<LoanRecord>>, ApiError> {
    Ok(Json(ApiResponse::ok(ledger.submit_for_review(&id).await?)))
}

/// POST /api/loans/:id/approve - Approve and lock the collateral
pub async fn approve_loan(
    State(ledger): State<Arc<LoanLedger>>,
    StaffUser(staff): StaffUser,
    Path(id): Path<String>,
    request: Option<Json<ApproveLoanRequest>>,
) -> Result<Json<ApiResponse<LoanRecord>>, ApiError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let loan = ledger.approve(&id, request.comments).await?;

    tracing::info!(loan_id = %id, approved_by = %staff.user_id, "Loan approved by staff");
    Ok(Json(ApiResponse::ok(loan)))
}

/// POST /api/loans/:id/disburse
pub async fn disburse_loan(
    State(ledger): State<Arc<LoanLedger>>,
    _staff: StaffUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<LoanRecord>>, ApiError> {
    Ok(Json(ApiResponse::ok(ledger.disburse(&id).await?)))
}

/// POST /api/loans/:id/activate
pub async fn activate_loan(
    State(ledger): State<Arc<LoanLedger>>,
    _staff: StaffUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<LoanRecord>>, ApiError> {
    Ok(Json(ApiResponse::ok(ledger.activate(&id).await?)))
}

/// POST /api/loans/:id/reject
pub async fn reject_loan(
    State(ledger): State<Arc<LoanLedger>>,
    StaffUser(staff): StaffUser,
    Path(id): Path<String>,
    Json(request): Json<RejectLoanRequest>,
) -> Result<Json<ApiResponse<LoanRecord>>, ApiError> {
    request.validate()?;
    let loan = ledger.reject(&id, &request.reason).await?;

    tracing::info!(loan_id = %id, rejected_by = %staff.user_id, "Loan rejected by staff");
    Ok(Json(ApiResponse::ok(loan)))
}

/// POST /api/loans/:id/overdue
pub async fn mark_loan_overdue(
    State(ledger): State<Arc<LoanLedger>>,
    _staff: StaffUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<LoanRecord>>, ApiError> {
    Ok(Json(ApiResponse::ok(ledger.mark_overdue(&id).await?)))
}

/// POST /api/loans/:id/default
pub async fn mark_loan_defaulted(
    State(ledger): State<Arc<LoanLedger>>,
    _staff: StaffUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<LoanRecord>>, ApiError> {
    Ok(Json(ApiResponse::ok(ledger.mark_defaulted(&id).await?)))
}
