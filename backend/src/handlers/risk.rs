//! Risk classification API handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::error::ApiError;
use crate::loan::Borrower;
use crate::middleware::StaffUser;
use crate::models::ApiResponse;
use crate::services::risk::RiskProfile;
use crate::store::BorrowerStore;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCreditScoreRequest {
    #[validate(range(min = 300, max = 900, message = "credit_score must be between 300 and 900"))]
    pub credit_score: i32,
}

/// GET /api/risk/:credit_score - Classify a credit score
pub async fn get_risk_profile(
    Path(credit_score): Path<i32>,
) -> Result<Json<ApiResponse<RiskProfile>>, ApiError> {
    Ok(Json(ApiResponse::ok(RiskProfile::for_score(credit_score))))
}

/// PUT /api/borrowers/:id/credit-score - Record a borrower's credit score
pub async fn update_credit_score(
    State(borrowers): State<Arc<dyn BorrowerStore>>,
    StaffUser(staff): StaffUser,
    Path(borrower_id): Path<String>,
    Json(request): Json<UpdateCreditScoreRequest>,
) -> Result<Json<ApiResponse<RiskProfile>>, ApiError> {
    request.validate()?;

    let borrower = Borrower::with_credit_score(borrower_id, request.credit_score);
    borrowers.upsert_borrower(&borrower).await?;

    tracing::info!(
        borrower_id = %borrower.borrower_id,
        credit_score = borrower.credit_score,
        updated_by = %staff.user_id,
        "Credit score updated"
    );
    Ok(Json(ApiResponse::ok(RiskProfile::for_score(borrower.credit_score))))
}
