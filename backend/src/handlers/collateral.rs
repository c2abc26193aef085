use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::collateral::{
    CollateralRecord, CollateralService, CollateralStatus, RegisterCollateralRequest,
};
use crate::error::ApiError;
use crate::middleware::{Caller, StaffUser};
use crate::models::ApiResponse;

#[derive(Debug, Serialize)]
pub struct EligibilityResponse {
    pub collateral_id: String,
    pub estimated_value: i64,
    pub loan_to_value_ratio: Decimal,
    pub eligible_amount: i64,
    pub status: String,
    /// Unlocked and unexpired, so a loan may be drawn now
    pub loanable: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListCollateralQuery {
    pub status: Option<CollateralStatus>,
}

/// POST /api/collateral - Issue a warehouse receipt
pub async fn register_collateral(
    State(service): State<Arc<CollateralService>>,
    StaffUser(manager): StaffUser,
    Json(request): Json<RegisterCollateralRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CollateralRecord>>), ApiError> {
    let record = service.register(&manager.user_id, request).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(record))))
}

/// GET /api/collateral - Receipts the caller owns, or issued when staff
pub async fn list_collateral(
    State(service): State<Arc<CollateralService>>,
    caller: Caller,
    Query(query): Query<ListCollateralQuery>,
) -> Result<Json<ApiResponse<Vec<CollateralRecord>>>, ApiError> {
    let records = if caller.role.is_staff() {
        service.list_issued_by(&caller.user_id, query.status).await?
    } else {
        service.list_for_owner(&caller.user_id, query.status).await?
    };

    Ok(Json(ApiResponse::ok(records)))
}

/// GET /api/collateral/:id
pub async fn get_collateral(
    State(service): State<Arc<CollateralService>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<CollateralRecord>>, ApiError> {
    let record = service.get_collateral(&id).await?;
    ensure_can_view(&caller, &record)?;

    Ok(Json(ApiResponse::ok(record)))
}

/// GET /api/collateral/:id/eligibility - Amount that may be borrowed against the receipt
pub async fn get_collateral_eligibility(
    State(service): State<Arc<CollateralService>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<EligibilityResponse>>, ApiError> {
    let record = service.get_collateral(&id).await?;
    ensure_can_view(&caller, &record)?;
    let eligible_amount = service.eligible_amount(&id).await?;
    let loanable = record.is_loanable_at(Utc::now());

    Ok(Json(ApiResponse::ok(EligibilityResponse {
        collateral_id: record.whr_id,
        estimated_value: record.estimated_value,
        loan_to_value_ratio: record.loan_to_value_ratio,
        eligible_amount,
        status: record.status.to_string(),
        loanable,
    })))
}

fn ensure_can_view(caller: &Caller, record: &CollateralRecord) -> Result<(), ApiError> {
    if caller.role.is_staff() || caller.user_id == record.owner_id {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "collateral {} does not belong to {}",
            record.whr_id, caller.user_id
        )))
    }
}
