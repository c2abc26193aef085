//! Warehouse receipt models

use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Lifecycle of a warehouse receipt. `Active` is the unlocked state.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "collateral_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CollateralStatus {
    PendingApproval,
    #[serde(alias = "unlocked")]
    Active,
    LockedForLoan,
    InAuction,
    Sold,
    Expired,
    Withdrawn,
}

impl CollateralStatus {
    pub fn is_unlocked(&self) -> bool {
        matches!(self, CollateralStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CollateralStatus::PendingApproval => "pending_approval",
            CollateralStatus::Active => "active",
            CollateralStatus::LockedForLoan => "locked_for_loan",
            CollateralStatus::InAuction => "in_auction",
            CollateralStatus::Sold => "sold",
            CollateralStatus::Expired => "expired",
            CollateralStatus::Withdrawn => "withdrawn",
        }
    }
}

impl std::fmt::Display for CollateralStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Crops accepted for storage
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "crop_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CropType {
    Wheat,
    Rice,
    Cotton,
    Soybean,
    Corn,
    Sugarcane,
    Barley,
    Gram,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "quality_grade")]
pub enum QualityGrade {
    A,
    B,
    C,
}

/// A deposited, appraised lot of produce held by a warehouse
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct CollateralRecord {
    pub whr_id: String,
    /// Farmer who deposited the produce
    pub owner_id: String,
    /// Warehouse manager holding it
    pub custodian_id: String,
    pub warehouse_name: String,
    pub warehouse_location: String,
    pub crop_type: CropType,
    pub variety: String,
    /// Quintals
    pub quantity: Decimal,
    pub quality_grade: QualityGrade,
    pub moisture_content: Option<Decimal>,
    pub estimated_value: i64,
    pub price_per_unit: i64,
    pub storage_charges: i64,
    pub insurance_value: i64,
    pub loan_to_value_ratio: Decimal,
    pub status: CollateralStatus,
    pub loan_id: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub issue_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CollateralRecord {
    /// Receipts are valid for one year from issue
    pub fn expiry_for(issue_date: DateTime<Utc>) -> DateTime<Utc> {
        issue_date
            .checked_add_months(Months::new(12))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date <= now
    }

    /// Unlocked and still within its validity period
    pub fn is_loanable_at(&self, now: DateTime<Utc>) -> bool {
        self.status.is_unlocked() && !self.is_expired_at(now)
    }
}

fn default_storage_months() -> i32 {
    6
}

/// Request to issue a receipt for a deposit
#[derive(Debug, Deserialize, Serialize, Validate, Clone)]
pub struct RegisterCollateralRequest {
    #[validate(length(min = 1, message = "owner_id is required"))]
    pub owner_id: String,
    #[validate(length(min = 1, message = "warehouse_name is required"))]
    pub warehouse_name: String,
    #[validate(length(min = 1, message = "warehouse_location is required"))]
    pub warehouse_location: String,
    pub crop_type: CropType,
    #[validate(length(min = 1, message = "variety is required"))]
    pub variety: String,
    pub quantity: Decimal,
    pub quality_grade: QualityGrade,
    pub moisture_content: Option<Decimal>,
    #[validate(range(min = 1, message = "estimated_value must be positive"))]
    pub estimated_value: i64,
    #[validate(range(min = 1, message = "price_per_unit must be positive"))]
    pub price_per_unit: i64,
    /// Storage fee per quintal per month
    #[serde(default)]
    #[validate(range(min = 0))]
    pub storage_rate: i64,
    #[serde(default = "default_storage_months")]
    #[validate(range(min = 1, max = 60))]
    pub expected_storage_months: i32,
    /// Overrides the platform's default loan-to-value ratio for this receipt
    pub loan_to_value_ratio: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_expiry_is_one_year_after_issue() {
        let issue = Utc.with_ymd_and_hms(2024, 2, 29, 9, 30, 0).unwrap();
        let expiry = CollateralRecord::expiry_for(issue);
        assert_eq!(expiry, Utc.with_ymd_and_hms(2025, 2, 28, 9, 30, 0).unwrap());

        let issue = Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap();
        assert_eq!(
            CollateralRecord::expiry_for(issue),
            Utc.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_unlocked_alias() {
        let status: CollateralStatus = serde_json::from_str("\"unlocked\"").unwrap();
        assert_eq!(status, CollateralStatus::Active);
        assert!(status.is_unlocked());
        assert!(!CollateralStatus::LockedForLoan.is_unlocked());
        assert_eq!(
            serde_json::to_string(&CollateralStatus::LockedForLoan).unwrap(),
            "\"locked_for_loan\""
        );
    }
}
