//! Loan models for AgriVault

use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::collateral::CropType;
use crate::services::risk::DEFAULT_CREDIT_SCORE;
pub use crate::services::RiskCategory;

/// Loan status.
///
/// Happy path: `pending → under_review → approved → disbursed → active → completed`.
/// `rejected` branches off before disbursement, `overdue` off `active`, and
/// `defaulted` off `overdue`.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "loan_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Pending,
    UnderReview,
    Approved,
    Disbursed,
    Active,
    Completed,
    Overdue,
    Defaulted,
    Rejected,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::UnderReview => "under_review",
            LoanStatus::Approved => "approved",
            LoanStatus::Disbursed => "disbursed",
            LoanStatus::Active => "active",
            LoanStatus::Completed => "completed",
            LoanStatus::Overdue => "overdue",
            LoanStatus::Defaulted => "defaulted",
            LoanStatus::Rejected => "rejected",
        }
    }

    /// States from which a loan may still be rejected
    pub fn is_pre_disbursement(&self) -> bool {
        matches!(
            self,
            LoanStatus::Pending | LoanStatus::UnderReview | LoanStatus::Approved
        )
    }

    /// States that accept repayments
    pub fn is_repayable(&self) -> bool {
        matches!(self, LoanStatus::Active | LoanStatus::Overdue)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoanStatus::Completed | LoanStatus::Defaulted | LoanStatus::Rejected
        )
    }

    pub fn can_transition_to(&self, next: LoanStatus) -> bool {
        use LoanStatus::*;
        match (self, next) {
            (Pending, UnderReview) => true,
            (Pending | UnderReview, Approved) => true,
            (Approved, Disbursed) => true,
            (Disbursed, Active) => true,
            (Active | Overdue, Completed) => true,
            (Active, Overdue) => true,
            (Overdue, Defaulted) => true,
            (from, Rejected) => from.is_pre_disbursement(),
            _ => false,
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Default)]
#[sqlx(type_name = "loan_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LoanType {
    #[default]
    LumpSum,
    Emi,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_purpose", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LoanPurpose {
    FarmingInputs,
    FamilyExpenses,
    DebtConsolidation,
    BusinessExpansion,
    Emergency,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Default)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    BankTransfer,
    Upi,
    CreditCard,
    DebitCard,
    NetBanking,
    Cash,
}

/// One entry of a loan's append-only repayment log
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    pub amount: i64,
    pub paid_at: DateTime<Utc>,
    pub method: PaymentMethod,
    pub transaction_id: String,
    pub interest_portion: i64,
    pub principal_portion: i64,
}

/// Borrower as seen by the ledger
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq, Eq)]
pub struct Borrower {
    pub borrower_id: String,
    pub credit_score: i32,
}

impl Borrower {
    /// A borrower with no recorded credit history
    pub fn new(borrower_id: impl Into<String>) -> Self {
        Self {
            borrower_id: borrower_id.into(),
            credit_score: DEFAULT_CREDIT_SCORE,
        }
    }

    pub fn with_credit_score(borrower_id: impl Into<String>, credit_score: i32) -> Self {
        Self {
            borrower_id: borrower_id.into(),
            credit_score,
        }
    }
}

/// A single credit extension against one warehouse receipt
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct LoanRecord {
    pub loan_id: String,
    pub borrower_id: String,
    pub collateral_id: String,

    // Terms
    pub principal_amount: i64,
    /// Annual rate in percent
    pub annual_rate: Decimal,
    pub tenure_months: i32,
    pub total_interest: i64,
    pub total_amount: i64,
    pub emi_amount: Option<i64>,
    pub loan_type: LoanType,

    // Collateral snapshot at application time
    pub collateral_value: i64,
    pub loan_to_value_ratio: Decimal,
    pub crop_type: CropType,
    pub quantity: Decimal,

    // Application
    pub purpose: LoanPurpose,
    pub requested_amount: i64,
    pub status: LoanStatus,
    pub applied_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub disbursement_reference: Option<String>,

    // Risk assessment
    pub credit_score: i32,
    pub risk_category: RiskCategory,
    pub approval_comments: Option<String>,
    pub rejection_reason: Option<String>,

    // Repayment
    pub total_paid: i64,
    pub remaining_amount: i64,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub next_due_date: Option<DateTime<Utc>>,
    #[sqlx(skip)]
    pub payments: Vec<PaymentEvent>,

    pub idempotency_key: Option<String>,
    /// Bumped on every write; stores only accept updates against the version they hold
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoanRecord {
    /// Interest already recovered through payments
    pub fn interest_paid(&self) -> i64 {
        self.payments.iter().map(|p| p.interest_portion).sum()
    }

    pub fn principal_paid(&self) -> i64 {
        self.payments.iter().map(|p| p.principal_portion).sum()
    }

    /// Interest-first allocation: outstanding interest is settled before any
    /// principal. Returns `(interest_portion, principal_portion)`.
    pub fn split_payment(&self, amount: i64) -> (i64, i64) {
        let outstanding_interest = (self.total_interest - self.interest_paid()).max(0);
        let interest_portion = amount.min(outstanding_interest);
        (interest_portion, amount - interest_portion)
    }

    pub fn maturity_date(&self) -> Option<DateTime<Utc>> {
        self.disbursed_at
            .and_then(|d| add_months(d, self.tenure_months))
    }

    /// Due date right after disbursement
    pub fn first_due_date(&self) -> Option<DateTime<Utc>> {
        match self.loan_type {
            LoanType::Emi => self.disbursed_at.and_then(|d| add_months(d, 1)),
            LoanType::LumpSum => self.maturity_date(),
        }
    }

    /// For EMI loans, the month after the last fully covered installment,
    /// capped at maturity. Lump-sum loans keep their maturity date.
    pub fn due_date_after(&self, total_paid: i64) -> Option<DateTime<Utc>> {
        match (self.loan_type, self.emi_amount, self.disbursed_at) {
            (LoanType::Emi, Some(emi), Some(disbursed_at)) if emi > 0 => {
                let covered = total_paid / emi;
                let next_installment = (covered + 1).min(i64::from(self.tenure_months));
                add_months(disbursed_at, next_installment as i32)
            }
            _ => self.next_due_date,
        }
    }
}

fn add_months(at: DateTime<Utc>, months: i32) -> Option<DateTime<Utc>> {
    u32::try_from(months)
        .ok()
        .and_then(|m| at.checked_add_months(Months::new(m)))
}

/// Request to borrow against a warehouse receipt
#[derive(Debug, Deserialize, Serialize, Validate, Clone)]
pub struct ApplyLoanRequest {
    #[validate(length(min = 1, message = "collateral_id is required"))]
    pub collateral_id: String,
    pub requested_amount: i64,
    pub purpose: LoanPurpose,
    #[validate(range(min = 1, max = 360, message = "tenure_months must be between 1 and 360"))]
    pub tenure_months: i32,
    /// Annual rate in percent; the ledger default applies when omitted
    pub annual_rate: Option<Decimal>,
    #[serde(default)]
    pub loan_type: LoanType,
    /// Retrying with the same key returns the loan created by the first attempt
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: Option<String>,
}

/// Request to record a repayment
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RepayLoanRequest {
    pub amount: i64,
    #[serde(default)]
    pub method: PaymentMethod,
    /// External payment reference; a `TXN` id is minted when absent
    pub transaction_id: Option<String>,
}

impl RepayLoanRequest {
    pub fn new(amount: i64) -> Self {
        Self {
            amount,
            method: PaymentMethod::default(),
            transaction_id: None,
        }
    }
}

/// Result of a repayment
#[derive(Debug, Serialize, Clone)]
pub struct RepaymentOutcome {
    pub loan_id: String,
    pub remaining_amount: i64,
    pub status: LoanStatus,
    pub payment: PaymentEvent,
}

#[derive(Debug, Deserialize, Default)]
pub struct ApproveLoanRequest {
    pub comments: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectLoanRequest {
    #[validate(length(min = 1, message = "reason is required"))]
    pub reason: String,
}
