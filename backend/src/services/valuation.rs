//! Loan-to-value valuation of warehouse receipts

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::collateral::CollateralRecord;
use crate::error::{LendingError, LendingResult};

/// Share of the appraised value that may be lent when a receipt names no ratio
pub const DEFAULT_LOAN_TO_VALUE_RATIO: Decimal = dec!(0.70);

/// Derives the loanable value of a collateral record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValuationPolicy {
    default_ratio: Decimal,
}

impl Default for ValuationPolicy {
    fn default() -> Self {
        Self {
            default_ratio: DEFAULT_LOAN_TO_VALUE_RATIO,
        }
    }
}

impl ValuationPolicy {
    pub fn new(default_ratio: Decimal) -> LendingResult<Self> {
        validate_ratio(default_ratio)?;
        Ok(Self { default_ratio })
    }

    /// Ratio stamped on newly registered receipts
    pub fn default_ratio(&self) -> Decimal {
        self.default_ratio
    }

    /// `floor(estimated_value × loan_to_value_ratio)` of the given record
    pub fn eligible_amount(&self, collateral: &CollateralRecord) -> LendingResult<i64> {
        Self::eligible_for(collateral.estimated_value, collateral.loan_to_value_ratio)
    }

    pub fn eligible_for(estimated_value: i64, ratio: Decimal) -> LendingResult<i64> {
        if estimated_value <= 0 {
            return Err(LendingError::Validation(format!(
                "estimated value must be positive, got {}",
                estimated_value
            )));
        }
        validate_ratio(ratio)?;

        Decimal::from(estimated_value)
            .checked_mul(ratio)
            .and_then(|v| v.floor().to_i64())
            .ok_or_else(|| {
                LendingError::Validation(format!(
                    "eligible amount overflows for value {} at ratio {}",
                    estimated_value, ratio
                ))
            })
    }

    /// Caps a requested amount at the eligible amount.
    pub fn accepted_principal(requested_amount: i64, eligible_amount: i64) -> LendingResult<i64> {
        if requested_amount <= 0 {
            return Err(LendingError::Validation(format!(
                "requested amount must be positive, got {}",
                requested_amount
            )));
        }
        let principal = requested_amount.min(eligible_amount);
        if principal <= 0 {
            return Err(LendingError::Validation(
                "collateral value supports no principal".to_string(),
            ));
        }
        Ok(principal)
    }
}

/// Ratios must lie in `(0, 1]`
pub fn validate_ratio(ratio: Decimal) -> LendingResult<()> {
    if ratio <= Decimal::ZERO || ratio > Decimal::ONE {
        return Err(LendingError::Validation(format!(
            "loan-to-value ratio must be in (0, 1], got {}",
            ratio
        )));
    }
    Ok(())
}
