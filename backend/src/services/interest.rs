//! Simple-interest totals and amortized installments
//!
//! Rounding is fixed: interest totals round down, installments round up.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::{LendingError, LendingResult};

const MONTHS_PER_YEAR_TIMES_PERCENT: i64 = 12 * 100;

pub struct InterestCalculator;

impl InterestCalculator {
    /// `floor(principal × rate/100 × tenure/12)`
    pub fn total_interest(
        principal: i64,
        annual_rate_percent: Decimal,
        tenure_months: i32,
    ) -> LendingResult<i64> {
        validate_terms(principal, annual_rate_percent, tenure_months)?;

        Decimal::from(principal)
            .checked_mul(annual_rate_percent)
            .and_then(|v| v.checked_mul(Decimal::from(tenure_months)))
            .and_then(|v| v.checked_div(Decimal::from(MONTHS_PER_YEAR_TIMES_PERCENT)))
            .and_then(|v| v.floor().to_i64())
            .ok_or_else(|| LendingError::Validation("interest computation overflowed".to_string()))
    }

    pub fn total_repayable(principal: i64, total_interest: i64) -> LendingResult<i64> {
        principal
            .checked_add(total_interest)
            .ok_or_else(|| LendingError::Validation("total repayable overflowed".to_string()))
    }

    /// Equal monthly installment, `ceil(P·r·(1+r)^n / ((1+r)^n − 1))` with `r = rate/1200`.
    ///
    /// A zero rate spreads the principal evenly, rounded up.
    pub fn emi_amount(
        principal: i64,
        annual_rate_percent: Decimal,
        tenure_months: i32,
    ) -> LendingResult<i64> {
        validate_terms(principal, annual_rate_percent, tenure_months)?;

        if annual_rate_percent.is_zero() {
            let n = i64::from(tenure_months);
            return Ok((principal + n - 1) / n);
        }

        let monthly_rate = annual_rate_percent
            .to_f64()
            .map(|r| r / MONTHS_PER_YEAR_TIMES_PERCENT as f64)
            .ok_or_else(|| LendingError::Validation("interest rate out of range".to_string()))?;

        let growth = (1.0 + monthly_rate).powi(tenure_months);
        let emi = principal as f64 * monthly_rate * growth / (growth - 1.0);

        if !emi.is_finite() || emi > i64::MAX as f64 {
            return Err(LendingError::Validation(
                "installment computation overflowed".to_string(),
            ));
        }
        Ok(emi.ceil() as i64)
    }
}

fn validate_terms(principal: i64, annual_rate_percent: Decimal, tenure_months: i32) -> LendingResult<()> {
    if principal <= 0 {
        return Err(LendingError::Validation(format!(
            "principal must be positive, got {}",
            principal
        )));
    }
    if tenure_months <= 0 {
        return Err(LendingError::Validation(format!(
            "tenure must be at least one month, got {}",
            tenure_months
        )));
    }
    if annual_rate_percent < Decimal::ZERO {
        return Err(LendingError::Validation(format!(
            "interest rate must not be negative, got {}",
            annual_rate_percent
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_total_interest_reference_values() {
        assert_eq!(
            InterestCalculator::total_interest(100_000, dec!(12), 12).unwrap(),
            12_000
        );
        assert_eq!(
            InterestCalculator::total_interest(70_000, dec!(12), 12).unwrap(),
            8_400
        );
        // 50_000 × 0.12 × 7/12 = 3_500
        assert_eq!(
            InterestCalculator::total_interest(50_000, dec!(12), 7).unwrap(),
            3_500
        );
    }

    #[test]
    fn test_total_interest_rounds_down() {
        // 10_001 × 0.12 × 5/12 = 500.05
        assert_eq!(
            InterestCalculator::total_interest(10_001, dec!(12), 5).unwrap(),
            500
        );
        // 999 × 0.105 × 1/12 = 8.74125
        assert_eq!(
            InterestCalculator::total_interest(999, dec!(10.5), 1).unwrap(),
            8
        );
    }

    #[test]
    fn test_total_repayable() {
        assert_eq!(InterestCalculator::total_repayable(70_000, 8_400).unwrap(), 78_400);
        assert!(InterestCalculator::total_repayable(i64::MAX, 1).is_err());
    }

    #[test]
    fn test_emi_reference_value() {
        assert_eq!(
            InterestCalculator::emi_amount(100_000, dec!(12), 12).unwrap(),
            8_885
        );
    }

    #[test]
    fn test_emi_rounds_up_and_covers_principal() {
        let emi = InterestCalculator::emi_amount(70_000, dec!(12), 6).unwrap();
        assert!(emi * 6 >= 70_000);
        // 70_000 × 0.01 × 1.01^6 / (1.01^6 − 1) ≈ 12_078.4
        assert_eq!(emi, 12_079);
    }

    #[test]
    fn test_emi_zero_rate_spreads_principal() {
        assert_eq!(InterestCalculator::emi_amount(1_200, dec!(0), 12).unwrap(), 100);
        assert_eq!(InterestCalculator::emi_amount(1_000, dec!(0), 3).unwrap(), 334);
    }

    #[test]
    fn test_rejects_bad_terms() {
        assert!(matches!(
            InterestCalculator::total_interest(0, dec!(12), 12),
            Err(LendingError::Validation(_))
        ));
        assert!(matches!(
            InterestCalculator::total_interest(1_000, dec!(12), 0),
            Err(LendingError::Validation(_))
        ));
        assert!(matches!(
            InterestCalculator::emi_amount(1_000, dec!(12), -3),
            Err(LendingError::Validation(_))
        ));
        assert!(matches!(
            InterestCalculator::emi_amount(1_000, dec!(-1), 3),
            Err(LendingError::Validation(_))
        ));
    }
}
