//! Loan Pricing and Risk Classification Tests
//!
//! Covers the pure calculations behind a loan decision: collateral valuation,
//! interest totals, installments and credit-score categories.

use rust_decimal_macros::dec;

use agrivault_server::error::LendingError;
use agrivault_server::services::risk::{RiskProfile, DEFAULT_CREDIT_SCORE};
use agrivault_server::services::{
    InterestCalculator, RiskCategory, RiskClassifier, ValuationPolicy,
};

// ============================================================================
// Valuation Tests
// ============================================================================

#[test]
fn test_default_ratio_eligibility() {
    assert_eq!(ValuationPolicy::default().default_ratio(), dec!(0.70));
    assert_eq!(ValuationPolicy::eligible_for(100_000, dec!(0.70)).unwrap(), 70_000);
}

#[test]
fn test_eligibility_rounds_down() {
    assert_eq!(ValuationPolicy::eligible_for(99_999, dec!(0.70)).unwrap(), 69_999);
    assert_eq!(ValuationPolicy::eligible_for(1, dec!(0.70)).unwrap(), 0);
}

#[test]
fn test_requested_amount_is_capped() {
    assert_eq!(ValuationPolicy::accepted_principal(80_000, 70_000).unwrap(), 70_000);
    assert_eq!(ValuationPolicy::accepted_principal(50_000, 70_000).unwrap(), 50_000);
    assert!(matches!(
        ValuationPolicy::accepted_principal(0, 70_000),
        Err(LendingError::Validation(_))
    ));
    assert!(matches!(
        ValuationPolicy::accepted_principal(10_000, 0),
        Err(LendingError::Validation(_))
    ));
}

#[test]
fn test_ratio_bounds() {
    assert!(ValuationPolicy::new(dec!(1)).is_ok());
    assert!(ValuationPolicy::new(dec!(0)).is_err());
    assert!(ValuationPolicy::new(dec!(1.01)).is_err());
    assert!(ValuationPolicy::eligible_for(0, dec!(0.70)).is_err());
}

// ============================================================================
// Interest Tests
// ============================================================================

#[test]
fn test_simple_interest_totals() {
    assert_eq!(InterestCalculator::total_interest(100_000, dec!(12), 12).unwrap(), 12_000);
    assert_eq!(InterestCalculator::total_interest(70_000, dec!(12), 12).unwrap(), 8_400);
    assert_eq!(InterestCalculator::total_interest(50_000, dec!(12), 24).unwrap(), 12_000);
    assert_eq!(InterestCalculator::total_interest(70_000, dec!(0), 12).unwrap(), 0);
    assert_eq!(InterestCalculator::total_repayable(70_000, 8_400).unwrap(), 78_400);
}

#[test]
fn test_interest_rounds_down() {
    // 1000 × 10% × 1/12 = 8.33
    assert_eq!(InterestCalculator::total_interest(1_000, dec!(10), 1).unwrap(), 8);
}

#[test]
fn test_installments_round_up() {
    assert_eq!(InterestCalculator::emi_amount(100_000, dec!(12), 12).unwrap(), 8_885);
    assert_eq!(InterestCalculator::emi_amount(70_000, dec!(12), 12).unwrap(), 6_220);
    assert_eq!(InterestCalculator::emi_amount(70_000, dec!(0), 12).unwrap(), 5_834);
    assert_eq!(InterestCalculator::emi_amount(1_000, dec!(0), 3).unwrap(), 334);
}

#[test]
fn test_invalid_terms_rejected() {
    assert!(InterestCalculator::total_interest(0, dec!(12), 12).is_err());
    assert!(InterestCalculator::total_interest(70_000, dec!(12), 0).is_err());
    assert!(InterestCalculator::total_interest(70_000, dec!(-1), 12).is_err());
    assert!(InterestCalculator::emi_amount(70_000, dec!(12), -3).is_err());
    assert!(InterestCalculator::total_repayable(i64::MAX, 1).is_err());
}

// ============================================================================
// Risk Category Tests
// ============================================================================

#[test]
fn test_risk_category_low() {
    assert_eq!(RiskClassifier::classify(900), RiskCategory::Low);
    assert_eq!(RiskClassifier::classify(750), RiskCategory::Low);
}

#[test]
fn test_risk_category_medium() {
    assert_eq!(RiskClassifier::classify(749), RiskCategory::Medium);
    assert_eq!(RiskClassifier::classify(650), RiskCategory::Medium);
}

#[test]
fn test_risk_category_high() {
    assert_eq!(RiskClassifier::classify(649), RiskCategory::High);
    assert_eq!(RiskClassifier::classify(300), RiskCategory::High);
    assert_eq!(RiskClassifier::classify(DEFAULT_CREDIT_SCORE), RiskCategory::High);
}

#[test]
fn test_risk_profile_descriptions() {
    for score in [300, 650, 750] {
        let profile = RiskProfile::for_score(score);
        assert_eq!(profile.credit_score, score);
        assert!(!profile.description.is_empty());
    }
}
