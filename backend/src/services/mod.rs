//! Pure lending calculators for AgriVault
//!
//! Nothing in here touches storage: valuation, interest, risk classification
//! and identifier minting are plain functions over their inputs.

pub mod identifier;
pub mod interest;
pub mod risk;
pub mod valuation;

pub use identifier::{IdentifierKind, IdentifierMinter};
pub use interest::InterestCalculator;
pub use risk::{RiskCategory, RiskClassifier};
pub use valuation::ValuationPolicy;
