//! Credit score to risk category mapping
//!
//! Scores nominally range 300-900. Values outside that range are classified by
//! the same thresholds.

use serde::{Deserialize, Serialize};

/// Score at or above which a borrower is low risk
pub const LOW_RISK_MIN_SCORE: i32 = 750;

/// Score at or above which a borrower is medium risk
pub const MEDIUM_RISK_MIN_SCORE: i32 = 650;

/// Score given to borrowers with no recorded history
pub const DEFAULT_CREDIT_SCORE: i32 = 500;

/// Risk category attached to every loan decision
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "risk_category", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RiskCategory {
    Low,
    Medium,
    High,
}

impl RiskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Low => "low",
            RiskCategory::Medium => "medium",
            RiskCategory::High => "high",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RiskCategory::Low => "Strong repayment history, standard terms",
            RiskCategory::Medium => "Acceptable history, monitor repayments",
            RiskCategory::High => "Weak or thin credit history, elevated risk",
        }
    }
}

impl std::fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct RiskClassifier;

impl RiskClassifier {
    pub fn classify(credit_score: i32) -> RiskCategory {
        if credit_score >= LOW_RISK_MIN_SCORE {
            RiskCategory::Low
        } else if credit_score >= MEDIUM_RISK_MIN_SCORE {
            RiskCategory::Medium
        } else {
            RiskCategory::High
        }
    }
}

/// Response body for a risk lookup
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RiskProfile {
    pub credit_score: i32,
    pub risk_category: RiskCategory,
    pub description: String,
}

impl RiskProfile {
    pub fn for_score(credit_score: i32) -> Self {
        let risk_category = RiskClassifier::classify(credit_score);
        Self {
            credit_score,
            risk_category,
            description: risk_category.description().to_string(),
        }
    }
}
