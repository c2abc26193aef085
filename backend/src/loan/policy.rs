//! Approval policies decide what happens to a loan right after it is created

use std::fmt::Debug;
use std::sync::Arc;

use crate::config::ApprovalMode;
use crate::loan::LoanRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Approve, disburse and activate in the same request
    Approve { comments: Option<String> },
    /// Leave the loan in `under_review` for an underwriter
    HoldForReview,
}

pub trait ApprovalPolicy: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    fn evaluate(&self, loan: &LoanRecord) -> ApprovalDecision;
}

/// Approves every application on the spot
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprovalPolicy;

impl ApprovalPolicy for AutoApprovalPolicy {
    fn name(&self) -> &'static str {
        "auto"
    }

    fn evaluate(&self, loan: &LoanRecord) -> ApprovalDecision {
        ApprovalDecision::Approve {
            comments: Some(format!(
                "Auto-approved, {} risk (credit score {})",
                loan.risk_category, loan.credit_score
            )),
        }
    }
}

/// Routes every application to manual underwriting
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualReviewPolicy;

impl ApprovalPolicy for ManualReviewPolicy {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn evaluate(&self, _loan: &LoanRecord) -> ApprovalDecision {
        ApprovalDecision::HoldForReview
    }
}

pub fn policy_for(mode: ApprovalMode) -> Arc<dyn ApprovalPolicy> {
    match mode {
        ApprovalMode::Auto => Arc::new(AutoApprovalPolicy),
        ApprovalMode::Manual => Arc::new(ManualReviewPolicy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_for_mode() {
        assert_eq!(policy_for(ApprovalMode::Auto).name(), "auto");
        assert_eq!(policy_for(ApprovalMode::Manual).name(), "manual");
    }
}
