//! Collateralized loans
//!
//! Contains the loan record model, the approval policies and the ledger that
//! drives a loan through its lifecycle.

pub mod ledger;
pub mod model;
pub mod policy;

pub use ledger::LoanLedger;
pub use model::*;
pub use policy::{
    policy_for, ApprovalDecision, ApprovalPolicy, AutoApprovalPolicy, ManualReviewPolicy,
};
