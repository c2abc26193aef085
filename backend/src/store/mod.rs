//! Persistence collaborators for the lending engine
//!
//! Every mutation the engine performs goes through one of these traits as a
//! single conditional write, so per-entity updates are linearized by the store:
//!
//! - collateral locks are compare-and-swap on the receipt status;
//! - loan updates are compare-and-swap on the record `version`, and commit
//!   the appended payment and any collateral release in the same unit.
//!
//! Two backends are provided: [`MemoryStore`] for tests and local runs, and
//! [`PgStore`] on PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::collateral::{CollateralRecord, CollateralStatus};
use crate::error::StoreError;
use crate::loan::{Borrower, LoanRecord, PaymentEvent};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Receipt listing criteria; unset fields match everything
#[derive(Debug, Default, Clone)]
pub struct CollateralFilter {
    pub owner_id: Option<String>,
    pub custodian_id: Option<String>,
    pub status: Option<CollateralStatus>,
}

impl CollateralFilter {
    pub fn owned_by(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: Some(owner_id.into()),
            ..Self::default()
        }
    }

    pub fn issued_by(custodian_id: impl Into<String>) -> Self {
        Self {
            custodian_id: Some(custodian_id.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: Option<CollateralStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn matches(&self, record: &CollateralRecord) -> bool {
        self.owner_id.as_deref().map_or(true, |id| record.owner_id == id)
            && self
                .custodian_id
                .as_deref()
                .map_or(true, |id| record.custodian_id == id)
            && self.status.map_or(true, |status| record.status == status)
    }
}

/// Writes committed together with a loan update
#[derive(Debug, Default, Clone, Copy)]
pub struct LoanUpdate<'a> {
    /// Payment appended to the history. Its `transaction_id` must be unused.
    pub payment: Option<&'a PaymentEvent>,
    /// Returns the loan's collateral to `active` if this loan holds the lock
    pub release_collateral: bool,
}

impl<'a> LoanUpdate<'a> {
    pub fn payment(payment: &'a PaymentEvent) -> Self {
        Self {
            payment: Some(payment),
            release_collateral: false,
        }
    }

    pub fn releasing_collateral(mut self, release: bool) -> Self {
        self.release_collateral = release;
        self
    }
}

#[async_trait]
pub trait CollateralStore: Send + Sync {
    /// Fails with `DuplicateKey` if the `whr_id` is taken
    async fn insert_collateral(&self, record: &CollateralRecord) -> StoreResult<()>;

    async fn find_collateral(&self, whr_id: &str) -> StoreResult<Option<CollateralRecord>>;

    /// Newest first
    async fn list_collateral(&self, filter: &CollateralFilter) -> StoreResult<Vec<CollateralRecord>>;

    /// Moves the receipt to `locked_for_loan` only if it is currently `active`.
    /// Returns whether the lock was taken.
    async fn lock_collateral(
        &self,
        whr_id: &str,
        loan_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Returns a `locked_for_loan` receipt to `active`. With `loan_id` set,
    /// only a lock held by that loan is released. Returns whether anything changed.
    async fn release_collateral(
        &self,
        whr_id: &str,
        loan_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait LoanStore: Send + Sync {
    /// Fails with `DuplicateKey` if the `loan_id`, or the borrower's
    /// idempotency key, is taken
    async fn insert_loan(&self, loan: &LoanRecord) -> StoreResult<()>;

    /// Loads the loan with its payment history
    async fn find_loan(&self, loan_id: &str) -> StoreResult<Option<LoanRecord>>;

    async fn find_loan_by_idempotency_key(
        &self,
        borrower_id: &str,
        key: &str,
    ) -> StoreResult<Option<LoanRecord>>;

    /// Newest first
    async fn list_loans(&self, borrower_id: &str) -> StoreResult<Vec<LoanRecord>>;

    /// Replaces the stored loan with `loan` only if the stored version is
    /// `expected_version`, together with the writes in `update`. Either all of
    /// it is applied or none. Returns whether the write happened.
    ///
    /// Fails with `DuplicateKey` if the appended payment's `transaction_id`
    /// or the loan's `disbursement_reference` is already recorded.
    async fn update_loan(
        &self,
        loan: &LoanRecord,
        expected_version: i64,
        update: LoanUpdate<'_>,
    ) -> StoreResult<bool>;

    /// Removes a loan that never left the application stage
    async fn delete_loan(&self, loan_id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait BorrowerStore: Send + Sync {
    async fn find_borrower(&self, borrower_id: &str) -> StoreResult<Option<Borrower>>;

    async fn upsert_borrower(&self, borrower: &Borrower) -> StoreResult<()>;
}
