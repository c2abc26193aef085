//! Process-local store backed by hash maps

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{BorrowerStore, CollateralFilter, CollateralStore, LoanStore, LoanUpdate, StoreResult};
use crate::collateral::{CollateralRecord, CollateralStatus};
use crate::error::StoreError;
use crate::loan::{Borrower, LoanRecord};

/// In-memory store. State is lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    collateral: RwLock<HashMap<String, CollateralRecord>>,
    loans: RwLock<HashMap<String, LoanRecord>>,
    borrowers: RwLock<HashMap<String, Borrower>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CollateralStore for MemoryStore {
    async fn insert_collateral(&self, record: &CollateralRecord) -> StoreResult<()> {
        let mut collateral = self.collateral.write().await;
        if collateral.contains_key(&record.whr_id) {
            return Err(StoreError::DuplicateKey(format!("whr_id {}", record.whr_id)));
        }
        collateral.insert(record.whr_id.clone(), record.clone());
        Ok(())
    }

    async fn find_collateral(&self, whr_id: &str) -> StoreResult<Option<CollateralRecord>> {
        Ok(self.collateral.read().await.get(whr_id).cloned())
    }

    async fn list_collateral(&self, filter: &CollateralFilter) -> StoreResult<Vec<CollateralRecord>> {
        let mut records: Vec<CollateralRecord> = self
            .collateral
            .read()
            .await
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn lock_collateral(
        &self,
        whr_id: &str,
        loan_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut collateral = self.collateral.write().await;
        match collateral.get_mut(whr_id) {
            Some(record) if record.status == CollateralStatus::Active => {
                record.status = CollateralStatus::LockedForLoan;
                record.loan_id = Some(loan_id.to_string());
                record.locked_at = Some(at);
                record.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_collateral(
        &self,
        whr_id: &str,
        loan_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut collateral = self.collateral.write().await;
        Ok(collateral
            .get_mut(whr_id)
            .map_or(false, |record| release_lock(record, loan_id, at)))
    }
}

#[async_trait]
impl LoanStore for MemoryStore {
    async fn insert_loan(&self, loan: &LoanRecord) -> StoreResult<()> {
        let mut loans = self.loans.write().await;
        if loans.contains_key(&loan.loan_id) {
            return Err(StoreError::DuplicateKey(format!("loan_id {}", loan.loan_id)));
        }
        if let Some(key) = loan.idempotency_key.as_deref() {
            let taken = loans.values().any(|l| {
                l.borrower_id == loan.borrower_id && l.idempotency_key.as_deref() == Some(key)
            });
            if taken {
                return Err(StoreError::DuplicateKey(format!("idempotency_key {}", key)));
            }
        }
        loans.insert(loan.loan_id.clone(), loan.clone());
        Ok(())
    }

    async fn find_loan(&self, loan_id: &str) -> StoreResult<Option<LoanRecord>> {
        Ok(self.loans.read().await.get(loan_id).cloned())
    }

    async fn find_loan_by_idempotency_key(
        &self,
        borrower_id: &str,
        key: &str,
    ) -> StoreResult<Option<LoanRecord>> {
        Ok(self
            .loans
            .read()
            .await
            .values()
            .find(|l| l.borrower_id == borrower_id && l.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn list_loans(&self, borrower_id: &str) -> StoreResult<Vec<LoanRecord>> {
        let mut loans: Vec<LoanRecord> = self
            .loans
            .read()
            .await
            .values()
            .filter(|l| l.borrower_id == borrower_id)
            .cloned()
            .collect();
        loans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(loans)
    }

    async fn update_loan(
        &self,
        loan: &LoanRecord,
        expected_version: i64,
        update: LoanUpdate<'_>,
    ) -> StoreResult<bool> {
        // Same order everywhere both maps are held
        let mut collateral = self.collateral.write().await;
        let mut loans = self.loans.write().await;

        match loans.get(&loan.loan_id) {
            Some(stored) if stored.version == expected_version => {}
            _ => return Ok(false),
        }

        if let Some(payment) = update.payment {
            let recorded = loans.values().any(|l| {
                l.payments
                    .iter()
                    .any(|p| p.transaction_id == payment.transaction_id)
            });
            if recorded {
                return Err(StoreError::DuplicateKey(format!(
                    "transaction_id {}",
                    payment.transaction_id
                )));
            }
        }
        if let Some(reference) = loan.disbursement_reference.as_deref() {
            let taken = loans.values().any(|l| {
                l.loan_id != loan.loan_id && l.disbursement_reference.as_deref() == Some(reference)
            });
            if taken {
                return Err(StoreError::DuplicateKey(format!(
                    "disbursement_reference {}",
                    reference
                )));
            }
        }

        if update.release_collateral {
            if let Some(record) = collateral.get_mut(&loan.collateral_id) {
                release_lock(record, Some(&loan.loan_id), loan.updated_at);
            }
        }
        loans.insert(loan.loan_id.clone(), loan.clone());
        Ok(true)
    }

    async fn delete_loan(&self, loan_id: &str) -> StoreResult<()> {
        self.loans.write().await.remove(loan_id);
        Ok(())
    }
}

#[async_trait]
impl BorrowerStore for MemoryStore {
    async fn find_borrower(&self, borrower_id: &str) -> StoreResult<Option<Borrower>> {
        Ok(self.borrowers.read().await.get(borrower_id).cloned())
    }

    async fn upsert_borrower(&self, borrower: &Borrower) -> StoreResult<()> {
        self.borrowers
            .write()
            .await
            .insert(borrower.borrower_id.clone(), borrower.clone());
        Ok(())
    }
}

fn release_lock(record: &mut CollateralRecord, loan_id: Option<&str>, at: DateTime<Utc>) -> bool {
    let held_by_loan = loan_id.map_or(true, |id| record.loan_id.as_deref() == Some(id));
    if record.status != CollateralStatus::LockedForLoan || !held_by_loan {
        return false;
    }
    record.status = CollateralStatus::Active;
    record.loan_id = None;
    record.locked_at = None;
    record.updated_at = at;
    true
}
