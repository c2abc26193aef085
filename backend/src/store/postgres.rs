//! PostgreSQL store
//!
//! Schema lives in `migrations/`. Conditional writes are single `UPDATE ...
//! WHERE` statements so the database serializes competing requests. A loan
//! update and the writes that go with it share one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::collections::HashMap;

use super::{BorrowerStore, CollateralFilter, CollateralStore, LoanStore, LoanUpdate, StoreResult};
use crate::collateral::{CollateralRecord, CollateralStatus};
use crate::loan::{Borrower, LoanRecord, PaymentEvent};

const PAYMENT_COLUMNS: &str =
    "amount, paid_at, method, transaction_id, interest_portion, principal_portion";

#[derive(sqlx::FromRow)]
struct PaymentRow {
    loan_id: String,
    #[sqlx(flatten)]
    event: PaymentEvent,
}

#[derive(Clone)]
pub struct PgStore {
    db_pool: PgPool,
}

impl PgStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    async fn insert_payment(
        tx: &mut Transaction<'_, Postgres>,
        loan_id: &str,
        payment: &PaymentEvent,
    ) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO loan_payments (loan_id, {}) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            PAYMENT_COLUMNS
        ))
        .bind(loan_id)
        .bind(payment.amount)
        .bind(payment.paid_at)
        .bind(payment.method)
        .bind(&payment.transaction_id)
        .bind(payment.interest_portion)
        .bind(payment.principal_portion)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn release_lock(
        conn: &mut PgConnection,
        whr_id: &str,
        loan_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE collateral
            SET status = $1, loan_id = NULL, locked_at = NULL, updated_at = $2
            WHERE whr_id = $3 AND status = $4 AND ($5::text IS NULL OR loan_id = $5)
            "#,
        )
        .bind(CollateralStatus::Active)
        .bind(at)
        .bind(whr_id)
        .bind(CollateralStatus::LockedForLoan)
        .bind(loan_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn attach_payments(&self, mut loans: Vec<LoanRecord>) -> StoreResult<Vec<LoanRecord>> {
        if loans.is_empty() {
            return Ok(loans);
        }
        let ids: Vec<String> = loans.iter().map(|l| l.loan_id.clone()).collect();

        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT loan_id, {} FROM loan_payments WHERE loan_id = ANY($1) ORDER BY id",
            PAYMENT_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&self.db_pool)
        .await?;

        let mut by_loan: HashMap<String, Vec<PaymentEvent>> = HashMap::new();
        for row in rows {
            by_loan.entry(row.loan_id).or_default().push(row.event);
        }
        for loan in loans.iter_mut() {
            loan.payments = by_loan.remove(&loan.loan_id).unwrap_or_default();
        }
        Ok(loans)
    }
}

#[async_trait]
impl CollateralStore for PgStore {
    async fn insert_collateral(&self, record: &CollateralRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO collateral (
                whr_id, owner_id, custodian_id, warehouse_name, warehouse_location,
                crop_type, variety, quantity, quality_grade, moisture_content,
                estimated_value, price_per_unit, storage_charges, insurance_value,
                loan_to_value_ratio, status, loan_id, locked_at, issue_date, expiry_date,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                    $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
            "#,
        )
        .bind(&record.whr_id)
        .bind(&record.owner_id)
        .bind(&record.custodian_id)
        .bind(&record.warehouse_name)
        .bind(&record.warehouse_location)
        .bind(record.crop_type)
        .bind(&record.variety)
        .bind(record.quantity)
        .bind(record.quality_grade)
        .bind(record.moisture_content)
        .bind(record.estimated_value)
        .bind(record.price_per_unit)
        .bind(record.storage_charges)
        .bind(record.insurance_value)
        .bind(record.loan_to_value_ratio)
        .bind(record.status)
        .bind(&record.loan_id)
        .bind(record.locked_at)
        .bind(record.issue_date)
        .bind(record.expiry_date)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    async fn find_collateral(&self, whr_id: &str) -> StoreResult<Option<CollateralRecord>> {
        let record =
            sqlx::query_as::<_, CollateralRecord>("SELECT * FROM collateral WHERE whr_id = $1")
                .bind(whr_id)
                .fetch_optional(&self.db_pool)
                .await?;
        Ok(record)
    }

    async fn list_collateral(&self, filter: &CollateralFilter) -> StoreResult<Vec<CollateralRecord>> {
        let records = sqlx::query_as::<_, CollateralRecord>(
            r#"
            SELECT * FROM collateral
            WHERE ($1::text IS NULL OR owner_id = $1)
              AND ($2::text IS NULL OR custodian_id = $2)
              AND ($3::collateral_status IS NULL OR status = $3)
            ORDER BY created_at DESC
            "#,
        )
        .bind(&filter.owner_id)
        .bind(&filter.custodian_id)
        .bind(filter.status)
        .fetch_all(&self.db_pool)
        .await?;
        Ok(records)
    }

    async fn lock_collateral(
        &self,
        whr_id: &str,
        loan_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE collateral
            SET status = $1, loan_id = $2, locked_at = $3, updated_at = $3
            WHERE whr_id = $4 AND status = $5
            "#,
        )
        .bind(CollateralStatus::LockedForLoan)
        .bind(loan_id)
        .bind(at)
        .bind(whr_id)
        .bind(CollateralStatus::Active)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_collateral(
        &self,
        whr_id: &str,
        loan_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut conn = self.db_pool.acquire().await?;
        Self::release_lock(&mut *conn, whr_id, loan_id, at).await
    }
}

#[async_trait]
impl LoanStore for PgStore {
    async fn insert_loan(&self, loan: &LoanRecord) -> StoreResult<()> {
        let mut tx = self.db_pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO loans (
                loan_id, borrower_id, collateral_id, principal_amount, annual_rate,
                tenure_months, total_interest, total_amount, emi_amount, loan_type,
                collateral_value, loan_to_value_ratio, crop_type, quantity, purpose,
                requested_amount, status, applied_at, approved_at, disbursed_at,
                disbursement_reference, credit_score, risk_category, approval_comments,
                rejection_reason, total_paid, remaining_amount, last_payment_date,
                next_due_date, idempotency_key, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30,
                    $31, $32, $33)
            "#,
        )
        .bind(&loan.loan_id)
        .bind(&loan.borrower_id)
        .bind(&loan.collateral_id)
        .bind(loan.principal_amount)
        .bind(loan.annual_rate)
        .bind(loan.tenure_months)
        .bind(loan.total_interest)
        .bind(loan.total_amount)
        .bind(loan.emi_amount)
        .bind(loan.loan_type)
        .bind(loan.collateral_value)
        .bind(loan.loan_to_value_ratio)
        .bind(loan.crop_type)
        .bind(loan.quantity)
        .bind(loan.purpose)
        .bind(loan.requested_amount)
        .bind(loan.status)
        .bind(loan.applied_at)
        .bind(loan.approved_at)
        .bind(loan.disbursed_at)
        .bind(&loan.disbursement_reference)
        .bind(loan.credit_score)
        .bind(loan.risk_category)
        .bind(&loan.approval_comments)
        .bind(&loan.rejection_reason)
        .bind(loan.total_paid)
        .bind(loan.remaining_amount)
        .bind(loan.last_payment_date)
        .bind(loan.next_due_date)
        .bind(&loan.idempotency_key)
        .bind(loan.version)
        .bind(loan.created_at)
        .bind(loan.updated_at)
        .execute(&mut *tx)
        .await?;

        for payment in &loan.payments {
            Self::insert_payment(&mut tx, &loan.loan_id, payment).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_loan(&self, loan_id: &str) -> StoreResult<Option<LoanRecord>> {
        let loan = sqlx::query_as::<_, LoanRecord>("SELECT * FROM loans WHERE loan_id = $1")
            .bind(loan_id)
            .fetch_optional(&self.db_pool)
            .await?;

        match loan {
            Some(loan) => Ok(self.attach_payments(vec![loan]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_loan_by_idempotency_key(
        &self,
        borrower_id: &str,
        key: &str,
    ) -> StoreResult<Option<LoanRecord>> {
        let loan = sqlx::query_as::<_, LoanRecord>(
            "SELECT * FROM loans WHERE borrower_id = $1 AND idempotency_key = $2",
        )
        .bind(borrower_id)
        .bind(key)
        .fetch_optional(&self.db_pool)
        .await?;

        match loan {
            Some(loan) => Ok(self.attach_payments(vec![loan]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_loans(&self, borrower_id: &str) -> StoreResult<Vec<LoanRecord>> {
        let loans = sqlx::query_as::<_, LoanRecord>(
            "SELECT * FROM loans WHERE borrower_id = $1 ORDER BY created_at DESC",
        )
        .bind(borrower_id)
        .fetch_all(&self.db_pool)
        .await?;

        self.attach_payments(loans).await
    }

    async fn update_loan(
        &self,
        loan: &LoanRecord,
        expected_version: i64,
        update: LoanUpdate<'_>,
    ) -> StoreResult<bool> {
        let mut tx = self.db_pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE loans
            SET status = $1, approved_at = $2, disbursed_at = $3, disbursement_reference = $4,
                approval_comments = $5, rejection_reason = $6, total_paid = $7,
                remaining_amount = $8, last_payment_date = $9, next_due_date = $10,
                version = $11, updated_at = $12
            WHERE loan_id = $13 AND version = $14
            "#,
        )
        .bind(loan.status)
        .bind(loan.approved_at)
        .bind(loan.disbursed_at)
        .bind(&loan.disbursement_reference)
        .bind(&loan.approval_comments)
        .bind(&loan.rejection_reason)
        .bind(loan.total_paid)
        .bind(loan.remaining_amount)
        .bind(loan.last_payment_date)
        .bind(loan.next_due_date)
        .bind(loan.version)
        .bind(loan.updated_at)
        .bind(&loan.loan_id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if let Some(payment) = update.payment {
            Self::insert_payment(&mut tx, &loan.loan_id, payment).await?;
        }
        if update.release_collateral {
            let released = Self::release_lock(
                &mut *tx,
                &loan.collateral_id,
                Some(&loan.loan_id),
                loan.updated_at,
            )
            .await?;
            if !released {
                tracing::warn!(
                    loan_id = %loan.loan_id,
                    collateral_id = %loan.collateral_id,
                    "Loan held no lock on its collateral"
                );
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn delete_loan(&self, loan_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM loans WHERE loan_id = $1")
            .bind(loan_id)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BorrowerStore for PgStore {
    async fn find_borrower(&self, borrower_id: &str) -> StoreResult<Option<Borrower>> {
        let borrower = sqlx::query_as::<_, Borrower>(
            "SELECT borrower_id, credit_score FROM borrowers WHERE borrower_id = $1",
        )
        .bind(borrower_id)
        .fetch_optional(&self.db_pool)
        .await?;
        Ok(borrower)
    }

    async fn upsert_borrower(&self, borrower: &Borrower) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO borrowers (borrower_id, credit_score, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (borrower_id) DO UPDATE SET credit_score = $2, updated_at = $3
            "#,
        )
        .bind(&borrower.borrower_id)
        .bind(borrower.credit_score)
        .bind(Utc::now())
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }
}
