//! Loan lifecycle
//!
//! ```text
//! pending -> under_review -> approved -> disbursed -> active -> completed
//!    |            |             |                       |
//!    +------------+-------------+-> rejected            +-> overdue -> defaulted
//!                                                                 |
//!                                                                 +-> completed
//! ```
//!
//! Every write is a compare-and-swap on the loan `version`, so two requests
//! racing on the same loan cannot both apply. The loser gets a conflict and
//! may reload and retry.
//!
//! Collateral is locked when a loan is approved and unlocked when it is
//! completed, or when an approved loan is rejected. The unlock is committed
//! with the loan update that causes it. Overdue and defaulted loans keep
//! their collateral locked.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use validator::Validate;

use crate::collateral::{CollateralLock, CollateralRecord};
use crate::error::{LendingError, LendingResult, StoreError};
use crate::loan::model::{
    ApplyLoanRequest, Borrower, LoanRecord, LoanStatus, LoanType, PaymentEvent, RepayLoanRequest,
    RepaymentOutcome,
};
use crate::loan::policy::{ApprovalDecision, ApprovalPolicy, AutoApprovalPolicy};
use crate::services::identifier::{IdentifierKind, IdentifierMinter};
use crate::services::interest::InterestCalculator;
use crate::services::risk::RiskClassifier;
use crate::services::valuation::ValuationPolicy;
use crate::store::{CollateralStore, LoanStore, LoanUpdate};

/// Annual rate in percent when neither the request nor the ledger names one
pub const DEFAULT_ANNUAL_RATE: Decimal = dec!(12);

const DEFAULT_MINT_ATTEMPTS: u32 = 5;

#[derive(Clone)]
pub struct LoanLedger {
    loans: Arc<dyn LoanStore>,
    collateral: Arc<dyn CollateralStore>,
    lock: CollateralLock,
    valuation: ValuationPolicy,
    policy: Arc<dyn ApprovalPolicy>,
    default_annual_rate: Decimal,
    max_mint_attempts: u32,
}

impl LoanLedger {
    pub fn new(
        loans: Arc<dyn LoanStore>,
        collateral: Arc<dyn CollateralStore>,
        policy: Arc<dyn ApprovalPolicy>,
    ) -> Self {
        Self {
            loans,
            lock: CollateralLock::new(collateral.clone()),
            collateral,
            valuation: ValuationPolicy::default(),
            policy,
            default_annual_rate: DEFAULT_ANNUAL_RATE,
            max_mint_attempts: DEFAULT_MINT_ATTEMPTS,
        }
    }

    /// Ledger that approves every application immediately
    pub fn auto_approving(loans: Arc<dyn LoanStore>, collateral: Arc<dyn CollateralStore>) -> Self {
        Self::new(loans, collateral, Arc::new(AutoApprovalPolicy))
    }

    pub fn with_default_rate(mut self, annual_rate_percent: Decimal) -> Self {
        self.default_annual_rate = annual_rate_percent;
        self
    }

    pub fn with_max_mint_attempts(mut self, attempts: u32) -> Self {
        self.max_mint_attempts = attempts.max(1);
        self
    }

    pub fn with_valuation(mut self, valuation: ValuationPolicy) -> Self {
        self.valuation = valuation;
        self
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Opens a loan against one of the borrower's warehouse receipts.
    ///
    /// The principal is the requested amount capped at the receipt's eligible
    /// amount. What happens after creation is up to the approval policy: the
    /// loan is either carried through to `active` with its collateral locked,
    /// or parked in `under_review`. If the automatic path fails part way, the
    /// loan is removed and any lock it took is released.
    ///
    /// With an `idempotency_key`, repeating the request returns the loan the
    /// first attempt created.
    pub async fn apply(
        &self,
        borrower: &Borrower,
        request: ApplyLoanRequest,
    ) -> LendingResult<LoanRecord> {
        request
            .validate()
            .map_err(|e| LendingError::Validation(e.to_string()))?;

        if let Some(existing) = self.find_by_idempotency_key(borrower, &request).await? {
            tracing::info!(
                loan_id = %existing.loan_id,
                borrower_id = %borrower.borrower_id,
                "Returning loan created by an earlier attempt"
            );
            return Ok(existing);
        }

        let collateral = self
            .collateral
            .find_collateral(&request.collateral_id)
            .await?
            .ok_or_else(|| LendingError::NotFound(format!("collateral {}", request.collateral_id)))?;

        check_eligibility(&collateral, &borrower.borrower_id, Utc::now())?;

        let template = self.draft_loan(borrower, &collateral, &request)?;

        let inserted = IdentifierMinter::mint_with_retry(
            IdentifierKind::Loan,
            self.max_mint_attempts,
            |loan_id| {
                let loans = self.loans.clone();
                let mut loan = template.clone();
                loan.loan_id = loan_id;
                async move {
                    loans.insert_loan(&loan).await?;
                    Ok::<_, StoreError>(loan)
                }
            },
        )
        .await;

        let loan = match inserted {
            Ok(loan) => loan,
            Err(LendingError::Conflict(msg)) => {
                // A concurrent retry with the same key may have won the insert
                return match self.find_by_idempotency_key(borrower, &request).await? {
                    Some(existing) => Ok(existing),
                    None => Err(LendingError::Conflict(msg)),
                };
            }
            Err(err) => return Err(err),
        };

        tracing::info!(
            loan_id = %loan.loan_id,
            borrower_id = %loan.borrower_id,
            collateral_id = %loan.collateral_id,
            principal = loan.principal_amount,
            total_amount = loan.total_amount,
            risk_category = %loan.risk_category,
            "Loan application created"
        );

        match self.policy.evaluate(&loan) {
            ApprovalDecision::HoldForReview => self.submit_record(loan).await,
            ApprovalDecision::Approve { comments } => self.auto_approve(loan, comments).await,
        }
    }

    pub async fn submit_for_review(&self, loan_id: &str) -> LendingResult<LoanRecord> {
        let loan = self.load(loan_id).await?;
        self.submit_record(loan).await
    }

    /// Approves the loan and locks its collateral
    pub async fn approve(&self, loan_id: &str, comments: Option<String>) -> LendingResult<LoanRecord> {
        let loan = self.load(loan_id).await?;
        self.approve_record(loan, comments).await
    }

    pub async fn disburse(&self, loan_id: &str) -> LendingResult<LoanRecord> {
        let loan = self.load(loan_id).await?;
        self.disburse_record(loan).await
    }

    pub async fn activate(&self, loan_id: &str) -> LendingResult<LoanRecord> {
        let loan = self.load(loan_id).await?;
        self.activate_record(loan).await
    }

    /// Rejects a loan that has not been disbursed. An approved loan gives its
    /// collateral back.
    pub async fn reject(&self, loan_id: &str, reason: &str) -> LendingResult<LoanRecord> {
        if reason.trim().is_empty() {
            return Err(LendingError::Validation(
                "rejection reason is required".to_string(),
            ));
        }

        let mut loan = self.load(loan_id).await?;
        let held_collateral = loan.status == LoanStatus::Approved;

        let now = Utc::now();
        advance(&mut loan, LoanStatus::Rejected, now)?;
        loan.rejection_reason = Some(reason.to_string());
        self.save(&mut loan, LoanUpdate::default().releasing_collateral(held_collateral))
            .await?;

        tracing::info!(
            loan_id = %loan.loan_id,
            reason = %reason,
            collateral_released = held_collateral,
            "Loan rejected"
        );
        Ok(loan)
    }

    /// Records a repayment by the borrower.
    ///
    /// The amount is split interest-first: outstanding interest is settled
    /// before any principal. A payment that brings the balance to zero
    /// completes the loan and unlocks its collateral in the same write.
    ///
    /// A caller-supplied `transaction_id` must not be recorded already;
    /// otherwise a `TXN` id is minted.
    pub async fn repay(
        &self,
        caller_id: &str,
        loan_id: &str,
        request: RepayLoanRequest,
    ) -> LendingResult<RepaymentOutcome> {
        if request.amount <= 0 {
            return Err(LendingError::Validation(format!(
                "loan {}: repayment amount must be positive, got {}",
                loan_id, request.amount
            )));
        }

        let mut loan = self.load(loan_id).await?;
        ensure_owner(&loan, caller_id)?;

        if !loan.status.is_repayable() {
            return Err(LendingError::Conflict(format!(
                "loan {} is {} and does not accept repayments",
                loan.loan_id, loan.status
            )));
        }
        if request.amount > loan.remaining_amount {
            return Err(LendingError::Validation(format!(
                "loan {}: repayment {} exceeds remaining balance {}",
                loan.loan_id, request.amount, loan.remaining_amount
            )));
        }

        let now = Utc::now();
        let (interest_portion, principal_portion) = loan.split_payment(request.amount);
        let template = PaymentEvent {
            amount: request.amount,
            paid_at: now,
            method: request.method,
            transaction_id: String::new(),
            interest_portion,
            principal_portion,
        };

        loan.total_paid += template.amount;
        loan.remaining_amount -= template.amount;
        loan.last_payment_date = Some(now);
        loan.next_due_date = loan.due_date_after(loan.total_paid);
        loan.updated_at = now;

        let completed = loan.remaining_amount == 0;
        if completed {
            advance(&mut loan, LoanStatus::Completed, now)?;
            loan.next_due_date = None;
        }

        let (loan, payment) = self
            .save_with_reference(
                &loan,
                request.transaction_id,
                completed,
                |loan, transaction_id| {
                    let payment = PaymentEvent {
                        transaction_id,
                        ..template.clone()
                    };
                    loan.payments.push(payment.clone());
                    payment
                },
            )
            .await?;

        tracing::info!(
            loan_id = %loan.loan_id,
            amount = payment.amount,
            interest_portion = payment.interest_portion,
            principal_portion = payment.principal_portion,
            remaining_amount = loan.remaining_amount,
            transaction_id = %payment.transaction_id,
            "Repayment recorded"
        );

        if completed {
            tracing::info!(
                loan_id = %loan.loan_id,
                collateral_id = %loan.collateral_id,
                "Loan completed, collateral released"
            );
        }

        Ok(RepaymentOutcome {
            loan_id: loan.loan_id,
            remaining_amount: loan.remaining_amount,
            status: loan.status,
            payment,
        })
    }

    /// Collateral stays locked
    pub async fn mark_overdue(&self, loan_id: &str) -> LendingResult<LoanRecord> {
        self.set_status(loan_id, LoanStatus::Overdue).await
    }

    /// Collateral stays locked
    pub async fn mark_defaulted(&self, loan_id: &str) -> LendingResult<LoanRecord> {
        self.set_status(loan_id, LoanStatus::Defaulted).await
    }

    /// Loads a loan on behalf of its borrower
    pub async fn get_loan(&self, caller_id: &str, loan_id: &str) -> LendingResult<LoanRecord> {
        let loan = self.load(loan_id).await?;
        ensure_owner(&loan, caller_id)?;
        Ok(loan)
    }

    /// Loads a loan without an ownership check
    pub async fn find_loan(&self, loan_id: &str) -> LendingResult<LoanRecord> {
        self.load(loan_id).await
    }

    pub async fn list_loans(&self, borrower_id: &str) -> LendingResult<Vec<LoanRecord>> {
        Ok(self.loans.list_loans(borrower_id).await?)
    }

    fn draft_loan(
        &self,
        borrower: &Borrower,
        collateral: &CollateralRecord,
        request: &ApplyLoanRequest,
    ) -> LendingResult<LoanRecord> {
        let collateral_ctx = |e: LendingError| e.context(format!("collateral {}", collateral.whr_id));

        let annual_rate = request.annual_rate.unwrap_or(self.default_annual_rate);
        let eligible = self.valuation.eligible_amount(collateral).map_err(collateral_ctx)?;
        let principal = ValuationPolicy::accepted_principal(request.requested_amount, eligible)
            .map_err(collateral_ctx)?;

        let total_interest =
            InterestCalculator::total_interest(principal, annual_rate, request.tenure_months)
                .map_err(collateral_ctx)?;
        let total_amount = InterestCalculator::total_repayable(principal, total_interest)
            .map_err(collateral_ctx)?;
        let emi_amount = match request.loan_type {
            LoanType::Emi => Some(
                InterestCalculator::emi_amount(principal, annual_rate, request.tenure_months)
                    .map_err(collateral_ctx)?,
            ),
            LoanType::LumpSum => None,
        };

        let now = Utc::now();
        Ok(LoanRecord {
            loan_id: String::new(),
            borrower_id: borrower.borrower_id.clone(),
            collateral_id: collateral.whr_id.clone(),
            principal_amount: principal,
            annual_rate,
            tenure_months: request.tenure_months,
            total_interest,
            total_amount,
            emi_amount,
            loan_type: request.loan_type,
            collateral_value: collateral.estimated_value,
            loan_to_value_ratio: collateral.loan_to_value_ratio,
            crop_type: collateral.crop_type,
            quantity: collateral.quantity,
            purpose: request.purpose,
            requested_amount: request.requested_amount,
            status: LoanStatus::Pending,
            applied_at: now,
            approved_at: None,
            disbursed_at: None,
            disbursement_reference: None,
            credit_score: borrower.credit_score,
            risk_category: RiskClassifier::classify(borrower.credit_score),
            approval_comments: None,
            rejection_reason: None,
            total_paid: 0,
            remaining_amount: total_amount,
            last_payment_date: None,
            next_due_date: None,
            payments: Vec::new(),
            idempotency_key: request.idempotency_key.clone(),
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    async fn find_by_idempotency_key(
        &self,
        borrower: &Borrower,
        request: &ApplyLoanRequest,
    ) -> LendingResult<Option<LoanRecord>> {
        match request.idempotency_key.as_deref() {
            Some(key) => Ok(self
                .loans
                .find_loan_by_idempotency_key(&borrower.borrower_id, key)
                .await?),
            None => Ok(None),
        }
    }

    async fn auto_approve(
        &self,
        loan: LoanRecord,
        comments: Option<String>,
    ) -> LendingResult<LoanRecord> {
        let loan_id = loan.loan_id.clone();
        let collateral_id = loan.collateral_id.clone();

        let loan = match self.approve_record(loan, comments).await {
            Ok(loan) => loan,
            Err(err) => {
                self.discard(&loan_id, None).await;
                return Err(err);
            }
        };

        let result = match self.disburse_record(loan).await {
            Ok(loan) => self.activate_record(loan).await,
            Err(err) => Err(err),
        };

        if result.is_err() {
            self.discard(&loan_id, Some(&collateral_id)).await;
        }
        result
    }

    /// Undoes a loan the automatic path could not finish. Failures here are
    /// logged; the caller reports the error that caused the rollback.
    async fn discard(&self, loan_id: &str, locked_collateral: Option<&str>) {
        if let Some(collateral_id) = locked_collateral {
            if let Err(err) = self.lock.release_for_loan(collateral_id, loan_id).await {
                tracing::error!(
                    loan_id = %loan_id,
                    collateral_id = %collateral_id,
                    error = %err,
                    "Failed to release collateral while rolling back loan"
                );
            }
        }
        if let Err(err) = self.loans.delete_loan(loan_id).await {
            tracing::error!(loan_id = %loan_id, error = %err, "Failed to roll back loan");
        } else {
            tracing::warn!(loan_id = %loan_id, "Loan rolled back");
        }
    }

    async fn submit_record(&self, mut loan: LoanRecord) -> LendingResult<LoanRecord> {
        advance(&mut loan, LoanStatus::UnderReview, Utc::now())?;
        self.save(&mut loan, LoanUpdate::default()).await?;
        tracing::info!(loan_id = %loan.loan_id, "Loan submitted for review");
        Ok(loan)
    }

    async fn approve_record(
        &self,
        mut loan: LoanRecord,
        comments: Option<String>,
    ) -> LendingResult<LoanRecord> {
        let now = Utc::now();
        if !loan.status.can_transition_to(LoanStatus::Approved) {
            return Err(invalid_transition(&loan, LoanStatus::Approved));
        }

        let collateral = self
            .collateral
            .find_collateral(&loan.collateral_id)
            .await?
            .ok_or_else(|| LendingError::NotFound(format!("collateral {}", loan.collateral_id)))?;
        check_eligibility(&collateral, &loan.borrower_id, now)?;

        self.lock
            .lock(&collateral, &loan.loan_id)
            .await
            .map_err(|e| match e {
                LendingError::Conflict(msg) => LendingError::IneligibleCollateral(msg),
                other => other,
            })?;

        advance(&mut loan, LoanStatus::Approved, now)?;
        loan.approved_at = Some(now);
        loan.approval_comments = comments;

        if let Err(err) = self.save(&mut loan, LoanUpdate::default()).await {
            self.lock
                .release_for_loan(&loan.collateral_id, &loan.loan_id)
                .await?;
            return Err(err);
        }

        tracing::info!(
            loan_id = %loan.loan_id,
            collateral_id = %loan.collateral_id,
            "Loan approved"
        );
        Ok(loan)
    }

    async fn disburse_record(&self, mut loan: LoanRecord) -> LendingResult<LoanRecord> {
        let now = Utc::now();
        advance(&mut loan, LoanStatus::Disbursed, now)?;
        loan.disbursed_at = Some(now);
        let (loan, ()) = self
            .save_with_reference(&loan, None, false, |loan, reference| {
                loan.disbursement_reference = Some(reference);
            })
            .await?;

        tracing::info!(
            loan_id = %loan.loan_id,
            amount = loan.principal_amount,
            reference = ?loan.disbursement_reference,
            "Loan disbursed"
        );
        Ok(loan)
    }

    async fn activate_record(&self, mut loan: LoanRecord) -> LendingResult<LoanRecord> {
        advance(&mut loan, LoanStatus::Active, Utc::now())?;
        loan.next_due_date = loan.first_due_date();
        self.save(&mut loan, LoanUpdate::default()).await?;

        tracing::info!(loan_id = %loan.loan_id, next_due_date = ?loan.next_due_date, "Loan active");
        Ok(loan)
    }

    async fn set_status(&self, loan_id: &str, next: LoanStatus) -> LendingResult<LoanRecord> {
        let mut loan = self.load(loan_id).await?;
        let previous = loan.status;
        advance(&mut loan, next, Utc::now())?;
        self.save(&mut loan, LoanUpdate::default()).await?;

        tracing::info!(loan_id = %loan.loan_id, from = %previous, to = %next, "Loan status changed");
        Ok(loan)
    }

    async fn load(&self, loan_id: &str) -> LendingResult<LoanRecord> {
        self.loans
            .find_loan(loan_id)
            .await?
            .ok_or_else(|| LendingError::NotFound(format!("loan {}", loan_id)))
    }

    /// Writes `loan` if nobody else has written it since it was loaded
    async fn save(&self, loan: &mut LoanRecord, update: LoanUpdate<'_>) -> LendingResult<()> {
        let expected_version = loan.version;
        loan.version = expected_version + 1;

        let written = self
            .loans
            .update_loan(loan, expected_version, update)
            .await
            .map_err(|e| LendingError::from(e).context(format!("loan {}", loan.loan_id)));

        match written {
            Ok(true) => Ok(()),
            Ok(false) => {
                loan.version = expected_version;
                Err(lost_race(&loan.loan_id))
            }
            Err(err) => {
                loan.version = expected_version;
                Err(err)
            }
        }
    }

    /// Writes `loan` stamped with a transaction reference, like [`Self::save`].
    ///
    /// `stamp` places the reference on a copy of the loan; a payment it
    /// pushes onto the history is appended in the same write. A `supplied`
    /// reference that is already recorded is a conflict. Without one, a `TXN`
    /// id is minted, and minted again if it collides.
    async fn save_with_reference<T, F>(
        &self,
        loan: &LoanRecord,
        supplied: Option<String>,
        release_collateral: bool,
        stamp: F,
    ) -> LendingResult<(LoanRecord, T)>
    where
        F: Fn(&mut LoanRecord, String) -> T,
    {
        let expected_version = loan.version;
        let recorded_payments = loan.payments.len();

        let attempt = |reference: String| {
            let loans = self.loans.clone();
            let mut next = loan.clone();
            let stamped = stamp(&mut next, reference);
            next.version = expected_version + 1;
            async move {
                let update = LoanUpdate {
                    payment: next.payments.get(recorded_payments),
                    release_collateral,
                };
                let written = loans.update_loan(&next, expected_version, update).await?;
                Ok::<_, StoreError>((next, stamped, written))
            }
        };

        let outcome = match supplied {
            Some(reference) => attempt(reference.clone()).await.map_err(|e| match e {
                StoreError::DuplicateKey(_) => LendingError::Conflict(format!(
                    "transaction reference {} is already recorded",
                    reference
                )),
                other => other.into(),
            }),
            None => {
                IdentifierMinter::mint_with_retry(
                    IdentifierKind::Transaction,
                    self.max_mint_attempts,
                    attempt,
                )
                .await
            }
        };

        let (saved, stamped, written) =
            outcome.map_err(|e| e.context(format!("loan {}", loan.loan_id)))?;
        if !written {
            return Err(lost_race(&loan.loan_id));
        }
        Ok((saved, stamped))
    }
}

fn check_eligibility(
    collateral: &CollateralRecord,
    borrower_id: &str,
    now: DateTime<Utc>,
) -> LendingResult<()> {
    if collateral.owner_id != borrower_id {
        return Err(LendingError::IneligibleCollateral(format!(
            "collateral {} does not belong to borrower {}",
            collateral.whr_id, borrower_id
        )));
    }
    if !collateral.status.is_unlocked() {
        return Err(LendingError::IneligibleCollateral(format!(
            "collateral {} is {}",
            collateral.whr_id, collateral.status
        )));
    }
    if collateral.is_expired_at(now) {
        return Err(LendingError::IneligibleCollateral(format!(
            "collateral {} expired on {}",
            collateral.whr_id,
            collateral.expiry_date.format("%Y-%m-%d")
        )));
    }
    Ok(())
}

fn ensure_owner(loan: &LoanRecord, caller_id: &str) -> LendingResult<()> {
    if loan.borrower_id != caller_id {
        return Err(LendingError::Unauthorized(format!(
            "loan {} does not belong to {}",
            loan.loan_id, caller_id
        )));
    }
    Ok(())
}

fn advance(loan: &mut LoanRecord, next: LoanStatus, at: DateTime<Utc>) -> LendingResult<()> {
    if !loan.status.can_transition_to(next) {
        return Err(invalid_transition(loan, next));
    }
    loan.status = next;
    loan.updated_at = at;
    Ok(())
}

fn lost_race(loan_id: &str) -> LendingError {
    tracing::warn!(loan_id = %loan_id, "Loan changed concurrently, update rejected");
    LendingError::Conflict(format!("loan {} was modified by another request", loan_id))
}

fn invalid_transition(loan: &LoanRecord, next: LoanStatus) -> LendingError {
    LendingError::Conflict(format!(
        "loan {} cannot move from {} to {}",
        loan.loan_id, loan.status, next
    ))
}
