//! Human-readable identifiers for receipts, loans and transactions
//!
//! Format is `<PREFIX><YY><MM>[DD]<SUFFIX>` where the suffix is six random
//! characters from `[0-9A-Z]`. Uniqueness is only probabilistic, so callers
//! insert through [`IdentifierMinter::mint_with_retry`] and let the store's
//! uniqueness constraint reject collisions.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::future::Future;

use crate::error::{LendingError, LendingResult, StoreError};

const SUFFIX_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const SUFFIX_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Loan,
    Collateral,
    Transaction,
}

impl IdentifierKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            IdentifierKind::Loan => "LN",
            IdentifierKind::Collateral => "WHR",
            IdentifierKind::Transaction => "TXN",
        }
    }

    fn date_format(&self) -> &'static str {
        match self {
            IdentifierKind::Transaction => "%y%m%d",
            _ => "%y%m",
        }
    }
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentifierKind::Loan => f.write_str("loan"),
            IdentifierKind::Collateral => f.write_str("collateral"),
            IdentifierKind::Transaction => f.write_str("transaction"),
        }
    }
}

pub struct IdentifierMinter;

impl IdentifierMinter {
    pub fn mint(kind: IdentifierKind) -> String {
        Self::mint_at(kind, Utc::now(), &mut rand::thread_rng())
    }

    pub fn mint_at<R: Rng>(kind: IdentifierKind, at: DateTime<Utc>, rng: &mut R) -> String {
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
            .collect();
        format!("{}{}{}", kind.prefix(), at.format(kind.date_format()), suffix)
    }

    /// Mints an identifier and hands it to `insert`, minting a fresh one each
    /// time the store reports a duplicate key. Gives up with a conflict after
    /// `max_attempts`.
    pub async fn mint_with_retry<T, F, Fut>(
        kind: IdentifierKind,
        max_attempts: u32,
        mut insert: F,
    ) -> LendingResult<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        for attempt in 1..=max_attempts.max(1) {
            let id = Self::mint(kind);
            match insert(id.clone()).await {
                Ok(value) => return Ok(value),
                Err(StoreError::DuplicateKey(key)) => {
                    tracing::warn!(
                        kind = %kind,
                        id = %id,
                        attempt,
                        key = %key,
                        "Minted identifier collided, retrying"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(LendingError::Conflict(format!(
            "could not mint a unique {} identifier after {} attempts",
            kind,
            max_attempts.max(1)
        )))
    }
}
