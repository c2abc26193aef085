mod app_state;

pub use app_state::AppState;

use std::sync::Arc;
use thiserror::Error;

use crate::collateral::CollateralService;
use crate::config::Config;
use crate::db::{Database, DbError};
use crate::error::LendingError;
use crate::loan::{policy_for, LoanLedger};
use crate::services::ValuationPolicy;
use crate::store::{BorrowerStore, CollateralStore, LoanStore, MemoryStore, PgStore};

/// Why the server could not assemble its state
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid lending settings: {0}")]
    Settings(#[from] LendingError),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl AppState {
    /// Wires the lending services onto PostgreSQL when `DATABASE_URL` is set,
    /// otherwise onto the in-memory store.
    pub async fn from_config(config: &Config) -> Result<Self, StartupError> {
        let valuation = ValuationPolicy::new(config.loan_to_value_ratio)?;

        if config.database_url.is_some() {
            let database = Database::connect(config).await?;
            let store = Arc::new(PgStore::new(database.pool().clone()));
            Ok(Self::wire(store, config, valuation, Some(database)))
        } else {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Ok(Self::wire(Arc::new(MemoryStore::new()), config, valuation, None))
        }
    }

    fn wire<S>(
        store: Arc<S>,
        config: &Config,
        valuation: ValuationPolicy,
        database: Option<Database>,
    ) -> Self
    where
        S: CollateralStore + LoanStore + BorrowerStore + 'static,
    {
        let ledger = LoanLedger::new(store.clone(), store.clone(), policy_for(config.approval_mode))
            .with_valuation(valuation)
            .with_default_rate(config.default_interest_rate)
            .with_max_mint_attempts(config.id_mint_max_attempts);
        let collateral_service =
            CollateralService::new(store.clone(), valuation, config.id_mint_max_attempts);

        Self::new(Arc::new(ledger), Arc::new(collateral_service), store, database)
    }
}
