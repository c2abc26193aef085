//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::collateral::CollateralService;
use crate::db::Database;
use crate::loan::LoanLedger;
use crate::store::BorrowerStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LoanLedger>,
    pub collateral_service: Arc<CollateralService>,
    pub borrowers: Arc<dyn BorrowerStore>,
    /// Absent when running on the in-memory store
    pub database: Option<Database>,
}

impl AppState {
    pub fn new(
        ledger: Arc<LoanLedger>,
        collateral_service: Arc<CollateralService>,
        borrowers: Arc<dyn BorrowerStore>,
        database: Option<Database>,
    ) -> Self {
        Self {
            ledger,
            collateral_service,
            borrowers,
            database,
        }
    }
}

impl FromRef<AppState> for Arc<LoanLedger> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.ledger.clone()
    }
}

impl FromRef<AppState> for Arc<CollateralService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.collateral_service.clone()
    }
}

impl FromRef<AppState> for Arc<dyn BorrowerStore> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.borrowers.clone()
    }
}
