//! Warehouse receipt (WHR) collateral
//!
//! Contains the record model, the lock that ties a receipt to a loan, and the
//! registration/lookup service.

pub mod lock;
pub mod model;
pub mod service;

pub use lock::CollateralLock;
pub use model::*;
pub use service::CollateralService;
