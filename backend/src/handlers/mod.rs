//! API handlers for AgriVault backend

pub mod collateral;
pub mod health;
pub mod loan;
pub mod risk;

pub use collateral::*;
pub use health::health_check;
pub use loan::*;
pub use risk::*;
