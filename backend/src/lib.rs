//! AgriVault Backend Library
//!
//! Crop-backed lending: warehouse receipts are registered as collateral and
//! loans are drawn against them, repaid, and closed. The lending engine lives
//! in [`collateral`], [`loan`] and [`services`]; [`store`] persists it, and
//! the HTTP layer in [`handlers`] and [`routes`] exposes it.

pub mod collateral;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod loan;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
