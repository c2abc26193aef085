//! Middleware for AgriVault API
//!
//! This module provides request tracing and caller identity extraction.

pub mod auth;
mod tracing;

pub use auth::{Caller, CallerRole, StaffUser};
pub use self::tracing::request_tracing;
