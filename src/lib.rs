//! tallybook - personal budgeting core
//!
//! This library implements the transaction-assignment core of a personal
//! budgeting application: imported transactions are matched against a
//! priority-ordered list of assignment rules, accumulated into per-estimate
//! actuals, and compared against a tree of budget estimates.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `error`: Custom error types
//! - `models`: Core data models (money, transactions, rules, estimates,
//!   ledger records)
//! - `services`: Business logic (the transaction assigner and the
//!   double-entry journal)
//! - `import`: GnuCash and CSV file readers plus the background import
//!   worker
//! - `cli`: Command handlers for the `tallybook` binary

pub mod cli;
pub mod error;
pub mod import;
pub mod models;
pub mod services;

pub use error::{Error, Result};
