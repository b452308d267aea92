//! Data models for the budgeting core

pub mod currency;
pub mod estimate;
pub mod ledger;
pub mod money;
pub mod rules;
pub mod transaction;

pub use currency::Currency;
pub use estimate::{DueDate, Estimate, EstimateTree, EstimateType, Impact, Progress};
pub use ledger::{Account, AccountTransaction, Envelope, EnvelopeTransaction, Transaction};
pub use money::Money;
pub use rules::{AssignmentRule, AssignmentRules, Condition, Operator, TextField};
pub use transaction::ImportedTransaction;
