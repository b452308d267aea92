//! Budgeting and ledger services

pub mod assigner;
pub mod journal;

pub use assigner::{
    Actuals, AssignOutcome, Assignment, AssignmentReport, Assignments, TransactionAssigner,
};
pub use journal::{JournalEntry, RepoError, TransactionRepository};
