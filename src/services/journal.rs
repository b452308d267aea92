//! Journal entries
//!
//! A journal entry stages modifications to a single double-entry transaction
//! (the transaction record itself plus its account and envelope splits)
//! before committing them to a [`TransactionRepository`] in one save. Splits
//! may be added, updated, or removed freely while staged; nothing touches
//! the repository until [`JournalEntry::save`], and a failed save leaves the
//! staged state intact so the caller can correct and retry.

use tracing::warn;

use crate::error::{Error, Result};
use crate::models::ledger::{AccountTransaction, EnvelopeTransaction, Transaction};
use crate::models::money::Money;

/// Error raised by a repository operation
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct RepoError(pub String);

impl RepoError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Storage backend for transactions and their splits
pub trait TransactionRepository {
    /// Persist a new transaction, returning its assigned ID
    fn create_transaction(&mut self, transaction: &Transaction) -> std::result::Result<i64, RepoError>;

    /// Update a persisted transaction
    fn update_transaction(&mut self, transaction: &Transaction) -> std::result::Result<(), RepoError>;

    /// Delete a persisted transaction
    fn remove_transaction(&mut self, transaction: &Transaction) -> std::result::Result<(), RepoError>;

    /// Persist a new account split, returning its assigned ID
    fn create_account_split(
        &mut self,
        split: &AccountTransaction,
    ) -> std::result::Result<i64, RepoError>;

    /// Update a persisted account split
    fn update_account_split(
        &mut self,
        split: &AccountTransaction,
    ) -> std::result::Result<(), RepoError>;

    /// Delete a persisted account split
    fn remove_account_split(
        &mut self,
        split: &AccountTransaction,
    ) -> std::result::Result<(), RepoError>;

    /// Persist a new envelope split, returning its assigned ID
    fn create_envelope_split(
        &mut self,
        split: &EnvelopeTransaction,
    ) -> std::result::Result<i64, RepoError>;

    /// Update a persisted envelope split
    fn update_envelope_split(
        &mut self,
        split: &EnvelopeTransaction,
    ) -> std::result::Result<(), RepoError>;

    /// Delete a persisted envelope split
    fn remove_envelope_split(
        &mut self,
        split: &EnvelopeTransaction,
    ) -> std::result::Result<(), RepoError>;

    /// Atomically commit every change made since the last commit
    fn save(&mut self) -> std::result::Result<(), RepoError>;

    /// Look up a persisted transaction
    fn transaction(&self, id: i64) -> Option<Transaction>;

    /// Account splits of a persisted transaction
    fn account_splits(&self, transaction_id: i64) -> Vec<AccountTransaction>;

    /// Envelope splits of a persisted transaction
    fn envelope_splits(&self, transaction_id: i64) -> Vec<EnvelopeTransaction>;
}

/// Staged modifications to one double-entry transaction
#[derive(Debug, Clone, Default)]
pub struct JournalEntry {
    transaction: Transaction,
    account_splits: Vec<AccountTransaction>,
    envelope_splits: Vec<EnvelopeTransaction>,
    removed_account_splits: Vec<AccountTransaction>,
    removed_envelope_splits: Vec<EnvelopeTransaction>,
    last_error: String,
}

impl JournalEntry {
    /// Start a journal entry for a brand-new transaction
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            ..Self::default()
        }
    }

    /// Load a journal entry for an existing transaction and its splits
    pub fn for_transaction(repo: &dyn TransactionRepository, transaction_id: i64) -> Result<Self> {
        let transaction = repo.transaction(transaction_id).ok_or_else(|| {
            Error::NotFound {
                entity_type: "Transaction",
                identifier: transaction_id.to_string(),
            }
        })?;
        Ok(Self {
            account_splits: repo.account_splits(transaction_id),
            envelope_splits: repo.envelope_splits(transaction_id),
            transaction,
            ..Self::default()
        })
    }

    /// Load an existing transaction as a template for a new one: all IDs are
    /// cleared so that saving creates fresh records.
    pub fn copy_of(repo: &dyn TransactionRepository, transaction_id: i64) -> Result<Self> {
        let mut entry = Self::for_transaction(repo, transaction_id)?;
        entry.transaction.id = 0;
        for split in &mut entry.account_splits {
            split.id = 0;
            split.transaction_id = 0;
            split.cleared = false;
        }
        for split in &mut entry.envelope_splits {
            split.id = 0;
            split.transaction_id = 0;
        }
        Ok(entry)
    }

    /// The staged transaction record
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Replace the staged transaction record, keeping its persisted ID
    pub fn update_transaction(&mut self, mut transaction: Transaction) {
        transaction.id = self.transaction.id;
        self.transaction = transaction;
    }

    /// The staged account splits
    pub fn account_splits(&self) -> &[AccountTransaction] {
        &self.account_splits
    }

    /// The staged envelope splits
    pub fn envelope_splits(&self) -> &[EnvelopeTransaction] {
        &self.envelope_splits
    }

    /// Stage a new account split
    pub fn add_account_split(&mut self, split: AccountTransaction) {
        self.account_splits.push(split);
    }

    /// Stage a new envelope split
    pub fn add_envelope_split(&mut self, split: EnvelopeTransaction) {
        self.envelope_splits.push(split);
    }

    /// Replace the staged account split at `index`, keeping its IDs
    pub fn update_account_split(&mut self, index: usize, mut split: AccountTransaction) {
        if let Some(existing) = self.account_splits.get_mut(index) {
            split.id = existing.id;
            split.transaction_id = existing.transaction_id;
            *existing = split;
        }
    }

    /// Replace the staged envelope split at `index`, keeping its IDs
    pub fn update_envelope_split(&mut self, index: usize, mut split: EnvelopeTransaction) {
        if let Some(existing) = self.envelope_splits.get_mut(index) {
            split.id = existing.id;
            split.transaction_id = existing.transaction_id;
            *existing = split;
        }
    }

    /// Unstage the account split at `index`. A persisted split is queued for
    /// deletion on the next save.
    pub fn remove_account_split(&mut self, index: usize) {
        if index < self.account_splits.len() {
            let split = self.account_splits.remove(index);
            if split.id > 0 {
                self.removed_account_splits.push(split);
            }
        }
    }

    /// Unstage the envelope split at `index`. A persisted split is queued
    /// for deletion on the next save.
    pub fn remove_envelope_split(&mut self, index: usize) {
        if index < self.envelope_splits.len() {
            let split = self.envelope_splits.remove(index);
            if split.id > 0 {
                self.removed_envelope_splits.push(split);
            }
        }
    }

    /// Sum of the staged account splits, or `None` when there are none
    pub fn account_total(&self) -> Option<Money> {
        Self::total(self.account_splits.iter().map(|s| &s.amount))
    }

    /// Sum of the staged envelope splits, or `None` when there are none
    pub fn envelope_total(&self) -> Option<Money> {
        Self::total(self.envelope_splits.iter().map(|s| &s.amount))
    }

    fn total<'a>(mut amounts: impl Iterator<Item = &'a Money>) -> Option<Money> {
        let first = amounts.next()?.clone();
        Some(amounts.fold(first, |sum, amount| sum + amount.clone()))
    }

    /// Amount an additional account split would need to balance the entry
    pub fn account_imbalance(&self) -> Option<Money> {
        let envelope = self.envelope_total()?;
        match self.account_total() {
            Some(account) => Some(envelope - account),
            None => Some(envelope),
        }
    }

    /// Amount an additional envelope split would need to balance the entry
    pub fn envelope_imbalance(&self) -> Option<Money> {
        let account = self.account_total()?;
        match self.envelope_total() {
            Some(envelope) => Some(account - envelope),
            None => Some(account),
        }
    }

    /// Check whether the staged entry describes a valid, balanced
    /// transaction. On failure the reason is available from
    /// [`JournalEntry::last_error`].
    pub fn is_valid(&mut self) -> bool {
        if self.account_splits.is_empty() && self.envelope_splits.is_empty() {
            self.last_error = "Transaction must have at least one account or envelope split".into();
            return false;
        }

        if self.account_splits.len() > 1 && self.envelope_splits.len() > 1 {
            self.last_error =
                "Transaction cannot have multiple account and multiple envelope splits".into();
            return false;
        }

        // All splits must agree on a single currency
        let reference = self
            .account_splits
            .first()
            .map(|s| s.amount.currency())
            .or_else(|| self.envelope_splits.first().map(|s| s.amount.currency()));
        if let Some(currency) = reference {
            let mismatched = self
                .account_splits
                .iter()
                .map(|s| s.amount.currency())
                .chain(self.envelope_splits.iter().map(|s| s.amount.currency()))
                .any(|c| c != currency);
            if mismatched {
                self.last_error = "Currency conversion rates are not yet supported".into();
                return false;
            }
        }

        let zero = Money::zero(
            reference
                .cloned()
                .unwrap_or_default(),
        );
        let account_sum = self.account_total().unwrap_or_else(|| zero.clone());
        let envelope_sum = self.envelope_total().unwrap_or_else(|| zero.clone());
        if account_sum.clone() - envelope_sum.clone() != zero {
            self.last_error = format!(
                "Account split sum ({}) must equal envelope split sum ({})",
                account_sum, envelope_sum
            );
            return false;
        }

        self.last_error.clear();
        true
    }

    /// Reason the last validation or save failed
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// Commit the staged entry to the repository.
    ///
    /// The transaction record is written first, then queued deletions are
    /// applied, then every staged split is created or updated, and finally
    /// the repository is asked to commit the whole batch. On any error the
    /// staged state is left untouched so the entry can be corrected and
    /// saved again.
    pub fn save(&mut self, repo: &mut dyn TransactionRepository) -> Result<()> {
        if !self.is_valid() {
            return Err(Error::Journal(self.last_error.clone()));
        }

        if self.transaction.id > 0 {
            if let Err(err) = repo.update_transaction(&self.transaction) {
                return self.fail(format!("Transaction update error: {}", err));
            }
        } else {
            match repo.create_transaction(&self.transaction) {
                Ok(id) => self.transaction.id = id,
                Err(err) => {
                    return self.fail(format!("Transaction creation error: {}", err));
                }
            }
        }

        for split in &self.removed_account_splits {
            if let Err(err) = repo.remove_account_split(split) {
                return self.fail(format!("Account split deletion error: {}", err));
            }
        }
        for split in &self.removed_envelope_splits {
            if let Err(err) = repo.remove_envelope_split(split) {
                return self.fail(format!("Envelope split deletion error: {}", err));
            }
        }
        self.removed_account_splits.clear();
        self.removed_envelope_splits.clear();

        for split in &mut self.account_splits {
            split.transaction_id = self.transaction.id;
            if split.id > 0 {
                if let Err(err) = repo.update_account_split(split) {
                    let message = format!("Account split update error: {}", err);
                    self.last_error = message.clone();
                    warn!(error = %err, "journal save failed");
                    return Err(Error::Journal(message));
                }
            } else {
                match repo.create_account_split(split) {
                    Ok(id) => split.id = id,
                    Err(err) => {
                        let message = format!("Account split creation error: {}", err);
                        self.last_error = message.clone();
                        warn!(error = %err, "journal save failed");
                        return Err(Error::Journal(message));
                    }
                }
            }
        }

        for split in &mut self.envelope_splits {
            split.transaction_id = self.transaction.id;
            if split.id > 0 {
                if let Err(err) = repo.update_envelope_split(split) {
                    let message = format!("Envelope split update error: {}", err);
                    self.last_error = message.clone();
                    warn!(error = %err, "journal save failed");
                    return Err(Error::Journal(message));
                }
            } else {
                match repo.create_envelope_split(split) {
                    Ok(id) => split.id = id,
                    Err(err) => {
                        let message = format!("Envelope split creation error: {}", err);
                        self.last_error = message.clone();
                        warn!(error = %err, "journal save failed");
                        return Err(Error::Journal(message));
                    }
                }
            }
        }

        if let Err(err) = repo.save() {
            return self.fail(format!("Ledger entry create error: {}", err));
        }

        Ok(())
    }

    fn fail(&mut self, message: String) -> Result<()> {
        warn!(error = %message, "journal save failed");
        self.last_error = message.clone();
        Err(Error::Journal(message))
    }
}
