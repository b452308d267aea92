//! Transaction-to-estimate assignment
//!
//! The assigner walks a batch of imported transactions against the ordered
//! assignment rules. The first rule that matches a transaction wins; the
//! transaction's amount is then credited to that rule's estimate. The
//! results land in an [`Actuals`] accumulator and an [`Assignments`] record
//! so that both "how much activity hit this estimate" and "why was this
//! transaction assigned there" can be answered afterwards.

use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::models::money::Money;
use crate::models::rules::AssignmentRules;
use crate::models::transaction::ImportedTransaction;

/// Accumulated actual activity per estimate
#[derive(Debug, Clone, Default)]
pub struct Actuals {
    totals: HashMap<u32, Money>,
}

impl Actuals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add activity against an estimate, accumulating with any prior amount
    pub fn record(&mut self, estimate_id: u32, amount: Money) {
        match self.totals.get_mut(&estimate_id) {
            Some(total) => *total += amount,
            None => {
                self.totals.insert(estimate_id, amount);
            }
        }
    }

    /// Accumulated activity for an estimate, if any was recorded
    pub fn value(&self, estimate_id: u32) -> Option<&Money> {
        self.totals.get(&estimate_id)
    }

    /// Number of estimates with recorded activity
    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    /// Discard all recorded activity
    pub fn clear(&mut self) {
        self.totals.clear();
    }

    /// Iterate over `(estimate_id, total)` pairs in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Money)> {
        self.totals.iter().map(|(id, total)| (*id, total))
    }
}

/// Provenance of one assignment: the estimate credited and the rule that
/// matched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Assignment {
    pub estimate_id: u32,
    pub rule_id: u32,
}

/// Record of where and why each transaction was assigned
///
/// ID 0 is a sentinel meaning "not assigned"; real rules and estimates
/// never carry that ID. The provenance is stored per transaction so it
/// stays answerable even after the rule list is edited.
#[derive(Debug, Clone, Default)]
pub struct Assignments {
    by_transaction: HashMap<u32, Assignment>,
}

impl Assignments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `rule_id` assigned the given transaction to `estimate_id`
    pub fn record(&mut self, transaction_id: u32, estimate_id: u32, rule_id: u32) {
        self.by_transaction.insert(
            transaction_id,
            Assignment {
                estimate_id,
                rule_id,
            },
        );
    }

    /// ID of the rule that assigned the transaction, or 0 if it was never
    /// assigned
    pub fn rule_for(&self, transaction_id: u32) -> u32 {
        self.by_transaction
            .get(&transaction_id)
            .map(|a| a.rule_id)
            .unwrap_or(0)
    }

    /// ID of the estimate the transaction was assigned to, or 0 if it was
    /// never assigned
    pub fn estimate_for(&self, transaction_id: u32) -> u32 {
        self.by_transaction
            .get(&transaction_id)
            .map(|a| a.estimate_id)
            .unwrap_or(0)
    }

    /// Number of assigned transactions
    pub fn len(&self) -> usize {
        self.by_transaction.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_transaction.is_empty()
    }

    /// Discard all recorded assignments
    pub fn clear(&mut self) {
        self.by_transaction.clear();
    }
}

/// Results of a completed assignment run
#[derive(Debug, Clone)]
pub struct AssignmentReport {
    /// Accumulated activity per estimate
    pub actuals: Actuals,
    /// Where and why each transaction was assigned
    pub assignments: Assignments,
    /// Number of transactions matched by some rule
    pub assigned: usize,
    /// Number of transactions no rule matched
    pub unassigned: usize,
}

/// Outcome of a call to [`TransactionAssigner::assign`]
#[derive(Debug)]
pub enum AssignOutcome {
    /// The run completed
    Completed(AssignmentReport),
    /// Another run was already in progress; nothing was done
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssignerState {
    Idle,
    Running,
}

/// Single-flight assigner: only one assignment run may be in progress at a
/// time, and a second caller is turned away rather than queued.
#[derive(Debug)]
pub struct TransactionAssigner {
    state: Mutex<AssignerState>,
}

impl TransactionAssigner {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AssignerState::Idle),
        }
    }

    fn try_start(&self) -> Option<RunGuard<'_>> {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *state == AssignerState::Running {
            return None;
        }
        *state = AssignerState::Running;
        Some(RunGuard { owner: self })
    }

    /// Assign a batch of transactions to estimates using the given rules.
    ///
    /// Rules are tried in priority order and the first match wins. A
    /// transaction no rule matches is counted but otherwise left alone.
    pub fn assign(
        &self,
        rules: &AssignmentRules,
        transactions: &[ImportedTransaction],
    ) -> AssignOutcome {
        let _guard = match self.try_start() {
            Some(guard) => guard,
            None => {
                debug!("assignment already in progress, rejecting");
                return AssignOutcome::AlreadyRunning;
            }
        };

        let mut actuals = Actuals::new();
        let mut assignments = Assignments::new();
        let mut assigned = 0usize;

        for transaction in transactions {
            let matched = rules.iter().find(|rule| rule.matches(transaction));
            match matched {
                Some(rule) => {
                    debug!(
                        transaction = transaction.id,
                        rule = rule.rule_id,
                        estimate = rule.estimate_id,
                        "assigned transaction"
                    );
                    assignments.record(transaction.id, rule.estimate_id, rule.rule_id);
                    actuals.record(rule.estimate_id, transaction.amount.clone());
                    assigned += 1;
                }
                None => {
                    debug!(transaction = transaction.id, "no rule matched");
                }
            }
        }

        let unassigned = transactions.len() - assigned;
        info!(
            total = transactions.len(),
            assigned, unassigned, "assignment run complete"
        );

        AssignOutcome::Completed(AssignmentReport {
            actuals,
            assignments,
            assigned,
            unassigned,
        })
    }
}

impl Default for TransactionAssigner {
    fn default() -> Self {
        Self::new()
    }
}

struct RunGuard<'a> {
    owner: &'a TransactionAssigner,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut state = match self.owner.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        *state = AssignerState::Idle;
    }
}
