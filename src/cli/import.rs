//! CLI command handler for file import and assignment
//!
//! Imports a GnuCash book or CSV statement, assigns the batch against a
//! rules file, and prints per-estimate actuals (and budget progress when a
//! budget file is given).

use chrono::NaiveDate;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{Error, Result};
use crate::import::DateFilter;
use crate::models::estimate::{EstimateTree, ROOT_ESTIMATE_ID};
use crate::models::rules::AssignmentRules;
use crate::services::assigner::{Actuals, AssignOutcome, TransactionAssigner};

use super::{collect_import, start_import};

/// Options for the import command
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Start of the inclusive date range
    pub start: Option<NaiveDate>,
    /// End of the inclusive date range
    pub end: Option<NaiveDate>,
    /// Named CSV column profile; forces CSV mode
    pub csv_profile: Option<String>,
}

/// Handle the import command
pub fn handle_import_command(
    file: &Path,
    rules_file: &Path,
    budget_file: Option<&Path>,
    options: &ImportOptions,
) -> Result<()> {
    let rules = load_rules(rules_file)?;
    let budget = budget_file.map(load_budget).transpose()?;

    let filter = DateFilter::new(options.start, options.end);
    let handle = start_import(file, filter, options.csv_profile.as_deref())?;
    let transactions = collect_import(handle)?;

    if transactions.is_empty() {
        println!("No transactions found in {}.", file.display());
        return Ok(());
    }

    let assigner = TransactionAssigner::new();
    let report = match assigner.assign(&rules, &transactions) {
        AssignOutcome::Completed(report) => report,
        AssignOutcome::AlreadyRunning => {
            return Err(Error::Validation("An assignment is already running".into()))
        }
    };

    println!("Imported {} transactions from {}", transactions.len(), file.display());
    println!(
        "Assigned: {}    Unassigned: {}",
        report.assigned, report.unassigned
    );
    println!();

    match budget {
        Some(tree) => print_budget_progress(&tree, &report.actuals, options.start)?,
        None => print_actuals(&report.actuals),
    }
    Ok(())
}

fn load_rules(path: &Path) -> Result<AssignmentRules> {
    let file = File::open(path)
        .map_err(|err| Error::Io(format!("Failed to open {}: {}", path.display(), err)))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn load_budget(path: &Path) -> Result<EstimateTree> {
    let file = File::open(path)
        .map_err(|err| Error::Io(format!("Failed to open {}: {}", path.display(), err)))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn print_actuals(actuals: &Actuals) {
    println!("Actuals by estimate:");
    let mut entries: Vec<_> = actuals.iter().collect();
    entries.sort_by_key(|(id, _)| *id);
    for (estimate_id, total) in entries {
        println!("  {:>6}  {}", estimate_id, total);
    }
}

fn print_budget_progress(
    tree: &EstimateTree,
    actuals: &Actuals,
    period_start: Option<NaiveDate>,
) -> Result<()> {
    println!("Budget progress:");
    for id in tree.subtree_ids(ROOT_ESTIMATE_ID) {
        if id == ROOT_ESTIMATE_ID {
            continue;
        }
        let estimate = match tree.find(id) {
            Some(estimate) => estimate,
            None => continue,
        };
        let progress = tree.progress(id, actuals, period_start)?;
        let marker = if progress.healthy { " " } else { "!" };
        let note = progress
            .note
            .map(|n| format!("  ({})", n))
            .unwrap_or_default();
        println!(
            "{} {:<30} {:>14} of {:>14}{}",
            marker,
            estimate.name,
            progress.actual.to_string(),
            progress.estimated.to_string(),
            note
        );
    }
    Ok(())
}
