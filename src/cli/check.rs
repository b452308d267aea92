//! CLI command handler for file inspection
//!
//! Parses an import file and reports what it contains without assigning
//! anything.

use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::Result;
use crate::import::DateFilter;

use super::{collect_import, start_import};

/// Handle the check command
pub fn handle_check_command(
    file: &Path,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    csv_profile: Option<&str>,
) -> Result<()> {
    let handle = start_import(file, DateFilter::new(start, end), csv_profile)?;
    let transactions = collect_import(handle)?;

    if transactions.is_empty() {
        println!("No transactions found in {}.", file.display());
        return Ok(());
    }

    let mut accounts = BTreeSet::new();
    let mut first = transactions[0].date;
    let mut last = transactions[0].date;
    for txn in &transactions {
        accounts.insert(txn.withdrawal_account.as_str());
        accounts.insert(txn.deposit_account.as_str());
        first = first.min(txn.date);
        last = last.max(txn.date);
    }

    println!("{}", file.display());
    println!("  Transactions: {}", transactions.len());
    println!("  Accounts:     {}", accounts.len());
    println!("  Date range:   {} to {}", first, last);
    Ok(())
}
