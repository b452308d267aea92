//! CSV statement importer
//!
//! Reads bank-style CSV exports into imported transactions using a
//! configurable column profile. A CSV statement describes activity against
//! one account; the transfer direction of each row is derived from the sign
//! of its amount, with the profile's offset account standing in for the
//! unknown other side.
//!
//! Unlike rule data, statement files are all-or-nothing: any row that fails
//! to parse aborts the whole import.

use chrono::NaiveDate;
use csv::ReaderBuilder;
use std::hash::{Hash, Hasher};
use std::io::Read;

use super::DateFilter;
use crate::error::{Error, Result};
use crate::models::currency::Currency;
use crate::models::money::Money;
use crate::models::transaction::ImportedTransaction;

/// Column layout and parsing options for a CSV statement
#[derive(Debug, Clone)]
pub struct ColumnProfile {
    /// Index of the date column
    pub date_column: usize,
    /// Index of the signed amount column
    pub amount_column: usize,
    /// Index of the payee/description column
    pub payee_column: Option<usize>,
    /// Index of the memo/notes column
    pub memo_column: Option<usize>,
    /// Primary date format (e.g., "%Y-%m-%d", "%m/%d/%Y")
    pub date_format: String,
    /// Whether the first row is a header
    pub has_header: bool,
    /// Delimiter character
    pub delimiter: u8,
    /// Whether to invert amounts (some banks use positive for debits)
    pub invert_amounts: bool,
    /// Account the statement describes
    pub account: String,
    /// Stand-in account for the unknown other side of each transfer
    pub offset_account: String,
    /// ISO 4217 currency code of the statement
    pub currency: String,
}

impl Default for ColumnProfile {
    fn default() -> Self {
        Self {
            date_column: 0,
            amount_column: 1,
            payee_column: Some(2),
            memo_column: None,
            date_format: "%Y-%m-%d".to_string(),
            has_header: true,
            delimiter: b',',
            invert_amounts: false,
            account: "Checking".to_string(),
            offset_account: "Imported".to_string(),
            currency: "USD".to_string(),
        }
    }
}

impl ColumnProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Common layout for bank exports (date, description, amount)
    pub fn simple_bank() -> Self {
        Self {
            date_column: 0,
            amount_column: 2,
            payee_column: Some(1),
            date_format: "%m/%d/%Y".to_string(),
            ..Self::default()
        }
    }

    /// Common layout for credit card exports
    pub fn credit_card() -> Self {
        Self {
            date_column: 0,
            amount_column: 2,
            payee_column: Some(1),
            memo_column: Some(3),
            date_format: "%m/%d/%Y".to_string(),
            // Credit cards often show positive for purchases
            invert_amounts: true,
            ..Self::default()
        }
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = account.into();
        self
    }

    pub fn with_date_format(mut self, format: &str) -> Self {
        self.date_format = format.to_string();
        self
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

/// CSV statement reader
#[derive(Debug, Clone, Default)]
pub struct CsvImporter {
    profile: ColumnProfile,
    filter: DateFilter,
}

impl CsvImporter {
    pub fn new(profile: ColumnProfile, filter: DateFilter) -> Self {
        Self { profile, filter }
    }

    /// Read all rows of the statement into imported transactions
    pub fn read_all<R: Read>(&self, input: R) -> Result<Vec<ImportedTransaction>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(self.profile.has_header)
            .delimiter(self.profile.delimiter)
            .flexible(true)
            .from_reader(input);

        let mut transactions = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record
                .map_err(|err| Error::Import(format!("Error reading CSV row {}: {}", row + 1, err)))?;

            let date_str = record
                .get(self.profile.date_column)
                .map(str::trim)
                .unwrap_or("");
            let date = parse_date(date_str, &self.profile.date_format)
                .ok_or_else(|| Error::Import(format!("Invalid date, {}, on row {}", date_str, row + 1)))?;

            let amount_str = record
                .get(self.profile.amount_column)
                .map(str::trim)
                .unwrap_or("");
            let mut amount = parse_amount(amount_str, &self.profile.currency).ok_or_else(|| {
                Error::Import(format!("Invalid amount, {}, on row {}", amount_str, row + 1))
            })?;
            if self.profile.invert_amounts {
                amount = -amount;
            }

            let payee = self
                .profile
                .payee_column
                .and_then(|col| record.get(col))
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            let memo = self
                .profile
                .memo_column
                .and_then(|col| record.get(col))
                .map(|s| s.trim().to_string())
                .unwrap_or_default();

            if let (Some(start), Some(end)) = (self.filter.start, self.filter.end) {
                if date < start || end < date {
                    continue;
                }
            }

            // Negative rows are money leaving the statement account
            let (withdrawal, deposit, amount) = if amount.is_negative() {
                (
                    self.profile.account.clone(),
                    self.profile.offset_account.clone(),
                    amount.abs(),
                )
            } else {
                (
                    self.profile.offset_account.clone(),
                    self.profile.account.clone(),
                    amount,
                )
            };

            transactions.push(ImportedTransaction {
                id: row_id(date, amount.scaled(), &payee, row),
                date,
                amount,
                payee,
                memo,
                withdrawal_account: withdrawal,
                deposit_account: deposit,
            });
        }

        transactions.sort_by(|a, b| a.natural_cmp(b));
        Ok(transactions)
    }
}

/// Stable row ID derived from the row's content and position
fn row_id(date: NaiveDate, scaled: i64, payee: &str, row: usize) -> u32 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    date.hash(&mut hasher);
    scaled.hash(&mut hasher);
    payee.hash(&mut hasher);
    row.hash(&mut hasher);
    hasher.finish() as u32
}

/// Try the profile's format first, then common bank formats
fn parse_date(s: &str, primary_format: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(s, primary_format) {
        return Some(date);
    }
    let formats = [
        "%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%d/%m/%Y", "%d/%m/%y", "%Y/%m/%d", "%m-%d-%Y",
    ];
    formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(s, format).ok())
}

/// Parse an amount string, tolerating currency symbols, thousands
/// separators, and accounting-style parentheses for negatives
fn parse_amount(s: &str, currency: &str) -> Option<Money> {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '(' | ')'))
        .collect();

    let (negative, value) = if cleaned.starts_with('(') && cleaned.ends_with(')') {
        (true, &cleaned[1..cleaned.len() - 1])
    } else if let Some(stripped) = cleaned.strip_prefix('-') {
        (true, stripped)
    } else {
        (false, cleaned.as_str())
    };

    Money::parse(value, Currency::new(currency))
        .ok()
        .map(|m| if negative { -m } else { m })
}
