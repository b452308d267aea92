//! GnuCash XML reader
//!
//! Reads uncompressed GnuCash v2 book files and produces directional
//! imported transactions. GnuCash records each transaction as a set of
//! splits; the reader determines the primary split (the unique negative
//! split, or failing that the unique positive split) and emits one imported
//! transaction per remaining split, describing the transfer between the
//! primary account and that split's account.
//!
//! A withdrawal from an expense account is treated as a refund: the
//! transfer direction is flipped back toward the expense account and the
//! amount negated, so downstream actuals are reduced rather than increased.
//!
//! Any structural problem (unknown account type, unresolvable primary
//! split, malformed value) aborts the entire import; a partial batch is
//! never produced.

use chrono::NaiveDate;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;
use uuid::Uuid;

use super::DateFilter;
use crate::error::{Error, Result};
use crate::models::currency::Currency;
use crate::models::money::Money;
use crate::models::transaction::ImportedTransaction;

/// Result of a read that was not aborted by an error
#[derive(Debug)]
pub enum ReadOutcome {
    /// The whole file was read
    Complete(Vec<ImportedTransaction>),
    /// The read was cancelled; any partial batch is discarded
    Cancelled,
}

/// Reader for GnuCash v2 XML book files
#[derive(Debug, Clone, Default)]
pub struct GnuCashReader {
    filter: DateFilter,
}

impl GnuCashReader {
    pub fn new(filter: DateFilter) -> Self {
        Self { filter }
    }

    /// Read all transactions from the given input. The cancel flag is
    /// checked between transactions; `progress` receives the number of
    /// bytes consumed so far after each transaction element.
    pub fn read<R: BufRead>(
        &self,
        input: R,
        cancel: &AtomicBool,
        progress: &mut dyn FnMut(u64),
    ) -> Result<ReadOutcome> {
        let mut parser = Parser {
            reader: Reader::from_reader(input),
            buf: Vec::new(),
            accounts: HashMap::new(),
            transactions: Vec::new(),
            filter: &self.filter,
            cancel,
            progress,
            cancelled: false,
        };
        parser.run()?;

        if parser.cancelled {
            return Ok(ReadOutcome::Cancelled);
        }

        let mut transactions = parser.transactions;
        transactions.sort_by(|a, b| a.natural_cmp(b));
        Ok(ReadOutcome::Complete(transactions))
    }

    /// Read all transactions from the input without cancellation or
    /// progress reporting
    pub fn read_all<R: BufRead>(&self, input: R) -> Result<Vec<ImportedTransaction>> {
        match self.read(input, &AtomicBool::new(false), &mut |_| {})? {
            ReadOutcome::Complete(transactions) => Ok(transactions),
            // Unreachable with a cancel flag that is never raised
            ReadOutcome::Cancelled => Ok(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccountType {
    Asset,
    Bank,
    Cash,
    Credit,
    Equity,
    Expense,
    Income,
    Liability,
    Root,
}

impl AccountType {
    fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ASSET" => Some(Self::Asset),
            "BANK" => Some(Self::Bank),
            "CASH" => Some(Self::Cash),
            "CREDIT" => Some(Self::Credit),
            "EQUITY" => Some(Self::Equity),
            "EXPENSE" => Some(Self::Expense),
            "INCOME" => Some(Self::Income),
            "LIABILITY" => Some(Self::Liability),
            "ROOT" => Some(Self::Root),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct GnuCashAccount {
    /// Colon-joined path from the first non-root ancestor down
    path: String,
    account_type: AccountType,
}

#[derive(Debug, Clone)]
struct RawSplit {
    uid: Uuid,
    memo: String,
    account: Uuid,
    dividend: i64,
    divisor: i64,
}

/// Internal UID for GnuCash GUID strings
fn guid(text: &str) -> Uuid {
    Uuid::new_v5(&Uuid::nil(), text.as_bytes())
}

/// Stable 32-bit transaction ID derived from a split UID
fn short_id(uid: &Uuid) -> u32 {
    uid.as_bytes()
        .chunks(4)
        .fold(0u32, |acc, c| acc ^ u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
}

struct Parser<'a, R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    accounts: HashMap<Uuid, GnuCashAccount>,
    transactions: Vec<ImportedTransaction>,
    filter: &'a DateFilter,
    cancel: &'a AtomicBool,
    progress: &'a mut dyn FnMut(u64),
    cancelled: bool,
}

impl<R: BufRead> Parser<'_, R> {
    fn next(&mut self) -> Result<Event<'static>> {
        self.buf.clear();
        Ok(self.reader.read_event_into(&mut self.buf)?.into_owned())
    }

    /// Skip the rest of the element opened by `start`
    fn skip(&mut self, start: &BytesStart) -> Result<()> {
        let mut buf = Vec::new();
        self.reader.read_to_end_into(start.name(), &mut buf)?;
        Ok(())
    }

    /// Text content of the element just opened, up to its end tag
    fn read_text(&mut self) -> Result<String> {
        let mut text = String::new();
        let mut depth = 0usize;
        loop {
            match self.next()? {
                Event::Text(t) => text.push_str(t.unescape()?.trim()),
                Event::Start(_) => depth += 1,
                Event::End(_) => {
                    if depth == 0 {
                        return Ok(text);
                    }
                    depth -= 1;
                }
                Event::Eof => {
                    return Err(Error::Import("Unexpected end of GnuCash file".into()))
                }
                _ => {}
            }
        }
    }

    fn run(&mut self) -> Result<()> {
        loop {
            match self.next()? {
                Event::Start(e) => {
                    return if e.name().as_ref() == b"gnc-v2" {
                        self.parse_gnc_file()
                    } else {
                        Err(Error::Import(
                            "The given XML is not a valid GnuCash file".into(),
                        ))
                    };
                }
                Event::Eof => {
                    return Err(Error::Import(
                        "The given XML is not a valid GnuCash file".into(),
                    ))
                }
                _ => {}
            }
        }
    }

    fn parse_gnc_file(&mut self) -> Result<()> {
        let mut found_book = false;
        loop {
            match self.next()? {
                Event::Start(e) => {
                    if e.name().as_ref() == b"gnc:book" {
                        let version = e
                            .try_get_attribute("version")
                            .map_err(|err| Error::Import(err.to_string()))?
                            .map(|a| a.unescape_value().map(|v| v.into_owned()))
                            .transpose()?
                            .unwrap_or_default();
                        if version != "2.0.0" {
                            return Err(Error::Import(format!(
                                "Unsupported GnuCash version, {}",
                                version
                            )));
                        }
                        found_book = true;
                        self.parse_book()?;
                        if self.cancelled {
                            return Ok(());
                        }
                    } else {
                        self.skip(&e)?;
                    }
                }
                Event::End(_) | Event::Eof => break,
                _ => {}
            }
        }

        if !found_book {
            return Err(Error::Import(
                "XML is missing the GnuCash book element".into(),
            ));
        }
        Ok(())
    }

    fn parse_book(&mut self) -> Result<()> {
        loop {
            match self.next()? {
                Event::Start(e) => match e.name().as_ref() {
                    b"gnc:account" => self.parse_account()?,
                    b"gnc:transaction" => {
                        self.parse_transaction()?;
                        (self.progress)(self.reader.buffer_position() as u64);
                        if self.cancel.load(Ordering::Relaxed) {
                            self.cancelled = true;
                            return Ok(());
                        }
                    }
                    _ => self.skip(&e)?,
                },
                Event::End(_) | Event::Eof => return Ok(()),
                _ => {}
            }
        }
    }

    fn parse_account(&mut self) -> Result<()> {
        let mut uid = None;
        let mut parent_uid = None;
        let mut name = String::new();
        let mut type_str = String::new();

        loop {
            match self.next()? {
                Event::Start(e) => match e.name().as_ref() {
                    b"act:id" => uid = Some(guid(&self.read_text()?)),
                    b"act:parent" => parent_uid = Some(guid(&self.read_text()?)),
                    b"act:name" => name = self.read_text()?,
                    b"act:type" => type_str = self.read_text()?,
                    _ => self.skip(&e)?,
                },
                Event::End(_) | Event::Eof => break,
                _ => {}
            }
        }

        let account_type = AccountType::parse(&type_str)
            .ok_or_else(|| Error::Import(format!("Unknown account type, {}", type_str)))?;
        let uid =
            uid.ok_or_else(|| Error::Import(format!("Missing account UID for {}", name)))?;

        if account_type == AccountType::Root {
            // The root is anonymous; descendant paths start below it
            self.accounts.insert(
                uid,
                GnuCashAccount {
                    path: String::new(),
                    account_type,
                },
            );
            return Ok(());
        }

        let parent_uid = parent_uid
            .ok_or_else(|| Error::Import(format!("Missing parent UID for {}", name)))?;
        let parent = self
            .accounts
            .get(&parent_uid)
            .ok_or_else(|| Error::Import(format!("Missing parent account for {}", name)))?;
        let path = if parent.path.is_empty() {
            name
        } else {
            format!("{}:{}", parent.path, name)
        };
        debug!(account = %path, "read account");
        self.accounts.insert(
            uid,
            GnuCashAccount { path, account_type },
        );
        Ok(())
    }

    fn parse_transaction(&mut self) -> Result<()> {
        let mut date = None;
        let mut currency = String::from("USD");
        let mut payee = String::new();
        let mut splits = Vec::new();

        loop {
            match self.next()? {
                Event::Start(e) => match e.name().as_ref() {
                    b"trn:date-posted" => date = Some(self.parse_date()?),
                    b"trn:currency" => currency = self.parse_currency()?,
                    b"trn:description" => payee = self.read_text()?,
                    b"trn:splits" => splits = self.parse_splits()?,
                    _ => self.skip(&e)?,
                },
                Event::End(_) | Event::Eof => break,
                _ => {}
            }
        }

        let date = date.ok_or_else(|| {
            Error::Import(format!("Missing posted date for transaction, {}", payee))
        })?;

        // Filter by date only when both bounds are given; the range is
        // inclusive on both ends
        if let (Some(start), Some(end)) = (self.filter.start, self.filter.end) {
            if date < start || end < date {
                return Ok(());
            }
        }

        self.create_transactions(date, &currency, &payee, &splits)
    }

    fn parse_splits(&mut self) -> Result<Vec<RawSplit>> {
        let mut splits = Vec::new();
        loop {
            match self.next()? {
                Event::Start(e) => {
                    if e.name().as_ref() == b"trn:split" {
                        splits.push(self.parse_split()?);
                    } else {
                        self.skip(&e)?;
                    }
                }
                Event::End(_) | Event::Eof => return Ok(splits),
                _ => {}
            }
        }
    }

    fn parse_split(&mut self) -> Result<RawSplit> {
        let mut split = RawSplit {
            uid: Uuid::nil(),
            memo: String::new(),
            account: Uuid::nil(),
            dividend: 0,
            divisor: 1,
        };

        loop {
            match self.next()? {
                Event::Start(e) => match e.name().as_ref() {
                    b"split:id" => split.uid = guid(&self.read_text()?),
                    b"split:memo" => split.memo = self.read_text()?,
                    b"split:value" => {
                        let text = self.read_text()?;
                        (split.dividend, split.divisor) = parse_fraction(&text)?;
                    }
                    b"split:account" => split.account = guid(&self.read_text()?),
                    _ => self.skip(&e)?,
                },
                Event::End(_) | Event::Eof => return Ok(split),
                _ => {}
            }
        }
    }

    fn parse_date(&mut self) -> Result<NaiveDate> {
        let mut date = None;
        loop {
            match self.next()? {
                Event::Start(e) => {
                    if e.name().as_ref() == b"ts:date" {
                        let text = self.read_text()?;
                        // Timestamps carry a time and zone suffix; only the
                        // calendar date matters
                        let parsed = text
                            .get(..10)
                            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
                        match parsed {
                            Some(d) => date = Some(d),
                            None => {
                                return Err(Error::Import(format!(
                                    "Date string, {}, is invalid",
                                    text
                                )))
                            }
                        }
                    } else {
                        self.skip(&e)?;
                    }
                }
                Event::End(_) | Event::Eof => break,
                _ => {}
            }
        }
        date.ok_or_else(|| Error::Import("Date string not found".into()))
    }

    fn parse_currency(&mut self) -> Result<String> {
        let mut iso4217 = String::new();
        loop {
            match self.next()? {
                Event::Start(e) => match e.name().as_ref() {
                    b"cmdty:id" => iso4217 = self.read_text()?,
                    b"cmdty:space" => {
                        let space = self.read_text()?;
                        if space != "ISO4217" {
                            return Err(Error::Import(format!(
                                "Unsupported commodity space, {}",
                                space
                            )));
                        }
                    }
                    _ => self.skip(&e)?,
                },
                Event::End(_) | Event::Eof => break,
                _ => {}
            }
        }
        if iso4217.is_empty() {
            return Err(Error::Import("Currency string not found".into()));
        }
        Ok(iso4217)
    }

    fn create_transactions(
        &mut self,
        date: NaiveDate,
        currency: &str,
        payee: &str,
        splits: &[RawSplit],
    ) -> Result<()> {
        let primary_uid = find_primary(splits).ok_or_else(|| {
            Error::Import(format!(
                "Cannot determine primary split for transaction, {}, posted on {}",
                payee, date
            ))
        })?;
        let primary = splits
            .iter()
            .find(|s| s.uid == primary_uid)
            .ok_or_else(|| Error::Import("Primary split disappeared".into()))?;
        let primary_account = self.account_for(primary, payee, date)?.clone();

        let primary_is_withdrawal = primary.dividend < 0;
        // A withdrawal from an expense account is a refund
        let refund = primary_is_withdrawal && primary_account.account_type == AccountType::Expense;

        for split in splits.iter().filter(|s| s.uid != primary_uid) {
            let split_account = self.account_for(split, payee, date)?;

            let (withdrawal, deposit) = if primary_is_withdrawal && !refund {
                (primary_account.path.clone(), split_account.path.clone())
            } else {
                (split_account.path.clone(), primary_account.path.clone())
            };

            // Refunds transfer the negated amount back toward the expense
            let dividend = if refund { -split.dividend } else { split.dividend };
            let amount = Money::from_fraction(dividend, split.divisor, Currency::new(currency))
                .map_err(|err| Error::Import(err.to_string()))?;

            self.transactions.push(ImportedTransaction {
                id: short_id(&split.uid),
                date,
                amount,
                payee: payee.to_string(),
                memo: split.memo.clone(),
                withdrawal_account: withdrawal,
                deposit_account: deposit,
            });
        }
        Ok(())
    }

    fn account_for(
        &self,
        split: &RawSplit,
        payee: &str,
        date: NaiveDate,
    ) -> Result<&GnuCashAccount> {
        self.accounts.get(&split.account).ok_or_else(|| {
            let memo = if split.memo.is_empty() {
                String::new()
            } else {
                format!(" ({})", split.memo)
            };
            Error::Import(format!(
                "Account does not exist for {} split{} for {}/{} posted on {}",
                payee, memo, split.dividend, split.divisor, date
            ))
        })
    }
}

/// Split values are fractions like `6000/100`
fn parse_fraction(text: &str) -> Result<(i64, i64)> {
    let (dividend, divisor) = text
        .split_once('/')
        .ok_or_else(|| Error::Import(format!("Invalid split value, {}", text)))?;
    let dividend: i64 = dividend
        .trim()
        .parse()
        .map_err(|_| Error::Import(format!("Invalid split value, {}", text)))?;
    let divisor: i64 = divisor
        .trim()
        .parse()
        .map_err(|_| Error::Import(format!("Invalid split value, {}", text)))?;
    if divisor == 0 {
        return Err(Error::Import(format!("Attempted division by 0, {}", text)));
    }
    Ok((dividend, divisor))
}

/// Determine the primary split: the unique negative split if there is one,
/// otherwise the unique positive split. Zero-value splits are ignored. Both
/// sides ambiguous (or no nonzero splits at all) means no primary exists.
fn find_primary(splits: &[RawSplit]) -> Option<Uuid> {
    let mut negatives = 0usize;
    let mut positives = 0usize;
    let mut negative = None;
    let mut positive = None;

    for split in splits {
        if split.dividend == 0 {
            continue;
        }
        if (split.dividend < 0) != (split.divisor < 0) {
            negatives += 1;
            negative = Some(split.uid);
        } else {
            positives += 1;
            positive = Some(split.uid);
        }
    }

    if negatives == 1 {
        negative
    } else if positives == 1 {
        positive
    } else {
        None
    }
}
