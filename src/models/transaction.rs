//! Imported transaction model
//!
//! An immutable, directional representation of a transfer of funds produced
//! by one of the import readers: money left the withdrawal account and
//! entered the deposit account.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::money::Money;

/// A single imported transfer of funds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedTransaction {
    /// Unique transaction ID, used to query assignments
    pub id: u32,

    /// Date on which the transaction occurred
    pub date: NaiveDate,

    /// Amount of money transferred
    pub amount: Money,

    /// Payee description
    pub payee: String,

    /// Transaction memo
    pub memo: String,

    /// Full path of the account from which funds were taken
    pub withdrawal_account: String,

    /// Full path of the account to which funds were added
    pub deposit_account: String,
}

impl ImportedTransaction {
    /// Deterministic sort key: date, then payee, memo, deposit account, and
    /// amount. The amount is compared by raw scaled value so that a batch
    /// containing multiple currencies still sorts without panicking.
    pub fn natural_cmp(&self, other: &Self) -> Ordering {
        self.date
            .cmp(&other.date)
            .then_with(|| self.payee.cmp(&other.payee))
            .then_with(|| self.memo.cmp(&other.memo))
            .then_with(|| self.deposit_account.cmp(&other.deposit_account))
            .then_with(|| self.amount.scaled().cmp(&other.amount.scaled()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Currency;

    fn txn(date: &str, payee: &str, memo: &str, deposit: &str, amount: &str) -> ImportedTransaction {
        ImportedTransaction {
            id: 1,
            date: date.parse().unwrap(),
            amount: Money::parse(amount, Currency::new("USD")).unwrap(),
            payee: payee.into(),
            memo: memo.into(),
            withdrawal_account: "Checking".into(),
            deposit_account: deposit.into(),
        }
    }

    #[test]
    fn test_orders_by_date_first() {
        let a = txn("2013-12-01", "Zeta", "z", "z", "99.00");
        let b = txn("2013-12-02", "Alpha", "a", "a", "1.00");
        assert_eq!(a.natural_cmp(&b), Ordering::Less);
    }

    #[test]
    fn test_tie_breaks_through_all_fields() {
        let a = txn("2013-12-01", "Store", "a", "Groceries", "10.00");
        let b = txn("2013-12-01", "Store", "a", "Groceries", "20.00");
        let c = txn("2013-12-01", "Store", "a", "Housewares", "10.00");
        let d = txn("2013-12-01", "Store", "b", "Groceries", "10.00");

        assert_eq!(a.natural_cmp(&b), Ordering::Less);
        assert_eq!(b.natural_cmp(&c), Ordering::Less);
        assert_eq!(c.natural_cmp(&d), Ordering::Less);
    }

    #[test]
    fn test_sort_is_deterministic() {
        let mut batch = vec![
            txn("2013-12-02", "B", "", "X", "5.00"),
            txn("2013-12-01", "A", "", "X", "5.00"),
            txn("2013-12-02", "A", "", "X", "5.00"),
        ];
        batch.sort_by(|a, b| a.natural_cmp(b));
        assert_eq!(batch[0].date.to_string(), "2013-12-01");
        assert_eq!(batch[1].payee, "A");
        assert_eq!(batch[2].payee, "B");
    }
}
