//! Assignment rules and condition matching
//!
//! A rule maps imported transactions to one estimate through an ordered set
//! of conditions, all of which must hold. Rules live in a priority-ordered
//! list: during assignment the first qualifying rule wins, regardless of how
//! specific any later rule may be.
//!
//! Condition evaluation is deliberately forgiving: a malformed value or an
//! operator that does not apply to the condition's field simply fails to
//! match. Rule data often comes from hand-edited files, and a bad condition
//! must not abort an entire assignment pass.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::currency::Currency;
use super::money::Money;
use super::transaction::ImportedTransaction;

/// Comparison operator for a rule condition.
///
/// A single flat enum is used across all condition kinds so that
/// deserialized rule data can carry an operator inapplicable to its field;
/// such combinations evaluate to "no match".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    BeginsWith,
    EndsWith,
    StringEquals,
    Contains,
    Before,
    After,
    DateEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    AmountEquals,
}

/// String-valued transaction field a text condition applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextField {
    Payee,
    Memo,
    DepositAccount,
    WithdrawalAccount,
}

/// A single match condition within an assignment rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Condition {
    /// Compare the transaction date against an ISO date in `value`
    Date { op: Operator, value: String },

    /// Compare the transaction amount against `value` encoded as
    /// `"<number>,<currencyCode>"`
    Amount { op: Operator, value: String },

    /// Compare a string field against `value`
    Text {
        field: TextField,
        op: Operator,
        case_sensitive: bool,
        value: String,
    },
}

impl Condition {
    /// Evaluate this condition against a transaction. Malformed values and
    /// inapplicable operators yield `false`, never an error.
    pub fn matches(&self, transaction: &ImportedTransaction) -> bool {
        match self {
            Condition::Date { op, value } => date_qualifies(transaction.date, *op, value),
            Condition::Amount { op, value } => amount_qualifies(&transaction.amount, *op, value),
            Condition::Text {
                field,
                op,
                case_sensitive,
                value,
            } => {
                let actual = match field {
                    TextField::Payee => &transaction.payee,
                    TextField::Memo => &transaction.memo,
                    TextField::DepositAccount => &transaction.deposit_account,
                    TextField::WithdrawalAccount => &transaction.withdrawal_account,
                };
                text_qualifies(actual, *op, *case_sensitive, value)
            }
        }
    }
}

/// Date condition predicate: `value` must parse as an ISO date
fn date_qualifies(date: NaiveDate, op: Operator, value: &str) -> bool {
    let target: NaiveDate = match value.parse() {
        Ok(d) => d,
        Err(_) => return false,
    };

    match op {
        Operator::Before => date < target,
        Operator::After => date > target,
        Operator::DateEquals => date == target,
        _ => false,
    }
}

/// Amount condition predicate: `value` must be exactly
/// `"<number>,<currencyCode>"`.
///
/// The comparison money is constructed in the condition's currency, so the
/// comparison itself inherits Money's same-currency precondition: matching a
/// condition denominated in a different currency than the transaction is a
/// caller error and panics.
fn amount_qualifies(amount: &Money, op: Operator, value: &str) -> bool {
    let mut tokens = value.split(',');
    let (number, code) = match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(n), Some(c), None) => (n, c),
        _ => return false,
    };

    let target = match Money::parse(number, Currency::new(code)) {
        Ok(m) => m,
        Err(_) => return false,
    };

    match op {
        Operator::LessThan => *amount < target,
        Operator::LessThanOrEqual => *amount <= target,
        Operator::GreaterThan => *amount > target,
        Operator::GreaterThanOrEqual => *amount >= target,
        Operator::AmountEquals => *amount == target,
        _ => false,
    }
}

/// String condition predicate
fn text_qualifies(actual: &str, op: Operator, case_sensitive: bool, value: &str) -> bool {
    let (actual, value) = if case_sensitive {
        (actual.to_string(), value.to_string())
    } else {
        (actual.to_lowercase(), value.to_lowercase())
    };

    match op {
        Operator::BeginsWith => actual.starts_with(&value),
        Operator::EndsWith => actual.ends_with(&value),
        Operator::Contains => actual.contains(&value),
        Operator::StringEquals => actual == value,
        _ => false,
    }
}

/// An ordered set of conditions mapping transactions to one estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRule {
    /// Unique rule ID (non-zero; 0 is the "no assignment" sentinel)
    pub rule_id: u32,

    /// ID of the estimate this rule assigns transactions to
    pub estimate_id: u32,

    /// Conditions, all of which must hold; an empty list matches everything
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl AssignmentRule {
    /// Create a rule with no conditions (a catch-all)
    pub fn new(rule_id: u32, estimate_id: u32) -> Self {
        Self {
            rule_id,
            estimate_id,
            conditions: Vec::new(),
        }
    }

    /// Create a rule with the given conditions
    pub fn with_conditions(rule_id: u32, estimate_id: u32, conditions: Vec<Condition>) -> Self {
        Self {
            rule_id,
            estimate_id,
            conditions,
        }
    }

    /// Whether every condition of this rule holds for the transaction
    pub fn matches(&self, transaction: &ImportedTransaction) -> bool {
        self.conditions.iter().all(|c| c.matches(transaction))
    }
}

/// A user-defined, priority-ordered list of assignment rules.
///
/// List order is match priority. Lookup indices are maintained by rule ID
/// and by estimate ID; estimate-scoped lookup returns the most recently
/// added rule first, but assignment always walks the list in priority order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<AssignmentRule>", into = "Vec<AssignmentRule>")]
pub struct AssignmentRules {
    rules: Vec<AssignmentRule>,
    by_rule: HashMap<u32, usize>,
    by_estimate: HashMap<u32, Vec<usize>>,
}

impl AssignmentRules {
    /// Create an empty rules list
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rules in the list
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterate rules in priority order
    pub fn iter(&self) -> impl Iterator<Item = &AssignmentRule> {
        self.rules.iter()
    }

    /// The rule at the given priority index
    pub fn at(&self, index: usize) -> Option<&AssignmentRule> {
        self.rules.get(index)
    }

    /// Priority index of the rule with the given ID
    pub fn index_of(&self, rule_id: u32) -> Option<usize> {
        self.by_rule.get(&rule_id).copied()
    }

    /// Find a rule by ID
    pub fn find(&self, rule_id: u32) -> Option<&AssignmentRule> {
        self.index_of(rule_id).and_then(|i| self.rules.get(i))
    }

    /// Rules associated with the given estimate, most recently added first
    pub fn rules_for(&self, estimate_id: u32) -> Vec<&AssignmentRule> {
        self.by_estimate
            .get(&estimate_id)
            .map(|indices| indices.iter().map(|&i| &self.rules[i]).collect())
            .unwrap_or_default()
    }

    /// Append a rule at the end of the list (lowest priority).
    ///
    /// Rule IDs must be unique and non-zero.
    pub fn add(&mut self, rule: AssignmentRule) -> crate::error::Result<()> {
        self.insert(self.rules.len(), rule)
    }

    /// Insert a rule at the given priority index
    pub fn insert(&mut self, index: usize, rule: AssignmentRule) -> crate::error::Result<()> {
        if rule.rule_id == 0 {
            return Err(crate::error::Error::Validation(
                "Rule ID 0 is reserved".into(),
            ));
        }
        if self.by_rule.contains_key(&rule.rule_id) {
            return Err(crate::error::Error::Validation(format!(
                "Duplicate rule ID: {}",
                rule.rule_id
            )));
        }
        let index = index.min(self.rules.len());
        self.rules.insert(index, rule);
        self.reindex();
        Ok(())
    }

    /// Clone an existing rule, appending the copy at the end of the list
    /// with a freshly generated ID. Returns the new rule's ID.
    pub fn clone_rule(&mut self, rule_id: u32) -> crate::error::Result<u32> {
        let original = self
            .find(rule_id)
            .ok_or_else(|| crate::error::Error::rule_not_found(rule_id.to_string()))?
            .clone();
        let new_id = self.next_rule_id();
        self.add(AssignmentRule {
            rule_id: new_id,
            ..original
        })?;
        Ok(new_id)
    }

    /// Remove the rule with the given ID
    pub fn remove(&mut self, rule_id: u32) -> crate::error::Result<AssignmentRule> {
        let index = self
            .index_of(rule_id)
            .ok_or_else(|| crate::error::Error::rule_not_found(rule_id.to_string()))?;
        Ok(self.remove_at(index).expect("index from live map"))
    }

    /// Remove the rule at the given priority index
    pub fn remove_at(&mut self, index: usize) -> Option<AssignmentRule> {
        if index >= self.rules.len() {
            return None;
        }
        let rule = self.rules.remove(index);
        self.reindex();
        Some(rule)
    }

    /// Remove all rules associated with the given estimate
    pub fn remove_all(&mut self, estimate_id: u32) -> Vec<AssignmentRule> {
        let removed: Vec<AssignmentRule> = self
            .rules
            .iter()
            .filter(|r| r.estimate_id == estimate_id)
            .cloned()
            .collect();
        self.rules.retain(|r| r.estimate_id != estimate_id);
        self.reindex();
        removed
    }

    /// Move a rule from one priority index to another
    pub fn move_rule(&mut self, from: usize, to: usize) {
        if from >= self.rules.len() {
            return;
        }
        let to = to.min(self.rules.len() - 1);
        let rule = self.rules.remove(from);
        self.rules.insert(to, rule);
        self.reindex();
    }

    /// One greater than the largest rule ID in use (never 0)
    pub fn next_rule_id(&self) -> u32 {
        self.rules.iter().map(|r| r.rule_id).max().unwrap_or(0) + 1
    }

    fn reindex(&mut self) {
        self.by_rule.clear();
        self.by_estimate.clear();
        for (i, rule) in self.rules.iter().enumerate() {
            self.by_rule.insert(rule.rule_id, i);
            // Front insertion keeps estimate-scoped lookup newest-first
            self.by_estimate
                .entry(rule.estimate_id)
                .or_default()
                .insert(0, i);
        }
    }
}

impl From<Vec<AssignmentRule>> for AssignmentRules {
    fn from(rules: Vec<AssignmentRule>) -> Self {
        let mut list = Self {
            rules,
            by_rule: HashMap::new(),
            by_estimate: HashMap::new(),
        };
        list.reindex();
        list
    }
}

impl From<AssignmentRules> for Vec<AssignmentRule> {
    fn from(rules: AssignmentRules) -> Self {
        rules.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn() -> ImportedTransaction {
        ImportedTransaction {
            id: 1,
            date: "2013-12-16".parse().unwrap(),
            amount: Money::parse("12.10", Currency::new("USD")).unwrap(),
            payee: "Text String".into(),
            memo: "monthly".into(),
            withdrawal_account: "Assets:Checking".into(),
            deposit_account: "Expenses:Groceries".into(),
        }
    }

    fn date(op: Operator, value: &str) -> Condition {
        Condition::Date {
            op,
            value: value.into(),
        }
    }

    fn amount(op: Operator, value: &str) -> Condition {
        Condition::Amount {
            op,
            value: value.into(),
        }
    }

    fn text(field: TextField, op: Operator, sensitive: bool, value: &str) -> Condition {
        Condition::Text {
            field,
            op,
            case_sensitive: sensitive,
            value: value.into(),
        }
    }

    #[test]
    fn test_date_operators() {
        let t = txn(); // dated 2013-12-16

        assert!(date(Operator::Before, "2013-12-31").matches(&t));
        assert!(!date(Operator::Before, "2013-12-16").matches(&t));
        assert!(!date(Operator::Before, "2013-12-01").matches(&t));

        assert!(date(Operator::After, "2013-12-01").matches(&t));
        assert!(!date(Operator::After, "2013-12-16").matches(&t));
        assert!(!date(Operator::After, "2013-12-31").matches(&t));

        assert!(date(Operator::DateEquals, "2013-12-16").matches(&t));
        assert!(!date(Operator::DateEquals, "2013-12-17").matches(&t));
    }

    #[test]
    fn test_date_invalid_value_is_no_match() {
        assert!(!date(Operator::DateEquals, "text").matches(&txn()));
    }

    #[test]
    fn test_date_inapplicable_operator_is_no_match() {
        assert!(!date(Operator::LessThan, "2013-12-17").matches(&txn()));
    }

    #[test]
    fn test_amount_operators() {
        let t = txn(); // 12.10 USD

        assert!(amount(Operator::LessThan, "12.20,USD").matches(&t));
        assert!(!amount(Operator::LessThan, "12.10,USD").matches(&t));
        assert!(!amount(Operator::LessThan, "12.00,USD").matches(&t));

        assert!(amount(Operator::LessThanOrEqual, "12.10,USD").matches(&t));
        assert!(!amount(Operator::LessThanOrEqual, "12.00,USD").matches(&t));

        assert!(amount(Operator::GreaterThan, "12.00,USD").matches(&t));
        assert!(!amount(Operator::GreaterThan, "12.10,USD").matches(&t));

        assert!(amount(Operator::GreaterThanOrEqual, "12.10,USD").matches(&t));
        assert!(!amount(Operator::GreaterThanOrEqual, "12.20,USD").matches(&t));

        assert!(amount(Operator::AmountEquals, "12.10,USD").matches(&t));
        assert!(!amount(Operator::AmountEquals, "12.11,USD").matches(&t));
    }

    #[test]
    fn test_amount_malformed_value_is_no_match() {
        let t = txn();
        // Wrong token count
        assert!(!amount(Operator::AmountEquals, "12.10").matches(&t));
        assert!(!amount(Operator::AmountEquals, "12,10,USD").matches(&t));
        // Non-numeric amount
        assert!(!amount(Operator::AmountEquals, "$12,USD").matches(&t));
        // Inapplicable operator
        assert!(!amount(Operator::Before, "12.10,USD").matches(&t));
    }

    #[test]
    fn test_string_operators() {
        let t = txn(); // payee "Text String"

        assert!(text(TextField::Payee, Operator::BeginsWith, true, "Tex").matches(&t));
        assert!(!text(TextField::Payee, Operator::BeginsWith, true, "tex").matches(&t));
        assert!(text(TextField::Payee, Operator::BeginsWith, false, "tex").matches(&t));

        assert!(text(TextField::Payee, Operator::EndsWith, true, "ring").matches(&t));
        assert!(!text(TextField::Payee, Operator::EndsWith, true, "rinG").matches(&t));
        assert!(text(TextField::Payee, Operator::EndsWith, false, "rinG").matches(&t));

        assert!(text(TextField::Payee, Operator::Contains, true, "t S").matches(&t));
        assert!(!text(TextField::Payee, Operator::Contains, true, "t s").matches(&t));
        assert!(text(TextField::Payee, Operator::Contains, false, "t s").matches(&t));

        assert!(text(TextField::Payee, Operator::StringEquals, true, "Text String").matches(&t));
        assert!(!text(TextField::Payee, Operator::StringEquals, true, "text string").matches(&t));
        assert!(text(TextField::Payee, Operator::StringEquals, false, "text string").matches(&t));
    }

    #[test]
    fn test_string_inapplicable_operator_is_no_match() {
        assert!(!text(TextField::Payee, Operator::DateEquals, false, "Text String").matches(&txn()));
    }

    #[test]
    fn test_text_fields_route_to_transaction_fields() {
        let t = txn();
        assert!(text(TextField::Memo, Operator::StringEquals, true, "monthly").matches(&t));
        assert!(
            text(TextField::WithdrawalAccount, Operator::BeginsWith, true, "Assets").matches(&t)
        );
        assert!(
            text(TextField::DepositAccount, Operator::EndsWith, true, "Groceries").matches(&t)
        );
    }

    #[test]
    fn test_rule_all_conditions_must_hold() {
        let rule = AssignmentRule::with_conditions(
            1,
            10,
            vec![
                text(TextField::Payee, Operator::Contains, false, "text"),
                amount(Operator::LessThan, "20.00,USD"),
            ],
        );
        assert!(rule.matches(&txn()));

        let rule = AssignmentRule::with_conditions(
            2,
            10,
            vec![
                text(TextField::Payee, Operator::Contains, false, "text"),
                amount(Operator::LessThan, "10.00,USD"),
            ],
        );
        assert!(!rule.matches(&txn()));
    }

    #[test]
    fn test_empty_rule_matches_everything() {
        assert!(AssignmentRule::new(1, 10).matches(&txn()));
    }

    #[test]
    fn test_rules_priority_order_and_lookup() {
        let mut rules = AssignmentRules::new();
        rules.add(AssignmentRule::new(1, 10)).unwrap();
        rules.add(AssignmentRule::new(2, 20)).unwrap();
        rules.add(AssignmentRule::new(3, 10)).unwrap();

        assert_eq!(rules.len(), 3);
        assert_eq!(rules.at(0).unwrap().rule_id, 1);
        assert_eq!(rules.index_of(3), Some(2));
        assert_eq!(rules.find(2).unwrap().estimate_id, 20);
        assert!(rules.find(99).is_none());
    }

    #[test]
    fn test_estimate_scoped_lookup_is_newest_first() {
        let mut rules = AssignmentRules::new();
        rules.add(AssignmentRule::new(1, 10)).unwrap();
        rules.add(AssignmentRule::new(2, 20)).unwrap();
        rules.add(AssignmentRule::new(3, 10)).unwrap();

        let scoped: Vec<u32> = rules.rules_for(10).iter().map(|r| r.rule_id).collect();
        assert_eq!(scoped, vec![3, 1]);
        assert!(rules.rules_for(30).is_empty());
    }

    #[test]
    fn test_duplicate_and_zero_ids_rejected() {
        let mut rules = AssignmentRules::new();
        rules.add(AssignmentRule::new(1, 10)).unwrap();
        assert!(rules.add(AssignmentRule::new(1, 20)).is_err());
        assert!(rules.add(AssignmentRule::new(0, 20)).is_err());
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn test_clone_rule_appends_copy_with_fresh_id() {
        let mut rules = AssignmentRules::new();
        rules
            .add(AssignmentRule::with_conditions(
                5,
                10,
                vec![text(TextField::Payee, Operator::Contains, false, "store")],
            ))
            .unwrap();

        let new_id = rules.clone_rule(5).unwrap();
        assert_eq!(new_id, 6);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.at(1).unwrap().conditions, rules.at(0).unwrap().conditions);
    }

    #[test]
    fn test_remove_and_remove_all() {
        let mut rules = AssignmentRules::new();
        rules.add(AssignmentRule::new(1, 10)).unwrap();
        rules.add(AssignmentRule::new(2, 20)).unwrap();
        rules.add(AssignmentRule::new(3, 10)).unwrap();

        rules.remove(2).unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules.find(2).is_none());

        let removed = rules.remove_all(10);
        assert_eq!(removed.len(), 2);
        assert!(rules.is_empty());
    }

    #[test]
    fn test_move_rule_changes_priority() {
        let mut rules = AssignmentRules::new();
        rules.add(AssignmentRule::new(1, 10)).unwrap();
        rules.add(AssignmentRule::new(2, 20)).unwrap();
        rules.add(AssignmentRule::new(3, 30)).unwrap();

        rules.move_rule(2, 0);
        let order: Vec<u32> = rules.iter().map(|r| r.rule_id).collect();
        assert_eq!(order, vec![3, 1, 2]);
        assert_eq!(rules.index_of(3), Some(0));
    }

    #[test]
    fn test_serde_round_trip_rebuilds_indices() {
        let mut rules = AssignmentRules::new();
        rules.add(AssignmentRule::new(1, 10)).unwrap();
        rules.add(AssignmentRule::new(2, 10)).unwrap();

        let json = serde_json::to_string(&rules).unwrap();
        let restored: AssignmentRules = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.index_of(2), Some(1));
        let scoped: Vec<u32> = restored.rules_for(10).iter().map(|r| r.rule_id).collect();
        assert_eq!(scoped, vec![2, 1]);
    }
}
