//! End-to-end pipeline tests: import a GnuCash book, assign the batch
//! against rules, and roll the actuals up through a budget.

use std::io::Write;
use std::path::PathBuf;

use tallybook::import::{import_gnucash, DateFilter, ImportEvent, ImportResult};
use tallybook::models::currency::Currency;
use tallybook::models::estimate::{EstimateDefinition, EstimateTree, EstimateType, ROOT_ESTIMATE_ID};
use tallybook::models::money::Money;
use tallybook::models::rules::{AssignmentRule, AssignmentRules, Condition, Operator, TextField};
use tallybook::models::transaction::ImportedTransaction;
use tallybook::services::assigner::{AssignOutcome, AssignmentReport, TransactionAssigner};

fn usd(s: &str) -> Money {
    Money::parse(s, Currency::new("USD")).unwrap()
}

fn account(id: &str, name: &str, kind: &str, parent: Option<&str>) -> String {
    let parent = parent
        .map(|p| format!("<act:parent type=\"guid\">{}</act:parent>", p))
        .unwrap_or_default();
    format!(
        "<gnc:account version=\"2.0.0\">\
         <act:name>{}</act:name><act:id type=\"guid\">{}</act:id>\
         <act:type>{}</act:type>{}</gnc:account>",
        name, id, kind, parent
    )
}

fn transaction(date: &str, payee: &str, value: &str, from: &str, to: &str, id: &str) -> String {
    format!(
        "<gnc:transaction version=\"2.0.0\">\
         <trn:date-posted><ts:date>{} 00:00:00 -0500</ts:date></trn:date-posted>\
         <trn:description>{}</trn:description>\
         <trn:splits>\
         <trn:split><split:id type=\"guid\">{}-a</split:id>\
         <split:value>-{}</split:value>\
         <split:account type=\"guid\">{}</split:account></trn:split>\
         <trn:split><split:id type=\"guid\">{}-b</split:id>\
         <split:value>{}</split:value>\
         <split:account type=\"guid\">{}</split:account></trn:split>\
         </trn:splits></gnc:transaction>",
        date, payee, id, value, from, id, value, to
    )
}

/// A small book: checking account, food and fuel expenses, a salary income
/// account, and five transactions in December 2013.
fn sample_book() -> String {
    let accounts = [
        account("root1", "Root Account", "ROOT", None),
        account("assets", "Assets", "ASSET", Some("root1")),
        account("checking", "Checking", "BANK", Some("assets")),
        account("expenses", "Expenses", "EXPENSE", Some("root1")),
        account("food", "Food", "EXPENSE", Some("expenses")),
        account("fuel", "Fuel", "EXPENSE", Some("expenses")),
        account("salary", "Salary", "INCOME", Some("root1")),
    ]
    .join("");
    let transactions = [
        transaction("2013-12-01", "Employer", "600000/100", "salary", "checking", "t1"),
        transaction("2013-12-05", "Grocery Store", "4500/100", "checking", "food", "t2"),
        transaction("2013-12-08", "Gas Station", "3000/100", "checking", "fuel", "t3"),
        // A withdrawal from the expense account: a refund of 20.00
        transaction("2013-12-10", "Grocery Refund", "2000/100", "food", "checking", "t4"),
        transaction("2013-12-12", "Mystery Shop", "1000/100", "checking", "expenses", "t5"),
    ]
    .join("");
    format!(
        "<?xml version=\"1.0\"?><gnc-v2><gnc:book version=\"2.0.0\">{}{}</gnc:book></gnc-v2>",
        accounts, transactions
    )
}

fn write_book(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("sample.gnucash");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(sample_book().as_bytes()).unwrap();
    path
}

fn import(path: PathBuf, filter: DateFilter) -> Vec<ImportedTransaction> {
    let mut batch = Vec::new();
    for event in import_gnucash(path, filter).wait() {
        match event {
            ImportEvent::Imported(transactions) => batch = transactions,
            ImportEvent::Finished(result, message) => {
                assert_eq!(result, ImportResult::Complete, "{}", message);
            }
            _ => {}
        }
    }
    batch
}

fn rules() -> AssignmentRules {
    let mut rules = AssignmentRules::new();
    rules
        .add(AssignmentRule::with_conditions(
            1,
            10,
            vec![Condition::Text {
                field: TextField::Payee,
                op: Operator::StringEquals,
                case_sensitive: false,
                value: "Employer".into(),
            }],
        ))
        .unwrap();
    rules
        .add(AssignmentRule::with_conditions(
            2,
            20,
            vec![Condition::Text {
                field: TextField::DepositAccount,
                op: Operator::StringEquals,
                case_sensitive: true,
                value: "Expenses:Food".into(),
            }],
        ))
        .unwrap();
    rules
        .add(AssignmentRule::with_conditions(
            3,
            30,
            vec![Condition::Text {
                field: TextField::Payee,
                op: Operator::BeginsWith,
                case_sensitive: false,
                value: "gas".into(),
            }],
        ))
        .unwrap();
    rules
}

fn assign(batch: &[ImportedTransaction]) -> AssignmentReport {
    match TransactionAssigner::new().assign(&rules(), batch) {
        AssignOutcome::Completed(report) => report,
        AssignOutcome::AlreadyRunning => panic!("fresh assigner rejected the run"),
    }
}

fn budget() -> EstimateTree {
    let mut tree = EstimateTree::new(Currency::new("USD"));
    let leaf = |id: u32, name: &str, kind: EstimateType, amount: &str| EstimateDefinition {
        id,
        name: name.into(),
        description: String::new(),
        estimate_type: kind,
        amount: usd(amount),
        due_date: None,
        finished: false,
    };
    tree.add_child_with(ROOT_ESTIMATE_ID, leaf(10, "Salary", EstimateType::Income, "6000.00"), None)
        .unwrap();
    tree.add_child_with(ROOT_ESTIMATE_ID, leaf(20, "Food", EstimateType::Expense, "200.00"), None)
        .unwrap();
    tree.add_child_with(ROOT_ESTIMATE_ID, leaf(30, "Fuel", EstimateType::Expense, "25.00"), None)
        .unwrap();
    tree
}

#[test]
fn import_assign_and_accumulate() {
    let dir = tempfile::tempdir().unwrap();
    let batch = import(write_book(&dir), DateFilter::default());
    assert_eq!(batch.len(), 5);

    let report = assign(&batch);
    assert_eq!(report.assigned, 4);
    assert_eq!(report.unassigned, 1);

    // Refund lands on the Food estimate as a negative amount: 45 - 20
    assert_eq!(report.actuals.value(20), Some(&usd("25.00")));
    assert_eq!(report.actuals.value(30), Some(&usd("30.00")));
    assert_eq!(report.actuals.value(10), Some(&usd("6000.00")));

    // The unmatched transaction reports the zero sentinel
    let mystery = batch.iter().find(|t| t.payee == "Mystery Shop").unwrap();
    assert_eq!(report.assignments.rule_for(mystery.id), 0);
}

#[test]
fn refund_direction_and_amount() {
    let dir = tempfile::tempdir().unwrap();
    let batch = import(write_book(&dir), DateFilter::default());

    let refund = batch.iter().find(|t| t.payee == "Grocery Refund").unwrap();
    assert_eq!(refund.amount, usd("-20.00"));
    assert_eq!(refund.withdrawal_account, "Assets:Checking");
    assert_eq!(refund.deposit_account, "Expenses:Food");
}

#[test]
fn budget_progress_over_assigned_actuals() {
    let dir = tempfile::tempdir().unwrap();
    let batch = import(write_book(&dir), DateFilter::default());
    let report = assign(&batch);
    let tree = budget();

    // Food: 25.00 of 200.00, within the estimate
    let food = tree.progress(20, &report.actuals, None).unwrap();
    assert!(food.healthy);
    assert_eq!(food.actual, usd("25.00"));
    assert_eq!(food.estimated, usd("200.00"));

    // Fuel: 30.00 of 25.00, over the estimate
    let fuel = tree.progress(30, &report.actuals, None).unwrap();
    assert!(!fuel.healthy);

    // Income met its estimate
    let salary = tree.progress(10, &report.actuals, None).unwrap();
    assert!(salary.healthy);

    // Fuel already exceeded its estimate, so the expected impact follows
    // the actual
    let impact = tree.impact(30, &report.actuals).unwrap();
    assert_eq!(impact.expected, usd("-30.00"));
    let food_impact = tree.impact(20, &report.actuals).unwrap();
    assert_eq!(food_impact.expected, usd("-200.00"));
}

#[test]
fn date_filtered_import() {
    let dir = tempfile::tempdir().unwrap();
    let filter = DateFilter {
        start: Some("2013-12-05".parse().unwrap()),
        end: Some("2013-12-08".parse().unwrap()),
    };
    let batch = import(write_book(&dir), filter);

    let payees: Vec<&str> = batch.iter().map(|t| t.payee.as_str()).collect();
    assert_eq!(payees, vec!["Grocery Store", "Gas Station"]);
}

mod cli {
    use super::*;
    use assert_cmd::Command;
    use predicates::prelude::*;

    #[test]
    fn check_reports_counts() {
        let dir = tempfile::tempdir().unwrap();
        let book = write_book(&dir);

        Command::cargo_bin("tallybook")
            .unwrap()
            .arg("check")
            .arg(&book)
            .assert()
            .success()
            .stdout(predicate::str::contains("Transactions: 5"))
            .stdout(predicate::str::contains("2013-12-01 to 2013-12-12"));
    }

    #[test]
    fn import_assigns_against_rules_file() {
        let dir = tempfile::tempdir().unwrap();
        let book = write_book(&dir);

        let rules_path = dir.path().join("rules.json");
        serde_json::to_writer(std::fs::File::create(&rules_path).unwrap(), &rules()).unwrap();

        let budget_path = dir.path().join("budget.json");
        serde_json::to_writer(std::fs::File::create(&budget_path).unwrap(), &budget()).unwrap();

        Command::cargo_bin("tallybook")
            .unwrap()
            .arg("import")
            .arg(&book)
            .arg("--rules")
            .arg(&rules_path)
            .arg("--budget")
            .arg(&budget_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("Assigned: 4"))
            .stdout(predicate::str::contains("Food"));
    }

    #[test]
    fn import_fails_cleanly_on_bad_book() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.gnucash");
        std::fs::write(&bad, "<html></html>").unwrap();

        Command::cargo_bin("tallybook")
            .unwrap()
            .arg("check")
            .arg(&bad)
            .assert()
            .failure()
            .stderr(predicate::str::contains("not a valid GnuCash file"));
    }
}
