//! Client-side aggregation over fetched transactions.
//!
//! Mirrors the server's summary block so a locally computed report matches
//! what the endpoint returns for the same records: per-type counts and
//! totals, per-category and per-account breakdowns, and a net total of
//! income minus expenses minus transfer fees, everything rounded to cents.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::api::models::{Transaction, TransactionType};

/// Bucket name for transactions without a category
pub const UNCATEGORIZED: &str = "Sans catégorie";
/// Bucket name for transactions without an account
pub const UNKNOWN_ACCOUNT: &str = "Inconnu";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryTotals {
    pub count: u64,
    pub total: f64,
    pub expenses: f64,
    pub income: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccountTotals {
    pub count: u64,
    pub expenses: f64,
    pub income: f64,
    pub transfers: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total_count: u64,
    pub expense_count: u64,
    pub income_count: u64,
    pub transfer_count: u64,
    pub total_expenses: f64,
    pub total_income: f64,
    pub total_transfers: f64,
    pub total_transfer_fees: f64,
    pub net_total: f64,
    pub by_category: BTreeMap<String, CategoryTotals>,
    pub by_account: BTreeMap<String, AccountTotals>,
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Aggregate `records` into a `Summary`.
///
/// Pure function of the input; an empty slice yields zeroed and empty
/// aggregates, and the result does not depend on record order.
pub fn summarize(records: &[Transaction]) -> Summary {
    let mut summary = Summary {
        total_count: records.len() as u64,
        ..Summary::default()
    };

    for tx in records {
        match tx.kind {
            TransactionType::Expense => {
                summary.expense_count += 1;
                summary.total_expenses += tx.amount;
            }
            TransactionType::Income => {
                summary.income_count += 1;
                summary.total_income += tx.amount;
            }
            TransactionType::Transfer => {
                summary.transfer_count += 1;
                summary.total_transfers += tx.amount;
                summary.total_transfer_fees += tx.transfer_fee.unwrap_or(0.0);
            }
        }

        let category = tx
            .categories
            .as_ref()
            .map(|c| c.name.as_str())
            .unwrap_or(UNCATEGORIZED);
        let by_category = summary.by_category.entry(category.to_string()).or_default();
        by_category.count += 1;
        by_category.total += tx.amount;
        match tx.kind {
            TransactionType::Expense => by_category.expenses += tx.amount,
            TransactionType::Income => by_category.income += tx.amount,
            TransactionType::Transfer => {}
        }

        let account = tx
            .accounts
            .as_ref()
            .map(|a| a.name.as_str())
            .unwrap_or(UNKNOWN_ACCOUNT);
        let by_account = summary.by_account.entry(account.to_string()).or_default();
        by_account.count += 1;
        match tx.kind {
            TransactionType::Expense => by_account.expenses += tx.amount,
            TransactionType::Income => by_account.income += tx.amount,
            TransactionType::Transfer => by_account.transfers += tx.amount,
        }
    }

    summary.net_total = summary.total_income - summary.total_expenses - summary.total_transfer_fees;

    summary.total_expenses = round_cents(summary.total_expenses);
    summary.total_income = round_cents(summary.total_income);
    summary.total_transfers = round_cents(summary.total_transfers);
    summary.total_transfer_fees = round_cents(summary.total_transfer_fees);
    summary.net_total = round_cents(summary.net_total);
    for totals in summary.by_category.values_mut() {
        totals.total = round_cents(totals.total);
        totals.expenses = round_cents(totals.expenses);
        totals.income = round_cents(totals.income);
    }
    for totals in summary.by_account.values_mut() {
        totals.expenses = round_cents(totals.expenses);
        totals.income = round_cents(totals.income);
        totals.transfers = round_cents(totals.transfers);
    }

    summary
}
