// 💶 Treasury - monthly cash flows and flat-growth projection
//
// Flows come from client-account ledger lines (debit - credit). Months are
// calendar months; undated flows are counted but never bucketed.

use crate::ledger::Ledger;
use crate::vat::round2;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreasuryConfig {
    /// Ledger accounts feeding the flows
    pub account_prefix: String,

    pub projection_months: u32,

    /// Month-over-month growth, 0.05 = +5%
    pub growth_rate: f64,
}

impl Default for TreasuryConfig {
    fn default() -> Self {
        TreasuryConfig {
            account_prefix: "411".to_string(),
            projection_months: 3,
            growth_rate: 0.0,
        }
    }
}

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Month {
    pub year: i32,
    pub month: u32,
}

impl Month {
    pub fn of(date: NaiveDate) -> Self {
        Month {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn next(&self) -> Month {
        if self.month == 12 {
            Month { year: self.year + 1, month: 1 }
        } else {
            Month { year: self.year, month: self.month + 1 }
        }
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DatedFlow {
    pub date: Option<NaiveDate>,
    pub amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyFlow {
    pub month: Month,
    pub net: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreasuryReport {
    /// Observed months in chronological order
    pub history: Vec<MonthlyFlow>,
    pub projection: Vec<MonthlyFlow>,

    /// Flows dropped for lack of a date
    pub undated: usize,
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Signed flows (debit - credit) of ledger lines on accounts under `prefix`
pub fn flows_from_ledger(ledger: &Ledger, prefix: &str) -> Vec<DatedFlow> {
    ledger
        .lines
        .iter()
        .filter(|l| l.account_code.starts_with(prefix))
        .map(|l| DatedFlow {
            date: l.date,
            amount: l.signed_amount(),
        })
        .collect()
}

/// Net flow per calendar month plus the count of undated flows
pub fn group_by_month(flows: &[DatedFlow]) -> (Vec<MonthlyFlow>, usize) {
    let mut months: BTreeMap<Month, f64> = BTreeMap::new();
    let mut undated = 0;

    for flow in flows {
        match flow.date {
            Some(date) => *months.entry(Month::of(date)).or_insert(0.0) += flow.amount,
            None => undated += 1,
        }
    }

    let history = months
        .into_iter()
        .map(|(month, net)| MonthlyFlow { month, net: round2(net) })
        .collect();

    (history, undated)
}

/// `months` further periods after `last`, each `previous × (1 + growth)`
pub fn project(last: &MonthlyFlow, months: u32, growth: f64) -> Vec<MonthlyFlow> {
    let mut out = Vec::with_capacity(months as usize);
    let mut month = last.month;
    let mut value = last.net;

    for _ in 0..months {
        month = month.next();
        value *= 1.0 + growth;
        out.push(MonthlyFlow { month, net: round2(value) });
    }

    out
}

pub fn build_report(flows: &[DatedFlow], config: &TreasuryConfig) -> TreasuryReport {
    let (history, undated) = group_by_month(flows);
    if undated > 0 {
        warn!(undated, "flows without a date excluded from treasury");
    }

    let projection = match history.last() {
        Some(last) => project(last, config.projection_months, config.growth_rate),
        None => Vec::new(),
    };

    info!(
        months = history.len(),
        projected = projection.len(),
        "treasury report built"
    );

    TreasuryReport {
        history,
        projection,
        undated,
    }
}

// ============================================================================
// TESTS
// ============================================================================
