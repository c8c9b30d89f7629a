// 📦 Returns, discounts and provisions by analytic code
//
// Works on the account/analytic-code pivot of the general ledger:
//   returns    = Σdebit - Σcredit   on returns accounts
//   discounts  = Σcredit - Σdebit   on bookseller discount accounts
//   provisions = Σdebit             on provision accounts
// merged per analytic code, absent parts counted as zero.

use crate::error::{JournalError, Result};
use crate::parser::{is_blank, normalize_code, parse_amount, RawTable};
use crate::schema::find_column;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReturnsConfig {
    pub returns_prefix: String,
    pub discounts_prefix: String,
    pub provisions_prefix: String,

    pub account_columns: Vec<String>,
    pub analytic_columns: Vec<String>,
    pub debit_columns: Vec<String>,
    pub credit_columns: Vec<String>,
}

impl Default for ReturnsConfig {
    fn default() -> Self {
        ReturnsConfig {
            returns_prefix: "709000".to_string(),
            discounts_prefix: "709100".to_string(),
            provisions_prefix: "681".to_string(),
            account_columns: vec!["Compte".to_string(), "account".to_string()],
            analytic_columns: vec!["Code_Analytique".to_string(), "analytic_code".to_string()],
            debit_columns: vec!["Débit".to_string(), "Debit".to_string()],
            credit_columns: vec!["Crédit".to_string(), "Credit".to_string()],
        }
    }
}

// ============================================================================
// INPUT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticEntry {
    pub account: String,
    pub analytic_code: String,
    pub debit: f64,
    pub credit: f64,
}

impl AnalyticEntry {
    pub fn new(account: &str, analytic_code: &str, debit: f64, credit: f64) -> Self {
        let analytic_code = analytic_code.trim();
        AnalyticEntry {
            account: normalize_code(account),
            analytic_code: if is_blank(analytic_code) { String::new() } else { analytic_code.to_string() },
            debit,
            credit,
        }
    }
}

/// Read pivot entries from a raw table. Missing amounts count as zero.
pub fn entries_from_table(table: &RawTable, config: &ReturnsConfig) -> Result<Vec<AnalyticEntry>> {
    let account = find_column(&table.headers, &config.account_columns);
    let analytic = find_column(&table.headers, &config.analytic_columns);
    let debit = find_column(&table.headers, &config.debit_columns);
    let credit = find_column(&table.headers, &config.credit_columns);

    let (account, analytic, debit, credit) = match (account, analytic, debit, credit) {
        (Some(a), Some(c), Some(d), Some(k)) => (a, c, d, k),
        _ => {
            let mut missing = Vec::new();
            if account.is_none() {
                missing.push("account".to_string());
            }
            if analytic.is_none() {
                missing.push("analytic_code".to_string());
            }
            if debit.is_none() {
                missing.push("debit".to_string());
            }
            if credit.is_none() {
                missing.push("credit".to_string());
            }
            return Err(JournalError::MissingColumns(missing));
        }
    };

    Ok((0..table.len())
        .map(|row| {
            AnalyticEntry::new(
                table.cell(row, account),
                table.cell(row, analytic),
                parse_amount(table.cell(row, debit)).value,
                parse_amount(table.cell(row, credit)).value,
            )
        })
        .collect())
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticImpact {
    pub analytic_code: String,
    pub returns: f64,
    pub discounts: f64,
    pub provisions: f64,
    pub total_impact: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectedAccounts {
    pub returns: Vec<String>,
    pub discounts: Vec<String>,
    pub provisions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnsReport {
    pub detected: DetectedAccounts,
    pub returns_entries: usize,
    pub discount_entries: usize,
    pub provision_entries: usize,

    /// Ordered by analytic code
    pub by_code: Vec<AnalyticImpact>,

    pub total_returns: f64,
    pub total_discounts: f64,
    pub total_provisions: f64,
    pub total_impact: f64,
}

impl ReturnsReport {
    /// No returns and no discounts found: provisions alone are not reported
    pub fn nothing_detected(&self) -> bool {
        self.returns_entries == 0 && self.discount_entries == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccountClass {
    Returns,
    Discounts,
    Provisions,
}

// ============================================================================
// AGGREGATOR
// ============================================================================

pub struct ReturnsAggregator {
    config: ReturnsConfig,
}

impl ReturnsAggregator {
    pub fn new(config: ReturnsConfig) -> Self {
        ReturnsAggregator { config }
    }

    fn class_of(&self, account: &str) -> Option<AccountClass> {
        if account.starts_with(&self.config.returns_prefix) {
            Some(AccountClass::Returns)
        } else if account.starts_with(&self.config.discounts_prefix) {
            Some(AccountClass::Discounts)
        } else if account.starts_with(&self.config.provisions_prefix) {
            Some(AccountClass::Provisions)
        } else {
            None
        }
    }

    pub fn aggregate(&self, entries: &[AnalyticEntry]) -> ReturnsReport {
        let mut report = ReturnsReport::default();
        let mut by_code: BTreeMap<&str, AnalyticImpact> = BTreeMap::new();

        for entry in entries {
            let Some(class) = self.class_of(&entry.account) else {
                continue;
            };

            let (detected, count) = match class {
                AccountClass::Returns => (&mut report.detected.returns, &mut report.returns_entries),
                AccountClass::Discounts => (&mut report.detected.discounts, &mut report.discount_entries),
                AccountClass::Provisions => (&mut report.detected.provisions, &mut report.provision_entries),
            };
            *count += 1;
            if !detected.contains(&entry.account) {
                detected.push(entry.account.clone());
            }

            // Counted as detected, but an entry without a code has no row
            if entry.analytic_code.is_empty() {
                continue;
            }

            let impact = by_code
                .entry(entry.analytic_code.as_str())
                .or_insert_with(|| AnalyticImpact {
                    analytic_code: entry.analytic_code.clone(),
                    ..AnalyticImpact::default()
                });

            match class {
                AccountClass::Returns => impact.returns += entry.debit - entry.credit,
                AccountClass::Discounts => impact.discounts += entry.credit - entry.debit,
                AccountClass::Provisions => impact.provisions += entry.debit,
            }
        }

        if report.nothing_detected() {
            info!("no returns or discounts detected");
            return report;
        }

        for (_, mut impact) in by_code {
            impact.total_impact = impact.returns + impact.discounts + impact.provisions;
            report.total_returns += impact.returns;
            report.total_discounts += impact.discounts;
            report.total_provisions += impact.provisions;
            report.total_impact += impact.total_impact;
            report.by_code.push(impact);
        }

        info!(
            codes = report.by_code.len(),
            returns = report.returns_entries,
            discounts = report.discount_entries,
            provisions = report.provision_entries,
            "aggregated returns by analytic code"
        );

        report
    }
}

impl Default for ReturnsAggregator {
    fn default() -> Self {
        Self::new(ReturnsConfig::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
