// 🏷️ Account Rules - Rules as Data
// Rate → sales account table and client account derivation

use serde::{Deserialize, Serialize};

// ============================================================================
// RATE → ACCOUNT MAPPING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateAccount {
    /// VAT rate in percent (exact match, e.g. 5.5)
    pub rate: f64,

    /// Sales account receiving HT for this rate
    pub account: String,
}

// ============================================================================
// ACCOUNT PLAN
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountPlan {
    /// Journal code stamped on every emitted line
    pub journal_code: String,

    /// Client accounts are `prefix + initial`
    pub client_prefix: String,

    /// Used when the client name does not start with a letter
    pub client_fallback: String,

    pub vat_account: String,

    /// Sales account for multi-rate invoices and non-canonical rates
    pub multi_rate_account: String,

    pub sales_accounts: Vec<RateAccount>,
}

impl Default for AccountPlan {
    fn default() -> Self {
        AccountPlan {
            journal_code: "VT".to_string(),
            client_prefix: "411".to_string(),
            client_fallback: "DIV".to_string(),
            vat_account: "445710".to_string(),
            multi_rate_account: "701900".to_string(),
            sales_accounts: vec![
                RateAccount { rate: 0.0, account: "701000".to_string() },
                RateAccount { rate: 5.5, account: "701055".to_string() },
                RateAccount { rate: 10.0, account: "701100".to_string() },
                RateAccount { rate: 20.0, account: "701200".to_string() },
            ],
        }
    }
}

impl AccountPlan {
    /// Sales account for a mono-rate invoice.
    ///
    /// Exact float comparison against the table; anything else falls back to
    /// the multi-rate account.
    pub fn sales_account_for(&self, rate: f64) -> &str {
        self.sales_accounts
            .iter()
            .find(|ra| ra.rate == rate)
            .map(|ra| ra.account.as_str())
            .unwrap_or(&self.multi_rate_account)
    }

    /// Client account from the first letter of the client name.
    ///
    /// Clients sharing an initial share an account.
    pub fn client_account(&self, client_name: &str) -> String {
        match client_name.trim().chars().next() {
            Some(c) if c.is_alphabetic() => {
                format!("{}{}", self.client_prefix, c.to_uppercase())
            }
            _ => format!("{}{}", self.client_prefix, self.client_fallback),
        }
    }

    /// Check the plan for empty account codes and duplicate rates
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.journal_code.trim().is_empty() {
            return Err("journal_code is empty".to_string());
        }
        if self.vat_account.trim().is_empty() {
            return Err("vat_account is empty".to_string());
        }
        if self.multi_rate_account.trim().is_empty() {
            return Err("multi_rate_account is empty".to_string());
        }

        for (i, ra) in self.sales_accounts.iter().enumerate() {
            if ra.account.trim().is_empty() {
                return Err(format!("sales account for rate {} is empty", ra.rate));
            }
            if !ra.rate.is_finite() {
                return Err(format!("sales account {} has a non-finite rate", ra.account));
            }
            if self.sales_accounts[..i].iter().any(|other| other.rate == ra.rate) {
                return Err(format!("rate {} is mapped twice", ra.rate));
            }
        }

        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
