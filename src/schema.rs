// 📐 Shape Layer - Column Schema
// Declared mapping from source column names to canonical fields,
// resolved once against the header row of an input table.

use crate::error::{JournalError, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// CANONICAL FIELDS
// ============================================================================

pub const FIELD_INVOICE_ID: &str = "invoice_id";
pub const FIELD_DATE: &str = "date";
pub const FIELD_CLIENT_NAME: &str = "client_name";
pub const FIELD_AMOUNT: &str = "amount_excl_tax";
pub const FIELD_VAT_RATE: &str = "vat_rate";

// ============================================================================
// COLUMN SCHEMA
// ============================================================================

/// Recognized source column names per canonical field.
///
/// Matching is case-insensitive and ignores surrounding whitespace. The first
/// alias present in the header row wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub invoice_id: Vec<String>,
    pub date: Vec<String>,
    pub client_name: Vec<String>,

    /// Invoice-level HT total, possibly repeated on every line
    pub header_total: Vec<String>,

    /// True per-line HT amount
    pub line_amount: Vec<String>,

    pub vat_rate: Vec<String>,
}

fn aliases(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl Default for ColumnSchema {
    fn default() -> Self {
        ColumnSchema {
            invoice_id: aliases(&["invoice_id", "N° facture", "Facture", "Piece"]),
            date: aliases(&["date", "Date facture", "Date"]),
            client_name: aliases(&["client_name", "Client", "Nom client"]),
            header_total: aliases(&["amount_excl_tax", "Total HT", "Montant HT"]),
            line_amount: aliases(&["line_amount_excl_tax", "HT ligne", "Montant HT ligne"]),
            vat_rate: aliases(&["vat_rate", "Taux TVA", "TVA %"]),
        }
    }
}

/// Column positions after resolution against a header row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub invoice_id: usize,
    pub date: usize,
    pub client_name: usize,
    pub header_total: Option<usize>,
    pub line_amount: Option<usize>,
    pub vat_rate: usize,
}

impl ResolvedColumns {
    /// True when the source carries a dedicated per-line amount column
    pub fn has_line_breakdown(&self) -> bool {
        self.line_amount.is_some()
    }
}

impl ColumnSchema {
    /// Resolve canonical fields against `headers`.
    ///
    /// Fails fast with `MissingColumns` naming every canonical field that has
    /// no matching column. At least one of the two amount columns is required.
    pub fn resolve(&self, headers: &[String]) -> Result<ResolvedColumns> {
        let invoice_id = find_column(headers, &self.invoice_id);
        let date = find_column(headers, &self.date);
        let client_name = find_column(headers, &self.client_name);
        let header_total = find_column(headers, &self.header_total);
        let line_amount = find_column(headers, &self.line_amount);
        let vat_rate = find_column(headers, &self.vat_rate);

        let mut missing = Vec::new();
        if invoice_id.is_none() {
            missing.push(FIELD_INVOICE_ID.to_string());
        }
        if date.is_none() {
            missing.push(FIELD_DATE.to_string());
        }
        if client_name.is_none() {
            missing.push(FIELD_CLIENT_NAME.to_string());
        }
        if header_total.is_none() && line_amount.is_none() {
            missing.push(FIELD_AMOUNT.to_string());
        }
        if vat_rate.is_none() {
            missing.push(FIELD_VAT_RATE.to_string());
        }

        match (invoice_id, date, client_name, vat_rate) {
            (Some(invoice_id), Some(date), Some(client_name), Some(vat_rate))
                if missing.is_empty() =>
            {
                Ok(ResolvedColumns {
                    invoice_id,
                    date,
                    client_name,
                    header_total,
                    line_amount,
                    vat_rate,
                })
            }
            _ => Err(JournalError::MissingColumns(missing)),
        }
    }
}

/// Position of the first alias found in `headers`
pub fn find_column(headers: &[String], aliases: &[String]) -> Option<usize> {
    aliases.iter().find_map(|alias| {
        let wanted = canonical_header(alias);
        headers.iter().position(|h| canonical_header(h) == wanted)
    })
}

fn canonical_header(name: &str) -> String {
    name.trim_start_matches('\u{feff}').trim().to_lowercase()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_canonical_names() {
        let schema = ColumnSchema::default();
        let cols = schema
            .resolve(&headers(&["invoice_id", "date", "client_name", "amount_excl_tax", "vat_rate"]))
            .unwrap();

        assert_eq!(cols.invoice_id, 0);
        assert_eq!(cols.header_total, Some(3));
        assert_eq!(cols.line_amount, None);
        assert!(!cols.has_line_breakdown());
    }

    #[test]
    fn test_resolve_french_aliases_case_insensitive() {
        let schema = ColumnSchema::default();
        let cols = schema
            .resolve(&headers(&["\u{feff}N° FACTURE", " date facture ", "Client", "HT ligne", "Taux TVA"]))
            .unwrap();

        assert_eq!(cols.invoice_id, 0);
        assert_eq!(cols.date, 1);
        assert_eq!(cols.line_amount, Some(3));
        assert_eq!(cols.header_total, None);
        assert!(cols.has_line_breakdown());
    }

    #[test]
    fn test_missing_columns_named() {
        let schema = ColumnSchema::default();
        let err = schema
            .resolve(&headers(&["invoice_id", "Client"]))
            .unwrap_err();

        let missing = err.missing_columns().unwrap();
        assert_eq!(missing, &["date", "amount_excl_tax", "vat_rate"]);
    }

    #[test]
    fn test_either_amount_column_satisfies_requirement() {
        let schema = ColumnSchema::default();
        let both = schema
            .resolve(&headers(&["Piece", "Date", "Client", "Total HT", "HT ligne", "TVA %"]))
            .unwrap();

        assert_eq!(both.header_total, Some(3));
        assert_eq!(both.line_amount, Some(4));
    }
}
