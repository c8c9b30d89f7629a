// 🧾 Invoice Grouper
// Partition normalized lines by invoice id and compute per-invoice aggregates

use crate::data_quality::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::parser::{AmountRegime, InvoiceLine, NormalizedBatch};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

// ============================================================================
// AGGREGATE
// ============================================================================

/// HT attributable to one VAT rate within an invoice
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateShare {
    pub rate: f64,
    pub amount_excl_tax: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceAggregate {
    pub invoice_id: String,
    pub date: Option<NaiveDate>,
    pub client_name: String,

    /// Authoritative HT: max magnitude when the header repeats, sum for line items
    pub total_excl_tax: f64,

    /// Distinct rates among lines with a non-zero amount, highest first
    pub rates: Vec<f64>,

    /// Per-rate HT, highest rate first. None when several rates are present
    /// but the source only repeats the header total.
    pub rate_breakdown: Option<Vec<RateShare>>,

    pub is_multi_rate: bool,
    pub line_count: usize,
}

impl InvoiceAggregate {
    /// The single effective rate of a mono-rate invoice (0.0 when no line
    /// carries an amount)
    pub fn sole_rate(&self) -> Option<f64> {
        match self.rates.len() {
            0 => Some(0.0),
            1 => Some(self.rates[0]),
            _ => None,
        }
    }

    pub fn has_breakdown(&self) -> bool {
        self.rate_breakdown.is_some()
    }

    /// Σ breakdown, for the total/breakdown invariant
    pub fn breakdown_total(&self) -> Option<f64> {
        self.rate_breakdown
            .as_ref()
            .map(|shares| shares.iter().map(|s| s.amount_excl_tax).sum())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupedInvoices {
    /// In order of first appearance in the source
    pub invoices: Vec<InvoiceAggregate>,
    pub regime: AmountRegime,
    pub diagnostics: Diagnostics,
}

// ============================================================================
// GROUPER
// ============================================================================

struct InvoiceBuilder<'a> {
    lines: Vec<&'a InvoiceLine>,
}

/// Group lines by invoice id.
///
/// `tolerance` bounds the accepted gap between a header total column and the
/// sum of line amounts before a mismatch is reported.
pub fn group_invoices(batch: &NormalizedBatch, tolerance: f64) -> GroupedInvoices {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut builders: Vec<InvoiceBuilder> = Vec::new();

    for line in &batch.lines {
        let slot = *index.entry(line.invoice_id.as_str()).or_insert_with(|| {
            builders.push(InvoiceBuilder { lines: Vec::new() });
            builders.len() - 1
        });
        builders[slot].lines.push(line);
    }

    let mut diagnostics = Diagnostics::new();
    let invoices: Vec<InvoiceAggregate> = builders
        .iter()
        .map(|b| aggregate(&b.lines, batch.regime, tolerance, &mut diagnostics))
        .collect();

    debug!(
        invoices = invoices.len(),
        multi_rate = invoices.iter().filter(|i| i.is_multi_rate).count(),
        "grouped invoices"
    );

    GroupedInvoices {
        invoices,
        regime: batch.regime,
        diagnostics,
    }
}

fn aggregate(
    lines: &[&InvoiceLine],
    regime: AmountRegime,
    tolerance: f64,
    diagnostics: &mut Diagnostics,
) -> InvoiceAggregate {
    let first = lines[0];
    let invoice_id = first.invoice_id.clone();

    let (date, client_name) = header_fields(lines, diagnostics);
    let rates = rate_set(lines);

    let (total_excl_tax, rate_breakdown) = match regime {
        AmountRegime::LineItems => {
            let total: f64 = lines.iter().map(|l| l.amount_excl_tax).sum();
            check_header_total(&invoice_id, lines, total, tolerance, diagnostics);
            (total, Some(line_breakdown(lines, &rates)))
        }
        AmountRegime::RepeatedHeader => {
            let total = largest_magnitude(lines.iter().map(|l| l.amount_excl_tax));
            let breakdown = match rates.len() {
                0 => Some(Vec::new()),
                1 => Some(vec![RateShare { rate: rates[0], amount_excl_tax: total }]),
                _ => None,
            };
            (total, breakdown)
        }
    };

    InvoiceAggregate {
        invoice_id,
        date,
        client_name,
        total_excl_tax,
        is_multi_rate: rates.len() > 1,
        rates,
        rate_breakdown,
        line_count: lines.len(),
    }
}

/// First non-null date and first client name win; disagreements are reported
fn header_fields(lines: &[&InvoiceLine], diagnostics: &mut Diagnostics) -> (Option<NaiveDate>, String) {
    let invoice_id = &lines[0].invoice_id;
    let client_name = lines[0].client_name.clone();
    let date = lines.iter().find_map(|l| l.date);

    if let Some(other) = lines.iter().find(|l| l.client_name != client_name) {
        diagnostics.push(Diagnostic::for_invoice(
            invoice_id,
            DiagnosticKind::InconsistentInvoiceHeader {
                field: "client_name".to_string(),
                kept: client_name.clone(),
                ignored: other.client_name.clone(),
            },
        ));
    }

    if let Some(kept) = date {
        if let Some(other) = lines.iter().filter_map(|l| l.date).find(|d| *d != kept) {
            diagnostics.push(Diagnostic::for_invoice(
                invoice_id,
                DiagnosticKind::InconsistentInvoiceHeader {
                    field: "date".to_string(),
                    kept: kept.to_string(),
                    ignored: other.to_string(),
                },
            ));
        }
    }

    (date, client_name)
}

/// Distinct rates among lines carrying a non-zero amount, highest first.
/// Zero-amount residual lines never make an invoice multi-rate.
fn rate_set(lines: &[&InvoiceLine]) -> Vec<f64> {
    let mut rates: Vec<f64> = Vec::new();
    for line in lines.iter().filter(|l| l.amount_excl_tax != 0.0) {
        if !rates.contains(&line.vat_rate) {
            rates.push(line.vat_rate);
        }
    }
    rates.sort_by(|a, b| b.total_cmp(a));
    rates
}

fn line_breakdown(lines: &[&InvoiceLine], rates: &[f64]) -> Vec<RateShare> {
    rates
        .iter()
        .map(|&rate| RateShare {
            rate,
            amount_excl_tax: lines
                .iter()
                .filter(|l| l.vat_rate == rate)
                .map(|l| l.amount_excl_tax)
                .sum(),
        })
        .collect()
}

/// The repeated header total: largest magnitude, so zero residual lines of a
/// credit note do not win over the negative total
fn largest_magnitude(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(0.0, |best, v| if v.abs() > best.abs() { v } else { best })
}

fn check_header_total(
    invoice_id: &str,
    lines: &[&InvoiceLine],
    line_total: f64,
    tolerance: f64,
    diagnostics: &mut Diagnostics,
) {
    let header_total = largest_magnitude(lines.iter().filter_map(|l| l.header_total));
    if header_total == 0.0 {
        return;
    }
    if (header_total - line_total).abs() > tolerance {
        diagnostics.push(Diagnostic::for_invoice(
            invoice_id,
            DiagnosticKind::HeaderTotalMismatch { header_total, line_total },
        ));
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: &str, amount: f64, rate: f64) -> InvoiceLine {
        InvoiceLine {
            row: 2,
            invoice_id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 15),
            client_name: "Librairie Mollat".to_string(),
            amount_excl_tax: amount,
            header_total: None,
            vat_rate: rate,
        }
    }

    fn batch(lines: Vec<InvoiceLine>, regime: AmountRegime) -> NormalizedBatch {
        NormalizedBatch {
            lines,
            regime,
            diagnostics: Diagnostics::new(),
        }
    }

    #[test]
    fn test_repeated_header_takes_max_not_sum() {
        let grouped = group_invoices(
            &batch(
                vec![line("F1", 300.0, 5.5), line("F1", 300.0, 5.5), line("F1", 300.0, 5.5)],
                AmountRegime::RepeatedHeader,
            ),
            0.01,
        );

        let inv = &grouped.invoices[0];
        assert_eq!(inv.total_excl_tax, 300.0);
        assert_eq!(inv.line_count, 3);
        assert!(!inv.is_multi_rate);
        assert_eq!(inv.sole_rate(), Some(5.5));
        assert_eq!(inv.breakdown_total(), Some(300.0));
    }

    #[test]
    fn test_line_items_sum_and_breakdown() {
        let grouped = group_invoices(
            &batch(
                vec![line("F2", 100.0, 20.0), line("F2", 30.0, 5.5), line("F2", 20.0, 5.5)],
                AmountRegime::LineItems,
            ),
            0.01,
        );

        let inv = &grouped.invoices[0];
        assert_eq!(inv.total_excl_tax, 150.0);
        assert!(inv.is_multi_rate);
        assert_eq!(inv.rates, vec![20.0, 5.5]);
        assert_eq!(
            inv.rate_breakdown,
            Some(vec![
                RateShare { rate: 20.0, amount_excl_tax: 100.0 },
                RateShare { rate: 5.5, amount_excl_tax: 50.0 },
            ])
        );
    }

    #[test]
    fn test_zero_amount_residual_line_stays_mono() {
        let grouped = group_invoices(
            &batch(
                vec![line("F6", 80.0, 5.5), line("F6", 0.0, 20.0)],
                AmountRegime::LineItems,
            ),
            0.01,
        );

        let inv = &grouped.invoices[0];
        assert!(!inv.is_multi_rate);
        assert_eq!(inv.rates, vec![5.5]);
        assert_eq!(inv.breakdown_total(), Some(inv.total_excl_tax));
    }

    #[test]
    fn test_repeated_header_multi_rate_has_no_breakdown() {
        let grouped = group_invoices(
            &batch(
                vec![line("F4", 150.0, 20.0), line("F4", 150.0, 5.5)],
                AmountRegime::RepeatedHeader,
            ),
            0.01,
        );

        let inv = &grouped.invoices[0];
        assert!(inv.is_multi_rate);
        assert!(!inv.has_breakdown());
        assert_eq!(inv.sole_rate(), None);
    }

    #[test]
    fn test_zero_total_invoice_is_retained() {
        let grouped = group_invoices(
            &batch(vec![line("F7", 0.0, 20.0)], AmountRegime::LineItems),
            0.01,
        );

        assert_eq!(grouped.invoices.len(), 1);
        assert_eq!(grouped.invoices[0].total_excl_tax, 0.0);
        assert_eq!(grouped.invoices[0].sole_rate(), Some(0.0));
    }

    #[test]
    fn test_invoice_order_follows_first_appearance() {
        let grouped = group_invoices(
            &batch(
                vec![line("B", 1.0, 20.0), line("A", 1.0, 20.0), line("B", 1.0, 20.0)],
                AmountRegime::LineItems,
            ),
            0.01,
        );

        let ids: Vec<&str> = grouped.invoices.iter().map(|i| i.invoice_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A"]);
        assert_eq!(grouped.invoices[0].total_excl_tax, 2.0);
    }

    #[test]
    fn test_inconsistent_header_first_seen_wins() {
        let mut second = line("F8", 10.0, 20.0);
        second.client_name = "Cultura".to_string();
        second.date = NaiveDate::from_ymd_opt(2024, 4, 1);

        let grouped = group_invoices(
            &batch(vec![line("F8", 10.0, 20.0), second], AmountRegime::LineItems),
            0.01,
        );

        let inv = &grouped.invoices[0];
        assert_eq!(inv.client_name, "Librairie Mollat");
        assert_eq!(inv.date, NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(grouped.diagnostics.for_invoice("F8").count(), 2);
    }

    #[test]
    fn test_header_total_mismatch_reported() {
        let mut a = line("F9", 100.0, 20.0);
        a.header_total = Some(120.0);
        let mut b = line("F9", 10.0, 20.0);
        b.header_total = Some(120.0);

        let grouped = group_invoices(&batch(vec![a, b], AmountRegime::LineItems), 0.01);

        assert_eq!(grouped.invoices[0].total_excl_tax, 110.0);
        let diag = grouped.diagnostics.for_invoice("F9").next().unwrap();
        assert_eq!(diag.kind.code(), "HEADER_TOTAL_MISMATCH");
    }

    #[test]
    fn test_credit_note_repeated_header() {
        let grouped = group_invoices(
            &batch(
                vec![line("AV1", -50.0, 5.5), line("AV1", 0.0, 5.5), line("AV1", -50.0, 5.5)],
                AmountRegime::RepeatedHeader,
            ),
            0.01,
        );

        assert_eq!(grouped.invoices[0].total_excl_tax, -50.0);
    }
}
