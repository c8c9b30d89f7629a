// 🧮 VAT Classifier & Entry Generator
//
// Mono-rate invoice:  client debit TTC / sales credit HT on the rate's account
//                     / VAT credit unless VAT is exactly zero.
// Multi-rate invoice: client debit HT + Σ VAT / one sales credit for the whole
//                     HT on the multi-rate account / one VAT credit per rate
//                     whose VAT exceeds the negligible threshold.

use crate::data_quality::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::grouping::InvoiceAggregate;
use crate::ledger::{LedgerLine, Side};
use crate::rules::AccountPlan;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ============================================================================
// ROUNDING
// ============================================================================

/// Round to cents, half away from zero.
///
/// The nudge absorbs binary representation error so that values written as
/// x.xx5 in decimal round up (2.675 is stored as 2.67499999...).
pub fn round2(value: f64) -> f64 {
    let scaled = value * 100.0;
    let nudged = scaled + scaled.signum() * 1e-9 * scaled.abs().max(1.0);
    nudged.round() / 100.0 + 0.0
}

/// `5.5` → `"5.5"`, `20.0` → `"20"`
pub fn format_rate(rate: f64) -> String {
    format!("{}", rate)
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VatClass {
    /// One effective rate, including the all-zero-rate case
    Mono { rate: f64 },

    /// Two or more distinct rates on lines carrying an amount
    Multi { rates: Vec<f64> },
}

impl VatClass {
    pub fn is_multi(&self) -> bool {
        matches!(self, VatClass::Multi { .. })
    }
}

/// MULTI iff the invoice's rate set has more than one element
pub fn classify(invoice: &InvoiceAggregate) -> VatClass {
    match invoice.sole_rate() {
        Some(rate) => VatClass::Mono { rate },
        None => VatClass::Multi { rates: invoice.rates.clone() },
    }
}

// ============================================================================
// GENERATED ENTRIES
// ============================================================================

/// Balanced lines emitted for one invoice
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceEntries {
    pub invoice_id: String,
    pub class: VatClass,
    pub total_excl_tax: f64,
    pub vat_total: f64,
    pub total_incl_tax: f64,
    pub lines: Vec<LedgerLine>,

    /// Rates whose VAT line was dropped as negligible (multi-rate only)
    pub suppressed_rates: Vec<f64>,
}

impl InvoiceEntries {
    pub fn total_debit(&self) -> f64 {
        self.lines.iter().filter_map(|l| l.debit).sum()
    }

    pub fn total_credit(&self) -> f64 {
        self.lines.iter().filter_map(|l| l.credit).sum()
    }

    pub fn discrepancy(&self) -> f64 {
        self.total_debit() - self.total_credit()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Posted(InvoiceEntries),

    /// Total HT is zero: kept in aggregates, nothing to post
    SkippedZeroTotal,

    /// Several rates but no per-rate HT; nothing is guessed
    Unresolvable { rates: Vec<f64> },
}

/// Output of the generator over a whole batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedBatch {
    /// In invoice order
    pub posted: Vec<InvoiceEntries>,
    pub skipped: Vec<String>,
    pub diagnostics: Diagnostics,
}

// ============================================================================
// ENTRY GENERATOR
// ============================================================================

pub struct EntryGenerator<'a> {
    plan: &'a AccountPlan,

    /// Multi-rate VAT lines at or below this amount are not emitted
    negligible_vat: f64,
}

impl<'a> EntryGenerator<'a> {
    pub fn new(plan: &'a AccountPlan, negligible_vat: f64) -> Self {
        EntryGenerator { plan, negligible_vat }
    }

    pub fn generate(&self, invoice: &InvoiceAggregate) -> GenerationOutcome {
        let ht = round2(invoice.total_excl_tax);
        if ht == 0.0 {
            return GenerationOutcome::SkippedZeroTotal;
        }

        match classify(invoice) {
            VatClass::Mono { rate } => GenerationOutcome::Posted(self.mono(invoice, ht, rate)),
            VatClass::Multi { rates } => match invoice.rate_breakdown.as_deref() {
                Some(shares) => {
                    let shares: Vec<(f64, f64)> =
                        shares.iter().map(|s| (s.rate, s.amount_excl_tax)).collect();
                    GenerationOutcome::Posted(self.multi(invoice, ht, rates, &shares))
                }
                None => GenerationOutcome::Unresolvable { rates },
            },
        }
    }

    /// Generate for every invoice, collecting skips as diagnostics
    pub fn generate_all(&self, invoices: &[InvoiceAggregate]) -> GeneratedBatch {
        let mut batch = GeneratedBatch::default();

        for invoice in invoices {
            match self.generate(invoice) {
                GenerationOutcome::Posted(entries) => batch.posted.push(entries),
                GenerationOutcome::SkippedZeroTotal => {
                    debug!(invoice = %invoice.invoice_id, "zero total, no entries");
                    batch.skipped.push(invoice.invoice_id.clone());
                    batch.diagnostics.push(Diagnostic::for_invoice(
                        &invoice.invoice_id,
                        DiagnosticKind::ZeroTotalInvoice,
                    ));
                }
                GenerationOutcome::Unresolvable { rates } => {
                    warn!(invoice = %invoice.invoice_id, ?rates, "multi-rate invoice without HT breakdown skipped");
                    batch.skipped.push(invoice.invoice_id.clone());
                    batch.diagnostics.push(Diagnostic::for_invoice(
                        &invoice.invoice_id,
                        DiagnosticKind::UnresolvableMultiRateInvoice { rates },
                    ));
                }
            }
        }

        batch
    }

    fn mono(&self, invoice: &InvoiceAggregate, ht: f64, rate: f64) -> InvoiceEntries {
        let vat = round2(ht * rate / 100.0);
        let ttc = round2(ht + vat);

        let mut lines = vec![
            self.client_line(invoice, ttc),
            self.line(
                invoice,
                self.plan.sales_account_for(rate),
                format!("Ventes HT {}%", format_rate(rate)),
                Side::Credit,
                ht,
            ),
        ];

        // Suppressed only when exactly zero; small non-zero VAT is kept
        if vat != 0.0 {
            lines.push(self.line(
                invoice,
                &self.plan.vat_account,
                format!("TVA {}%", format_rate(rate)),
                Side::Credit,
                vat,
            ));
        }

        InvoiceEntries {
            invoice_id: invoice.invoice_id.clone(),
            class: VatClass::Mono { rate },
            total_excl_tax: ht,
            vat_total: vat,
            total_incl_tax: ttc,
            lines,
            suppressed_rates: Vec::new(),
        }
    }

    fn multi(
        &self,
        invoice: &InvoiceAggregate,
        ht: f64,
        rates: Vec<f64>,
        shares: &[(f64, f64)],
    ) -> InvoiceEntries {
        let mut vat_lines = Vec::new();
        let mut suppressed_rates = Vec::new();
        let mut vat_total = 0.0;

        for &(rate, sub_ht) in shares {
            let vat = round2(sub_ht * rate / 100.0);
            if vat.abs() <= self.negligible_vat {
                suppressed_rates.push(rate);
                continue;
            }
            vat_total += vat;
            vat_lines.push(self.line(
                invoice,
                &self.plan.vat_account,
                format!("TVA {}%", format_rate(rate)),
                Side::Credit,
                vat,
            ));
        }

        let ttc = round2(ht + vat_total);

        let mut lines = Vec::with_capacity(2 + vat_lines.len());
        lines.push(self.client_line(invoice, ttc));
        lines.push(self.line(
            invoice,
            &self.plan.multi_rate_account,
            "Ventes HT multi-taux".to_string(),
            Side::Credit,
            ht,
        ));
        lines.extend(vat_lines);

        InvoiceEntries {
            invoice_id: invoice.invoice_id.clone(),
            class: VatClass::Multi { rates },
            total_excl_tax: ht,
            vat_total,
            total_incl_tax: ttc,
            lines,
            suppressed_rates,
        }
    }

    fn client_line(&self, invoice: &InvoiceAggregate, ttc: f64) -> LedgerLine {
        let label = if invoice.client_name.is_empty() {
            format!("Facture {}", invoice.invoice_id)
        } else {
            format!("Facture {} {}", invoice.invoice_id, invoice.client_name)
        };
        self.line(
            invoice,
            &self.plan.client_account(&invoice.client_name),
            label,
            Side::Debit,
            ttc,
        )
    }

    fn line(
        &self,
        invoice: &InvoiceAggregate,
        account: &str,
        label: String,
        side: Side,
        amount: f64,
    ) -> LedgerLine {
        LedgerLine::entry(
            invoice.date,
            &self.plan.journal_code,
            account,
            &invoice.invoice_id,
            label,
            side,
            amount,
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::RateShare;
    use chrono::NaiveDate;

    fn invoice(id: &str, client: &str, shares: &[(f64, f64)]) -> InvoiceAggregate {
        let rates: Vec<f64> = shares.iter().map(|s| s.0).collect();
        InvoiceAggregate {
            invoice_id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 15),
            client_name: client.to_string(),
            total_excl_tax: shares.iter().map(|s| s.1).sum(),
            is_multi_rate: rates.len() > 1,
            rate_breakdown: Some(
                shares
                    .iter()
                    .map(|&(rate, amount_excl_tax)| RateShare { rate, amount_excl_tax })
                    .collect(),
            ),
            rates,
            line_count: shares.len(),
        }
    }

    fn posted(outcome: GenerationOutcome) -> InvoiceEntries {
        match outcome {
            GenerationOutcome::Posted(entries) => entries,
            other => panic!("expected posted entries, got {:?}", other),
        }
    }

    #[test]
    fn test_round2_half_up() {
        assert_eq!(round2(2.675), 2.68);
        assert_eq!(round2(1.005), 1.01);
        assert_eq!(round2(0.004), 0.0);
        assert_eq!(round2(2.75), 2.75);
        assert_eq!(round2(-2.675), -2.68);
        assert_eq!(round2(2.674999), 2.67);
        assert!(round2(-0.001).is_sign_positive());
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&invoice("F1", "Fnac", &[(20.0, 100.0)])), VatClass::Mono { rate: 20.0 });
        assert_eq!(
            classify(&invoice("F2", "Fnac", &[(20.0, 100.0), (5.5, 50.0)])),
            VatClass::Multi { rates: vec![20.0, 5.5] }
        );
        assert_eq!(classify(&invoice("F0", "Fnac", &[])), VatClass::Mono { rate: 0.0 });
    }

    #[test]
    fn test_mono_rate_entries() {
        let plan = AccountPlan::default();
        let generator = EntryGenerator::new(&plan, 0.01);

        let entries = posted(generator.generate(&invoice("F1", "Fnac", &[(20.0, 100.0)])));

        assert_eq!(entries.lines.len(), 3);
        assert_eq!(entries.lines[0].account_code, "411F");
        assert_eq!(entries.lines[0].debit, Some(120.0));
        assert_eq!(entries.lines[1].account_code, "701200");
        assert_eq!(entries.lines[1].credit, Some(100.0));
        assert_eq!(entries.lines[2].account_code, "445710");
        assert_eq!(entries.lines[2].credit, Some(20.0));
        assert_eq!(entries.lines[2].label, "TVA 20%");
        assert_eq!(entries.discrepancy(), 0.0);
    }

    #[test]
    fn test_mono_zero_rate_has_no_vat_line() {
        let plan = AccountPlan::default();
        let generator = EntryGenerator::new(&plan, 0.01);

        let entries = posted(generator.generate(&invoice("F3", "Gibert", &[(0.0, 200.0)])));

        assert_eq!(entries.lines.len(), 2);
        assert_eq!(entries.vat_total, 0.0);
        assert_eq!(entries.lines[0].debit, Some(200.0));
        assert_eq!(entries.lines[1].account_code, "701000");
        assert_eq!(entries.lines[1].credit, Some(200.0));
    }

    #[test]
    fn test_mono_small_rate_keeps_vat_line() {
        let plan = AccountPlan::default();
        let generator = EntryGenerator::new(&plan, 0.01);

        // 2.1% press rate, not canonical → fallback account, VAT 0.01 still posted
        let entries = posted(generator.generate(&invoice("F10", "Relay", &[(2.1, 0.5)])));

        assert_eq!(entries.lines.len(), 3);
        assert_eq!(entries.lines[1].account_code, "701900");
        assert_eq!(entries.lines[2].credit, Some(0.01));
    }

    #[test]
    fn test_multi_rate_entries() {
        let plan = AccountPlan::default();
        let generator = EntryGenerator::new(&plan, 0.01);

        let entries = posted(generator.generate(&invoice("F2", "Decitre", &[(20.0, 100.0), (5.5, 50.0)])));

        assert_eq!(entries.lines.len(), 4);
        assert_eq!(entries.lines[0].debit, Some(172.75));
        assert_eq!(entries.lines[1].account_code, "701900");
        assert_eq!(entries.lines[1].credit, Some(150.0));
        assert_eq!(entries.lines[2].credit, Some(20.0));
        assert_eq!(entries.lines[2].label, "TVA 20%");
        assert_eq!(entries.lines[3].credit, Some(2.75));
        assert_eq!(entries.lines[3].label, "TVA 5.5%");
        assert!(entries.discrepancy().abs() < 1e-9);
    }

    #[test]
    fn test_multi_rate_negligible_vat_suppressed() {
        let plan = AccountPlan::default();
        let generator = EntryGenerator::new(&plan, 0.01);

        // 0.08 at 5.5% → 0.0044 VAT, rounds to 0.00
        let entries = posted(generator.generate(&invoice("F5", "Sauramps", &[(20.0, 100.0), (5.5, 0.08)])));

        assert_eq!(entries.suppressed_rates, vec![5.5]);
        assert_eq!(entries.lines.len(), 3);
        assert_eq!(entries.lines[1].credit, Some(100.08));
        assert_eq!(entries.lines[0].debit, Some(120.08));
        assert!(entries.discrepancy().abs() < 1e-9);
    }

    #[test]
    fn test_multi_rate_without_breakdown_is_unresolvable() {
        let plan = AccountPlan::default();
        let generator = EntryGenerator::new(&plan, 0.01);

        let mut inv = invoice("F4", "Fnac", &[(20.0, 150.0), (5.5, 150.0)]);
        inv.total_excl_tax = 150.0;
        inv.rate_breakdown = None;

        assert_eq!(
            generator.generate(&inv),
            GenerationOutcome::Unresolvable { rates: vec![20.0, 5.5] }
        );

        let batch = generator.generate_all(&[inv]);
        assert!(batch.posted.is_empty());
        assert_eq!(batch.skipped, vec!["F4".to_string()]);
        assert_eq!(batch.diagnostics.len(), 1);
    }

    #[test]
    fn test_zero_total_skipped() {
        let plan = AccountPlan::default();
        let generator = EntryGenerator::new(&plan, 0.01);

        assert_eq!(
            generator.generate(&invoice("F7", "Fnac", &[(20.0, 0.0)])),
            GenerationOutcome::SkippedZeroTotal
        );
    }

    #[test]
    fn test_credit_note_swaps_sides() {
        let plan = AccountPlan::default();
        let generator = EntryGenerator::new(&plan, 0.01);

        let entries = posted(generator.generate(&invoice("AV1", "Fnac", &[(5.5, -100.0)])));

        assert_eq!(entries.lines[0].credit, Some(105.5));
        assert_eq!(entries.lines[0].debit, None);
        assert_eq!(entries.lines[1].debit, Some(100.0));
        assert_eq!(entries.lines[2].debit, Some(5.5));
        assert!(entries.discrepancy().abs() < 1e-9);
    }
}
