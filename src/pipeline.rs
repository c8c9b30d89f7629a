// 🔗 Pipeline - Normalizer → Grouper → Generator → Assembler
//
// Single-threaded and deterministic: the same table and config always yield a
// byte-identical ledger. Only missing columns abort the run.

use crate::config::PipelineConfig;
use crate::data_quality::Diagnostics;
use crate::error::Result;
use crate::grouping::{group_invoices, InvoiceAggregate};
use crate::ledger::Ledger;
use crate::parser::{normalize, AmountRegime, RawTable};
use crate::reconciliation::{ReconciliationEngine, ReconciliationReport};
use crate::vat::EntryGenerator;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub ledger: Ledger,
    pub reconciliation: ReconciliationReport,

    /// Normalizer, grouper, generator, then run-level findings
    pub diagnostics: Diagnostics,

    pub invoices: Vec<InvoiceAggregate>,

    /// Invoice ids that produced no lines
    pub skipped: Vec<String>,

    pub regime: AmountRegime,
}

impl PipelineOutput {
    pub fn posted_count(&self) -> usize {
        self.invoices.len() - self.skipped.len()
    }
}

pub fn run(table: &RawTable, config: &PipelineConfig) -> Result<PipelineOutput> {
    config.validate()?;

    let batch = normalize(table, config)?;
    let regime = batch.regime;
    info!(lines = batch.lines.len(), regime = regime.name(), "normalized input");

    let grouped = group_invoices(&batch, config.tolerance);
    info!(invoices = grouped.invoices.len(), "grouped invoices");

    let generator = EntryGenerator::new(&config.accounts, config.negligible_vat);
    let generated = generator.generate_all(&grouped.invoices);

    let ledger = Ledger::assemble(&generated.posted);
    let reconciliation = ReconciliationEngine::with_tolerance(config.tolerance).reconcile(&ledger);

    let mut diagnostics = Diagnostics::new();
    diagnostics.extend(batch.diagnostics);
    diagnostics.extend(grouped.diagnostics);
    diagnostics.extend(generated.diagnostics);
    if let Some(diag) = reconciliation.diagnostic() {
        warn!(discrepancy = reconciliation.discrepancy, "ledger does not balance");
        diagnostics.push(diag);
    }

    info!(
        posted = generated.posted.len(),
        skipped = generated.skipped.len(),
        ledger_lines = ledger.len(),
        diagnostics = diagnostics.len(),
        "{}",
        reconciliation.summary()
    );

    Ok(PipelineOutput {
        ledger,
        reconciliation,
        diagnostics,
        invoices: grouped.invoices,
        skipped: generated.skipped,
        regime,
    })
}

pub fn run_path(path: &Path, config: &PipelineConfig) -> Result<PipelineOutput> {
    let table = RawTable::from_path(path)?;
    run(&table, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_quality::Severity;

    #[test]
    fn test_run_repeated_header_table() {
        let table = RawTable::from_rows(
            &["invoice_id", "date", "client_name", "amount_excl_tax", "vat_rate"],
            &[
                &["F1", "2024-03-15", "Fnac", "100", "20"],
                &["F1", "2024-03-15", "Fnac", "100", "20"],
                &["F2", "15/03/2024", "Decitre", "50", "5,5"],
            ],
        );

        let output = run(&table, &PipelineConfig::default()).unwrap();

        assert_eq!(output.regime, AmountRegime::RepeatedHeader);
        assert_eq!(output.invoices.len(), 2);
        assert_eq!(output.posted_count(), 2);
        assert_eq!(output.ledger.len(), 6);
        assert!(output.reconciliation.is_balanced());
        assert!(!output.diagnostics.has_critical());

        println!("✅ {}", output.reconciliation.summary());
    }

    #[test]
    fn test_missing_columns_abort() {
        let table = RawTable::from_rows(&["invoice_id", "client_name"], &[&["F1", "Fnac"]]);
        let err = run(&table, &PipelineConfig::default()).unwrap_err();

        let missing = err.missing_columns().unwrap();
        assert!(missing.contains(&"date".to_string()));
        assert!(missing.contains(&"vat_rate".to_string()));
    }

    #[test]
    fn test_skipped_invoice_is_diagnosed() {
        let table = RawTable::from_rows(
            &["invoice_id", "date", "client_name", "amount_excl_tax", "vat_rate"],
            &[
                &["F1", "2024-03-15", "Fnac", "300", "20"],
                &["F1", "2024-03-15", "Fnac", "300", "5.5"],
            ],
        );

        let output = run(&table, &PipelineConfig::default()).unwrap();

        assert!(output.ledger.is_empty());
        assert_eq!(output.skipped, vec!["F1".to_string()]);
        assert_eq!(output.diagnostics.count(Severity::Warning), 1);
    }
}
