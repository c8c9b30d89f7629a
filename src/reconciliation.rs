// ⚖️ Reconciliation - Validate that the journal balances
//
//   total_debit - total_credit = discrepancy   (expected ≈ 0)
//
// An imbalance never aborts a run. The report flags it and the caller
// decides whether to accept the output.

use crate::data_quality::{Diagnostic, DiagnosticKind};
use crate::ledger::Ledger;
use serde::{Deserialize, Serialize};

// ============================================================================
// RECONCILIATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReconciliationResult {
    /// Debit and credit agree within tolerance
    Balanced { total_debit: f64, total_credit: f64 },

    /// Run completed but is suspect
    Imbalanced {
        total_debit: f64,
        total_credit: f64,
        discrepancy: f64,
        tolerance: f64,
    },
}

impl ReconciliationResult {
    pub fn is_balanced(&self) -> bool {
        matches!(self, ReconciliationResult::Balanced { .. })
    }

    pub fn discrepancy(&self) -> f64 {
        match self {
            ReconciliationResult::Balanced { .. } => 0.0,
            ReconciliationResult::Imbalanced { discrepancy, .. } => *discrepancy,
        }
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub result: ReconciliationResult,
    pub line_count: usize,
    pub total_debit: f64,
    pub total_credit: f64,

    /// Raw total_debit - total_credit, reported even when within tolerance
    pub discrepancy: f64,

    /// Pieces whose own lines do not balance
    pub unbalanced_pieces: Vec<String>,
}

impl ReconciliationReport {
    pub fn is_balanced(&self) -> bool {
        self.result.is_balanced()
    }

    /// Run-level diagnostic when the ledger is suspect
    pub fn diagnostic(&self) -> Option<Diagnostic> {
        match self.result {
            ReconciliationResult::Balanced { .. } => None,
            ReconciliationResult::Imbalanced { total_debit, total_credit, discrepancy, .. } => {
                Some(Diagnostic::new(DiagnosticKind::ImbalancedLedger {
                    total_debit,
                    total_credit,
                    discrepancy,
                }))
            }
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} lines, debit {:.2}, credit {:.2}, discrepancy {:.2}{}",
            self.line_count,
            self.total_debit,
            self.total_credit,
            self.discrepancy,
            if self.is_balanced() { "" } else { " (IMBALANCED)" }
        )
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    /// Tolerance for floating-point comparisons (default: 0.01)
    pub tolerance: f64,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine { tolerance: 0.01 }
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        ReconciliationEngine { tolerance }
    }

    pub fn reconcile(&self, ledger: &Ledger) -> ReconciliationReport {
        let discrepancy = ledger.discrepancy();

        let result = if discrepancy.abs() <= self.tolerance {
            ReconciliationResult::Balanced {
                total_debit: ledger.total_debit,
                total_credit: ledger.total_credit,
            }
        } else {
            ReconciliationResult::Imbalanced {
                total_debit: ledger.total_debit,
                total_credit: ledger.total_credit,
                discrepancy,
                tolerance: self.tolerance,
            }
        };

        ReconciliationReport {
            result,
            line_count: ledger.len(),
            total_debit: ledger.total_debit,
            total_credit: ledger.total_credit,
            discrepancy,
            unbalanced_pieces: self.unbalanced_pieces(ledger),
        }
    }

    /// Pieces in first-seen order whose signed sum exceeds tolerance
    fn unbalanced_pieces(&self, ledger: &Ledger) -> Vec<String> {
        let mut sums: Vec<(&str, f64)> = Vec::new();
        for line in &ledger.lines {
            match sums.iter_mut().find(|(piece, _)| *piece == line.piece_number) {
                Some((_, sum)) => *sum += line.signed_amount(),
                None => sums.push((line.piece_number.as_str(), line.signed_amount())),
            }
        }

        sums.into_iter()
            .filter(|(_, sum)| sum.abs() > self.tolerance)
            .map(|(piece, _)| piece.to_string())
            .collect()
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerLine, Side};

    fn line(piece: &str, side: Side, amount: f64) -> LedgerLine {
        LedgerLine::entry(None, "VT", "411A", piece, "test".to_string(), side, amount)
    }

    #[test]
    fn test_reconciliation_balanced() {
        let engine = ReconciliationEngine::new();
        let ledger = Ledger::from_lines(vec![
            line("F1", Side::Debit, 120.0),
            line("F1", Side::Credit, 100.0),
            line("F1", Side::Credit, 20.0),
        ]);

        let report = engine.reconcile(&ledger);

        assert!(report.is_balanced());
        assert_eq!(report.line_count, 3);
        assert!(report.unbalanced_pieces.is_empty());
        assert!(report.diagnostic().is_none());

        println!("✅ {}", report.summary());
    }

    #[test]
    fn test_reconciliation_within_tolerance() {
        let engine = ReconciliationEngine::new();
        let ledger = Ledger::from_lines(vec![
            line("F1", Side::Debit, 100.005),
            line("F1", Side::Credit, 100.0),
        ]);

        assert!(engine.reconcile(&ledger).is_balanced());
    }

    #[test]
    fn test_reconciliation_imbalanced_flags_piece() {
        let engine = ReconciliationEngine::new();
        let ledger = Ledger::from_lines(vec![
            line("F1", Side::Debit, 120.0),
            line("F1", Side::Credit, 120.0),
            line("F2", Side::Debit, 50.0),
            line("F2", Side::Credit, 45.0),
        ]);

        let report = engine.reconcile(&ledger);

        assert!(!report.is_balanced());
        assert!((report.result.discrepancy() - 5.0).abs() < 1e-9);
        assert_eq!(report.unbalanced_pieces, vec!["F2".to_string()]);

        let diag = report.diagnostic().unwrap();
        assert_eq!(diag.kind.code(), "IMBALANCED_LEDGER");
        assert!(report.summary().ends_with("(IMBALANCED)"));
    }

    #[test]
    fn test_empty_ledger_is_balanced() {
        let report = ReconciliationEngine::with_tolerance(0.001).reconcile(&Ledger::default());
        assert!(report.is_balanced());
        assert_eq!(report.discrepancy, 0.0);
    }
}
