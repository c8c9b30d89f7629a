// ✅ Diagnostics - per-row, per-invoice and run-level findings
//
// Nothing here stops a run. Fatal problems are errors (error.rs); everything
// a user should see alongside the produced journal lands in a Diagnostics
// collection and is handed back as plain data.

use serde::{Deserialize, Serialize};

// ============================================================================
// SEVERITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,     // Recovered locally, shown for traceability
    Warning,  // Output is incomplete or an assumption was made
    Critical, // The run completed but should not be trusted as-is
}

// ============================================================================
// DIAGNOSTIC KINDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// Amount cell could not be parsed; 0.0 was used
    UnparsableAmount { row: usize, raw: String },

    /// Rate cell could not be parsed; 0.0 was used
    UnparsableRate { row: usize, raw: String },

    /// Date cell could not be parsed; the line has no date
    UnparsableDate { row: usize, raw: String },

    /// Row dropped because its invoice id is empty
    MissingInvoiceId { row: usize },

    /// Lines of one invoice disagree on date or client; first seen wins
    InconsistentInvoiceHeader { field: String, kept: String, ignored: String },

    /// Header total differs from the sum of line amounts; line sum used
    HeaderTotalMismatch { header_total: f64, line_total: f64 },

    /// Invoice total is zero; no lines emitted
    ZeroTotalInvoice,

    /// Several rates present but no per-line HT to split them; invoice skipped
    UnresolvableMultiRateInvoice { rates: Vec<f64> },

    /// Total debit and total credit disagree beyond tolerance
    ImbalancedLedger { total_debit: f64, total_credit: f64, discrepancy: f64 },
}

impl DiagnosticKind {
    pub fn severity(&self) -> Severity {
        match self {
            DiagnosticKind::UnparsableAmount { .. }
            | DiagnosticKind::UnparsableRate { .. }
            | DiagnosticKind::UnparsableDate { .. }
            | DiagnosticKind::ZeroTotalInvoice => Severity::Info,
            DiagnosticKind::MissingInvoiceId { .. }
            | DiagnosticKind::InconsistentInvoiceHeader { .. }
            | DiagnosticKind::HeaderTotalMismatch { .. }
            | DiagnosticKind::UnresolvableMultiRateInvoice { .. } => Severity::Warning,
            DiagnosticKind::ImbalancedLedger { .. } => Severity::Critical,
        }
    }

    /// Short stable code, handy for filtering in a UI
    pub fn code(&self) -> &'static str {
        match self {
            DiagnosticKind::UnparsableAmount { .. } => "UNPARSABLE_AMOUNT",
            DiagnosticKind::UnparsableRate { .. } => "UNPARSABLE_RATE",
            DiagnosticKind::UnparsableDate { .. } => "UNPARSABLE_DATE",
            DiagnosticKind::MissingInvoiceId { .. } => "MISSING_INVOICE_ID",
            DiagnosticKind::InconsistentInvoiceHeader { .. } => "INCONSISTENT_HEADER",
            DiagnosticKind::HeaderTotalMismatch { .. } => "HEADER_TOTAL_MISMATCH",
            DiagnosticKind::ZeroTotalInvoice => "ZERO_TOTAL",
            DiagnosticKind::UnresolvableMultiRateInvoice { .. } => "UNRESOLVABLE_MULTI_RATE",
            DiagnosticKind::ImbalancedLedger { .. } => "IMBALANCED_LEDGER",
        }
    }
}

// ============================================================================
// DIAGNOSTIC
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub invoice_id: Option<String>,
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    /// Row- or run-level diagnostic
    pub fn new(kind: DiagnosticKind) -> Self {
        let message = describe(&kind);
        Diagnostic {
            invoice_id: None,
            severity: kind.severity(),
            kind,
            message,
        }
    }

    /// Diagnostic attached to one invoice
    pub fn for_invoice(invoice_id: &str, kind: DiagnosticKind) -> Self {
        let mut diag = Diagnostic::new(kind);
        diag.invoice_id = Some(invoice_id.to_string());
        diag
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.invoice_id {
            Some(id) => write!(f, "[{:?}] {} ({}): {}", self.severity, self.kind.code(), id, self.message),
            None => write!(f, "[{:?}] {}: {}", self.severity, self.kind.code(), self.message),
        }
    }
}

fn describe(kind: &DiagnosticKind) -> String {
    match kind {
        DiagnosticKind::UnparsableAmount { row, raw } => {
            format!("Row {}: amount '{}' is not a number, using 0.00", row, raw)
        }
        DiagnosticKind::UnparsableRate { row, raw } => {
            format!("Row {}: VAT rate '{}' is not a number, using 0", row, raw)
        }
        DiagnosticKind::UnparsableDate { row, raw } => {
            format!("Row {}: date '{}' not recognized, line kept without date", row, raw)
        }
        DiagnosticKind::MissingInvoiceId { row } => {
            format!("Row {}: empty invoice id, row ignored", row)
        }
        DiagnosticKind::InconsistentInvoiceHeader { field, kept, ignored } => {
            format!("Lines disagree on {}: kept '{}', ignored '{}'", field, kept, ignored)
        }
        DiagnosticKind::HeaderTotalMismatch { header_total, line_total } => format!(
            "Header total {:.2} differs from line total {:.2}, using line total",
            header_total, line_total
        ),
        DiagnosticKind::ZeroTotalInvoice => "Invoice total is zero, no entries generated".to_string(),
        DiagnosticKind::UnresolvableMultiRateInvoice { rates } => format!(
            "Rates present ({}) but HT not broken out, invoice skipped",
            rates.iter().map(|r| format!("{}%", r)).collect::<Vec<_>>().join(", ")
        ),
        DiagnosticKind::ImbalancedLedger { total_debit, total_credit, discrepancy } => format!(
            "Debit {:.2} vs credit {:.2}: discrepancy {:.2}",
            total_debit, total_credit, discrepancy
        ),
    }
}

// ============================================================================
// COLLECTION
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics { items: Vec::new() }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    pub fn items(&self) -> &[Diagnostic] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.items.iter().filter(|d| d.severity == severity).count()
    }

    pub fn for_invoice<'a>(&'a self, invoice_id: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.items
            .iter()
            .filter(move |d| d.invoice_id.as_deref() == Some(invoice_id))
    }

    pub fn has_critical(&self) -> bool {
        self.items.iter().any(|d| d.severity == Severity::Critical)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} diagnostics ({} critical, {} warnings, {} info)",
            self.items.len(),
            self.count(Severity::Critical),
            self.count(Severity::Warning),
            self.count(Severity::Info)
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
