// Sales Journal - Core Library
// Invoice export → balanced sales journal, plus returns and treasury reports

pub mod error;
pub mod config;
pub mod schema;          // Column aliases and header resolution
pub mod parser;          // Line Normalizer
pub mod grouping;        // Invoice Grouper
pub mod rules;           // Account plan
pub mod vat;             // VAT Classifier & Entry Generator
pub mod ledger;          // Ledger Assembler
pub mod reconciliation;  // Control totals
pub mod data_quality;    // Diagnostics channel
pub mod returns;         // Returns / discounts / provisions by analytic code
pub mod treasury;        // Monthly flows and projection
pub mod pipeline;

// Re-export commonly used types
pub use error::{JournalError, Result};
pub use config::PipelineConfig;
pub use schema::{ColumnSchema, ResolvedColumns};
pub use parser::{
    AmountRegime, InvoiceLine, NormalizedBatch, RawTable,
    normalize, parse_amount, parse_date, parse_rate,
};
pub use grouping::{group_invoices, GroupedInvoices, InvoiceAggregate, RateShare};
pub use rules::{AccountPlan, RateAccount};
pub use vat::{
    classify, round2, EntryGenerator, GeneratedBatch, GenerationOutcome,
    InvoiceEntries, VatClass,
};
pub use ledger::{Ledger, LedgerLine, Side};
pub use reconciliation::{ReconciliationEngine, ReconciliationReport, ReconciliationResult};
pub use data_quality::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use returns::{AnalyticEntry, AnalyticImpact, ReturnsAggregator, ReturnsConfig, ReturnsReport};
pub use treasury::{Month, MonthlyFlow, TreasuryConfig, TreasuryReport};
pub use pipeline::{run, run_path, PipelineOutput};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
