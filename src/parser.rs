// 🏗️ Line Normalizer
// Raw tabular rows → canonical InvoiceLine records
//
// Cleaning is lenient: an amount or rate that cannot be read becomes 0.0 and
// a date that cannot be read becomes None. Each of those is reported as a
// diagnostic instead of aborting the batch. Only a missing column is fatal.

use crate::config::PipelineConfig;
use crate::data_quality::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::error::{JournalError, Result};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

// ============================================================================
// RAW TABLE
// ============================================================================

/// Untyped table as handed over by the upload adapter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        RawTable { headers, rows }
    }

    /// Build from string slices (convenient for adapters and tests)
    pub fn from_rows(headers: &[&str], rows: &[&[&str]]) -> Self {
        RawTable {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    /// Parse CSV text, sniffing `;` vs `,` from the header line
    pub fn from_csv_str(content: &str) -> Result<Self> {
        let delimiter = sniff_delimiter(content);
        Self::from_reader(content.as_bytes(), delimiter)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let content = String::from_utf8(bytes).map_err(|e| JournalError::Encoding {
            path: path.display().to_string(),
            offset: e.utf8_error().valid_up_to(),
        })?;
        Self::from_csv_str(&content)
    }

    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(reader);

        let headers = rdr.headers()?.iter().map(|h| h.to_string()).collect();

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }

        Ok(RawTable { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell text, empty when the row is short
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|s| s.as_str())
            .unwrap_or("")
    }
}

fn sniff_delimiter(content: &str) -> u8 {
    let first_line = content.lines().next().unwrap_or("");
    let semicolons = first_line.matches(';').count();
    let commas = first_line.matches(',').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

// ============================================================================
// CELL PARSING
// ============================================================================

/// Result of lenient numeric parsing.
///
/// `was_clean` is false only when the cell had content that could not be
/// read as a number; empty cells are clean zeros.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedNumber {
    pub value: f64,
    pub was_clean: bool,
}

impl ParsedNumber {
    fn clean(value: f64) -> Self {
        ParsedNumber { value, was_clean: true }
    }

    fn dirty() -> Self {
        ParsedNumber { value: 0.0, was_clean: false }
    }
}

/// Parse a monetary amount: currency and percent symbols, thousands
/// separators and decimal commas are handled. Never fails.
pub fn parse_amount(text: &str) -> ParsedNumber {
    let trimmed = text.trim();
    if is_blank(trimmed) {
        return ParsedNumber::clean(0.0);
    }

    let (negative, body) = match trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };

    let stripped: String = body
        .chars()
        .filter(|c| !matches!(c, '€' | '$' | '£' | '%' | ' ' | '\u{a0}' | '\u{202f}' | '\''))
        .collect();
    let stripped = stripped
        .trim_end_matches("EUR")
        .trim_end_matches("eur")
        .to_string();

    match normalize_separators(&stripped).parse::<f64>() {
        Ok(v) if v.is_finite() => {
            let v = if negative { -v } else { v };
            ParsedNumber::clean(v + 0.0)
        }
        _ => ParsedNumber::dirty(),
    }
}

/// Parse a VAT rate in percent (`"5,5"`, `"20 %"`, `"20.0"`). Never fails.
pub fn parse_rate(text: &str) -> ParsedNumber {
    let parsed = parse_amount(text);
    // -0.0 and 0.0 must compare and hash alike downstream
    if parsed.value == 0.0 {
        ParsedNumber { value: 0.0, ..parsed }
    } else {
        parsed
    }
}

pub(crate) fn is_blank(text: &str) -> bool {
    text.is_empty()
        || text.eq_ignore_ascii_case("nan")
        || text.eq_ignore_ascii_case("none")
        || text.eq_ignore_ascii_case("null")
        || text == "-"
}

/// Decide which of `,` / `.` is the decimal mark and drop the other
fn normalize_separators(s: &str) -> String {
    let last_comma = s.rfind(',');
    let last_dot = s.rfind('.');

    match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(_), None) if s.matches(',').count() == 1 => s.replace(',', "."),
        (Some(_), None) => s.replace(',', ""),
        (None, Some(_)) if s.matches('.').count() > 1 => s.replace('.', ""),
        _ => s.to_string(),
    }
}

/// Best-effort calendar parse. Unreadable dates are None.
pub fn parse_date(text: &str, formats: &[String]) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if is_blank(trimmed) {
        return None;
    }

    for fmt in formats {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            if has_full_year(fmt, date) {
                return Some(date);
            }
        }
    }

    // Datetime renderings from spreadsheet exports
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            if has_full_year(fmt, dt.date()) {
                return Some(dt.date());
            }
        }
    }

    excel_serial_date(trimmed)
}

/// chrono's `%Y` also accepts `24`; such a match belongs to a `%y` format
fn has_full_year(fmt: &str, date: NaiveDate) -> bool {
    !fmt.contains("%Y") || date.year() >= 1000
}

/// Excel 1900 date system: day 1 is 1900-01-01, epoch shifted for the
/// phantom 1900-02-29
fn excel_serial_date(text: &str) -> Option<NaiveDate> {
    let serial: f64 = text.parse().ok()?;
    if !(1.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}

/// Invoice ids are opaque: only the float-export artifact is undone
/// (`"1042.0"` → `"1042"`). Leading zeros and exponents are kept as written.
pub fn normalize_invoice_id(text: &str) -> String {
    let trimmed = text.trim();
    if is_blank(trimmed) {
        return String::new();
    }
    match trimmed.strip_suffix(".0") {
        Some(digits) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => digits.to_string(),
        _ => trimmed.to_string(),
    }
}

/// Account cells exported as floats (`"1042.0"`) become `"1042"`;
/// anything else is trimmed text.
pub fn normalize_code(text: &str) -> String {
    let trimmed = text.trim();
    if is_blank(trimmed) {
        return String::new();
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", v.trunc() as i64),
        _ => trimmed.to_string(),
    }
}

// ============================================================================
// NORMALIZED SHAPES
// ============================================================================

/// How the amount column relates to the invoice total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmountRegime {
    /// Each line repeats the invoice HT total; the total is the max, not the sum
    RepeatedHeader,

    /// Each line carries its own HT; the total is the sum
    LineItems,
}

impl AmountRegime {
    pub fn name(&self) -> &str {
        match self {
            AmountRegime::RepeatedHeader => "repeated header total",
            AmountRegime::LineItems => "line items",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    /// Line number in the source file (header is line 1)
    pub row: usize,
    pub invoice_id: String,
    pub date: Option<NaiveDate>,
    pub client_name: String,

    /// Line HT in `LineItems`, repeated invoice HT in `RepeatedHeader`
    pub amount_excl_tax: f64,

    /// Header total carried alongside line amounts, when the source has both
    pub header_total: Option<f64>,

    pub vat_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch {
    pub lines: Vec<InvoiceLine>,
    pub regime: AmountRegime,
    pub diagnostics: Diagnostics,
}

// ============================================================================
// NORMALIZER
// ============================================================================

/// Validate the table's columns once, then clean every row.
pub fn normalize(table: &RawTable, config: &PipelineConfig) -> Result<NormalizedBatch> {
    let cols = config.columns.resolve(&table.headers)?;

    let regime = config.amount_regime.unwrap_or(if cols.has_line_breakdown() {
        AmountRegime::LineItems
    } else {
        AmountRegime::RepeatedHeader
    });

    let (amount_col, header_col) = match regime {
        AmountRegime::LineItems => match cols.line_amount {
            Some(line) => (line, cols.header_total),
            None => (cols.header_total.ok_or_else(missing_amount)?, None),
        },
        AmountRegime::RepeatedHeader => match cols.header_total {
            Some(header) => (header, None),
            None => (cols.line_amount.ok_or_else(missing_amount)?, None),
        },
    };

    debug!(regime = regime.name(), rows = table.len(), "normalizing input table");

    let mut lines = Vec::with_capacity(table.len());
    let mut diagnostics = Diagnostics::new();

    for idx in 0..table.len() {
        let row = idx + 2; // 1-indexed + header row

        let invoice_id = normalize_invoice_id(table.cell(idx, cols.invoice_id));
        if invoice_id.is_empty() {
            diagnostics.push(Diagnostic::new(DiagnosticKind::MissingInvoiceId { row }));
            continue;
        }

        let raw_amount = table.cell(idx, amount_col);
        let amount = parse_amount(raw_amount);
        if !amount.was_clean {
            diagnostics.push(Diagnostic::for_invoice(
                &invoice_id,
                DiagnosticKind::UnparsableAmount { row, raw: raw_amount.to_string() },
            ));
        }

        let header_total = header_col.map(|col| {
            let raw = table.cell(idx, col);
            let parsed = parse_amount(raw);
            if !parsed.was_clean {
                diagnostics.push(Diagnostic::for_invoice(
                    &invoice_id,
                    DiagnosticKind::UnparsableAmount { row, raw: raw.to_string() },
                ));
            }
            parsed.value
        });

        let raw_rate = table.cell(idx, cols.vat_rate);
        let rate = parse_rate(raw_rate);
        if !rate.was_clean {
            diagnostics.push(Diagnostic::for_invoice(
                &invoice_id,
                DiagnosticKind::UnparsableRate { row, raw: raw_rate.to_string() },
            ));
        }

        let raw_date = table.cell(idx, cols.date);
        let date = parse_date(raw_date, &config.date_formats);
        if date.is_none() && !is_blank(raw_date.trim()) {
            diagnostics.push(Diagnostic::for_invoice(
                &invoice_id,
                DiagnosticKind::UnparsableDate { row, raw: raw_date.to_string() },
            ));
        }

        lines.push(InvoiceLine {
            row,
            invoice_id,
            date,
            client_name: table.cell(idx, cols.client_name).trim().to_string(),
            amount_excl_tax: amount.value,
            header_total,
            vat_rate: rate.value,
        });
    }

    info!(
        lines = lines.len(),
        dropped = table.len() - lines.len(),
        regime = regime.name(),
        "normalized invoice lines"
    );

    Ok(NormalizedBatch { lines, regime, diagnostics })
}

fn missing_amount() -> JournalError {
    JournalError::MissingColumns(vec![crate::schema::FIELD_AMOUNT.to_string()])
}

// ============================================================================
// TESTS
// ============================================================================
