// 📒 Ledger - emitted journal lines and the assembler
//
// A LedgerLine carries an amount on exactly one side. Lines are built once by
// the entry generator and never touched again; the assembler only
// concatenates them in invoice order and sums both sides.

use crate::error::Result;
use crate::vat::InvoiceEntries;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::io::Write;

// ============================================================================
// LEDGER LINE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Debit,
    Credit,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Debit => Side::Credit,
            Side::Credit => Side::Debit,
        }
    }
}

/// Serialize-only: dates and amounts are rendered as CSV text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerLine {
    #[serde(serialize_with = "serialize_date")]
    pub date: Option<NaiveDate>,

    pub journal_code: String,
    pub account_code: String,

    /// The source invoice id
    pub piece_number: String,

    pub label: String,

    #[serde(serialize_with = "serialize_amount")]
    pub debit: Option<f64>,

    #[serde(serialize_with = "serialize_amount")]
    pub credit: Option<f64>,
}

impl LedgerLine {
    /// Build a line on `side`. A negative amount is posted as its absolute
    /// value on the opposite side, so both columns stay non-negative.
    pub fn entry(
        date: Option<NaiveDate>,
        journal_code: &str,
        account_code: &str,
        piece_number: &str,
        label: String,
        side: Side,
        amount: f64,
    ) -> Self {
        let (side, amount) = if amount < 0.0 {
            (side.opposite(), -amount)
        } else {
            (side, amount)
        };

        let (debit, credit) = match side {
            Side::Debit => (Some(amount), None),
            Side::Credit => (None, Some(amount)),
        };

        LedgerLine {
            date,
            journal_code: journal_code.to_string(),
            account_code: account_code.to_string(),
            piece_number: piece_number.to_string(),
            label,
            debit,
            credit,
        }
    }

    pub fn side(&self) -> Side {
        if self.debit.is_some() {
            Side::Debit
        } else {
            Side::Credit
        }
    }

    /// Signed amount: debit positive, credit negative
    pub fn signed_amount(&self) -> f64 {
        self.debit.unwrap_or(0.0) - self.credit.unwrap_or(0.0)
    }

    /// Exactly one of debit/credit is set
    pub fn is_well_formed(&self) -> bool {
        self.debit.is_some() != self.credit.is_some()
    }
}

fn serialize_date<S: Serializer>(date: &Option<NaiveDate>, s: S) -> std::result::Result<S::Ok, S::Error> {
    match date {
        Some(d) => s.serialize_str(&d.format("%Y-%m-%d").to_string()),
        None => s.serialize_str(""),
    }
}

fn serialize_amount<S: Serializer>(amount: &Option<f64>, s: S) -> std::result::Result<S::Ok, S::Error> {
    match amount {
        Some(v) => s.serialize_str(&format!("{:.2}", v)),
        None => s.serialize_str(""),
    }
}

// ============================================================================
// LEDGER (ASSEMBLER OUTPUT)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ledger {
    pub lines: Vec<LedgerLine>,
    pub total_debit: f64,
    pub total_credit: f64,
}

impl Ledger {
    /// Concatenate invoice entries in emission order and compute control totals
    pub fn assemble(entries: &[InvoiceEntries]) -> Self {
        Self::from_lines(entries.iter().flat_map(|e| e.lines.iter().cloned()).collect())
    }

    pub fn from_lines(lines: Vec<LedgerLine>) -> Self {
        let total_debit = lines.iter().filter_map(|l| l.debit).sum();
        let total_credit = lines.iter().filter_map(|l| l.credit).sum();
        Ledger {
            lines,
            total_debit,
            total_credit,
        }
    }

    pub fn discrepancy(&self) -> f64 {
        self.total_debit - self.total_credit
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines_for_piece<'a>(&'a self, piece: &'a str) -> impl Iterator<Item = &'a LedgerLine> + 'a {
        self.lines.iter().filter(move |l| l.piece_number == piece)
    }

    /// Write `date,journal_code,account_code,piece_number,label,debit,credit`
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        if self.lines.is_empty() {
            wtr.write_record([
                "date",
                "journal_code",
                "account_code",
                "piece_number",
                "label",
                "debit",
                "credit",
            ])?;
        }
        for line in &self.lines {
            wtr.serialize(line)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// SHA-256 of the CSV rendering; equal fingerprints mean byte-identical output
    pub fn fingerprint(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        let mut hasher = Sha256::new();
        hasher.update(&buf);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(account: &str, side: Side, amount: f64) -> LedgerLine {
        LedgerLine::entry(
            NaiveDate::from_ymd_opt(2024, 3, 15),
            "VT",
            account,
            "F1",
            "Facture F1".to_string(),
            side,
            amount,
        )
    }

    #[test]
    fn test_entry_populates_exactly_one_side() {
        let debit = line("411F", Side::Debit, 120.0);
        let credit = line("701200", Side::Credit, 100.0);

        assert_eq!(debit.debit, Some(120.0));
        assert_eq!(debit.credit, None);
        assert_eq!(credit.credit, Some(100.0));
        assert!(debit.is_well_formed());
        assert!(credit.is_well_formed());
    }

    #[test]
    fn test_negative_amount_flips_side() {
        let flipped = line("411F", Side::Debit, -50.0);

        assert_eq!(flipped.side(), Side::Credit);
        assert_eq!(flipped.credit, Some(50.0));
        assert_eq!(flipped.signed_amount(), -50.0);
    }

    #[test]
    fn test_assemble_totals() {
        let ledger = Ledger::from_lines(vec![
            line("411F", Side::Debit, 120.0),
            line("701200", Side::Credit, 100.0),
            line("445710", Side::Credit, 20.0),
        ]);

        assert_eq!(ledger.total_debit, 120.0);
        assert_eq!(ledger.total_credit, 120.0);
        assert_eq!(ledger.discrepancy(), 0.0);
        assert_eq!(ledger.lines_for_piece("F1").count(), 3);
    }

    #[test]
    fn test_csv_layout() {
        let ledger = Ledger::from_lines(vec![
            line("411F", Side::Debit, 120.0),
            line("701200", Side::Credit, 100.0),
        ]);

        let csv = ledger.to_csv_string().unwrap();
        let mut rows = csv.lines();

        assert_eq!(
            rows.next(),
            Some("date,journal_code,account_code,piece_number,label,debit,credit")
        );
        assert_eq!(rows.next(), Some("2024-03-15,VT,411F,F1,Facture F1,120.00,"));
        assert_eq!(rows.next(), Some("2024-03-15,VT,701200,F1,Facture F1,,100.00"));
    }

    #[test]
    fn test_json_rendering_matches_csv_text() {
        let value = serde_json::to_value(line("411F", Side::Debit, 120.0)).unwrap();

        assert_eq!(value["date"], "2024-03-15");
        assert_eq!(value["debit"], "120.00");
        assert_eq!(value["credit"], "");
    }

    #[test]
    fn test_empty_ledger_still_has_header() {
        let csv = Ledger::default().to_csv_string().unwrap();
        assert!(csv.starts_with("date,journal_code"));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = Ledger::from_lines(vec![line("411F", Side::Debit, 120.0)]);
        let b = Ledger::from_lines(vec![line("411F", Side::Debit, 120.0)]);
        let c = Ledger::from_lines(vec![line("411F", Side::Debit, 120.01)]);

        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_ne!(a.fingerprint().unwrap(), c.fingerprint().unwrap());
        assert_eq!(a.fingerprint().unwrap().len(), 64);
    }
}
