// 🚨 Error taxonomy
// Only batch-fatal failures live here. Per-cell parse failures and
// per-invoice problems are diagnostics (see data_quality.rs), never errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    /// Required input columns are absent. Fatal for the whole batch.
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Input is not UTF-8, typically a Windows-1252 spreadsheet export
    #[error("{path} is not valid UTF-8 (invalid byte at offset {offset}); re-export it as CSV UTF-8, Windows-1252/Latin-1 files are not supported")]
    Encoding { path: String, offset: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl JournalError {
    /// Names of the missing columns, if this is a `MissingColumns` error
    pub fn missing_columns(&self) -> Option<&[String]> {
        match self {
            JournalError::MissingColumns(cols) => Some(cols),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, JournalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message_lists_names() {
        let err = JournalError::MissingColumns(vec!["invoice_id".to_string(), "vat_rate".to_string()]);

        assert_eq!(err.to_string(), "Missing required columns: invoice_id, vat_rate");
        assert_eq!(err.missing_columns().map(|c| c.len()), Some(2));
    }

    #[test]
    fn test_config_error_has_no_missing_columns() {
        let err = JournalError::Config("tolerance must be positive".to_string());
        assert!(err.missing_columns().is_none());
    }
}
