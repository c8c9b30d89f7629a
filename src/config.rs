// ⚙️ Pipeline Configuration
// Everything the run needs, loaded once and validated at ingestion.

use crate::error::JournalError;
use crate::parser::AmountRegime;
use crate::returns::ReturnsConfig;
use crate::rules::AccountPlan;
use crate::schema::ColumnSchema;
use crate::treasury::TreasuryConfig;
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub columns: ColumnSchema,
    pub accounts: AccountPlan,

    /// Forces the amount regime; detected from the columns when absent
    pub amount_regime: Option<AmountRegime>,

    /// chrono formats tried in order before datetime and Excel serial fallbacks
    pub date_formats: Vec<String>,

    /// Balance and header-total tolerance
    pub tolerance: f64,

    /// Multi-rate VAT lines at or below this are not emitted
    pub negligible_vat: f64,

    pub returns: ReturnsConfig,
    pub treasury: TreasuryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            columns: ColumnSchema::default(),
            accounts: AccountPlan::default(),
            amount_regime: None,
            date_formats: ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d", "%d/%m/%y"]
                .iter()
                .map(|f| f.to_string())
                .collect(),
            tolerance: 0.01,
            negligible_vat: 0.01,
            returns: ReturnsConfig::default(),
            treasury: TreasuryConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file. Missing keys fall back to defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: PipelineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        self.accounts.validate().map_err(JournalError::Config)?;

        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(JournalError::Config(format!("tolerance must be >= 0, got {}", self.tolerance)));
        }
        if !self.negligible_vat.is_finite() || self.negligible_vat < 0.0 {
            return Err(JournalError::Config(format!(
                "negligible_vat must be >= 0, got {}",
                self.negligible_vat
            )));
        }
        if self.date_formats.is_empty() {
            return Err(JournalError::Config("date_formats is empty".to_string()));
        }
        if !self.treasury.growth_rate.is_finite() || self.treasury.growth_rate <= -1.0 {
            return Err(JournalError::Config(format!(
                "treasury growth_rate must be > -1, got {}",
                self.treasury.growth_rate
            )));
        }

        Ok(())
    }
}
