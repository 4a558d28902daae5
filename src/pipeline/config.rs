use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::common::error::{EtlError, Result};

/// Configuration for a complete pipeline execution.
///
/// The historical cleaning scripts differed only in which derived columns
/// they produced; those variants collapse into this one parameterized
/// configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub description: String,
    /// Which profit formula populates `adjusted_net_profit`.
    pub profit_formula: ProfitFormula,
    /// Whether item-level refunds are aggregated into orders.
    pub refund_rollup: bool,
    /// What to do with rows whose `created_at` cannot be parsed.
    pub timestamp_policy: TimestampPolicy,
}

/// Profit formula variants for the master sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfitFormula {
    /// price - cogs
    Net,
    /// price - cogs - refunds
    AdjustedNet,
}

/// Strategy for handling rows with unparseable timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampPolicy {
    /// Stop the run on the first unparseable timestamp
    Strict,
    /// Drop such rows and surface the count in the stage report
    SkipAndReport,
}

impl PipelineConfig {
    /// Full analytics run: refunds rolled up, profit net of refunds.
    pub fn full_analytics() -> Self {
        Self {
            name: "full_analytics".to_string(),
            description: "Reconcile sessions, orders, refunds and products into the master sheet"
                .to_string(),
            profit_formula: ProfitFormula::AdjustedNet,
            refund_rollup: true,
            timestamp_policy: TimestampPolicy::Strict,
        }
    }

    /// Profit without refund adjustment; the refunds source is not read.
    pub fn net_profit() -> Self {
        Self {
            name: "net_profit".to_string(),
            description: "Reconcile sessions, orders and products; profit ignores refunds"
                .to_string(),
            profit_formula: ProfitFormula::Net,
            refund_rollup: false,
            timestamp_policy: TimestampPolicy::Strict,
        }
    }

    /// Validate the pipeline configuration.
    ///
    /// Refund-adjusted profit without refund rollup would silently equal
    /// plain net profit under a misleading name, so it is rejected.
    pub fn validate(&self) -> Result<()> {
        if self.profit_formula == ProfitFormula::AdjustedNet && !self.refund_rollup {
            return Err(EtlError::Config {
                message: format!(
                    "pipeline '{}' requests refund-adjusted profit but refund rollup is disabled",
                    self.name
                ),
            });
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::full_analytics()
    }
}

/// Input and output locations for one pipeline run, loadable from a JSON
/// job file so runs are reproducible without long command lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub sessions: PathBuf,
    pub orders: PathBuf,
    pub products: PathBuf,
    /// Optional item-level refunds export; absent means no refunds to roll up.
    pub refunds: Option<PathBuf>,
    pub output: PathBuf,
}

impl JobConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| EtlError::Job {
            message: format!("failed to read job file {}: {}", path.display(), e),
        })?;
        let job: JobConfig = serde_json::from_str(&content).map_err(|e| EtlError::Job {
            message: format!("failed to parse job file {}: {}", path.display(), e),
        })?;
        Ok(job)
    }
}
