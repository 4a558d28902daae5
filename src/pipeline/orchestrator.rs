use std::fmt;

use anyhow::{Context, Result};
use tracing::info;

use crate::domain::ReconciledRecord;
use crate::pipeline::config::{JobConfig, PipelineConfig};
use crate::pipeline::enrich::enrich_orders;
use crate::pipeline::export::write_master_sheet;
use crate::pipeline::ingestion::load_inputs;
use crate::pipeline::normalize::normalize_sessions;
use crate::pipeline::reconcile::reconcile;

/// Outcome of one stage, for the end-of-run summary.
#[derive(Debug, Clone)]
pub struct StageSummary {
    pub stage: &'static str,
    pub processed: usize,
    pub skipped: usize,
    pub message: String,
}

impl StageSummary {
    fn new(stage: &'static str, processed: usize, skipped: usize, message: String) -> Self {
        Self {
            stage,
            processed,
            skipped,
            message,
        }
    }
}

/// Aggregated result of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub pipeline: String,
    pub stages: Vec<StageSummary>,
    pub rows_written: usize,
    pub conversions: usize,
    pub total_refunds_usd: f64,
    pub total_adjusted_net_profit: f64,
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pipeline '{}' summary:", self.pipeline)?;
        for stage in &self.stages {
            writeln!(f, "  {:<9} {}", stage.stage, stage.message)?;
        }
        writeln!(f, "  rows written: {}", self.rows_written)?;
        writeln!(f, "  conversions: {}", self.conversions)?;
        writeln!(f, "  total refunds: ${:.2}", self.total_refunds_usd)?;
        write!(
            f,
            "  total adjusted net profit: ${:.2}",
            self.total_adjusted_net_profit
        )
    }
}

/// Run load, normalize, enrich and reconcile, returning the master-sheet
/// rows and the per-stage summary (export not included).
fn build_master_sheet(
    job: &JobConfig,
    config: &PipelineConfig,
) -> Result<(Vec<ReconciledRecord>, PipelineReport)> {
    config.validate()?;

    let tables = load_inputs(job, config.refund_rollup).context("load stage failed")?;
    let load_summary = StageSummary::new(
        "load",
        tables.report.sessions_read + tables.report.orders_read + tables.report.products_read,
        tables.report.orders_skipped,
        format!(
            "{} sessions, {} orders ({} malformed rows skipped), {} products, {} refund lines",
            tables.report.sessions_read,
            tables.report.orders_read,
            tables.report.orders_skipped,
            tables.report.products_read,
            tables.report.refund_lines_read
        ),
    );

    let normalized = normalize_sessions(tables.sessions, config.timestamp_policy)
        .context("normalize stage failed")?;
    let normalize_summary = StageSummary::new(
        "normalize",
        normalized.sessions.len(),
        normalized.report.rows_skipped,
        format!(
            "{} sessions ({} duplicates removed, {} filled organic, {} filled direct, {} campaigns filled, {} skipped)",
            normalized.sessions.len(),
            normalized.report.duplicates_removed,
            normalized.report.organic_filled,
            normalized.report.direct_filled,
            normalized.report.campaigns_filled,
            normalized.report.rows_skipped
        ),
    );

    let enriched = enrich_orders(
        tables.orders,
        &normalized.sessions,
        &tables.refund_lines,
        config.timestamp_policy,
    )
    .context("enrich stage failed")?;
    let enrich_summary = StageSummary::new(
        "enrich",
        enriched.orders.len(),
        enriched.report.rows_skipped + enriched.report.refund_lines_skipped,
        format!(
            "{} orders ({} users backfilled, {} unresolved, {} prices imputed, {} cogs imputed, {} refunded, {} skipped)",
            enriched.orders.len(),
            enriched.report.users_backfilled,
            enriched.report.users_unresolved,
            enriched.report.prices_imputed,
            enriched.report.cogs_imputed,
            enriched.report.refunded_orders,
            enriched.report.rows_skipped
        ),
    );

    let reconciled = reconcile(
        &normalized.sessions,
        enriched.orders,
        &tables.products,
        config.profit_formula,
    )
    .context("reconcile stage failed")?;
    let reconcile_summary = StageSummary::new(
        "reconcile",
        reconciled.report.rows_out,
        0,
        format!(
            "{} rows ({} conversions)",
            reconciled.report.rows_out, reconciled.report.conversions
        ),
    );

    let total_refunds_usd = reconciled
        .records
        .iter()
        .map(|r| r.refund_amount_usd)
        .sum();
    let total_adjusted_net_profit = reconciled
        .records
        .iter()
        .map(|r| r.adjusted_net_profit)
        .sum();

    let report = PipelineReport {
        pipeline: config.name.clone(),
        stages: vec![
            load_summary,
            normalize_summary,
            enrich_summary,
            reconcile_summary,
        ],
        rows_written: 0,
        conversions: reconciled.report.conversions,
        total_refunds_usd,
        total_adjusted_net_profit,
    };

    Ok((reconciled.records, report))
}

/// Run the complete pipeline and write the master sheet.
pub fn run_pipeline(job: &JobConfig, config: &PipelineConfig) -> Result<PipelineReport> {
    info!("🔄 running pipeline '{}'", config.name);

    let (records, mut report) = build_master_sheet(job, config)?;
    report.rows_written =
        write_master_sheet(&job.output, &records).context("export stage failed")?;
    report.stages.push(StageSummary::new(
        "export",
        report.rows_written,
        0,
        format!("{} rows -> {}", report.rows_written, job.output.display()),
    ));

    info!(
        "✅ pipeline '{}' completed: {} rows written to {}",
        config.name,
        report.rows_written,
        job.output.display()
    );
    Ok(report)
}

/// Run every stage except export, for validating inputs without touching
/// the output file.
pub fn check_inputs(job: &JobConfig, config: &PipelineConfig) -> Result<PipelineReport> {
    info!("🔎 checking inputs for pipeline '{}'", config.name);
    let (_, report) = build_master_sheet(job, config)?;
    info!("✅ check completed for pipeline '{}'", config.name);
    Ok(report)
}
