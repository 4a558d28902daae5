use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use bearcart::observability::logging::init_logging;
use bearcart::pipeline::{
    check_inputs, run_pipeline, JobConfig, PipelineConfig, ProfitFormula, TimestampPolicy,
};

#[derive(Parser)]
#[command(name = "bearcart")]
#[command(about = "Session/order reconciliation pipeline for BearCart analytics")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the complete pipeline and write the master sheet
    Run {
        #[command(flatten)]
        inputs: InputArgs,
        /// Profit formula for the adjusted_net_profit column
        #[arg(long, value_enum, default_value = "adjusted")]
        profit: ProfitArg,
        /// Drop rows with unparseable timestamps instead of failing
        #[arg(long)]
        skip_bad_timestamps: bool,
    },
    /// Load and clean the inputs, print the summary, write nothing
    Check {
        #[command(flatten)]
        inputs: InputArgs,
        /// Drop rows with unparseable timestamps instead of failing
        #[arg(long)]
        skip_bad_timestamps: bool,
    },
}

#[derive(clap::Args)]
struct InputArgs {
    /// JSON job file naming the inputs and output; overrides the path flags
    #[arg(long)]
    job: Option<PathBuf>,
    /// Sessions export
    #[arg(long)]
    sessions: Option<PathBuf>,
    /// Orders export
    #[arg(long)]
    orders: Option<PathBuf>,
    /// Product catalog export
    #[arg(long)]
    products: Option<PathBuf>,
    /// Item-level refunds export (optional)
    #[arg(long)]
    refunds: Option<PathBuf>,
    /// Output path for the master sheet
    #[arg(long, default_value = "master_sheet.csv")]
    output: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProfitArg {
    /// price - cogs
    Net,
    /// price - cogs - refunds
    Adjusted,
}

impl InputArgs {
    fn into_job(self) -> anyhow::Result<JobConfig> {
        if let Some(path) = self.job {
            return Ok(JobConfig::from_file(path)?);
        }
        let require = |name: &str, path: Option<PathBuf>| {
            path.ok_or_else(|| anyhow::anyhow!("--{name} is required (or pass --job)"))
        };
        Ok(JobConfig {
            sessions: require("sessions", self.sessions)?,
            orders: require("orders", self.orders)?,
            products: require("products", self.products)?,
            refunds: self.refunds,
            output: self.output,
        })
    }
}

fn pipeline_config(profit: ProfitArg, job: &JobConfig, skip_bad_timestamps: bool) -> PipelineConfig {
    let mut config = match profit {
        ProfitArg::Adjusted => PipelineConfig::full_analytics(),
        ProfitArg::Net => PipelineConfig::net_profit(),
    };
    // Refund rollup needs a refunds source to read
    if job.refunds.is_none() {
        config.refund_rollup = false;
        if config.profit_formula == ProfitFormula::AdjustedNet {
            config.profit_formula = ProfitFormula::Net;
            info!("no refunds source configured; profit falls back to price - cogs");
        }
    }
    if skip_bad_timestamps {
        config.timestamp_policy = TimestampPolicy::SkipAndReport;
    }
    config
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging();

    match cli.command {
        Commands::Run {
            inputs,
            profit,
            skip_bad_timestamps,
        } => {
            let job = inputs.into_job()?;
            let config = pipeline_config(profit, &job, skip_bad_timestamps);
            let report = run_pipeline(&job, &config)?;
            println!("{report}");
        }
        Commands::Check {
            inputs,
            skip_bad_timestamps,
        } => {
            let job = inputs.into_job()?;
            let config = pipeline_config(ProfitArg::Adjusted, &job, skip_bad_timestamps);
            let report = check_inputs(&job, &config)?;
            println!("{report}");
        }
    }

    Ok(())
}
