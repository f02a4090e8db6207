//! # demand-fcst
//!
//! Forecast per-item demand from an ERP movement export.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use demand_fcst_cli::{
    load_config, logging, read_batch_from_path, run_guarded, write_report, CsvOptions,
    OutputFormat, Overrides,
};
use demand_fcst_core::{Granularity, ModelKind, Pipeline, PipelineConfig, RunRequest};
use tracing::info;

#[derive(Parser)]
#[command(name = "demand-fcst", version)]
#[command(about = "Per-item demand forecasting from ERP movement exports", long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forecast every item in an export and roll totals up per group
    Forecast {
        /// Input CSV file
        #[arg(short, long)]
        input: PathBuf,

        /// Number of future periods to forecast
        #[arg(short = 'H', long, default_value = "3")]
        horizon: usize,

        /// Only forecast items of this group
        #[arg(short, long)]
        group: Option<String>,

        /// Only forecast this item
        #[arg(short, long)]
        entity: Option<String>,

        /// JSON config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Lines to drop before the header row
        #[arg(long, default_value = "0")]
        skip_lines: usize,

        /// Field delimiter
        #[arg(short, long, default_value = ",")]
        delimiter: char,

        /// Worker threads (0 = all cores)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Minimum distinct periods an item needs
        #[arg(long)]
        min_history: Option<usize>,

        /// Largest horizon accepted
        #[arg(long)]
        max_horizon: Option<usize>,

        /// Keep only rows with this movement type
        #[arg(long)]
        movement_filter: Option<String>,

        /// Period granularity (day, week, month, quarter, year)
        #[arg(long)]
        granularity: Option<Granularity>,

        /// Forecasting model (decomposition, ets)
        #[arg(short, long)]
        model: Option<ModelKind>,

        /// ETS notation such as AAN, used with --model ets
        #[arg(long)]
        ets_spec: Option<String>,

        /// Per-item fit time limit in milliseconds
        #[arg(long)]
        fit_timeout_ms: Option<u64>,
    },

    /// Print the effective configuration as JSON
    Config {
        /// JSON config file to merge over the defaults
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("warning: {:#}", e);
    }
    run_guarded(|| run(cli.command))
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Forecast {
            input,
            horizon,
            group,
            entity,
            config,
            format,
            output,
            skip_lines,
            delimiter,
            workers,
            min_history,
            max_horizon,
            movement_filter,
            granularity,
            model,
            ets_spec,
            fit_timeout_ms,
        } => {
            let overrides = Overrides {
                granularity,
                min_history,
                max_horizon,
                movement_filter,
                workers,
                fit_timeout_ms,
                model,
                ets_spec,
            };
            let config = overrides.apply(load_config(config.as_deref())?);

            if !delimiter.is_ascii() {
                bail!("delimiter must be a single ASCII character, got '{}'", delimiter);
            }
            let options = CsvOptions {
                delimiter: delimiter as u8,
                skip_lines,
            };
            let batch = read_batch_from_path(&input, &options)?;

            let pipeline = Pipeline::new(config)?;
            let request = RunRequest {
                horizon,
                group,
                entity,
            };
            let result = pipeline.run(&batch, &request)?;
            info!(
                rows = result.summary.rows_read,
                forecast = result.summary.entities_forecast,
                insufficient = result.summary.entities_insufficient,
                failed = result.summary.entities_failed,
                "run finished"
            );

            match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("creating output {}", path.display()))?;
                    write_report(&result.report, format, BufWriter::new(file))?;
                    info!(path = %path.display(), "report written");
                }
                None => write_report(&result.report, format, io::stdout().lock())?,
            }
            Ok(())
        }
        Commands::Config { config } => {
            let config: PipelineConfig = load_config(config.as_deref())?;
            config.validate()?;
            let mut out = io::stdout().lock();
            serde_json::to_writer_pretty(&mut out, &config)?;
            writeln!(out)?;
            Ok(())
        }
    }
}
