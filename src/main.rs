use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, info, warn};

use trendrs::analysis::{RecordSetVersion, WorkoutAnalyzer};
use trendrs::config::AppConfig;
use trendrs::error::{describe_failure, ErrorSeverity};
use trendrs::logging::init_logging;
use trendrs::models::{Dimension, Units, WorkoutRecord};
use trendrs::prediction::{validate_weeks_ahead, PredictionEngine};
use trendrs::report::{self, AnalysisExport, ExportFormat};
use trendrs::source::source_for_path;

/// TrendRS - Workout Grouping and Trend Prediction CLI
///
/// Groups workouts by distance, pace, duration or elevation, ranks and scores every
/// group, and projects where each group's pace is heading.
#[derive(Parser)]
#[command(name = "trendrs")]
#[command(author = "TrendRS Contributors")]
#[command(version)]
#[command(about = "Workout Grouping and Trend Prediction CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Unit system (metric, imperial); overrides the config file
    #[arg(short, long, global = true)]
    units: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Group workouts along one dimension
    Groups {
        /// Input file path (CSV, JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Dimension to group by (distance, pace, duration, elevation)
        #[arg(short, long)]
        dimension: Option<String>,

        /// Grouping tolerance in the dimension's unit
        #[arg(short, long)]
        tolerance: Option<Decimal>,

        /// Anchor spacing in the dimension's unit
        #[arg(short, long)]
        bucket_size: Option<Decimal>,

        /// Floor workouts into fixed unit buckets instead of tolerance grouping
        #[arg(long)]
        unit_buckets: bool,
    },

    /// Predict future pace for every group
    Predict {
        /// Input file path (CSV, JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Dimension to group by (distance, pace, duration, elevation)
        #[arg(short, long)]
        dimension: Option<String>,

        /// Prediction horizon in weeks
        #[arg(short, long)]
        weeks: Option<u32>,
    },

    /// Aggregate workouts by day of the week
    Weekly {
        /// Input file path (CSV, JSON)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Export groups, predictions and weekday statistics
    Export {
        /// Input file path (CSV, JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Export format (json, csv)
        #[arg(short = 'F', long, default_value = "json")]
        format: String,

        /// Dimension to group by (distance, pace, duration, elevation)
        #[arg(short, long)]
        dimension: Option<String>,
    },

    /// Inspect application settings
    Config {
        /// List all configuration options
        #[arg(short, long)]
        list: bool,

        /// Get a configuration value by dotted key
        #[arg(short, long)]
        get: Option<String>,

        /// Write the current configuration to the default location
        #[arg(long)]
        init: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let (severity, message) = describe_failure(&err);
            let detail = format!("{:#}", err);
            match severity {
                ErrorSeverity::Warning => warn!(error = %detail, "Command failed"),
                ErrorSeverity::Error => error!(error = %detail, "Command failed"),
            }
            eprintln!("{} {}", "Error:".red().bold(), message);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(units) = &cli.units {
        config.settings.units = units.parse::<Units>().map_err(anyhow::Error::msg)?;
    }

    init_logging(&config.logging.clone().with_verbosity(cli.verbose))?;
    debug!(units = ?config.settings.units, "Configuration loaded");

    let analyzer = WorkoutAnalyzer::new(
        config.settings.units,
        PredictionEngine::new(config.prediction.clone()),
    );

    match cli.command {
        Commands::Groups {
            file,
            dimension,
            tolerance,
            bucket_size,
            unit_buckets,
        } => {
            let dimension = resolve_dimension(&config, dimension.as_deref())?;
            let records = load_records(&file)?;

            let mut options = config.grouping_options(dimension);
            if let Some(tolerance) = tolerance {
                options = options.with_tolerance(tolerance);
            }
            if let Some(bucket_size) = bucket_size {
                options = options.with_bucket_size(bucket_size);
            }
            if unit_buckets {
                options.enabled = false;
            }
            options.validate()?;

            let analysis =
                analyzer.analyze(&records, dimension, &options, config.settings.weeks_ahead);
            print!("{}", report::render_groups(&analysis));
        }

        Commands::Predict {
            file,
            dimension,
            weeks,
        } => {
            let dimension = resolve_dimension(&config, dimension.as_deref())?;
            let weeks = validate_weeks_ahead(weeks.unwrap_or(config.settings.weeks_ahead))?;
            let records = load_records(&file)?;

            let analysis = analyzer.analyze(
                &records,
                dimension,
                &config.grouping_options(dimension),
                weeks,
            );
            print!("{}", report::render_predictions(&analysis));
        }

        Commands::Weekly { file } => {
            let records = load_records(&file)?;
            let stats = analyzer.weekly(&records);
            print!("{}", report::render_weekly(&stats));
        }

        Commands::Export {
            file,
            output,
            format,
            dimension,
        } => {
            let format = format.parse::<ExportFormat>().map_err(anyhow::Error::msg)?;
            let dimension = resolve_dimension(&config, dimension.as_deref())?;
            let records = load_records(&file)?;

            let analysis = analyzer.analyze(
                &records,
                dimension,
                &config.grouping_options(dimension),
                config.settings.weeks_ahead,
            );

            match format {
                ExportFormat::Json => {
                    let version = RecordSetVersion::of(&records);
                    let weekly = analyzer.weekly(&records);
                    report::export_json(
                        &AnalysisExport {
                            version: &version,
                            analysis: &analysis,
                            weekly: &weekly,
                        },
                        &output,
                    )?;
                }
                ExportFormat::Csv => report::export_csv(&analysis, &output)?,
            }

            println!(
                "{}",
                format!("✓ Exported {} groups to {}", analysis.outcome.len(), output.display())
                    .green()
            );
        }

        Commands::Config { list, get, init } => {
            if init {
                let path = AppConfig::default_config_path();
                config.save_to_file(&path)?;
                println!(
                    "{}",
                    format!("✓ Configuration written to {}", path.display()).green()
                );
            } else if let Some(key) = get {
                let value = config
                    .get_value(&key)
                    .with_context(|| format!("Unknown configuration key: {}", key))?;
                println!("{}", value);
            } else if list {
                println!("{}", "Current configuration:".white().bold());
                print!("{}", config.to_toml()?);
            } else {
                println!(
                    "Config file: {}",
                    cli.config
                        .unwrap_or_else(AppConfig::default_config_path)
                        .display()
                );
            }
        }
    }

    Ok(())
}

fn resolve_dimension(config: &AppConfig, dimension: Option<&str>) -> Result<Dimension> {
    match dimension {
        Some(name) => Ok(name.parse::<Dimension>()?),
        None => Ok(config.settings.default_dimension),
    }
}

fn load_records(path: &Path) -> Result<Vec<WorkoutRecord>> {
    let source = source_for_path(path)?;
    let records = source
        .fetch_records()
        .with_context(|| format!("Failed to load workouts from {}", path.display()))?;
    info!(source = source.name(), count = records.len(), "Workouts loaded");
    Ok(records)
}
