//! telemetry CLI
//!
//! JSON バッチファイルを統合・異常検知・集計して結果を出力する。

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use telemetry_rs::config::{ConfigLoader, DetectionConfig, PipelineConfig};
use telemetry_rs::logging::init_logging;
use telemetry_rs::pipeline::Pipeline;
use telemetry_rs::simulator::{TelemetrySimulator, DEFAULT_DROPOUT_RATE};

#[derive(Parser)]
#[command(name = "telemetry")]
#[command(version, about = "Industrial telemetry consolidation and anomaly detection", long_about = None)]
struct Cli {
    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "TELEMETRY_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consolidate, score and summarize JSON batch files
    Run {
        /// Input file holding one JSON array of readings (repeat for multiple batches)
        #[arg(short, long = "input", required = true)]
        inputs: Vec<PathBuf>,

        /// Configuration file (defaults to ./telemetry.toml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Sensor to run anomaly detection on
        #[arg(short, long)]
        sensor: Option<String>,

        /// Detection method (zscore, iqr, rolling)
        #[arg(short, long)]
        method: Option<String>,

        /// Detection threshold
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Field to group the summary by
        #[arg(short, long)]
        group_by: Option<String>,

        /// Time window for bucketed summaries (e.g. 5m, 1h)
        #[arg(short, long)]
        window: Option<String>,

        /// Keep duplicate records
        #[arg(long)]
        no_validate: bool,
    },

    /// Print simulated batches as JSON
    Simulate {
        /// Number of acquisition attempts
        #[arg(short, long, default_value = "5")]
        batches: usize,

        /// Seconds covered by each batch
        #[arg(short, long, default_value = "30")]
        duration: u32,

        /// Seconds between readings
        #[arg(short, long, default_value = "1.0")]
        interval: f64,

        /// Connection dropout probability
        #[arg(long, default_value_t = DEFAULT_DROPOUT_RATE)]
        dropout_rate: f64,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Print a sample configuration file
    SampleConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            inputs,
            config,
            sensor,
            method,
            threshold,
            group_by,
            window,
            no_validate,
        } => {
            let mut config = ConfigLoader::new()
                .load_from_file(config)
                .load_from_env()
                .build()?;

            if let Some(level) = cli.log_level {
                config.logging.level = level;
            }
            let _guard = init_logging(&config.logging)?;

            apply_overrides(&mut config, sensor, method, threshold, group_by, window, no_validate)?;

            let batches = inputs
                .iter()
                .map(|path| read_batch(path))
                .collect::<Result<Vec<_>>>()?;

            let report = Pipeline::from_config(&config)?.run_records(&batches)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Simulate {
            batches,
            duration,
            interval,
            dropout_rate,
            seed,
        } => {
            let mut logging = PipelineConfig::default().logging;
            if let Some(level) = cli.log_level {
                logging.level = level;
            }
            let _guard = init_logging(&logging)?;

            let batches = TelemetrySimulator::new(seed)
                .with_dropout_rate(dropout_rate)
                .batches(batches, duration, interval);
            println!("{}", serde_json::to_string_pretty(&batches)?);
        }
        Commands::SampleConfig => {
            print!("{}", PipelineConfig::sample_toml()?);
        }
    }

    Ok(())
}

/// コマンドライン引数で設定を上書き
fn apply_overrides(
    config: &mut PipelineConfig,
    sensor: Option<String>,
    method: Option<String>,
    threshold: Option<f64>,
    group_by: Option<String>,
    window: Option<String>,
    no_validate: bool,
) -> Result<()> {
    if let Some(sensor) = sensor {
        let detection = config
            .detection
            .get_or_insert_with(|| DetectionConfig::for_sensor(sensor.clone()));
        detection.sensor_id = sensor;
    }

    if method.is_some() || threshold.is_some() {
        let detection = config
            .detection
            .as_mut()
            .context("--method/--threshold require --sensor or a [detection] section")?;
        if let Some(method) = method {
            detection.method = method;
        }
        detection.threshold = threshold.unwrap_or(detection.threshold);
    }

    if let Some(group_by) = group_by {
        config.summary.group_by = group_by;
    }
    if window.is_some() {
        config.summary.time_window = window;
    }
    if no_validate {
        config.ingest.validate = false;
    }

    config.validate().context("Invalid command line options")?;
    Ok(())
}

fn read_batch(path: &Path) -> Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {} as JSON", path.display()))
}
