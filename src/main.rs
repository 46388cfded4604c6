use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use weight_forecast::config::ForecastConfig;
use weight_forecast::pipeline;

/// Train the weight forecaster on a directory of subject CSVs and print a
/// 90-day weight forecast.
#[derive(Parser, Debug)]
#[command(name = "weight-forecast", version, about)]
struct Cli {
    /// TOML file overriding the default settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of per-subject CSV files
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Maximum number of training epochs
    #[arg(short, long)]
    epochs: Option<usize>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => match ForecastConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("failed to load {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => ForecastConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.data.dir = dir;
    }
    if let Some(epochs) = cli.epochs {
        config.training.epochs = epochs;
    }

    match pipeline::run(&config) {
        Ok(report) => {
            println!("Future weight predictions:");
            for line in report.prediction_lines() {
                println!("{}", line);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
