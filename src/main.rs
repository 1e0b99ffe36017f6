use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use compass_engine::commands::{import_bars, optimize, run_daily};
use log::info;
use std::path::PathBuf;

const DEFAULT_BAR_DATA_FILE: &str = "data/bars.bin";

#[derive(Parser)]
#[command(name = "compass-engine")]
#[command(about = "Daily trading signal analysis engine for commodity dashboards")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a bar snapshot from a daily-bar CSV export
    Import {
        /// Commodity symbol the bars belong to
        #[arg(long, default_value = "CC")]
        commodity: String,
        /// Source CSV file
        #[arg(long = "csv", value_name = "PATH")]
        csv: PathBuf,
        /// Destination snapshot file
        #[arg(short, long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Run the daily pipeline over a date range and emit dashboard reports
    Run {
        /// Path to the bar snapshot file
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: Option<PathBuf>,
        /// Engine configuration (JSON); built-in defaults when omitted
        #[arg(long = "config", value_name = "PATH")]
        config: Option<PathBuf>,
        /// Externally-supplied macro adjustment series (date,score CSV)
        #[arg(long = "macro-file", value_name = "PATH")]
        macro_file: Option<PathBuf>,
        /// First session to run (defaults to the first stored bar)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last session to run (defaults to the last stored bar)
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Write the JSON reports here instead of stdout
        #[arg(short, long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Search the tunable parameters and promote improving challengers
    Optimize {
        /// Path to the bar snapshot file
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: Option<PathBuf>,
        /// Engine configuration (JSON); built-in defaults when omitted
        #[arg(long = "config", value_name = "PATH")]
        config: Option<PathBuf>,
        /// Externally-supplied macro adjustment series (date,score CSV)
        #[arg(long = "macro-file", value_name = "PATH")]
        macro_file: Option<PathBuf>,
        /// Write the updated configuration here
        #[arg(long = "output-config", value_name = "PATH")]
        output_config: Option<PathBuf>,
        /// Write the promotion history here
        #[arg(long = "history", value_name = "PATH")]
        history: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    info!("Starting compass engine. Signals are decision support, not financial advice.");

    match cli.command {
        Commands::Import {
            commodity,
            csv,
            output,
        } => {
            let output = resolve_data_path(output);
            import_bars::run(&commodity, &csv, &output)
        }
        Commands::Run {
            data_file,
            config,
            macro_file,
            from,
            to,
            output,
        } => {
            let data_file = resolve_data_path(data_file);
            run_daily::run(
                &data_file,
                config.as_deref(),
                macro_file.as_deref(),
                from,
                to,
                output.as_deref(),
            )
        }
        Commands::Optimize {
            data_file,
            config,
            macro_file,
            output_config,
            history,
        } => {
            let data_file = resolve_data_path(data_file);
            optimize::run(
                &data_file,
                config.as_deref(),
                macro_file.as_deref(),
                output_config.as_deref(),
                history.as_deref(),
            )
        }
    }
}

fn resolve_data_path(cli_value: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli_value {
        return path;
    }

    PathBuf::from(DEFAULT_BAR_DATA_FILE)
}
