pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use storelens_core::config::ConfigOverrides;

use crate::commands::run::RunArgs;

#[derive(Debug, Parser)]
#[command(
    name = "storelens",
    about = "Retail RFM analytics batch",
    long_about = "Score customers, predict regional profitability, and cluster regions from an order snapshot, writing dashboard-ready artifact tables.",
    after_help = "Examples:\n  storelens run --input dados/ss.csv --output-dir dados\n  storelens doctor --json\n  storelens inspect"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a storelens.toml config file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run every analytics engine and write the artifact tables")]
    Run {
        #[arg(long, help = "Order snapshot CSV to analyze")]
        input: Option<PathBuf>,
        #[arg(long, help = "Directory the artifact tables are written to")]
        output_dir: Option<PathBuf>,
        #[arg(long, help = "Number of region clusters")]
        clusters: Option<usize>,
        #[arg(long, help = "Neighbors queried per region, the region itself included")]
        neighbors: Option<usize>,
        #[arg(long, help = "Seed for clustering and the holdout split")]
        seed: Option<u64>,
        #[arg(long, help = "Score the classifier on a held-out split of regions")]
        holdout: bool,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Check config, input snapshot, output directory, and last-run completeness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Show the last run manifest and verify artifact checksums")]
    Inspect {
        #[arg(long, help = "Directory holding the artifact tables")]
        output_dir: Option<PathBuf>,
        #[arg(long, help = "Emit the full manifest as JSON")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run { input, output_dir, clusters, neighbors, seed, holdout } => {
            commands::run::run(RunArgs {
                config_path: cli.config,
                overrides: ConfigOverrides {
                    input_path: input,
                    output_dir,
                    clusters,
                    neighbors,
                    seed,
                    evaluate_on_holdout: holdout.then_some(true),
                    ..ConfigOverrides::default()
                },
            })
        }
        Command::Config => commands::config::run(cli.config),
        Command::Doctor { json } => commands::doctor::run(json, cli.config),
        Command::Inspect { output_dir, json } => {
            commands::inspect::run(cli.config, output_dir, json)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
