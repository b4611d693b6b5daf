//! splat: Command-line interface for cleaning Gaussian Splatting point clouds.
//!
//! This tool exposes the splat-clean pipeline from the command line,
//! suitable for batch scripts and asset pipelines.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=splat_clean=info` - One line per pipeline step
//! - `RUST_LOG=splat_clean=debug` - Filter details and cloud state
//! - `RUST_LOG=splat_clean::timing=debug` - Performance timing
//! - `RUST_LOG=debug` - All debug output
//!
//! # Example
//!
//! ```bash
//! # Statistical outliers plus largest cluster, attributes preserved
//! splat clean scene.ply scene_clean.ply --stat-outlier --dbscan --eps 0.05
//!
//! # Ask for parameters first
//! splat suggest scene.ply --seed 7
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;

use commands::{clean, info, presets, suggest};

/// splat - Clean 3D Gaussian Splatting point clouds.
///
/// Removes outliers, keeps the dominant cluster and crops, while keeping
/// every surviving point's original attributes.
#[derive(Parser)]
#[command(name = "splat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean a PLY point cloud and save the surviving rows
    Clean(clean::CleanArgs),

    /// Suggest radius, eps and min-points from point spacing
    Suggest {
        /// Input PLY file
        input: PathBuf,

        /// Maximum number of sampled points
        #[arg(long, default_value = "20000")]
        sample_size: usize,

        /// Neighbours per sampled point
        #[arg(long, default_value = "8")]
        k: usize,

        /// Seed for reproducible sampling
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Display point count, bounds and properties of a PLY file
    Info {
        /// Input PLY file
        input: PathBuf,
    },

    /// List saved presets
    Presets {
        /// Preset store
        #[arg(long, default_value = presets::DEFAULT_PRESETS_FILE)]
        presets_file: PathBuf,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Clean(_) => "clean",
            Self::Suggest { .. } => "suggest",
            Self::Info { .. } => "info",
            Self::Presets { .. } => "presets",
        }
    }
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over -v flags
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "splat=info,splat_clean=info",
            2 => "splat=debug,splat_clean=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    #[cfg(debug_assertions)]
    miette::set_panic_hook();

    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);
    tracing::debug!(command = cli.command.name(), "Dispatching command");

    let result = match &cli.command {
        Commands::Clean(args) => clean::run(args, &cli),
        Commands::Suggest {
            input,
            sample_size,
            k,
            seed,
        } => suggest::run(input, *sample_size, *k, *seed, &cli),
        Commands::Info { input } => info::run(input, &cli),
        Commands::Presets { presets_file } => presets::run(presets_file, &cli),
    };

    if let Err(e) = &result {
        tracing::debug!(command = cli.command.name(), error = %e, "Command failed");
        if !cli.quiet {
            if let Some(clean_err) = e.downcast_ref::<splat_clean::CleanError>() {
                eprintln!("{}: {}", "Error".red().bold(), clean_err);
                eprintln!("  {}: {}", "Code".cyan(), clean_err.code());
                eprintln!(
                    "  {}: {}",
                    "Suggestion".green(),
                    clean_err.recovery_suggestion()
                );
            } else {
                eprintln!("{}: {}", "Error".red().bold(), e);
                for cause in e.chain().skip(1) {
                    eprintln!("  {}: {}", "Caused by".yellow(), cause);
                }
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
