// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use histeq::BackendPreference;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "histeq")]
#[command(about = "Histogram equalization for 8-bit greyscale and RGB images")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Equalize an image file
    Equalize {
        /// Input image (PGM, PPM, PNG, ...; 8-bit greyscale or RGB)
        input: PathBuf,

        /// Output file path (default: <input stem>_equalized.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Compute backend: auto, gpu or cpu (default: from config)
        #[arg(short, long)]
        backend: Option<BackendPreference>,

        /// GPU adapter index as listed by `histeq devices` (default: from config)
        #[arg(short, long, value_name = "INDEX")]
        device: Option<usize>,

        /// Process color channels one after another
        #[arg(long)]
        sequential: bool,

        /// Print per-stage timings
        #[arg(long)]
        timings: bool,

        /// Print the histogram bins of every channel
        #[arg(long)]
        histogram: bool,
    },

    /// List available GPU adapters
    Devices,

    /// Show the effective configuration
    Config {
        /// Write the current configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=histeq=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Equalize {
            input,
            output,
            backend,
            device,
            sequential,
            timings,
            histogram,
        } => cli::equalize_image(cli::EqualizeArgs {
            input,
            output,
            backend,
            device,
            sequential,
            timings,
            histogram,
        }),
        Commands::Devices => cli::list_devices(),
        Commands::Config { init } => cli::show_config(init),
    }
}
