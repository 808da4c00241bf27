//! crashfold CLI
//!
//! Imports crash report archives, writes aggregate reports and
//! flamegraph fold files.

use anyhow::Result;
use clap::{Parser, Subcommand};
use crashfold::commands::{display_version, execute_import, normalize_stack_file, ImportArgs};
use env_logger::Env;
use std::path::PathBuf;

/// crashfold - crash report aggregation and flamegraph folding
#[derive(Parser, Debug)]
#[command(name = "crashfold")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Import archives, write reports and flamegraph folds
    Import {
        /// Directory containing exception_* archives
        #[arg(short, long, env = "CRASHFOLD_INPUT_DIR")]
        input_dir: PathBuf,

        /// Output directory for reports, folds and images
        #[arg(short, long, env = "CRASHFOLD_OUTPUT_DIR")]
        output_dir: PathBuf,

        /// Path to a TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Overwrite existing per-archive reports
        #[arg(short, long)]
        force: bool,

        /// Write fold files without rendering them
        #[arg(long)]
        no_render: bool,
    },

    /// Print the folded frame chain of a stack trace file
    Normalize {
        /// Path to a file holding one stack trace
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    // Execute command
    match cli.command {
        Commands::Import {
            input_dir,
            output_dir,
            config,
            force,
            no_render,
        } => {
            let args = ImportArgs {
                input_dir,
                output_dir,
                config_path: config,
                force,
                no_render,
            };

            let summary = execute_import(args)?;
            println!("{}", summary.summary());
        }

        Commands::Normalize { file } => {
            println!("{}", normalize_stack_file(&file)?);
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
