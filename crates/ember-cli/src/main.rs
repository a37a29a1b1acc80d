//! Ember command-line tool
//!
//! Assembles `.easm` programs and runs them on a bounded heap, or just
//! checks and disassembles them.

mod commands;
mod config;
mod output;

use clap::{Parser, Subcommand};
use output::{resolve_color_choice, StyledOutput};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "ember")]
#[command(about = "Ember bounded-heap VM", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log collector and interpreter activity (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// When to color diagnostics: auto, always, never
    #[arg(long, global = true, value_name = "WHEN")]
    color: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble and run a program
    Run {
        /// Input file (.easm)
        file: PathBuf,
        /// Heap ceiling in bytes, with optional K or M suffix
        #[arg(long, value_name = "SIZE")]
        heap_size: Option<String>,
        /// Collection strategy: compact or sweep
        #[arg(long)]
        strategy: Option<String>,
        /// TOML file with VM options
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Print collector and heap statistics after the run
        #[arg(long)]
        stats: bool,
    },

    /// Assemble and verify without running
    Check {
        /// Input file (.easm)
        file: PathBuf,
    },

    /// Print the assembled bytecode
    Disasm {
        /// Input file (.easm)
        file: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut out = StyledOutput::new(resolve_color_choice(cli.color.as_deref()));

    let result = match cli.command {
        Commands::Run {
            file,
            heap_size,
            strategy,
            config,
            stats,
        } => commands::run::execute(
            commands::run::RunArgs {
                file,
                heap_size,
                strategy,
                config,
                stats,
            },
            &mut out,
        ),
        Commands::Check { file } => commands::check::execute(&file, &mut out),
        Commands::Disasm { file } => commands::disasm::execute(&file),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            out.error(&format!("{:#}", err));
            ExitCode::FAILURE
        }
    }
}
