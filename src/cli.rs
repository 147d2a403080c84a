//! The funit command-line interface.
//!
//! Loads configuration, dispatches to the subcommand and turns any failure
//! into a diagnostic and exit status 1.

use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand};

use crate::codegen;
use crate::config::Config;
use crate::errors::{print_error, ErrorKind, FunitError};
use crate::pipeline::Pipeline;
use crate::syntax;

pub mod output;

// ============================================================================
// CLI ARGUMENTS - Command-line argument definitions
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "funit",
    version,
    about = "Compiles Fortran unit-test files into test programs, then builds and runs them."
)]
pub struct FunitArgs {
    /// Read settings from this file instead of searching for one.
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print errors as full graphical reports.
    #[arg(long, global = true)]
    pub fancy: bool,

    /// More logging; repeat for more.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: ArgsCommand,
}

#[derive(Debug, Subcommand)]
pub enum ArgsCommand {
    /// Generate, build and run test files.
    Run {
        /// Test files, or directories to search for them.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Print the generated Fortran for a test file.
    Generate {
        file: PathBuf,
        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the parsed structure of a test file.
    Ast {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print the build command for a test file without running it.
    BuildCommand { file: PathBuf },
}

// ============================================================================
// MAIN ENTRY POINT
// ============================================================================

pub fn run() {
    let args = FunitArgs::parse();
    init_tracing(args.verbose);

    let fancy = args.fancy;
    match dispatch(args) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            print_error(e, fancy);
            process::exit(1);
        }
    }
}

/// Installs the stderr log subscriber. `RUST_LOG` takes precedence over
/// `verbosity`.
pub fn init_tracing(verbosity: u8) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init();
}

/// Runs one subcommand; `Ok(false)` means some test file failed and its
/// diagnostics were already printed.
fn dispatch(args: FunitArgs) -> Result<bool, FunitError> {
    match args.command {
        ArgsCommand::Run { paths } => {
            let pipeline = Pipeline::new(Config::load(args.config.as_deref())?);
            let mut printer = output::StatusPrinter::new(args.fancy);
            let summary = pipeline.run_all(&paths, &mut printer)?;
            printer.print_summary(&summary);
            Ok(summary.is_success())
        }

        ArgsCommand::Generate { file, output } => {
            let parsed = syntax::parse_file(&file)?;
            let code = codegen::generate(&parsed)?;
            match output {
                Some(path) => write_output(&path, &code)?,
                None => print!("{code}"),
            }
            Ok(true)
        }

        ArgsCommand::Ast { file, json } => {
            let parsed = syntax::parse_file(&file)?;
            if json {
                let text = serde_json::to_string_pretty(&parsed).map_err(|e| {
                    FunitError::unspanned(
                        ErrorKind::Io {
                            operation: "serializing".into(),
                            path: file.display().to_string(),
                            message: e.to_string(),
                        },
                        "cli",
                    )
                })?;
                println!("{text}");
            } else {
                print!("{}", output::outline(&parsed));
            }
            Ok(true)
        }

        ArgsCommand::BuildCommand { file } => {
            let pipeline = Pipeline::new(Config::load(args.config.as_deref())?);
            let parsed = syntax::parse_file(&file)?;
            println!("{}", pipeline.build_command(&parsed));
            Ok(true)
        }
    }
}

fn write_output(path: &Path, text: &str) -> Result<(), FunitError> {
    std::fs::write(path, text).map_err(|e| FunitError::io("writing", path, e))
}
