// tally - cross-store object-count reconciliation

mod exit_codes;
mod recon;
mod store;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tally_recon::StoreSide;

use exit_codes::EXIT_SUCCESS;
use recon::{RunOutput, RunOverrides};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Compare per-identifier object counts between two storage locations")]
#[command(version)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace). TALLY_LOG overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile every identifier and print the binned report
    #[command(after_help = "\
Examples:
  tally run recon.toml
  tally run recon.toml --json --output report.json
  tally run recon.toml --ids-file ids.txt --concurrency 128
  tally run recon.toml --strict || echo 'stores differ'")]
    Run {
        /// Path to the run config (TOML)
        config: PathBuf,

        /// Read identifiers from this file (one per line) instead of listing
        #[arg(long, value_name = "FILE")]
        ids_file: Option<PathBuf>,

        /// Worker threads (overrides config)
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,

        /// Per-identifier deadline in seconds (overrides config)
        #[arg(long, value_name = "SECS")]
        timeout_secs: Option<u64>,

        /// Retry comparisons that fail with a transient store error
        #[arg(long)]
        retry_comparisons: bool,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,

        /// Write the report to a file instead of stdout
        #[arg(long, short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,

        /// Exit 6 when any identifier is offending or skipped
        #[arg(long)]
        strict: bool,
    },

    /// Validate a run config without touching any store
    Validate {
        /// Path to the run config (TOML)
        config: PathBuf,
    },

    /// Print the identifiers found under a store's root
    List {
        /// Path to the run config (TOML)
        config: PathBuf,

        /// Store to list (defaults to [enumerate].from)
        #[arg(long, value_enum)]
        store: Option<StoreArg>,
    },

    /// Compare specific identifiers and print one line each
    #[command(after_help = "\
Examples:
  tally compare recon.toml fc8a9074 0b25f5a4")]
    Compare {
        /// Path to the run config (TOML)
        config: PathBuf,

        /// Identifiers to compare
        #[arg(required = true)]
        identifiers: Vec<String>,

        /// Exit 6 when any identifier has more objects in store A
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreArg {
    A,
    B,
}

impl From<StoreArg> for StoreSide {
    fn from(arg: StoreArg) -> Self {
        match arg {
            StoreArg::A => StoreSide::A,
            StoreArg::B => StoreSide::B,
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let default = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_env("TALLY_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Run {
            config,
            ids_file,
            concurrency,
            timeout_secs,
            retry_comparisons,
            json,
            output,
            strict,
        } => recon::cmd_run(
            config,
            ids_file,
            RunOverrides { concurrency, timeout_secs, retry_comparisons },
            RunOutput { json, output, strict },
        ),
        Commands::Validate { config } => recon::cmd_validate(config),
        Commands::List { config, store } => recon::cmd_list(config, store.map(StoreSide::from)),
        Commands::Compare { config, identifiers, strict } => {
            recon::cmd_compare(config, identifiers, strict)
        }
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("error: {}", e.message);
            if let Some(hint) = e.hint {
                eprintln!("hint: {hint}");
            }
            ExitCode::from(e.code)
        }
    }
}

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
