//! historify - tamper-evident audit trails for file trees.
//!
//! Tracks file additions, modifications, moves and deletions across named
//! categories, records them in append-only daily change logs with dual
//! digests, and binds the logs into a hash chain rooted in a signed random
//! seed.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod commands;
mod theme;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{category, comment, config, duplicates, init, lifecycle, log, scan, snapshot, status, verify};

/// Exit code for general errors (I/O, busy repository).
const EXIT_GENERAL: u8 = 1;
/// Exit code for configuration errors.
const EXIT_CONFIG: u8 = 2;
/// Exit code for integrity errors (chain, signatures, verification).
const EXIT_INTEGRITY: u8 = 3;
/// Exit code for database/index errors.
const EXIT_INDEX: u8 = 4;

/// historify - revision-safe logging of file changes.
#[derive(Parser)]
#[command(name = "historify")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Repository path.
    #[arg(short = 'C', long = "repo", global = true, default_value = ".")]
    repo: PathBuf,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new repository.
    Init {
        /// Repository name (defaults to the directory name).
        #[arg(long)]
        name: Option<String>,
    },

    /// Set a configuration value (section.option form).
    Config {
        /// The key, e.g. `minisign.key` or `category.docs.description`.
        key: String,
        /// The value.
        value: String,
    },

    /// Check the configuration for problems.
    CheckConfig,

    /// Add a data category.
    AddCategory {
        /// Category name (`[A-Za-z0-9_-]+`).
        name: String,
        /// Data root: repository-relative or absolute.
        path: PathBuf,
        /// Optional human description.
        #[arg(long)]
        description: Option<String>,
    },

    /// Sign the current state and open the next changelog.
    Start,

    /// Close the current changelog and open the next one (alias of start).
    Closing,

    /// Scan categories for file changes.
    Scan {
        /// Restrict the scan to one category.
        #[arg(long)]
        category: Option<String>,
    },

    /// Report live files with identical content.
    Duplicates {
        /// Restrict the report to one category.
        #[arg(long)]
        category: Option<String>,
    },

    /// Verify signatures and hash-chain integrity.
    Verify {
        /// Walk the whole chain from the seed.
        #[arg(long)]
        full_chain: bool,
        /// Also re-hash every live file.
        #[arg(long)]
        files: bool,
    },

    /// Show repository status.
    Status {
        /// Restrict to one category.
        #[arg(long)]
        category: Option<String>,
    },

    /// Show change history from the logs.
    Log {
        /// A specific changelog date (YYYY-MM-DD) or file name.
        #[arg(long)]
        file: Option<String>,
        /// Restrict to one category.
        #[arg(long)]
        category: Option<String>,
    },

    /// Append an administrative comment to the open changelog.
    Comment {
        /// The comment text.
        message: String,
    },

    /// Package a copy of the repository state.
    Snapshot {
        /// Output directory.
        outdir: PathBuf,
        /// Snapshot name (defaults to `<repo>-<date>`).
        #[arg(long)]
        name: Option<String>,
        /// Include category data, not just metadata and logs.
        #[arg(long)]
        full: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", theme::error(&format!("{e:#}")));
            ExitCode::from(exit_code_for(&e))
        },
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let repo = cli.repo;
    match cli.command {
        Commands::Init { name } => init::run(&repo, name.as_deref()),
        Commands::Config { key, value } => config::set(&repo, &key, &value),
        Commands::CheckConfig => config::check(&repo),
        Commands::AddCategory {
            name,
            path,
            description,
        } => category::add(&repo, &name, &path, description),
        Commands::Start | Commands::Closing => lifecycle::run(&repo),
        Commands::Scan { category } => scan::run(&repo, category.as_deref()),
        Commands::Duplicates { category } => duplicates::run(&repo, category.as_deref()),
        Commands::Verify { full_chain, files } => verify::run(&repo, full_chain, files),
        Commands::Status { category } => status::run(&repo, category.as_deref()),
        Commands::Log { file, category } => log::run(&repo, file.as_deref(), category.as_deref()),
        Commands::Comment { message } => comment::run(&repo, &message),
        Commands::Snapshot { outdir, name, full } => {
            snapshot::run(&repo, &outdir, name.as_deref(), full)
        },
    }
}

/// Map an error chain to the documented exit codes.
fn exit_code_for(error: &anyhow::Error) -> u8 {
    use historify_chain::ChainError;
    use historify_core::{ConfigError, RepoError};
    use historify_signer::SignerError;

    for cause in error.chain() {
        if let Some(chain) = cause.downcast_ref::<ChainError>() {
            return match chain {
                ChainError::IndexCorrupt { .. } => EXIT_INDEX,
                ChainError::Signer(SignerError::SignerUnavailable { .. })
                | ChainError::Signer(SignerError::Timeout { .. })
                | ChainError::Io { .. } => EXIT_GENERAL,
                _ => EXIT_INTEGRITY,
            };
        }
        if let Some(signer) = cause.downcast_ref::<SignerError>() {
            return match signer {
                SignerError::SignerUnavailable { .. }
                | SignerError::Timeout { .. }
                | SignerError::Io { .. } => EXIT_GENERAL,
                _ => EXIT_INTEGRITY,
            };
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return EXIT_CONFIG;
        }
        if let Some(repo) = cause.downcast_ref::<RepoError>() {
            return match repo {
                RepoError::Config(_) => EXIT_CONFIG,
                _ => EXIT_GENERAL,
            };
        }
        if let Some(cli) = cause.downcast_ref::<commands::CommandError>() {
            return match cli {
                commands::CommandError::VerificationFailed { .. } => EXIT_INTEGRITY,
                commands::CommandError::ConfigIssues { .. } => EXIT_CONFIG,
            };
        }
    }
    EXIT_GENERAL
}
