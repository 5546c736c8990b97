//! # Shelf Harvest CLI (`shelf`)
//!
//! ## Usage
//!
//! ```bash
//! shelf --config ./config/shelf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shelf init` | Create the local data directory and the mirror schema |
//! | `shelf acquire <count> [feedback]` | Top the store up to `count` items |
//! | `shelf stats` | Item, feedback and satisfied counts |
//! | `shelf get <identifier>` | Print a stored item as JSON |
//! | `shelf verify [identifier]` | Check the primary store against the mirror |
//! | `shelf completions <shell>` | Print a shell completion script |
//!
//! Logs go to stderr and honour `RUST_LOG`; summaries go to stdout.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shelf_harvest::progress::ProgressMode;
use shelf_harvest::{acquire_cmd, config, get, migrate, stats, verify};

/// Shelf Harvest CLI: incremental book metadata and review acquisition.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/shelf.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "shelf",
    about = "Shelf Harvest: incremental book metadata and review acquisition",
    version,
    long_about = "Shelf Harvest tops a book dataset up to a target number of items with a \
    target number of reviews each. Re-running with a larger target only scrapes the difference. \
    Items are stored on local disk or S3, optionally mirrored into SQLite."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/shelf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the local data directory and the SQLite mirror schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Acquire items until the store holds `count` items with `feedback`
    /// reviews each.
    ///
    /// Only the deficit is scraped. Items already stored but short on
    /// reviews are topped up without rewriting their attributes.
    Acquire {
        /// Target number of items.
        count: usize,

        /// Target reviews per item. Defaults to `harvest.feedback_per_item`.
        feedback: Option<usize>,

        /// Progress output on stderr. Defaults to `human` on a TTY, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Show item and feedback counts.
    Stats {
        /// Feedback count an item needs to be reported as satisfied.
        #[arg(long)]
        threshold: Option<usize>,
    },

    /// Print a stored item and its reviews as JSON.
    Get {
        /// Item identifier (ISBN).
        identifier: String,
    },

    /// Check that the primary store and the mirror agree.
    ///
    /// Exits non-zero if any item is present in only one of them.
    Verify {
        /// Check a single identifier instead of every stored item.
        identifier: Option<String>,
    },

    /// Print a shell completion script to stdout.
    Completions {
        shell: clap_complete::Shell,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "shelf", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_init(&cfg).await?;
        }
        Commands::Acquire {
            count,
            feedback,
            progress,
        } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            acquire_cmd::run_acquire(&cfg, count, feedback, mode).await?;
        }
        Commands::Stats { threshold } => {
            stats::run_stats(&cfg, threshold).await?;
        }
        Commands::Get { identifier } => {
            get::run_get(&cfg, &identifier).await?;
        }
        Commands::Verify { identifier } => {
            verify::run_verify(&cfg, identifier.as_deref()).await?;
        }
        Commands::Completions { .. } => unreachable!(),
    }

    Ok(())
}
