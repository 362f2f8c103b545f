//! # vmirror CLI
//!
//! The `vmirror` binary provisions sources, runs sync cycles, answers
//! inventory questions and serves the JSON API.
//!
//! ## Usage
//!
//! ```bash
//! vmirror --config ./config/vmirror.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vmirror init` | Create the SQLite database and schema |
//! | `vmirror source add <hostname> --endpoint <e>` | Provision a source |
//! | `vmirror source list` | List sources and their sync status |
//! | `vmirror source enable/disable <id>` | Include or exclude a source from `sync all` |
//! | `vmirror sync all` / `vmirror sync <id>...` | Run sync cycles |
//! | `vmirror status <id>` | Show one source's status and inventory counts |
//! | `vmirror query "<text>"` | Ask a free-text question |
//! | `vmirror serve` | Start the HTTP API and the scheduler |
//!
//! Logs go to stderr. `RUST_LOG` overrides `[log].level`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use vmirror::config::{self, Config};
use vmirror::models::NewSource;
use vmirror::query::DEFAULT_SESSION;
use vmirror::{migrate, query_cmd, server, sources, sync_cmd};

/// vmirror: a local mirror of virtualization inventory.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/vmirror.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "vmirror",
    about = "vmirror: a local mirror of virtualization inventory",
    version,
    long_about = "vmirror mirrors the inventory of remote virtualization-management sources \
    into SQLite with concurrent, per-source atomic sync cycles, and answers free-text \
    questions about the mirrored inventory from the CLI or a JSON HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/vmirror.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Manage sources.
    Source {
        #[command(subcommand)]
        action: SourceAction,
    },

    /// Sync sources.
    ///
    /// `all` syncs every active source. One id syncs that source and exits
    /// non-zero if it fails. Several ids sync that set concurrently.
    Sync {
        /// `all`, or one or more source ids.
        #[arg(required = true)]
        targets: Vec<String>,
    },

    /// Show a source's sync status and inventory counts.
    Status {
        /// Source id.
        id: i64,
    },

    /// Ask a free-text question about the inventory.
    ///
    /// Examples: "show powered on vms", "how many hosts with no vms",
    /// "list vms in cluster prod".
    Query {
        /// The question.
        text: String,

        /// Session whose context this query updates.
        #[arg(long, default_value = DEFAULT_SESSION)]
        session: String,

        /// Print the raw JSON result.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP API (and the scheduler, if an interval is configured).
    Serve,
}

#[derive(Subcommand)]
enum SourceAction {
    /// Provision a new source.
    Add {
        /// Unique hostname of the source.
        hostname: String,

        /// Adapter-specific locator (for `file`: path to an inventory dump).
        #[arg(long)]
        endpoint: String,

        /// Adapter kind.
        #[arg(long, default_value = "file")]
        adapter: String,

        /// Login name for the source.
        #[arg(long)]
        username: Option<String>,

        /// Environment variable that holds the credential.
        #[arg(long)]
        credential_env: Option<String>,

        /// Add the source without including it in `sync all`.
        #[arg(long)]
        inactive: bool,
    },
    /// List all sources.
    List,
    /// Include a source in `sync all`.
    Enable { id: i64 },
    /// Exclude a source from `sync all`.
    Disable { id: i64 },
}

fn init_logging(cfg: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_logging(&cfg);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Source { action } => match action {
            SourceAction::Add {
                hostname,
                endpoint,
                adapter,
                username,
                credential_env,
                inactive,
            } => {
                let mut source = NewSource::new(hostname, adapter).endpoint(endpoint);
                source.username = username;
                source.credential_ref = credential_env;
                if inactive {
                    source = source.inactive();
                }
                sources::run_source_add(&cfg, source).await?;
            }
            SourceAction::List => {
                sources::run_source_list(&cfg).await?;
            }
            SourceAction::Enable { id } => {
                sources::run_source_set_active(&cfg, id, true).await?;
            }
            SourceAction::Disable { id } => {
                sources::run_source_set_active(&cfg, id, false).await?;
            }
        },
        Commands::Sync { targets } => {
            sync_cmd::run_sync(&cfg, &targets).await?;
        }
        Commands::Status { id } => {
            sources::run_status(&cfg, id).await?;
        }
        Commands::Query {
            text,
            session,
            json,
        } => {
            query_cmd::run_query(&cfg, &text, &session, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
