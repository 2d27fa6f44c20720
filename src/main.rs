//! # IT-ERA Desk CLI (`itera`)
//!
//! ## Usage
//!
//! ```bash
//! itera --config ./config/itera.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `itera init` | Create the SQLite database and run schema migrations |
//! | `itera serve` | Start the HTTP API |
//! | `itera classify "<message>"` | Show how the chat engine reads a message |
//! | `itera contacts` | List the latest contact submissions |
//! | `itera stats` | Lead counts and storage overview |

use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use itera_desk::config;
use itera_desk::contacts;
use itera_desk::intent::classify_intent;
use itera_desk::lead;
use itera_desk::migrate;
use itera_desk::server;
use itera_desk::stats;
use itera_desk::triage;

/// IT-ERA Desk: contact relay, chat triage and lead escalation for the
/// IT-ERA site.
#[derive(Parser)]
#[command(name = "itera", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// See `config/itera.example.toml` for every option.
    #[arg(long, global = true, default_value = "./config/itera.toml")]
    config: PathBuf,

    /// Enable debug logging. `RUST_LOG` takes precedence when set.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Start the HTTP API.
    ///
    /// Applies migrations first, then serves `/api/contact`, `/api/chat`
    /// and `/health` on `[server].bind`.
    Serve,

    /// Classify a chat message offline and print the result as JSON.
    ///
    /// Does not read the config file.
    Classify {
        /// The visitor message to classify.
        message: String,
    },

    /// List the most recent contact submissions.
    Contacts {
        /// Maximum number of rows to print.
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Show lead counts and storage statistics.
    Stats {
        /// How many days of daily lead counters to show.
        #[arg(
            long,
            default_value_t = 7,
            value_parser = clap::value_parser!(u32).range(1..=stats::MAX_DAYS as i64)
        )]
        days: u32,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "itera_desk=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn classify(message: &str) -> serde_json::Value {
    let intent = classify_intent(message);
    let analysis = triage::classify(message);
    let flow = triage::flow_for(analysis.category);
    let score = lead::score(&lead::signals_from_text(message));

    json!({
        "intent": intent,
        "triage": analysis,
        "flow": flow,
        "leadScore": score,
        "leadQuality": lead::quality(score).label,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Classify { message } => {
            println!("{}", serde_json::to_string_pretty(&classify(&message))?);
        }
        Commands::Init => {
            let cfg = config::load_config(&cli.config)?;
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Serve => {
            let cfg = config::load_config(&cli.config)?;
            server::run_server(&cfg).await?;
        }
        Commands::Contacts { limit } => {
            let cfg = config::load_config(&cli.config)?;
            contacts::run_contacts(&cfg, limit).await?;
        }
        Commands::Stats { days } => {
            let cfg = config::load_config(&cli.config)?;
            stats::run_stats(&cfg, days).await?;
        }
    }

    Ok(())
}
