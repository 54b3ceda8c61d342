//! # repo-scout CLI (`scout`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scout index <repo>` | Build and cache a snapshot of a repository |
//! | `scout ask <repo> "<question>"` | Answer a question, printing the trace first |
//! | `scout status <repo>` | Show what the cache holds for a repository |
//! | `scout serve` | Start the HTTP server |
//!
//! `<repo>` is `owner/name` or a GitHub URL.
//!
//! ## Examples
//!
//! ```bash
//! scout --config ./config/scout.toml index https://github.com/tokio-rs/axum
//! scout ask tokio-rs/axum "What are good first issues?"
//! scout serve
//! ```
//!
//! The in-memory cache lives only as long as the process, so `index` followed
//! by `ask` in separate invocations only shares a snapshot with the `sqlite`
//! cache backend.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repo_scout::assistant::Assistant;
use repo_scout::config;
use repo_scout::models::StepStatus;
use repo_scout::server;

/// repo-scout: ask questions about a GitHub repository.
#[derive(Parser)]
#[command(name = "scout", version, about)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply if it does not exist.
    #[arg(long, global = true, default_value = "./config/scout.toml")]
    config: PathBuf,

    /// Enable verbose logging (sets log level to DEBUG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a repository and cache its snapshot.
    Index {
        /// `owner/name` or a GitHub URL.
        repo: String,
    },

    /// Ask a question about a repository.
    ///
    /// Uses the cached snapshot when fresh, rebuilding it otherwise.
    Ask {
        /// `owner/name` or a GitHub URL.
        repo: String,
        /// The question.
        question: String,
    },

    /// Show the cached state of a repository.
    Status {
        /// `owner/name` or a GitHub URL.
        repo: String,
    },

    /// Start the HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(log_filter(rust_log.as_deref(), cli.verbose))
        .try_init();

    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        tracing::debug!(path = %cli.config.display(), "no config file, using defaults");
        config::Config::minimal()
    };

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Index { repo } => {
            let assistant = Assistant::from_config(&cfg).await?;
            let outcome = assistant.index(&repo).await?;
            let stats = outcome.stats;
            println!("Indexed {}", stats.full_name);
            println!("  language:      {}", stats.language.as_deref().unwrap_or("unknown"));
            println!("  stars:         {}", stats.stars);
            println!("  files:         {}", stats.files);
            println!("  open issues:   {}", stats.issues);
            println!("  open PRs:      {}", stats.pull_requests);
            println!("  readme:        {}", stats.has_readme);
            println!("  contributing:  {}", stats.has_contributing);
        }
        Commands::Ask { repo, question } => {
            let assistant = Assistant::from_config(&cfg).await?;
            let outcome = assistant.ask(&repo, &question).await?;
            for step in &outcome.steps {
                let mark = match step.status {
                    StepStatus::Complete => "ok",
                    StepStatus::Failed => "FAILED",
                };
                eprintln!("[{}] {}: {}", mark, step.label, step.detail);
            }
            println!("{}", outcome.answer);
        }
        Commands::Status { repo } => {
            let assistant = Assistant::from_config(&cfg).await?;
            let status = assistant.status(&repo).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

/// `RUST_LOG` wins when set and parseable; otherwise `--verbose` picks DEBUG
/// over the WARN default.
fn log_filter(rust_log: Option<&str>, verbose: bool) -> EnvFilter {
    let fallback = if verbose { "debug" } else { "warn" };
    rust_log
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new(fallback))
}
