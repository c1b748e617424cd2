//! # Jenkins Chatbot CLI (`chatbot`)
//!
//! ## Usage
//!
//! ```bash
//! chatbot --config ./config/chatbot.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `chatbot init` | Create the SQLite database and schema |
//! | `chatbot ingest <partition> <file>` | Load chunk records into a partition |
//! | `chatbot search "<query>"` | Run one retrieval tool directly |
//! | `chatbot ask "<question>"` | Answer one question |
//! | `chatbot serve` | Start the HTTP API |
//!
//! Logging is controlled by `CHATBOT_LOG` (default `info`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use jenkins_chatbot::config::load_config;
use jenkins_chatbot::{chat, ingest, logging, migrate, search, server};

/// Jenkins Chatbot: retrieval-augmented answers over Jenkins documentation,
/// plugin docs, StackOverflow, and community threads.
#[derive(Parser)]
#[command(name = "chatbot", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/chatbot.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Load chunk records (JSON array or JSON Lines) into a corpus partition.
    ///
    /// Partitions: plugin_docs, jenkins_docs, stack_overflow, community_threads.
    Ingest {
        partition: String,
        file: PathBuf,
    },

    /// Run one retrieval tool and print the context it returns.
    Search {
        query: String,

        /// Tool name (default: search_jenkins_docs).
        #[arg(long)]
        tool: Option<String>,

        /// Keywords for the sparse search (default: the query).
        #[arg(long)]
        keywords: Option<String>,

        /// Plugin name filter for search_plugin_docs.
        #[arg(long)]
        plugin: Option<String>,
    },

    /// Answer one question in a fresh session.
    Ask { question: String },

    /// Start the HTTP API.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_json);

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&config).await?;
            println!("Database initialized at {}", config.db.path.display());
        }
        Commands::Ingest { partition, file } => {
            ingest::run_ingest(&config, &partition, &file).await?;
        }
        Commands::Search {
            query,
            tool,
            keywords,
            plugin,
        } => {
            search::run_search(
                &config,
                &query,
                tool.as_deref(),
                keywords.as_deref(),
                plugin.as_deref(),
            )
            .await?;
        }
        Commands::Ask { question } => {
            chat::run_ask(&config, &question).await?;
        }
        Commands::Serve => {
            server::serve(&config).await?;
        }
    }

    Ok(())
}
