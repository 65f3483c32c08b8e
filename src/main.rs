//! # Jarvis CLI (`jarvis`)
//!
//! ## Usage
//!
//! ```bash
//! jarvis --config ./config/jarvis.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `jarvis serve` | Start the HTTP server |
//! | `jarvis ingest "<text>"` | Store one document in the knowledge store |
//! | `jarvis ask "<message>"` | Answer one question and print its sources |
//! | `jarvis status` | Report encoder, store, and generation readiness |
//!
//! A `.env` file in the working directory is loaded before configuration,
//! so `PINECONE_API_KEY` and `OPENAI_API_KEY` can live there.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use jarvis_rag::config;
use jarvis_rag::knowledge::UpsertOutcome;
use jarvis_rag::logging;
use jarvis_rag::pipeline::RagPipeline;
use jarvis_rag::server;

/// Jarvis: a personal assistant that answers from your own knowledge.
#[derive(Parser)]
#[command(
    name = "jarvis",
    about = "Jarvis: retrieval-augmented answers from local or cloud language models",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/jarvis.toml")]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Ingest one document.
    ///
    /// With `store.backend = "memory"` the document only lives for the
    /// duration of this command; use `serve` for an in-memory store.
    Ingest {
        /// Document text.
        text: String,

        /// Provenance tag reported alongside answers that use this text.
        #[arg(long, default_value = server::DEFAULT_KNOWLEDGE_SOURCE)]
        source: String,
    },

    /// Answer one question.
    Ask {
        /// The question.
        message: String,
    },

    /// Show whether the encoder, store, and generation backend are ready.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;
    let pipeline = RagPipeline::from_config(&cfg).await?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg.server.bind, Arc::new(pipeline)).await?;
        }
        Commands::Ingest { text, source } => match pipeline.ingest(&text, &source).await {
            UpsertOutcome::Stored(id) => println!("Stored document {}", id),
            UpsertOutcome::Unavailable => {
                anyhow::bail!("knowledge store unavailable; document not stored")
            }
        },
        Commands::Ask { message } => {
            let answer = pipeline.ask(&message).await;
            println!("{}", answer.response);
            if !answer.sources.is_empty() {
                println!();
                println!("Sources:");
                for source in &answer.sources {
                    println!("  - {}", source);
                }
            }
        }
        Commands::Status => {
            let status = pipeline.status();
            println!(
                "Encoder:    {} ({} dims)",
                status.encoder.model, status.encoder.dims
            );
            let store_state = if status.store.available {
                match pipeline.store().count().await {
                    Some(n) => format!("ready, {} entries", n),
                    None => "ready".to_string(),
                }
            } else {
                "unavailable".to_string()
            };
            println!("Store:      {} ({})", status.store.backend, store_state);
            match status.generation {
                Some(g) => println!("Generation: {} ({})", g.name, g.model),
                None => println!("Generation: none"),
            }
        }
    }

    Ok(())
}
