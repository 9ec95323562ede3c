//! # Question RAG CLI (`qrag`)
//!
//! ## Usage
//!
//! ```bash
//! qrag --config ./config/qrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `qrag ingest` | Normalize, build, upload and import the question corpus |
//! | `qrag retrieval-test` | Send the sample query and print the raw contexts |
//! | `qrag search "<query>"` | Free-text search |
//! | `qrag concept "<concept>"` | Questions tagged with a concept |
//! | `qrag get <id>` | One question by identifier |
//! | `qrag serve` | Start the HTTP tool host for the agent |
//!
//! Diagnostics go through `tracing`; set `RUST_LOG=debug` for detail.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use question_rag::config::{self, Config};
use question_rag::ingest::run_ingestion;
use question_rag::models::{QueryRequest, QuestionHit};
use question_rag::progress::ProgressMode;
use question_rag::retrieval::Retriever;
use question_rag::server;
use question_rag::traits::{create_blob_store, create_corpus_service, CorpusService};

/// Question RAG: ingestion and retrieval for a bank of exam questions.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/qrag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "qrag",
    about = "Question RAG: ingest exam questions into a retrieval corpus and search them",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/qrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingestion pipeline.
    ///
    /// Loads the input metadata, normalizes it, writes the normalized JSON
    /// and the corpus text file, uploads the corpus file and asks the corpus
    /// service to re-import it.
    Ingest {
        /// Stop after writing the local artifacts; no upload, no import.
        #[arg(long)]
        dry_run: bool,

        /// Step progress on stderr.
        #[arg(long, value_enum, default_value_t = ProgressMode::Human)]
        progress: ProgressMode,
    },

    /// Send a sample query to the corpus and print the raw contexts.
    RetrievalTest {
        /// Query text (default: `retrieval.sample_query`).
        #[arg(long)]
        query: Option<String>,

        /// Number of contexts (default: `retrieval.sample_top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Free-text search over the question corpus.
    Search {
        query: String,

        #[arg(long)]
        top_k: Option<usize>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Questions tagged with a concept.
    Concept {
        concept: String,

        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Look up one question by identifier.
    Get {
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP tool host on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .try_init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { dry_run, progress } => {
            run_ingestion(&cfg, dry_run, progress).await?;
        }
        Commands::RetrievalTest { query, top_k } => {
            let query = query.unwrap_or_else(|| cfg.retrieval.sample_query.clone());
            let top_k = top_k.unwrap_or(cfg.retrieval.sample_top_k);
            run_retrieval_test(&cfg, &query, top_k).await?;
        }
        Commands::Search { query, top_k, json } => {
            let retriever = build_retriever(&cfg)?;
            let top_k = top_k.unwrap_or_else(|| retriever.default_top_k());
            let hits = retriever.search_by_text(&query, top_k).await?;
            print_hits(&hits, json)?;
        }
        Commands::Concept {
            concept,
            top_k,
            json,
        } => {
            let retriever = build_retriever(&cfg)?;
            let top_k = top_k.unwrap_or_else(|| retriever.default_top_k());
            let hits = retriever.search_by_concept(&concept, top_k).await?;
            print_hits(&hits, json)?;
        }
        Commands::Get { id, json } => {
            let retriever = build_retriever(&cfg)?;
            match retriever.search_by_id(&id).await? {
                Some(hit) if json => println!("{}", serde_json::to_string_pretty(&hit)?),
                Some(hit) => print_hits(&[hit], false)?,
                None if json => println!("null"),
                None => println!("No question found with id {}", id.trim()),
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

fn build_corpus(cfg: &Config) -> Result<Arc<dyn CorpusService>> {
    let blob_store = create_blob_store(cfg)?;
    create_corpus_service(cfg, blob_store)
}

fn build_retriever(cfg: &Config) -> Result<Retriever> {
    Ok(Retriever::new(build_corpus(cfg)?, cfg.retrieval.clone()))
}

async fn run_retrieval_test(cfg: &Config, query: &str, top_k: usize) -> Result<()> {
    let corpus = build_corpus(cfg)?;
    println!("Using corpus: {}", corpus.name());
    println!("Query: {}", query);

    let contexts = corpus
        .query(&QueryRequest {
            text: query.to_string(),
            top_k,
        })
        .await?;

    println!("Retrieval results:");
    if contexts.is_empty() {
        println!("No contexts returned.");
        return Ok(());
    }
    for (i, ctx) in contexts.iter().enumerate() {
        println!("\n---- Context {} ----", i + 1);
        if let Some(ref uri) = ctx.source_uri {
            println!("Source: {}", uri);
        }
        println!("Score: {}", ctx.score);
        println!("{}", ctx.text.chars().take(1000).collect::<String>());
        println!("--------------------");
    }
    Ok(())
}

fn print_hits(hits: &[QuestionHit], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(hits)?);
        return Ok(());
    }
    if hits.is_empty() {
        println!("No results found.");
        return Ok(());
    }
    for (i, h) in hits.iter().enumerate() {
        println!("---- Result {} ----", i + 1);
        println!("ID          : {}", h.id);
        println!("Main concept: {}", h.main_concept);
        println!("Concepts    : {}", h.concepts.join(", "));
        println!("Score       : {:.3}", h.score);
        println!("\nQuestion text:");
        println!("{}", h.text);
        println!("{}\n", "-".repeat(20));
    }
    Ok(())
}
