//! # Query Harness CLI (`qh`)
//!
//! Ask natural-language questions of a SQLite database and the embedded
//! document store, from the shell or over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! qh --config ./config/qh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `qh init` | Create the ingestion store tables |
//! | `qh seed [connection]` | Create the sample HR database |
//! | `qh query "<question>"` | Answer a question and print the JSON envelope |
//! | `qh schema [connection]` | Show tables, columns and foreign keys |
//! | `qh job <id>` | Show the status of an ingestion job |
//! | `qh metrics` | Show indexed document and chunk counts |
//! | `qh serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! qh seed
//! qh query "How many employees are in Engineering?"
//! qh query "Python developers hired after 2020" --connection sqlite:///hr.db --limit 10
//! qh query "resume with Python skills" --doc-limit 3
//! RUST_LOG=query_harness=debug qh serve
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use query_harness::config;
use query_harness::discovery;
use query_harness::engine::{QueryEngine, QueryRequest};
use query_harness::jobs;
use query_harness::migrate;
use query_harness::seed;
use query_harness::server;

/// Query Harness CLI: natural-language questions over a relational
/// database and an embedded document store.
#[derive(Parser)]
#[command(
    name = "qh",
    about = "Query Harness: natural-language questions over SQLite and ingested documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/qh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the ingestion store tables (jobs, documents, chunks).
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Create or restore the sample HR database (4 departments, 13 employees).
    ///
    /// Idempotent; rows are upserted by id.
    Seed {
        /// Connection string. Defaults to `[engine].default_connection`.
        connection: Option<String>,
    },

    /// Answer a question and print the result envelope as JSON.
    Query {
        /// The question, e.g. "average salary by department".
        text: String,

        /// Database connection string. Defaults to `[engine].default_connection`.
        #[arg(long)]
        connection: Option<String>,

        /// Page size for relational rows.
        #[arg(long)]
        limit: Option<i64>,

        /// Offset into relational rows.
        #[arg(long)]
        offset: Option<i64>,

        /// Page size for document hits.
        #[arg(long)]
        doc_limit: Option<i64>,

        /// Offset into document hits.
        #[arg(long)]
        doc_offset: Option<i64>,
    },

    /// Describe a database: tables, typed columns and foreign keys.
    Schema {
        /// Connection string. Defaults to `[engine].default_connection`.
        connection: Option<String>,
    },

    /// Show the status of an ingestion job.
    Job {
        /// Job identifier as returned by the ingestion pipeline.
        id: String,
    },

    /// Show indexed document and chunk counts.
    Metrics,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::init_store(&cfg.store.path).await?;
            println!(
                "Ingestion store initialized at {}.",
                cfg.store.path.display()
            );
        }
        Commands::Seed { connection } => {
            let cs = connection.unwrap_or_else(|| cfg.engine.default_connection.clone());
            let summary = seed::seed_sample_database(&cs).await?;
            println!(
                "Seeded {} departments and {} employees into {}.",
                summary.departments,
                summary.employees,
                summary.path.display()
            );
        }
        Commands::Query {
            text,
            connection,
            limit,
            offset,
            doc_limit,
            doc_offset,
        } => {
            let engine = QueryEngine::new(cfg).await?;
            let request = QueryRequest {
                text,
                connection_string: connection,
                limit,
                offset,
                doc_limit,
                doc_offset,
            };
            print_json(&engine.process_query(request).await)?;
        }
        Commands::Schema { connection } => {
            let cs = connection.unwrap_or_else(|| cfg.engine.default_connection.clone());
            print_json(&discovery::analyze_database(&cs).await?)?;
        }
        Commands::Job { id } => {
            print_json(&jobs::get_job_status(&cfg.store.path, &id).await?)?;
        }
        Commands::Metrics => {
            let engine = QueryEngine::new(cfg).await?;
            let snapshot = engine.get_metrics().await;
            println!("Indexed documents: {}", snapshot.indexed_documents);
            println!("Indexed chunks:    {}", snapshot.indexed_chunks);
        }
        Commands::Serve => {
            let engine = Arc::new(QueryEngine::new(cfg).await?);
            server::run_server(engine).await?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
