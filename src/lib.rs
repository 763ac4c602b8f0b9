//! # Query Harness
//!
//! Natural-language questions over a relational database and an embedded
//! document store.
//!
//! A question is routed to the relational branch, the document branch, or
//! both. The relational branch inspects the live schema, extracts filters,
//! classifies intent and synthesizes a parameterized SQL statement; the
//! document branch ranks stored chunk embeddings against the embedded
//! question. Results are cached and timed.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!   question ───▶ │    Router    │
//!                 └──────┬───────┘
//!             ┌──────────┴──────────┐
//!             ▼                     ▼
//!     ┌──────────────┐      ┌──────────────┐
//!     │ Schema+Synth │      │  Embed+Rank  │
//!     │  (user DB)   │      │ (ingest DB)  │
//!     └──────┬───────┘      └──────┬───────┘
//!            └─────────┬───────────┘
//!                      ▼
//!          envelope ─▶ cache, metrics ─▶ CLI / HTTP
//! ```
//!
//! The pure logic (dialects, filters, intents, synthesis, ranking, cache,
//! metrics) lives in `query-harness-core`; this crate adds I/O.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Connection strings, pools and the ingestion store |
//! | [`schema`] | Live schema inspection |
//! | [`discovery`] | Database overview for the connect step |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`intent_model`] | Semantic intent classifier |
//! | [`documents`] | Vector search over ingested chunks |
//! | [`jobs`] | Ingestion job status |
//! | [`engine`] | The query engine |
//! | [`server`] | HTTP API |
//! | [`migrate`] | Ingestion store schema |
//! | [`seed`] | Sample HR database |

pub mod config;
pub mod db;
pub mod discovery;
pub mod documents;
pub mod embedding;
pub mod engine;
pub mod intent_model;
pub mod jobs;
pub mod migrate;
pub mod schema;
pub mod seed;
pub mod server;
