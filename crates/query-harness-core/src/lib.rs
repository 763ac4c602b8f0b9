//! # Query Harness Core
//!
//! Shared, I/O-free logic for Query Harness: schema dialect resolution,
//! filter extraction, intent classification rules, query-type routing,
//! SQL synthesis, vector ranking, the result cache and metrics.
//!
//! This crate contains no tokio, sqlx, filesystem or network code. The
//! `query-harness` app crate inspects live databases, reads the ingestion
//! store, computes embeddings and wires everything into the query engine.

pub mod cache;
pub mod envelope;
pub mod filters;
pub mod intent;
pub mod metrics;
pub mod ranking;
pub mod router;
pub mod schema;
pub mod synth;

mod patterns;
