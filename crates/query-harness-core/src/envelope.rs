//! Result envelopes produced by the query engine.
//!
//! A [`QueryEnvelope`] is built once per uncached request, cloned into the
//! result cache, and never mutated afterwards. The serialized shape is:
//!
//! ```json
//! { "type": "sql", "rows": [...], "sql": "...", "params": {...},
//!   "error": "...", "warning": "...",
//!   "pagination": { "limit": 50, "offset": 0, "total": 13 } }
//! ```
//!
//! Hybrid envelopes carry both sub-results verbatim under `sql` and
//! `documents`, each with its own `type`, so either half reads like a
//! standalone envelope. [`QueryResponse`] adds the per-call `metrics` block.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One relational result row, keyed by column name.
pub type Row = Map<String, Value>;

/// A literal bound to a named statement parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Text(String),
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

/// Page window plus the total number of matching items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
    pub total: i64,
}

/// Structured (relational) half of a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SqlResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, ParamValue>,
    pub rows: Vec<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl SqlResult {
    /// Empty rows with an error message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Empty rows with a warning message.
    pub fn warned(message: impl Into<String>) -> Self {
        Self {
            warning: Some(message.into()),
            ..Self::default()
        }
    }
}

/// A ranked chunk from the document store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentHit {
    pub text: String,
    pub filename: String,
    pub doc_type: String,
    pub score: f32,
}

/// Unstructured (document search) half of a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentResult {
    pub results: Vec<DocumentHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl DocumentResult {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// The engine's output, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueryEnvelope {
    Sql(SqlResult),
    Document(DocumentResult),
    Hybrid {
        #[serde(serialize_with = "tagged_sql")]
        sql: SqlResult,
        #[serde(serialize_with = "tagged_documents")]
        documents: DocumentResult,
    },
}

/// A sub-result with its own `type` discriminator.
#[derive(Serialize)]
struct Tagged<'a, T> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    body: &'a T,
}

fn tagged_sql<S: Serializer>(sql: &SqlResult, serializer: S) -> Result<S::Ok, S::Error> {
    Tagged {
        kind: "sql",
        body: sql,
    }
    .serialize(serializer)
}

fn tagged_documents<S: Serializer>(
    documents: &DocumentResult,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    Tagged {
        kind: "document",
        body: documents,
    }
    .serialize(serializer)
}

impl QueryEnvelope {
    /// The `type` discriminator as written to JSON.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryEnvelope::Sql(_) => "sql",
            QueryEnvelope::Document(_) => "document",
            QueryEnvelope::Hybrid { .. } => "hybrid",
        }
    }

    pub fn sql(&self) -> Option<&SqlResult> {
        match self {
            QueryEnvelope::Sql(s) | QueryEnvelope::Hybrid { sql: s, .. } => Some(s),
            QueryEnvelope::Document(_) => None,
        }
    }

    pub fn documents(&self) -> Option<&DocumentResult> {
        match self {
            QueryEnvelope::Document(d) | QueryEnvelope::Hybrid { documents: d, .. } => Some(d),
            QueryEnvelope::Sql(_) => None,
        }
    }
}

/// Bundle independently computed results without re-ranking across them.
pub fn merge_hybrid(sql: SqlResult, documents: DocumentResult) -> QueryEnvelope {
    QueryEnvelope::Hybrid { sql, documents }
}

/// Whether a response was served from the result cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOutcome {
    Hit,
    Miss,
}

/// Per-call timing attached outside the cached envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResponseMetrics {
    pub elapsed_sec: f64,
    pub cache: CacheOutcome,
}

/// Envelope plus metrics, as returned from `process_query`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    #[serde(flatten)]
    pub envelope: QueryEnvelope,
    pub metrics: ResponseMetrics,
}
