//! The query engine: routing, synthesis, execution, caching and metrics.
//!
//! One [`QueryEngine`] owns all process-wide state and is shared behind an
//! `Arc` by the CLI and the HTTP server. [`QueryEngine::process_query`]
//! never fails: errors from either branch are folded into the envelope so
//! that a hybrid request still returns the half that worked.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};
use std::sync::Arc;
use std::time::Instant;

use query_harness_core::cache::{CacheKey, ResultCache};
use query_harness_core::envelope::{
    merge_hybrid, CacheOutcome, DocumentResult, Pagination, ParamValue, QueryEnvelope,
    QueryResponse, ResponseMetrics, Row as JsonRow, SqlResult,
};
use query_harness_core::filters;
use query_harness_core::intent::{infer_intent, Classifier, Intent, RuleClassifier};
use query_harness_core::metrics::{HistoryEntry, MetricsRecorder, MetricsSnapshot};
use query_harness_core::router::{self, QueryType};
use query_harness_core::synth::{synthesize, Statement, SynthesisError, SynthesisRequest};

use crate::config::Config;
use crate::db::PoolRegistry;
use crate::documents;
use crate::embedding::{self, Embedder};
use crate::intent_model::SemanticClassifier;
use crate::schema;

/// One question plus its page windows. Omitted windows use the configured
/// defaults; omitted connection strings use the default database.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    #[serde(rename = "query")]
    pub text: String,
    #[serde(default)]
    pub connection_string: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub doc_limit: Option<i64>,
    #[serde(default)]
    pub doc_offset: Option<i64>,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn connection(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = Some(connection_string.into());
        self
    }

    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    pub fn doc_page(mut self, limit: i64, offset: i64) -> Self {
        self.doc_limit = Some(limit);
        self.doc_offset = Some(offset);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub ok: bool,
}

pub struct QueryEngine {
    config: Config,
    cache: ResultCache,
    metrics: MetricsRecorder,
    pools: PoolRegistry,
    /// Tried in order; the first `Some` wins.
    classifiers: Vec<Arc<dyn Classifier>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl QueryEngine {
    /// Build the engine from configuration.
    ///
    /// With an embedder configured, the semantic classifier is loaded ahead
    /// of the rules. If its examples cannot be indexed the engine still
    /// starts, with rules only.
    pub async fn new(config: Config) -> Result<Self> {
        let embedder = embedding::create_embedder(&config.embedding)?;

        let mut classifiers: Vec<Arc<dyn Classifier>> = Vec::new();
        if let Some(embedder) = &embedder {
            match SemanticClassifier::load(&config.intent, Arc::clone(embedder)).await {
                Ok(classifier) => {
                    tracing::debug!(examples = classifier.len(), "semantic intent classifier ready");
                    classifiers.push(Arc::new(classifier));
                }
                Err(e) => tracing::warn!("semantic intent classifier disabled: {e:#}"),
            }
        }
        classifiers.push(Arc::new(RuleClassifier));

        Ok(Self::from_parts(config, embedder, classifiers))
    }

    /// Assemble an engine from explicit collaborators.
    pub fn from_parts(
        config: Config,
        embedder: Option<Arc<dyn Embedder>>,
        classifiers: Vec<Arc<dyn Classifier>>,
    ) -> Self {
        Self {
            cache: ResultCache::new(config.engine.cache_capacity),
            metrics: MetricsRecorder::new(
                config.engine.latency_window,
                config.engine.history_capacity,
            ),
            pools: PoolRegistry::new(config.pool.clone()),
            classifiers,
            embedder,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn process_query(&self, request: QueryRequest) -> QueryResponse {
        let started = Instant::now();
        self.metrics.record_request();

        let engine = &self.config.engine;
        let connection = request
            .connection_string
            .as_deref()
            .map(str::trim)
            .filter(|cs| !cs.is_empty())
            .unwrap_or(engine.default_connection.as_str());
        let limit = request.limit.unwrap_or(engine.default_limit);
        let offset = request.offset.unwrap_or(0);
        let doc_limit = request.doc_limit.unwrap_or(engine.default_doc_limit);
        let doc_offset = request.doc_offset.unwrap_or(0);

        let key = CacheKey {
            q: &request.text,
            cs: Some(connection),
            l: limit,
            o: offset,
            dl: doc_limit,
            doc_offset,
        }
        .canonical();

        if let Some(envelope) = self.cache.get(&key) {
            tracing::debug!(query = %request.text, "cache hit");
            return self.finish(&request.text, envelope, CacheOutcome::Hit, started);
        }

        let normalized = filters::normalize(&request.text);
        let query_type = router::route(&normalized);
        tracing::debug!(query = %request.text, ?query_type, "routed");

        let sql = if query_type.wants_sql() {
            let _active = self.metrics.track_query();
            Some(
                self.run_sql(&normalized, connection, limit, offset)
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!(query = %request.text, "sql branch failed: {e:#}");
                        SqlResult::failed(e.to_string())
                    }),
            )
        } else {
            None
        };

        let documents = if query_type.wants_documents() {
            let _active = self.metrics.track_query();
            Some(
                documents::search_documents(
                    &self.config.store.path,
                    self.embedder.as_deref(),
                    &request.text,
                    doc_limit,
                    doc_offset,
                )
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(query = %request.text, "document branch failed: {e:#}");
                    DocumentResult::failed(e.to_string())
                }),
            )
        } else {
            None
        };

        let envelope = match query_type {
            QueryType::Sql => QueryEnvelope::Sql(sql.unwrap_or_default()),
            QueryType::Document => QueryEnvelope::Document(documents.unwrap_or_default()),
            QueryType::Hybrid => merge_hybrid(sql.unwrap_or_default(), documents.unwrap_or_default()),
        };

        self.cache.set(key, envelope.clone());
        self.finish(&request.text, envelope, CacheOutcome::Miss, started)
    }

    fn finish(
        &self,
        text: &str,
        envelope: QueryEnvelope,
        cache: CacheOutcome,
        started: Instant,
    ) -> QueryResponse {
        let elapsed_sec = started.elapsed().as_secs_f64();
        self.metrics
            .record_completion(text, envelope.kind(), cache, elapsed_sec);
        QueryResponse {
            envelope,
            metrics: ResponseMetrics { elapsed_sec, cache },
        }
    }

    async fn run_sql(
        &self,
        normalized: &str,
        connection: &str,
        limit: i64,
        offset: i64,
    ) -> Result<SqlResult> {
        let pool = self.pools.get(connection)?;
        let _connection = self.metrics.track_connection();

        let mapping = schema::detect_schema(&pool).await?;
        let predicates = filters::extract(normalized);
        let intent = self.classify(normalized).await;

        let synthesis = match synthesize(&SynthesisRequest {
            text: normalized,
            mapping: &mapping,
            predicates: &predicates,
            intent,
            limit,
            offset,
        }) {
            Ok(synthesis) => synthesis,
            Err(SynthesisError::Unsupported { warning }) => return Ok(SqlResult::warned(warning)),
            Err(e) => return Ok(SqlResult::failed(e.to_string())),
        };

        let statement = &synthesis.statement;
        tracing::debug!(sql = %statement.sql, "executing");
        let rows = bind_all(statement)
            .fetch_all(&pool)
            .await?
            .iter()
            .map(row_to_json)
            .collect();

        let pagination = match (synthesis.window, &synthesis.count_statement) {
            (Some(window), Some(count)) => {
                let total: i64 = bind_all(count).fetch_one(&pool).await?.try_get(0)?;
                Some(Pagination {
                    limit: window.limit,
                    offset: window.offset,
                    total,
                })
            }
            _ => None,
        };

        Ok(SqlResult {
            sql: Some(statement.sql.clone()),
            params: statement.params(),
            rows,
            error: None,
            warning: None,
            pagination,
        })
    }

    async fn classify(&self, normalized: &str) -> Intent {
        for classifier in &self.classifiers {
            match classifier.classify(normalized).await {
                Ok(Some(answer)) => {
                    tracing::debug!(
                        intent = %answer.intent,
                        confidence = answer.confidence,
                        source = %answer.source,
                        "classified intent"
                    );
                    return answer.intent;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(classifier = classifier.name(), "{e:#}"),
            }
        }
        infer_intent(normalized)
    }

    /// Most recent first.
    pub fn recent_history(&self, limit: usize) -> Vec<HistoryEntry> {
        self.metrics.recent_history(limit)
    }

    pub async fn get_metrics(&self) -> MetricsSnapshot {
        let mut snapshot = self.metrics.snapshot();
        match documents::store_counts(&self.config.store.path).await {
            Ok((docs, chunks)) => {
                snapshot.indexed_documents = docs;
                snapshot.indexed_chunks = chunks;
            }
            Err(e) => tracing::warn!("cannot count indexed documents: {e:#}"),
        }
        snapshot
    }

    pub fn reset_metrics(&self) -> Ack {
        self.metrics.reset();
        Ack { ok: true }
    }
}

/// A query with every value bound in placeholder order.
fn bind_all(statement: &Statement) -> sqlx::query::Query<'_, Sqlite, SqliteArguments<'_>> {
    statement
        .binds
        .iter()
        .fold(sqlx::query(&statement.sql), |query, (_, value)| match value {
            ParamValue::Int(v) => query.bind(*v),
            ParamValue::Text(s) => query.bind(s.as_str()),
        })
}

/// Convert a row by the storage class of each value.
fn row_to_json(row: &SqliteRow) -> JsonRow {
    row.columns()
        .iter()
        .map(|column| {
            let idx = column.ordinal();
            (column.name().to_string(), cell(row, idx))
        })
        .collect()
}

fn cell(row: &SqliteRow, idx: usize) -> serde_json::Value {
    use serde_json::Value;

    let storage = match row.try_get_raw(idx) {
        Ok(raw) if !raw.is_null() => raw.type_info().name().to_string(),
        _ => return Value::Null,
    };
    let value = match storage.as_str() {
        "INTEGER" => row.try_get_unchecked::<i64, _>(idx).map(Value::from),
        "REAL" => row.try_get_unchecked::<f64, _>(idx).map(Value::from),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(idx)
            .map(|bytes| Value::from(String::from_utf8_lossy(&bytes).into_owned())),
        _ => row.try_get_unchecked::<String, _>(idx).map(Value::from),
    };
    value.unwrap_or(Value::Null)
}
