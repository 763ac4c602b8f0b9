//! Semantic search over the ingestion store.
//!
//! Every chunk vector is loaded and scored in memory; the store is
//! expected to stay in the tens of thousands of chunks. An absent store,
//! a store without a `chunks` table, or one with no chunk rows all yield
//! an empty result without calling the embedder.

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use std::path::Path;

use query_harness_core::envelope::DocumentResult;
use query_harness_core::ranking::{rank_chunks, ChunkVector};

use crate::db;
use crate::embedding::{embed_query, Embedder};

/// Indexed document and chunk counts; zeros when the store is absent.
pub async fn store_counts(store_path: &Path) -> Result<(i64, i64)> {
    let Some(pool) = db::open_store(store_path).await? else {
        return Ok((0, 0));
    };
    let documents = if has_table(&pool, "documents").await? {
        sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&pool)
            .await?
    } else {
        0
    };
    let chunks = if has_table(&pool, "chunks").await? {
        sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&pool)
            .await?
    } else {
        0
    };
    pool.close().await;
    Ok((documents, chunks))
}

/// Rank stored chunks against `text` and return one page.
pub async fn search_documents(
    store_path: &Path,
    embedder: Option<&dyn Embedder>,
    text: &str,
    limit: i64,
    offset: i64,
) -> Result<DocumentResult> {
    let Some(pool) = db::open_store(store_path).await? else {
        tracing::debug!(store = %store_path.display(), "ingestion store absent");
        return Ok(DocumentResult::default());
    };
    let chunks = load_chunks(&pool).await;
    pool.close().await;
    let chunks = chunks?;
    if chunks.is_empty() {
        return Ok(DocumentResult::default());
    }

    let Some(embedder) = embedder else {
        bail!("Embedding provider is disabled; cannot search documents");
    };
    let query = embed_query(embedder, text).await?;
    let (results, pagination) = rank_chunks(&query, chunks, limit, offset);
    tracing::debug!(hits = results.len(), total = pagination.total, "ranked chunks");

    Ok(DocumentResult {
        results,
        error: None,
        pagination: Some(pagination),
    })
}

/// All chunks with their document metadata, in storage order.
async fn load_chunks(pool: &SqlitePool) -> Result<Vec<ChunkVector>> {
    if !has_table(pool, "chunks").await? {
        return Ok(Vec::new());
    }

    let rows: Vec<(Option<String>, Option<Vec<u8>>, Option<i64>, Option<String>, Option<String>)> =
        sqlx::query_as(
            r#"
            SELECT c.text, c.embedding, c.dim, d.filename, d.doc_type
            FROM chunks c
            JOIN documents d ON c.document_id = d.id
            ORDER BY c.id
            "#,
        )
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(text, embedding, dim, filename, doc_type)| {
            Some(ChunkVector {
                text: text.unwrap_or_default(),
                embedding: embedding?,
                dim: dim?,
                filename: filename.unwrap_or_default(),
                doc_type: doc_type.unwrap_or_default(),
            })
        })
        .collect())
}

async fn has_table(pool: &SqlitePool, table: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?",
    )
    .bind(table)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::init_store;
    use async_trait::async_trait;
    use query_harness_core::ranking::vec_to_blob;

    struct Axis;

    #[async_trait]
    impl Embedder for Axis {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_absent_store_is_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("missing.db");
        let result = search_documents(&path, None, "resume", 8, 0).await.unwrap();
        assert!(result.results.is_empty());
        assert!(result.error.is_none());
        assert_eq!(store_counts(&path).await.unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn test_empty_store_skips_embedding() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("ingestion.db");
        init_store(&path).await.unwrap();
        // No embedder configured, still no error.
        let result = search_documents(&path, None, "resume", 8, 0).await.unwrap();
        assert!(result.results.is_empty());
    }

    #[tokio::test]
    async fn test_ranks_and_skips_bad_dims() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("ingestion.db");
        init_store(&path).await.unwrap();

        let pool = db::connect_store(&path).await.unwrap();
        sqlx::query("INSERT INTO documents (id, job_id, filename, doc_type) VALUES (1, 'j', 'cv.pdf', 'pdf')")
            .execute(&pool)
            .await
            .unwrap();
        let chunks: [(&str, Vec<f32>, i64); 3] = [
            ("weak", vec![0.0, 1.0], 2),
            ("strong", vec![1.0, 0.0], 2),
            ("corrupt", vec![1.0, 0.0], 3),
        ];
        for (i, (text, vec, dim)) in chunks.iter().enumerate() {
            sqlx::query("INSERT INTO chunks (document_id, chunk_index, text, embedding, dim) VALUES (1, ?, ?, ?, ?)")
                .bind(i as i64)
                .bind(*text)
                .bind(vec_to_blob(vec))
                .bind(*dim)
                .execute(&pool)
                .await
                .unwrap();
        }
        pool.close().await;

        let result = search_documents(&path, Some(&Axis), "python resume", 8, 0)
            .await
            .unwrap();
        let texts: Vec<&str> = result.results.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["strong", "weak"]);
        assert_eq!(result.results[0].filename, "cv.pdf");
        assert_eq!(result.pagination.unwrap().total, 2);
        assert_eq!(store_counts(&path).await.unwrap(), (1, 3));

        let err = search_documents(&path, None, "python resume", 8, 0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}
