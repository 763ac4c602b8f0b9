use anyhow::Result;
use std::path::Path;

use crate::db;

/// Create the ingestion store tables if they do not exist yet.
///
/// The ingestion pipeline owns this file; the query engine only reads it.
/// `qh init` and the tests use this to lay down an empty store.
pub async fn init_store(path: &Path) -> Result<()> {
    let pool = db::connect_store(path).await?;

    // Ingestion jobs and their progress
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            status TEXT,
            total_files INTEGER,
            processed_files INTEGER,
            created_at REAL,
            updated_at REAL,
            error TEXT
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id TEXT,
            filename TEXT,
            doc_type TEXT
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Embeddings are little-endian f32 blobs of `dim` floats.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER,
            chunk_index INTEGER,
            text TEXT,
            embedding BLOB,
            dim INTEGER,
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_job_id ON documents(job_id)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_store_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested/ingestion.db");
        init_store(&path).await.unwrap();
        init_store(&path).await.unwrap();

        let pool = db::open_store(&path).await.unwrap().unwrap();
        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('jobs', 'documents', 'chunks') ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert_eq!(names, vec!["chunks", "documents", "jobs"]);
    }
}
