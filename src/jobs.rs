//! Ingestion job status lookup.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use crate::db;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct JobRecord {
    #[serde(rename = "job_id")]
    pub id: String,
    pub status: Option<String>,
    pub total_files: Option<i64>,
    pub processed_files: Option<i64>,
    pub created_at: Option<f64>,
    pub updated_at: Option<f64>,
    pub error: Option<String>,
}

/// A job row, or `{"job_id", "status": "not_found"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobStatus {
    Found(JobRecord),
    NotFound { job_id: String, status: &'static str },
}

impl JobStatus {
    fn not_found(job_id: &str) -> Self {
        JobStatus::NotFound {
            job_id: job_id.to_string(),
            status: "not_found",
        }
    }
}

pub async fn get_job_status(store_path: &Path, job_id: &str) -> Result<JobStatus> {
    let Some(pool) = db::open_store(store_path).await? else {
        return Ok(JobStatus::not_found(job_id));
    };

    let has_jobs: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'jobs'",
    )
    .fetch_one(&pool)
    .await?;
    let record = if has_jobs {
        sqlx::query_as::<_, JobRecord>(
            "SELECT id, status, total_files, processed_files, created_at, updated_at, error FROM jobs WHERE id = ?",
        )
        .bind(job_id)
        .fetch_optional(&pool)
        .await?
    } else {
        None
    };
    pool.close().await;

    Ok(record.map_or_else(|| JobStatus::not_found(job_id), JobStatus::Found))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::init_store;

    #[tokio::test]
    async fn test_job_status_found_and_missing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("ingestion.db");
        init_store(&path).await.unwrap();

        let pool = db::connect_store(&path).await.unwrap();
        sqlx::query(
            "INSERT INTO jobs (id, status, total_files, processed_files, created_at, updated_at, error) VALUES ('job-1', 'processing', 3, 1, 1700000000.5, 1700000001.0, NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;

        let status = get_job_status(&path, "job-1").await.unwrap();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["job_id"], "job-1");
        assert_eq!(json["status"], "processing");
        assert_eq!(json["processed_files"], 1);
        assert!(json["error"].is_null());

        let missing = get_job_status(&path, "job-2").await.unwrap();
        assert_eq!(
            serde_json::to_value(&missing).unwrap(),
            serde_json::json!({"job_id": "job-2", "status": "not_found"})
        );
    }

    #[tokio::test]
    async fn test_job_status_without_store() {
        let tmp = tempfile::TempDir::new().unwrap();
        let status = get_job_status(&tmp.path().join("absent.db"), "x")
            .await
            .unwrap();
        assert!(matches!(status, JobStatus::NotFound { .. }));
    }
}
