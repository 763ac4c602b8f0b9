//! Live schema inspection.
//!
//! Reads the table catalog of a user database and resolves it into a
//! [`SchemaMapping`] via the core dialect rules. Two small catalog queries
//! per call; nothing is cached, so schema changes are picked up on the next
//! request.

use anyhow::Result;
use sqlx::SqlitePool;

use query_harness_core::schema::{resolve_mapping, SchemaMapping, TableCatalog};

/// User tables and their column names. `sqlite_*` internals are skipped.
pub async fn inspect(pool: &SqlitePool) -> Result<TableCatalog> {
    let tables: Vec<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    let mut catalog = TableCatalog::new();
    for (table,) in tables {
        let columns: Vec<(String,)> = sqlx::query_as("SELECT name FROM pragma_table_info(?)")
            .bind(&table)
            .fetch_all(pool)
            .await?;
        catalog.insert(table, columns.into_iter().map(|(name,)| name));
    }
    Ok(catalog)
}

pub async fn detect_schema(pool: &SqlitePool) -> Result<SchemaMapping> {
    let catalog = inspect(pool).await?;
    let mapping = resolve_mapping(&catalog);
    tracing::debug!(dialect = ?mapping.dialect, table = %mapping.employee_table, "resolved schema");
    Ok(mapping)
}
