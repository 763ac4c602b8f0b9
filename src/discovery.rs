//! Database overview for the connect step: tables, typed columns and
//! foreign keys.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::db::{self, Target};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseOverview {
    pub tables: Vec<String>,
    /// Table name to `name:TYPE` entries in declaration order.
    pub columns: BTreeMap<String, Vec<String>>,
    pub relationships: Vec<Relationship>,
}

/// One foreign key; composite keys list their columns pairwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relationship {
    pub from_table: String,
    pub from_columns: Vec<String>,
    pub to_table: String,
    pub to_columns: Vec<String>,
    pub name: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ForeignKeyRow {
    id: i64,
    table: String,
    from: String,
    to: Option<String>,
}

/// Inspect the database behind `connection_string`.
///
/// A SQLite file that does not exist is an error; it is never created.
pub async fn analyze_database(connection_string: &str) -> Result<DatabaseOverview> {
    let cs = connection_string.trim();
    if cs.is_empty() {
        bail!("Connection string is required");
    }
    if let Target::File(path) = db::parse_target(cs)? {
        if !path.exists() {
            bail!("SQLite database file not found: {}", path.display());
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(db::connect_options(cs)?)
        .await?;
    let overview = describe(&pool).await;
    pool.close().await;
    overview
}

async fn describe(pool: &SqlitePool) -> Result<DatabaseOverview> {
    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    let mut columns = BTreeMap::new();
    let mut relationships = Vec::new();
    for table in &tables {
        let cols: Vec<(String, String)> =
            sqlx::query_as("SELECT name, type FROM pragma_table_info(?) ORDER BY cid")
                .bind(table)
                .fetch_all(pool)
                .await?;
        columns.insert(
            table.clone(),
            cols.into_iter()
                .map(|(name, ty)| format!("{name}:{}", display_type(&ty)))
                .collect(),
        );

        let fks: Vec<ForeignKeyRow> = sqlx::query_as(
            r#"SELECT id, "table", "from", "to" FROM pragma_foreign_key_list(?) ORDER BY id, seq"#,
        )
        .bind(table)
        .fetch_all(pool)
        .await?;
        relationships.extend(group_foreign_keys(table, fks));
    }

    Ok(DatabaseOverview {
        tables,
        columns,
        relationships,
    })
}

/// Undeclared column types show as `NULL`, matching SQLite's own affinity report.
fn display_type(declared: &str) -> &str {
    if declared.is_empty() {
        "NULL"
    } else {
        declared
    }
}

fn group_foreign_keys(table: &str, rows: Vec<ForeignKeyRow>) -> Vec<Relationship> {
    let mut grouped: Vec<(i64, Relationship)> = Vec::new();
    for row in rows {
        let to_column = row.to.unwrap_or_default();
        match grouped.last_mut() {
            Some((id, rel)) if *id == row.id => {
                rel.from_columns.push(row.from);
                rel.to_columns.push(to_column);
            }
            _ => grouped.push((
                row.id,
                Relationship {
                    from_table: table.to_string(),
                    from_columns: vec![row.from],
                    to_table: row.table,
                    to_columns: vec![to_column],
                    name: None,
                },
            )),
        }
    }
    grouped.into_iter().map(|(_, rel)| rel).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_fails_fast() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nope.db");
        let cs = format!("sqlite:///{}", path.display());
        let err = analyze_database(&cs).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_rejects_empty_and_foreign_schemes() {
        assert!(analyze_database("  ").await.is_err());
        assert!(analyze_database("mysql://localhost/hr").await.is_err());
    }

    #[tokio::test]
    async fn test_overview_lists_tables_columns_and_keys() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("hr.db");
        let pool = db::connect_store(&path).await.unwrap();
        for stmt in [
            "CREATE TABLE departments (dept_id INTEGER PRIMARY KEY, dept_name TEXT)",
            "CREATE TABLE employees (emp_id INTEGER PRIMARY KEY, full_name TEXT, dept_id INTEGER REFERENCES departments(dept_id), notes)",
        ] {
            sqlx::query(stmt).execute(&pool).await.unwrap();
        }
        pool.close().await;

        let overview = analyze_database(&format!("sqlite:///{}", path.display()))
            .await
            .unwrap();
        assert_eq!(overview.tables, vec!["departments", "employees"]);
        assert_eq!(
            overview.columns["employees"],
            vec![
                "emp_id:INTEGER",
                "full_name:TEXT",
                "dept_id:INTEGER",
                "notes:NULL"
            ]
        );
        assert_eq!(overview.relationships.len(), 1);
        let rel = &overview.relationships[0];
        assert_eq!(rel.from_table, "employees");
        assert_eq!(rel.from_columns, vec!["dept_id"]);
        assert_eq!(rel.to_table, "departments");
        assert_eq!(rel.to_columns, vec!["dept_id"]);
    }
}
