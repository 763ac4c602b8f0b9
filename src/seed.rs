use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::PathBuf;

use crate::db::{self, Target};

/// Four departments with their manager's employee id.
const DEPARTMENTS: &[(i64, &str, i64)] = &[
    (10, "Engineering", 1),
    (20, "Marketing", 4),
    (30, "HR", 6),
    (40, "Data Science", 7),
];

/// (id, name, email, dept, position, salary, joined, office, skills, reports_to)
type SampleEmployee = (
    i64,
    &'static str,
    Option<&'static str>,
    Option<i64>,
    Option<&'static str>,
    Option<i64>,
    Option<&'static str>,
    &'static str,
    &'static str,
    Option<&'static str>,
);

const EMPLOYEES: &[SampleEmployee] = &[
    (1, "John Smith", Some("john@company.com"), Some(10), Some("Director of Engineering"), Some(220000), Some("2020-04-01"), "SF", "Leadership, Architecture", None),
    (2, "Alice Johnson", Some("alice@company.com"), Some(10), Some("Senior Software Engineer"), Some(165000), Some("2023-01-15"), "SF", "Python, React, SQL", Some("John Smith")),
    (3, "Bob Smith", Some("bob@company.com"), Some(10), Some("Python Developer"), Some(140000), Some("2024-03-20"), "SF", "Python, Django, PostgreSQL", Some("John Smith")),
    (4, "Carol White", Some("carol@company.com"), Some(20), Some("Marketing Manager"), Some(130000), Some("2022-06-10"), "NYC", "SEO, Content Strategy", Some("Dana Scott")),
    (5, "David Brown", Some("david@company.com"), Some(10), Some("Full Stack Engineer"), Some(150000), Some("2024-01-05"), "SF", "JavaScript, Python, MongoDB", Some("John Smith")),
    (6, "Eve Davis", Some("eve@company.com"), Some(30), Some("HR Specialist"), Some(95000), Some("2023-08-12"), "Austin", "Recruitment, Employee Relations", Some("Sarah Lee")),
    (7, "Grace Kim", Some("grace@company.com"), Some(40), Some("ML Engineer"), Some(180000), Some("2025-02-20"), "Remote", "Python, ML, NLP", Some("John Smith")),
    (8, "Henry Zhao", Some("henry@company.com"), Some(40), Some("Data Scientist"), Some(172000), Some("2025-03-05"), "Remote", "Python, Pandas, SQL", Some("John Smith")),
    (9, "Iris Patel", Some("iris@company.com"), Some(10), Some("Engineer"), Some(145000), Some("2024-07-01"), "SF", "Python, SQL", Some("John Smith")),
    (10, "Jack Lee", Some("jack@company.com"), Some(20), Some("Analyst"), Some(90000), Some("2023-03-10"), "NYC", "Excel, SEO", Some("Dana Scott")),
    // A second John, a duplicate full name, and a row with nothing but a name.
    (11, "John Johnson", Some("john.johnson@company.com"), Some(10), Some("Engineer"), Some(130000), Some("2024-09-01"), "SF", "Python", Some("John Smith")),
    (12, "John Smith", Some("john.smith2@company.com"), Some(20), Some("Analyst"), Some(90000), Some("2023-05-12"), "NYC", "Excel", Some("Dana Scott")),
    (13, "Empty Case", None, None, None, None, None, "", "", None),
];

/// What `seed_sample_database` wrote.
#[derive(Debug, Clone, Serialize)]
pub struct SeedSummary {
    pub path: PathBuf,
    pub departments: usize,
    pub employees: usize,
}

/// Create (or restore) the sample HR database behind `connection_string`.
///
/// The schema is the simplified dialect: `departments(dept_id, dept_name,
/// manager_id)` and `employees(emp_id, full_name, email, dept_id, ...)`.
/// Rows are upserted by primary key, so running it twice leaves the same
/// 4 departments and 13 employees; rows with other ids are left alone.
pub async fn seed_sample_database(connection_string: &str) -> Result<SeedSummary> {
    let path = match db::parse_target(connection_string)? {
        Target::File(path) => path,
        Target::Memory => bail!("cannot seed an in-memory database; use a sqlite file path"),
    };

    let pool = db::connect_store(&path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS departments (
            dept_id INTEGER PRIMARY KEY,
            dept_name TEXT NOT NULL,
            manager_id INTEGER
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS employees (
            emp_id INTEGER PRIMARY KEY,
            full_name TEXT NOT NULL,
            email TEXT,
            dept_id INTEGER,
            position TEXT,
            annual_salary INTEGER,
            join_date TEXT,
            office_location TEXT,
            skills TEXT,
            reports_to TEXT,
            FOREIGN KEY (dept_id) REFERENCES departments(dept_id)
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    for (id, name, manager) in DEPARTMENTS {
        sqlx::query(
            "INSERT OR REPLACE INTO departments (dept_id, dept_name, manager_id) VALUES (?, ?, ?)",
        )
        .bind(id)
        .bind(name)
        .bind(manager)
        .execute(&mut *tx)
        .await
        .context("departments table does not match the sample schema")?;
    }

    for (id, name, email, dept, position, salary, joined, office, skills, reports_to) in EMPLOYEES {
        sqlx::query(
            "INSERT OR REPLACE INTO employees (emp_id, full_name, email, dept_id, position, annual_salary, join_date, office_location, skills, reports_to)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(dept)
        .bind(position)
        .bind(salary)
        .bind(joined)
        .bind(office)
        .bind(skills)
        .bind(reports_to)
        .execute(&mut *tx)
        .await
        .context("employees table does not match the sample schema")?;
    }

    tx.commit().await?;
    pool.close().await;

    tracing::info!(
        path = %path.display(),
        departments = DEPARTMENTS.len(),
        employees = EMPLOYEES.len(),
        "seeded sample database"
    );
    Ok(SeedSummary {
        path,
        departments: DEPARTMENTS.len(),
        employees: EMPLOYEES.len(),
    })
}
