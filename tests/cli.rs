use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn qh_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("qh");
    path
}

/// Build the HR fixture with a throwaway runtime; the CLI tests themselves
/// are synchronous.
fn create_hr_db(path: &Path) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let pool = query_harness::db::connect_store(path).await.unwrap();
        for stmt in [
            "CREATE TABLE departments (dept_id INTEGER PRIMARY KEY, dept_name TEXT NOT NULL)",
            "CREATE TABLE employees (emp_id INTEGER PRIMARY KEY, full_name TEXT, email TEXT, dept_id INTEGER REFERENCES departments(dept_id), position TEXT, annual_salary REAL, join_date TEXT)",
            "INSERT INTO departments VALUES (1, 'Engineering'), (2, 'Sales')",
            "INSERT INTO employees VALUES (1, 'Ada Byron', 'ada@co.com', 1, 'Senior Developer', 120000, '2019-01-01')",
            "INSERT INTO employees VALUES (2, 'Alan Turing', 'alan@co.com', 1, 'Developer', 100000, '2021-05-01')",
            "INSERT INTO employees VALUES (3, 'Grace Hopper', 'grace@co.com', 2, 'Sales Manager', 90000, '2020-03-01')",
        ] {
            sqlx::query(stmt).execute(&pool).await.unwrap();
        }
        pool.close().await;
    });
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    create_hr_db(&root.join("hr.db"));

    let config_content = format!(
        r#"[engine]
default_connection = "sqlite:///{root}/hr.db"

[store]
path = "{root}/storage/ingestion.db"

[pool]
acquire_timeout_secs = 5

[server]
bind = "127.0.0.1:8765"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("qh.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_qh(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = qh_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run qh binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn run_json(config_path: &Path, args: &[&str]) -> Value {
    let (stdout, stderr, success) = run_qh(config_path, args);
    assert!(success, "qh {:?} failed: {}", args, stderr);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("qh {:?} printed invalid JSON ({}): {}", args, e, stdout))
}

#[test]
fn test_init_creates_store() {
    let (tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_qh(&config, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Ingestion store initialized"));
    assert!(tmp.path().join("storage/ingestion.db").exists());

    // Idempotent.
    let (_, stderr, success) = run_qh(&config, &["init"]);
    assert!(success, "second init failed: {}", stderr);
}

#[test]
fn test_query_count() {
    let (_tmp, config) = setup_test_env();
    let json = run_json(&config, &["query", "How many employees are in Engineering?"]);
    assert_eq!(json["type"], "sql");
    assert_eq!(json["rows"], json!([{"count": 2}]));
    assert_eq!(json["metrics"]["cache"], "miss");
}

#[test]
fn test_query_listing_with_page() {
    let (_tmp, config) = setup_test_env();
    let json = run_json(
        &config,
        &["query", "List all employees", "--limit", "2", "--offset", "1"],
    );
    let rows = json["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["full_name"], "Alan Turing");
    assert_eq!(rows[1]["department"], "Sales");
    assert_eq!(json["pagination"], json!({"limit": 2, "offset": 1, "total": 3}));
}

#[test]
fn test_query_explicit_connection() {
    let (tmp, config) = setup_test_env();
    let other = tmp.path().join("other.db");
    create_hr_db(&other);
    let cs = format!("sqlite:///{}", other.display());
    let json = run_json(
        &config,
        &["query", "how many employees are in sales", "--connection", &cs],
    );
    assert_eq!(json["rows"], json!([{"count": 1}]));
}

#[test]
fn test_seed_default_database_then_count() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("qh.toml");
    fs::write(
        &config,
        "[store]\npath = \"storage/ingestion.db\"\n\n[pool]\nacquire_timeout_secs = 5\n",
    )
    .unwrap();

    // The default connection is relative, so run from the temp dir.
    let run = |args: &[&str]| {
        let output = Command::new(qh_binary())
            .current_dir(tmp.path())
            .arg("--config")
            .arg(&config)
            .args(args)
            .output()
            .unwrap();
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        assert!(output.status.success(), "qh {:?} failed: {}", args, stderr);
        stdout
    };

    let stdout = run(&["seed"]);
    assert!(stdout.contains("Seeded 4 departments and 13 employees"), "{stdout}");
    assert!(tmp.path().join("example.db").exists());
    // Idempotent.
    run(&["seed"]);

    let stdout = run(&["query", "How many employees are in Engineering?"]);
    let json: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["type"], "sql");
    assert_eq!(json["rows"], json!([{"count": 6}]));

    let stdout = run(&["query", "List all employees"]);
    let json: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["pagination"]["total"], 13);
}

#[test]
fn test_seed_explicit_connection() {
    let (tmp, config) = setup_test_env();
    let cs = format!("sqlite:///{}", tmp.path().join("sample.db").display());
    let (stdout, stderr, success) = run_qh(&config, &["seed", &cs]);
    assert!(success, "seed failed: {}", stderr);
    assert!(stdout.contains("sample.db"));

    let json = run_json(
        &config,
        &["query", "how many employees are in engineering", "--connection", &cs],
    );
    assert_eq!(json["rows"], json!([{"count": 6}]));
}

#[test]
fn test_query_missing_entity() {
    let (_tmp, config) = setup_test_env();
    let json = run_json(&config, &["query", "List all contractors"]);
    assert_eq!(json["rows"], json!([]));
    assert_eq!(
        json["error"],
        "error: not present in your database (missing entity: 'contractors')"
    );
}

#[test]
fn test_document_query_without_store() {
    let (_tmp, config) = setup_test_env();
    let json = run_json(&config, &["query", "resume with Python skills"]);
    assert_eq!(json["type"], "document");
    assert_eq!(json["results"], json!([]));
}

#[test]
fn test_schema_lists_tables_and_foreign_keys() {
    let (_tmp, config) = setup_test_env();
    let json = run_json(&config, &["schema"]);
    assert_eq!(json["tables"], json!(["departments", "employees"]));
    let columns = json["columns"]["employees"].as_array().unwrap();
    assert!(columns.contains(&json!("full_name:TEXT")));
    assert!(columns.contains(&json!("annual_salary:REAL")));

    let rel = &json["relationships"][0];
    assert_eq!(rel["from_table"], "employees");
    assert_eq!(rel["from_columns"], json!(["dept_id"]));
    assert_eq!(rel["to_table"], "departments");
}

#[test]
fn test_schema_missing_file_fails() {
    let (tmp, config) = setup_test_env();
    let cs = format!("sqlite:///{}/nope.db", tmp.path().display());
    let (_, stderr, success) = run_qh(&config, &["schema", &cs]);
    assert!(!success);
    assert!(stderr.contains("SQLite database file not found"));
}

#[test]
fn test_job_not_found() {
    let (_tmp, config) = setup_test_env();
    run_qh(&config, &["init"]);
    let json = run_json(&config, &["job", "does-not-exist"]);
    assert_eq!(json, json!({"job_id": "does-not-exist", "status": "not_found"}));
}

#[test]
fn test_metrics_on_empty_store() {
    let (_tmp, config) = setup_test_env();
    run_qh(&config, &["init"]);
    let (stdout, stderr, success) = run_qh(&config, &["metrics"]);
    assert!(success, "metrics failed: {}", stderr);
    assert!(stdout.contains("Indexed documents: 0"));
    assert!(stdout.contains("Indexed chunks:    0"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("bad.toml");
    fs::write(&bad, "[embedding]\nprovider = \"carrier-pigeon\"\n").unwrap();
    let (_, stderr, success) = run_qh(&bad, &["query", "How many employees?"]);
    assert!(!success);
    assert!(stderr.contains("Unknown embedding provider"));
}
