//! Schema dialect resolution.
//!
//! The app crate inspects a live database into a [`TableCatalog`]; this
//! module maps that catalog onto one of the known naming dialects and
//! produces an immutable [`SchemaMapping`]. Resolution never fails: an
//! unrecognised catalog falls back to the canonical dialect.
//!
//! | Dialect    | Employee table | Id          | Name            | Salary          | Hire date    | Department ref  | Department table                  |
//! |------------|----------------|-------------|-----------------|-----------------|--------------|-----------------|-----------------------------------|
//! | Simplified | `employees`    | `emp_id`    | `full_name`     | `annual_salary` | `join_date`  | `dept_id`       | `departments(dept_id, dept_name)` |
//! | Canonical  | `employees`    | `id`        | `name`          | `salary`        | `hire_date`  | `department_id` | `departments(id, name)`           |
//! | Staff      | `staff`        | `id`        | `name`          | `compensation`  | `hired_on`   | `department`    | none                              |
//! | Personnel  | `personnel`    | `person_id` | `employee_name` | `pay_rate`      | `start_date` | `division`      | `divisions(division_code, division_name)` |

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Table name to column names, as inspected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableCatalog {
    tables: BTreeMap<String, BTreeSet<String>>,
}

impl TableCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<I, S>(&mut self, table: impl Into<String>, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables
            .insert(table.into(), columns.into_iter().map(Into::into).collect());
    }

    /// Builder form of [`insert`](Self::insert), handy in tests.
    pub fn with_table<I, S>(mut self, table: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(table, columns);
        self
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|cols| cols.contains(column))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Simplified,
    Canonical,
    Staff,
    Personnel,
}

/// Physical employee columns. Optional entries are `Some` only when the
/// column exists in the inspected table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmployeeColumns {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub position: Option<String>,
    pub salary: String,
    pub hire_date: Option<String>,
    pub skills: Option<String>,
    pub department_ref: String,
    pub reports_to: Option<String>,
}

/// A department table together with its key and label columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepartmentMapping {
    pub table: String,
    pub id: String,
    pub name: String,
    pub manager: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaMapping {
    pub dialect: Dialect,
    /// Every table present in the inspected database.
    pub tables: BTreeSet<String>,
    pub employee_table: String,
    pub employee: EmployeeColumns,
    pub department: Option<DepartmentMapping>,
}

impl SchemaMapping {
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains(table)
    }
}

/// Column names a dialect expects, before presence checks.
struct Layout {
    dialect: Dialect,
    table: &'static str,
    id: &'static str,
    name: &'static str,
    position: &'static str,
    salary: &'static str,
    hire_date: &'static str,
    department_ref: &'static str,
    department: Option<(&'static str, &'static str, &'static str)>,
}

const SIMPLIFIED: Layout = Layout {
    dialect: Dialect::Simplified,
    table: "employees",
    id: "emp_id",
    name: "full_name",
    position: "position",
    salary: "annual_salary",
    hire_date: "join_date",
    department_ref: "dept_id",
    department: Some(("departments", "dept_id", "dept_name")),
};

const CANONICAL: Layout = Layout {
    dialect: Dialect::Canonical,
    table: "employees",
    id: "id",
    name: "name",
    position: "position",
    salary: "salary",
    hire_date: "hire_date",
    department_ref: "department_id",
    department: Some(("departments", "id", "name")),
};

const STAFF: Layout = Layout {
    dialect: Dialect::Staff,
    table: "staff",
    id: "id",
    name: "name",
    position: "role",
    salary: "compensation",
    hire_date: "hired_on",
    department_ref: "department",
    department: None,
};

const PERSONNEL: Layout = Layout {
    dialect: Dialect::Personnel,
    table: "personnel",
    id: "person_id",
    name: "employee_name",
    position: "title",
    salary: "pay_rate",
    hire_date: "start_date",
    department_ref: "division",
    department: Some(("divisions", "division_code", "division_name")),
};

const SIMPLIFIED_MARKERS: [&str; 4] = ["emp_id", "full_name", "dept_id", "join_date"];

/// Pick the dialect for `catalog` and resolve its columns.
pub fn resolve_mapping(catalog: &TableCatalog) -> SchemaMapping {
    let layout = if catalog.has_table("employees") {
        if SIMPLIFIED_MARKERS
            .iter()
            .all(|c| catalog.has_column("employees", c))
        {
            &SIMPLIFIED
        } else {
            &CANONICAL
        }
    } else if catalog.has_table("staff") {
        &STAFF
    } else if catalog.has_table("personnel") {
        &PERSONNEL
    } else {
        return assumed_canonical(catalog);
    };
    apply_layout(layout, catalog)
}

fn apply_layout(layout: &Layout, catalog: &TableCatalog) -> SchemaMapping {
    let present = |column: &str| {
        catalog
            .has_column(layout.table, column)
            .then(|| column.to_string())
    };

    let department = layout.department.and_then(|(table, id, name)| {
        (catalog.has_column(table, id) && catalog.has_column(table, name)).then(|| {
            DepartmentMapping {
                table: table.to_string(),
                id: id.to_string(),
                name: name.to_string(),
                manager: catalog
                    .has_column(table, "manager_id")
                    .then(|| "manager_id".to_string()),
            }
        })
    });

    SchemaMapping {
        dialect: layout.dialect,
        tables: catalog.table_names().map(str::to_string).collect(),
        employee_table: layout.table.to_string(),
        employee: EmployeeColumns {
            id: layout.id.to_string(),
            name: layout.name.to_string(),
            email: present("email"),
            position: present(layout.position),
            salary: layout.salary.to_string(),
            hire_date: present(layout.hire_date),
            skills: present("skills"),
            department_ref: layout.department_ref.to_string(),
            reports_to: present("reports_to"),
        },
        department,
    }
}

/// Fallback when no known table exists: canonical names, all assumed.
fn assumed_canonical(catalog: &TableCatalog) -> SchemaMapping {
    SchemaMapping {
        dialect: Dialect::Canonical,
        tables: catalog.table_names().map(str::to_string).collect(),
        employee_table: CANONICAL.table.to_string(),
        employee: EmployeeColumns {
            id: "id".to_string(),
            name: "name".to_string(),
            email: Some("email".to_string()),
            position: Some("position".to_string()),
            salary: "salary".to_string(),
            hire_date: Some("hire_date".to_string()),
            skills: Some("skills".to_string()),
            department_ref: "department_id".to_string(),
            reports_to: Some("reports_to".to_string()),
        },
        department: Some(DepartmentMapping {
            table: "departments".to_string(),
            id: "id".to_string(),
            name: "name".to_string(),
            manager: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simplified_dialect() {
        let catalog = TableCatalog::new()
            .with_table(
                "employees",
                [
                    "emp_id",
                    "full_name",
                    "email",
                    "dept_id",
                    "position",
                    "annual_salary",
                    "join_date",
                    "skills",
                    "reports_to",
                ],
            )
            .with_table("departments", ["dept_id", "dept_name", "manager_id"]);
        let m = resolve_mapping(&catalog);
        assert_eq!(m.dialect, Dialect::Simplified);
        assert_eq!(m.employee.id, "emp_id");
        assert_eq!(m.employee.salary, "annual_salary");
        assert_eq!(m.employee.email.as_deref(), Some("email"));
        assert_eq!(m.employee.hire_date.as_deref(), Some("join_date"));
        let dept = m.department.unwrap();
        assert_eq!(dept.table, "departments");
        assert_eq!(dept.name, "dept_name");
        assert_eq!(dept.manager.as_deref(), Some("manager_id"));
    }

    #[test]
    fn test_simplified_without_optional_columns() {
        let catalog = TableCatalog::new().with_table(
            "employees",
            ["emp_id", "full_name", "dept_id", "join_date", "annual_salary"],
        );
        let m = resolve_mapping(&catalog);
        assert_eq!(m.dialect, Dialect::Simplified);
        assert_eq!(m.employee.email, None);
        assert_eq!(m.employee.skills, None);
        assert_eq!(m.employee.reports_to, None);
        assert_eq!(m.employee.position, None);
        assert_eq!(m.department, None);
    }

    #[test]
    fn test_canonical_dialect() {
        let catalog = TableCatalog::new()
            .with_table(
                "employees",
                ["id", "name", "email", "position", "salary", "hire_date", "department_id"],
            )
            .with_table("departments", ["id", "name"]);
        let m = resolve_mapping(&catalog);
        assert_eq!(m.dialect, Dialect::Canonical);
        assert_eq!(m.employee.department_ref, "department_id");
        assert_eq!(m.employee.skills, None);
        assert_eq!(m.department.unwrap().id, "id");
    }

    #[test]
    fn test_staff_dialect_has_no_department_table() {
        let catalog = TableCatalog::new().with_table(
            "staff",
            ["id", "name", "role", "compensation", "hired_on", "department", "skills"],
        );
        let m = resolve_mapping(&catalog);
        assert_eq!(m.dialect, Dialect::Staff);
        assert_eq!(m.employee_table, "staff");
        assert_eq!(m.employee.position.as_deref(), Some("role"));
        assert_eq!(m.employee.skills.as_deref(), Some("skills"));
        assert_eq!(m.employee.email, None);
        assert!(m.department.is_none());
    }

    #[test]
    fn test_personnel_dialect() {
        let catalog = TableCatalog::new()
            .with_table(
                "personnel",
                ["person_id", "employee_name", "title", "pay_rate", "start_date", "division"],
            )
            .with_table("divisions", ["division_code", "division_name"]);
        let m = resolve_mapping(&catalog);
        assert_eq!(m.dialect, Dialect::Personnel);
        assert_eq!(m.employee.name, "employee_name");
        let dept = m.department.unwrap();
        assert_eq!(dept.table, "divisions");
        assert_eq!(dept.id, "division_code");
    }

    #[test]
    fn test_staff_wins_over_personnel() {
        let catalog = TableCatalog::new()
            .with_table("staff", ["id", "name"])
            .with_table("personnel", ["person_id"]);
        assert_eq!(resolve_mapping(&catalog).dialect, Dialect::Staff);
    }

    #[test]
    fn test_unknown_catalog_falls_back() {
        let catalog = TableCatalog::new().with_table("widgets", ["id"]);
        let m = resolve_mapping(&catalog);
        assert_eq!(m.dialect, Dialect::Canonical);
        assert_eq!(m.employee_table, "employees");
        assert!(m.has_table("widgets"));
        assert!(!m.has_table("employees"));
    }
}
