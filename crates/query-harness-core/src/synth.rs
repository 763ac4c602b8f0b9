//! SQL synthesis from intent, filters and a resolved schema mapping.
//!
//! Every [`Filter`] is resolved once into a `Predicate<ColumnRef>` whose
//! columns come from the [`SchemaMapping`]; identifiers are quoted and
//! literals are only ever rendered as numbered `?N` placeholders. Each
//! statement gets its own placeholder numbering, so the main statement and
//! its companion count statement can be executed independently.

use std::collections::BTreeMap;
use std::fmt;

use crate::envelope::ParamValue;
use crate::filters::{Field, Filter, MissingColumn, Predicate, PredicateSet, YearValue};
use crate::intent::{self, Intent};
use crate::patterns::{self, pattern};
use crate::schema::SchemaMapping;

pattern!(ENTITY, r"\b(contractors|vendors?|interns?|projects?)\b");
pattern!(DEPARTMENT_WORD, r"\bdepartments?\b");
pattern!(EMPLOYEE_WORD, r"\bemployees?\b");

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthesisError {
    #[error("error: not present in your database (missing entity: '{0}')")]
    MissingEntity(String),
    #[error("{0}")]
    MissingColumn(String),
    #[error("{warning}")]
    Unsupported { warning: String },
    #[error("parameter '{0}' is referenced but never bound")]
    UnboundParameter(String),
}

/// A rendered statement and its values, in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub binds: Vec<(String, ParamValue)>,
}

impl Statement {
    /// Bound values by name, as reported in the result envelope.
    pub fn params(&self) -> BTreeMap<String, ParamValue> {
        self.binds.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub statement: Statement,
    /// `SELECT COUNT(1) AS total` over the unpaginated rows.
    pub count_statement: Option<Statement>,
    pub window: Option<PageWindow>,
}

/// Inputs for one synthesis call.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    /// Normalized question text.
    pub text: &'a str,
    pub mapping: &'a SchemaMapping,
    pub predicates: &'a PredicateSet,
    pub intent: Intent,
    pub limit: i64,
    pub offset: i64,
}

/// A column qualified by its table alias, rendered quoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    alias: &'static str,
    column: String,
}

impl ColumnRef {
    fn new(alias: &'static str, column: &str) -> Self {
        Self {
            alias,
            column: column.to_string(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.alias, quote(&self.column))
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Resolved predicate, ready to render.
type Condition = Predicate<ColumnRef>;

/// Hands out `?N` placeholders, reusing the number of a repeated name.
struct Binder<'p> {
    params: &'p BTreeMap<String, ParamValue>,
    order: Vec<String>,
}

impl<'p> Binder<'p> {
    fn new(params: &'p BTreeMap<String, ParamValue>) -> Self {
        Self {
            params,
            order: Vec::new(),
        }
    }

    fn slot(&mut self, name: &str) -> String {
        let idx = match self.order.iter().position(|n| n == name) {
            Some(i) => i,
            None => {
                self.order.push(name.to_string());
                self.order.len() - 1
            }
        };
        format!("?{}", idx + 1)
    }

    fn finish(self, sql: String) -> Result<Statement, SynthesisError> {
        let binds = self
            .order
            .into_iter()
            .map(|name| match self.params.get(&name) {
                Some(v) => Ok((name, v.clone())),
                None => Err(SynthesisError::UnboundParameter(name)),
            })
            .collect::<Result<_, _>>()?;
        Ok(Statement { sql, binds })
    }
}

fn render(cond: &Condition, b: &mut Binder) -> String {
    match cond {
        Predicate::Year { column, op, value } => {
            let rhs = match value {
                YearValue::CurrentYear => "strftime('%Y', 'now')".to_string(),
                YearValue::Param(name) => b.slot(name),
            };
            format!("strftime('%Y', {column}) {} {rhs}", op.as_sql())
        }
        Predicate::YearBetween { column, low, high } => format!(
            "strftime('%Y', {column}) BETWEEN {} AND {}",
            b.slot(low),
            b.slot(high)
        ),
        Predicate::Like { column, param } => format!("{column} LIKE {}", b.slot(param)),
        Predicate::Equals { column, param } => format!("{column} = {}", b.slot(param)),
        Predicate::EqualsIgnoreCase { column, param } => {
            format!("lower({column}) = lower({})", b.slot(param))
        }
        Predicate::Missing { column, blank: true } => {
            format!("({column} IS NULL OR {column} = '')")
        }
        Predicate::Missing { column, blank: false } => format!("{column} IS NULL"),
        Predicate::AnyOf(branches) if branches.is_empty() => "1=0".to_string(),
        Predicate::AnyOf(branches) => {
            let parts: Vec<String> = branches.iter().map(|br| render(br, b)).collect();
            format!("({})", parts.join(" OR "))
        }
        Predicate::Never => "1=0".to_string(),
    }
}

/// ` WHERE a AND b`, or empty. `extra` conditions come first.
fn where_clause(extra: &[String], conditions: &[Condition], b: &mut Binder) -> String {
    let mut parts: Vec<String> = extra.to_vec();
    parts.extend(conditions.iter().map(|c| render(c, b)));
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn resolve_field(field: Field, m: &SchemaMapping) -> Option<ColumnRef> {
    let e = &m.employee;
    let col = |name: &str| Some(ColumnRef::new("e", name));
    match field {
        Field::Id => col(&e.id),
        Field::Name => col(&e.name),
        Field::Salary => col(&e.salary),
        Field::DepartmentRef => col(&e.department_ref),
        Field::Email => e.email.as_deref().and_then(col),
        Field::Position => e.position.as_deref().and_then(col),
        Field::HireDate => e.hire_date.as_deref().and_then(col),
        Field::Skills => e.skills.as_deref().and_then(col),
        Field::ReportsTo => e.reports_to.as_deref().and_then(col),
        Field::DepartmentName => match &m.department {
            Some(d) => Some(ColumnRef::new("d", &d.name)),
            None => col(&e.department_ref),
        },
    }
}

/// Resolve one filter, applying its missing-column policy.
fn resolve_filter(filter: &Filter, m: &SchemaMapping) -> Result<Condition, SynthesisError> {
    let mut resolve = |f: Field| resolve_field(f, m).ok_or(f);
    let missing = match filter.predicate.clone().try_map(&mut resolve) {
        Ok(cond) => return Ok(cond),
        Err(field) => field,
    };
    tracing::debug!(?missing, policy = ?filter.on_missing, "filter field has no column");

    match &filter.on_missing {
        MissingColumn::Never => Ok(Predicate::Never),
        MissingColumn::DropBranch => match &filter.predicate {
            Predicate::AnyOf(branches) => {
                let kept: Vec<Condition> = branches
                    .iter()
                    .filter_map(|br| br.clone().try_map(&mut resolve).ok())
                    .collect();
                Ok(if kept.is_empty() {
                    Predicate::Never
                } else {
                    Predicate::AnyOf(kept)
                })
            }
            _ => Ok(Predicate::Never),
        },
        MissingColumn::Warn(warning) => Err(SynthesisError::Unsupported {
            warning: warning.clone(),
        }),
        MissingColumn::Fail(message) => Err(SynthesisError::MissingColumn(message.clone())),
    }
}

fn resolve_all<'f>(
    filters: impl IntoIterator<Item = &'f Filter>,
    m: &SchemaMapping,
) -> Result<Vec<Condition>, SynthesisError> {
    filters.into_iter().map(|f| resolve_filter(f, m)).collect()
}

/// Refuse questions about entities the database does not have.
fn check_entities(text: &str, m: &SchemaMapping) -> Result<(), SynthesisError> {
    for caps in patterns::captures_iter(&ENTITY, text) {
        let table = match &caps[1] {
            "vendor" | "vendors" => "vendors",
            "intern" | "interns" => "interns",
            "project" | "projects" => "projects",
            _ => "contractors",
        };
        if !m.has_table(table) {
            return Err(SynthesisError::MissingEntity(table.to_string()));
        }
    }
    Ok(())
}

/// Build the statement(s) for a question.
pub fn synthesize(req: &SynthesisRequest<'_>) -> Result<Synthesis, SynthesisError> {
    check_entities(req.text, req.mapping)?;

    let window = PageWindow {
        limit: req.limit.max(1),
        offset: req.offset.max(0),
    };

    let department_only = patterns::is_match(&DEPARTMENT_WORD, req.text)
        && !patterns::is_match(&EMPLOYEE_WORD, req.text);

    let shape = Shape::new(req.mapping);
    match req.intent {
        Intent::AverageByDepartment => shape.average_by_department(req),
        Intent::TopPerDepartment => shape.top_per_department(req),
        Intent::Count if department_only => shape.departments(req, None),
        Intent::Listing if department_only => shape.departments(req, Some(window)),
        Intent::FindOne if department_only => shape.departments(req, Some(find_one())),
        Intent::Count => shape.employees(req, None),
        Intent::Listing => shape.employees(req, Some(window)),
        Intent::FindOne => shape.employees(req, Some(find_one())),
    }
}

fn find_one() -> PageWindow {
    PageWindow {
        limit: 1,
        offset: 0,
    }
}

/// Quoted identifiers and reusable fragments for one mapping.
struct Shape<'m> {
    m: &'m SchemaMapping,
    table: String,
    id: ColumnRef,
    department_label: String,
    department_join: String,
}

impl<'m> Shape<'m> {
    fn new(m: &'m SchemaMapping) -> Self {
        let e = &m.employee;
        let dept_ref = ColumnRef::new("e", &e.department_ref);
        let (department_label, department_join) = match &m.department {
            Some(d) => (
                ColumnRef::new("d", &d.name).to_string(),
                format!(
                    " LEFT JOIN {} d ON {dept_ref} = {}",
                    quote(&d.table),
                    ColumnRef::new("d", &d.id)
                ),
            ),
            None => (dept_ref.to_string(), String::new()),
        };
        Self {
            m,
            table: quote(&m.employee_table),
            id: ColumnRef::new("e", &e.id),
            department_label,
            department_join,
        }
    }

    fn col(&self, name: &str) -> ColumnRef {
        ColumnRef::new("e", name)
    }

    /// `WITH latest AS (...) ` keeping the max-id row per email, plus the
    /// join that applies it. Both empty without an email column.
    fn dedup(&self) -> (String, String) {
        match &self.m.employee.email {
            Some(email) => (
                format!(
                    "WITH latest AS (SELECT {email} AS email, MAX({id}) AS max_id FROM {table} GROUP BY {email}) ",
                    email = quote(email),
                    id = quote(&self.m.employee.id),
                    table = self.table,
                ),
                format!(" JOIN latest l ON l.max_id = {}", self.id),
            ),
            None => (String::new(), String::new()),
        }
    }

    fn employees(
        &self,
        req: &SynthesisRequest<'_>,
        window: Option<PageWindow>,
    ) -> Result<Synthesis, SynthesisError> {
        let conditions = resolve_all(&req.predicates.filters, self.m)?;
        let (cte, dedup_join) = self.dedup();
        let source = Source {
            cte,
            select: format!(
                "SELECT e.*, {} AS department FROM {} e{dedup_join}{}",
                self.department_label, self.table, self.department_join
            ),
            extra: Vec::new(),
            order_by: self.id.to_string(),
        };
        paginate(req, &source, &conditions, window)
    }

    fn average_by_department(&self, req: &SynthesisRequest<'_>) -> Result<Synthesis, SynthesisError> {
        let conditions = resolve_all(&req.predicates.filters, self.m)?;
        let params = params(req, &[]);
        let mut b = Binder::new(&params);
        let sql = format!(
            "SELECT {label} AS department, AVG({salary}) AS avg_salary FROM {table} e{join}{filter} GROUP BY {label} ORDER BY avg_salary DESC",
            label = self.department_label,
            salary = self.col(&self.m.employee.salary),
            table = self.table,
            join = self.department_join,
            filter = where_clause(&[], &conditions, &mut b),
        );
        Ok(Synthesis {
            statement: b.finish(sql)?,
            count_statement: None,
            window: None,
        })
    }

    fn top_per_department(&self, req: &SynthesisRequest<'_>) -> Result<Synthesis, SynthesisError> {
        let conditions = resolve_all(&req.predicates.filters, self.m)?;
        let params = params(req, &[("topn", intent::top_n(req.text))]);
        let mut b = Binder::new(&params);
        let salary = self.col(&self.m.employee.salary);
        let ranked = format!(
            "SELECT {id} AS id, {name} AS name, {salary} AS salary, {label} AS department, \
             ROW_NUMBER() OVER (PARTITION BY {label} ORDER BY {salary} DESC) AS rn \
             FROM {table} e{join}{filter}",
            id = self.id,
            name = self.col(&self.m.employee.name),
            label = self.department_label,
            table = self.table,
            join = self.department_join,
            filter = where_clause(&[], &conditions, &mut b),
        );
        let sql = format!(
            "SELECT * FROM ({ranked}) z WHERE z.rn <= {} ORDER BY z.department, z.salary DESC",
            b.slot("topn")
        );
        Ok(Synthesis {
            statement: b.finish(sql)?,
            count_statement: None,
            window: None,
        })
    }

    /// Questions about departments rather than employees. Only
    /// department-name filters apply here.
    fn departments(
        &self,
        req: &SynthesisRequest<'_>,
        window: Option<PageWindow>,
    ) -> Result<Synthesis, SynthesisError> {
        let conditions = resolve_all(
            req.predicates
                .filters
                .iter()
                .filter(|f| f.references(Field::DepartmentName)),
            self.m,
        )?;

        let source = match &self.m.department {
            Some(d) => {
                let id = ColumnRef::new("d", &d.id);
                let mut cols = format!(
                    "{id} AS dept_id, {} AS dept_name",
                    ColumnRef::new("d", &d.name)
                );
                if let Some(manager) = &d.manager {
                    cols.push_str(&format!(", {}", ColumnRef::new("d", manager)));
                }
                Source {
                    cte: String::new(),
                    select: format!("SELECT {cols} FROM {} d", quote(&d.table)),
                    extra: Vec::new(),
                    order_by: id.to_string(),
                }
            }
            // No department table: distinct references on the employee table.
            None => {
                let dept_ref = self.col(&self.m.employee.department_ref);
                Source {
                    cte: String::new(),
                    select: format!(
                        "SELECT DISTINCT {dept_ref} AS department FROM {} e",
                        self.table
                    ),
                    extra: vec![format!("{dept_ref} IS NOT NULL")],
                    order_by: "department".to_string(),
                }
            }
        };
        paginate(req, &source, &conditions, window)
    }
}

/// A filterable row source: optional CTE, `SELECT ... FROM ...` head,
/// fixed conditions and the listing order column.
struct Source {
    cte: String,
    select: String,
    extra: Vec<String>,
    order_by: String,
}

fn params(req: &SynthesisRequest<'_>, extra: &[(&str, i64)]) -> BTreeMap<String, ParamValue> {
    let mut params = req.predicates.params.clone();
    for (name, value) in extra {
        params.insert(name.to_string(), ParamValue::Int(*value));
    }
    params
}

/// Without a window: `SELECT COUNT(1) AS count` over the filtered source.
/// With one: the ordered page plus a `COUNT(1) AS total` companion.
fn paginate(
    req: &SynthesisRequest<'_>,
    source: &Source,
    conditions: &[Condition],
    window: Option<PageWindow>,
) -> Result<Synthesis, SynthesisError> {
    let Source {
        cte,
        select,
        extra,
        order_by,
    } = source;

    let Some(window) = window else {
        let params = params(req, &[]);
        let mut b = Binder::new(&params);
        let filter = where_clause(extra, conditions, &mut b);
        let sql = format!("{cte}SELECT COUNT(1) AS count FROM ({select}{filter}) t");
        return Ok(Synthesis {
            statement: b.finish(sql)?,
            count_statement: None,
            window: None,
        });
    };

    let params = params(req, &[("limit", window.limit), ("offset", window.offset)]);
    let mut b = Binder::new(&params);
    let filter = where_clause(extra, conditions, &mut b);
    let sql = format!(
        "{cte}{select}{filter} ORDER BY {order_by} ASC LIMIT {} OFFSET {}",
        b.slot("limit"),
        b.slot("offset")
    );
    let statement = b.finish(sql)?;

    let mut cb = Binder::new(&params);
    let filter = where_clause(extra, conditions, &mut cb);
    let count_sql = format!("{cte}SELECT COUNT(1) AS total FROM ({select}{filter}) t");
    Ok(Synthesis {
        statement,
        count_statement: Some(cb.finish(count_sql)?),
        window: Some(window),
    })
}
