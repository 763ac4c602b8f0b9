//! Filter extraction from normalized question text.
//!
//! [`normalize`] lower-cases a question and rewrites a small synonym table.
//! [`extract`] then recognises each filter category independently and
//! returns a [`PredicateSet`]: typed [`Predicate`]s over abstract [`Field`]s
//! plus the named literal parameters they bind. No physical column name
//! appears here; the synthesizer resolves fields against a
//! [`SchemaMapping`](crate::schema::SchemaMapping) and applies each filter's
//! [`MissingColumn`] policy when a field has no backing column.
//!
//! All categories are AND-combined. OR only occurs inside one filter (a skill
//! keyword matched against skills or position, several position keywords).

use std::collections::{BTreeMap, BTreeSet};

use crate::envelope::ParamValue;
use crate::patterns::{self, pattern};

pattern!(SYNONYM, r"\b(dept|division|compensation|pay|staff|emp|departements)\b");

pattern!(THIS_YEAR, r"\bthis year\b");
pattern!(HIRED_IN, r"hired\s+(?:in|on)\s+(\d{4})");
pattern!(HIRED_AFTER, r"hired\s+(?:after|since)\s+(\d{4})");
pattern!(HIRED_BEFORE, r"hired\s+before\s+(\d{4})");
pattern!(HIRED_BETWEEN, r"hired\s+between\s+(\d{4})\s+and\s+(\d{4})");

pattern!(SKILL, r"\b(python|java|javascript|sql|nlp|ml|react|django|postgresql)\b");
pattern!(REPORTS_TO, r#"reports\s+to\s+['"]?([a-z]+\s+[a-z]+)['"]?"#);
pattern!(EMP_ID, r"\bemp_id\s*[:=]?\s*(\d+)\b");
pattern!(ID, r"\bid\s*[:=]?\s*(\d+)\b");
pattern!(EMAIL, r"([a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,})");

pattern!(MISSING_EMAIL, r"\b(?:no|missing|empty)\s+emails?\b|\bwithout\s+emails?\b");
pattern!(MISSING_NAME, r"\b(?:no|missing|empty)\s+names?\b|\bwithout\s+names?\b");
pattern!(MISSING_SKILLS, r"\b(?:no|missing|empty)\s+skills?\b|\bwithout\s+skills?\b");
pattern!(
    MISSING_DEPARTMENT,
    r"\b(?:no|missing|empty)\s+departments?\b|\bwithout\s+(?:a\s+)?departments?\b"
);
pattern!(
    MISSING_POSITION,
    r"\b(?:no|missing|empty)\s+positions?\b|\bwithout\s+(?:a\s+)?positions?\b"
);
pattern!(MISSING_SALARY, r"\b(?:no|missing|empty)\s+salary\b|\bwithout\s+(?:a\s+)?salary\b");
pattern!(
    MISSING_HIRE_DATE,
    r"\b(?:no|missing|empty)\s+(?:hire|join)\s+date\b|\bwithout\s+(?:a\s+)?(?:hire|join)\s+date\b"
);
pattern!(
    MISSING_REPORTS_TO,
    r"\b(?:no|missing|empty)\s+reports?\s*to\b|\bwithout\s+(?:a\s+)?manager\b|\bwithout\s+reports?\s*to\b"
);

pattern!(DEPARTMENT_IS, r#"department\s+(?:is\s+)?['"]?([a-z]+)['"]?"#);
pattern!(IN_PLACE, r#"\b(?:in|from)\s+(?:the\s+)?['"]?([a-z]+)['"]?"#);
pattern!(
    NOT_A_DEPARTMENT,
    r#"\b(?:experience|experienced|skilled|skills?|expertise|expert|proficient|proficiency|fluent|certified|trained|background|knowledge|degree|interested|based|located|living|office|hired|joined|started)\s+(?:in|with|from)\s+(?:the\s+)?['"]?([a-z]+)['"]?"#
);
pattern!(
    POSITION,
    r"\b(senior|junior|developers?|engineers?|managers?|full\s*stack|marketing|hr)\b"
);
pattern!(
    NAME,
    r#"\b(?:show\s+me|find|employee(?:\s+named)?)\s+['"]?([a-z]+(?:\s+[a-z]+)?)['"]?"#
);

/// Words that never start (or continue) a person or department name.
const RESERVED: &[&str] = &[
    "a", "all", "an", "and", "any", "are", "at", "by", "company", "data", "database", "department",
    "departments", "details", "do", "does", "each", "email", "employee", "employees", "every",
    "everyone", "for", "from", "had", "has", "have", "hired", "how", "id", "in", "info", "is",
    "list", "many", "me", "missing", "my", "named", "no", "of", "on", "or", "our", "people",
    "per", "records", "reports", "salary", "that", "the", "their", "them", "there", "this", "to",
    "top", "total", "was", "were", "what", "which", "who", "whose", "with", "without", "works",
    "year", "years",
];

/// Calendar words that follow "in" without naming a department.
const TIME_WORDS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december", "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep",
    "sept", "oct", "nov", "dec", "spring", "summer", "autumn", "fall", "winter", "month",
    "months", "week", "weeks", "quarter", "today", "past", "last", "recent", "recently", "future",
    "general", "particular", "charge", "person", "office", "house",
];

fn is_reserved(word: &str) -> bool {
    RESERVED.contains(&word)
        || patterns::is_match(&SKILL, word)
        || patterns::is_match(&POSITION, word)
}

/// Lower-case and rewrite synonyms (`dept`/`division` → `department`,
/// `compensation`/`pay` → `salary`, `staff`/`emp` → `employees`,
/// `departements` → `departments`).
pub fn normalize(query: &str) -> String {
    let lowered = query.to_lowercase();
    let Some(re) = SYNONYM.as_ref() else {
        return lowered;
    };
    re.replace_all(&lowered, |caps: &regex::Captures| {
        match &caps[1] {
            "dept" | "division" => "department",
            "compensation" | "pay" => "salary",
            "staff" | "emp" => "employees",
            _ => "departments",
        }
        .to_string()
    })
    .into_owned()
}

/// Abstract employee attributes, resolved to physical columns later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Id,
    Name,
    Email,
    Position,
    Salary,
    HireDate,
    Skills,
    DepartmentRef,
    /// Label of the employee's department: the department table's name
    /// column, or the raw reference when there is no department table.
    DepartmentName,
    ReportsTo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gt,
    Lt,
}

impl Comparison {
    pub fn as_sql(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Gt => ">",
            Comparison::Lt => "<",
        }
    }
}

/// Right-hand side of a year comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YearValue {
    Param(String),
    CurrentYear,
}

/// Boolean condition over columns of type `C`.
///
/// Extraction produces `Predicate<Field>`; the synthesizer maps every field
/// to a concrete column reference and renders the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate<C = Field> {
    /// `strftime('%Y', column) <op> year`
    Year {
        column: C,
        op: Comparison,
        value: YearValue,
    },
    YearBetween {
        column: C,
        low: String,
        high: String,
    },
    Like {
        column: C,
        param: String,
    },
    Equals {
        column: C,
        param: String,
    },
    EqualsIgnoreCase {
        column: C,
        param: String,
    },
    /// `column IS NULL`, plus `OR column = ''` when `blank` is set.
    Missing {
        column: C,
        blank: bool,
    },
    AnyOf(Vec<Predicate<C>>),
    /// Matches nothing.
    Never,
}

impl<C> Predicate<C> {
    /// Replace every column with `f(column)`, stopping at the first error.
    pub fn try_map<D, E>(
        self,
        f: &mut impl FnMut(C) -> Result<D, E>,
    ) -> Result<Predicate<D>, E> {
        Ok(match self {
            Predicate::Year { column, op, value } => Predicate::Year {
                column: f(column)?,
                op,
                value,
            },
            Predicate::YearBetween { column, low, high } => Predicate::YearBetween {
                column: f(column)?,
                low,
                high,
            },
            Predicate::Like { column, param } => Predicate::Like {
                column: f(column)?,
                param,
            },
            Predicate::Equals { column, param } => Predicate::Equals {
                column: f(column)?,
                param,
            },
            Predicate::EqualsIgnoreCase { column, param } => Predicate::EqualsIgnoreCase {
                column: f(column)?,
                param,
            },
            Predicate::Missing { column, blank } => Predicate::Missing {
                column: f(column)?,
                blank,
            },
            Predicate::AnyOf(branches) => Predicate::AnyOf(
                branches
                    .into_iter()
                    .map(|b| b.try_map(f))
                    .collect::<Result<_, _>>()?,
            ),
            Predicate::Never => Predicate::Never,
        })
    }

    /// Every column referenced, in order.
    pub fn columns(&self) -> Vec<&C> {
        match self {
            Predicate::Year { column, .. }
            | Predicate::YearBetween { column, .. }
            | Predicate::Like { column, .. }
            | Predicate::Equals { column, .. }
            | Predicate::EqualsIgnoreCase { column, .. }
            | Predicate::Missing { column, .. } => vec![column],
            Predicate::AnyOf(branches) => branches.iter().flat_map(|b| b.columns()).collect(),
            Predicate::Never => Vec::new(),
        }
    }
}

/// What to do when a filter's field has no backing column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingColumn {
    /// Replace the filter with a never-matching condition.
    Never,
    /// Drop the unresolvable `AnyOf` branches; never-match if none remain.
    DropBranch,
    /// Return empty rows with this warning.
    Warn(String),
    /// Return empty rows with this error.
    Fail(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub predicate: Predicate,
    pub on_missing: MissingColumn,
}

impl Filter {
    fn new(predicate: Predicate, on_missing: MissingColumn) -> Self {
        Self {
            predicate,
            on_missing,
        }
    }

    pub fn references(&self, field: Field) -> bool {
        self.predicate.columns().into_iter().any(|c| *c == field)
    }
}

/// Ordered filters plus the literal parameters they bind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredicateSet {
    pub filters: Vec<Filter>,
    pub params: BTreeMap<String, ParamValue>,
}

impl PredicateSet {
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    fn push(&mut self, predicate: Predicate, on_missing: MissingColumn) {
        self.filters.push(Filter::new(predicate, on_missing));
    }

    fn bind(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> String {
        let name = name.into();
        self.params.insert(name.clone(), value.into());
        name
    }
}

const HIRE_DATE_WARNING: &str = "Hire date column not present; cannot filter by hire date.";
const EMAIL_LOOKUP_ERROR: &str = "error: not present in your database (email column missing)";
const MISSING_EMAIL_WARNING: &str = "Email column not present; cannot filter for missing email.";

/// Extract every recognised filter from normalized text.
pub fn extract(q: &str) -> PredicateSet {
    let mut set = PredicateSet::default();
    hire_date_filters(q, &mut set);
    skill_filters(q, &mut set);
    lookup_filters(q, &mut set);
    missing_filters(q, &mut set);
    department_filter(q, &mut set);
    position_filter(q, &mut set);
    name_filter(q, &mut set);
    set
}

fn hire_year(op: Comparison, value: YearValue) -> Predicate {
    Predicate::Year {
        column: Field::HireDate,
        op,
        value,
    }
}

fn hire_date_filters(q: &str, set: &mut PredicateSet) {
    let warn = || MissingColumn::Warn(HIRE_DATE_WARNING.to_string());

    if patterns::is_match(&THIS_YEAR, q) {
        set.push(hire_year(Comparison::Eq, YearValue::CurrentYear), warn());
    }
    let single = [
        (&HIRED_IN, "year_in", Comparison::Eq),
        (&HIRED_AFTER, "year_after", Comparison::Gt),
        (&HIRED_BEFORE, "year_before", Comparison::Lt),
    ];
    for (re, name, op) in single {
        if let Some(year) = patterns::group(re, q, 1) {
            // strftime yields text, so years bind as text.
            let param = set.bind(name, year);
            set.push(hire_year(op, YearValue::Param(param)), warn());
        }
    }
    if let Some(caps) = patterns::captures(&HIRED_BETWEEN, q) {
        let low = set.bind("year_b1", &caps[1]);
        let high = set.bind("year_b2", &caps[2]);
        set.push(
            Predicate::YearBetween {
                column: Field::HireDate,
                low,
                high,
            },
            warn(),
        );
    }
}

fn skill_filters(q: &str, set: &mut PredicateSet) {
    let mut seen = BTreeSet::new();
    let keywords: Vec<String> = patterns::captures_iter(&SKILL, q)
        .map(|c| c[1].to_string())
        .filter(|kw| seen.insert(kw.clone()))
        .collect();

    for (i, kw) in keywords.into_iter().enumerate() {
        let param = set.bind(format!("skill_kw_{i}"), format!("%{kw}%"));
        set.push(
            Predicate::AnyOf(vec![
                Predicate::Like {
                    column: Field::Skills,
                    param: param.clone(),
                },
                Predicate::Like {
                    column: Field::Position,
                    param,
                },
            ]),
            MissingColumn::DropBranch,
        );
    }
}

fn lookup_filters(q: &str, set: &mut PredicateSet) {
    if let Some(name) = patterns::group(&REPORTS_TO, q, 1) {
        let param = set.bind("reports_to_name", name.trim());
        set.push(
            Predicate::EqualsIgnoreCase {
                column: Field::ReportsTo,
                param,
            },
            MissingColumn::Never,
        );
    }

    let id = patterns::group(&EMP_ID, q, 1).or_else(|| patterns::group(&ID, q, 1));
    if let Some(id) = id.and_then(|s| s.parse::<i64>().ok()) {
        let param = set.bind("id_exact", id);
        set.push(
            Predicate::Equals {
                column: Field::Id,
                param,
            },
            MissingColumn::Never,
        );
    }

    if let Some(email) = patterns::group(&EMAIL, q, 1) {
        let param = set.bind("email_exact", email);
        set.push(
            Predicate::EqualsIgnoreCase {
                column: Field::Email,
                param,
            },
            MissingColumn::Fail(EMAIL_LOOKUP_ERROR.to_string()),
        );
    }
}

fn missing_filters(q: &str, set: &mut PredicateSet) {
    let checks = [
        (
            &MISSING_EMAIL,
            Field::Email,
            true,
            MissingColumn::Warn(MISSING_EMAIL_WARNING.to_string()),
        ),
        (&MISSING_NAME, Field::Name, true, MissingColumn::Never),
        (&MISSING_SKILLS, Field::Skills, true, MissingColumn::Never),
        (
            &MISSING_DEPARTMENT,
            Field::DepartmentRef,
            false,
            MissingColumn::Never,
        ),
        (&MISSING_POSITION, Field::Position, true, MissingColumn::Never),
        (&MISSING_SALARY, Field::Salary, false, MissingColumn::Never),
        (
            &MISSING_HIRE_DATE,
            Field::HireDate,
            true,
            MissingColumn::Warn(HIRE_DATE_WARNING.to_string()),
        ),
        (&MISSING_REPORTS_TO, Field::ReportsTo, true, MissingColumn::Never),
    ];
    for (re, column, blank, on_missing) in checks {
        if patterns::is_match(re, q) {
            set.push(Predicate::Missing { column, blank }, on_missing);
        }
    }
}

/// Whether `word`, captured after "in"/"from" or "department", can be a
/// department name. Skill, role and calendar words never are, nor is
/// anything in a skill or location phrase ("experience in python").
fn is_department_candidate(word: &str, excluded: &BTreeSet<String>) -> bool {
    // "marketing" and "hr" are both positions and departments.
    let role_only = patterns::is_match(&POSITION, word) && !matches!(word, "marketing" | "hr");
    word.len() >= 2
        && !RESERVED.contains(&word)
        && !patterns::is_match(&SKILL, word)
        && !role_only
        && !TIME_WORDS.contains(&word)
        && !excluded.contains(word)
}

fn department_filter(q: &str, set: &mut PredicateSet) {
    let excluded: BTreeSet<String> = patterns::captures_iter(&NOT_A_DEPARTMENT, q)
        .map(|c| c[1].to_string())
        .collect();
    let candidate = [&DEPARTMENT_IS, &IN_PLACE].into_iter().find_map(|re| {
        patterns::captures_iter(re, q)
            .map(|c| c[1].to_string())
            .find(|word| is_department_candidate(word, &excluded))
    });
    if let Some(name) = candidate {
        let param = set.bind("dept_kw", format!("%{name}%"));
        set.push(
            Predicate::Like {
                column: Field::DepartmentName,
                param,
            },
            MissingColumn::Never,
        );
    }
}

fn position_filter(q: &str, set: &mut PredicateSet) {
    let mut seen = BTreeSet::new();
    let keywords: Vec<String> = patterns::captures_iter(&POSITION, q)
        .map(|c| position_stem(&c[1]))
        .filter(|kw| seen.insert(kw.clone()))
        .collect();
    if keywords.is_empty() {
        return;
    }

    let branches: Vec<Predicate> = keywords
        .into_iter()
        .enumerate()
        .map(|(i, kw)| Predicate::Like {
            column: Field::Position,
            param: set.bind(format!("pos_kw_{i}"), format!("%{kw}%")),
        })
        .collect();
    set.push(Predicate::AnyOf(branches), MissingColumn::Never);
}

/// `developers` → `developer`, `full  stack` → `full stack`.
fn position_stem(raw: &str) -> String {
    let joined = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    match joined.as_str() {
        "developers" | "engineers" | "managers" => joined[..joined.len() - 1].to_string(),
        _ => joined,
    }
}

fn name_filter(q: &str, set: &mut PredicateSet) {
    let Some(raw) = patterns::group(&NAME, q, 1) else {
        return;
    };
    let name = raw
        .split_whitespace()
        .take_while(|w| !is_reserved(w))
        .collect::<Vec<_>>()
        .join(" ");
    if name.len() < 2 {
        return;
    }
    let param = set.bind("name_like", format!("%{name}%"));
    set.push(
        Predicate::Like {
            column: Field::Name,
            param,
        },
        MissingColumn::Never,
    );
}
