//! Intent classification.
//!
//! An [`Intent`] decides the shape of the generated statement. The engine
//! holds a prioritized list of [`Classifier`]s and takes the first `Some`
//! answer; [`RuleClassifier`] always answers, so it goes last.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::str::FromStr;

use crate::patterns::{self, pattern};

pattern!(COUNT, r"\b(?:how many|count|number of)\b");
pattern!(AVERAGE_SALARY, r"\baverage\s+salary\b");
pattern!(DEPARTMENT, r"\bdepartments?\b");
pattern!(TOP_N, r"\btop\s*(\d+)\b");
pattern!(EACH_DEPARTMENT, r"\b(?:each|per|every)\s+department\b");
pattern!(EMAIL_LOOKUP, r"email\s*[:=]");
pattern!(ID_LOOKUP, r"\bid\s*[:=]?\s*\d+\b");
pattern!(WHICH_EMPLOYEE, r"\bwhich\s+employee\b");

/// Default N for top-per-department when the question gives none.
pub const DEFAULT_TOP_N: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Count,
    AverageByDepartment,
    TopPerDepartment,
    /// Single-row lookup: page size 1, offset 0.
    FindOne,
    Listing,
}

impl Intent {
    pub fn label(self) -> &'static str {
        match self {
            Intent::Count => "count",
            Intent::AverageByDepartment => "avg_by_dept",
            Intent::TopPerDepartment => "top_paid_each_dept",
            Intent::FindOne => "find_one",
            Intent::Listing => "select",
        }
    }
}

impl FromStr for Intent {
    type Err = anyhow::Error;

    /// Accepts the example-corpus labels as well as the variant names.
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_lowercase().as_str() {
            "count" => Intent::Count,
            "avg_by_dept" | "average_by_department" => Intent::AverageByDepartment,
            "top_paid_each_dept" | "top_per_department" => Intent::TopPerDepartment,
            "find_one" => Intent::FindOne,
            "select" | "listing" => Intent::Listing,
            other => bail!("unknown intent label '{}'", other),
        })
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub intent: Intent,
    /// Similarity for semantic answers, `1.0` for rule answers.
    pub confidence: f32,
    /// Name of the classifier that produced the answer.
    pub source: String,
}

/// A pluggable intent classifier.
///
/// Returns `Ok(None)` when it has no confident answer, letting the next
/// classifier in the chain decide.
#[async_trait]
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(&self, query: &str) -> Result<Option<Classification>>;
}

/// Deterministic keyword rules. Always answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleClassifier;

impl RuleClassifier {
    pub fn infer(&self, q: &str) -> Intent {
        infer_intent(q)
    }
}

#[async_trait]
impl Classifier for RuleClassifier {
    fn name(&self) -> &str {
        "rules"
    }

    async fn classify(&self, query: &str) -> Result<Option<Classification>> {
        Ok(Some(Classification {
            intent: infer_intent(query),
            confidence: 1.0,
            source: self.name().to_string(),
        }))
    }
}

/// Rule-based intent for normalized text.
pub fn infer_intent(q: &str) -> Intent {
    if patterns::is_match(&COUNT, q) {
        Intent::Count
    } else if patterns::is_match(&AVERAGE_SALARY, q) && patterns::is_match(&DEPARTMENT, q) {
        Intent::AverageByDepartment
    } else if patterns::is_match(&TOP_N, q) && patterns::is_match(&EACH_DEPARTMENT, q) {
        Intent::TopPerDepartment
    } else if patterns::is_match(&EMAIL_LOOKUP, q)
        || patterns::is_match(&ID_LOOKUP, q)
        || patterns::is_match(&WHICH_EMPLOYEE, q)
    {
        Intent::FindOne
    } else {
        Intent::Listing
    }
}

/// N from `top N`, or [`DEFAULT_TOP_N`].
pub fn top_n(q: &str) -> i64 {
    patterns::group(&TOP_N, q, 1)
        .and_then(|n| n.parse::<i64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_TOP_N)
}
