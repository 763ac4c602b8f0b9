//! Query-type routing: relational, document search, or both.

use serde::Serialize;

use crate::patterns::{self, pattern};

pattern!(
    STRUCTURED,
    r"\b(?:employees?|departments?|depts?|hired|hiring|salary|salaries|roles?|positions?)\b"
);
pattern!(
    DOCUMENT,
    r"\b(?:resumes?|cvs?|documents?|pdfs?|contracts?|clauses?|polic(?:y|ies)|termination)\b"
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Sql,
    Document,
    Hybrid,
}

impl QueryType {
    pub fn wants_sql(self) -> bool {
        matches!(self, QueryType::Sql | QueryType::Hybrid)
    }

    pub fn wants_documents(self) -> bool {
        matches!(self, QueryType::Document | QueryType::Hybrid)
    }
}

/// Route normalized text.
///
/// Structured cues plus document cues give `Hybrid`. Skill and role words
/// are not structured cues, so "resume with python skills" stays a document
/// search. Text with neither kind of cue defaults to `Sql`.
pub fn route(q: &str) -> QueryType {
    let structured = patterns::is_match(&STRUCTURED, q);
    let docs = patterns::is_match(&DOCUMENT, q);

    let routed = match (structured, docs) {
        (true, true) => QueryType::Hybrid,
        (false, true) => QueryType::Document,
        _ => QueryType::Sql,
    };
    tracing::trace!(structured, docs, ?routed, "routed query");
    routed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes() {
        let cases = [
            ("resume with python skills", QueryType::Document),
            ("python developers in marketing", QueryType::Sql),
            ("how many employees are in engineering?", QueryType::Sql),
            ("employees whose contract mentions termination", QueryType::Hybrid),
            ("termination clause in the policy", QueryType::Document),
            ("what is the weather", QueryType::Sql),
            ("salary of engineers with a pdf resume", QueryType::Hybrid),
            ("pdf of senior python developers", QueryType::Document),
        ];
        for (q, expected) in cases {
            assert_eq!(route(q), expected, "{q}");
        }
    }

    #[test]
    fn test_branch_flags() {
        assert!(QueryType::Hybrid.wants_sql() && QueryType::Hybrid.wants_documents());
        assert!(!QueryType::Sql.wants_documents());
        assert!(!QueryType::Document.wants_sql());
    }
}
