//! Lazily compiled regex helpers shared by the text heuristics.

use regex::{Captures, Regex};
use std::sync::LazyLock;

pub(crate) type Pattern = LazyLock<Option<Regex>>;

macro_rules! pattern {
    ($name:ident, $regex_str:expr) => {
        pub(crate) static $name: $crate::patterns::Pattern =
            std::sync::LazyLock::new(|| regex::Regex::new($regex_str).ok());
    };
}

pub(crate) use pattern;

pub(crate) fn is_match(pattern: &Pattern, text: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(text))
}

pub(crate) fn captures<'t>(pattern: &Pattern, text: &'t str) -> Option<Captures<'t>> {
    pattern.as_ref().and_then(|re| re.captures(text))
}

pub(crate) fn captures_iter<'t>(
    pattern: &'static Pattern,
    text: &'t str,
) -> impl Iterator<Item = Captures<'t>> + 't {
    pattern.as_ref().into_iter().flat_map(move |re| re.captures_iter(text))
}

/// Capture group `index` of the first match, as an owned string.
pub(crate) fn group(pattern: &Pattern, text: &str, index: usize) -> Option<String> {
    captures(pattern, text)
        .and_then(|c| c.get(index))
        .map(|m| m.as_str().to_string())
}
