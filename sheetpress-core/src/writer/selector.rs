//! Sheet name predicates

use regex::Regex;

/// Decides which sheets a removal or render filter applies to
pub trait SheetPredicate {
    fn matches(&self, name: &str) -> bool;

    /// Human-readable form used in error messages
    fn describe(&self) -> String {
        "custom predicate".to_string()
    }
}

impl<F> SheetPredicate for F
where
    F: Fn(&str) -> bool,
{
    fn matches(&self, name: &str) -> bool {
        self(name)
    }
}

/// Ready-made predicates for the common cases
#[derive(Debug, Clone)]
pub enum SheetSelector {
    /// Exact sheet names
    Names(Vec<String>),
    /// Names starting with the literal prefix
    Prefix(String),
    /// Names starting with the prefix, ignoring case
    PrefixIgnoreCase(String),
    Regex(Regex),
}

impl SheetSelector {
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SheetSelector::Names(names.into_iter().map(Into::into).collect())
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        SheetSelector::Prefix(prefix.into())
    }

    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(SheetSelector::Regex(Regex::new(pattern)?))
    }
}

impl SheetPredicate for SheetSelector {
    fn matches(&self, name: &str) -> bool {
        match self {
            SheetSelector::Names(names) => names.iter().any(|n| n == name),
            SheetSelector::Prefix(prefix) => name.starts_with(prefix.as_str()),
            SheetSelector::PrefixIgnoreCase(prefix) => name
                .chars()
                .flat_map(char::to_lowercase)
                .collect::<String>()
                .starts_with(&prefix.to_lowercase()),
            SheetSelector::Regex(re) => re.is_match(name),
        }
    }

    fn describe(&self) -> String {
        match self {
            SheetSelector::Names(names) => format!("names {names:?}"),
            SheetSelector::Prefix(prefix) => format!("prefix '{prefix}'"),
            SheetSelector::PrefixIgnoreCase(prefix) => format!("prefix '{prefix}' (any case)"),
            SheetSelector::Regex(re) => format!("regex /{}/", re.as_str()),
        }
    }
}
