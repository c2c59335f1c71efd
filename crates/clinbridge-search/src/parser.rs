//! Query grammar: `name[:modifier]=[prefix]operand[|operand2]`.

use url::form_urlencoded;

use crate::parameters::{SearchModifier, SearchPrefix};

/// Flat, ordered, multi-valued search parameters as received.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pairs: Vec<(String, String)>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an application/x-www-form-urlencoded query string.
    /// Example: "name:contains=John&birthdate=ge2020-01-01"
    pub fn parse_query(query: &str) -> Self {
        let pairs = form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { pairs }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Every value supplied for `key`, in order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.iter().filter(move |(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Last value supplied for `key`.
    pub fn last(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Encode back into a query string; order is preserved.
    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (k, v) in &self.pairs {
            serializer.append_pair(k, v);
        }
        serializer.finish()
    }
}

/// Split `name:modifier` into its parts.
pub fn split_name_and_modifier(key: &str) -> (&str, Option<SearchModifier>) {
    match key.split_once(':') {
        Some((name, modifier)) if !modifier.is_empty() => {
            (name, Some(SearchModifier::parse(modifier)))
        }
        Some((name, _)) => (name, None),
        None => (key, None),
    }
}

/// Split a comma-separated value list, skipping blanks.
pub fn split_values(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect()
}

/// Detect a two-character comparison prefix.
///
/// A prefix is only recognised when followed by a digit or `-`, so words
/// such as `lead` or `gender` are left alone. A `-` separating the prefix
/// from an alphabetic operand is dropped: `eq-active` yields `active`,
/// while `lt-5` keeps the negative number.
pub fn extract_prefix(value: &str) -> (Option<SearchPrefix>, &str) {
    let Some(head) = value.get(..2) else {
        return (None, value);
    };
    let Some(prefix) = SearchPrefix::parse(head) else {
        return (None, value);
    };
    let rest = &value[2..];
    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => (Some(prefix), rest),
        Some('-') => match chars.next() {
            Some(c) if c.is_ascii_digit() || c == '.' => (Some(prefix), rest),
            Some(_) => (Some(prefix), &rest[1..]),
            None => (None, value),
        },
        _ => (None, value),
    }
}

/// Split `system|code`. An empty system is treated as absent.
pub fn split_system(value: &str) -> (Option<&str>, &str) {
    match value.split_once('|') {
        Some((system, code)) if !system.is_empty() => (Some(system), code),
        Some((_, code)) => (None, code),
        None => (None, value),
    }
}
