//! Native predicate tree produced by the query rewriter and evaluated by
//! repository backends.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Comparison operators understood by repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    /// Approximately equal.
    Approx,
    /// Wildcard match; `*` matches any run of characters.
    Like,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Approx => "~=",
            Self::Like => "~",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A single `field op value` test.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Criterion {
    pub field: String,
    pub op: Operator,
    pub value: String,
}

impl Criterion {
    pub fn new(field: impl Into<String>, op: Operator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {:?}", self.field, self.op, self.value)
    }
}

/// Compiled filter over native records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NativePredicate {
    True,
    False,
    /// System filter excluding logically deleted records.
    NotDeleted,
    And(Vec<NativePredicate>),
    Or(Vec<NativePredicate>),
    Compare(Criterion),
    /// Null test; `missing: true` matches records without a value.
    Missing { field: String, missing: bool },
}

impl NativePredicate {
    pub fn compare(field: impl Into<String>, op: Operator, value: impl Into<String>) -> Self {
        Self::Compare(Criterion::new(field, op, value))
    }

    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::compare(field, Operator::Eq, value)
    }

    pub fn missing(field: impl Into<String>, missing: bool) -> Self {
        Self::Missing {
            field: field.into(),
            missing,
        }
    }

    /// Conjunction; nested `And` nodes are flattened and `True` terms dropped.
    pub fn and(terms: impl IntoIterator<Item = NativePredicate>) -> Self {
        let mut flat = Vec::new();
        for term in terms {
            match term {
                Self::True => {}
                Self::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.contains(&Self::False) {
            return Self::False;
        }
        match flat.len() {
            0 => Self::True,
            1 => flat.remove(0),
            _ => Self::And(flat),
        }
    }

    /// Disjunction; nested `Or` nodes are flattened and `False` terms dropped.
    pub fn or(terms: impl IntoIterator<Item = NativePredicate>) -> Self {
        let mut flat = Vec::new();
        for term in terms {
            match term {
                Self::False => {}
                Self::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.contains(&Self::True) {
            return Self::True;
        }
        match flat.len() {
            0 => Self::False,
            1 => flat.remove(0),
            _ => Self::Or(flat),
        }
    }

    /// All criteria in the tree, depth first.
    pub fn criteria(&self) -> Vec<&Criterion> {
        match self {
            Self::Compare(c) => vec![c],
            Self::And(terms) | Self::Or(terms) => terms.iter().flat_map(|t| t.criteria()).collect(),
            _ => Vec::new(),
        }
    }

    /// True when the tree contains the system deletion filter at top level.
    pub fn excludes_deleted(&self) -> bool {
        match self {
            Self::NotDeleted => true,
            Self::And(terms) => terms.iter().any(|t| matches!(t, Self::NotDeleted)),
            _ => false,
        }
    }
}

impl fmt::Display for NativePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => f.write_str("TRUE"),
            Self::False => f.write_str("FALSE"),
            Self::NotDeleted => f.write_str("NOT DELETED"),
            Self::Compare(c) => write!(f, "{c}"),
            Self::Missing { field, missing: true } => write!(f, "{field} IS NULL"),
            Self::Missing { field, missing: false } => write!(f, "{field} IS NOT NULL"),
            Self::And(terms) => write_joined(f, terms, " AND "),
            Self::Or(terms) => write_joined(f, terms, " OR "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, terms: &[NativePredicate], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{term}")?;
    }
    f.write_str(")")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_like() {
        let p = NativePredicate::compare("name", Operator::Like, "*Smith*");
        assert_eq!(p.to_string(), r#"name ~ "*Smith*""#);
    }

    #[test]
    fn test_display_missing() {
        assert_eq!(NativePredicate::missing("deceased", true).to_string(), "deceased IS NULL");
        assert_eq!(
            NativePredicate::missing("deceased", false).to_string(),
            "deceased IS NOT NULL"
        );
    }

    #[test]
    fn test_and_flattens() {
        let p = NativePredicate::and([
            NativePredicate::NotDeleted,
            NativePredicate::and([NativePredicate::eq("a", "1"), NativePredicate::eq("b", "2")]),
            NativePredicate::True,
        ]);
        match &p {
            NativePredicate::And(terms) => assert_eq!(terms.len(), 3),
            other => panic!("expected And, got {other}"),
        }
        assert!(p.excludes_deleted());
        assert_eq!(p.criteria().len(), 2);
    }

    #[test]
    fn test_or_collapses() {
        assert_eq!(NativePredicate::or([]), NativePredicate::False);
        assert_eq!(
            NativePredicate::or([NativePredicate::eq("a", "1")]),
            NativePredicate::eq("a", "1")
        );
        assert_eq!(
            NativePredicate::and([NativePredicate::False, NativePredicate::eq("a", "1")]),
            NativePredicate::False
        );
    }

    #[test]
    fn test_display_nested() {
        let p = NativePredicate::and([
            NativePredicate::NotDeleted,
            NativePredicate::or([NativePredicate::eq("s", "a"), NativePredicate::eq("s", "b")]),
        ]);
        assert_eq!(p.to_string(), r#"(NOT DELETED AND (s == "a" OR s == "b"))"#);
    }
}
