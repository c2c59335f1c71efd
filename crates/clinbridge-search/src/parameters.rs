use clinbridge_storage::Operator;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic kind of a search parameter.
///
/// Decides how the rewriter turns a value into native criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchParameterType {
    Identifier,
    Token,
    Reference,
    Tag,
    String,
    Number,
    Date,
    Uri,
    Quantity,
    Composite,
    Special,
}

impl SearchParameterType {
    /// Parse a search parameter type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "identifier" => Some(Self::Identifier),
            "token" => Some(Self::Token),
            "reference" => Some(Self::Reference),
            "tag" => Some(Self::Tag),
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "date" => Some(Self::Date),
            "uri" => Some(Self::Uri),
            "quantity" => Some(Self::Quantity),
            "composite" => Some(Self::Composite),
            "special" => Some(Self::Special),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identifier => "identifier",
            Self::Token => "token",
            Self::Reference => "reference",
            Self::Tag => "tag",
            Self::String => "string",
            Self::Number => "number",
            Self::Date => "date",
            Self::Uri => "uri",
            Self::Quantity => "quantity",
            Self::Composite => "composite",
            Self::Special => "special",
        }
    }
}

impl fmt::Display for SearchParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Search modifiers, applied as suffix to the parameter name: `name:modifier`.
///
/// Only `contains` and `missing` change how a value is rewritten; the others
/// are accepted and carried along in the echoed key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchModifier {
    Contains,
    Missing,
    Exact,
    Text,
    Not,
    Below,
    Above,
    Identifier,
    Iterate,
    /// Any other suffix, e.g. a type filter like `subject:Patient`.
    Other(String),
}

impl SearchModifier {
    /// Parse a search modifier. Unknown suffixes become [`SearchModifier::Other`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "contains" => Self::Contains,
            "missing" => Self::Missing,
            "exact" => Self::Exact,
            "text" => Self::Text,
            "not" => Self::Not,
            "below" => Self::Below,
            "above" => Self::Above,
            "identifier" => Self::Identifier,
            "iterate" => Self::Iterate,
            other => Self::Other(other.to_string()),
        }
    }

    /// True for modifiers that change rewriting.
    pub fn alters_rewrite(&self) -> bool {
        matches!(self, Self::Contains | Self::Missing)
    }
}

/// Comparison prefixes for search values, e.g. `ge2020-01-01`, `lt5.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchPrefix {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Ap,
}

impl fmt::Display for SearchPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchPrefix::Eq => "eq",
            SearchPrefix::Ne => "ne",
            SearchPrefix::Gt => "gt",
            SearchPrefix::Ge => "ge",
            SearchPrefix::Lt => "lt",
            SearchPrefix::Le => "le",
            SearchPrefix::Ap => "ap",
        };
        f.write_str(s)
    }
}

impl SearchPrefix {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "ge" => Some(Self::Ge),
            "lt" => Some(Self::Lt),
            "le" => Some(Self::Le),
            "ap" => Some(Self::Ap),
            _ => None,
        }
    }

    pub fn operator(&self) -> Operator {
        match self {
            Self::Eq => Operator::Eq,
            Self::Ne => Operator::Ne,
            Self::Gt => Operator::Gt,
            Self::Ge => Operator::Ge,
            Self::Lt => Operator::Lt,
            Self::Le => Operator::Le,
            Self::Ap => Operator::Approx,
        }
    }
}
