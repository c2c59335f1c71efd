//! Compiles protocol search parameters into a native predicate.
//!
//! Values of one key are OR'd, distinct keys are AND'd, and the result is
//! always AND'd with the system filter hiding logically deleted records.
//! Keys without a mapping are dropped silently.

use std::iter;

use clinbridge_core::{FhirError, ResourceType, Result, parse_reference};
use clinbridge_storage::{
    DynAuthorityResolver, DynConceptResolver, FindQuery, NativePredicate, Operator, SortKey,
};
use indexmap::IndexMap;
use tracing::debug;

use crate::include::{IncludeInstruction, is_include_parameter, is_revinclude_parameter, parse_include};
use crate::parameter_map::{ParameterMap, ParameterMapping};
use crate::parameters::{SearchModifier, SearchParameterType, SearchPrefix};
use crate::parser::{SearchParams, extract_prefix, split_name_and_modifier, split_system, split_values};
use crate::query_state::QueryState;

// ============================================================================
// Reserved parameter names
// ============================================================================

pub const COUNT: &str = "_count";
pub const OFFSET: &str = "_offset";
pub const PAGE: &str = "_page";
pub const STATE_ID: &str = "_stateid";
pub const SORT: &str = "_sort";

/// Pagination controls; never echoed.
pub const PAGINATION_PARAMS: [&str; 4] = [COUNT, OFFSET, PAGE, STATE_ID];

pub const DEFAULT_COUNT: usize = 100;
pub const DEFAULT_MAX_COUNT: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriterSettings {
    /// Page size when `_count` is absent.
    pub default_count: usize,
    /// Upper bound applied to `_count`.
    pub max_count: usize,
}

impl Default for RewriterSettings {
    fn default() -> Self {
        Self {
            default_count: DEFAULT_COUNT,
            max_count: DEFAULT_MAX_COUNT,
        }
    }
}

/// Output of [`QueryRewriter::rewrite`].
#[derive(Debug, Clone)]
pub struct RewrittenQuery {
    pub predicate: NativePredicate,
    pub state: QueryState,
    /// Accepted parameters in input order, prefixes normalised, pagination
    /// controls removed. Used to regenerate navigation links.
    pub echo: SearchParams,
    pub includes: Vec<IncludeInstruction>,
    pub sort: Vec<SortKey>,
}

impl RewrittenQuery {
    pub fn find_query(&self) -> FindQuery {
        FindQuery {
            predicate: self.predicate.clone(),
            offset: self.state.offset,
            count: self.state.count,
            state_token: Some(self.state.state_token.clone()),
            sort: self.sort.clone(),
        }
    }
}

pub struct QueryRewriter {
    authorities: DynAuthorityResolver,
    concepts: DynConceptResolver,
    settings: RewriterSettings,
}

impl QueryRewriter {
    pub fn new(authorities: DynAuthorityResolver, concepts: DynConceptResolver) -> Self {
        Self {
            authorities,
            concepts,
            settings: RewriterSettings::default(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: RewriterSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &RewriterSettings {
        &self.settings
    }

    /// Compile `params` for `kind`.
    ///
    /// # Errors
    ///
    /// Returns `FhirError::InvalidArgument` for malformed values, and
    /// propagates resolver faults such as `FhirError::AmbiguousReference`.
    pub async fn rewrite(
        &self,
        kind: ResourceType,
        params: &SearchParams,
        map: &ParameterMap,
    ) -> Result<RewrittenQuery> {
        let mut groups: IndexMap<String, Vec<NativePredicate>> = IndexMap::new();
        let mut echo = SearchParams::new();
        let mut includes = Vec::new();
        let mut sort = Vec::new();
        let mut count = None;
        let mut offset = None;
        let mut page = None;
        let mut state_token = None;

        for (key, raw) in params.iter() {
            match key {
                COUNT => count = Some(parse_unsigned(key, raw)?),
                OFFSET => offset = Some(parse_unsigned(key, raw)?),
                PAGE => page = Some(parse_unsigned(key, raw)?),
                STATE_ID => state_token = Some(raw.to_string()),
                SORT => {
                    sort.extend(compile_sort(kind, raw, map));
                    echo.push(key, raw);
                }
                _ if is_include_parameter(key) || is_revinclude_parameter(key) => {
                    let reverse = is_revinclude_parameter(key);
                    let iterate = key.ends_with(":iterate");
                    for value in split_values(raw) {
                        if let Some(include) = parse_include(value, reverse, iterate, map)? {
                            includes.push(include);
                        }
                    }
                    echo.push(key, raw);
                }
                _ => {
                    let (name, modifier) = split_name_and_modifier(key);
                    let Some(mapping) = map.resolve(kind, name) else {
                        debug!(resource_type = %kind, param = %key, "Dropping unmapped search parameter");
                        continue;
                    };

                    let mut terms = Vec::new();
                    let mut echoed = Vec::new();
                    for value in split_values(raw) {
                        let (prefix, operand) = extract_prefix(value);
                        terms.push(
                            self.compile_value(mapping, modifier.as_ref(), prefix, operand)
                                .await?,
                        );
                        echoed.push(echo_value(prefix, operand));
                    }
                    if terms.is_empty() {
                        continue;
                    }
                    groups.entry(key.to_string()).or_default().extend(terms);
                    echo.push(key, echoed.join(","));
                }
            }
        }

        let count = count
            .unwrap_or(self.settings.default_count)
            .min(self.settings.max_count);
        let offset = match page {
            Some(page) => page
                .checked_mul(count)
                .ok_or_else(|| FhirError::invalid_argument(format!("{PAGE} is out of range")))?,
            None => offset.unwrap_or(0),
        };

        let predicate = NativePredicate::and(
            iter::once(NativePredicate::NotDeleted)
                .chain(groups.into_values().map(NativePredicate::or)),
        );
        let state = QueryState::new(offset, count, state_token);

        debug!(
            resource_type = %kind,
            predicate = %predicate,
            offset,
            count,
            includes = includes.len(),
            "Rewrote search parameters"
        );

        Ok(RewrittenQuery {
            predicate,
            state,
            echo,
            includes,
            sort,
        })
    }

    async fn compile_value(
        &self,
        mapping: &ParameterMapping,
        modifier: Option<&SearchModifier>,
        prefix: Option<SearchPrefix>,
        operand: &str,
    ) -> Result<NativePredicate> {
        let path = mapping.path.as_str();
        match modifier {
            Some(SearchModifier::Missing) => {
                return Ok(NativePredicate::missing(path, parse_missing(operand)?));
            }
            Some(SearchModifier::Contains) => {
                let field = match mapping.kind {
                    SearchParameterType::Identifier | SearchParameterType::Tag => {
                        format!("{path}.code")
                    }
                    _ => path.to_string(),
                };
                return Ok(NativePredicate::compare(field, Operator::Like, format!("*{operand}*")));
            }
            _ => {}
        }

        let op = prefix.map_or(Operator::Eq, |p| p.operator());
        match mapping.kind {
            SearchParameterType::Identifier => self.compile_identifier(path, op, operand).await,
            SearchParameterType::Token => self.compile_token(path, op, operand).await,
            SearchParameterType::Reference => {
                let reference = parse_reference(operand)?;
                Ok(NativePredicate::compare(path, op, reference.id))
            }
            SearchParameterType::Tag => Ok(compile_tag(path, op, operand)),
            _ => Ok(NativePredicate::compare(path, op, operand)),
        }
    }

    /// `system|code` scoped to the resolved authority; a bare code is unscoped.
    async fn compile_identifier(&self, path: &str, op: Operator, operand: &str) -> Result<NativePredicate> {
        let (system, code) = split_system(operand);
        let code_term = NativePredicate::compare(format!("{path}.code"), op, code);
        let Some(system) = system else {
            return Ok(code_term);
        };

        let scope = match self.authorities.resolve(system).await? {
            Some(authority) => NativePredicate::eq(format!("{path}.authority"), authority.key),
            None => {
                debug!(system = %system, "Authority not resolved, matching system literally");
                NativePredicate::eq(format!("{path}.system"), system)
            }
        };
        if code.is_empty() {
            Ok(scope)
        } else {
            Ok(NativePredicate::and([scope, code_term]))
        }
    }

    /// A scoped `system|code` must resolve to one concept. A bare code matches
    /// every concept carrying it, or the literal code when none is known.
    async fn compile_token(&self, path: &str, op: Operator, operand: &str) -> Result<NativePredicate> {
        let (system, code) = split_system(operand);
        if code.is_empty() {
            return Err(FhirError::invalid_argument(format!(
                "token value '{operand}' has no code"
            )));
        }
        let keys: Vec<String> = match system {
            Some(system) => self
                .concepts
                .resolve(code, Some(system))
                .await?
                .into_iter()
                .map(|c| c.key)
                .collect(),
            None => self
                .concepts
                .resolve_all(code)
                .await?
                .into_iter()
                .map(|c| c.key)
                .collect(),
        };
        let mut terms: Vec<NativePredicate> = keys
            .into_iter()
            .map(|key| NativePredicate::compare(path, op, key))
            .collect();
        match terms.len() {
            0 => {
                debug!(code = %code, system = ?system, "Concept not resolved, matching code literally");
                Ok(NativePredicate::compare(path, op, code))
            }
            1 => Ok(terms.remove(0)),
            // `ne` must exclude every candidate.
            _ if op == Operator::Ne => Ok(NativePredicate::and(terms)),
            _ => Ok(NativePredicate::or(terms)),
        }
    }
}

fn compile_tag(path: &str, op: Operator, operand: &str) -> NativePredicate {
    let (system, code) = split_system(operand);
    let code_term = NativePredicate::compare(format!("{path}.code"), op, code);
    match system {
        Some(system) => {
            NativePredicate::and([NativePredicate::eq(format!("{path}.system"), system), code_term])
        }
        None => code_term,
    }
}

fn compile_sort(kind: ResourceType, raw: &str, map: &ParameterMap) -> Vec<SortKey> {
    split_values(raw)
        .into_iter()
        .filter_map(|value| {
            let (descending, name) = match value.strip_prefix('-') {
                Some(name) => (true, name),
                None => (false, value),
            };
            let Some(mapping) = map.resolve(kind, name) else {
                debug!(resource_type = %kind, param = %name, "Dropping unmapped sort key");
                return None;
            };
            Some(SortKey {
                field: mapping.path.clone(),
                descending,
            })
        })
        .collect()
}

/// The default `eq` prefix is dropped; others are kept in canonical form so that
/// following a link reproduces the same comparison.
fn echo_value(prefix: Option<SearchPrefix>, operand: &str) -> String {
    match prefix {
        Some(p) if p != SearchPrefix::Eq => format!("{p}{operand}"),
        _ => operand.to_string(),
    }
}

fn parse_unsigned(key: &str, raw: &str) -> Result<usize> {
    raw.trim().parse::<usize>().map_err(|_| {
        FhirError::invalid_argument(format!("{key} must be a non-negative integer, got '{raw}'"))
    })
}

fn parse_missing(raw: &str) -> Result<bool> {
    match raw {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(FhirError::invalid_argument(format!(
            ":missing expects true or false, got '{other}'"
        ))),
    }
}
