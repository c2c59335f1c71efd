// -------------------------
// Bundle types
// -------------------------

use clinbridge_core::ResourceType;
use clinbridge_search::{PAGINATION_PARAMS, QueryState, SearchParams};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleKind {
    Searchset,
    History,
    TransactionResponse,
}

impl BundleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Searchset => "searchset",
            Self::History => "history",
            Self::TransactionResponse => "transaction-response",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BundleLink {
    pub relation: String,
    pub url: String,
}

impl BundleLink {
    pub fn new(relation: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchEntryMode {
    /// Main search results
    Match,
    /// `_include` / `_revinclude` results
    Include,
}

/// Search component of a Bundle entry (used in searchset bundles)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BundleEntrySearch {
    pub mode: SearchEntryMode,
}

/// Response component of a Bundle entry (used in transaction-response bundles)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BundleEntryResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleEntry {
    #[serde(rename = "fullUrl", skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<BundleEntrySearch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<BundleEntryResponse>,
}

impl BundleEntry {
    /// Logical `Type/id` of the entry's resource, if it carries both.
    pub fn reference(&self) -> Option<String> {
        let resource = self.resource.as_ref()?;
        let rt = resource.get("resourceType")?.as_str()?;
        let id = resource.get("id")?.as_str()?;
        Some(format!("{rt}/{id}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bundle {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(rename = "type")]
    pub kind: BundleKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub link: Vec<BundleLink>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub entry: Vec<BundleEntry>,
}

impl Bundle {
    pub fn new(kind: BundleKind, total: Option<usize>, entries: Vec<BundleEntry>, links: Vec<BundleLink>) -> Self {
        Self {
            resource_type: "Bundle".to_string(),
            kind,
            total,
            link: links,
            entry: entries,
        }
    }

    pub fn link(&self, relation: &str) -> Option<&BundleLink> {
        self.link.iter().find(|l| l.relation == relation)
    }

    /// Entries in `mode`.
    pub fn entries_with_mode(&self, mode: SearchEntryMode) -> impl Iterator<Item = &BundleEntry> {
        self.entry
            .iter()
            .filter(move |e| e.search.as_ref().map(|s| s.mode) == Some(mode))
    }
}

// -------------------------
// Navigation links
// -------------------------

/// Query parameters of a link, for reproducing the request behind it.
pub fn parse_link_params(link: &str) -> SearchParams {
    match Url::parse(link) {
        Ok(url) => SearchParams::parse_query(url.query().unwrap_or_default()),
        Err(_) => SearchParams::parse_query(link.split_once('?').map(|(_, q)| q).unwrap_or_default()),
    }
}

/// Link parameters with the pagination controls removed.
pub fn filter_params(params: &SearchParams) -> SearchParams {
    SearchParams::from_pairs(
        params
            .iter()
            .filter(|(k, _)| !PAGINATION_PARAMS.contains(k)),
    )
}

fn page_url(base: &str, kind: ResourceType, echo: &SearchParams, state: &QueryState, offset: usize) -> String {
    let mut params = echo.clone();
    params.push("_count", state.count.to_string());
    params.push("_stateid", state.state_token.clone());
    if state.count > 0 && offset % state.count == 0 {
        params.push("_page", (offset / state.count).to_string());
    } else {
        params.push("_offset", offset.to_string());
    }
    format!("{base}/{kind}?{}", params.to_query_string())
}

/// Build pagination links for one page of search results.
///
/// `self` is always present; `first`/`previous` only past the first row;
/// `next`/`last` only while rows remain.
pub fn build_search_links(
    base_url: &str,
    kind: ResourceType,
    echo: &SearchParams,
    state: &QueryState,
) -> Vec<BundleLink> {
    let base = base_url.trim_end_matches('/');
    let offset = state.offset;
    let count = state.count;
    let mut links = vec![BundleLink::new("self", page_url(base, kind, echo, state, offset))];

    if count == 0 {
        return links;
    }

    if offset > 0 {
        links.push(BundleLink::new("first", page_url(base, kind, echo, state, 0)));
        links.push(BundleLink::new(
            "previous",
            page_url(base, kind, echo, state, offset.saturating_sub(count)),
        ));
    }

    if state.has_more() {
        let total = state.total.unwrap_or_default();
        let last_offset = offset + ((total - 1 - offset) / count) * count;
        links.push(BundleLink::new("next", page_url(base, kind, echo, state, offset + count)));
        links.push(BundleLink::new("last", page_url(base, kind, echo, state, last_offset)));
    }

    links
}

// -------------------------
// Assembler
// -------------------------

/// Turns mapped resources into response bundles.
#[derive(Debug, Clone)]
pub struct BundleAssembler {
    base_url: String,
}

impl BundleAssembler {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn full_url(&self, resource: &JsonValue) -> Option<String> {
        let rt = resource.get("resourceType")?.as_str()?;
        let id = resource.get("id")?.as_str()?;
        Some(format!("{}/{rt}/{id}", self.base_url))
    }

    pub fn entry(&self, resource: JsonValue, mode: Option<SearchEntryMode>) -> BundleEntry {
        BundleEntry {
            full_url: self.full_url(&resource),
            resource: Some(resource),
            search: mode.map(|mode| BundleEntrySearch { mode }),
            response: None,
        }
    }

    /// A searchset page. `total` counts matches only, never includes.
    pub fn searchset(
        &self,
        kind: ResourceType,
        matches: Vec<JsonValue>,
        included: Vec<JsonValue>,
        echo: &SearchParams,
        state: &QueryState,
    ) -> Bundle {
        let total = state.total.unwrap_or(matches.len());
        let links = build_search_links(&self.base_url, kind, echo, state);
        let entries = matches
            .into_iter()
            .map(|r| self.entry(r, Some(SearchEntryMode::Match)))
            .chain(
                included
                    .into_iter()
                    .map(|r| self.entry(r, Some(SearchEntryMode::Include))),
            )
            .collect();
        Bundle::new(BundleKind::Searchset, Some(total), entries, links)
    }

    /// Version history of one resource, newest first, with a `self` link only.
    pub fn history(&self, kind: ResourceType, id: &str, versions: Vec<JsonValue>) -> Bundle {
        let link = BundleLink::new("self", format!("{}/{kind}/{id}/_history", self.base_url));
        let total = versions.len();
        let entries = versions.into_iter().map(|r| self.entry(r, None)).collect();
        Bundle::new(BundleKind::History, Some(total), entries, vec![link])
    }

    /// Response to a batch of writes; each outcome carries its status line.
    pub fn transaction_response(&self, outcomes: Vec<(String, Option<JsonValue>)>) -> Bundle {
        let entries = outcomes
            .into_iter()
            .map(|(status, resource)| {
                let location = resource.as_ref().and_then(|r| self.full_url(r));
                let etag = resource
                    .as_ref()
                    .and_then(|r| r.pointer("/meta/versionId"))
                    .and_then(JsonValue::as_str)
                    .map(|v| format!("W/\"{v}\""));
                BundleEntry {
                    full_url: location.clone(),
                    resource,
                    search: None,
                    response: Some(BundleEntryResponse {
                        status,
                        location,
                        etag,
                    }),
                }
            })
            .collect();
        Bundle::new(BundleKind::TransactionResponse, None, entries, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASE: &str = "http://localhost:8080/fhir";

    fn state(offset: usize, count: usize, total: usize) -> QueryState {
        QueryState::new(offset, count, Some("tok".to_string())).with_total(total)
    }

    fn relations(links: &[BundleLink]) -> Vec<&str> {
        links.iter().map(|l| l.relation.as_str()).collect()
    }

    #[test]
    fn test_first_page_links() {
        let echo = SearchParams::new().with("name", "Smith");
        let links = build_search_links(BASE, ResourceType::Patient, &echo, &state(0, 10, 25));
        assert_eq!(relations(&links), vec!["self", "next", "last"]);
        assert_eq!(
            links[0].url,
            "http://localhost:8080/fhir/Patient?name=Smith&_count=10&_stateid=tok&_page=0"
        );
        assert!(links[2].url.ends_with("_page=2"));
    }

    #[test]
    fn test_middle_and_last_page_links() {
        let echo = SearchParams::new();
        let middle = build_search_links(BASE, ResourceType::Patient, &echo, &state(10, 10, 25));
        assert_eq!(relations(&middle), vec!["self", "first", "previous", "next", "last"]);

        let last = build_search_links(BASE, ResourceType::Patient, &echo, &state(20, 10, 25));
        assert_eq!(relations(&last), vec!["self", "first", "previous"]);
    }

    #[test]
    fn test_unaligned_offset_uses_offset_marker() {
        let links = build_search_links(BASE, ResourceType::Patient, &SearchParams::new(), &state(5, 10, 40));
        assert!(links[0].url.ends_with("_offset=5"));
        assert!(links.iter().find(|l| l.relation == "first").unwrap().url.ends_with("_page=0"));
        assert!(links.iter().find(|l| l.relation == "last").unwrap().url.ends_with("_offset=35"));
    }

    #[test]
    fn test_zero_count_has_only_self() {
        let links = build_search_links(BASE, ResourceType::Patient, &SearchParams::new(), &state(0, 0, 25));
        assert_eq!(relations(&links), vec!["self"]);
    }

    #[test]
    fn test_self_link_reproduces_filters() {
        let echo = SearchParams::new()
            .with("identifier", "http://acme.org/mrn|1")
            .with("birthdate", "ge2020-01-01");
        let links = build_search_links(BASE, ResourceType::Patient, &echo, &state(20, 10, 100));
        let reparsed = parse_link_params(&links[0].url);
        assert_eq!(filter_params(&reparsed), echo);
        assert_eq!(reparsed.last("_page"), Some("2"));
        assert_eq!(reparsed.last("_stateid"), Some("tok"));
    }

    #[test]
    fn test_searchset_bundle() {
        let assembler = BundleAssembler::new(format!("{BASE}/"));
        let bundle = assembler.searchset(
            ResourceType::Patient,
            vec![json!({"resourceType": "Patient", "id": "p1"})],
            vec![json!({"resourceType": "Organization", "id": "o1"})],
            &SearchParams::new(),
            &state(0, 10, 1),
        );
        assert_eq!(bundle.kind, BundleKind::Searchset);
        assert_eq!(bundle.total, Some(1));
        assert_eq!(bundle.entry.len(), 2);
        assert_eq!(
            bundle.entry[0].full_url.as_deref(),
            Some("http://localhost:8080/fhir/Patient/p1")
        );
        assert_eq!(bundle.entries_with_mode(SearchEntryMode::Include).count(), 1);

        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["type"], "searchset");
        assert_eq!(json["entry"][1]["search"]["mode"], "include");
    }

    #[test]
    fn test_history_bundle() {
        let assembler = BundleAssembler::new(BASE);
        let bundle = assembler.history(
            ResourceType::Patient,
            "p1",
            vec![
                json!({"resourceType": "Patient", "id": "p1", "meta": {"versionId": "2"}}),
                json!({"resourceType": "Patient", "id": "p1", "meta": {"versionId": "1"}}),
            ],
        );
        assert_eq!(bundle.kind, BundleKind::History);
        assert_eq!(relations(&bundle.link), vec!["self"]);
        assert_eq!(bundle.link[0].url, "http://localhost:8080/fhir/Patient/p1/_history");
        assert!(bundle.entry.iter().all(|e| e.search.is_none()));
    }

    #[test]
    fn test_transaction_response_bundle() {
        let assembler = BundleAssembler::new(BASE);
        let bundle = assembler.transaction_response(vec![
            (
                "201 Created".to_string(),
                Some(json!({"resourceType": "Patient", "id": "p9", "meta": {"versionId": "1"}})),
            ),
            ("204 No Content".to_string(), None),
        ]);
        assert_eq!(bundle.kind.as_str(), "transaction-response");
        assert!(bundle.link.is_empty());
        let response = bundle.entry[0].response.as_ref().unwrap();
        assert_eq!(response.etag.as_deref(), Some("W/\"1\""));
        assert_eq!(bundle.entry[0].reference().as_deref(), Some("Patient/p9"));
        assert!(bundle.entry[1].full_url.is_none());
    }
}
