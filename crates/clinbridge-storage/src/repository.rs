use std::sync::Arc;

use async_trait::async_trait;
use clinbridge_core::Result;
use serde::{Deserialize, Serialize};

use crate::model::{NativeRecord, Provenance};
use crate::predicate::NativePredicate;

/// One ordering term for `find`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Arguments of a `find` call.
#[derive(Debug, Clone, PartialEq)]
pub struct FindQuery {
    pub predicate: NativePredicate,
    pub offset: usize,
    pub count: usize,
    /// Opaque continuation token; passed through uninterpreted.
    pub state_token: Option<String>,
    pub sort: Vec<SortKey>,
}

impl FindQuery {
    pub fn new(predicate: NativePredicate) -> Self {
        Self {
            predicate,
            offset: 0,
            count: 100,
            state_token: None,
            sort: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_page(mut self, offset: usize, count: usize) -> Self {
        self.offset = offset;
        self.count = count;
        self
    }
}

/// A page of `find` results plus the total number of matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindPage {
    pub records: Vec<NativeRecord>,
    pub total: usize,
}

/// Persistence contract for one native record type.
///
/// Implementations must be thread-safe (`Send + Sync`). Infrastructure faults
/// are reported as `FhirError::Internal`.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Inserts a new record and returns the stored version.
    ///
    /// # Errors
    ///
    /// Returns `FhirError::Conflict` if a record with the same key exists.
    async fn insert(&self, record: NativeRecord) -> Result<NativeRecord>;

    /// Fetches the current version, or `version` when supplied.
    ///
    /// Logically deleted records are returned with `deleted_at` set.
    /// Returns `None` if no such record or version exists.
    async fn get(&self, key: &str, version: Option<&str>) -> Result<Option<NativeRecord>>;

    /// Stores a new version of a record. The record must carry a key.
    ///
    /// # Errors
    ///
    /// Returns `FhirError::InvalidArgument` if the record has no key.
    async fn save(&self, record: NativeRecord) -> Result<NativeRecord>;

    /// Logically deletes a record and returns the obsolete version, which
    /// carries `provenance` and is marked deleted at its `recorded_at`.
    ///
    /// # Errors
    ///
    /// Returns `FhirError::NotFound` if no live record has this key.
    async fn obsolete(&self, key: &str, provenance: Provenance) -> Result<NativeRecord>;

    /// Returns one page of records matching the query.
    async fn find(&self, query: &FindQuery) -> Result<FindPage>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}

pub type DynRepository = Arc<dyn Repository>;
