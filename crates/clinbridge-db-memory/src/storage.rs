use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use clinbridge_core::{FhirError, Result, generate_id};
use clinbridge_storage::{FindPage, FindQuery, NativeRecord, Provenance, Repository};
use papaya::HashMap as PapayaHashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::query::{matches, sort_records};

/// In-memory repository for one native record type.
///
/// - Lock-free access to current versions via papaya::HashMap
/// - Every stored version kept for versioned reads
/// - Logical delete through `obsolete`
#[derive(Debug)]
pub struct MemoryRepository {
    native_type: String,
    /// Current version per key
    current: Arc<PapayaHashMap<String, NativeRecord>>,
    /// key -> every version, oldest first
    history: Arc<RwLock<HashMap<String, Vec<NativeRecord>>>>,
    /// Atomic counter for generating version ids
    version_counter: AtomicU64,
}

impl MemoryRepository {
    pub fn new(native_type: impl Into<String>) -> Self {
        Self {
            native_type: native_type.into(),
            current: Arc::new(PapayaHashMap::new()),
            history: Arc::new(RwLock::new(HashMap::new())),
            version_counter: AtomicU64::new(1),
        }
    }

    pub fn native_type(&self) -> &str {
        &self.native_type
    }

    /// Number of keys, deleted records included.
    pub fn len(&self) -> usize {
        self.current.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_version(&self) -> String {
        self.version_counter.fetch_add(1, Ordering::SeqCst).to_string()
    }

    async fn add_history(&self, key: &str, record: &NativeRecord) {
        let mut guard = self.history.write().await;
        guard.entry(key.to_string()).or_default().push(record.clone());
    }

    fn current_version(&self, key: &str) -> Option<NativeRecord> {
        self.current.pin().get(key).cloned()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn insert(&self, mut record: NativeRecord) -> Result<NativeRecord> {
        let key = record.key.clone().unwrap_or_else(generate_id);
        record.key = Some(key.clone());
        record.version = Some(self.next_version());
        record.previous_version = None;
        record.deleted_at = None;

        {
            let guard = self.current.pin();
            if guard.try_insert(key.clone(), record.clone()).is_err() {
                return Err(FhirError::conflict(format!(
                    "{} with key {key} already exists",
                    self.native_type
                )));
            }
        }

        self.add_history(&key, &record).await;
        debug!(native_type = %self.native_type, key = %key, "Inserted record");
        Ok(record)
    }

    async fn get(&self, key: &str, version: Option<&str>) -> Result<Option<NativeRecord>> {
        match version {
            None => Ok(self.current_version(key)),
            Some(version) => {
                let guard = self.history.read().await;
                Ok(guard.get(key).and_then(|versions| {
                    versions
                        .iter()
                        .find(|r| r.version.as_deref() == Some(version))
                        .cloned()
                }))
            }
        }
    }

    async fn save(&self, mut record: NativeRecord) -> Result<NativeRecord> {
        let key = record
            .key
            .clone()
            .ok_or_else(|| FhirError::invalid_argument("cannot save a record without a key"))?;

        record.previous_version = self.current_version(&key).and_then(|prior| prior.version);
        record.version = Some(self.next_version());
        record.deleted_at = None;

        self.current.pin().insert(key.clone(), record.clone());
        self.add_history(&key, &record).await;
        debug!(native_type = %self.native_type, key = %key, version = ?record.version, "Saved record");
        Ok(record)
    }

    async fn obsolete(&self, key: &str, provenance: Provenance) -> Result<NativeRecord> {
        let prior = self
            .current_version(key)
            .filter(|r| !r.is_deleted())
            .ok_or_else(|| FhirError::not_found(self.native_type.clone(), key))?;

        let mut record = prior.clone();
        record.previous_version = prior.version;
        record.version = Some(self.next_version());
        record.deleted_at = Some(provenance.recorded_at);
        record.provenance = Some(provenance);

        self.current.pin().insert(key.to_string(), record.clone());
        self.add_history(key, &record).await;
        debug!(native_type = %self.native_type, key = %key, "Obsoleted record");
        Ok(record)
    }

    async fn find(&self, query: &FindQuery) -> Result<FindPage> {
        let mut hits: Vec<NativeRecord> = {
            let guard = self.current.pin();
            guard
                .values()
                .filter(|record| matches(&query.predicate, record))
                .cloned()
                .collect()
        };
        sort_records(&mut hits, &query.sort);

        let total = hits.len();
        let records = hits
            .into_iter()
            .skip(query.offset)
            .take(query.count)
            .collect();
        Ok(FindPage { records, total })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinbridge_core::now_utc;
    use clinbridge_storage::{NativePredicate, ProvenanceAction};
    use serde_json::json;

    fn deletion() -> Provenance {
        Provenance {
            author: Some("user-1".to_string()),
            recorded_at: now_utc(),
            action: ProvenanceAction::Delete,
        }
    }

    fn record(fields: serde_json::Value) -> NativeRecord {
        let serde_json::Value::Object(map) = fields else {
            unreachable!()
        };
        NativeRecord::new(map)
    }

    #[tokio::test]
    async fn test_insert_assigns_key_and_version() {
        let repo = MemoryRepository::new("PatientRecord");
        let stored = repo.insert(record(json!({"name": "Ann"}))).await.unwrap();
        assert!(stored.key.is_some());
        assert_eq!(stored.version.as_deref(), Some("1"));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_conflict() {
        let repo = MemoryRepository::new("PatientRecord");
        repo.insert(record(json!({})).with_key("p1")).await.unwrap();
        let err = repo.insert(record(json!({})).with_key("p1")).await.unwrap_err();
        assert_eq!(err.kind(), clinbridge_core::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_save_links_previous_version() {
        let repo = MemoryRepository::new("PatientRecord");
        let v1 = repo.insert(record(json!({"n": 1})).with_key("p1")).await.unwrap();
        let v2 = repo.save(record(json!({"n": 2})).with_key("p1")).await.unwrap();
        assert_eq!(v2.previous_version, v1.version);

        let old = repo.get("p1", v1.version.as_deref()).await.unwrap().unwrap();
        assert_eq!(old.fields["n"], json!(1));
        let current = repo.get("p1", None).await.unwrap().unwrap();
        assert_eq!(current.fields["n"], json!(2));
    }

    #[tokio::test]
    async fn test_obsolete_keeps_record_visible_to_get() {
        let repo = MemoryRepository::new("PatientRecord");
        let v1 = repo.insert(record(json!({})).with_key("p1")).await.unwrap();
        let deleted = repo.obsolete("p1", deletion()).await.unwrap();
        assert!(deleted.is_deleted());
        assert_eq!(deleted.previous_version, v1.version);
        let provenance = deleted.provenance.clone().unwrap();
        assert_eq!(provenance.action, ProvenanceAction::Delete);
        assert_eq!(deleted.deleted_at, Some(provenance.recorded_at));

        let current = repo.get("p1", None).await.unwrap().unwrap();
        assert!(current.is_deleted());
        assert!(repo.obsolete("p1", deletion()).await.is_err());
        assert!(repo.obsolete("missing", deletion()).await.is_err());
    }

    #[tokio::test]
    async fn test_find_pages_and_counts() {
        let repo = MemoryRepository::new("ObservationRecord");
        for i in 0..5 {
            repo.insert(record(json!({"code": "bp"})).with_key(format!("o{i}")))
                .await
                .unwrap();
        }
        repo.obsolete("o4", deletion()).await.unwrap();

        let query = FindQuery::new(NativePredicate::and([
            NativePredicate::NotDeleted,
            NativePredicate::eq("code", "bp"),
        ]))
        .with_page(1, 2);
        let page = repo.find(&query).await.unwrap();
        assert_eq!(page.total, 4);
        let keys: Vec<_> = page.records.iter().filter_map(|r| r.key.clone()).collect();
        assert_eq!(keys, vec!["o1", "o2"]);
    }

    #[test]
    fn test_backend_name_and_len() {
        let repo = MemoryRepository::new("X");
        assert_eq!(repo.backend_name(), "memory");
        assert!(repo.is_empty());
        tokio_test::block_on(repo.insert(NativeRecord::default())).unwrap();
        assert_eq!(repo.len(), 1);
    }
}
