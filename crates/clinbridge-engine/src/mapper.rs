//! Field-for-field mapper for kinds whose native form mirrors the resource.

use async_trait::async_trait;
use clinbridge_core::{FhirError, RequestContext, ResourceType, Result};
use clinbridge_storage::NativeRecord;
use serde_json::{Map, Value, json};

use crate::handler::ResourceMapper;

/// Copies resource fields straight into the native field map.
///
/// `id` becomes the native key and `meta` is regenerated from the record's
/// version and provenance on the way out.
#[derive(Debug, Clone, Copy)]
pub struct DirectMapper {
    kind: ResourceType,
}

impl DirectMapper {
    pub fn new(kind: ResourceType) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl ResourceMapper for DirectMapper {
    async fn to_native(&self, resource: Value, _ctx: &RequestContext) -> Result<NativeRecord> {
        let Value::Object(mut fields) = resource else {
            return Err(FhirError::validation(format!(
                "{} must be a JSON object",
                self.kind
            )));
        };
        fields.remove("resourceType");
        fields.remove("meta");
        let key = match fields.remove("id") {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(id),
            Some(other) => {
                return Err(FhirError::validation(format!(
                    "{}.id must be a string, got {other}",
                    self.kind
                )));
            }
        };
        Ok(NativeRecord {
            key,
            fields,
            ..Default::default()
        })
    }

    async fn to_external(&self, record: NativeRecord, _ctx: &RequestContext) -> Result<Value> {
        let mut resource = Map::with_capacity(record.fields.len() + 3);
        resource.insert("resourceType".into(), Value::String(self.kind.as_str().into()));
        if let Some(key) = &record.key {
            resource.insert("id".into(), Value::String(key.clone()));
        }

        let mut meta = Map::new();
        if let Some(version) = &record.version {
            meta.insert("versionId".into(), json!(version));
        }
        if let Some(provenance) = &record.provenance {
            meta.insert("lastUpdated".into(), json!(provenance.recorded_at.to_string()));
        }
        if !meta.is_empty() {
            resource.insert("meta".into(), Value::Object(meta));
        }

        resource.extend(record.fields);
        Ok(Value::Object(resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinbridge_core::{ErrorKind, now_utc};
    use clinbridge_storage::{Provenance, ProvenanceAction};

    #[tokio::test]
    async fn test_to_native_strips_envelope() {
        let mapper = DirectMapper::new(ResourceType::Patient);
        let ctx = RequestContext::anonymous();
        let record = mapper
            .to_native(
                json!({"resourceType": "Patient", "id": "p1", "meta": {"versionId": "9"}, "active": true}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(record.key.as_deref(), Some("p1"));
        assert_eq!(record.fields.len(), 1);
        assert_eq!(record.fields["active"], true);
    }

    #[tokio::test]
    async fn test_to_native_rejects_bad_shapes() {
        let mapper = DirectMapper::new(ResourceType::Patient);
        let ctx = RequestContext::anonymous();
        let err = mapper.to_native(json!("Patient"), &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = mapper
            .to_native(json!({"resourceType": "Patient", "id": 7}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_to_external_builds_meta() {
        let mapper = DirectMapper::new(ResourceType::Patient);
        let recorded_at = now_utc();
        let record = NativeRecord {
            key: Some("p1".into()),
            version: Some("3".into()),
            provenance: Some(Provenance {
                author: Some("u1".into()),
                recorded_at,
                action: ProvenanceAction::Update,
            }),
            ..Default::default()
        }
        .with_field("gender", json!("female"));

        let resource = mapper
            .to_external(record, &RequestContext::anonymous())
            .await
            .unwrap();
        assert_eq!(resource["resourceType"], "Patient");
        assert_eq!(resource["id"], "p1");
        assert_eq!(resource["meta"]["versionId"], "3");
        assert_eq!(resource["meta"]["lastUpdated"], recorded_at.to_string());
        assert_eq!(resource["gender"], "female");
    }
}
