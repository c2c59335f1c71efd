//! Resource handler registry.
//!
//! Handlers are registered once at startup, possibly by several plugin
//! initialisers running concurrently, and read on every request.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use clinbridge_core::{FhirError, ResourceType, Result};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::try_join_all;
use tracing::{debug, info};

use crate::handler::{ResourceHandler, ResourceTypeDescriptor};

/// Lookup table from resource kind to its handler.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: DashMap<ResourceType, Arc<ResourceHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler to its kind.
    ///
    /// # Errors
    ///
    /// Returns `FhirError::DuplicateRegistration` if the kind is already
    /// bound. The existing handler is left in place.
    pub fn register(&self, handler: Arc<ResourceHandler>) -> Result<()> {
        let kind = handler.kind();
        match self.handlers.entry(kind) {
            Entry::Occupied(_) => Err(FhirError::duplicate_registration(kind.as_str())),
            Entry::Vacant(slot) => {
                debug!(resource_type = %kind, native_type = %handler.descriptor.native_type, "Registered handler");
                slot.insert(handler);
                Ok(())
            }
        }
    }

    pub fn unregister(&self, kind: ResourceType) -> Option<Arc<ResourceHandler>> {
        let removed = self.handlers.remove(&kind).map(|(_, handler)| handler);
        if removed.is_some() {
            debug!(resource_type = %kind, "Unregistered handler");
        }
        removed
    }

    /// # Errors
    ///
    /// Returns `FhirError::NotSupported` if no handler serves `kind`.
    pub fn resolve(&self, kind: ResourceType) -> Result<Arc<ResourceHandler>> {
        self.handlers
            .get(&kind)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| FhirError::not_supported(format!("Resource type {kind} is not served")))
    }

    /// Parse a kind literal such as a URL path segment.
    ///
    /// # Errors
    ///
    /// Returns `FhirError::InvalidArgument` for unknown literals.
    pub fn resolve_by_name(&self, literal: &str) -> Result<ResourceType> {
        ResourceType::from_str(literal)
    }

    pub fn contains(&self, kind: ResourceType) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Snapshot of every registered descriptor, ordered by kind.
    pub fn list_all(&self) -> Vec<ResourceTypeDescriptor> {
        let mut descriptors: Vec<_> = self
            .handlers
            .iter()
            .map(|entry| entry.value().descriptor.clone())
            .collect();
        descriptors.sort_by_key(|d| d.kind);
        descriptors
    }

    /// Run plugin initialisers concurrently against this registry.
    ///
    /// # Errors
    ///
    /// Returns the first plugin failure, e.g. a duplicate registration.
    pub async fn install(&self, plugins: &[Arc<dyn HandlerPlugin>]) -> Result<()> {
        try_join_all(plugins.iter().map(|plugin| async move {
            plugin.register(self).await?;
            info!(plugin = %plugin.name(), "Handler plugin installed");
            Ok::<_, FhirError>(())
        }))
        .await?;
        Ok(())
    }
}

/// A unit of startup code contributing handlers.
#[async_trait]
pub trait HandlerPlugin: Send + Sync {
    /// Plugin name for logging.
    fn name(&self) -> &str;

    /// Register this plugin's handlers.
    ///
    /// # Errors
    ///
    /// Propagates registry failures.
    async fn register(&self, registry: &HandlerRegistry) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::DirectMapper;
    use clinbridge_core::ErrorKind;
    use clinbridge_db_memory::create_repository;

    fn handler(kind: ResourceType) -> Arc<ResourceHandler> {
        Arc::new(ResourceHandler::new(
            ResourceTypeDescriptor::new(kind, format!("{kind}Record")),
            Arc::new(DirectMapper::new(kind)),
            create_repository(&format!("{kind}Record")),
        ))
    }

    #[test]
    fn test_resolve_unregistered_is_not_supported() {
        let registry = HandlerRegistry::new();
        let err = registry.resolve(ResourceType::Patient).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
    }

    #[test]
    fn test_resolve_returns_registered_instance() {
        let registry = HandlerRegistry::new();
        let patient = handler(ResourceType::Patient);
        registry.register(Arc::clone(&patient)).unwrap();
        let resolved = registry.resolve(ResourceType::Patient).unwrap();
        assert!(Arc::ptr_eq(&patient, &resolved));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = HandlerRegistry::new();
        let first = handler(ResourceType::Patient);
        registry.register(Arc::clone(&first)).unwrap();
        let err = registry.register(handler(ResourceType::Patient)).unwrap_err();
        assert!(matches!(err, FhirError::DuplicateRegistration(_)));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(Arc::ptr_eq(&first, &registry.resolve(ResourceType::Patient).unwrap()));
    }

    #[test]
    fn test_unregister() {
        let registry = HandlerRegistry::new();
        registry.register(handler(ResourceType::Patient)).unwrap();
        assert!(registry.unregister(ResourceType::Patient).is_some());
        assert!(registry.unregister(ResourceType::Patient).is_none());
        assert!(registry.resolve(ResourceType::Patient).is_err());
    }

    #[test]
    fn test_resolve_by_name() {
        let registry = HandlerRegistry::new();
        assert_eq!(registry.resolve_by_name("Observation").unwrap(), ResourceType::Observation);
        let err = registry.resolve_by_name("Starship").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_list_all_is_sorted() {
        let registry = HandlerRegistry::new();
        registry.register(handler(ResourceType::Practitioner)).unwrap();
        registry.register(handler(ResourceType::Encounter)).unwrap();
        registry.register(handler(ResourceType::Patient)).unwrap();
        let kinds: Vec<_> = registry.list_all().into_iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![ResourceType::Encounter, ResourceType::Patient, ResourceType::Practitioner]
        );
    }

    struct KindsPlugin(Vec<ResourceType>);

    #[async_trait]
    impl HandlerPlugin for KindsPlugin {
        fn name(&self) -> &str {
            "kinds"
        }

        async fn register(&self, registry: &HandlerRegistry) -> Result<()> {
            for kind in &self.0 {
                tokio::task::yield_now().await;
                registry.register(handler(*kind))?;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_concurrent_plugins() {
        let registry = HandlerRegistry::new();
        let plugins: Vec<Arc<dyn HandlerPlugin>> = vec![
            Arc::new(KindsPlugin(vec![ResourceType::Patient, ResourceType::Observation])),
            Arc::new(KindsPlugin(vec![ResourceType::Encounter, ResourceType::Condition])),
        ];
        registry.install(&plugins).await.unwrap();
        assert_eq!(registry.len(), 4);
    }

    #[tokio::test]
    async fn test_plugin_conflict_surfaces() {
        let registry = HandlerRegistry::new();
        let plugins: Vec<Arc<dyn HandlerPlugin>> = vec![
            Arc::new(KindsPlugin(vec![ResourceType::Patient])),
            Arc::new(KindsPlugin(vec![ResourceType::Patient])),
        ];
        let err = registry.install(&plugins).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_reads_during_registration() {
        let registry = Arc::new(HandlerRegistry::new());
        let writer = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                for kind in ResourceType::ALL {
                    registry.register(handler(*kind)).unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };
        let reader = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                for _ in 0..100 {
                    let _ = registry.resolve(ResourceType::Patient);
                    let _ = registry.list_all();
                    tokio::task::yield_now().await;
                }
            })
        };
        writer.await.unwrap();
        reader.await.unwrap();
        assert_eq!(registry.len(), ResourceType::ALL.len());
    }
}
