//! Wires configuration into a ready-to-serve interaction engine.
//!
//! The in-memory backend stands in for the clinical repository: every
//! resource kind gets a [`DirectMapper`] over its own native record store.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clinbridge_api::BundleAssembler;
use clinbridge_core::{ResourceType, Result as FhirResult};
use clinbridge_db_memory::{MemoryAuthorityResolver, MemoryConceptResolver, create_repository};
use clinbridge_engine::{
    DirectMapper, EngineSettings, HandlerPlugin, HandlerRegistry, HookRegistry, InteractionEngine,
    ResourceHandler, ResourceTypeDescriptor,
};
use clinbridge_search::{
    ParameterDescription, ParameterMapLoader, QueryRewriter, RewriterSettings, SchemaRegistry,
    root_type_name,
};
use clinbridge_storage::{DynAuthorityResolver, DynConceptResolver};
use tracing::info;

use crate::config::AppConfig;

/// Registers a field-for-field handler for each configured kind.
#[derive(Debug, Clone)]
pub struct DirectHandlersPlugin {
    kinds: Vec<ResourceType>,
}

impl DirectHandlersPlugin {
    pub fn new(kinds: impl IntoIterator<Item = ResourceType>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    /// Every known resource kind.
    pub fn all() -> Self {
        Self::new(ResourceType::ALL.iter().copied())
    }
}

/// Native record type name used for `kind` in the in-memory backend.
pub fn native_type_name(kind: ResourceType) -> String {
    root_type_name(kind)
}

#[async_trait]
impl HandlerPlugin for DirectHandlersPlugin {
    fn name(&self) -> &str {
        "direct-handlers"
    }

    async fn register(&self, registry: &HandlerRegistry) -> FhirResult<()> {
        for &kind in &self.kinds {
            let native_type = native_type_name(kind);
            registry.register(Arc::new(ResourceHandler::new(
                ResourceTypeDescriptor::new(kind, native_type.as_str()),
                Arc::new(DirectMapper::new(kind)),
                create_repository(&native_type),
            )))?;
        }
        Ok(())
    }
}

/// Shared components of a running adapter.
#[derive(Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub registry: Arc<HandlerRegistry>,
    pub hooks: Arc<HookRegistry>,
    pub parameters: Arc<ParameterMapLoader>,
    /// Native schema used to infer parameter types for capability output.
    pub schema: Arc<SchemaRegistry>,
    pub engine: Arc<InteractionEngine>,
}

impl AppContext {
    /// Build the context with the default handler plugin and empty resolvers.
    pub async fn build(config: AppConfig) -> anyhow::Result<Self> {
        let plugins: Vec<Arc<dyn HandlerPlugin>> = vec![Arc::new(DirectHandlersPlugin::all())];
        Self::build_with(
            config,
            &plugins,
            Arc::new(MemoryAuthorityResolver::new()),
            Arc::new(MemoryConceptResolver::new()),
        )
        .await
    }

    pub async fn build_with(
        config: AppConfig,
        plugins: &[Arc<dyn HandlerPlugin>],
        authorities: DynAuthorityResolver,
        concepts: DynConceptResolver,
    ) -> anyhow::Result<Self> {
        let registry = Arc::new(HandlerRegistry::new());
        registry
            .install(plugins)
            .await
            .context("Failed to install handler plugins")?;

        let parameters = Arc::new(ParameterMapLoader::new(config.parameters.overrides.clone()));
        // Load eagerly so a broken override file fails startup instead of the first search.
        parameters
            .get()
            .await
            .context("Failed to load search parameter map")?;

        let schema = Arc::new(SchemaRegistry::builtin());

        let rewriter = Arc::new(QueryRewriter::new(authorities, concepts).with_settings(
            RewriterSettings {
                default_count: config.search.default_count,
                max_count: config.search.max_count,
            },
        ));
        let hooks = Arc::new(HookRegistry::new());
        let engine = Arc::new(
            InteractionEngine::new(
                registry.clone(),
                hooks.clone(),
                parameters.clone(),
                rewriter,
                BundleAssembler::new(&config.server.base_url),
            )
            .with_settings(EngineSettings {
                max_include: config.search.max_include,
            }),
        );

        info!(
            resource_types = registry.len(),
            base_url = %config.server.base_url,
            "Interaction engine ready"
        );

        Ok(Self {
            config,
            registry,
            hooks,
            parameters,
            schema,
            engine,
        })
    }

    /// Search parameters supported for `kind`, with types inferred from the native schema.
    pub async fn describe(&self, kind: ResourceType) -> anyhow::Result<Vec<ParameterDescription>> {
        let map = self
            .parameters
            .get()
            .await
            .context("Failed to load search parameter map")?;
        Ok(map.describe(kind, &self.schema))
    }
}
