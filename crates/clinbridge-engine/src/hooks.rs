//! Ordered interceptors run around each interaction.
//!
//! Pre hooks run in ascending `order`, post hooks in descending `order`;
//! within one `order` value registration order is kept. Hook failures
//! propagate and abort the interaction.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use clinbridge_api::Bundle;
use clinbridge_core::{RequestContext, ResourceType, Result};
use serde_json::Value;
use tracing::debug;

use crate::handler::Interaction;
use crate::request::InteractionRequest;

/// An interceptor around engine interactions.
///
/// Every method defaults to a no-op so implementations override only the
/// phases they care about.
#[async_trait]
pub trait InteractionHook: Send + Sync {
    /// Unique name for this hook (for logging).
    fn name(&self) -> &str;

    /// Kinds this hook applies to. Empty matches every kind.
    fn resource_types(&self) -> &[ResourceType] {
        &[]
    }

    /// Interactions this hook applies to. Empty matches every interaction.
    fn interactions(&self) -> &[Interaction] {
        &[]
    }

    /// Runs before the request is mapped; may rewrite the body or params.
    async fn before(&self, _ctx: &RequestContext, _request: &mut InteractionRequest) -> Result<()> {
        Ok(())
    }

    /// Runs on single-resource responses.
    async fn after_resource(
        &self,
        _ctx: &RequestContext,
        _request: &InteractionRequest,
        _resource: &mut Value,
    ) -> Result<()> {
        Ok(())
    }

    /// Runs on searchset and history bundles.
    async fn after_bundle(
        &self,
        _ctx: &RequestContext,
        _request: &InteractionRequest,
        _bundle: &mut Bundle,
    ) -> Result<()> {
        Ok(())
    }

    fn matches(&self, kind: ResourceType, interaction: Interaction) -> bool {
        let kinds = self.resource_types();
        if !kinds.is_empty() && !kinds.contains(&kind) {
            return false;
        }
        let interactions = self.interactions();
        interactions.is_empty() || interactions.contains(&interaction)
    }
}

pub type DynInteractionHook = Arc<dyn InteractionHook>;

#[derive(Clone)]
struct RegisteredHook {
    order: i32,
    hook: DynInteractionHook,
}

/// Hooks sorted for each phase.
#[derive(Clone, Default)]
struct HookSet {
    pre: Vec<RegisteredHook>,
    post: Vec<RegisteredHook>,
}

// ============================================================================
// Hook Registry
// ============================================================================

/// Registry of interaction hooks.
///
/// Registration swaps in a new snapshot; the request path only loads the
/// current snapshot and never blocks on writers.
#[derive(Default)]
pub struct HookRegistry {
    hooks: ArcSwap<HookSet>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, order: i32, hook: DynInteractionHook) {
        let name = hook.name().to_string();
        self.hooks.rcu(|current| {
            let mut next = HookSet::clone(current);
            let entry = RegisteredHook {
                order,
                hook: Arc::clone(&hook),
            };
            // Stable sorts keep registration order within one `order`.
            next.pre.push(entry.clone());
            next.pre.sort_by_key(|h| h.order);
            next.post.push(entry);
            next.post.sort_by_key(|h| std::cmp::Reverse(h.order));
            next
        });
        debug!(hook = %name, order, "Registered interaction hook");
    }

    pub fn len(&self) -> usize {
        self.hooks.load().pre.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hook names in pre-phase order.
    pub fn names(&self) -> Vec<String> {
        self.hooks
            .load()
            .pre
            .iter()
            .map(|h| h.hook.name().to_string())
            .collect()
    }

    pub async fn run_before(&self, ctx: &RequestContext, request: &mut InteractionRequest) -> Result<()> {
        let snapshot = self.hooks.load_full();
        for entry in &snapshot.pre {
            if entry.hook.matches(request.kind, request.interaction) {
                debug!(hook = %entry.hook.name(), "Running pre hook");
                entry.hook.before(ctx, request).await?;
            }
        }
        Ok(())
    }

    pub async fn run_after_resource(
        &self,
        ctx: &RequestContext,
        request: &InteractionRequest,
        resource: &mut Value,
    ) -> Result<()> {
        let snapshot = self.hooks.load_full();
        for entry in &snapshot.post {
            if entry.hook.matches(request.kind, request.interaction) {
                entry.hook.after_resource(ctx, request, resource).await?;
            }
        }
        Ok(())
    }

    pub async fn run_after_bundle(
        &self,
        ctx: &RequestContext,
        request: &InteractionRequest,
        bundle: &mut Bundle,
    ) -> Result<()> {
        let snapshot = self.hooks.load_full();
        for entry in &snapshot.post {
            if entry.hook.matches(request.kind, request.interaction) {
                entry.hook.after_bundle(ctx, request, bundle).await?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.names())
            .finish()
    }
}
