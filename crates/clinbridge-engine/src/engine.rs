//! The generic interaction engine.
//!
//! One engine serves every registered kind. Each call walks the lifecycle
//! `Received → Mapped → Executed → MappedBack → Responded` (or `Faulted`),
//! delegating the kind-specific work to the resolved [`ResourceHandler`].

use std::collections::HashSet;
use std::sync::Arc;

use clinbridge_api::{Bundle, BundleAssembler};
use clinbridge_core::{
    FhirError, RequestContext, ResourceType, Result, now_utc, parse_native_key, parse_reference,
    parse_version_id,
};
use clinbridge_search::{IncludeInstruction, ParameterMapLoader, QueryRewriter, SearchParams};
use clinbridge_storage::{
    FindQuery, NativePredicate, NativeRecord, Provenance, ProvenanceAction,
};
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{Instrument, Span, debug, info_span, warn};

use crate::handler::{DynResourceMapper, Interaction, ResourceHandler, VersioningMode};
use crate::hooks::HookRegistry;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::registry::HandlerRegistry;
use crate::request::{InteractionOutcome, InteractionRequest};

/// Default cap on resources added by `_include`/`_revinclude` per page.
pub const DEFAULT_MAX_INCLUDE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub max_include: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_include: DEFAULT_MAX_INCLUDE,
        }
    }
}

type MappingJob = (DynResourceMapper, NativeRecord);

pub struct InteractionEngine {
    registry: Arc<HandlerRegistry>,
    hooks: Arc<HookRegistry>,
    parameters: Arc<ParameterMapLoader>,
    rewriter: Arc<QueryRewriter>,
    assembler: BundleAssembler,
    settings: EngineSettings,
}

impl InteractionEngine {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        hooks: Arc<HookRegistry>,
        parameters: Arc<ParameterMapLoader>,
        rewriter: Arc<QueryRewriter>,
        assembler: BundleAssembler,
    ) -> Self {
        Self {
            registry,
            hooks,
            parameters,
            rewriter,
            assembler,
            settings: EngineSettings::default(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    pub fn assembler(&self) -> &BundleAssembler {
        &self.assembler
    }

    // ========================================================================
    // Public surface
    // ========================================================================

    pub async fn create(&self, ctx: &RequestContext, kind: ResourceType, body: Value) -> Result<Value> {
        self.execute(ctx, InteractionRequest::create(kind, body))
            .await?
            .into_resource()
    }

    pub async fn read(
        &self,
        ctx: &RequestContext,
        kind: ResourceType,
        id: &str,
        version: Option<&str>,
    ) -> Result<Value> {
        self.execute(ctx, InteractionRequest::read(kind, id, version.map(str::to_owned)))
            .await?
            .into_resource()
    }

    pub async fn update(
        &self,
        ctx: &RequestContext,
        kind: ResourceType,
        id: &str,
        body: Value,
    ) -> Result<Value> {
        self.execute(ctx, InteractionRequest::update(kind, id, body))
            .await?
            .into_resource()
    }

    pub async fn delete(&self, ctx: &RequestContext, kind: ResourceType, id: &str) -> Result<Value> {
        self.execute(ctx, InteractionRequest::delete(kind, id))
            .await?
            .into_resource()
    }

    pub async fn search(
        &self,
        ctx: &RequestContext,
        kind: ResourceType,
        params: SearchParams,
    ) -> Result<Bundle> {
        self.execute(ctx, InteractionRequest::search(kind, params))
            .await?
            .into_bundle()
    }

    pub async fn history(&self, ctx: &RequestContext, kind: ResourceType, id: &str) -> Result<Bundle> {
        self.execute(ctx, InteractionRequest::history(kind, id))
            .await?
            .into_bundle()
    }

    /// Apply a list of writes in order and report each outcome.
    ///
    /// Non-write entries are rejected before anything runs. The first failing
    /// write aborts the rest; writes already applied are not rolled back.
    pub async fn transaction(
        &self,
        ctx: &RequestContext,
        requests: Vec<InteractionRequest>,
    ) -> Result<Bundle> {
        if let Some(request) = requests.iter().find(|r| !r.interaction.is_write()) {
            return Err(FhirError::invalid_argument(format!(
                "{} is not allowed in a transaction",
                request.interaction
            )));
        }

        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            let interaction = request.interaction;
            let resource = self.execute(ctx, request).await?.into_resource()?;
            let outcome = match interaction {
                Interaction::Create => ("201 Created", Some(resource)),
                Interaction::Delete => ("204 No Content", None),
                _ => ("200 OK", Some(resource)),
            };
            outcomes.push((outcome.0.to_string(), outcome.1));
        }
        Ok(self.assembler.transaction_response(outcomes))
    }

    /// Run one interaction.
    ///
    /// This is the single entry point every operation goes through: it opens
    /// the interaction span, tracks the lifecycle and logs faults before
    /// handing them back to the caller.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        request: InteractionRequest,
    ) -> Result<InteractionOutcome> {
        let mut lifecycle = Lifecycle::new(request.interaction, request.kind);
        let span = info_span!(
            "interaction",
            interaction = %request.interaction,
            resource_type = %request.kind,
            id = request.id.as_deref().unwrap_or_default(),
            request_id = %ctx.request_id,
        );
        let result = self
            .dispatch(ctx, request, &mut lifecycle)
            .instrument(span.clone())
            .await;
        span.in_scope(|| lifecycle.finish(result))
    }

    async fn dispatch(
        &self,
        ctx: &RequestContext,
        mut request: InteractionRequest,
        lifecycle: &mut Lifecycle,
    ) -> Result<InteractionOutcome> {
        let handler = self.registry.resolve(request.kind)?;
        if !handler.descriptor.supports(request.interaction) {
            return Err(FhirError::not_supported(format!(
                "{} is not supported for {}",
                request.interaction, request.kind
            )));
        }
        let validates_body = matches!(request.interaction, Interaction::Create | Interaction::Update);
        if validates_body {
            handler.descriptor.validate_body(request.require_body()?)?;
        }

        let (kind, interaction) = (request.kind, request.interaction);
        self.hooks.run_before(ctx, &mut request).await?;
        // Pre hooks may rewrite the payload but not retarget the request.
        if request.kind != kind || request.interaction != interaction {
            return Err(FhirError::internal(format!(
                "pre hook changed {interaction} {kind} into {} {}",
                request.interaction, request.kind
            )));
        }
        if validates_body {
            handler.descriptor.validate_body(request.require_body()?)?;
        }

        match request.interaction {
            Interaction::Create => self
                .create_resource(ctx, &handler, &request, lifecycle)
                .await
                .map(InteractionOutcome::Resource),
            Interaction::Read => self
                .read_resource(ctx, &handler, &request, lifecycle)
                .await
                .map(InteractionOutcome::Resource),
            Interaction::Update => self
                .update_resource(ctx, &handler, &request, lifecycle)
                .await
                .map(InteractionOutcome::Resource),
            Interaction::Delete => self
                .delete_resource(ctx, &handler, &request, lifecycle)
                .await
                .map(InteractionOutcome::Resource),
            Interaction::Search => self
                .search_resources(ctx, &handler, &request, lifecycle)
                .await
                .map(InteractionOutcome::Bundle),
            Interaction::History => self
                .resource_history(ctx, &handler, &request, lifecycle)
                .await
                .map(InteractionOutcome::Bundle),
        }
    }

    // ========================================================================
    // Interactions
    // ========================================================================

    async fn create_resource(
        &self,
        ctx: &RequestContext,
        handler: &ResourceHandler,
        request: &InteractionRequest,
        lifecycle: &mut Lifecycle,
    ) -> Result<Value> {
        let body = request.require_body()?.clone();
        let mut record = handler.mapper.to_native(body, ctx).await?;
        // Ids are assigned by the repository on create.
        record.key = None;
        stamp_provenance(&mut record, ctx, ProvenanceAction::Create);
        lifecycle.advance(LifecycleState::Mapped);

        let stored = handler.repository.insert(record).await?;
        lifecycle.advance(LifecycleState::Executed);

        let mut resource = handler.mapper.to_external(stored, ctx).await?;
        lifecycle.advance(LifecycleState::MappedBack);

        self.hooks.run_after_resource(ctx, request, &mut resource).await?;
        Ok(resource)
    }

    async fn read_resource(
        &self,
        ctx: &RequestContext,
        handler: &ResourceHandler,
        request: &InteractionRequest,
        lifecycle: &mut Lifecycle,
    ) -> Result<Value> {
        let key = parse_native_key(request.require_id()?, handler.descriptor.key_format)?;
        let version = request.version.as_deref().map(parse_version_id).transpose()?;
        lifecycle.advance(LifecycleState::Mapped);

        let record = fetch_record(handler, &key, version.as_deref()).await?;
        lifecycle.advance(LifecycleState::Executed);

        let mut resource = handler.mapper.to_external(record, ctx).await?;
        lifecycle.advance(LifecycleState::MappedBack);

        self.hooks.run_after_resource(ctx, request, &mut resource).await?;
        Ok(resource)
    }

    async fn update_resource(
        &self,
        ctx: &RequestContext,
        handler: &ResourceHandler,
        request: &InteractionRequest,
        lifecycle: &mut Lifecycle,
    ) -> Result<Value> {
        let id = request.require_id()?;
        let format = handler.descriptor.key_format;
        let key = parse_native_key(id, format)?;
        let body = request.require_body()?.clone();

        if let Some(embedded) = body.get("id").and_then(Value::as_str)
            && !parse_native_key(embedded, format).is_ok_and(|k| k == key)
        {
            return Err(FhirError::conflict(format!(
                "Resource id '{embedded}' does not match path id '{id}'"
            )));
        }

        let mut record = handler.mapper.to_native(body, ctx).await?;
        if record.key.as_deref() != Some(key.as_str()) {
            record.key = Some(key);
        }
        stamp_provenance(&mut record, ctx, ProvenanceAction::Update);
        lifecycle.advance(LifecycleState::Mapped);

        let stored = handler.repository.save(record).await?;
        lifecycle.advance(LifecycleState::Executed);

        let mut resource = handler.mapper.to_external(stored, ctx).await?;
        lifecycle.advance(LifecycleState::MappedBack);

        self.hooks.run_after_resource(ctx, request, &mut resource).await?;
        Ok(resource)
    }

    async fn delete_resource(
        &self,
        ctx: &RequestContext,
        handler: &ResourceHandler,
        request: &InteractionRequest,
        lifecycle: &mut Lifecycle,
    ) -> Result<Value> {
        let key = parse_native_key(request.require_id()?, handler.descriptor.key_format)?;
        lifecycle.advance(LifecycleState::Mapped);

        let obsolete = handler
            .repository
            .obsolete(&key, provenance(ctx, ProvenanceAction::Delete))
            .await?;
        lifecycle.advance(LifecycleState::Executed);

        let mut resource = handler.mapper.to_external(obsolete, ctx).await?;
        lifecycle.advance(LifecycleState::MappedBack);

        self.hooks.run_after_resource(ctx, request, &mut resource).await?;
        Ok(resource)
    }

    async fn search_resources(
        &self,
        ctx: &RequestContext,
        handler: &ResourceHandler,
        request: &InteractionRequest,
        lifecycle: &mut Lifecycle,
    ) -> Result<Bundle> {
        let kind = handler.kind();
        let map = self
            .parameters
            .get()
            .await
            .map_err(|e| FhirError::internal(e.to_string()))?;
        let rewritten = self.rewriter.rewrite(kind, &request.params, &map).await?;
        debug!(predicate = %rewritten.predicate, offset = rewritten.state.offset, count = rewritten.state.count, "Compiled search");
        lifecycle.advance(LifecycleState::Mapped);

        let page = handler.repository.find(&rewritten.find_query()).await?;
        let related = self
            .resolve_includes(kind, &page.records, &rewritten.includes)
            .await?;
        lifecycle.advance(LifecycleState::Executed);

        let matches = self
            .map_all(
                ctx,
                page.records
                    .into_iter()
                    .map(|record| (Arc::clone(&handler.mapper), record))
                    .collect(),
            )
            .await?;
        let included = self.map_all(ctx, related).await?;
        lifecycle.advance(LifecycleState::MappedBack);

        let state = rewritten.state.clone().with_total(page.total);
        let mut bundle = self
            .assembler
            .searchset(kind, matches, included, &rewritten.echo, &state);
        self.hooks.run_after_bundle(ctx, request, &mut bundle).await?;
        Ok(bundle)
    }

    async fn resource_history(
        &self,
        ctx: &RequestContext,
        handler: &ResourceHandler,
        request: &InteractionRequest,
        lifecycle: &mut Lifecycle,
    ) -> Result<Bundle> {
        let key = parse_native_key(request.require_id()?, handler.descriptor.key_format)?;
        lifecycle.advance(LifecycleState::Mapped);

        let current = fetch_record(handler, &key, None).await?;
        let versions = match handler.descriptor.versioning {
            VersioningMode::None => vec![current],
            VersioningMode::VersionChain => version_chain(handler, &key, current).await?,
        };
        lifecycle.advance(LifecycleState::Executed);

        let resources = self
            .map_all(
                ctx,
                versions
                    .into_iter()
                    .map(|record| (Arc::clone(&handler.mapper), record))
                    .collect(),
            )
            .await?;
        lifecycle.advance(LifecycleState::MappedBack);

        let mut bundle = self.assembler.history(handler.kind(), &key, resources);
        self.hooks.run_after_bundle(ctx, request, &mut bundle).await?;
        Ok(bundle)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Map records to their external form concurrently.
    ///
    /// Every task gets its own clone of the caller's context; results come
    /// back in input order. The first failure drops the set, aborting the
    /// remaining tasks.
    async fn map_all(&self, ctx: &RequestContext, jobs: Vec<MappingJob>) -> Result<Vec<Value>> {
        let total = jobs.len();
        let mut tasks = JoinSet::new();
        for (index, (mapper, record)) in jobs.into_iter().enumerate() {
            let ctx = ctx.clone();
            tasks.spawn(
                async move { (index, mapper.to_external(record, &ctx).await) }
                    .instrument(Span::current()),
            );
        }

        let mut slots: Vec<Option<Value>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            let (index, mapped) =
                joined.map_err(|e| FhirError::internal(format!("Mapping task failed: {e}")))?;
            slots[index] = Some(mapped?);
        }
        Ok(slots.into_iter().flatten().collect())
    }

    /// Load the records named by include directives, deduplicated and capped
    /// at `max_include`. Matches themselves are never repeated.
    async fn resolve_includes(
        &self,
        kind: ResourceType,
        matches: &[NativeRecord],
        includes: &[IncludeInstruction],
    ) -> Result<Vec<MappingJob>> {
        let mut seen: HashSet<(ResourceType, String)> = matches
            .iter()
            .filter_map(|r| r.key.clone().map(|key| (kind, key)))
            .collect();
        let mut jobs = Vec::new();

        for instruction in includes {
            let found = if instruction.reverse {
                self.reverse_include(kind, matches, instruction).await?
            } else {
                self.forward_include(kind, matches, instruction).await?
            };
            for (handler, record) in found {
                let Some(key) = record.key.clone() else {
                    continue;
                };
                if !seen.insert((handler.kind(), key)) {
                    continue;
                }
                if jobs.len() >= self.settings.max_include {
                    warn!(limit = self.settings.max_include, "Include limit reached");
                    return Ok(jobs);
                }
                jobs.push((Arc::clone(&handler.mapper), record));
            }
        }
        Ok(jobs)
    }

    /// Follow references held by the matches.
    async fn forward_include(
        &self,
        kind: ResourceType,
        matches: &[NativeRecord],
        instruction: &IncludeInstruction,
    ) -> Result<Vec<(Arc<ResourceHandler>, NativeRecord)>> {
        let mut found = Vec::new();
        if instruction.kind != kind {
            debug!(include = %instruction.kind, searched = %kind, "Skipping include for another kind");
            return Ok(found);
        }

        for record in matches {
            for value in record.values(&instruction.join_path) {
                let Some(raw) = value.as_str() else {
                    continue;
                };
                let Ok(reference) = parse_reference(raw) else {
                    debug!(reference = %raw, "Skipping unresolvable reference");
                    continue;
                };
                let Some(target) = reference.resource_type.or(instruction.target) else {
                    continue;
                };
                if instruction.target.is_some_and(|t| t != target) {
                    continue;
                }
                let Ok(handler) = self.registry.resolve(target) else {
                    debug!(target = %target, "No handler for included kind");
                    continue;
                };
                let Ok(key) = parse_native_key(&reference.id, handler.descriptor.key_format) else {
                    continue;
                };
                if let Some(related) = handler.repository.get(&key, None).await?
                    && !related.is_deleted()
                {
                    found.push((Arc::clone(&handler), related));
                }
            }
        }
        Ok(found)
    }

    /// Find records of the directive's kind pointing at the matches.
    async fn reverse_include(
        &self,
        kind: ResourceType,
        matches: &[NativeRecord],
        instruction: &IncludeInstruction,
    ) -> Result<Vec<(Arc<ResourceHandler>, NativeRecord)>> {
        if instruction.target.is_some_and(|t| t != kind) {
            return Ok(Vec::new());
        }
        let Ok(handler) = self.registry.resolve(instruction.kind) else {
            debug!(source = %instruction.kind, "No handler for revincluded kind");
            return Ok(Vec::new());
        };
        let keys: Vec<&str> = matches.iter().filter_map(|r| r.key.as_deref()).collect();
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let predicate = NativePredicate::and([
            NativePredicate::NotDeleted,
            NativePredicate::or(
                keys.iter()
                    .map(|key| NativePredicate::eq(instruction.join_path.as_str(), *key)),
            ),
        ]);
        let query = FindQuery::new(predicate).with_page(0, self.settings.max_include);
        let page = handler.repository.find(&query).await?;
        Ok(page
            .records
            .into_iter()
            .map(|record| (Arc::clone(&handler), record))
            .collect())
    }
}

impl std::fmt::Debug for InteractionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionEngine")
            .field("kinds", &self.registry.len())
            .field("hooks", &self.hooks.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn provenance(ctx: &RequestContext, action: ProvenanceAction) -> Provenance {
    Provenance {
        author: ctx.author().map(str::to_owned),
        recorded_at: now_utc(),
        action,
    }
}

fn stamp_provenance(record: &mut NativeRecord, ctx: &RequestContext, action: ProvenanceAction) {
    record.provenance = Some(provenance(ctx, action));
}

/// Fetch a record applying read visibility: a logically deleted record is
/// `Gone` unless a version was asked for explicitly.
async fn fetch_record(
    handler: &ResourceHandler,
    key: &str,
    version: Option<&str>,
) -> Result<NativeRecord> {
    let kind = handler.kind();
    let record = handler
        .repository
        .get(key, version)
        .await?
        .ok_or_else(|| FhirError::not_found(kind.as_str(), key))?;
    if version.is_none()
        && let Some(deleted_at) = record.deleted_at
    {
        return Err(FhirError::gone(kind.as_str(), key, deleted_at));
    }
    Ok(record)
}

/// Walk `previous_version` links from `current`, newest first.
async fn version_chain(
    handler: &ResourceHandler,
    key: &str,
    current: NativeRecord,
) -> Result<Vec<NativeRecord>> {
    let mut seen: HashSet<String> = current.version.iter().cloned().collect();
    let mut previous = current.previous_version.clone();
    let mut versions = vec![current];

    while let Some(version) = previous {
        if !seen.insert(version.clone()) {
            warn!(key = %key, version = %version, "Version chain loops back; stopping");
            break;
        }
        match handler.repository.get(key, Some(&version)).await? {
            Some(record) => {
                previous = record.previous_version.clone();
                versions.push(record);
            }
            None => {
                warn!(key = %key, version = %version, "Version chain broken; stopping");
                break;
            }
        }
    }
    Ok(versions)
}
