//! Generic resource interaction pipeline.
//!
//! - [`HandlerRegistry`]: resource kind to [`ResourceHandler`]
//! - [`InteractionEngine`]: create/read/update/delete/search/history for every kind
//! - [`HookRegistry`]: ordered interceptors around each interaction
//!
//! # Example
//!
//! ```ignore
//! let registry = Arc::new(HandlerRegistry::new());
//! registry.register(Arc::new(ResourceHandler::new(
//!     ResourceTypeDescriptor::new(ResourceType::Patient, "PersonRecord"),
//!     Arc::new(DirectMapper::new(ResourceType::Patient)),
//!     create_repository("PersonRecord"),
//! )))?;
//! let engine = InteractionEngine::new(registry, hooks, loader, rewriter, assembler);
//! let patient = engine.read(&ctx, ResourceType::Patient, &id, None).await?;
//! ```

pub mod engine;
pub mod handler;
pub mod hooks;
pub mod lifecycle;
pub mod mapper;
pub mod registry;
pub mod request;

pub use engine::{DEFAULT_MAX_INCLUDE, EngineSettings, InteractionEngine};
pub use handler::{
    DynResourceMapper, Interaction, ResourceHandler, ResourceMapper, ResourceTypeDescriptor,
    VersioningMode,
};
pub use hooks::{DynInteractionHook, HookRegistry, InteractionHook};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use mapper::DirectMapper;
pub use registry::{HandlerPlugin, HandlerRegistry};
pub use request::{InteractionOutcome, InteractionRequest};
