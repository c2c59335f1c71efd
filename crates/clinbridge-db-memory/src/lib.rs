//! In-memory repository backend for Clinbridge.
//!
//! Provides a [`Repository`](clinbridge_storage::Repository) implementation
//! built on papaya's lock-free HashMap plus table-backed authority and concept
//! resolvers. Used for local runs and as the test double of the engine.
//!
//! # Example
//!
//! ```ignore
//! use clinbridge_db_memory::MemoryRepository;
//! use clinbridge_storage::{NativeRecord, Repository};
//!
//! let repo = MemoryRepository::new("PatientRecord");
//! let stored = repo.insert(NativeRecord::default()).await?;
//! ```

pub mod query;
pub mod resolver;
pub mod storage;

pub use resolver::{MemoryAuthorityResolver, MemoryConceptResolver};
pub use storage::MemoryRepository;

/// Creates a shareable in-memory repository.
pub fn create_repository(native_type: &str) -> clinbridge_storage::DynRepository {
    std::sync::Arc::new(MemoryRepository::new(native_type))
}
