//! # clinbridge-storage
//!
//! Contracts between the interaction pipeline and the clinical repository.
//!
//! This crate defines the native record form, the predicate tree the query
//! rewriter compiles to, and the collaborator traits for persistence and
//! code resolution. It contains no implementations; see `clinbridge-db-memory`.

pub mod model;
pub mod predicate;
pub mod repository;
pub mod resolver;

pub use model::{KEY_FIELD, NativeRecord, Provenance, ProvenanceAction, RECORDED_FIELD};
pub use predicate::{Criterion, NativePredicate, Operator};
pub use repository::{DynRepository, FindPage, FindQuery, Repository, SortKey};
pub use resolver::{
    AuthorityDescriptor, AuthorityResolver, ConceptDescriptor, ConceptResolver,
    DynAuthorityResolver, DynConceptResolver,
};
