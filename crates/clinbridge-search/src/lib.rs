//! Search parameter mapping and query rewriting.
//!
//! - [`ParameterMap`]: external parameter names to native field paths
//! - [`QueryRewriter`]: compiles parameters into a [`NativePredicate`](clinbridge_storage::NativePredicate)
//! - [`SchemaRegistry`]: type inference for capability output

pub mod include;
pub mod loader;
pub mod parameter_map;
pub mod parameters;
pub mod parser;
pub mod query_state;
pub mod rewriter;
pub mod schema;

pub use include::{IncludeInstruction, parse_include};
pub use loader::ParameterMapLoader;
pub use parameter_map::{
    ParameterDescription, ParameterMap, ParameterMapBuilder, ParameterMapError, ParameterMapping,
};
pub use parameters::{SearchModifier, SearchParameterType, SearchPrefix};
pub use parser::SearchParams;
pub use query_state::QueryState;
pub use rewriter::{
    PAGINATION_PARAMS, QueryRewriter, RewriterSettings, RewrittenQuery,
};
pub use schema::{
    FieldType, PrimitiveType, SchemaError, SchemaRegistry, TypeSchema, root_type_name,
};
