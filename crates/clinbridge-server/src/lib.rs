pub mod bootstrap;
pub mod config;
pub mod observability;

pub use bootstrap::{AppContext, DirectHandlersPlugin};
pub use config::{AppConfig, LoggingConfig, ParametersConfig, SearchSettings, ServerConfig};
pub use observability::{init_tracing, shutdown_tracing};
