//! Lazy, load-once access to the process parameter map.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use crate::parameter_map::{ParameterMap, ParameterMapError};

/// Loads the built-in table plus an optional site override file the first
/// time it is asked for, then hands out the same immutable map.
#[derive(Debug, Default)]
pub struct ParameterMapLoader {
    overrides: Option<PathBuf>,
    cell: OnceCell<Arc<ParameterMap>>,
}

impl ParameterMapLoader {
    pub fn new(overrides: Option<PathBuf>) -> Self {
        Self {
            overrides,
            cell: OnceCell::new(),
        }
    }

    /// A loader that is already initialised with `map`.
    pub fn preloaded(map: ParameterMap) -> Self {
        Self {
            overrides: None,
            cell: OnceCell::new_with(Some(Arc::new(map))),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// Get the map, loading it on first use.
    ///
    /// Concurrent first callers wait for a single load. A failed load is not
    /// cached; the next caller retries.
    pub async fn get(&self) -> Result<Arc<ParameterMap>, ParameterMapError> {
        self.cell
            .get_or_try_init(|| self.load())
            .await
            .map(Arc::clone)
    }

    async fn load(&self) -> Result<Arc<ParameterMap>, ParameterMapError> {
        let mut builder = ParameterMap::builder().builtin()?;
        if let Some(path) = &self.overrides {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ParameterMapError::Io {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
            builder = builder.layer(&path.display().to_string(), &text)?;
        }
        info!(
            overrides = ?self.overrides.as_ref().map(|p| p.display().to_string()),
            "Loaded search parameter map"
        );
        Ok(Arc::new(builder.build()))
    }
}
