//! Canonical, read-only grids keyed by map name.

use crate::error::{EngineError, LoadError};
use crate::grid::Grid;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Map catalog compiled into the binary, used when no catalog file is given.
const BUILTIN_MAPS: &str = include_str!("../maps/maps.json");

/// Immutable set of canonical grids loaded once at startup.
///
/// Grids never change after load, so the catalog can be shared between
/// threads without locking.
#[derive(Debug, Clone, Default)]
pub struct GridCatalog {
    maps: BTreeMap<String, Arc<Grid>>,
}

impl GridCatalog {
    pub fn new(maps: impl IntoIterator<Item = (String, Grid)>) -> Self {
        Self {
            maps: maps
                .into_iter()
                .map(|(name, grid)| (name, Arc::new(grid)))
                .collect(),
        }
    }

    /// Parse a `{ "<name>": [[0, 1, ...], ...] }` catalog document.
    pub fn from_json_str(json: &str) -> Result<Self, LoadError> {
        let raw: BTreeMap<String, Vec<Vec<u8>>> = serde_json::from_str(json)?;
        if raw.is_empty() {
            return Err(LoadError::NoMaps);
        }

        let mut maps = BTreeMap::new();
        for (name, rows) in raw {
            let grid = Grid::from_rows(rows).map_err(|source| LoadError::Shape {
                name: name.clone(),
                source,
            })?;
            maps.insert(name, Arc::new(grid));
        }
        Ok(Self { maps })
    }

    /// Load a catalog file from disk.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let json = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let catalog = Self::from_json_str(&json)?;
        info!(path = %path.display(), maps = ?catalog.names(), "Loaded map catalog");
        Ok(catalog)
    }

    /// The catalog embedded in the binary.
    pub fn builtin() -> Result<Self, LoadError> {
        Self::from_json_str(BUILTIN_MAPS)
    }

    /// Map names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.maps.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Result<Arc<Grid>, EngineError> {
        self.maps
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownMap {
                name: name.to_string(),
            })
    }
}
