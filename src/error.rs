//! Request-level and catalog-loading errors.
//!
//! Per-agent failures inside a simulation batch are not errors at this level;
//! they are recorded on each agent's result as a [`crate::solver::PathError`].

use crate::grid::{GridShapeError, Point};
use thiserror::Error;

/// Failure of a whole engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("unknown map: {name}")]
    UnknownMap { name: String },

    #[error("point {point} is outside the {width}x{height} grid")]
    OutOfBounds {
        point: Point,
        width: usize,
        height: usize,
    },

    #[error("unknown session: {id}")]
    InvalidSession { id: String },

    #[error("simulation worker failed: {0}")]
    Worker(String),
}

/// Failure while building the canonical map catalog.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read map catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("map catalog is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("map '{name}' is malformed: {source}")]
    Shape {
        name: String,
        #[source]
        source: GridShapeError,
    },

    #[error("map catalog contains no maps")]
    NoMaps,
}
