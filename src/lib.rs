//! Multi-agent path planning over mutable occupancy grids.
//!
//! Canonical maps live in a [`GridCatalog`]. Callers mutate private copies
//! through a [`SessionOverlayStore`], and a [`SimulationRunner`] solves a batch
//! of agents against one grid snapshot with A* and folds their paths into a
//! congestion grid.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod grid;
pub mod grpc_server;
pub mod http_server;
pub mod overlay;
pub mod simulation;
pub mod solver;
pub mod state;

pub use catalog::GridCatalog;
pub use engine::Engine;
pub use error::{EngineError, LoadError};
pub use grid::{Cell, Grid, Point};
pub use overlay::SessionOverlayStore;
pub use simulation::{Agent, CongestionGrid, PathResult, SimulationReport, SimulationRunner};
pub use solver::{solve, PathError, PathSolver};
