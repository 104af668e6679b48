//! The four operations the engine exposes to its hosts.

use crate::catalog::GridCatalog;
use crate::error::EngineError;
use crate::grid::{Grid, Point};
use crate::overlay::SessionOverlayStore;
use crate::simulation::{Agent, SimulationRunner, SimulationReport};
use std::sync::Arc;
use tracing::info;

/// Catalog plus session overlays, shared by the HTTP and gRPC servers.
pub struct Engine {
    store: SessionOverlayStore,
}

impl Engine {
    pub fn new(catalog: GridCatalog) -> Self {
        Self {
            store: SessionOverlayStore::new(Arc::new(catalog)),
        }
    }

    pub fn catalog(&self) -> &GridCatalog {
        self.store.catalog()
    }

    pub fn sessions(&self) -> &SessionOverlayStore {
        &self.store
    }

    pub fn list_maps(&self) -> Vec<String> {
        self.catalog().names()
    }

    /// Session overlay when one exists for this map, canonical grid otherwise.
    pub async fn get_grid(&self, map: &str, session: Option<&str>) -> Result<Arc<Grid>, EngineError> {
        self.store.resolve(map, non_empty(session)).await
    }

    pub async fn block_cell(
        &self,
        map: &str,
        session: &str,
        x: i64,
        y: i64,
    ) -> Result<Arc<Grid>, EngineError> {
        if session.is_empty() {
            return Err(EngineError::InvalidSession { id: String::new() });
        }
        self.store.block(map, session, Point::new(x, y)).await
    }

    /// Solve every agent against one snapshot of the resolved grid.
    ///
    /// Only map resolution can fail the request; agent failures are reported
    /// inside the returned report.
    pub async fn run_simulation(
        &self,
        map: &str,
        session: Option<&str>,
        agents: Vec<Agent>,
    ) -> Result<SimulationReport, EngineError> {
        let grid = self.get_grid(map, session).await?;
        let total = agents.len();

        let report = tokio::task::spawn_blocking(move || SimulationRunner::new(&grid).run(&agents))
            .await
            .map_err(|e| EngineError::Worker(e.to_string()))?;

        info!(
            map,
            agents = total,
            solved = report.solved(),
            failed = report.failed(),
            "Simulation finished"
        );
        Ok(report)
    }
}

fn non_empty(session: Option<&str>) -> Option<&str> {
    session.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Cell;
    use crate::solver::PathError;

    fn engine() -> Engine {
        Engine::new(GridCatalog::builtin().unwrap())
    }

    #[tokio::test]
    async fn office_block_is_session_scoped() {
        let engine = engine();
        engine.block_cell("Office", "s1", 2, 2).await.unwrap();

        let session = engine.get_grid("Office", Some("s1")).await.unwrap();
        assert_eq!(session.get(Point::new(2, 2)), Some(Cell::Blocked));

        let canonical = engine.get_grid("Office", None).await.unwrap();
        assert_eq!(canonical.get(Point::new(2, 2)), Some(Cell::Walkable));

        // Empty session id reads canonical
        let empty = engine.get_grid("Office", Some("")).await.unwrap();
        assert_eq!(empty.get(Point::new(2, 2)), Some(Cell::Walkable));
    }

    #[tokio::test]
    async fn block_requires_session() {
        let engine = engine();
        assert!(matches!(
            engine.block_cell("Office", "", 0, 0).await,
            Err(EngineError::InvalidSession { .. })
        ));
    }

    #[tokio::test]
    async fn simulation_uses_session_overlay() {
        let engine = engine();
        let agents = vec![Agent::new(Point::new(0, 0), Point::new(2, 2))];

        let before = engine
            .run_simulation("Office", Some("s1"), agents.clone())
            .await
            .unwrap();
        assert!(before.results[0].is_solved());

        engine.block_cell("Office", "s1", 2, 2).await.unwrap();
        let after = engine
            .run_simulation("Office", Some("s1"), agents.clone())
            .await
            .unwrap();
        assert!(matches!(
            after.results[0].error,
            Some(PathError::OnWall { .. })
        ));

        let canonical = engine.run_simulation("Office", None, agents).await.unwrap();
        assert!(canonical.results[0].is_solved());
    }

    #[tokio::test]
    async fn unknown_map_fails_whole_request() {
        let engine = engine();
        assert!(matches!(
            engine.run_simulation("Atlantis", None, Vec::new()).await,
            Err(EngineError::UnknownMap { .. })
        ));
    }
}
