//! Batch solving of many agents against one grid snapshot.

use crate::grid::{Grid, Point};
use crate::solver::{PathError, PathSolver};
use rayon::prelude::*;
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

pub type AgentId = u32;

/// A start/end request for one agent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Agent {
    /// Defaults to the agent's 1-based position in the batch.
    #[serde(default)]
    pub id: Option<AgentId>,
    pub start: Point,
    pub end: Point,
}

impl Agent {
    pub fn new(start: Point, end: Point) -> Self {
        Self {
            id: None,
            start,
            end,
        }
    }

    pub fn with_id(mut self, id: AgentId) -> Self {
        self.id = Some(id);
        self
    }
}

/// Outcome for one agent. `path` is empty exactly when `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathResult {
    pub agent_id: AgentId,
    pub start: Point,
    pub end: Point,
    pub path: Vec<Point>,
    pub steps: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PathError>,
}

impl PathResult {
    pub fn is_solved(&self) -> bool {
        !self.path.is_empty()
    }
}

/// Per-cell count of agent paths passing through, same shape as the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CongestionGrid {
    width: usize,
    height: usize,
    counts: Vec<u32>,
}

impl CongestionGrid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            counts: vec![0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, p: Point) -> Option<u32> {
        let x = usize::try_from(p.x).ok()?;
        let y = usize::try_from(p.y).ok()?;
        (x < self.width && y < self.height).then(|| self.counts[y * self.width + x])
    }

    fn increment(&mut self, p: Point) {
        if let (Ok(x), Ok(y)) = (usize::try_from(p.x), usize::try_from(p.y)) {
            if x < self.width && y < self.height {
                self.counts[y * self.width + x] += 1;
            }
        }
    }

    /// Sum over all cells.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }

    /// Row-major counts.
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn to_rows(&self) -> Vec<Vec<u32>> {
        self.counts.chunks(self.width.max(1)).map(<[u32]>::to_vec).collect()
    }
}

impl Serialize for CongestionGrid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_rows().serialize(serializer)
    }
}

/// Results for a whole batch, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub results: Vec<PathResult>,
    pub congestion_grid: CongestionGrid,
}

impl SimulationReport {
    pub fn solved(&self) -> usize {
        self.results.iter().filter(|r| r.is_solved()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.solved()
    }
}

/// Solves every agent against the same grid.
///
/// The grid is borrowed for the whole batch, so every agent sees the same
/// cells even if the session it came from is mutated concurrently.
pub struct SimulationRunner<'a> {
    grid: &'a Grid,
}

impl<'a> SimulationRunner<'a> {
    pub fn new(grid: &'a Grid) -> Self {
        Self { grid }
    }

    pub fn run(&self, agents: &[Agent]) -> SimulationReport {
        let results: Vec<PathResult> = agents
            .par_iter()
            .enumerate()
            .map(|(index, agent)| self.solve_agent(index, agent))
            .collect();

        let mut congestion = CongestionGrid::new(self.grid.width(), self.grid.height());
        for result in &results {
            for point in &result.path {
                congestion.increment(*point);
            }
        }

        SimulationReport {
            results,
            congestion_grid: congestion,
        }
    }

    fn solve_agent(&self, index: usize, agent: &Agent) -> PathResult {
        let agent_id = agent
            .id
            .unwrap_or_else(|| AgentId::try_from(index + 1).unwrap_or(AgentId::MAX));
        let search = PathSolver::new(self.grid).find_path(agent.start, agent.end);
        let (path, error) = match search.outcome {
            Ok(path) => (path, None),
            Err(e) => {
                debug!(agent_id, error = %e, "agent not solved");
                (Vec::new(), Some(e))
            }
        };

        PathResult {
            agent_id,
            start: agent.start,
            end: agent.end,
            steps: path.len(),
            path,
            error,
        }
    }
}

/// Convenience wrapper around [`SimulationRunner::run`].
pub fn run(grid: &Grid, agents: &[Agent]) -> SimulationReport {
    SimulationRunner::new(grid).run(agents)
}
