//! Single-pair A* search over an occupancy grid.

use crate::grid::{Grid, Point};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, trace};

/// Expansion budget per grid cell.
pub const ITERATIONS_PER_CELL: usize = 5;

/// Which end of a requested path an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    Start,
    End,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Start => f.write_str("start"),
            Endpoint::End => f.write_str("end"),
        }
    }
}

/// Per-agent failure. Recorded on the agent's result, never fatal to a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind")]
pub enum PathError {
    #[error("invalid {endpoint} point {point}: out of bounds")]
    OutOfBounds { endpoint: Endpoint, point: Point },

    #[error("invalid {endpoint} point {point}: on a wall")]
    OnWall { endpoint: Endpoint, point: Point },

    /// Covers both a proven-unreachable goal and an exhausted search budget.
    #[error("no path found")]
    NoPathFound,
}

impl PathError {
    pub fn kind(&self) -> &'static str {
        match self {
            PathError::OutOfBounds { .. } => "OutOfBounds",
            PathError::OnWall { .. } => "OnWall",
            PathError::NoPathFound => "NoPathFound",
        }
    }
}

/// Outcome of one search plus the work it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Search {
    pub outcome: Result<Vec<Point>, PathError>,
    pub nodes_expanded: usize,
    /// True when the iteration cap stopped the search with nodes still open.
    pub budget_exhausted: bool,
}

impl Search {
    fn done(outcome: Result<Vec<Point>, PathError>) -> Self {
        Self {
            outcome,
            nodes_expanded: 0,
            budget_exhausted: false,
        }
    }
}

/// Open-set entry. Ordered by `(f, seq)` so that equal `f` scores pop in the
/// order they were discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenNode {
    f: u64,
    seq: u64,
    index: usize,
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behavior
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

const UNSEEN: u64 = u64::MAX;

/// A* planner over a borrowed grid snapshot.
///
/// Moves are 4-connected with unit cost and the heuristic is Manhattan
/// distance, so the first time the goal is popped its path is optimal.
pub struct PathSolver<'a> {
    grid: &'a Grid,
    max_iterations: usize,
}

impl<'a> PathSolver<'a> {
    pub fn new(grid: &'a Grid) -> Self {
        Self {
            grid,
            max_iterations: grid.len().saturating_mul(ITERATIONS_PER_CELL),
        }
    }

    /// Override the expansion budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    fn check_endpoint(&self, endpoint: Endpoint, point: Point) -> Result<usize, PathError> {
        let index = self
            .grid
            .index_of(point)
            .ok_or(PathError::OutOfBounds { endpoint, point })?;
        if !self.grid.is_walkable(point) {
            return Err(PathError::OnWall { endpoint, point });
        }
        Ok(index)
    }

    /// Find the shortest path from `start` to `end`, inclusive of both.
    pub fn find_path(&self, start: Point, end: Point) -> Search {
        trace!(%start, %end, "find_path");

        let start_idx = match self.check_endpoint(Endpoint::Start, start) {
            Ok(i) => i,
            Err(e) => return Search::done(Err(e)),
        };
        let goal_idx = match self.check_endpoint(Endpoint::End, end) {
            Ok(i) => i,
            Err(e) => return Search::done(Err(e)),
        };

        if start_idx == goal_idx {
            return Search::done(Ok(vec![start]));
        }

        let cells = self.grid.len();
        let mut open = BinaryHeap::new();
        let mut closed = vec![false; cells];
        let mut came_from = vec![usize::MAX; cells];
        let mut g_score = vec![UNSEEN; cells];
        let mut seq: u64 = 0;

        g_score[start_idx] = 0;
        open.push(OpenNode {
            f: start.manhattan(end),
            seq,
            index: start_idx,
        });

        let mut iterations = 0;
        while iterations < self.max_iterations {
            let Some(current) = open.pop() else {
                break;
            };
            iterations += 1;

            if closed[current.index] {
                continue;
            }
            closed[current.index] = true;

            if current.index == goal_idx {
                let path = self.reconstruct_path(&came_from, start_idx, goal_idx);
                trace!(
                    steps = path.len(),
                    nodes_expanded = iterations,
                    "path found"
                );
                return Search {
                    outcome: Ok(path),
                    nodes_expanded: iterations,
                    budget_exhausted: false,
                };
            }

            let current_point = self.grid.point_at(current.index);
            let tentative_g = g_score[current.index] + 1;
            for neighbor in current_point.neighbors_4() {
                let Some(n) = self.grid.index_of(neighbor) else {
                    continue;
                };
                if closed[n] || !self.grid.is_walkable(neighbor) {
                    continue;
                }

                if tentative_g < g_score[n] {
                    came_from[n] = current.index;
                    g_score[n] = tentative_g;
                    seq += 1;
                    open.push(OpenNode {
                        f: tentative_g + neighbor.manhattan(end),
                        seq,
                        index: n,
                    });
                }
            }
        }

        let budget_exhausted = !open.is_empty();
        if budget_exhausted {
            debug!(%start, %end, iterations, "search budget exhausted, no path");
        } else {
            debug!(%start, %end, iterations, "goal unreachable");
        }
        Search {
            outcome: Err(PathError::NoPathFound),
            nodes_expanded: iterations,
            budget_exhausted,
        }
    }

    fn reconstruct_path(&self, came_from: &[usize], start_idx: usize, goal_idx: usize) -> Vec<Point> {
        let mut path = vec![self.grid.point_at(goal_idx)];
        let mut current = goal_idx;
        while current != start_idx {
            current = came_from[current];
            path.push(self.grid.point_at(current));
        }
        path.reverse();
        path
    }
}

/// Shortest path between two points on `grid` with the default budget.
pub fn solve(grid: &Grid, start: Point, end: Point) -> Result<Vec<Point>, PathError> {
    PathSolver::new(grid).find_path(start, end).outcome
}
