//! A* pathfinding on the walkability grid
//!
//! Searches with octile costs, steers around other agents through the
//! occupancy cost model, and collapses the cell chain into the turning points
//! an agent actually needs to visit.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use glam::{IVec2, Vec3};
use serde::{Deserialize, Serialize};

use super::grid::Grid;
use super::occupancy::{AgentQuery, NoAgents, OccupancyCost, Requester};

/// Cost of a cardinal step
pub const CARDINAL_COST: u32 = 10;
/// Cost of a diagonal step (10 * sqrt(2), rounded)
pub const DIAGONAL_COST: u32 = 14;

const NEIGHBORS_4: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const NEIGHBORS_8: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

const NO_PARENT: u32 = u32::MAX;
const PENALTY_UNKNOWN: u32 = u32::MAX;
const PENALTY_BLOCKED: u32 = u32::MAX - 1;

/// Search parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// 8-connected when true, 4-connected otherwise
    pub allow_diagonals: bool,
    /// Dynamic cost from other agents
    pub occupancy: OccupancyCost,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            allow_diagonals: true,
            occupancy: OccupancyCost::default(),
        }
    }
}

impl SearchConfig {
    /// Enable or disable diagonal moves
    #[must_use]
    pub fn with_diagonals(mut self, allow: bool) -> Self {
        self.allow_diagonals = allow;
        self
    }

    /// Set the occupancy cost model
    #[must_use]
    pub fn with_occupancy(mut self, occupancy: OccupancyCost) -> Self {
        self.occupancy = occupancy;
        self
    }
}

/// Result of a successful search
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    /// Simplified waypoints in world coordinates, start cell excluded
    pub waypoints: Vec<Vec3>,
    /// Grid cells of the waypoints
    pub cells: Vec<IVec2>,
    /// Number of single-cell steps before simplification
    pub steps: usize,
    /// Total search cost (step costs plus occupancy penalties)
    pub cost: u32,
    /// Length of the waypoint polyline
    pub length: f32,
}

impl Path {
    /// Number of waypoints
    #[must_use]
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Check if the path has no waypoints
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Final waypoint
    #[must_use]
    pub fn last(&self) -> Option<Vec3> {
        self.waypoints.last().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Unvisited,
    Open,
    Closed,
}

/// Open set entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenEntry {
    f: u32,
    h: u32,
    g: u32,
    index: u32,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse for min-heap: lowest F first, then lowest H
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.h.cmp(&self.h))
            .then_with(|| other.index.cmp(&self.index))
            .then_with(|| other.g.cmp(&self.g))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Per-search bookkeeping, indexed by cell id.
///
/// Owned by the caller so repeated searches reuse allocations and so that
/// concurrent searches over the same grid never share state.
#[derive(Debug, Default)]
pub struct SearchScratch {
    g: Vec<u32>,
    parent: Vec<u32>,
    state: Vec<NodeState>,
    penalty: Vec<u32>,
    open: BinaryHeap<OpenEntry>,
    expanded: usize,
}

impl SearchScratch {
    /// Create empty scratch space
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cells expanded by the last search
    #[must_use]
    pub fn expanded(&self) -> usize {
        self.expanded
    }

    fn reset(&mut self, cell_count: usize) {
        self.g.clear();
        self.g.resize(cell_count, u32::MAX);
        self.parent.clear();
        self.parent.resize(cell_count, NO_PARENT);
        self.state.clear();
        self.state.resize(cell_count, NodeState::Unvisited);
        self.penalty.clear();
        self.penalty.resize(cell_count, PENALTY_UNKNOWN);
        self.open.clear();
    }
}

/// Octile distance in step-cost units
#[must_use]
pub fn octile_heuristic(a: IVec2, b: IVec2) -> u32 {
    let d = (a - b).abs();
    let diag = d.x.min(d.y) as u32;
    let straight = (d.x - d.y).unsigned_abs();
    diag * DIAGONAL_COST + straight * CARDINAL_COST
}

/// Grid A* path search
#[derive(Debug, Clone, Default)]
pub struct Pathfinder {
    /// Search parameters
    pub config: SearchConfig,
}

impl Pathfinder {
    /// Create a pathfinder with the given parameters
    #[must_use]
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    /// Find a path with fresh scratch space, ignoring no one but the agent at `start`.
    ///
    /// Returns `None` when no path exists.
    #[must_use]
    pub fn find_path(
        &self,
        grid: &Grid,
        start: Vec3,
        target: Vec3,
        agents: &dyn AgentQuery,
    ) -> Option<Path> {
        self.find_path_with(
            &mut SearchScratch::new(),
            grid,
            Requester::at(start),
            target,
            agents,
        )
    }

    /// Find a path on a static grid with no other agents
    #[must_use]
    pub fn find_static_path(&self, grid: &Grid, start: Vec3, target: Vec3) -> Option<Path> {
        self.find_path(grid, start, target, &NoAgents)
    }

    /// Find a path from the requester's position to `target`, reusing `scratch`.
    ///
    /// Returns `None` when either endpoint lies outside the grid, the target
    /// cell is not walkable, or the open set runs dry.
    #[must_use]
    pub fn find_path_with(
        &self,
        scratch: &mut SearchScratch,
        grid: &Grid,
        requester: Requester,
        target: Vec3,
        agents: &dyn AgentQuery,
    ) -> Option<Path> {
        scratch.expanded = 0;

        let start_cell = grid.world_to_cell(requester.position)?;
        let target_cell = grid.world_to_cell(target)?;
        if !grid.is_walkable(target_cell.x, target_cell.y) {
            log::trace!("Target cell {target_cell} is blocked");
            return None;
        }

        let start = grid.index(start_cell.x, start_cell.y)?;
        let goal = grid.index(target_cell.x, target_cell.y)?;

        if start == goal {
            return Some(Path {
                waypoints: vec![grid.cell_to_world_center(target_cell.x, target_cell.y)],
                cells: vec![target_cell],
                steps: 0,
                cost: 0,
                length: 0.0,
            });
        }

        scratch.reset(grid.cell_count());

        let h = octile_heuristic(start_cell, target_cell);
        scratch.g[start] = 0;
        scratch.state[start] = NodeState::Open;
        scratch.open.push(OpenEntry {
            f: h,
            h,
            g: 0,
            index: start as u32,
        });

        let neighbors: &[(i32, i32)] = if self.config.allow_diagonals {
            &NEIGHBORS_8
        } else {
            &NEIGHBORS_4
        };

        while let Some(entry) = scratch.open.pop() {
            let current = entry.index as usize;
            if scratch.state[current] == NodeState::Closed || entry.g != scratch.g[current] {
                continue;
            }
            scratch.state[current] = NodeState::Closed;
            scratch.expanded += 1;

            if current == goal {
                let path = self.retrace(scratch, grid, start, goal);
                log::trace!(
                    "Path {start_cell} -> {target_cell}: {} steps, {} waypoints, {} expanded",
                    path.steps,
                    path.waypoints.len(),
                    scratch.expanded
                );
                return Some(path);
            }

            let cell = grid.coord(current);
            for &(dx, dy) in neighbors {
                let (nx, ny) = (cell.x + dx, cell.y + dy);
                let Some(next) = grid.index(nx, ny) else {
                    continue;
                };
                if scratch.state[next] == NodeState::Closed || !grid.cells()[next].walkable {
                    continue;
                }

                let diagonal = dx != 0 && dy != 0;
                if diagonal && (!grid.is_walkable(nx, cell.y) || !grid.is_walkable(cell.x, ny)) {
                    continue;
                }

                let penalty = self.occupancy_penalty(scratch, grid, next, &requester, agents);
                if penalty == PENALTY_BLOCKED {
                    continue;
                }

                let step = if diagonal { DIAGONAL_COST } else { CARDINAL_COST };
                let g = scratch.g[current].saturating_add(step).saturating_add(penalty);

                let unvisited = scratch.state[next] == NodeState::Unvisited;
                if unvisited || g < scratch.g[next] {
                    let h = octile_heuristic(IVec2::new(nx, ny), target_cell);
                    scratch.parent[next] = current as u32;
                    scratch.g[next] = g;
                    scratch.state[next] = NodeState::Open;
                    scratch.open.push(OpenEntry {
                        f: g.saturating_add(h),
                        h,
                        g,
                        index: next as u32,
                    });
                }
            }
        }

        log::trace!(
            "No path {start_cell} -> {target_cell} after {} expansions",
            scratch.expanded
        );
        None
    }

    /// Occupancy penalty of a cell, computed once per search
    fn occupancy_penalty(
        &self,
        scratch: &mut SearchScratch,
        grid: &Grid,
        index: usize,
        requester: &Requester,
        agents: &dyn AgentQuery,
    ) -> u32 {
        if scratch.penalty[index] != PENALTY_UNKNOWN {
            return scratch.penalty[index];
        }

        let center = grid.cells()[index].world_pos;
        let cost = &self.config.occupancy;
        let penalty = if cost.is_blocked(center, requester, agents) {
            PENALTY_BLOCKED
        } else {
            cost.penalty(center, requester, agents)
                .min(PENALTY_BLOCKED - 1)
        };

        scratch.penalty[index] = penalty;
        penalty
    }

    /// Walk back-pointers from the goal and keep only the turning points
    fn retrace(&self, scratch: &SearchScratch, grid: &Grid, start: usize, goal: usize) -> Path {
        let mut chain = Vec::new();
        let mut current = goal;
        while current != start {
            chain.push(grid.coord(current));
            let parent = scratch.parent[current];
            if parent == NO_PARENT {
                break;
            }
            current = parent as usize;
        }
        chain.reverse();

        let cells = simplify(&chain);
        let waypoints: Vec<Vec3> = cells
            .iter()
            .map(|c| grid.cell_to_world_center(c.x, c.y))
            .collect();

        Path {
            length: polyline_length(&waypoints),
            steps: chain.len(),
            cost: scratch.g[goal],
            cells,
            waypoints,
        }
    }
}

/// Plans paths on behalf of a steering agent
pub trait PathPlanner {
    /// Plan from the requester's position to `target`; `None` when unreachable
    fn plan(&mut self, requester: Requester, target: Vec3) -> Option<Path>;
}

/// [`PathPlanner`] backed by a grid search over a tick's agent snapshot
pub struct GridPlanner<'a> {
    /// Walkability grid
    pub grid: &'a Grid,
    /// Search parameters
    pub pathfinder: &'a Pathfinder,
    /// Reused search bookkeeping
    pub scratch: &'a mut SearchScratch,
    /// Other agents, as of the start of the tick
    pub agents: &'a dyn AgentQuery,
}

impl PathPlanner for GridPlanner<'_> {
    fn plan(&mut self, requester: Requester, target: Vec3) -> Option<Path> {
        self.pathfinder
            .find_path_with(self.scratch, self.grid, requester, target, self.agents)
    }
}

/// Collapse straight runs of a cell chain.
///
/// The first and last cells are always kept; an interior cell is kept when
/// the step leaving it differs from the step entering it.
#[must_use]
pub fn simplify(chain: &[IVec2]) -> Vec<IVec2> {
    let mut kept = Vec::new();
    let last = chain.len().saturating_sub(1);

    for (i, &cell) in chain.iter().enumerate() {
        if i == 0 || i == last {
            kept.push(cell);
            continue;
        }

        let entering = cell - chain[i - 1];
        let leaving = chain[i + 1] - cell;
        if entering != leaving {
            kept.push(cell);
        }
    }

    kept
}

/// Total length of a polyline
fn polyline_length(points: &[Vec3]) -> f32 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}
