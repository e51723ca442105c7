//! AI and navigation module
//!
//! Provides the walkability grid, occupancy-aware A* pathfinding, and
//! path-following steering with local avoidance.

mod grid;
mod occupancy;
mod pathfinding;
mod steering;

pub use grid::{Cell, Grid, GridConfig, GridError, MAX_CELLS, ObstacleQuery};
pub use occupancy::{
    AgentId, AgentQuery, AgentSnapshot, NoAgents, OccupancyCost, Requester, SpatialHash, planar,
    planar_distance,
};
pub use pathfinding::{
    CARDINAL_COST, DIAGONAL_COST, GridPlanner, Path, PathPlanner, Pathfinder, SearchConfig,
    SearchScratch, octile_heuristic, simplify,
};
pub use steering::{
    Locomotion, MovementStyle, SteeringAgent, SteeringConfig, SteeringState, forward_avoidance,
    lateral_bias, separation, swerve_side,
};
