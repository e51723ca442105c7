//! Grid navigation for crowds of agents
//!
//! This crate provides:
//! - Walkability grids probed against static physics geometry
//! - A* pathfinding with a dynamic agent-occupancy penalty
//! - Path-following steering with local avoidance and stuck recovery
//! - A headless simulation built on hecs and rapier3d

pub mod ai;
pub mod core;
pub mod ecs;
pub mod physics;

// Re-exports for convenience
pub use glam;
pub use hecs;
pub use rapier3d;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::ai::{
        AgentId, AgentQuery, Grid, GridConfig, MovementStyle, Path, Pathfinder, SearchConfig,
        SpatialHash, SteeringAgent, SteeringConfig,
    };
    pub use crate::core::{ConfigError, NavConfig, Simulation};
    pub use crate::ecs::{AgentBody, Name, Transform};
    pub use crate::physics::Physics;
    pub use glam::{IVec2, Quat, Vec2, Vec3};
}
