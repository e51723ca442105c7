//! Physics module
//!
//! Static obstacle geometry and character movement built on rapier3d

mod world;

pub use world::{CharacterBody, OBSTACLE_GROUP, ObstacleHandle, Physics};
