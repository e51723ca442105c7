//! Core simulation module
//!
//! Contains the navigation configuration and the fixed-step simulation

mod config;
mod simulation;

pub use config::{ConfigError, NavConfig};
pub use simulation::Simulation;
