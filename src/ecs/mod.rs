//! Entity Component System module
//!
//! Components stored in a hecs world for every simulated agent

mod components;

pub use components::{AgentBody, Name, Transform};
