//! Navigation configuration
//!
//! Every tunable in one serializable struct, loadable from RON or JSON.

use std::fs;
use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::ai::{GridConfig, SearchConfig, SteeringConfig};
use crate::ecs::AgentBody;

/// Complete navigation configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// World point the grid is centered on
    pub grid_anchor: Vec3,
    /// Grid layout
    pub grid: GridConfig,
    /// Path search
    pub search: SearchConfig,
    /// Per-agent steering
    pub steering: SteeringConfig,
    /// Agent capsule
    pub body: AgentBody,
}

impl NavConfig {
    /// Set the grid layout
    #[must_use]
    pub fn with_grid(mut self, grid: GridConfig) -> Self {
        self.grid = grid;
        self
    }

    /// Set the search parameters
    #[must_use]
    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    /// Set the steering parameters
    #[must_use]
    pub fn with_steering(mut self, steering: SteeringConfig) -> Self {
        self.steering = steering;
        self
    }

    /// Check the configuration for values the simulation cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grid
            .dimensions()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let s = &self.steering;
        let positive = [
            ("move_speed", s.move_speed),
            ("stuck_check_interval", s.stuck_check_interval),
            ("body.radius", self.body.radius),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }

        let non_negative = [
            ("turn_speed", s.turn_speed),
            ("waypoint_reach_radius", s.waypoint_reach_radius),
            ("arrival_tolerance", s.arrival_tolerance),
            ("neighbor_radius", s.neighbor_radius),
            ("look_ahead", s.look_ahead),
            ("replan_cooldown", s.replan_cooldown),
            ("block_radius", self.search.occupancy.block_radius),
            ("influence_radius", self.search.occupancy.influence_radius),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must not be negative, got {value}"
                )));
            }
        }

        if !(0.0..=1.0).contains(&s.avoidance_max_speed_factor) {
            return Err(ConfigError::Invalid(format!(
                "avoidance_max_speed_factor must be within [0, 1], got {}",
                s.avoidance_max_speed_factor
            )));
        }

        Ok(())
    }

    /// Parse and validate a RON document
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or validation fails
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        let config: NavConfig =
            ron::from_str(source).map_err(|e| ConfigError::DeserializeError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as a pretty RON document
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Save the configuration to a RON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or serialization fails
    pub fn save_ron(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let ron_string = self.to_ron_string()?;
        fs::write(path, ron_string).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Load the configuration from a RON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated
    pub fn load_ron(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_ron_str(&content)
    }

    /// Save the configuration to a JSON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or serialization fails
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json_string = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        fs::write(path, json_string).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Load the configuration from a JSON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: NavConfig = serde_json::from_str(&content)
            .map_err(|e| ConfigError::DeserializeError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Errors that can occur loading or checking a configuration
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// IO error
    IoError(String),
    /// Serialization error
    SerializeError(String),
    /// Deserialization error
    DeserializeError(String),
    /// A value is out of range
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(e) => write!(f, "IO error: {e}"),
            Self::SerializeError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializeError(e) => write!(f, "Deserialization error: {e}"),
            Self::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MovementStyle;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(NavConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_config_serialization_ron() {
        let config = NavConfig::default().with_steering(
            SteeringConfig::default()
                .with_style(MovementStyle::Direct)
                .with_move_speed(6.5),
        );

        let ron_str = config.to_ron_string().unwrap();
        assert!(ron_str.contains("Direct"));

        let loaded = NavConfig::from_ron_str(&ron_str).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let loaded = NavConfig::from_ron_str("(steering: (move_speed: 2.5))").unwrap();

        assert_eq!(loaded.steering.move_speed, 2.5);
        assert_eq!(loaded.steering.look_ahead, 1.1);
        assert_eq!(loaded.grid, GridConfig::default());
    }

    #[test]
    fn test_config_serialization_json() {
        let config = NavConfig::default().with_search(SearchConfig::default().with_diagonals(false));

        let json_str = serde_json::to_string(&config).unwrap();
        let loaded: NavConfig = serde_json::from_str(&json_str).unwrap();
        assert!(!loaded.search.allow_diagonals);
    }

    #[test]
    fn test_rejects_bad_cell_size() {
        let err = NavConfig::from_ron_str("(grid: (cell_size: 0.0))").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_oversized_grid() {
        let config = NavConfig::default()
            .with_grid(GridConfig::default().with_world_size(glam::Vec2::splat(1e12)));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_negative_speed() {
        let config = NavConfig::default()
            .with_steering(SteeringConfig::default().with_move_speed(-1.0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_ron() {
        let err = NavConfig::from_ron_str("(grid: ").unwrap_err();
        assert!(matches!(err, ConfigError::DeserializeError(_)));
    }
}
