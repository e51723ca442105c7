//! Common ECS components

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Transform component for position and facing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Position in world space (agent feet)
    pub position: Vec3,
    /// Rotation as a quaternion
    pub rotation: Quat,
}

impl Transform {
    /// Create a transform with just a position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Get the forward direction (negative Z in local space)
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

/// Upright capsule an agent occupies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentBody {
    /// Capsule radius
    pub radius: f32,
    /// Total capsule height
    pub height: f32,
}

impl AgentBody {
    /// Half length of the capsule's straight segment
    pub fn capsule_half_height(&self) -> f32 {
        ((self.height - 2.0 * self.radius) * 0.5).max(0.0)
    }
}

impl Default for AgentBody {
    fn default() -> Self {
        Self {
            radius: 0.5,
            height: 2.0,
        }
    }
}

/// Name component for debugging
#[derive(Debug, Clone)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capsule_half_height() {
        let body = AgentBody::default();
        assert!((body.capsule_half_height() - 0.5).abs() < 1e-6);

        let squat = AgentBody {
            radius: 0.6,
            height: 1.0,
        };
        assert_eq!(squat.capsule_half_height(), 0.0);
    }

    #[test]
    fn test_forward_follows_rotation() {
        let mut transform = Transform::from_position(Vec3::ONE);
        assert!((transform.forward() - Vec3::NEG_Z).length() < 1e-6);

        transform.rotation = Quat::from_rotation_y(-std::f32::consts::FRAC_PI_2);
        assert!((transform.forward() - Vec3::X).length() < 1e-5);
    }
}
