//! Path following with local avoidance
//!
//! Each agent walks its waypoint list, blends separation and forward
//! avoidance into the desired velocity, and replans when it stops making
//! progress. Positions are never written here; the resulting velocity is
//! handed to a [`Locomotion`] implementation.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::occupancy::{AgentId, AgentQuery, Requester, planar, planar_distance};
use super::pathfinding::PathPlanner;

/// Moves a body through the world, resolving contact with static geometry
pub trait Locomotion {
    /// Current world position
    fn position(&self) -> Vec3;

    /// Body radius
    fn radius(&self) -> f32;

    /// Displace the body by `velocity * dt`, sliding along obstacles
    fn move_with_collision(&mut self, velocity: Vec3, dt: f32);
}

/// How an agent gets to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MovementStyle {
    /// Straight at the target with local avoidance, no path search
    Direct,
    /// Along a planned path, ignoring other agents
    FollowPath,
    /// Along a planned path with local avoidance
    #[default]
    AvoidingPath,
}

impl MovementStyle {
    /// Whether targets go through the path planner
    #[must_use]
    pub fn plans_path(self) -> bool {
        !matches!(self, Self::Direct)
    }

    /// Whether nearby agents modulate the velocity
    #[must_use]
    pub fn avoids(self) -> bool {
        !matches!(self, Self::FollowPath)
    }
}

/// Steering parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    /// Movement variant
    pub style: MovementStyle,
    /// Cruise speed
    pub move_speed: f32,
    /// Orientation smoothing rate (1/s)
    pub turn_speed: f32,
    /// Distance at which a waypoint counts as reached
    pub waypoint_reach_radius: f32,
    /// Distance to the final target at which the agent stops
    pub arrival_tolerance: f32,
    /// Radius of the separation neighborhood
    pub neighbor_radius: f32,
    /// Weight of separation and forward avoidance
    pub avoidance_strength: f32,
    /// Length of the forward probe
    pub look_ahead: f32,
    /// Weight of the sideways swerve
    pub lateral_strength: f32,
    /// Fraction of cruise speed allowed under full conflict
    pub avoidance_max_speed_factor: f32,
    /// Added to the body radius for the forward probe
    pub probe_padding: f32,
    /// Seconds between progress samples
    pub stuck_check_interval: f32,
    /// Minimum displacement per sample to count as moving
    pub stuck_min_move: f32,
    /// Minimum seconds between stuck-triggered replans
    pub replan_cooldown: f32,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            style: MovementStyle::AvoidingPath,
            move_speed: 4.0,
            turn_speed: 12.0,
            waypoint_reach_radius: 0.25,
            arrival_tolerance: 0.3,
            neighbor_radius: 1.5,
            avoidance_strength: 10.0,
            look_ahead: 1.1,
            lateral_strength: 3.0,
            avoidance_max_speed_factor: 0.45,
            probe_padding: 0.05,
            stuck_check_interval: 0.5,
            stuck_min_move: 0.05,
            replan_cooldown: 0.6,
        }
    }
}

impl SteeringConfig {
    /// Set the movement variant
    #[must_use]
    pub fn with_style(mut self, style: MovementStyle) -> Self {
        self.style = style;
        self
    }

    /// Set the cruise speed
    #[must_use]
    pub fn with_move_speed(mut self, speed: f32) -> Self {
        self.move_speed = speed;
        self
    }
}

/// Inverse-square repulsion from agents within `radius`, fading to zero at the edge
#[must_use]
pub fn separation(position: Vec3, own: AgentId, radius: f32, agents: &dyn AgentQuery) -> Vec3 {
    let mut sum = Vec3::ZERO;
    if radius <= 0.0 {
        return sum;
    }

    agents.for_each_within(position, radius, &mut |other| {
        if other.id == own {
            return;
        }
        let diff = planar(position - other.position);
        let d = diff.length();
        if d < 1e-4 {
            return;
        }
        let falloff = 1.0 - (d / radius).clamp(0.0, 1.0);
        sum += diff / d * (falloff / (d * d));
    });

    sum
}

/// Unit push away from the first agent in the way, with that agent's id
#[must_use]
pub fn forward_avoidance(
    position: Vec3,
    probe_radius: f32,
    direction: Vec3,
    look_ahead: f32,
    own: AgentId,
    agents: &dyn AgentQuery,
) -> Option<(Vec3, AgentId)> {
    agents
        .cast_circle(position, probe_radius, direction, look_ahead, own)
        .map(|hit| (planar(position - hit.position).normalize_or_zero(), hit.id))
}

/// Desired direction turned a quarter around the up axis toward `side`
#[must_use]
pub fn lateral_bias(direction: Vec3, side: f32) -> Vec3 {
    Vec3::Y.cross(direction) * side
}

/// Side both agents of a blocking pair swerve to.
///
/// The pair adopts the lower id's preferred side. The bias is relative to
/// each agent's own heading, so a shared sign sends two agents meeting
/// head-on to opposite world sides whatever their individual parities.
#[must_use]
pub fn swerve_side(own: AgentId, blocker: AgentId) -> f32 {
    own.min(blocker).preferred_side()
}

/// Motion state of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteeringState {
    /// No active target
    Idle,
    /// Walking a path
    Following,
}

/// Path-following steering controller for one agent
#[derive(Debug, Clone)]
pub struct SteeringAgent {
    id: AgentId,
    config: SteeringConfig,
    state: SteeringState,
    target: Option<Vec3>,
    path: Vec<Vec3>,
    path_index: usize,
    rotation: Quat,
    velocity: Vec3,
    stuck_timer: f32,
    last_position: Vec3,
    replan_timer: f32,
    replans: u32,
}

impl SteeringAgent {
    /// Create an idle agent standing at `position`
    #[must_use]
    pub fn new(id: AgentId, config: SteeringConfig, position: Vec3) -> Self {
        Self {
            id,
            config,
            state: SteeringState::Idle,
            target: None,
            path: Vec::new(),
            path_index: 0,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            stuck_timer: 0.0,
            last_position: position,
            replan_timer: 0.0,
            replans: 0,
        }
    }

    /// Agent identifier
    #[must_use]
    pub fn id(&self) -> AgentId {
        self.id
    }

    /// Steering parameters
    #[must_use]
    pub fn config(&self) -> &SteeringConfig {
        &self.config
    }

    /// Current motion state
    #[must_use]
    pub fn state(&self) -> SteeringState {
        self.state
    }

    /// Check if the agent has no active target
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == SteeringState::Idle
    }

    /// Last commanded target, kept after arrival or a failed replan
    #[must_use]
    pub fn target(&self) -> Option<Vec3> {
        self.target
    }

    /// Full current path
    #[must_use]
    pub fn path(&self) -> &[Vec3] {
        &self.path
    }

    /// Index of the waypoint being approached
    #[must_use]
    pub fn path_index(&self) -> usize {
        self.path_index
    }

    /// Waypoints not yet reached
    #[must_use]
    pub fn remaining_path(&self) -> &[Vec3] {
        &self.path[self.path_index.min(self.path.len())..]
    }

    /// Smoothed facing
    #[must_use]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// Velocity handed to locomotion on the last tick
    #[must_use]
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Side the agent swerves to, unless a lower id blocks it
    #[must_use]
    pub fn preferred_side(&self) -> f32 {
        self.id.preferred_side()
    }

    /// Number of stuck-triggered replans so far
    #[must_use]
    pub fn replan_count(&self) -> u32 {
        self.replans
    }

    /// Command the agent toward `target`, planning immediately.
    ///
    /// Returns false (and leaves the agent idle) when no path exists.
    pub fn set_target(
        &mut self,
        target: Vec3,
        position: Vec3,
        planner: &mut dyn PathPlanner,
    ) -> bool {
        self.target = Some(target);
        self.stuck_timer = 0.0;
        self.last_position = position;
        self.rebuild_path(position, planner);
        !self.is_idle()
    }

    /// Drop the target and path
    pub fn clear(&mut self) {
        self.state = SteeringState::Idle;
        self.target = None;
        self.path.clear();
        self.path_index = 0;
        self.velocity = Vec3::ZERO;
    }

    /// Advance one simulation step.
    ///
    /// `agents` must be a snapshot taken before any agent moved this tick.
    /// Returns the velocity handed to `body`.
    pub fn tick(
        &mut self,
        dt: f32,
        body: &mut dyn Locomotion,
        planner: &mut dyn PathPlanner,
        agents: &dyn AgentQuery,
    ) -> Vec3 {
        self.replan_timer -= dt;
        self.velocity = Vec3::ZERO;

        if self.is_idle() {
            return Vec3::ZERO;
        }

        self.move_along_path(dt, body, agents);

        if !self.is_idle() {
            self.update_stuck(dt, body.position(), planner);
        }

        self.velocity
    }

    fn move_along_path(&mut self, dt: f32, body: &mut dyn Locomotion, agents: &dyn AgentQuery) {
        let position = body.position();

        let Some(&next) = self.path.get(self.path_index) else {
            let arrived = self
                .target
                .is_none_or(|t| planar_distance(position, t) <= self.config.arrival_tolerance);
            if arrived {
                log::debug!("Agent {} arrived", self.id.0);
                self.state = SteeringState::Idle;
                self.path.clear();
                self.path_index = 0;
            }
            return;
        };

        let to_next = planar(next - position);
        if to_next.length() <= self.config.waypoint_reach_radius {
            self.path_index += 1;
            return;
        }

        let dir = to_next.normalize_or_zero();
        let speed = self.config.move_speed;
        let desired = dir * speed;

        let (avoid_near, ahead) = if self.config.style.avoids() {
            (
                separation(position, self.id, self.config.neighbor_radius, agents),
                forward_avoidance(
                    position,
                    body.radius() + self.config.probe_padding,
                    dir,
                    self.config.look_ahead,
                    self.id,
                    agents,
                ),
            )
        } else {
            (Vec3::ZERO, None)
        };
        let (avoid_ahead, side) = match ahead {
            Some((push, blocker)) => (push, swerve_side(self.id, blocker)),
            None => (Vec3::ZERO, self.id.preferred_side()),
        };
        let lateral = lateral_bias(dir, side);

        let blended = desired
            + (avoid_near + avoid_ahead) * self.config.avoidance_strength
            + lateral * (avoid_ahead.length() * self.config.lateral_strength);

        let conflict = (avoid_near.length() + avoid_ahead.length()).clamp(0.0, 1.0);
        let max_speed = speed + (speed * self.config.avoidance_max_speed_factor - speed) * conflict;
        let velocity = planar(blended).clamp_length_max(max_speed);

        if velocity.length_squared() > 1e-4 {
            let facing = velocity.normalize();
            let goal = Quat::from_rotation_y(f32::atan2(-facing.x, -facing.z));
            let t = 1.0 - (-self.config.turn_speed * dt).exp();
            self.rotation = self.rotation.slerp(goal, t);
        }

        body.move_with_collision(velocity, dt);
        self.velocity = velocity;
    }

    fn update_stuck(&mut self, dt: f32, position: Vec3, planner: &mut dyn PathPlanner) {
        self.stuck_timer += dt;
        if self.stuck_timer < self.config.stuck_check_interval {
            return;
        }
        self.stuck_timer = 0.0;

        let moved = planar_distance(position, self.last_position);
        self.last_position = position;

        if moved < self.config.stuck_min_move && self.replan_timer <= 0.0 {
            self.replan_timer = self.config.replan_cooldown;
            self.replans += 1;
            log::debug!("Agent {} stuck (moved {moved:.3}), replanning", self.id.0);
            self.rebuild_path(position, planner);
        }
    }

    fn rebuild_path(&mut self, position: Vec3, planner: &mut dyn PathPlanner) {
        self.path.clear();
        self.path_index = 0;

        let Some(target) = self.target else {
            self.state = SteeringState::Idle;
            return;
        };

        if !self.config.style.plans_path() {
            self.path.push(target);
            self.state = SteeringState::Following;
            return;
        }

        let requester = Requester {
            id: Some(self.id),
            position,
        };
        match planner.plan(requester, target) {
            Some(path) => {
                self.path = path.waypoints;
                self.state = SteeringState::Following;
            }
            None => {
                log::debug!("Agent {} has no path to {target}", self.id.0);
                self.state = SteeringState::Idle;
            }
        }
    }
}
