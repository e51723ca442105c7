//! Static navigation geometry using rapier3d

use glam::{Quat, Vec3};
use rapier3d::control::KinematicCharacterController;
use rapier3d::na::{Quaternion, Translation3, UnitQuaternion};
use rapier3d::prelude::*;

use crate::ai::{Locomotion, ObstacleQuery};
use crate::ecs::{AgentBody, Transform};

/// Collision group of static obstacles
pub const OBSTACLE_GROUP: Group = Group::GROUP_1;

/// Handle to an obstacle collider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObstacleHandle(pub ColliderHandle);

/// Convert glam Quat to rapier3d UnitQuaternion
fn quat_to_rapier(q: Quat) -> UnitQuaternion<f32> {
    UnitQuaternion::from_quaternion(Quaternion::new(q.w, q.x, q.y, q.z))
}

fn to_vector(v: Vec3) -> Vector<Real> {
    vector![v.x, v.y, v.z]
}

/// Static world geometry queried by the grid builder and character movement
pub struct Physics {
    /// Groups counted as obstacles by grid probes and movement
    obstacle_mask: Group,
    /// Rigid body set (obstacles are parentless; kept for query signatures)
    rigid_body_set: RigidBodySet,
    /// Collider set
    collider_set: ColliderSet,
    /// Island manager, needed for collider removal
    island_manager: IslandManager,
    /// Query pipeline for overlap and shape-cast queries
    query_pipeline: QueryPipeline,
    /// Slide-along-walls movement
    controller: KinematicCharacterController,
}

impl Physics {
    /// Create an empty world
    pub fn new() -> Self {
        let controller = KinematicCharacterController {
            snap_to_ground: None,
            ..KinematicCharacterController::default()
        };

        Self {
            obstacle_mask: OBSTACLE_GROUP,
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            island_manager: IslandManager::new(),
            query_pipeline: QueryPipeline::new(),
            controller,
        }
    }

    /// Use a different set of groups as the obstacle classification
    #[must_use]
    pub fn with_obstacle_mask(mut self, mask: Group) -> Self {
        self.obstacle_mask = mask;
        self
    }

    /// Add an axis-aligned box obstacle
    pub fn add_obstacle(&mut self, center: Vec3, half_extents: Vec3) -> ObstacleHandle {
        self.add_box(center, Quat::IDENTITY, half_extents, OBSTACLE_GROUP)
    }

    /// Add a box collider belonging to `groups`
    pub fn add_box(
        &mut self,
        center: Vec3,
        rotation: Quat,
        half_extents: Vec3,
        groups: Group,
    ) -> ObstacleHandle {
        let isometry = Isometry::from_parts(
            Translation3::new(center.x, center.y, center.z),
            quat_to_rapier(rotation),
        );
        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .position(isometry)
            .collision_groups(InteractionGroups::new(groups, Group::ALL))
            .build();

        let handle = ObstacleHandle(self.collider_set.insert(collider));
        self.query_pipeline.update(&self.collider_set);
        handle
    }

    /// Remove an obstacle
    pub fn remove_obstacle(&mut self, handle: ObstacleHandle) {
        self.collider_set.remove(
            handle.0,
            &mut self.island_manager,
            &mut self.rigid_body_set,
            false,
        );
        self.query_pipeline.update(&self.collider_set);
    }

    /// Number of colliders in the world
    pub fn obstacle_count(&self) -> usize {
        self.collider_set.len()
    }

    fn obstacle_filter(&self) -> QueryFilter<'static> {
        QueryFilter::new().groups(InteractionGroups::new(Group::ALL, self.obstacle_mask))
    }

    /// Check whether a box overlaps any obstacle
    pub fn box_overlaps_obstacle(&self, center: Vec3, half_extents: Vec3) -> bool {
        let shape = SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z);
        let pos = Isometry::translation(center.x, center.y, center.z);

        self.query_pipeline
            .intersection_with_shape(
                &self.rigid_body_set,
                &self.collider_set,
                &pos,
                &*shape,
                self.obstacle_filter(),
            )
            .is_some()
    }

    /// Move an upright capsule standing at `feet` by `translation`, sliding
    /// along obstacles. Returns the new feet position.
    pub fn move_character(&self, feet: Vec3, body: &AgentBody, translation: Vec3, dt: f32) -> Vec3 {
        let half_height = body.capsule_half_height();
        let center = feet + Vec3::Y * (half_height + body.radius);
        let shape = SharedShape::capsule_y(half_height, body.radius);
        let pos = Isometry::translation(center.x, center.y, center.z);

        let movement = self.controller.move_shape(
            dt,
            &self.rigid_body_set,
            &self.collider_set,
            &self.query_pipeline,
            &*shape,
            &pos,
            to_vector(translation),
            self.obstacle_filter(),
            |_| {},
        );

        let t = movement.translation;
        feet + Vec3::new(t.x, t.y, t.z)
    }
}

impl Default for Physics {
    fn default() -> Self {
        Self::new()
    }
}

impl ObstacleQuery for Physics {
    fn overlaps_box(&self, center: Vec3, half_extents: Vec3) -> bool {
        self.box_overlaps_obstacle(center, half_extents)
    }
}

/// An agent's transform moved through the physics world
pub struct CharacterBody<'a> {
    /// Static world
    pub physics: &'a Physics,
    /// Agent transform (feet position)
    pub transform: &'a mut Transform,
    /// Agent shape
    pub body: &'a AgentBody,
}

impl Locomotion for CharacterBody<'_> {
    fn position(&self) -> Vec3 {
        self.transform.position
    }

    fn radius(&self) -> f32 {
        self.body.radius
    }

    fn move_with_collision(&mut self, velocity: Vec3, dt: f32) {
        let moved = self
            .physics
            .move_character(self.transform.position, self.body, velocity * dt, dt);
        self.transform.position = Vec3::new(moved.x, self.transform.position.y, moved.z);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_overlap_query() {
        let mut physics = Physics::new();
        physics.add_obstacle(Vec3::new(2.0, 0.5, 0.0), Vec3::new(0.5, 0.5, 0.5));

        assert_eq!(physics.obstacle_count(), 1);
        assert!(physics.box_overlaps_obstacle(Vec3::new(2.0, 0.0, 0.0), Vec3::splat(0.45)));
        assert!(!physics.box_overlaps_obstacle(Vec3::new(0.0, 0.0, 0.0), Vec3::splat(0.45)));
    }

    #[test]
    fn test_obstacle_mask_filters_groups() {
        let mut physics = Physics::new();
        physics.add_box(
            Vec3::ZERO,
            Quat::IDENTITY,
            Vec3::splat(0.5),
            Group::GROUP_2,
        );

        assert!(!physics.overlaps_box(Vec3::ZERO, Vec3::splat(0.45)));

        let physics = physics.with_obstacle_mask(Group::GROUP_2);
        assert!(physics.overlaps_box(Vec3::ZERO, Vec3::splat(0.45)));
    }

    #[test]
    fn test_remove_obstacle() {
        let mut physics = Physics::new();
        let handle = physics.add_obstacle(Vec3::ZERO, Vec3::splat(0.5));
        physics.remove_obstacle(handle);

        assert_eq!(physics.obstacle_count(), 0);
        assert!(!physics.overlaps_box(Vec3::ZERO, Vec3::splat(0.45)));
    }

    #[test]
    fn test_free_movement() {
        let physics = Physics::new();
        let body = AgentBody::default();

        let moved = physics.move_character(Vec3::ZERO, &body, Vec3::new(0.5, 0.0, 0.0), 0.1);
        assert!((moved.x - 0.5).abs() < 0.05);
        assert!(moved.z.abs() < 1e-3);
    }

    #[test]
    fn test_wall_stops_movement() {
        let mut physics = Physics::new();
        // Wall spanning z, face at x = 1
        physics.add_obstacle(Vec3::new(1.5, 1.0, 0.0), Vec3::new(0.5, 1.0, 5.0));
        let body = AgentBody::default();

        let moved = physics.move_character(Vec3::ZERO, &body, Vec3::new(2.0, 0.0, 0.0), 0.5);
        assert!(moved.x < 1.0 - body.radius + 0.05);
    }
}
