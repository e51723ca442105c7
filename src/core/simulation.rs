//! Headless crowd simulation
//!
//! Owns the ECS world, the static physics geometry, and the walkability grid,
//! and advances every agent one fixed step at a time.

use glam::Vec3;
use hecs::{Entity, World};

use crate::ai::{
    AgentId, AgentSnapshot, Grid, GridPlanner, Path, Pathfinder, Requester, SearchScratch,
    SpatialHash, SteeringAgent,
};
use crate::core::{ConfigError, NavConfig};
use crate::ecs::{AgentBody, Name, Transform};
use crate::physics::{CharacterBody, ObstacleHandle, Physics};

/// Fixed-step navigation simulation
pub struct Simulation {
    config: NavConfig,
    world: World,
    physics: Physics,
    grid: Grid,
    pathfinder: Pathfinder,
    scratch: SearchScratch,
    /// Agent positions as of the start of the current tick
    snapshot: SpatialHash,
    next_id: u32,
    ticks: u64,
    elapsed: f32,
}

impl Simulation {
    /// Create a simulation over `physics`, building the grid from its obstacles.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate
    pub fn new(config: NavConfig, physics: Physics) -> Result<Self, ConfigError> {
        config.validate()?;

        let grid = Grid::build(config.grid_anchor, config.grid, &physics)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        log::info!(
            "Simulation ready: {}x{} grid, {} obstacles",
            grid.width(),
            grid.height(),
            physics.obstacle_count()
        );

        Ok(Self {
            pathfinder: Pathfinder::new(config.search),
            config,
            world: World::new(),
            physics,
            grid,
            scratch: SearchScratch::new(),
            snapshot: SpatialHash::default(),
            next_id: 0,
            ticks: 0,
            elapsed: 0.0,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    /// ECS world holding the agents
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Static geometry
    pub fn physics(&self) -> &Physics {
        &self.physics
    }

    /// Walkability grid
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Number of completed ticks
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Simulated seconds so far
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Add a box obstacle. Takes effect on the grid after [`Self::rebuild_grid`].
    pub fn add_obstacle(&mut self, center: Vec3, half_extents: Vec3) -> ObstacleHandle {
        self.physics.add_obstacle(center, half_extents)
    }

    /// Remove an obstacle. Takes effect on the grid after [`Self::rebuild_grid`].
    pub fn remove_obstacle(&mut self, handle: ObstacleHandle) {
        self.physics.remove_obstacle(handle);
    }

    /// Re-probe every cell against the current obstacles
    pub fn rebuild_grid(&mut self) {
        self.grid.rebuild(&self.physics);
    }

    /// Spawn an idle agent standing at `position`
    pub fn spawn_agent(&mut self, position: Vec3) -> Entity {
        let components = self.agent_components(position);
        self.world.spawn(components)
    }

    /// Spawn an idle agent with a debug name
    pub fn spawn_named(&mut self, name: impl Into<String>, position: Vec3) -> Entity {
        let (transform, body, agent) = self.agent_components(position);
        self.world
            .spawn((transform, body, agent, Name::new(name)))
    }

    fn agent_components(&mut self, position: Vec3) -> (Transform, AgentBody, SteeringAgent) {
        let id = AgentId(self.next_id);
        self.next_id += 1;

        (
            Transform::from_position(position),
            self.config.body,
            SteeringAgent::new(id, self.config.steering, position),
        )
    }

    /// Remove an agent
    ///
    /// # Errors
    ///
    /// Returns an error if the entity does not exist
    pub fn despawn(&mut self, entity: Entity) -> Result<(), hecs::NoSuchEntity> {
        self.world.despawn(entity)
    }

    /// Number of agents
    pub fn agent_count(&self) -> usize {
        self.world.query::<&SteeringAgent>().iter().count()
    }

    /// Current feet position of an agent
    pub fn position(&self, entity: Entity) -> Option<Vec3> {
        self.world
            .get::<&Transform>(entity)
            .ok()
            .map(|transform| transform.position)
    }

    /// Steering state of an agent
    pub fn agent(&self, entity: Entity) -> Option<hecs::Ref<'_, SteeringAgent>> {
        self.world.get::<&SteeringAgent>(entity).ok()
    }

    /// Check if no agent is still following a path
    pub fn all_idle(&self) -> bool {
        self.world
            .query::<&SteeringAgent>()
            .iter()
            .all(|(_, agent)| agent.is_idle())
    }

    /// Command an agent toward `target`, planning against the agents' current
    /// positions. Returns whether a path was found.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not an agent
    pub fn set_target(&mut self, entity: Entity, target: Vec3) -> Result<bool, hecs::ComponentError> {
        self.refresh_snapshot();

        let position = self.world.get::<&Transform>(entity)?.position;
        let mut agent = self.world.get::<&mut SteeringAgent>(entity)?;
        let mut planner = GridPlanner {
            grid: &self.grid,
            pathfinder: &self.pathfinder,
            scratch: &mut self.scratch,
            agents: &self.snapshot,
        };

        Ok(agent.set_target(target, position, &mut planner))
    }

    /// Plan a path for an anonymous requester standing at `start`
    pub fn find_path(&mut self, start: Vec3, target: Vec3) -> Option<Path> {
        self.refresh_snapshot();
        self.pathfinder.find_path_with(
            &mut self.scratch,
            &self.grid,
            Requester::at(start),
            target,
            &self.snapshot,
        )
    }

    /// Advance every agent by `dt` seconds.
    ///
    /// Agents are snapshotted once up front, so every agent steers against
    /// the same positions regardless of update order.
    pub fn tick(&mut self, dt: f32) {
        self.refresh_snapshot();

        let Self {
            world,
            physics,
            grid,
            pathfinder,
            scratch,
            snapshot,
            ..
        } = self;

        for (_, (transform, body, agent)) in
            world.query_mut::<(&mut Transform, &AgentBody, &mut SteeringAgent)>()
        {
            let mut planner = GridPlanner {
                grid: &*grid,
                pathfinder: &*pathfinder,
                scratch: &mut *scratch,
                agents: &*snapshot,
            };
            let mut character = CharacterBody {
                physics: &*physics,
                transform: &mut *transform,
                body,
            };

            agent.tick(dt, &mut character, &mut planner, &*snapshot);
            transform.rotation = agent.rotation();
        }

        self.ticks += 1;
        self.elapsed += dt;
    }

    fn refresh_snapshot(&mut self) {
        self.snapshot.clear();
        for (_, (transform, body, agent)) in self
            .world
            .query::<(&Transform, &AgentBody, &SteeringAgent)>()
            .iter()
        {
            self.snapshot.insert(AgentSnapshot {
                id: agent.id(),
                position: transform.position,
                radius: body.radius,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{GridConfig, planar_distance};
    use glam::Vec2;

    const DT: f32 = 1.0 / 60.0;

    /// 21x21 arena centered on the origin, so integer coordinates are cell centers
    fn arena() -> NavConfig {
        NavConfig::default().with_grid(GridConfig::default().with_world_size(Vec2::splat(21.0)))
    }

    fn run_until_idle(sim: &mut Simulation, max_ticks: usize) {
        for _ in 0..max_ticks {
            sim.tick(DT);
            if sim.all_idle() {
                break;
            }
        }
    }

    #[test]
    fn test_spawn_assigns_sequential_ids() {
        let mut sim = Simulation::new(arena(), Physics::new()).unwrap();
        let a = sim.spawn_agent(Vec3::ZERO);
        let b = sim.spawn_named("b", Vec3::X);

        assert_eq!(sim.agent_count(), 2);
        assert_eq!(sim.agent(a).unwrap().id(), AgentId(0));
        assert_eq!(sim.agent(b).unwrap().id(), AgentId(1));
        assert_eq!(sim.world().get::<&Name>(b).unwrap().0, "b");
        assert!(sim.all_idle());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = arena().with_grid(GridConfig::default().with_cell_size(-1.0));
        assert!(Simulation::new(config, Physics::new()).is_err());
    }

    #[test]
    fn test_agent_walks_to_target() {
        let mut sim = Simulation::new(arena(), Physics::new()).unwrap();
        let agent = sim.spawn_agent(Vec3::new(-5.0, 0.0, -3.0));
        let target = Vec3::new(4.0, 0.0, 2.0);

        assert!(sim.set_target(agent, target).unwrap());
        run_until_idle(&mut sim, 600);

        assert!(sim.all_idle());
        let position = sim.position(agent).unwrap();
        assert!(planar_distance(position, target) <= sim.config().steering.arrival_tolerance);
        assert_eq!(position.y, 0.0);
    }

    #[test]
    fn test_agent_routes_around_wall() {
        let mut sim = Simulation::new(arena(), Physics::new()).unwrap();
        sim.add_obstacle(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.5, 1.0, 6.0));
        sim.rebuild_grid();

        assert!(!sim.grid().is_walkable(10, 10));
        assert!(sim.grid().is_walkable(10, 17));

        let agent = sim.spawn_agent(Vec3::new(-5.0, 0.0, 0.0));
        let target = Vec3::new(5.0, 0.0, 0.0);
        assert!(sim.set_target(agent, target).unwrap());
        // Straight runs collapse to two waypoints, so a detour needs more
        assert!(sim.agent(agent).unwrap().path().len() > 2);

        run_until_idle(&mut sim, 1800);

        let position = sim.position(agent).unwrap();
        assert!(planar_distance(position, target) <= sim.config().steering.arrival_tolerance);
    }

    #[test]
    fn test_unreachable_target_stays_idle() {
        let mut sim = Simulation::new(arena(), Physics::new()).unwrap();
        sim.add_obstacle(Vec3::new(3.0, 1.0, 3.0), Vec3::new(0.5, 1.0, 0.5));
        sim.rebuild_grid();

        let agent = sim.spawn_agent(Vec3::ZERO);
        assert!(!sim.set_target(agent, Vec3::new(3.0, 0.0, 3.0)).unwrap());
        assert!(sim.agent(agent).unwrap().is_idle());
    }

    #[test]
    fn test_parked_agent_forces_detour() {
        let mut sim = Simulation::new(arena(), Physics::new()).unwrap();
        let start = Vec3::new(-5.0, 0.0, 0.0);
        let target = Vec3::new(5.0, 0.0, 0.0);

        let clear = sim.find_path(start, target).unwrap();
        assert_eq!(clear.len(), 2);

        sim.spawn_agent(Vec3::ZERO);
        let detour = sim.find_path(start, target).unwrap();
        assert!(detour.len() > 2);
        assert!(detour.cost > clear.cost);
    }

    #[test]
    fn test_missing_agent_is_an_error() {
        let mut sim = Simulation::new(arena(), Physics::new()).unwrap();
        let agent = sim.spawn_agent(Vec3::ZERO);
        sim.despawn(agent).unwrap();

        assert!(sim.set_target(agent, Vec3::X).is_err());
        assert_eq!(sim.position(agent), None);
    }

    #[test]
    fn test_tick_advances_clock() {
        let mut sim = Simulation::new(arena(), Physics::new()).unwrap();
        sim.tick(0.5);
        sim.tick(0.25);

        assert_eq!(sim.ticks(), 2);
        assert!((sim.elapsed() - 0.75).abs() < 1e-6);
    }
}
