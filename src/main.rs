//! Headless demo: two crowds swap sides of a walled arena

use std::error::Error;

use gridnav::ai::planar_distance;
use gridnav::prelude::*;

const TICK_RATE: f32 = 60.0;
const MAX_SECONDS: f32 = 60.0;
const CROWD_SIZE: usize = 6;

/// Square arena with a perimeter wall and a row of pillars across the middle
fn build_arena(half_size: f32) -> Physics {
    let mut physics = Physics::new();
    let wall_half = Vec3::new(half_size, 1.0, 0.5);

    physics.add_obstacle(Vec3::new(0.0, 1.0, -half_size), wall_half);
    physics.add_obstacle(Vec3::new(0.0, 1.0, half_size), wall_half);
    physics.add_obstacle(Vec3::new(-half_size, 1.0, 0.0), Vec3::new(0.5, 1.0, half_size));
    physics.add_obstacle(Vec3::new(half_size, 1.0, 0.0), Vec3::new(0.5, 1.0, half_size));

    for z in [-6.0, -2.0, 2.0, 6.0] {
        physics.add_obstacle(Vec3::new(0.0, 1.0, z), Vec3::new(0.5, 1.0, 0.5));
    }

    physics
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading configuration from {path}");
            NavConfig::load_ron(&path)?
        }
        None => NavConfig::default()
            .with_grid(GridConfig::default().with_world_size(Vec2::splat(21.0))),
    };

    let half_size = (config.grid.world_size.x.min(config.grid.world_size.y) * 0.5).floor();
    let mut sim = Simulation::new(config, build_arena(half_size))?;

    // Integer coordinates are cell centers on the default arena
    let lane = half_size - 2.0;
    let mut crowd = Vec::with_capacity(CROWD_SIZE * 2);
    for i in 0..CROWD_SIZE {
        let z = i as f32 * 2.0 - (CROWD_SIZE as f32 - 1.0);
        let west = Vec3::new(-lane, 0.0, z.round());
        let east = Vec3::new(lane, 0.0, (-z).round());

        crowd.push((sim.spawn_named(format!("west-{i}"), west), east));
        crowd.push((sim.spawn_named(format!("east-{i}"), east), west));
    }

    for &(entity, target) in &crowd {
        if !sim.set_target(entity, target)? {
            log::warn!("No path to {target} for {entity:?}");
        }
    }

    let dt = 1.0 / TICK_RATE;
    let report_every = (TICK_RATE * 2.0) as u64;
    while sim.elapsed() < MAX_SECONDS && !sim.all_idle() {
        sim.tick(dt);

        if sim.ticks() % report_every == 0 {
            let moving = crowd
                .iter()
                .filter(|(entity, _)| sim.agent(*entity).is_some_and(|a| !a.is_idle()))
                .count();
            log::info!("t={:.1}s: {moving} agents still moving", sim.elapsed());
        }
    }

    let mut arrived = 0;
    for &(entity, target) in &crowd {
        let Some(position) = sim.position(entity) else {
            continue;
        };
        let name = sim
            .world()
            .get::<&Name>(entity)
            .map(|name| name.0.clone())
            .unwrap_or_default();
        let replans = sim.agent(entity).map_or(0, |a| a.replan_count());
        let miss = planar_distance(position, target);

        if miss <= sim.config().steering.arrival_tolerance {
            arrived += 1;
        }
        log::info!("{name}: {miss:.2} from target, {replans} replans");
    }

    log::info!(
        "{arrived}/{} agents arrived after {:.1}s",
        crowd.len(),
        sim.elapsed()
    );

    Ok(())
}
