//! Agent occupancy queries
//!
//! Read-only views of where agents stood at the start of a tick, plus the
//! dynamic cost model that makes the path search route around crowds.

use glam::Vec3;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Stable per-agent identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub u32);

impl AgentId {
    /// Side (+1 or -1) this agent prefers when swerving around others.
    ///
    /// Derived from the id parity so it never changes over the agent's lifetime.
    #[must_use]
    pub fn preferred_side(self) -> f32 {
        if self.0 & 1 == 0 { 1.0 } else { -1.0 }
    }
}

/// Position of one agent as seen by everyone else this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentSnapshot {
    /// Agent identifier
    pub id: AgentId,
    /// World position
    pub position: Vec3,
    /// Body radius
    pub radius: f32,
}

/// Project a vector onto the horizontal plane
#[inline]
#[must_use]
pub fn planar(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Horizontal distance between two points
#[inline]
#[must_use]
pub fn planar_distance(a: Vec3, b: Vec3) -> f32 {
    planar(a - b).length()
}

/// Nearby-agents query over a consistent snapshot.
pub trait AgentQuery {
    /// Visit every agent whose horizontal distance to `point` is at most `radius`
    fn for_each_within(&self, point: Vec3, radius: f32, visit: &mut dyn FnMut(&AgentSnapshot));

    /// Largest body radius among the indexed agents
    fn max_agent_radius(&self) -> f32;

    /// Sweep a circle of `radius` from `origin` along `direction` and return
    /// the first agent it strikes within `max_distance`.
    ///
    /// Agents already overlapping the circle at the origin are not reported,
    /// and `exclude` is never reported.
    fn cast_circle(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
        exclude: AgentId,
    ) -> Option<AgentSnapshot> {
        let dir = planar(direction).normalize_or_zero();
        if dir == Vec3::ZERO || max_distance <= 0.0 {
            return None;
        }

        let reach = max_distance + radius + self.max_agent_radius();
        let mut best: Option<(f32, AgentSnapshot)> = None;

        self.for_each_within(origin, reach, &mut |other| {
            if other.id == exclude {
                return;
            }

            let rel = planar(other.position - origin);
            let combined = radius + other.radius;
            let c = rel.length_squared() - combined * combined;
            if c <= 0.0 {
                return;
            }

            let b = rel.dot(dir);
            let disc = b * b - c;
            if b <= 0.0 || disc < 0.0 {
                return;
            }

            let t = b - disc.sqrt();
            if t <= max_distance && best.is_none_or(|(best_t, _)| t < best_t) {
                best = Some((t, *other));
            }
        });

        best.map(|(_, hit)| hit)
    }
}

/// Query that never finds anyone
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAgents;

impl AgentQuery for NoAgents {
    fn for_each_within(&self, _: Vec3, _: f32, _: &mut dyn FnMut(&AgentSnapshot)) {}

    fn max_agent_radius(&self) -> f32 {
        0.0
    }
}

impl AgentQuery for Vec<AgentSnapshot> {
    fn for_each_within(&self, point: Vec3, radius: f32, visit: &mut dyn FnMut(&AgentSnapshot)) {
        for agent in self {
            if planar_distance(agent.position, point) <= radius {
                visit(agent);
            }
        }
    }

    fn max_agent_radius(&self) -> f32 {
        self.iter().map(|a| a.radius).fold(0.0, f32::max)
    }
}

/// Uniform spatial hash over agent snapshots.
///
/// Rebuilt once per tick before any agent moves, so every agent reads the
/// same positions.
#[derive(Debug, Clone)]
pub struct SpatialHash {
    bucket_size: f32,
    buckets: FxHashMap<(i32, i32), SmallVec<[u32; 8]>>,
    agents: Vec<AgentSnapshot>,
    max_radius: f32,
}

impl SpatialHash {
    /// Create an empty hash with the given bucket size
    #[must_use]
    pub fn new(bucket_size: f32) -> Self {
        Self {
            bucket_size: bucket_size.max(f32::EPSILON),
            buckets: FxHashMap::default(),
            agents: Vec::new(),
            max_radius: 0.0,
        }
    }

    /// Remove all agents, keeping allocations
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.agents.clear();
        self.max_radius = 0.0;
    }

    /// Add an agent
    pub fn insert(&mut self, agent: AgentSnapshot) {
        let index = self.agents.len() as u32;
        self.buckets
            .entry(self.bucket_of(agent.position))
            .or_default()
            .push(index);
        self.max_radius = self.max_radius.max(agent.radius);
        self.agents.push(agent);
    }

    /// Indexed agents in insertion order
    #[must_use]
    pub fn agents(&self) -> &[AgentSnapshot] {
        &self.agents
    }

    /// Number of indexed agents
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Check if no agents are indexed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    fn bucket_of(&self, pos: Vec3) -> (i32, i32) {
        (
            (pos.x / self.bucket_size).floor() as i32,
            (pos.z / self.bucket_size).floor() as i32,
        )
    }
}

impl Default for SpatialHash {
    fn default() -> Self {
        Self::new(2.0)
    }
}

impl FromIterator<AgentSnapshot> for SpatialHash {
    fn from_iter<I: IntoIterator<Item = AgentSnapshot>>(iter: I) -> Self {
        let mut hash = Self::default();
        for agent in iter {
            hash.insert(agent);
        }
        hash
    }
}

impl AgentQuery for SpatialHash {
    fn for_each_within(&self, point: Vec3, radius: f32, visit: &mut dyn FnMut(&AgentSnapshot)) {
        if self.agents.is_empty() || radius < 0.0 {
            return;
        }

        let (min_x, min_z) = self.bucket_of(point - Vec3::new(radius, 0.0, radius));
        let (max_x, max_z) = self.bucket_of(point + Vec3::new(radius, 0.0, radius));

        // Wide queries touch more buckets than there are agents
        let span = |min: i32, max: i32| (i64::from(max) - i64::from(min) + 1) as u64;
        let buckets = span(min_x, max_x).saturating_mul(span(min_z, max_z));
        if buckets > self.agents.len() as u64 {
            self.agents.for_each_within(point, radius, visit);
            return;
        }

        for bx in min_x..=max_x {
            for bz in min_z..=max_z {
                let Some(bucket) = self.buckets.get(&(bx, bz)) else {
                    continue;
                };
                for &index in bucket {
                    let agent = &self.agents[index as usize];
                    if planar_distance(agent.position, point) <= radius {
                        visit(agent);
                    }
                }
            }
        }
    }

    fn max_agent_radius(&self) -> f32 {
        self.max_radius
    }
}

/// The agent a search runs on behalf of; its own body never counts as an obstacle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Requester {
    /// Requesting agent, if known
    pub id: Option<AgentId>,
    /// Requesting agent's position (search start)
    pub position: Vec3,
}

impl Requester {
    /// Requester identified only by position
    #[must_use]
    pub fn at(position: Vec3) -> Self {
        Self { id: None, position }
    }

    /// Check if a snapshot is the requester itself
    #[must_use]
    pub fn is_self(&self, other: &AgentSnapshot) -> bool {
        self.id == Some(other.id) || planar(other.position - self.position).length_squared() < 1e-4
    }
}

/// Dynamic per-cell cost from nearby agents
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OccupancyCost {
    /// Cells closer than this to another agent are not expanded
    pub block_radius: f32,
    /// Agents within this distance add a soft penalty
    pub influence_radius: f32,
    /// Penalty contributed by an agent standing on the cell center
    pub penalty_max: u32,
}

impl Default for OccupancyCost {
    fn default() -> Self {
        Self {
            block_radius: 0.35,
            influence_radius: 1.2,
            penalty_max: 60,
        }
    }
}

impl OccupancyCost {
    /// Cost model that ignores other agents
    pub const NONE: Self = Self {
        block_radius: 0.0,
        influence_radius: 0.0,
        penalty_max: 0,
    };

    /// Check if another agent stands on the cell
    #[must_use]
    pub fn is_blocked(&self, cell_center: Vec3, requester: &Requester, agents: &dyn AgentQuery) -> bool {
        if self.block_radius <= 0.0 {
            return false;
        }

        let mut blocked = false;
        agents.for_each_within(cell_center, self.block_radius, &mut |other| {
            blocked |= !requester.is_self(other);
        });
        blocked
    }

    /// Soft penalty for stepping onto the cell, summed over nearby agents
    #[must_use]
    pub fn penalty(&self, cell_center: Vec3, requester: &Requester, agents: &dyn AgentQuery) -> u32 {
        if self.influence_radius <= 0.0 || self.penalty_max == 0 {
            return 0;
        }

        let mut penalty = 0u32;
        agents.for_each_within(cell_center, self.influence_radius, &mut |other| {
            if requester.is_self(other) {
                return;
            }
            let d = planar_distance(cell_center, other.position);
            let t = (1.0 - d / self.influence_radius).clamp(0.0, 1.0);
            penalty += (self.penalty_max as f32 * t * t).round() as u32;
        });
        penalty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: u32, x: f32, z: f32) -> AgentSnapshot {
        AgentSnapshot {
            id: AgentId(id),
            position: Vec3::new(x, 0.0, z),
            radius: 0.4,
        }
    }

    #[test]
    fn test_preferred_side_is_stable() {
        assert_eq!(AgentId(4).preferred_side(), 1.0);
        assert_eq!(AgentId(7).preferred_side(), -1.0);
        assert_eq!(AgentId(7).preferred_side(), AgentId(7).preferred_side());
    }

    #[test]
    fn test_spatial_hash_matches_brute_force() {
        let agents: Vec<_> = (0..40)
            .map(|i| agent(i, (i % 8) as f32 * 1.3 - 5.0, (i / 8) as f32 * 1.7 - 4.0))
            .collect();
        let hash: SpatialHash = agents.iter().copied().collect();

        for probe in [Vec3::ZERO, Vec3::new(-4.0, 0.0, 2.5), Vec3::new(3.3, 5.0, -1.0)] {
            let mut from_hash = Vec::new();
            hash.for_each_within(probe, 2.2, &mut |a| from_hash.push(a.id));
            let mut from_slice = Vec::new();
            agents.for_each_within(probe, 2.2, &mut |a| from_slice.push(a.id));

            from_hash.sort();
            from_slice.sort();
            assert_eq!(from_hash, from_slice);
        }
    }

    #[test]
    fn test_wide_query_matches_brute_force() {
        let agents: Vec<_> = (0..5).map(|i| agent(i, i as f32 * 3.0, -(i as f32))).collect();
        let hash: SpatialHash = agents.iter().copied().collect();

        // Far more buckets than agents in range of this radius
        for radius in [50.0, 1.0e6] {
            let mut from_hash = Vec::new();
            hash.for_each_within(Vec3::ZERO, radius, &mut |a| from_hash.push(a.id));
            from_hash.sort();
            assert_eq!(from_hash, (0..5).map(AgentId).collect::<Vec<_>>());
        }

        let mut near = Vec::new();
        hash.for_each_within(Vec3::new(3.0, 0.0, -1.0), 0.5, &mut |a| near.push(a.id));
        assert_eq!(near, vec![AgentId(1)]);
    }

    #[test]
    fn test_cast_circle_hits_first_agent() {
        let agents = vec![agent(1, 0.0, 0.0), agent(2, 2.0, 0.0), agent(3, 1.0, 0.0)];

        let hit = agents
            .cast_circle(Vec3::ZERO, 0.45, Vec3::X, 1.1, AgentId(1))
            .unwrap();
        assert_eq!(hit.id, AgentId(3));
    }

    #[test]
    fn test_cast_circle_misses() {
        let agents = vec![agent(1, 0.0, 0.0), agent(2, 0.0, 3.0), agent(3, -1.0, 0.0)];

        // Sideways and behind
        assert!(
            agents
                .cast_circle(Vec3::ZERO, 0.45, Vec3::X, 1.1, AgentId(1))
                .is_none()
        );
        // Too far ahead
        assert!(
            agents
                .cast_circle(Vec3::ZERO, 0.45, Vec3::Z, 1.1, AgentId(1))
                .is_none()
        );
    }

    #[test]
    fn test_hard_block_exempts_requester() {
        let agents = vec![agent(1, 0.0, 0.0), agent(2, 3.0, 0.0)];
        let cost = OccupancyCost::default();
        let me = Requester {
            id: Some(AgentId(1)),
            position: Vec3::ZERO,
        };

        assert!(!cost.is_blocked(Vec3::ZERO, &me, &agents));
        assert!(cost.is_blocked(Vec3::new(3.0, 0.0, 0.0), &me, &agents));
        assert!(cost.is_blocked(Vec3::new(3.2, 0.0, 0.1), &me, &agents));
        assert!(!cost.is_blocked(Vec3::new(3.5, 0.0, 0.0), &me, &agents));
    }

    #[test]
    fn test_requester_exempt_by_position() {
        let agents = vec![agent(9, 1.0, 1.0)];
        let cost = OccupancyCost::default();
        let me = Requester::at(Vec3::new(1.0, 0.0, 1.0));

        assert!(!cost.is_blocked(Vec3::new(1.0, 0.0, 1.0), &me, &agents));
        assert_eq!(cost.penalty(Vec3::new(1.0, 0.0, 1.0), &me, &agents), 0);
    }

    #[test]
    fn test_penalty_falls_off_with_distance() {
        let agents = vec![agent(2, 0.0, 0.0)];
        let cost = OccupancyCost::default();
        let me = Requester::at(Vec3::new(-10.0, 0.0, 0.0));

        let mut last = u32::MAX;
        for step in 0..=14 {
            let d = step as f32 * 0.1;
            let p = cost.penalty(Vec3::new(d, 0.0, 0.0), &me, &agents);
            assert!(p <= last);
            last = p;
        }

        assert_eq!(cost.penalty(Vec3::ZERO, &me, &agents), 60);
        // (1 - 0.6 / 1.2)^2 * 60 = 15
        assert_eq!(cost.penalty(Vec3::new(0.6, 0.0, 0.0), &me, &agents), 15);
        assert_eq!(cost.penalty(Vec3::new(1.3, 0.0, 0.0), &me, &agents), 0);
    }

    #[test]
    fn test_penalty_sums_over_agents() {
        let agents = vec![agent(2, 0.5, 0.0), agent(3, -0.5, 0.0)];
        let cost = OccupancyCost::default();
        let me = Requester::at(Vec3::new(-10.0, 0.0, 0.0));

        let single = cost.penalty(Vec3::ZERO, &me, &agents[..1].to_vec());
        assert_eq!(cost.penalty(Vec3::ZERO, &me, &agents), single * 2);
    }
}
