//! The per-agent steering controller.
//!
//! An [`Agent`] owns its path and its position. Every tick it consumes reached waypoints, moves
//! toward the next one, and validates the move against the navmesh. It never blocks on a query:
//! every path query returns something usable, see [`PathQuery::find_path`].

use std::collections::VecDeque;

use glam::Vec3;
use rand::{Rng, SeedableRng as _};
use rand_chacha::ChaCha8Rng;

use crate::{
    NavPath, PathFlags, PathQuery, SteeringConfig, TimerId,
    destination::{Destination, choose_destination},
    math::{approach_angle, yaw_from_direction},
};

slotmap::new_key_type! {
    /// Identifies an agent registered in a [`Simulation`](crate::Simulation).
    pub struct AgentId;
}

/// Who decides where an agent goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Autonomy {
    /// The agent picks its own destinations.
    #[default]
    Wander,
    /// The agent only moves when given a destination, and stops when it arrives.
    Commanded,
}

/// The state of an agent's steering state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum SteeringState {
    /// No path and movement disabled.
    #[default]
    Idle,
    /// Waiting for the next destination.
    SeekingDestination,
    /// Walking along a path.
    Following,
}

/// What happened to an agent during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickOutcome {
    /// Movement is disabled.
    Idle,
    /// Movement is enabled, but there is no path to follow.
    Waiting,
    /// The agent moved along its path.
    Moved,
    /// The next step was not walkable, the agent stayed in place.
    Blocked,
    /// The last waypoint was reached.
    PathCompleted,
    /// The agent was blocked for too long and gave up its path.
    Abandoned,
}

/// Where a new agent is placed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpawnPoint {
    /// A fixed position.
    Fixed(Vec3),
    /// The center of the navmesh bounds.
    BoundsCenter,
    /// A random walkable point inside the bounds.
    /// Falls back to the bounds center if no walkable point is found.
    RandomWalkable,
}

impl SpawnPoint {
    /// Resolves the spawn point to a position at waypoint height, inside the clamped bounds.
    pub fn resolve(self, query: &PathQuery, attempts: u32, rng: &mut impl Rng) -> Vec3 {
        let center = query.bounds().map(|bounds| bounds.center).unwrap_or_default();
        let position = match self {
            SpawnPoint::Fixed(position) => position,
            SpawnPoint::BoundsCenter => center,
            SpawnPoint::RandomWalkable => {
                let sampled = query.bounds().and_then(|bounds| {
                    (0..attempts)
                        .map(|_| {
                            Vec3::new(
                                rng.gen_range(bounds.min.x..=bounds.max.x),
                                bounds.center.y,
                                rng.gen_range(bounds.min.z..=bounds.max.z),
                            )
                        })
                        .find(|&candidate| query.is_point_walkable(candidate))
                });
                sampled.unwrap_or_else(|| {
                    tracing::warn!("Found no walkable spawn point in {attempts} attempts");
                    center
                })
            }
        };
        let margin = query.config().clamp_margin;
        query.elevate(query.clamp_to_bounds(position, -margin))
    }
}

/// A single agent with its own path, state machine and random number generator.
#[derive(Debug, Clone)]
pub struct Agent {
    position: Vec3,
    yaw: f32,
    path: VecDeque<Vec3>,
    destination: Option<Vec3>,
    state: SteeringState,
    autonomy: Autonomy,
    movement_enabled: bool,
    started: bool,
    reseek_timer: f32,
    blocked_ticks: u32,
    uncertain_ticks: u32,
    config: SteeringConfig,
    rng: ChaCha8Rng,
    pub(crate) pending: Option<TimerId>,
}

impl Agent {
    /// Creates an idle agent at `position`.
    pub fn new(position: Vec3, autonomy: Autonomy, config: SteeringConfig, seed: u64) -> Self {
        Self {
            position,
            yaw: 0.0,
            path: VecDeque::new(),
            destination: None,
            state: SteeringState::Idle,
            autonomy,
            movement_enabled: false,
            started: false,
            reseek_timer: 0.0,
            blocked_ticks: 0,
            uncertain_ticks: 0,
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            pending: None,
        }
    }

    /// The current position.
    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// The current heading in radians, measured from +Z toward +X.
    #[inline]
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    /// The remaining waypoints.
    #[inline]
    pub fn path(&self) -> &VecDeque<Vec3> {
        &self.path
    }

    /// The final waypoint of the current or last path.
    #[inline]
    pub fn destination(&self) -> Option<Vec3> {
        self.destination
    }

    /// The state of the steering state machine.
    #[inline]
    pub fn state(&self) -> SteeringState {
        self.state
    }

    /// Who decides where the agent goes.
    #[inline]
    pub fn autonomy(&self) -> Autonomy {
        self.autonomy
    }

    /// Whether the agent moves when ticked.
    #[inline]
    pub fn is_moving(&self) -> bool {
        self.movement_enabled
    }

    /// Number of consecutive ticks the agent was blocked.
    #[inline]
    pub fn blocked_ticks(&self) -> u32 {
        self.blocked_ticks
    }

    /// The steering parameters.
    #[inline]
    pub fn config(&self) -> &SteeringConfig {
        &self.config
    }

    /// Teleports the agent. The position is clamped like every position reached by moving.
    pub fn set_position(&mut self, query: &PathQuery, position: Vec3) {
        self.position = query.clamp_to_bounds(position, -query.config().clamp_margin);
    }

    /// Computes a path to `target` and replaces the current path with it.
    ///
    /// Returns the flags of the new path.
    pub fn set_destination(&mut self, query: &PathQuery, target: Vec3) -> PathFlags {
        let path = query.find_path(self.position, target);
        let flags = path.flags;
        self.follow(path);
        flags
    }

    /// Replaces the current path.
    ///
    /// An agent that has been started walks the new path right away, even a commanded agent that
    /// stopped after arriving. Otherwise the path is kept until [`Agent::start_movement`].
    pub fn follow(&mut self, path: NavPath) {
        self.destination = path.destination();
        self.path = path.waypoints.into();
        self.blocked_ticks = 0;
        if !self.started {
            self.state = SteeringState::Idle;
        } else if self.path.is_empty() {
            self.state = self.idle_state();
        } else {
            self.movement_enabled = true;
            self.state = SteeringState::Following;
        }
    }

    /// Enables movement. A wandering agent without a path immediately looks for a destination,
    /// a commanded agent without a path waits for one.
    pub fn start_movement(&mut self, query: &PathQuery) {
        self.started = true;
        self.reseek_timer = self.config.reseek_delay.sample(&mut self.rng);
        if !self.path.is_empty() {
            self.movement_enabled = true;
            self.state = SteeringState::Following;
        } else if self.autonomy == Autonomy::Wander {
            self.movement_enabled = true;
            self.seek_destination(query);
        }
    }

    /// Disables movement and drops the current path. Movement stays off until
    /// [`Agent::start_movement`].
    pub fn stop(&mut self) {
        self.movement_enabled = false;
        self.started = false;
        self.path.clear();
        self.state = SteeringState::Idle;
    }

    /// Picks a new destination and starts following the path to it.
    pub fn seek_destination(&mut self, query: &PathQuery) {
        self.reseek_timer = self.config.reseek_delay.sample(&mut self.rng);
        match choose_destination(query, self.position, &self.config, &mut self.rng) {
            Destination::Path(path) => self.follow(path),
            Destination::Nudge(target) => {
                tracing::debug!("No reachable destination found, nudging toward {target}");
                self.follow(NavPath {
                    waypoints: vec![target],
                    flags: PathFlags::FALLBACK,
                });
            }
        }
    }

    pub(crate) fn sample_completion_delay(&mut self) -> f32 {
        self.config.completion_delay.sample(&mut self.rng)
    }

    /// Advances the agent by `dt` seconds.
    pub fn tick(&mut self, query: &PathQuery, dt: f32) -> TickOutcome {
        if !self.movement_enabled {
            return TickOutcome::Idle;
        }
        if self.autonomy == Autonomy::Wander {
            self.reseek_timer -= dt;
            if self.reseek_timer <= 0.0 {
                self.seek_destination(query);
            }
        }

        self.pop_reached();
        let Some(&target) = self.path.front() else {
            return self.finish_path(TickOutcome::PathCompleted);
        };

        let to_target = target - self.position;
        let distance = to_target.length();
        let step = (self.config.speed * dt).min(distance * self.config.overshoot_cap);
        let candidate = self.position + to_target / distance * step;

        // Agents that left the mesh move without validation, so they can always come back.
        let validate = query.is_point_walkable(self.position);
        if validate
            && !(query.is_point_walkable(candidate)
                && query.is_reachable(self.position, candidate))
        {
            return self.handle_blocked(query);
        }

        let blend = if self.uncertain_ticks > 0 {
            self.uncertain_ticks -= 1;
            self.config.uncertain_blend
        } else {
            self.config.clear_blend
        };
        let moved = self.position.lerp(candidate, blend);
        self.yaw = approach_angle(self.yaw, yaw_from_direction(to_target), self.config.turn_rate);
        self.position = query.clamp_to_bounds(moved, -query.config().clamp_margin);
        self.blocked_ticks = 0;

        self.pop_reached();
        if self.path.is_empty() {
            return self.finish_path(TickOutcome::PathCompleted);
        }
        TickOutcome::Moved
    }

    fn pop_reached(&mut self) {
        while let Some(&waypoint) = self.path.front() {
            if waypoint.distance(self.position) > self.config.reach_threshold {
                break;
            }
            self.path.pop_front();
        }
    }

    fn handle_blocked(&mut self, query: &PathQuery) -> TickOutcome {
        self.blocked_ticks += 1;
        self.uncertain_ticks = self.config.uncertain_ticks;
        if self.blocked_ticks >= self.config.max_blocked_ticks {
            tracing::debug!(
                "Agent at {} abandoned its path after {} blocked ticks",
                self.position,
                self.blocked_ticks
            );
            self.path.clear();
            self.blocked_ticks = 0;
            return self.finish_path(TickOutcome::Abandoned);
        }
        if self.config.replan_on_block {
            if let Some(&goal) = self.path.back() {
                let path = query.find_path(self.position, goal);
                if !path.is_fallback() {
                    self.path = path.waypoints.into();
                }
            }
        }
        TickOutcome::Blocked
    }

    fn finish_path(&mut self, outcome: TickOutcome) -> TickOutcome {
        if self.state != SteeringState::Following {
            return TickOutcome::Waiting;
        }
        self.state = self.idle_state();
        if self.autonomy == Autonomy::Commanded {
            self.movement_enabled = false;
        }
        outcome
    }

    fn idle_state(&self) -> SteeringState {
        match self.autonomy {
            Autonomy::Wander => SteeringState::SeekingDestination,
            Autonomy::Commanded => SteeringState::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::{UVec3, Vec3A};

    use super::*;
    use crate::{QueryConfig, TriMesh};

    fn query() -> PathQuery {
        let trimesh = TriMesh::new(
            vec![
                Vec3A::new(-10.0, 0.0, -10.0),
                Vec3A::new(10.0, 0.0, -10.0),
                Vec3A::new(10.0, 0.0, 10.0),
                Vec3A::new(-10.0, 0.0, 10.0),
            ],
            vec![UVec3::new(0, 2, 1), UVec3::new(0, 3, 2)],
        );
        PathQuery::from_trimesh("floor", trimesh, &[], QueryConfig::default())
    }

    fn commanded(position: Vec3, speed: f32) -> Agent {
        let config = SteeringConfig {
            speed,
            ..Default::default()
        };
        Agent::new(position, Autonomy::Commanded, config, 0)
    }

    #[test]
    fn idle_agents_do_not_move() {
        let query = query();
        let mut agent = commanded(Vec3::new(0.0, 0.5, 0.0), 2.0);
        agent.set_destination(&query, Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(agent.tick(&query, 0.1), TickOutcome::Idle);
        assert_eq!(agent.position(), Vec3::new(0.0, 0.5, 0.0));
    }

    #[test]
    fn steps_never_exceed_speed() {
        let query = query();
        let mut agent = commanded(Vec3::new(0.0, 0.5, 0.0), 2.0);
        agent.set_destination(&query, Vec3::new(8.0, 0.0, 8.0));
        agent.start_movement(&query);
        let mut previous = agent.position();
        for _ in 0..200 {
            agent.tick(&query, 0.1);
            assert!(agent.position().distance(previous) <= 0.2 + 1e-5);
            previous = agent.position();
        }
        assert!(agent.path().is_empty());
        assert_eq!(agent.state(), SteeringState::Idle);
        assert!(!agent.is_moving());
        assert_relative_eq!(agent.position().x, 8.0, epsilon = 0.1);
        assert_relative_eq!(agent.position().z, 8.0, epsilon = 0.1);
    }

    #[test]
    fn reaches_a_waypoint_in_the_expected_number_of_ticks() {
        let query = query();
        let start = Vec3::new(0.0, 0.5, 0.0);
        let mut agent = commanded(start, 2.0);
        agent.follow(NavPath {
            waypoints: vec![Vec3::new(2.0, 0.5, 0.0)],
            flags: PathFlags::empty(),
        });
        agent.start_movement(&query);
        let mut ticks = 0;
        while !agent.path().is_empty() {
            agent.tick(&query, 0.1);
            ticks += 1;
            assert!(ticks < 100);
        }
        // ceil(d / (s * dt)) = 10
        assert!((9..=11).contains(&ticks), "{ticks}");
    }

    #[test]
    fn set_destination_replaces_the_path() {
        let query = query();
        let mut agent = commanded(Vec3::new(0.0, 0.5, 0.0), 2.0);
        agent.set_destination(&query, Vec3::new(8.0, 0.0, 8.0));
        agent.set_destination(&query, Vec3::new(-8.0, 0.0, -8.0));
        assert_eq!(agent.destination(), Some(Vec3::new(-8.0, 0.5, -8.0)));
        assert_eq!(agent.path().back(), Some(&Vec3::new(-8.0, 0.5, -8.0)));
        assert!(
            agent
                .path()
                .iter()
                .all(|waypoint| *waypoint != Vec3::new(8.0, 0.5, 8.0))
        );
    }

    #[test]
    fn yaw_turns_toward_the_waypoint() {
        let query = query();
        let mut agent = commanded(Vec3::new(0.0, 0.5, 0.0), 1.0);
        agent.set_destination(&query, Vec3::new(5.0, 0.0, 0.0));
        agent.start_movement(&query);
        let mut previous = agent.yaw();
        for _ in 0..20 {
            agent.tick(&query, 0.1);
            assert!(agent.yaw() >= previous);
            assert!(agent.yaw() <= std::f32::consts::FRAC_PI_2 + 1e-4);
            previous = agent.yaw();
        }
        assert!(previous > 1.0);
    }

    #[test]
    fn wandering_agents_find_their_own_destinations() {
        let query = query();
        let mut agent = Agent::new(
            Vec3::new(0.0, 0.5, 0.0),
            Autonomy::Wander,
            SteeringConfig::default(),
            42,
        );
        agent.start_movement(&query);
        assert_eq!(agent.state(), SteeringState::Following);
        assert!(!agent.path().is_empty());
        for _ in 0..50 {
            agent.tick(&query, 0.1);
        }
        assert_ne!(agent.position(), Vec3::new(0.0, 0.5, 0.0));
    }

    #[test]
    fn positions_stay_near_the_bounds() {
        let query = query();
        // Off the mesh, so moves are not validated.
        let mut agent = commanded(Vec3::new(11.0, 0.5, 0.0), 5.0);
        agent.follow(NavPath {
            waypoints: vec![Vec3::new(50.0, 0.5, 0.0)],
            flags: PathFlags::FALLBACK,
        });
        agent.start_movement(&query);
        for _ in 0..50 {
            agent.tick(&query, 0.1);
            assert!(agent.position().x <= 12.0 + 1e-4);
        }
        assert_relative_eq!(agent.position().x, 12.0);
    }

    #[test]
    fn spawn_points_resolve_onto_the_surface() {
        let query = query();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let center = SpawnPoint::BoundsCenter.resolve(&query, 10, &mut rng);
        assert_eq!(center, Vec3::new(0.0, 0.5, 0.0));
        let random = SpawnPoint::RandomWalkable.resolve(&query, 10, &mut rng);
        assert!(query.is_point_walkable(random));
        assert_relative_eq!(random.y, 0.5);
    }

    #[test]
    fn placed_positions_are_clamped() {
        let query = query();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let fixed = SpawnPoint::Fixed(Vec3::new(50.0, 0.0, -3.0)).resolve(&query, 10, &mut rng);
        assert_eq!(fixed, Vec3::new(12.0, 0.5, -3.0));

        let mut agent = commanded(fixed, 1.0);
        agent.set_position(&query, Vec3::new(-40.0, 0.5, 30.0));
        assert_eq!(agent.position(), Vec3::new(-12.0, 0.5, 12.0));
        agent.set_position(&query, Vec3::new(4.0, 0.5, 4.0));
        assert_eq!(agent.position(), Vec3::new(4.0, 0.5, 4.0));
    }
}
