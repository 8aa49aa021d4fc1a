//! The host surface: an explicit agent registry, the command interface, deferred events and the
//! debug overlay.

use std::sync::Arc;

use glam::Vec3;
use rand::{Rng, RngCore as _, SeedableRng as _};
use rand_chacha::ChaCha8Rng;
use slotmap::SlotMap;
use thiserror::Error;

use crate::{
    Agent, AgentId, Autonomy, DeferredAction, NavMesh, PathFlags, PathQuery, Scheduler,
    SimulationConfig, SpawnPoint, SteeringConfig, SteeringState, TickOutcome,
};

/// Owns every agent of a zone and advances them with an external tick.
#[derive(Debug, Clone)]
pub struct Simulation {
    agents: SlotMap<AgentId, Agent>,
    scheduler: Scheduler,
    query: PathQuery,
    config: SimulationConfig,
    rng: ChaCha8Rng,
}

/// Counts of what happened to the agents during a [`Simulation::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickSummary {
    /// Agents that moved.
    pub moved: usize,
    /// Agents whose next step was not walkable.
    pub blocked: usize,
    /// Agents that reached the end of their path.
    pub completed: usize,
    /// Agents that gave up their path.
    pub abandoned: usize,
    /// Deferred events that fired.
    pub events: usize,
}

/// Data for a debug visualization of the simulation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DebugOverlay {
    /// The edges of the walkable triangles.
    pub edges: Vec<[Vec3; 2]>,
    /// The footprints of the carved obstacles, at the bottom of each obstacle.
    pub obstacles: Vec<Vec<Vec3>>,
    /// Per agent, its position followed by its remaining waypoints.
    pub paths: Vec<(AgentId, Vec<Vec3>)>,
}

/// Errors returned by the command interface.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// No agent with this id is registered. It may have been despawned.
    #[error("Unknown agent {0:?}")]
    UnknownAgent(AgentId),
}

impl Simulation {
    /// Creates an empty simulation on top of a path query service.
    pub fn new(query: PathQuery, config: SimulationConfig) -> Self {
        Self {
            agents: SlotMap::with_key(),
            scheduler: Scheduler::default(),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            query,
            config,
        }
    }

    /// Creates an empty simulation on a shared navmesh, using the query parameters of `config`.
    pub fn from_navmesh(navmesh: Arc<NavMesh>, config: SimulationConfig) -> Self {
        let query = PathQuery::new(navmesh, config.query.clone());
        Self::new(query, config)
    }

    /// The path query service shared by every agent.
    #[inline]
    pub fn query(&self) -> &PathQuery {
        &self.query
    }

    /// The simulation parameters.
    #[inline]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The pending deferred events.
    #[inline]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Enables or disables [`Simulation::debug_overlay`].
    pub fn set_debug(&mut self, debug: bool) {
        self.config.debug = debug;
    }

    /// Spawns an idle agent with the default steering parameters.
    pub fn spawn(&mut self, spawn: SpawnPoint, autonomy: Autonomy) -> AgentId {
        let steering = self.config.steering.clone();
        self.spawn_with(spawn, autonomy, steering)
    }

    /// Spawns an idle agent with custom steering parameters.
    pub fn spawn_with(
        &mut self,
        spawn: SpawnPoint,
        autonomy: Autonomy,
        steering: SteeringConfig,
    ) -> AgentId {
        let position = spawn.resolve(&self.query, steering.spawn_attempts, &mut self.rng);
        let seed = self.rng.next_u64();
        let id = self
            .agents
            .insert(Agent::new(position, autonomy, steering, seed));
        tracing::debug!("Spawned {autonomy:?} agent {id:?} at {position}");
        id
    }

    /// Removes an agent and cancels its deferred events.
    pub fn despawn(&mut self, id: AgentId) -> Option<Agent> {
        let agent = self.agents.remove(id)?;
        let cancelled = self.scheduler.cancel_agent(id);
        tracing::debug!("Despawned agent {id:?}, cancelled {cancelled} pending events");
        Some(agent)
    }

    /// Whether `id` refers to a registered agent.
    #[inline]
    pub fn is_agent(&self, id: AgentId) -> bool {
        self.agents.contains_key(id)
    }

    /// The agent with the given id.
    #[inline]
    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    /// Every registered agent.
    pub fn agents(&self) -> impl Iterator<Item = (AgentId, &Agent)> {
        self.agents.iter()
    }

    /// Number of registered agents.
    #[inline]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agent is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// The command interface of an agent.
    pub fn command(&mut self, id: AgentId) -> Result<AgentCommands<'_>, CommandError> {
        let agent = self
            .agents
            .get_mut(id)
            .ok_or(CommandError::UnknownAgent(id))?;
        Ok(AgentCommands {
            id,
            agent,
            scheduler: &mut self.scheduler,
            query: &self.query,
        })
    }

    /// Sends every agent toward `point`.
    pub fn broadcast_destination(&mut self, point: Vec3) {
        for (_, agent) in self.agents.iter_mut() {
            if let Some(timer) = agent.pending.take() {
                self.scheduler.cancel(timer);
            }
            agent.set_destination(&self.query, point);
        }
    }

    /// Places every agent at `at` and starts each one after a random delay of at most
    /// [`SimulationConfig::start_delay_max`] seconds.
    ///
    /// Every pending event of an agent is replaced, so calling this again restarts the crowd.
    pub fn start_all(&mut self, at: Vec3) {
        let position = self
            .query
            .elevate(self.query.clamp_to_bounds(at, self.query.config().clamp_margin));
        let max_delay = self.config.start_delay_max;
        for (id, agent) in self.agents.iter_mut() {
            agent.pending = None;
            self.scheduler.cancel_agent(id);
            agent.set_position(&self.query, position);
            let delay = if max_delay > 0.0 {
                self.rng.gen_range(0.0..max_delay)
            } else {
                0.0
            };
            self.scheduler.schedule(id, delay, DeferredAction::StartMovement);
        }
        tracing::info!("Starting {} agents at {position}", self.agents.len());
    }

    /// Advances the simulation by `dt` seconds: fires due events, then ticks every agent.
    pub fn tick(&mut self, dt: f32) -> TickSummary {
        let mut summary = TickSummary::default();
        for event in self.scheduler.advance(dt) {
            let Some(agent) = self.agents.get_mut(event.agent) else {
                tracing::debug!("Dropping {:?} for despawned agent", event.action);
                continue;
            };
            summary.events += 1;
            if agent.pending == Some(event.timer) {
                agent.pending = None;
            }
            match event.action {
                DeferredAction::StartMovement => agent.start_movement(&self.query),
                DeferredAction::PickDestination => {
                    // The agent may have been given a destination in the meantime.
                    if agent.is_moving() && agent.state() == SteeringState::SeekingDestination {
                        agent.seek_destination(&self.query);
                    }
                }
            }
        }

        for (id, agent) in self.agents.iter_mut() {
            let outcome = agent.tick(&self.query, dt);
            match outcome {
                TickOutcome::Moved => summary.moved += 1,
                TickOutcome::Blocked => summary.blocked += 1,
                TickOutcome::PathCompleted => summary.completed += 1,
                TickOutcome::Abandoned => summary.abandoned += 1,
                TickOutcome::Idle | TickOutcome::Waiting => {}
            }
            let finished = matches!(outcome, TickOutcome::PathCompleted | TickOutcome::Abandoned);
            if finished && agent.autonomy() == Autonomy::Wander {
                if let Some(timer) = agent.pending.take() {
                    self.scheduler.cancel(timer);
                }
                let delay = agent.sample_completion_delay();
                let timer = self.scheduler.schedule(id, delay, DeferredAction::PickDestination);
                agent.pending = Some(timer);
            }
        }
        summary
    }

    /// The debug overlay, or `None` unless [`SimulationConfig::debug`] is set.
    pub fn debug_overlay(&self) -> Option<DebugOverlay> {
        if !self.config.debug {
            return None;
        }
        let navmesh = self.query.navmesh();
        let obstacles = navmesh
            .obstacles()
            .iter()
            .map(|obstacle| {
                obstacle
                    .footprint
                    .iter()
                    .map(|point| Vec3::new(point.x, obstacle.min_y, point.y))
                    .collect()
            })
            .collect();
        let paths = self
            .agents
            .iter()
            .map(|(id, agent)| {
                let points = std::iter::once(agent.position())
                    .chain(agent.path().iter().copied())
                    .collect();
                (id, points)
            })
            .collect();
        Some(DebugOverlay {
            edges: navmesh.wireframe_edges(),
            obstacles,
            paths,
        })
    }
}

/// Commands for a single agent, see [`Simulation::command`].
pub struct AgentCommands<'a> {
    id: AgentId,
    agent: &'a mut Agent,
    scheduler: &'a mut Scheduler,
    query: &'a PathQuery,
}

impl AgentCommands<'_> {
    /// The id of the commanded agent.
    #[inline]
    pub fn id(&self) -> AgentId {
        self.id
    }

    /// The commanded agent.
    #[inline]
    pub fn agent(&self) -> &Agent {
        self.agent
    }

    /// Replaces the agent's path with a path to `target` and cancels its pending destination
    /// choice. Returns the flags of the new path.
    pub fn set_destination(&mut self, target: Vec3) -> PathFlags {
        if let Some(timer) = self.agent.pending.take() {
            self.scheduler.cancel(timer);
        }
        self.agent.set_destination(self.query, target)
    }

    /// Enables movement.
    pub fn start_movement(&mut self) {
        self.agent.start_movement(self.query);
    }

    /// Disables movement, drops the path and cancels every pending event of the agent.
    pub fn stop(&mut self) {
        self.agent.pending = None;
        self.scheduler.cancel_agent(self.id);
        self.agent.stop();
    }
}

#[cfg(test)]
mod tests {
    use glam::{UVec3, Vec3A};

    use super::*;
    use crate::{QueryConfig, TriMesh};

    fn simulation(debug: bool) -> Simulation {
        let trimesh = TriMesh::new(
            vec![
                Vec3A::new(-10.0, 0.0, -10.0),
                Vec3A::new(10.0, 0.0, -10.0),
                Vec3A::new(10.0, 0.0, 10.0),
                Vec3A::new(-10.0, 0.0, 10.0),
            ],
            vec![UVec3::new(0, 2, 1), UVec3::new(0, 3, 2)],
        );
        let query = PathQuery::from_trimesh("floor", trimesh, &[], QueryConfig::default());
        Simulation::new(
            query,
            SimulationConfig {
                seed: 5,
                debug,
                ..Default::default()
            },
        )
    }

    #[test]
    fn start_all_moves_every_agent_after_a_delay() {
        let mut sim = simulation(false);
        let ids = (0..5)
            .map(|_| sim.spawn(SpawnPoint::RandomWalkable, Autonomy::Wander))
            .collect::<Vec<_>>();
        sim.start_all(Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(sim.scheduler().len(), 5);
        for &id in &ids {
            let agent = sim.agent(id).unwrap();
            assert_eq!(agent.position(), Vec3::new(1.0, 0.5, 1.0));
            assert!(!agent.is_moving());
        }
        // The start delay is at most one second.
        for _ in 0..11 {
            sim.tick(0.1);
        }
        assert!(ids.iter().all(|&id| sim.agent(id).unwrap().is_moving()));
    }

    #[test]
    fn despawn_cancels_pending_events() {
        let mut sim = simulation(false);
        let id = sim.spawn(SpawnPoint::BoundsCenter, Autonomy::Wander);
        sim.start_all(Vec3::ZERO);
        assert_eq!(sim.scheduler().len(), 1);
        assert!(sim.despawn(id).is_some());
        assert!(sim.scheduler().is_empty());
        assert!(!sim.is_agent(id));
        assert_eq!(sim.tick(2.0).events, 0);
        assert_eq!(
            sim.command(id).err(),
            Some(CommandError::UnknownAgent(id))
        );
    }

    #[test]
    fn commanded_agents_stop_at_their_destination() {
        let mut sim = simulation(false);
        let id = sim.spawn(SpawnPoint::BoundsCenter, Autonomy::Commanded);
        {
            let mut commands = sim.command(id).unwrap();
            let flags = commands.set_destination(Vec3::new(3.0, 0.0, 0.0));
            assert!(!flags.contains(PathFlags::FALLBACK));
            commands.start_movement();
        }
        let mut completed = 0;
        for _ in 0..100 {
            completed += sim.tick(0.1).completed;
        }
        assert_eq!(completed, 1);
        let agent = sim.agent(id).unwrap();
        assert_eq!(agent.state(), SteeringState::Idle);
        assert!(!agent.is_moving());
        assert!(agent.position().distance(Vec3::new(3.0, 0.5, 0.0)) <= 0.1);
        assert!(sim.scheduler().is_empty());
    }

    #[test]
    fn arrived_commanded_agents_follow_new_commands() {
        let mut sim = simulation(false);
        let id = sim.spawn(SpawnPoint::BoundsCenter, Autonomy::Commanded);
        {
            let mut commands = sim.command(id).unwrap();
            commands.set_destination(Vec3::new(2.0, 0.0, 0.0));
            commands.start_movement();
        }
        for _ in 0..50 {
            sim.tick(0.1);
        }
        assert!(!sim.agent(id).unwrap().is_moving());

        sim.command(id)
            .unwrap()
            .set_destination(Vec3::new(-2.0, 0.0, 0.0));
        let agent = sim.agent(id).unwrap();
        assert_eq!(agent.state(), SteeringState::Following);
        assert!(agent.is_moving());
        let mut completed = 0;
        for _ in 0..100 {
            completed += sim.tick(0.1).completed;
        }
        assert_eq!(completed, 1);
        let agent = sim.agent(id).unwrap();
        assert!(agent.position().distance(Vec3::new(-2.0, 0.5, 0.0)) <= 0.1);
        assert_eq!(agent.state(), SteeringState::Idle);

        sim.broadcast_destination(Vec3::new(0.0, 0.0, 3.0));
        for _ in 0..100 {
            sim.tick(0.1);
        }
        let agent = sim.agent(id).unwrap();
        assert!(agent.position().distance(Vec3::new(0.0, 0.5, 3.0)) <= 0.1);
    }

    #[test]
    fn unstarted_agents_keep_their_path_until_started() {
        let mut sim = simulation(false);
        let id = sim.spawn(SpawnPoint::BoundsCenter, Autonomy::Commanded);
        sim.command(id)
            .unwrap()
            .set_destination(Vec3::new(2.0, 0.0, 0.0));
        let agent = sim.agent(id).unwrap();
        assert_eq!(agent.state(), SteeringState::Idle);
        assert!(!agent.is_moving());
        assert!(!agent.path().is_empty());

        sim.tick(0.1);
        assert_eq!(sim.agent(id).unwrap().position(), Vec3::new(0.0, 0.5, 0.0));
        sim.command(id).unwrap().start_movement();
        assert_eq!(sim.agent(id).unwrap().state(), SteeringState::Following);
    }

    #[test]
    fn restarting_replaces_pending_events() {
        let mut sim = simulation(false);
        for _ in 0..5 {
            sim.spawn(SpawnPoint::RandomWalkable, Autonomy::Wander);
        }
        sim.start_all(Vec3::ZERO);
        sim.start_all(Vec3::new(2.0, 0.0, 2.0));
        assert_eq!(sim.scheduler().len(), 5);

        for _ in 0..11 {
            sim.tick(0.1);
        }
        sim.start_all(Vec3::ZERO);
        assert_eq!(sim.scheduler().len(), 5);
        assert!(sim.agents().all(|(_, agent)| agent.pending.is_none()));
    }

    #[test]
    fn wanderers_schedule_their_next_destination() {
        let mut sim = simulation(false);
        let id = sim.spawn(SpawnPoint::BoundsCenter, Autonomy::Wander);
        sim.command(id)
            .unwrap()
            .set_destination(Vec3::new(1.0, 0.0, 0.0));
        sim.command(id).unwrap().start_movement();
        let mut scheduled = false;
        for _ in 0..30 {
            if sim.tick(0.1).completed > 0 {
                scheduled = sim.agent(id).unwrap().pending.is_some();
                break;
            }
        }
        assert!(scheduled);
    }

    #[test]
    fn debug_overlay_requires_the_flag() {
        let mut sim = simulation(false);
        sim.spawn(SpawnPoint::BoundsCenter, Autonomy::Wander);
        assert_eq!(sim.debug_overlay(), None);
        sim.set_debug(true);
        let overlay = sim.debug_overlay().unwrap();
        assert_eq!(overlay.edges.len(), 5);
        assert_eq!(overlay.paths.len(), 1);
        assert_eq!(overlay.paths[0].1, vec![Vec3::new(0.0, 0.5, 0.0)]);
    }
}
