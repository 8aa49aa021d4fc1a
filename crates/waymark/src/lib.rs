#![doc = include_str!("../../../readme.md")]

mod agent;
mod bounds;
mod config;
pub mod destination;
mod graph;
pub(crate) mod math;
mod navmesh;
mod obstacle;
mod query;
mod schedule;
mod simulation;
mod trimesh;

pub use agent::{Agent, AgentId, Autonomy, SpawnPoint, SteeringState, TickOutcome};
pub use bounds::NavBounds;
pub use config::{DelayRange, QueryConfig, SimulationConfig, SteeringConfig};
pub use graph::{GroupId, NavGraph, NavGraphBuildError, NavNode, NodeIndex};
pub use math::{Aabb3d, approach_angle, wrap_angle, yaw_from_direction};
pub use navmesh::NavMesh;
pub use obstacle::Obstacle;
pub use query::{NavPath, PathFlags, PathQuery};
pub use schedule::{DeferredAction, FiredEvent, Scheduler, TimerId};
pub use simulation::{AgentCommands, CommandError, DebugOverlay, Simulation, TickSummary};
pub use trimesh::{AreaType, TriMesh, TriMeshError};

/// Everything needed to set up and drive a simulation.
pub mod prelude {
    pub use crate::{
        Agent, AgentId, Autonomy, NavMesh, NavPath, Obstacle, PathQuery, QueryConfig,
        Simulation, SimulationConfig, SpawnPoint, SteeringConfig, TriMesh,
    };
}
