//! The immutable navmesh shared by every agent of a zone.

use glam::Vec3;

use crate::{NavBounds, NavGraph, NavGraphBuildError, Obstacle, TriMesh};

/// A navigation mesh: the navigation graph of a zone together with its bounds and the obstacles
/// that were carved into it. Built once at load time and never mutated.
#[derive(Debug, Clone, Default)]
pub struct NavMesh {
    zone: String,
    bounds: Option<NavBounds>,
    graph: NavGraph,
    obstacles: Vec<Obstacle>,
}

impl NavMesh {
    /// Builds a navmesh from input geometry.
    ///
    /// The obstacles are carved out of the walkable triangles before the graph is built.
    /// The bounds span the whole trimesh, including triangles that are not walkable.
    pub fn build(
        zone: impl Into<String>,
        mut trimesh: TriMesh,
        obstacles: &[Obstacle],
    ) -> Result<Self, NavGraphBuildError> {
        let zone = zone.into();
        trimesh.validate()?;
        for obstacle in obstacles {
            let carved = trimesh.carve_obstacle(obstacle);
            if carved == 0 {
                tracing::debug!("Obstacle in zone {zone} does not cover any walkable triangle");
            }
        }
        let graph = NavGraph::build(&trimesh)?;
        Ok(Self {
            bounds: NavBounds::from_trimesh(&trimesh),
            zone,
            graph,
            obstacles: obstacles.to_vec(),
        })
    }

    /// A navmesh without any walkable area. Every path query on it falls back to a straight line.
    ///
    /// `bounds` may still be given so that endpoints are clamped into the zone.
    pub fn empty(zone: impl Into<String>, bounds: Option<NavBounds>) -> Self {
        Self {
            zone: zone.into(),
            bounds,
            ..Default::default()
        }
    }

    /// The identifier of the zone this navmesh belongs to.
    #[inline]
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// The bounds of the navmesh, or `None` if it was built from no geometry.
    #[inline]
    pub fn bounds(&self) -> Option<NavBounds> {
        self.bounds
    }

    /// The navigation graph.
    #[inline]
    pub fn graph(&self) -> &NavGraph {
        &self.graph
    }

    /// The obstacles carved into the navmesh.
    #[inline]
    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    /// The edges of every walkable triangle, for debug overlays.
    pub fn wireframe_edges(&self) -> Vec<[Vec3; 2]> {
        self.graph.edges().to_vec()
    }
}
