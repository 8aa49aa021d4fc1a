//! The path query service: shortest paths, walkability and bounds of a navmesh.
//!
//! No query of this module fails. When no route exists, [`PathQuery::find_path`] returns a
//! straight two-point path flagged with [`PathFlags::FALLBACK`], so an agent never gets stuck
//! waiting for a path.

use std::sync::Arc;

use glam::Vec3;

use crate::{GroupId, NavBounds, NavMesh, NodeIndex, Obstacle, QueryConfig, TriMesh};

bitflags::bitflags! {
    /// Describes how a [`NavPath`] was produced.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    pub struct PathFlags: u8 {
        /// No route was found; the path is a straight line between the endpoints.
        const FALLBACK = 1 << 0;
        /// The start lay outside the bounds and was clamped.
        const START_CLAMPED = 1 << 1;
        /// The end lay outside the bounds and was clamped.
        const END_CLAMPED = 1 << 2;
    }
}

/// An ordered sequence of waypoints from a start to a destination.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavPath {
    /// The waypoints. The first lies at the start, the last at the destination.
    pub waypoints: Vec<Vec3>,
    /// How the path was produced.
    pub flags: PathFlags,
}

impl NavPath {
    /// Whether the path is the straight-line fallback rather than a route through the graph.
    #[inline]
    pub fn is_fallback(&self) -> bool {
        self.flags.contains(PathFlags::FALLBACK)
    }

    /// Whether the path has no waypoints.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Number of waypoints.
    #[inline]
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// The final waypoint.
    #[inline]
    pub fn destination(&self) -> Option<Vec3> {
        self.waypoints.last().copied()
    }
}

/// Answers path and walkability queries against a shared [`NavMesh`].
#[derive(Debug, Clone)]
pub struct PathQuery {
    navmesh: Arc<NavMesh>,
    config: QueryConfig,
}

impl PathQuery {
    /// Creates a query service for a navmesh.
    pub fn new(navmesh: Arc<NavMesh>, config: QueryConfig) -> Self {
        Self { navmesh, config }
    }

    /// Builds the navmesh of a zone from raw geometry.
    ///
    /// Geometry that cannot be turned into a navigation graph is logged and results in a navmesh
    /// without walkable area, on which every path is a fallback.
    pub fn from_trimesh(
        zone: impl Into<String>,
        trimesh: TriMesh,
        obstacles: &[Obstacle],
        config: QueryConfig,
    ) -> Self {
        let zone = zone.into();
        let bounds = NavBounds::from_trimesh(&trimesh);
        let navmesh = match NavMesh::build(zone.clone(), trimesh, obstacles) {
            Ok(navmesh) => navmesh,
            Err(err) => {
                tracing::error!("Failed to build navmesh for zone {zone}: {err}");
                NavMesh::empty(zone, bounds)
            }
        };
        Self::new(Arc::new(navmesh), config)
    }

    /// The navmesh queried by this service.
    #[inline]
    pub fn navmesh(&self) -> &Arc<NavMesh> {
        &self.navmesh
    }

    /// The query parameters.
    #[inline]
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// The bounds of the navmesh.
    #[inline]
    pub fn bounds(&self) -> Option<NavBounds> {
        self.navmesh.bounds()
    }

    /// Whether the point lies inside the bounds on the xz-plane.
    pub fn is_in_bounds(&self, point: Vec3) -> bool {
        self.bounds().is_some_and(|bounds| bounds.contains_xz(point))
    }

    /// Clamps x and z of the point into the bounds shrunk by `margin`.
    /// Points are returned unchanged if the navmesh has no bounds.
    pub fn clamp_to_bounds(&self, point: Vec3, margin: f32) -> Vec3 {
        match self.bounds() {
            Some(bounds) => bounds.clamp_xz(point, margin),
            None => point,
        }
    }

    /// Whether an agent may stand at `point`.
    ///
    /// The point must lie in the bounds and either inside a walkable triangle or close to the
    /// centroid of one, see [`QueryConfig::walkable_tolerance`].
    pub fn is_point_walkable(&self, point: Vec3) -> bool {
        self.is_in_bounds(point) && self.group_of(point).is_some()
    }

    /// Whether the point lies inside a walkable triangle on the xz-plane.
    pub fn is_point_on_mesh(&self, point: Vec3) -> bool {
        self.navmesh.graph().containing_node(point).is_some()
    }

    /// Whether a route between the two points exists.
    pub fn is_reachable(&self, from: Vec3, to: Vec3) -> bool {
        match (self.group_of(from), self.group_of(to)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// The height of the walking surface at `point`, if the point lies on the mesh.
    pub fn surface_height(&self, point: Vec3) -> Option<f32> {
        self.navmesh.graph().surface_height(point)
    }

    /// Places a point at waypoint height above the walking surface below it.
    ///
    /// Points off the mesh take the height of the nearest node. Without any walkable area, the
    /// point keeps its height.
    pub fn elevate(&self, point: Vec3) -> Vec3 {
        let graph = self.navmesh.graph();
        let ground = graph.surface_height(point).or_else(|| {
            graph
                .nearest_node_any(point)
                .map(|node| graph.node(node).height_at(point))
        });
        match ground {
            Some(height) => point.with_y(height + self.config.waypoint_elevation),
            None => point,
        }
    }

    /// Finds a path from `start` to `end`. Never fails.
    ///
    /// Endpoints outside the bounds are clamped into them first. A start that lies off the mesh
    /// is snapped onto the group of the end, so agents that left the mesh can return.
    /// If no route exists, the two-point fallback path is returned.
    pub fn find_path(&self, start: Vec3, end: Vec3) -> NavPath {
        let mut flags = PathFlags::empty();
        let (start, start_clamped) = self.clamp_endpoint(start);
        let (end, end_clamped) = self.clamp_endpoint(end);
        flags.set(PathFlags::START_CLAMPED, start_clamped);
        flags.set(PathFlags::END_CLAMPED, end_clamped);

        let graph = self.navmesh.graph();
        let Some(end_group) = self.group_of(end) else {
            tracing::debug!("No walkable area near path end {end}, falling back to a straight line");
            return self.fallback(start, end, flags);
        };
        let start_group = self.group_of(start);
        if start_group.is_some_and(|group| group != end_group) {
            tracing::debug!("Path endpoints {start} and {end} lie on disconnected islands");
            return self.fallback(start, end, flags);
        }

        let (Some(start_node), Some(end_node)) = (
            self.node_in_group(start, end_group),
            self.node_in_group(end, end_group),
        ) else {
            return self.fallback(start, end, flags);
        };
        let Some(route) = graph.search(start_node, end_node) else {
            tracing::warn!("No route between nodes of the same group, falling back");
            return self.fallback(start, end, flags);
        };

        let elevation = self.config.waypoint_elevation;
        let mut waypoints = Vec::with_capacity(route.len().max(2));
        waypoints.push(start.with_y(graph.node(start_node).height_at(start) + elevation));
        if route.len() > 2 {
            waypoints.extend(
                route[1..route.len() - 1]
                    .iter()
                    .map(|&node| graph.node(node).centroid + Vec3::Y * elevation),
            );
        }
        waypoints.push(end.with_y(graph.node(end_node).height_at(end) + elevation));
        NavPath { waypoints, flags }
    }

    fn group_of(&self, point: Vec3) -> Option<GroupId> {
        self.navmesh
            .graph()
            .group_of(point, self.config.walkable_tolerance)
    }

    /// The node containing `point` if it belongs to `group`, else the nearest node of `group`.
    fn node_in_group(&self, point: Vec3, group: GroupId) -> Option<NodeIndex> {
        let graph = self.navmesh.graph();
        graph
            .containing_node(point)
            .filter(|&node| graph.node(node).group == group)
            .or_else(|| graph.nearest_node(point, group))
    }

    fn clamp_endpoint(&self, point: Vec3) -> (Vec3, bool) {
        match self.bounds() {
            Some(bounds) if !bounds.contains_xz(point) => {
                (bounds.clamp_xz(point, self.config.clamp_margin), true)
            }
            _ => (point, false),
        }
    }

    fn fallback(&self, start: Vec3, end: Vec3, flags: PathFlags) -> NavPath {
        NavPath {
            waypoints: vec![self.elevate(start), self.elevate(end)],
            flags: flags | PathFlags::FALLBACK,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::{UVec3, Vec3A};

    use super::*;

    /// Two 4x4 platforms separated by a gap along x.
    fn islands() -> TriMesh {
        let mut trimesh = TriMesh::default();
        for x in [-10.0, 6.0] {
            trimesh.extend(TriMesh::new(
                vec![
                    Vec3A::new(x, 0.0, -2.0),
                    Vec3A::new(x + 4.0, 0.0, -2.0),
                    Vec3A::new(x + 4.0, 0.0, 2.0),
                    Vec3A::new(x, 0.0, 2.0),
                ],
                vec![UVec3::new(0, 2, 1), UVec3::new(0, 3, 2)],
            ));
        }
        trimesh
    }

    fn query() -> PathQuery {
        PathQuery::from_trimesh("islands", islands(), &[], QueryConfig::default())
    }

    #[test]
    fn path_within_an_island_ends_at_the_destination() {
        let query = query();
        let path = query.find_path(Vec3::new(-9.5, 0.0, -1.5), Vec3::new(-6.5, 0.0, 1.5));
        assert!(!path.is_fallback());
        let first = path.waypoints[0];
        let last = path.destination().unwrap();
        assert_relative_eq!(first.x, -9.5);
        assert_relative_eq!(first.z, -1.5);
        assert_relative_eq!(last.x, -6.5);
        assert_relative_eq!(last.z, 1.5);
        assert_relative_eq!(last.y, 0.5);
    }

    #[test]
    fn path_across_islands_falls_back() {
        let query = query();
        let path = query.find_path(Vec3::new(-8.0, 0.0, 0.0), Vec3::new(8.0, 0.0, 0.0));
        assert!(path.is_fallback());
        assert_eq!(path.len(), 2);
        assert!(!query.is_reachable(Vec3::new(-8.0, 0.0, 0.0), Vec3::new(8.0, 0.0, 0.0)));
    }

    #[test]
    fn endpoints_outside_bounds_are_clamped() {
        let query = query();
        let path = query.find_path(Vec3::new(-8.0, 0.0, 0.0), Vec3::new(-50.0, 0.0, 0.0));
        assert!(path.flags.contains(PathFlags::END_CLAMPED));
        assert!(!path.flags.contains(PathFlags::START_CLAMPED));
        // Bounds span x in [-10, 10], the margin is 2.
        assert_relative_eq!(path.destination().unwrap().x, -8.0);
    }

    #[test]
    fn walkability_respects_tolerance() {
        let query = query();
        assert!(query.is_point_walkable(Vec3::new(-8.0, 0.0, 0.0)));
        assert!(query.is_point_on_mesh(Vec3::new(-8.0, 0.0, 0.0)));
        // In the gap, but within tolerance of a node.
        assert!(query.is_point_walkable(Vec3::new(-5.0, 0.0, 0.0)));
        assert!(!query.is_point_on_mesh(Vec3::new(-5.0, 0.0, 0.0)));
        assert!(!query.is_point_walkable(Vec3::new(-40.0, 0.0, 0.0)));
    }

    #[test]
    fn broken_geometry_degrades_to_fallback_paths() {
        let mut trimesh = islands();
        trimesh.indices.push(UVec3::new(0, 1, 99));
        trimesh
            .area_types
            .push(crate::AreaType::DEFAULT_WALKABLE);
        let query = PathQuery::from_trimesh("broken", trimesh, &[], QueryConfig::default());
        assert!(query.navmesh().graph().is_empty());
        assert!(query.bounds().is_some());
        let path = query.find_path(Vec3::new(-8.0, 0.0, 0.0), Vec3::new(-7.0, 0.0, 0.0));
        assert!(path.is_fallback());
        assert!(!query.is_point_walkable(Vec3::new(-8.0, 0.0, 0.0)));
    }

    #[test]
    fn elevate_without_ground_keeps_height() {
        let query = PathQuery::new(Arc::new(NavMesh::empty("void", None)), QueryConfig::default());
        let point = Vec3::new(1.0, 3.0, 1.0);
        assert_eq!(query.elevate(point), point);
        let path = query.find_path(Vec3::ZERO, point);
        assert_eq!(path.waypoints, vec![Vec3::ZERO, point]);
        assert!(path.is_fallback());
    }
}
