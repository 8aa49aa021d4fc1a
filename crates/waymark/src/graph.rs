//! The navigation graph: walkable triangles linked through shared edges and grouped into
//! connected islands.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BinaryHeap},
};

use glam::{UVec3, Vec2, Vec3, Vec3A, Vec3Swizzles as _};
use thiserror::Error;

use crate::{
    TriMesh, TriMeshError,
    math::{
        Aabb3d, DEGENERATE_AREA, TriangleIndices as _, TriangleVertices as _, barycentric_inside,
    },
};

/// Index of a [`NavNode`] inside a [`NavGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of a group, i.e. a maximal set of nodes connected through shared edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct GroupId(pub u32);

/// A walkable triangle of the navigation graph.
#[derive(Debug, Clone, PartialEq)]
pub struct NavNode {
    /// The corners of the triangle.
    pub vertices: [Vec3; 3],
    /// The centroid of the triangle. Used as the representative point of the node.
    pub centroid: Vec3,
    /// Nodes sharing an edge with this one.
    pub neighbors: Vec<NodeIndex>,
    /// The group this node belongs to.
    pub group: GroupId,
    aabb: Aabb3d,
}

impl NavNode {
    fn triangle(&self) -> [Vec3A; 3] {
        self.vertices.map(Vec3A::from)
    }

    /// Whether the point lies inside the triangle on the xz-plane, edges included.
    pub fn contains_xz(&self, point: Vec3) -> bool {
        self.triangle()
            .barycentric_xz(point.xz())
            .is_some_and(barycentric_inside)
    }

    /// The height of the triangle's plane below or above `point`.
    pub fn height_at(&self, point: Vec3) -> f32 {
        match self.triangle().barycentric_xz(point.xz()) {
            Some(weights) => {
                weights.dot(Vec3::new(
                    self.vertices[0].y,
                    self.vertices[1].y,
                    self.vertices[2].y,
                ))
            }
            None => self.centroid.y,
        }
    }
}

/// A polygon-adjacency graph built once from walkable geometry. Immutable after construction.
#[derive(Debug, Clone, Default)]
pub struct NavGraph {
    nodes: Vec<NavNode>,
    groups: Vec<Vec<NodeIndex>>,
    edges: Vec<[Vec3; 2]>,
    grid: CellGrid,
}

impl NavGraph {
    /// Builds the graph from the walkable triangles of `trimesh`.
    ///
    /// Triangles that are degenerate on the xz-plane are skipped.
    pub fn build(trimesh: &TriMesh) -> Result<Self, NavGraphBuildError> {
        trimesh.validate()?;
        if trimesh.indices.is_empty() {
            return Err(NavGraphBuildError::EmptyMesh);
        }

        let mut nodes = Vec::new();
        let mut node_indices: Vec<UVec3> = Vec::new();
        let mut degenerate = 0;
        for (indices, area) in trimesh.indices.iter().zip(&trimesh.area_types) {
            if !area.is_walkable() {
                continue;
            }
            let triangle = indices.vertices(&trimesh.vertices);
            if triangle.signed_area_xz().abs() <= DEGENERATE_AREA {
                degenerate += 1;
                continue;
            }
            nodes.push(NavNode {
                vertices: triangle.map(Vec3::from),
                centroid: triangle.centroid().into(),
                neighbors: Vec::new(),
                group: GroupId(u32::MAX),
                aabb: triangle.aabb(),
            });
            node_indices.push(*indices);
        }
        if degenerate > 0 {
            tracing::debug!("Skipped {degenerate} degenerate triangles while building the graph");
        }
        if nodes.is_empty() {
            return Err(NavGraphBuildError::NoWalkableTriangles);
        }

        // Link nodes sharing an edge. Non-manifold edges link every node sharing them.
        let mut edge_map: BTreeMap<(u32, u32), Vec<NodeIndex>> = BTreeMap::new();
        for (node, indices) in node_indices.iter().enumerate() {
            for corner in 0..3 {
                let a = indices[corner];
                let b = indices[(corner + 1) % 3];
                let edge = if a < b { (a, b) } else { (b, a) };
                edge_map
                    .entry(edge)
                    .or_default()
                    .push(NodeIndex(node as u32));
            }
        }
        let mut edges = Vec::with_capacity(edge_map.len());
        for (&(a, b), shared) in &edge_map {
            edges.push([
                trimesh.vertices[a as usize].into(),
                trimesh.vertices[b as usize].into(),
            ]);
            for (i, &first) in shared.iter().enumerate() {
                for &second in &shared[i + 1..] {
                    if first == second || nodes[first.index()].neighbors.contains(&second) {
                        continue;
                    }
                    nodes[first.index()].neighbors.push(second);
                    nodes[second.index()].neighbors.push(first);
                }
            }
        }

        let groups = flood_fill_groups(&mut nodes);
        let grid = CellGrid::build(&nodes);
        tracing::debug!(
            "Built navigation graph with {} nodes in {} groups",
            nodes.len(),
            groups.len()
        );
        Ok(Self {
            nodes,
            groups,
            edges,
            grid,
        })
    }

    /// Whether the graph has no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes of the graph.
    #[inline]
    pub fn nodes(&self) -> &[NavNode] {
        &self.nodes
    }

    /// The node at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the index does not belong to this graph.
    #[inline]
    pub fn node(&self, index: NodeIndex) -> &NavNode {
        &self.nodes[index.index()]
    }

    /// Number of connected groups.
    #[inline]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// The nodes belonging to `group`. Empty for unknown groups.
    pub fn group_nodes(&self, group: GroupId) -> &[NodeIndex] {
        self.groups
            .get(group.0 as usize)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Unique triangle edges, for wireframe overlays.
    #[inline]
    pub fn edges(&self) -> &[[Vec3; 2]] {
        &self.edges
    }

    /// The node containing `point` on the xz-plane.
    /// When several nodes overlap (e.g. stacked floors), the one closest in height wins.
    pub fn containing_node(&self, point: Vec3) -> Option<NodeIndex> {
        self.grid
            .candidates(point.xz())
            .iter()
            .copied()
            .filter(|&index| self.node(index).contains_xz(point))
            .min_by(|&a, &b| {
                let da = (self.node(a).height_at(point) - point.y).abs();
                let db = (self.node(b).height_at(point) - point.y).abs();
                da.total_cmp(&db)
            })
    }

    /// The node whose centroid is closest to `point`, regardless of group.
    pub fn nearest_node_any(&self, point: Vec3) -> Option<NodeIndex> {
        nearest_of(
            &self.nodes,
            (0..self.nodes.len() as u32).map(NodeIndex),
            point,
        )
    }

    /// The node whose centroid is closest to `point`, restricted to `group`.
    ///
    /// The restriction matters: a global search may return a node on a disconnected island.
    pub fn nearest_node(&self, point: Vec3, group: GroupId) -> Option<NodeIndex> {
        nearest_of(
            &self.nodes,
            self.group_nodes(group).iter().copied(),
            point,
        )
    }

    /// The group `point` belongs to: the group of the containing node, or else the group of the
    /// nearest node if its centroid is within `tolerance`.
    pub fn group_of(&self, point: Vec3, tolerance: f32) -> Option<GroupId> {
        if let Some(node) = self.containing_node(point) {
            return Some(self.node(node).group);
        }
        let nearest = self.nearest_node_any(point)?;
        let node = self.node(nearest);
        (node.centroid.distance(point) <= tolerance).then_some(node.group)
    }

    /// The height of the walking surface at `point`, if a node contains it.
    pub fn surface_height(&self, point: Vec3) -> Option<f32> {
        self.containing_node(point)
            .map(|node| self.node(node).height_at(point))
    }

    /// Finds the shortest node sequence from `start` to `goal` with A* over centroid distances.
    ///
    /// Returns `None` if the nodes are not connected. The sequence includes both ends.
    pub fn search(&self, start: NodeIndex, goal: NodeIndex) -> Option<Vec<NodeIndex>> {
        if start.index() >= self.nodes.len() || goal.index() >= self.nodes.len() {
            return None;
        }
        if self.node(start).group != self.node(goal).group {
            return None;
        }
        if start == goal {
            return Some(vec![start]);
        }

        let goal_centroid = self.node(goal).centroid;
        let heuristic = |index: NodeIndex| self.node(index).centroid.distance(goal_centroid);

        let mut open = BinaryHeap::new();
        let mut came_from: Vec<Option<NodeIndex>> = vec![None; self.nodes.len()];
        let mut g_score = vec![f32::INFINITY; self.nodes.len()];
        let mut closed = vec![false; self.nodes.len()];

        g_score[start.index()] = 0.0;
        open.push(OpenNode {
            f_cost: heuristic(start),
            node: start,
        });

        while let Some(OpenNode { node: current, .. }) = open.pop() {
            if current == goal {
                let mut route = vec![goal];
                let mut cursor = goal;
                while let Some(previous) = came_from[cursor.index()] {
                    route.push(previous);
                    cursor = previous;
                }
                route.reverse();
                return Some(route);
            }
            if closed[current.index()] {
                continue;
            }
            closed[current.index()] = true;

            let current_node = self.node(current);
            for &neighbor in &current_node.neighbors {
                if closed[neighbor.index()] {
                    continue;
                }
                let tentative = g_score[current.index()]
                    + current_node
                        .centroid
                        .distance(self.node(neighbor).centroid);
                if tentative < g_score[neighbor.index()] {
                    came_from[neighbor.index()] = Some(current);
                    g_score[neighbor.index()] = tentative;
                    open.push(OpenNode {
                        f_cost: tentative + heuristic(neighbor),
                        node: neighbor,
                    });
                }
            }
        }
        None
    }
}

/// Errors that can occur when building a [`NavGraph`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NavGraphBuildError {
    /// The mesh has no triangles at all.
    #[error("Trimesh is empty")]
    EmptyMesh,
    /// The mesh has triangles, but none of them is walkable.
    #[error("Trimesh has no walkable, non-degenerate triangles")]
    NoWalkableTriangles,
    /// The mesh is malformed.
    #[error("Invalid trimesh: {0}")]
    InvalidTriMesh(#[from] TriMeshError),
}

fn nearest_of(
    nodes: &[NavNode],
    candidates: impl Iterator<Item = NodeIndex>,
    point: Vec3,
) -> Option<NodeIndex> {
    candidates.min_by(|&a, &b| {
        let da = nodes[a.index()].centroid.distance_squared(point);
        let db = nodes[b.index()].centroid.distance_squared(point);
        da.total_cmp(&db)
    })
}

fn flood_fill_groups(nodes: &mut [NavNode]) -> Vec<Vec<NodeIndex>> {
    let mut groups = Vec::new();
    let mut assigned = vec![false; nodes.len()];
    for seed in 0..nodes.len() {
        if assigned[seed] {
            continue;
        }
        let group = GroupId(groups.len() as u32);
        let mut members = Vec::new();
        let mut stack = vec![NodeIndex(seed as u32)];
        assigned[seed] = true;
        while let Some(current) = stack.pop() {
            members.push(current);
            let node = &mut nodes[current.index()];
            node.group = group;
            for &neighbor in &node.neighbors {
                if !assigned[neighbor.index()] {
                    assigned[neighbor.index()] = true;
                    stack.push(neighbor);
                }
            }
        }
        members.sort_unstable();
        groups.push(members);
    }
    groups
}

#[derive(Debug, Clone, Copy)]
struct OpenNode {
    f_cost: f32,
    node: NodeIndex,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenNode {}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed, so the binary heap pops the lowest cost first.
        other
            .f_cost
            .total_cmp(&self.f_cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Uniform grid over the xz-footprint of the nodes, used to narrow down containment queries.
#[derive(Debug, Clone, Default)]
struct CellGrid {
    origin: Vec2,
    cell_size: f32,
    width: usize,
    height: usize,
    cells: Vec<Vec<NodeIndex>>,
}

impl CellGrid {
    const MAX_CELLS_PER_AXIS: f32 = 256.0;
    const MIN_CELL_SIZE: f32 = 0.01;

    fn build(nodes: &[NavNode]) -> Self {
        let Some(aabb) = nodes
            .iter()
            .map(|node| node.aabb)
            .reduce(|a, b| Aabb3d {
                min: a.min.min(b.min),
                max: a.max.max(b.max),
            })
        else {
            return Self::default();
        };
        let origin = aabb.min.xz();
        let extent = aabb.size().xz();
        let per_axis = (nodes.len() as f32)
            .sqrt()
            .ceil()
            .clamp(1.0, Self::MAX_CELLS_PER_AXIS);
        let cell_size = (extent.max_element() / per_axis).max(Self::MIN_CELL_SIZE);
        let width = (extent.x / cell_size).floor() as usize + 1;
        let height = (extent.y / cell_size).floor() as usize + 1;

        let mut grid = Self {
            origin,
            cell_size,
            width,
            height,
            cells: vec![Vec::new(); width * height],
        };
        for (index, node) in nodes.iter().enumerate() {
            let (min_x, min_z) = grid.cell_coords(node.aabb.min.xz());
            let (max_x, max_z) = grid.cell_coords(node.aabb.max.xz());
            for z in min_z..=max_z {
                for x in min_x..=max_x {
                    grid.cells[x + z * width].push(NodeIndex(index as u32));
                }
            }
        }
        grid
    }

    /// Cell coordinates of `point`, clamped to the grid.
    fn cell_coords(&self, point: Vec2) -> (usize, usize) {
        let local = ((point - self.origin) / self.cell_size).floor();
        let x = (local.x.max(0.0) as usize).min(self.width - 1);
        let z = (local.y.max(0.0) as usize).min(self.height - 1);
        (x, z)
    }

    fn candidates(&self, point: Vec2) -> &[NodeIndex] {
        if self.cells.is_empty() {
            return &[];
        }
        let local = (point - self.origin) / self.cell_size;
        if local.x < 0.0 || local.y < 0.0 {
            return &[];
        }
        let (x, z) = (local.x as usize, local.y as usize);
        if x >= self.width || z >= self.height {
            return &[];
        }
        &self.cells[x + z * self.width]
    }
}
