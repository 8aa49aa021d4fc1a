//! Input geometry for navmesh construction, expressed as [`TriMesh`]es.

use std::collections::HashMap;

use glam::{IVec3, UVec3, Vec3A};
use thiserror::Error;

use crate::{
    math::{Aabb3d, TriangleIndices as _, TriangleVertices as _},
    obstacle::Obstacle,
};

/// The area type of a triangle. Only walkable triangles take part in the navigation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct AreaType(pub u8);

impl From<u8> for AreaType {
    fn from(value: u8) -> Self {
        AreaType(value)
    }
}

impl Default for AreaType {
    fn default() -> Self {
        Self::DEFAULT_WALKABLE
    }
}

impl AreaType {
    /// Triangles with this area type are not walkable.
    pub const NOT_WALKABLE: Self = Self(0);
    /// Default area type for walkable triangles.
    pub const DEFAULT_WALKABLE: Self = Self(63);

    /// Whether the area is walkable.
    #[inline]
    pub fn is_walkable(self) -> bool {
        self != Self::NOT_WALKABLE
    }
}

/// A mesh used as input for the navigation graph.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TriMesh {
    /// The vertices composing the mesh.
    /// Follows the convention of a triangle list.
    pub vertices: Vec<Vec3A>,

    /// The indices composing the mesh.
    /// Follows the convention of a triangle list.
    pub indices: Vec<UVec3>,

    /// The area types of the trimesh. Each index corresponds 1:1 to the [`TriMesh::indices`].
    pub area_types: Vec<AreaType>,
}

impl TriMesh {
    /// Creates a trimesh from indexed geometry. Every triangle starts out walkable.
    pub fn new(vertices: Vec<Vec3A>, indices: Vec<UVec3>) -> Self {
        let area_types = vec![AreaType::DEFAULT_WALKABLE; indices.len()];
        Self {
            vertices,
            indices,
            area_types,
        }
    }

    /// Creates a trimesh from a triangle soup, i.e. three positions per triangle and no indices.
    ///
    /// Positions closer than `weld_epsilon` are merged into a single vertex, so that triangles
    /// which only share positions also share edges. Trailing positions that do not form a full
    /// triangle are ignored.
    pub fn from_triangle_soup(positions: &[[f32; 3]], weld_epsilon: f32) -> Self {
        let cell = weld_epsilon.max(f32::EPSILON);
        // Cells are `weld_epsilon` wide, so every weld partner lies in a neighboring cell.
        let mut cells: HashMap<IVec3, Vec<u32>> = HashMap::new();
        let mut vertices: Vec<Vec3A> = Vec::new();
        let mut index_of = |position: [f32; 3]| -> u32 {
            let position = Vec3A::from(position);
            let key = (position / cell).floor().as_ivec3();
            let existing = (-1..=1)
                .flat_map(|x| {
                    (-1..=1).flat_map(move |y| (-1..=1).map(move |z| IVec3::new(x, y, z)))
                })
                .filter_map(|offset| cells.get(&(key + offset)))
                .flatten()
                .copied()
                .find(|&index| vertices[index as usize].distance(position) <= weld_epsilon);
            existing.unwrap_or_else(|| {
                vertices.push(position);
                let index = (vertices.len() - 1) as u32;
                cells.entry(key).or_default().push(index);
                index
            })
        };

        let indices = positions
            .chunks_exact(3)
            .map(|triangle| {
                UVec3::new(
                    index_of(triangle[0]),
                    index_of(triangle[1]),
                    index_of(triangle[2]),
                )
            })
            .collect();
        Self::new(vertices, indices)
    }

    /// Extends the trimesh with the vertices and indices of another trimesh.
    /// The indices of `other` will be offset by the number of vertices in `self`.
    pub fn extend(&mut self, other: TriMesh) {
        if self.vertices.len() > u32::MAX as usize {
            panic!("Cannot extend a trimesh with more than 2^32 vertices");
        }
        let next_vertex_index = self.vertices.len() as u32;
        self.vertices.extend(other.vertices);
        self.indices
            .extend(other.indices.iter().map(|i| i + next_vertex_index));
        self.area_types.extend(other.area_types);
    }

    /// Computes the AABB of the trimesh.
    /// Returns `None` if the trimesh is empty.
    pub fn compute_aabb(&self) -> Option<Aabb3d> {
        Aabb3d::from_verts(&self.vertices)
    }

    /// Checks that every index points at an existing vertex and that every triangle has an area type.
    pub fn validate(&self) -> Result<(), TriMeshError> {
        if self.area_types.len() != self.indices.len() {
            return Err(TriMeshError::AreaTypeCountMismatch {
                triangles: self.indices.len(),
                area_types: self.area_types.len(),
            });
        }
        let vertex_count = self.vertices.len();
        for (triangle, indices) in self.indices.iter().enumerate() {
            if let Some(&index) = indices
                .to_array()
                .iter()
                .find(|&&index| index as usize >= vertex_count)
            {
                return Err(TriMeshError::IndexOutOfBounds {
                    triangle,
                    index,
                    vertex_count,
                });
            }
        }
        Ok(())
    }

    /// Marks triangles steeper than `max_slope_rad` as not walkable.
    ///
    /// The slope is measured against the up axis (+Y). The winding of the triangles does not
    /// matter, so meshes exported with flipped normals are handled the same way.
    pub fn mark_walkable_triangles(&mut self, max_slope_rad: f32) {
        let threshold_cos = max_slope_rad.cos();
        for (i, indices) in self.indices.iter().enumerate() {
            let normal = indices.normal(&self.vertices);
            if normal.y.abs() < threshold_cos {
                self.area_types[i] = AreaType::NOT_WALKABLE;
            }
        }
    }

    /// Marks every walkable triangle covered by the obstacle as not walkable.
    /// Returns the number of triangles that were carved.
    pub fn carve_obstacle(&mut self, obstacle: &Obstacle) -> usize {
        let Some(footprint) = obstacle.aabb() else {
            // The obstacle has no footprint
            return 0;
        };
        let mut carved = 0;
        for (i, indices) in self.indices.iter().enumerate() {
            if !self.area_types[i].is_walkable() {
                continue;
            }
            let triangle = indices.vertices(&self.vertices);
            if !triangle.aabb().intersects_xz(&footprint) {
                continue;
            }
            let covered = obstacle.contains(triangle.centroid())
                || triangle.iter().all(|vertex| obstacle.contains(*vertex));
            if covered {
                self.area_types[i] = AreaType::NOT_WALKABLE;
                carved += 1;
            }
        }
        carved
    }

    /// Number of triangles that are currently walkable.
    pub fn walkable_triangle_count(&self) -> usize {
        self.area_types
            .iter()
            .filter(|area| area.is_walkable())
            .count()
    }
}

/// Errors for malformed [`TriMesh`]es, reported by [`TriMesh::validate`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriMeshError {
    /// A triangle references a vertex that does not exist.
    #[error(
        "triangle {triangle} references vertex {index}, but the mesh only has {vertex_count} vertices"
    )]
    IndexOutOfBounds {
        /// The index of the offending triangle
        triangle: usize,
        /// The vertex index that is out of bounds
        index: u32,
        /// The number of vertices in the mesh
        vertex_count: usize,
    },
    /// The number of area types differs from the number of triangles.
    #[error("mesh has {triangles} triangles but {area_types} area types")]
    AreaTypeCountMismatch {
        /// The number of triangles
        triangles: usize,
        /// The number of area types
        area_types: usize,
    },
}
