use glam::{Vec2, Vec3, Vec3A, Vec3Swizzles as _};

use crate::math::Aabb3d;

/// A static region that agents must not walk through.
///
/// The footprint is a polygon on the xz-plane, extruded between `min_y` and `max_y`.
/// Obstacles are carved out of the walkable triangles before the navigation graph is built,
/// see [`TriMesh::carve_obstacle`](crate::TriMesh::carve_obstacle).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Obstacle {
    /// The footprint of the obstacle on the xz-plane. `x` maps to world x, `y` maps to world z.
    pub footprint: Vec<Vec2>,
    /// The lowest point of the obstacle.
    pub min_y: f32,
    /// The highest point of the obstacle.
    pub max_y: f32,
}

impl Obstacle {
    /// Creates an obstacle from an xz footprint and a vertical extent.
    pub fn from_footprint(footprint: Vec<Vec2>, min_y: f32, max_y: f32) -> Self {
        Self {
            footprint,
            min_y,
            max_y,
        }
    }

    /// Creates a box-shaped obstacle, e.g. from the bounds of a scene object flagged as an obstacle.
    pub fn from_box(center: Vec3, half_extents: Vec3) -> Self {
        let min = center - half_extents;
        let max = center + half_extents;
        Self {
            footprint: vec![
                Vec2::new(min.x, min.z),
                Vec2::new(max.x, min.z),
                Vec2::new(max.x, max.z),
                Vec2::new(min.x, max.z),
            ],
            min_y: min.y,
            max_y: max.y,
        }
    }

    /// The bounding box of the obstacle, or `None` if the footprint is empty.
    pub fn aabb(&self) -> Option<Aabb3d> {
        let vertices = self
            .footprint
            .iter()
            .map(|v| Vec3A::new(v.x, 0.0, v.y))
            .collect::<Vec<_>>();
        let mut aabb = Aabb3d::from_verts(&vertices)?;
        aabb.min.y = self.min_y;
        aabb.max.y = self.max_y;
        Some(aabb)
    }

    /// Whether the point lies inside the obstacle.
    pub fn contains(&self, point: Vec3A) -> bool {
        if point.y < self.min_y || point.y > self.max_y || self.footprint.len() < 3 {
            return false;
        }
        point_in_poly(point.xz(), &self.footprint)
    }
}

fn point_in_poly(point: Vec2, vertices: &[Vec2]) -> bool {
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (xi, yi) = (vertices[i].x, vertices[i].y);
        let (xj, yj) = (vertices[j].x, vertices[j].y);
        if ((yi > point.y) != (yj > point.y))
            && (point.x < (xj - xi) * (point.y - yi) / (yj - yi) + xi)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_obstacle_contains_its_center() {
        let obstacle = Obstacle::from_box(Vec3::new(2.0, 1.0, -3.0), Vec3::new(1.0, 1.0, 0.5));
        assert!(obstacle.contains(Vec3A::new(2.0, 0.5, -3.0)));
        assert!(!obstacle.contains(Vec3A::new(3.5, 0.5, -3.0)));
        // Above the obstacle
        assert!(!obstacle.contains(Vec3A::new(2.0, 2.5, -3.0)));
    }

    #[test]
    fn aabb_spans_footprint_and_height() {
        let obstacle = Obstacle::from_box(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0));
        let aabb = obstacle.aabb().unwrap();
        assert_eq!(aabb.min, Vec3A::new(-1.0, -2.0, -3.0));
        assert_eq!(aabb.max, Vec3A::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn empty_footprint_contains_nothing() {
        let obstacle = Obstacle::from_footprint(Vec::new(), 0.0, 1.0);
        assert_eq!(obstacle.aabb(), None);
        assert!(!obstacle.contains(Vec3A::ZERO));
    }
}
