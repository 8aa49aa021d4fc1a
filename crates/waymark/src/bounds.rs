//! Axis-aligned bounds of a navmesh, used for cheap rejection and for clamping query endpoints.

use glam::{Vec3, Vec3A};

use crate::{TriMesh, math::Aabb3d};

/// The bounds of a navmesh. Computed once when the navmesh is loaded.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavBounds {
    /// The minimum corner.
    pub min: Vec3,
    /// The maximum corner.
    pub max: Vec3,
    /// The center of the bounds.
    pub center: Vec3,
    /// The full extents of the bounds.
    pub size: Vec3,
}

impl From<Aabb3d> for NavBounds {
    fn from(aabb: Aabb3d) -> Self {
        Self {
            min: aabb.min.into(),
            max: aabb.max.into(),
            center: aabb.center().into(),
            size: aabb.size().into(),
        }
    }
}

impl NavBounds {
    /// Computes the bounds of the whole trimesh, or `None` if it has no vertices.
    pub fn from_trimesh(trimesh: &TriMesh) -> Option<Self> {
        trimesh.compute_aabb().map(Self::from)
    }

    /// Whether the point lies within the bounds on the xz-plane. The height is ignored.
    #[inline]
    pub fn contains_xz(&self, point: Vec3) -> bool {
        Aabb3d {
            min: self.min.into(),
            max: self.max.into(),
        }
        .contains_xz(Vec3A::from(point))
    }

    /// Clamps x and z of `point` into `[min + margin, max - margin]`. The height is kept.
    ///
    /// If the bounds are narrower than twice the margin on an axis, that axis is clamped to the center.
    /// A negative margin grows the bounds instead.
    pub fn clamp_xz(&self, point: Vec3, margin: f32) -> Vec3 {
        let clamp_axis = |value: f32, min: f32, max: f32, center: f32| {
            let lo = min + margin;
            let hi = max - margin;
            if lo > hi { center } else { value.clamp(lo, hi) }
        };
        Vec3::new(
            clamp_axis(point.x, self.min.x, self.max.x, self.center.x),
            point.y,
            clamp_axis(point.z, self.min.z, self.max.z, self.center.z),
        )
    }
}
