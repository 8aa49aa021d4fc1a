use std::f32::consts::{PI, TAU};

use glam::{UVec3, Vec2, Vec3, Vec3A, Vec3Swizzles as _};

/// An axis-aligned bounding box in 3D.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb3d {
    /// The minimum corner of the box.
    pub min: Vec3A,
    /// The maximum corner of the box.
    pub max: Vec3A,
}

impl Aabb3d {
    /// Creates a new AABB from a center and half extents.
    #[inline]
    pub fn new(center: impl Into<Vec3A>, half_size: impl Into<Vec3A>) -> Self {
        let center = center.into();
        let half_size = half_size.into();
        Self {
            min: center - half_size,
            max: center + half_size,
        }
    }

    /// Computes the smallest AABB containing all `verts`.
    /// Returns `None` if `verts` is empty.
    pub fn from_verts(verts: &[Vec3A]) -> Option<Self> {
        let (first, rest) = verts.split_first()?;
        let (min, max) = rest
            .iter()
            .fold((*first, *first), |(min, max), v| (min.min(*v), max.max(*v)));
        Some(Self { min, max })
    }

    /// The center of the box.
    #[inline]
    pub fn center(&self) -> Vec3A {
        (self.min + self.max) * 0.5
    }

    /// The full extents of the box.
    #[inline]
    pub fn size(&self) -> Vec3A {
        self.max - self.min
    }

    /// Whether the point lies inside the box on the xz-plane. Bounds are inclusive.
    #[inline]
    pub fn contains_xz(&self, point: Vec3A) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Whether the two boxes overlap on the xz-plane.
    #[inline]
    pub fn intersects_xz(&self, other: &Aabb3d) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }
}

pub(crate) trait TriangleIndices {
    fn normal(&self, vertices: &[Vec3A]) -> Vec3A;
    fn vertices(&self, vertices: &[Vec3A]) -> [Vec3A; 3];
}

impl TriangleIndices for UVec3 {
    #[inline]
    fn normal(&self, vertices: &[Vec3A]) -> Vec3A {
        let [a, b, c] = self.vertices(vertices);
        let ab = b - a;
        let ac = c - a;
        ab.cross(ac).normalize_or_zero()
    }

    #[inline]
    fn vertices(&self, vertices: &[Vec3A]) -> [Vec3A; 3] {
        [
            vertices[self[0] as usize],
            vertices[self[1] as usize],
            vertices[self[2] as usize],
        ]
    }
}

pub(crate) trait TriangleVertices {
    fn aabb(&self) -> Aabb3d;
    fn centroid(&self) -> Vec3A;
    /// Signed area of the triangle projected onto the xz-plane.
    fn signed_area_xz(&self) -> f32;
    /// Barycentric weights of `point` projected onto the xz-plane.
    /// `None` for triangles that are degenerate in xz.
    fn barycentric_xz(&self, point: Vec2) -> Option<Vec3>;
}

impl TriangleVertices for [Vec3A; 3] {
    #[inline]
    fn aabb(&self) -> Aabb3d {
        let min = self[0].min(self[1]).min(self[2]);
        let max = self[0].max(self[1]).max(self[2]);
        Aabb3d { min, max }
    }

    #[inline]
    fn centroid(&self) -> Vec3A {
        (self[0] + self[1] + self[2]) / 3.0
    }

    #[inline]
    fn signed_area_xz(&self) -> f32 {
        let ab = self[1].xz() - self[0].xz();
        let ac = self[2].xz() - self[0].xz();
        ab.perp_dot(ac) * 0.5
    }

    fn barycentric_xz(&self, point: Vec2) -> Option<Vec3> {
        let area = self.signed_area_xz();
        if area.abs() <= DEGENERATE_AREA {
            return None;
        }
        let [a, b, c] = [self[0].xz(), self[1].xz(), self[2].xz()];
        let wa = (b - point).perp_dot(c - point) * 0.5 / area;
        let wb = (c - point).perp_dot(a - point) * 0.5 / area;
        Some(Vec3::new(wa, wb, 1.0 - wa - wb))
    }
}

/// Triangles with a smaller projected area are treated as degenerate.
pub(crate) const DEGENERATE_AREA: f32 = 1.0e-6;

/// Tolerance used for inclusive point-in-triangle tests.
pub(crate) const CONTAINMENT_EPSILON: f32 = 1.0e-4;

/// Whether all barycentric weights are inside the triangle, edges included.
#[inline]
pub(crate) fn barycentric_inside(weights: Vec3) -> bool {
    weights.min_element() >= -CONTAINMENT_EPSILON
}

/// Wraps an angle in radians into `[-PI, PI]`.
#[inline]
pub fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    // `rem_euclid` maps PI to -PI; both are valid, prefer the input's sign.
    if wrapped == -PI && angle > 0.0 {
        PI
    } else {
        wrapped
    }
}

/// Moves `current` toward `target` by `fraction` along the shortest arc.
#[inline]
pub fn approach_angle(current: f32, target: f32, fraction: f32) -> f32 {
    let delta = wrap_angle(target - current);
    wrap_angle(current + delta * fraction)
}

/// The yaw that faces along `direction` on the xz-plane, measured from +Z toward +X.
#[inline]
pub fn yaw_from_direction(direction: Vec3) -> f32 {
    direction.x.atan2(direction.z)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn aabb_from_verts_contains_all_verts() {
        let verts = [
            Vec3A::new(1.0, 0.0, -2.0),
            Vec3A::new(-3.0, 1.0, 4.0),
            Vec3A::new(0.5, -1.0, 0.0),
        ];
        let aabb = Aabb3d::from_verts(&verts).unwrap();
        assert_eq!(aabb.min, Vec3A::new(-3.0, -1.0, -2.0));
        assert_eq!(aabb.max, Vec3A::new(1.0, 1.0, 4.0));
        assert_eq!(aabb.center(), Vec3A::new(-1.0, 0.0, 1.0));
        assert_eq!(aabb.size(), Vec3A::new(4.0, 2.0, 6.0));
    }

    #[test]
    fn aabb_from_no_verts_is_none() {
        assert_eq!(Aabb3d::from_verts(&[]), None);
    }

    #[test]
    fn contains_xz_ignores_height() {
        let aabb = Aabb3d::new(Vec3A::ZERO, [1.0, 1.0, 1.0]);
        assert!(aabb.contains_xz(Vec3A::new(0.5, 100.0, -0.5)));
        assert!(aabb.contains_xz(Vec3A::new(1.0, 0.0, 1.0)));
        assert!(!aabb.contains_xz(Vec3A::new(1.1, 0.0, 0.0)));
    }

    #[test]
    fn barycentric_weights_sum_to_one() {
        let triangle = [
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(2.0, 0.0, 0.0),
            Vec3A::new(0.0, 0.0, 2.0),
        ];
        let weights = triangle.barycentric_xz(Vec2::new(0.5, 0.5)).unwrap();
        assert_relative_eq!(weights.x + weights.y + weights.z, 1.0);
        assert!(barycentric_inside(weights));

        let outside = triangle.barycentric_xz(Vec2::new(2.0, 2.0)).unwrap();
        assert!(!barycentric_inside(outside));
    }

    #[test]
    fn vertical_triangle_is_degenerate() {
        let triangle = [
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(1.0, 0.0, 0.0),
            Vec3A::new(1.0, 1.0, 0.0),
        ];
        assert_eq!(triangle.barycentric_xz(Vec2::ZERO), None);
    }

    #[test]
    fn wrap_angle_stays_in_range() {
        for angle in [-10.0_f32, -PI, -1.0, 0.0, 1.0, PI, 7.0, 100.0] {
            let wrapped = wrap_angle(angle);
            assert!((-PI..=PI).contains(&wrapped), "{angle} -> {wrapped}");
            assert_relative_eq!(wrapped.sin(), angle.sin(), epsilon = 1e-4);
            assert_relative_eq!(wrapped.cos(), angle.cos(), epsilon = 1e-4);
        }
    }

    #[test]
    fn approach_angle_takes_the_short_way_around() {
        // From just below PI to just above -PI is a small step across the seam.
        let current = PI - 0.1;
        let target = -PI + 0.1;
        let next = approach_angle(current, target, 0.5);
        assert_relative_eq!(wrap_angle(next - current).abs(), 0.1, epsilon = 1e-4);
    }

    #[test]
    fn yaw_faces_positive_z_at_zero() {
        assert_relative_eq!(yaw_from_direction(Vec3::Z), 0.0);
        assert_relative_eq!(yaw_from_direction(Vec3::X), PI / 2.0);
    }
}
