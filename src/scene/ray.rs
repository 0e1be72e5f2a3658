use glam::Vec3;

use crate::resources::CullMode;

#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit length.
    pub direction: Vec3,
}

impl Ray {
    #[must_use]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    #[inline]
    #[must_use]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// A ray/triangle intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub t: f32,
    /// Geometric normal of the front face (counter-clockwise winding).
    pub normal: Vec3,
    pub mesh: u32,
    /// `true` when the ray hit the counter-clockwise side.
    pub front_face: bool,
}

/// Which faces a query is allowed to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RayFlags {
    pub cull: Option<wgpu::Face>,
    /// Skip alpha-masked meshes whose opacity is below their cutoff.
    pub alpha_test: bool,
}

impl RayFlags {
    #[must_use]
    pub fn new(cull: CullMode, alpha_test: bool) -> Self {
        Self {
            cull: cull.to_face(),
            alpha_test,
        }
    }
}

/// Möller–Trumbore intersection; returns `(t, front_face)`.
#[must_use]
pub fn intersect_triangle(ray: &Ray, tri: &[Vec3; 3]) -> Option<(f32, bool)> {
    const EPS: f32 = 1e-7;
    let e1 = tri[1] - tri[0];
    let e2 = tri[2] - tri[0];
    let p = ray.direction.cross(e2);
    let det = e1.dot(p);
    if det.abs() < EPS {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = ray.origin - tri[0];
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = ray.direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv_det;
    // det > 0 means the ray travels against the CCW normal.
    Some((t, det > 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hits_front_of_ccw_triangle() {
        let tri = [Vec3::ZERO, Vec3::X, Vec3::Y];
        let ray = Ray::new(Vec3::new(0.2, 0.2, 1.0), Vec3::NEG_Z);
        let (t, front) = intersect_triangle(&ray, &tri).unwrap();
        assert!((t - 1.0).abs() < 1e-6);
        assert!(front);

        let back = Ray::new(Vec3::new(0.2, 0.2, -1.0), Vec3::Z);
        let (_, front) = intersect_triangle(&back, &tri).unwrap();
        assert!(!front);
    }

    #[test]
    fn misses_outside() {
        let tri = [Vec3::ZERO, Vec3::X, Vec3::Y];
        let ray = Ray::new(Vec3::new(0.8, 0.8, 1.0), Vec3::NEG_Z);
        assert!(intersect_triangle(&ray, &tri).is_none());
    }
}
