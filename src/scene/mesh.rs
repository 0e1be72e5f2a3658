use std::borrow::Cow;

use glam::Vec3;

/// How a mesh's opacity is interpreted when alpha testing is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum AlphaMode {
    #[default]
    Opaque,
    /// Fragments are discarded when opacity is below `cutoff`.
    Mask { cutoff: f32 },
}

/// Triangle soup with the material bits the AO passes care about.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: Cow<'static, str>,
    /// Counter-clockwise triangles, world space.
    pub triangles: Vec<[Vec3; 3]>,
    pub double_sided: bool,
    pub alpha_mode: AlphaMode,
    pub opacity: f32,
}

impl Mesh {
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>, triangles: Vec<[Vec3; 3]>) -> Self {
        Self {
            name: name.into(),
            triangles,
            double_sided: false,
            alpha_mode: AlphaMode::Opaque,
            opacity: 1.0,
        }
    }

    /// Quad centred at `center` spanning `±u` and `±v`; faces along `u × v`.
    #[must_use]
    pub fn quad(name: impl Into<Cow<'static, str>>, center: Vec3, u: Vec3, v: Vec3) -> Self {
        Self::new(name, quad_triangles(center, u, v).to_vec())
    }

    /// Horizontal plane facing +Y.
    #[must_use]
    pub fn ground_plane(center: Vec3, half_size: f32) -> Self {
        Self::quad(
            "Ground",
            center,
            Vec3::Z * half_size,
            Vec3::X * half_size,
        )
    }

    /// Closed box with outward-facing triangles.
    #[must_use]
    pub fn cuboid(name: impl Into<Cow<'static, str>>, center: Vec3, half: Vec3) -> Self {
        let (x, y, z) = (Vec3::X * half.x, Vec3::Y * half.y, Vec3::Z * half.z);
        let faces = [
            (x, y, z),
            (-x, z, y),
            (y, z, x),
            (-y, x, z),
            (z, x, y),
            (-z, y, x),
        ];
        let mut triangles = Vec::with_capacity(12);
        for (n, u, v) in faces {
            triangles.extend_from_slice(&quad_triangles(center + n, u, v));
        }
        Self::new(name, triangles)
    }

    #[must_use]
    pub fn double_sided(mut self, double_sided: bool) -> Self {
        self.double_sided = double_sided;
        self
    }

    #[must_use]
    pub fn with_alpha(mut self, alpha_mode: AlphaMode, opacity: f32) -> Self {
        self.alpha_mode = alpha_mode;
        self.opacity = opacity;
        self
    }

    /// `true` when alpha testing discards the whole mesh.
    #[must_use]
    pub fn is_alpha_culled(&self) -> bool {
        match self.alpha_mode {
            AlphaMode::Opaque => false,
            AlphaMode::Mask { cutoff } => self.opacity < cutoff,
        }
    }
}

fn quad_triangles(center: Vec3, u: Vec3, v: Vec3) -> [[Vec3; 3]; 2] {
    let a = center - u - v;
    let b = center + u - v;
    let c = center + u + v;
    let d = center - u + v;
    [[a, b, c], [a, c, d]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cuboid_faces_point_outwards() {
        let mesh = Mesh::cuboid("Box", Vec3::new(1.0, 2.0, 3.0), Vec3::splat(0.5));
        assert_eq!(mesh.triangles.len(), 12);
        for tri in &mesh.triangles {
            let normal = (tri[1] - tri[0]).cross(tri[2] - tri[0]);
            let centroid = (tri[0] + tri[1] + tri[2]) / 3.0;
            assert!(normal.dot(centroid - Vec3::new(1.0, 2.0, 3.0)) > 0.0);
        }
    }

    #[test]
    fn ground_plane_faces_up() {
        let mesh = Mesh::ground_plane(Vec3::ZERO, 5.0);
        for tri in &mesh.triangles {
            let normal = (tri[1] - tri[0]).cross(tri[2] - tri[0]);
            assert!(normal.y > 0.0);
        }
    }
}
