//! Scene Representation
//!
//! The AO passes only need a camera, triangle geometry and a few material
//! bits (double-sidedness and alpha masking). [`Scene`] holds exactly that
//! and answers the two queries the programs issue against geometry:
//!
//! - *all hits* along a ray, used by rasterization (one query per pixel
//!   center), depth peeling and stochastic depth acquisition;
//! - *closest hit* along a ray, used by ray-traced refinement.
//!
//! Scenes are shared with passes as `Arc<Scene>` through
//! [`RenderPass::set_scene`](crate::renderer::graph::RenderPass::set_scene).

pub mod camera;
pub mod mesh;
pub mod ray;

pub use camera::{Camera, CameraData};
pub use mesh::{AlphaMode, Mesh};
pub use ray::{Hit, Ray, RayFlags};

use smallvec::SmallVec;

use crate::resources::ShaderDefines;

/// Hits collected by a single all-hits query.
pub type HitList = SmallVec<[Hit; 8]>;

#[derive(Debug, Clone)]
pub struct Scene {
    pub camera: Camera,
    pub meshes: Vec<Mesh>,
}

impl Scene {
    #[must_use]
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            meshes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_mesh(mut self, mesh: Mesh) -> Self {
        self.meshes.push(mesh);
        self
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> u32 {
        self.meshes.push(mesh);
        self.meshes.len() as u32 - 1
    }

    /// Defines contributed to every program that binds this scene.
    #[must_use]
    pub fn shader_defines(&self) -> ShaderDefines {
        let mut defines = ShaderDefines::with_capacity(3);
        defines.set("SCENE_MESH_COUNT", self.meshes.len());
        defines.set(
            "SCENE_HAS_DOUBLE_SIDED",
            self.meshes.iter().any(|m| m.double_sided),
        );
        defines.set(
            "SCENE_HAS_ALPHA_MASK",
            self.meshes
                .iter()
                .any(|m| !matches!(m.alpha_mode, AlphaMode::Opaque)),
        );
        defines
    }

    /// One bit per mesh, set when the mesh uses alpha masking. Always at
    /// least one word long.
    #[must_use]
    pub fn alpha_test_bitmask(&self) -> Vec<u32> {
        let words = self.meshes.len().div_ceil(32).max(1);
        let mut mask = vec![0u32; words];
        for (i, mesh) in self.meshes.iter().enumerate() {
            if !matches!(mesh.alpha_mode, AlphaMode::Opaque) {
                mask[i / 32] |= 1 << (i % 32);
            }
        }
        mask
    }

    /// Every hit with `t` in `(t_min, t_max)`, sorted by distance.
    #[must_use]
    pub fn trace_all(&self, ray: &Ray, t_min: f32, t_max: f32, flags: RayFlags) -> HitList {
        let mut hits = HitList::new();
        for (mesh_index, mesh) in self.meshes.iter().enumerate() {
            if flags.alpha_test && mesh.is_alpha_culled() {
                continue;
            }
            let cull = if mesh.double_sided { None } else { flags.cull };
            for tri in &mesh.triangles {
                let Some((t, front_face)) = ray::intersect_triangle(ray, tri) else {
                    continue;
                };
                if t <= t_min || t >= t_max {
                    continue;
                }
                match cull {
                    Some(wgpu::Face::Back) if !front_face => continue,
                    Some(wgpu::Face::Front) if front_face => continue,
                    _ => {}
                }
                let normal = (tri[1] - tri[0]).cross(tri[2] - tri[0]).normalize();
                hits.push(Hit {
                    t,
                    normal,
                    mesh: mesh_index as u32,
                    front_face,
                });
            }
        }
        hits.sort_by(|a, b| a.t.total_cmp(&b.t));
        // Rays through a shared edge report both triangles.
        hits.dedup_by(|b, a| a.mesh == b.mesh && (b.t - a.t).abs() < 1e-5 * a.t.max(1.0));
        hits
    }

    /// Closest hit with `t` in `(t_min, t_max)`.
    #[must_use]
    pub fn trace_closest(&self, ray: &Ray, t_min: f32, t_max: f32, flags: RayFlags) -> Option<Hit> {
        self.trace_all(ray, t_min, t_max, flags).into_iter().next()
    }

    /// Whether any geometry lies within `(t_min, t_max)`.
    #[must_use]
    pub fn trace_any(&self, ray: &Ray, t_min: f32, t_max: f32, flags: RayFlags) -> bool {
        !self.trace_all(ray, t_min, t_max, flags).is_empty()
    }
}
