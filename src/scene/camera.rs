use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

use super::ray::Ray;

/// Perspective camera with a standard `[0, 1]` depth range (near → 0).
///
/// Linear depth throughout the crate means positive view-space distance
/// along the camera's forward axis.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,

    // === Projection ===
    /// Vertical field of view in radians.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,

    // Cached matrices, rebuilt by `update_matrices`.
    view_matrix: Mat4,
    projection_matrix: Mat4,
}

impl Camera {
    /// `fov` is given in degrees.
    #[must_use]
    pub fn new_perspective(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut cam = Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov: fov.to_radians(),
            aspect,
            near,
            far,
            view_matrix: Mat4::IDENTITY,
            projection_matrix: Mat4::IDENTITY,
        };
        cam.update_matrices();
        cam
    }

    /// Places the camera at `eye`, looking at `target`.
    #[must_use]
    pub fn looking_at(mut self, eye: Vec3, target: Vec3, up: Vec3) -> Self {
        self.position = eye;
        self.target = target;
        self.up = up;
        self.update_matrices();
        self
    }

    pub fn update_matrices(&mut self) {
        self.view_matrix = Mat4::look_at_rh(self.position, self.target, self.up);
        self.projection_matrix = Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far);
    }

    #[inline]
    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        self.view_matrix
    }

    #[inline]
    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection_matrix
    }

    #[inline]
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or(Vec3::NEG_Z)
    }

    // ========================================================================
    // Depth conversions
    // ========================================================================

    /// Hardware depth → linear view depth.
    #[must_use]
    pub fn linearize(&self, depth: f32) -> f32 {
        linearize_depth(depth, self.near, self.far)
    }

    /// Linear view depth → hardware depth.
    #[must_use]
    pub fn delinearize(&self, linear: f32) -> f32 {
        let (n, f) = (self.near, self.far);
        (f * (linear - n) / (linear * (f - n))).clamp(0.0, 1.0)
    }

    // ========================================================================
    // Screen mapping (uv in [0,1], y down)
    // ========================================================================

    /// View-space position of the point at `uv` with the given linear depth.
    #[must_use]
    pub fn view_position(&self, uv: Vec2, linear_depth: f32) -> Vec3 {
        unproject_view(&self.projection_matrix, uv, linear_depth)
    }

    /// Projects a view-space position to `(uv, linear_depth)`.
    #[must_use]
    pub fn project_view(&self, view_pos: Vec3) -> (Vec2, f32) {
        project_view(&self.projection_matrix, view_pos)
    }

    /// World-space ray through the screen position `uv`.
    #[must_use]
    pub fn primary_ray(&self, uv: Vec2) -> Ray {
        let view_dir = self.view_position(uv, 1.0);
        let inv_view = self.view_matrix.inverse();
        let dir = inv_view.transform_vector3(view_dir).normalize();
        Ray::new(self.position, dir)
    }

    /// Linear depth of a point `t` units along `ray`.
    #[must_use]
    pub fn depth_along(&self, ray: &Ray, t: f32) -> f32 {
        t * ray.direction.dot(self.forward())
    }

    #[must_use]
    pub fn world_to_view_dir(&self, dir: Vec3) -> Vec3 {
        self.view_matrix.transform_vector3(dir)
    }

    /// Radius in pixels of a view-space sphere of `radius` at `linear_depth`.
    #[must_use]
    pub fn screen_space_radius(&self, radius: f32, linear_depth: f32, height: u32) -> f32 {
        screen_space_radius(&self.projection_matrix, radius, linear_depth, height)
    }

    #[must_use]
    pub fn shader_data(&self) -> CameraData {
        CameraData {
            view: self.view_matrix,
            projection: self.projection_matrix,
            inv_view: self.view_matrix.inverse(),
            inv_projection: self.projection_matrix.inverse(),
            position_near: self.position.extend(self.near),
            params: Vec4::new(self.far, self.fov, self.aspect, 0.0),
        }
    }
}

/// Per-frame camera constants uploaded next to the pass parameters.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraData {
    pub view: Mat4,
    pub projection: Mat4,
    pub inv_view: Mat4,
    pub inv_projection: Mat4,
    /// xyz: position, w: near plane.
    pub position_near: Vec4,
    /// x: far plane, y: fov, z: aspect.
    pub params: Vec4,
}

impl CameraData {
    #[inline]
    #[must_use]
    pub fn near(&self) -> f32 {
        self.position_near.w
    }

    #[inline]
    #[must_use]
    pub fn far(&self) -> f32 {
        self.params.x
    }

    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position_near.truncate()
    }

    /// World-space view direction.
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        self.inv_view.transform_vector3(Vec3::NEG_Z).normalize()
    }

    #[must_use]
    pub fn linearize(&self, depth: f32) -> f32 {
        linearize_depth(depth, self.near(), self.far())
    }

    /// Linear view depth → hardware depth.
    #[must_use]
    pub fn delinearize(&self, linear: f32) -> f32 {
        let (n, f) = (self.near(), self.far());
        (f * (linear - n) / (linear * (f - n))).clamp(0.0, 1.0)
    }

    #[must_use]
    pub fn view_position(&self, uv: Vec2, linear_depth: f32) -> Vec3 {
        unproject_view(&self.projection, uv, linear_depth)
    }

    #[must_use]
    pub fn project_view(&self, view_pos: Vec3) -> (Vec2, f32) {
        project_view(&self.projection, view_pos)
    }

    #[must_use]
    pub fn world_to_view_dir(&self, dir: Vec3) -> Vec3 {
        self.view.transform_vector3(dir)
    }

    #[must_use]
    pub fn view_to_world(&self, view_pos: Vec3) -> Vec3 {
        self.inv_view.transform_point3(view_pos)
    }

    #[must_use]
    pub fn view_to_world_dir(&self, dir: Vec3) -> Vec3 {
        self.inv_view.transform_vector3(dir)
    }

    #[must_use]
    pub fn primary_ray(&self, uv: Vec2) -> Ray {
        let dir = self
            .inv_view
            .transform_vector3(self.view_position(uv, 1.0))
            .normalize();
        Ray::new(self.position(), dir)
    }

    /// Linear depth of a point `t` units along `ray`.
    #[must_use]
    pub fn depth_along(&self, ray: &Ray, t: f32) -> f32 {
        t * ray.direction.dot(self.forward())
    }

    #[must_use]
    pub fn screen_space_radius(&self, radius: f32, linear_depth: f32, height: u32) -> f32 {
        screen_space_radius(&self.projection, radius, linear_depth, height)
    }
}

/// Hardware depth in `[0, 1]` → linear view depth.
#[inline]
#[must_use]
pub fn linearize_depth(depth: f32, near: f32, far: f32) -> f32 {
    near * far / (far - depth * (far - near))
}

/// View-space position at `uv` with the given linear depth.
#[must_use]
pub fn unproject_view(projection: &Mat4, uv: Vec2, linear_depth: f32) -> Vec3 {
    let ndc = uv_to_ndc(uv);
    Vec3::new(
        ndc.x * linear_depth / projection.x_axis.x,
        ndc.y * linear_depth / projection.y_axis.y,
        -linear_depth,
    )
}

/// View-space position → `(uv, linear_depth)`.
#[must_use]
pub fn project_view(projection: &Mat4, view_pos: Vec3) -> (Vec2, f32) {
    let clip = *projection * view_pos.extend(1.0);
    let ndc = clip.truncate().truncate() / clip.w;
    (ndc_to_uv(ndc), -view_pos.z)
}

/// Radius in pixels of a view-space sphere of `radius` at `linear_depth`.
#[must_use]
pub fn screen_space_radius(projection: &Mat4, radius: f32, linear_depth: f32, height: u32) -> f32 {
    radius * projection.y_axis.y * height as f32 * 0.5 / linear_depth.max(1e-6)
}

#[inline]
#[must_use]
pub fn uv_to_ndc(uv: Vec2) -> Vec2 {
    Vec2::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0)
}

#[inline]
#[must_use]
pub fn ndc_to_uv(ndc: Vec2) -> Vec2 {
    Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        Camera::new_perspective(60.0, 1.0, 0.1, 100.0).looking_at(
            Vec3::new(0.0, 10.0, 0.0),
            Vec3::ZERO,
            Vec3::NEG_Z,
        )
    }

    #[test]
    fn linearize_inverts_delinearize() {
        let cam = camera();
        for lin in [0.1, 1.0, 9.5, 60.0] {
            let d = cam.delinearize(lin);
            assert!((cam.linearize(d) - lin).abs() < 1e-3 * lin);
        }
    }

    #[test]
    fn project_inverts_unproject() {
        let data = camera().shader_data();
        let uv = Vec2::new(0.3, 0.7);
        let p = data.view_position(uv, 4.0);
        let (uv2, lin) = data.project_view(p);
        assert!((uv2 - uv).length() < 1e-5);
        assert!((lin - 4.0).abs() < 1e-5);
    }

    #[test]
    fn center_ray_follows_forward() {
        let data = camera().shader_data();
        let ray = data.primary_ray(Vec2::splat(0.5));
        assert!(ray.direction.dot(Vec3::NEG_Y) > 0.9999);
        assert!((data.depth_along(&ray, 10.0) - 10.0).abs() < 1e-4);
    }
}
