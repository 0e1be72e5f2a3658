//! Depth acquisition kernels: the depth/normal prepass, linearization and
//! depth peeling.

use std::sync::Arc;

use glam::Vec4;

use crate::errors::Result;
use crate::renderer::software::invocation::{FragmentOutput, Invocation};
use crate::resources::DepthRangeData;
use crate::scene::camera;

/// Raster: world normals (`[0, 1]` encoded) to target 0, the mesh's
/// double-sided flag to target 1. Alpha-culled meshes are skipped.
pub fn depth_normal_prepass(inv: &mut Invocation<'_>) -> Result<()> {
    let scene = Arc::clone(inv.scene()?);
    inv.run_fragments(|_, fragment| {
        let hit = fragment.hit?;
        let mesh = scene.meshes.get(hit.mesh as usize)?;
        if mesh.is_alpha_culled() {
            return None;
        }
        // Back faces only reach here on double-sided meshes; face the viewer.
        let normal = if hit.front_face { hit.normal } else { -hit.normal };
        Some(
            FragmentOutput::new()
                .color(0, (normal * 0.5 + 0.5).extend(1.0))
                .color(1, Vec4::splat(f32::from(u8::from(mesh.double_sided)))),
        )
    })
}

/// Full-screen: hardware depth → view-space distance.
pub fn linearize_depth(inv: &mut Invocation<'_>) -> Result<()> {
    let range: DepthRangeData = inv.constants("CameraCB")?;
    let depth = inv.required("depth")?;
    inv.run_fragments(|this, fragment| {
        let d = this.load_uv(depth, fragment.uv, 0, 0).x;
        let linear = camera::linearize_depth(d, range.near, range.far);
        Some(FragmentOutput::new().color(0, Vec4::splat(linear)))
    })
}

/// Raster: keeps fragments strictly behind the primary layer. The depth
/// test (Less) then leaves the nearest of them.
pub fn depth_peeling(inv: &mut Invocation<'_>) -> Result<()> {
    let scene = Arc::clone(inv.scene()?);
    let camera = inv.camera()?;
    let primary = inv.required("depth")?;
    inv.run_fragments(|this, fragment| {
        let hit = fragment.hit?;
        if scene
            .meshes
            .get(hit.mesh as usize)
            .is_none_or(|m| m.is_alpha_culled())
        {
            return None;
        }
        let front = camera.linearize(this.load_uv(primary, fragment.uv, 0, 0).x);
        (fragment.linear_depth > front * (1.0 + 1e-4) + 1e-4).then(FragmentOutput::new)
    })
}
