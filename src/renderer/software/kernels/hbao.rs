//! Horizon-based AO over one deinterleaved slice.
//!
//! The draw covers one quarter-resolution layer. Quarter pixel `q` of
//! slice `s` stands for full-resolution pixel `4q + (s % 4, s / 4)`, and
//! every step of the horizon march stays inside the slice, which is what
//! keeps the depth fetches cache friendly on a GPU.

use std::f32::consts::TAU;

use glam::{Vec2, Vec3, Vec4};

use crate::errors::Result;
use crate::renderer::software::invocation::{FragmentOutput, Invocation};
use crate::renderer::software::kernels::ao::decode_normal;
use crate::resources::{DepthMode, HbaoData, HbaoSliceData};

/// Occlusion of one horizon sample at view-space offset `v`.
#[inline]
fn falloff_ao(n: Vec3, v: Vec3, params: &HbaoData) -> f32 {
    let vv = v.length_squared();
    if vv < 1e-12 {
        return 0.0;
    }
    let n_dot_v = n.dot(v) / vv.sqrt();
    (n_dot_v - params.n_dot_v_bias).clamp(0.0, 1.0) * (vv * params.neg_inv_r_sq + 1.0).clamp(0.0, 1.0)
}

pub fn hbao(inv: &mut Invocation<'_>) -> Result<()> {
    let params: HbaoData = inv.constants("HbaoCB")?;
    let slice: HbaoSliceData = inv.constants("SliceCB")?;
    let camera = inv.camera()?;
    let defines = inv.defines();
    let directions = defines.get_u32("NUM_DIRECTIONS").unwrap_or(8).max(1);
    let steps = defines.get_u32("NUM_STEPS").unwrap_or(4).max(1);
    let dual = DepthMode::from_define(defines.get_u32("DEPTH_MODE").unwrap_or(0))
        == DepthMode::DualDepth;

    let depth = inv.required("depth")?;
    let depth2 = if dual { inv.texture("depth2") } else { None };
    let normals = inv.required("normals")?;

    let res = params.resolution.max(Vec2::ONE);
    let quarter = params.quarter_resolution.max(Vec2::ONE);
    let layer = slice.slice;
    let offset = slice.quarter_offset;
    let (rot_sin, rot_cos) = (slice.noise.x, slice.noise.y);
    let jitter = slice.noise.z;
    let far = camera.far();
    let is_background = |z: f32| !(z > camera.near()) || z >= far * 0.999;
    let normalization = 2.0 / (directions * steps) as f32 / (1.0 - params.n_dot_v_bias).max(1e-3);

    inv.run_fragments(|this, fragment| {
        let q = fragment.pixel;
        let unoccluded = Some(FragmentOutput::new().color(0, Vec4::ONE));

        let z = this.load(depth, q.x, q.y, layer, 0).x;
        if is_background(z) {
            return unoccluded;
        }
        let full = q * 4 + offset;
        let uv = (full.as_vec2() + 0.5) / res;
        let Some(normal) = decode_normal(this.load(normals, full.x, full.y, 0, 0)) else {
            return unoccluded;
        };
        let n = camera.world_to_view_dir(normal).normalize_or(Vec3::Z);
        let p = camera.view_position(uv, z);

        let radius_px = camera.screen_space_radius(params.radius, z, res.y as u32) / 4.0;
        if radius_px < 1.0 {
            return unoccluded;
        }
        let step = radius_px / (steps as f32 + 1.0);

        let (mut sum, mut sum_dual) = (0.0f32, 0.0f32);
        for d in 0..directions {
            let (s, c) = (TAU * d as f32 / directions as f32).sin_cos();
            let dir = Vec2::new(c * rot_cos - s * rot_sin, c * rot_sin + s * rot_cos);
            let mut march = jitter * step + 1.0;
            for _ in 0..steps {
                let sq = (q.as_vec2() + 0.5 + dir * march).floor();
                march += step;
                if sq.cmplt(Vec2::ZERO).any() || sq.cmpge(quarter).any() {
                    continue;
                }
                let sq = sq.as_uvec2();
                let s_uv = ((sq * 4 + offset).as_vec2() + 0.5) / res;
                let zs = this.load(depth, sq.x, sq.y, layer, 0).x;
                let ao = falloff_ao(n, camera.view_position(s_uv, zs) - p, &params);
                sum += ao;
                sum_dual += match depth2 {
                    Some(t) => {
                        let z2 = this.load(t, sq.x, sq.y, layer, 0).x;
                        if is_background(z2) {
                            ao
                        } else {
                            ao.min(falloff_ao(n, camera.view_position(s_uv, z2) - p, &params))
                        }
                    }
                    None => ao,
                };
            }
        }

        let e = params.power_exponent;
        let single = (1.0 - sum * normalization).clamp(0.0, 1.0).powf(e);
        let dual_ao = (1.0 - sum_dual * normalization).clamp(0.0, 1.0).powf(e);
        Some(FragmentOutput::new().color(0, Vec4::new(single, dual_ao, 0.0, 0.0)))
    })
}
