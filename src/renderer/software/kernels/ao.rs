//! Volumetric AO Sample Evaluation
//!
//! Shared by the VAO and SVAO kernels. Every pixel places a sphere of
//! radius `R` on its surface (center `C = P + N·R`, view space) and tests
//! the kernel samples against the depth buffer. A sample is a view-aligned
//! column through the sphere:
//!
//! ```text
//!   camera ──►   front f          back b
//!                  │◄──── 2h ────►│          Q = C + R·(s.x, s.y, 0)
//!                  ▼              ▼          h = R·sqrt(1 - |s|²)
//!   ───────────────[    column    ]──────►  linear depth
//! ```
//!
//! The visible (unoccupied) fraction of the column is the sample's AO
//! contribution. With a single depth layer `z` at the column's screen
//! position:
//!
//! | Case                    | Visibility        |
//! |-------------------------|-------------------|
//! | `z >= b`                | 1                 |
//! | `f <= z < b`            | `(z - f) / 2h`    |
//! | `z < f`, `f - z <= T`   | 0                 |
//! | `z < f`, `f - z > T`    | ambiguous         |
//!
//! `T = thickness · 2R` is the assumed object thickness. Ambiguous samples
//! are exactly the ones a second technique (second layer, stochastic depth,
//! or a ray) has to resolve.

use std::sync::Arc;

use glam::{UVec2, Vec2, Vec3};
use smallvec::SmallVec;

use crate::errors::Result;
use crate::renderer::core::texture::{Texture, channel_count, is_depth_format};
use crate::renderer::software::invocation::{Invocation, uv_to_pixel};
use crate::resources::ao::generate_dither_noise;
use crate::resources::{DepthEncoding, DepthMode, ForceRay, ShaderDefines, VaoData};
use crate::scene::{CameraData, RayFlags, Scene};

/// Occupied depth intervals along one view column.
pub type Intervals = SmallVec<[(f32, f32); 8]>;

/// Linear depths of one pixel's stochastic layers.
pub type Layers = SmallVec<[f32; 16]>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Column {
    pub front: f32,
    pub back: f32,
}

impl Column {
    #[inline]
    fn len(&self) -> f32 {
        (self.back - self.front).max(1e-6)
    }

    /// Share of the column not covered by `intervals` (sorted, disjoint).
    #[must_use]
    pub fn visible_fraction(&self, intervals: &[(f32, f32)]) -> f32 {
        let covered: f32 = intervals
            .iter()
            .map(|&(a, b)| (b.min(self.back) - a.max(self.front)).max(0.0))
            .sum();
        (1.0 - covered / self.len()).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RasterSample {
    Visible(f32),
    Ambiguous,
}

/// Single-layer rule of the table above.
#[must_use]
pub fn single_depth(column: Column, z: f32, thickness: f32) -> RasterSample {
    let eps = 1e-4 * column.back.abs() + 1e-4;
    if z >= column.back - eps {
        RasterSample::Visible(1.0)
    } else if z >= column.front {
        RasterSample::Visible(((z - column.front) / column.len()).clamp(0.0, 1.0))
    } else if column.front - z <= thickness {
        RasterSample::Visible(0.0)
    } else {
        RasterSample::Ambiguous
    }
}

/// Turns sorted surface depths into occupied intervals by parity: entries
/// alternate with exits, and a trailing entry is closed after `thickness`.
#[must_use]
pub fn layer_intervals(layers: &mut Layers, thickness: f32, far: f32) -> Intervals {
    layers.retain(|d| *d < far * 0.999);
    layers.sort_by(f32::total_cmp);
    layers.dedup_by(|b, a| (*b - *a).abs() <= 1e-4 * a.abs().max(1.0));
    layers
        .chunks(2)
        .map(|pair| match pair {
            [enter, exit] => (*enter, *exit),
            _ => (pair[0], pair[0] + thickness),
        })
        .collect()
}

/// Sorts and merges overlapping intervals in place.
pub fn merge_intervals(intervals: &mut Intervals) {
    intervals.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut merged = Intervals::new();
    for &(a, b) in intervals.iter() {
        match merged.last_mut() {
            Some(last) if a <= last.1 => last.1 = last.1.max(b),
            _ => merged.push((a, b)),
        }
    }
    *intervals = merged;
}

/// Occupied intervals along the camera ray through `uv`, from every
/// surface in the scene. Closed meshes toggle inside/outside at their
/// faces; double-sided meshes are slabs of `thickness`.
#[must_use]
pub fn ray_intervals(
    scene: &Scene,
    camera: &CameraData,
    uv: Vec2,
    thickness: f32,
    alpha_test: bool,
) -> Intervals {
    let ray = camera.primary_ray(uv);
    let flags = RayFlags {
        cull: None,
        alpha_test,
    };
    let mut intervals = Intervals::new();
    let mut open: Option<f32> = None;
    for hit in scene.trace_all(&ray, 0.0, f32::INFINITY, flags) {
        let d = camera.depth_along(&ray, hit.t);
        let double_sided = scene
            .meshes
            .get(hit.mesh as usize)
            .is_some_and(|m| m.double_sided);
        if double_sided {
            intervals.push((d, d + thickness));
        } else if hit.front_face {
            open.get_or_insert(d);
        } else {
            intervals.push((open.take().unwrap_or(camera.near()), d));
        }
    }
    if let Some(start) = open {
        intervals.push((start, f32::INFINITY));
    }
    merge_intervals(&mut intervals);
    intervals
}

/// Linear depths stored at `uv` of a stochastic depth map. Multisampled
/// and depth-format maps hold one layer per sample, color maps one layer
/// per channel. Empty slots are dropped.
#[must_use]
pub fn stochastic_layers(
    inv: &Invocation<'_>,
    texture: Texture,
    uv: Vec2,
    encoding: DepthEncoding,
    near: f32,
    far: f32,
) -> Layers {
    let p = uv_to_pixel(uv, texture.size());
    let mut raw = Layers::new();
    if texture.desc.sample_count > 1 || is_depth_format(texture.format()) {
        for sample in 0..texture.desc.sample_count {
            raw.push(inv.load(texture, p.x, p.y, 0, sample).x);
        }
    } else {
        let texel = inv.load(texture, p.x, p.y, 0, 0).to_array();
        raw.extend_from_slice(&texel[..channel_count(texture.format())]);
    }
    raw.into_iter()
        .map(|v| encoding.to_linear(v, near, far))
        .filter(|d| *d > near && *d < far * 0.999)
        .collect()
}

/// Decodes a `[0, 1]` encoded world normal; `None` for cleared texels.
#[must_use]
pub fn decode_normal(encoded: glam::Vec4) -> Option<Vec3> {
    let n = encoded.truncate() * 2.0 - 1.0;
    (n.length_squared() > 0.25).then(|| n.normalize())
}

// ─── Per-pixel evaluation ─────────────────────────────────────────────────────

/// Behaviour switches read from the program defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AoOptions {
    pub prevent_dark_halos: bool,
    pub trace_out_of_screen: bool,
    pub trace_double_on_double: bool,
    pub alpha_test: bool,
}

impl AoOptions {
    #[must_use]
    pub fn from_defines(defines: &ShaderDefines) -> Self {
        Self {
            prevent_dark_halos: defines.is_enabled("PREVENT_DARK_HALOS"),
            trace_out_of_screen: defines.is_enabled("TRACE_OUT_OF_SCREEN"),
            trace_double_on_double: defines.is_enabled("TRACE_DOUBLE_ON_DOUBLE"),
            alpha_test: defines.is_enabled("USE_ALPHA_TEST"),
        }
    }
}

/// One kernel sample of one pixel.
#[derive(Debug, Clone, Copy)]
pub struct SampleEval {
    /// Screen position the column was tested at (clamped when the sample
    /// left the valid region and is not traced).
    pub uv: Vec2,
    /// Unclamped projection of the sample; rays are traced through it.
    pub screen_uv: Vec2,
    pub column: Column,
    pub raster_depth: f32,
    pub raster: RasterSample,
    pub force: ForceRay,
}

/// Visibility of one sample: `bright` and `dark` only differ when the
/// sample stayed ambiguous.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleValue {
    pub bright: f32,
    pub dark: f32,
    pub ambiguous: bool,
}

impl SampleValue {
    #[must_use]
    pub fn resolved(v: f32) -> Self {
        Self {
            bright: v,
            dark: v,
            ambiguous: false,
        }
    }

    /// The value used when only one channel is written.
    #[inline]
    #[must_use]
    pub fn single(self, prevent_dark_halos: bool) -> f32 {
        if prevent_dark_halos { self.bright } else { self.dark }
    }

    #[must_use]
    pub fn lerp(self, refined: f32, t: f32) -> Self {
        Self {
            bright: self.bright + (refined - self.bright) * t,
            dark: self.dark + (refined - self.dark) * t,
            ambiguous: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PixelEval {
    pub samples: SmallVec<[SampleEval; 32]>,
    /// Blend factor of refined results, from the screen-space radius fade.
    pub weight: f32,
    pub linear_depth: f32,
}

/// Bindings of a volumetric AO program.
pub struct AoContext {
    pub camera: CameraData,
    pub params: VaoData,
    pub depth: Texture,
    pub depth2: Option<Texture>,
    pub normals: Texture,
    pub double_sided: Option<Texture>,
    pub scene: Option<Arc<Scene>>,
    pub options: AoOptions,
    noise: Vec<u8>,
    uv_min: Vec2,
    uv_max: Vec2,
}

impl AoContext {
    pub fn new(inv: &Invocation<'_>) -> Result<Self> {
        let params: VaoData = inv.constants("VaoCB")?;
        let res = params.resolution.max(Vec2::ONE);
        // An oversized band collapses the valid region to the center.
        let band = (Vec2::splat(params.guard_band as f32) / res).min(Vec2::splat(0.5));
        Ok(Self {
            camera: inv.camera()?,
            params,
            depth: inv.required("depth")?,
            depth2: inv.texture("depth2"),
            normals: inv.required("normals")?,
            double_sided: inv.texture("doubleSided"),
            scene: inv.vars.scene().cloned(),
            options: AoOptions::from_defines(inv.defines()),
            noise: generate_dither_noise(),
            uv_min: band,
            uv_max: Vec2::ONE - band,
        })
    }

    #[inline]
    #[must_use]
    pub fn resolution(&self) -> UVec2 {
        self.params.resolution.as_uvec2()
    }

    /// Absolute object thickness assumed behind a single layer.
    #[inline]
    #[must_use]
    pub fn thickness(&self) -> f32 {
        self.params.thickness * 2.0 * self.params.radius
    }

    #[inline]
    fn is_background(&self, z: f32) -> bool {
        !(z > self.camera.near()) || z >= self.camera.far() * 0.999
    }

    /// Places the sphere on `pixel` and evaluates every kernel sample
    /// against the primary depth. `None` for background pixels.
    #[must_use]
    pub fn evaluate(&self, inv: &Invocation<'_>, pixel: UVec2) -> Option<PixelEval> {
        let camera = &self.camera;
        let res = self.params.resolution.max(Vec2::ONE);
        let z = inv.load(self.depth, pixel.x, pixel.y, 0, 0).x;
        if self.is_background(z) {
            return None;
        }

        let uv = (pixel.as_vec2() + 0.5) / res;
        let p = camera.view_position(uv, z);
        let normal = decode_normal(inv.load(self.normals, pixel.x, pixel.y, 0, 0));
        let n = normal.map_or(-p.normalize_or(Vec3::Z), |n| {
            camera.world_to_view_dir(n).normalize_or(Vec3::Z)
        });

        let r = self.params.radius;
        let center = p + n * r;
        let dither = self.noise[((pixel.y % 4) * 4 + pixel.x % 4) as usize] as f32 / 255.0;
        let (sin, cos) = (dither * std::f32::consts::TAU).sin_cos();

        let ss_radius = camera
            .screen_space_radius(r, z, res.y as u32)
            .min(self.params.max_ss_radius);
        let weight = if ss_radius < self.params.ss_radius_fade_end {
            0.0
        } else {
            ((ss_radius - self.params.ss_radius_fade_end)
                / self.params.ss_radius_fade_size.max(1e-6))
            .clamp(0.0, 1.0)
        };

        let pixel_double_sided = self.is_double_sided(inv, uv);
        let thickness = self.thickness();
        let samples = self
            .params
            .kernel()
            .iter()
            .map(|s| {
                let d = Vec2::new(s.x * cos - s.y * sin, s.x * sin + s.y * cos);
                let h = r * (1.0 - d.length_squared()).max(0.0).sqrt();
                let q = center + Vec3::new(d.x, d.y, 0.0) * r;
                let (uv_q, q_lin) = camera.project_view(q);
                let column = Column {
                    front: (q_lin - h).max(camera.near()),
                    back: q_lin + h,
                };

                let mut force = ForceRay::None;
                let mut uv_s = uv_q;
                let on_screen = uv_q.cmpge(self.uv_min).all() && uv_q.cmple(self.uv_max).all();
                if !on_screen {
                    if self.options.trace_out_of_screen {
                        force = ForceRay::OutOfScreen;
                    }
                    uv_s = uv_q.clamp(self.uv_min, self.uv_max);
                }
                if normal.is_none() {
                    force = ForceRay::Invalid;
                } else if !force.is_forced()
                    && pixel_double_sided
                    && self.options.trace_double_on_double
                    && self.is_double_sided(inv, uv_s)
                {
                    force = ForceRay::DoubleSided;
                }

                let raster_depth = inv.load_uv(self.depth, uv_s, 0, 0).x;
                SampleEval {
                    uv: uv_s,
                    screen_uv: uv_q,
                    column,
                    raster_depth,
                    raster: single_depth(column, raster_depth, thickness),
                    force,
                }
            })
            .collect();

        Some(PixelEval {
            samples,
            weight,
            linear_depth: z,
        })
    }

    fn is_double_sided(&self, inv: &Invocation<'_>, uv: Vec2) -> bool {
        self.double_sided
            .is_some_and(|t| inv.load_uv(t, uv, 0, 0).x > 0.5)
    }

    // === Depth techniques ===

    /// Raster result of a sample. Ambiguous samples are bright (1) or dark
    /// (0).
    #[must_use]
    pub fn raster_value(&self, sample: &SampleEval) -> SampleValue {
        match sample.raster {
            RasterSample::Visible(v) => SampleValue::resolved(v),
            RasterSample::Ambiguous => SampleValue {
                bright: 1.0,
                dark: 0.0,
                ambiguous: true,
            },
        }
    }

    /// Resolves a non-trivial raster sample against extra layers behind the
    /// primary one.
    fn layered_value(&self, sample: &SampleEval, extra: Layers) -> SampleValue {
        let raster = self.raster_value(sample);
        if raster.bright >= 1.0 && !raster.ambiguous {
            return raster;
        }
        let z = sample.raster_depth;
        let eps = 1e-4 * z.abs() + 1e-4;
        let mut layers: Layers = extra.into_iter().filter(|d| *d > z + eps).collect();
        if layers.is_empty() {
            return raster;
        }
        layers.push(z);
        let intervals = layer_intervals(&mut layers, self.thickness(), self.camera.far());
        SampleValue::resolved(sample.column.visible_fraction(&intervals))
    }

    #[must_use]
    pub fn dual_value(&self, inv: &Invocation<'_>, sample: &SampleEval) -> SampleValue {
        let Some(depth2) = self.depth2 else {
            return self.raster_value(sample);
        };
        let z2 = inv.load_uv(depth2, sample.uv, 0, 0).x;
        let extra: Layers = (!self.is_background(z2)).then_some(z2).into_iter().collect();
        self.layered_value(sample, extra)
    }

    #[must_use]
    pub fn stochastic_value(
        &self,
        inv: &Invocation<'_>,
        sample: &SampleEval,
        map: Texture,
        encoding: DepthEncoding,
    ) -> SampleValue {
        let layers = stochastic_layers(
            inv,
            map,
            sample.uv,
            encoding,
            self.camera.near(),
            self.camera.far(),
        );
        self.layered_value(sample, layers)
    }

    /// Ground-truth visibility of a sample and the depth of the first
    /// surface along its ray. `None` without a scene.
    #[must_use]
    pub fn ray_sample(&self, sample: &SampleEval) -> Option<(f32, f32)> {
        let scene = self.scene.as_ref()?;
        let intervals = ray_intervals(
            scene,
            &self.camera,
            sample.screen_uv,
            self.thickness(),
            self.options.alpha_test,
        );
        let first = intervals.first().map_or(self.camera.far(), |i| i.0);
        Some((sample.column.visible_fraction(&intervals), first))
    }

    #[must_use]
    pub fn ray_value(&self, sample: &SampleEval) -> Option<f32> {
        self.ray_sample(sample).map(|(visible, _)| visible)
    }

    /// Evaluates a sample with the given depth technique.
    #[must_use]
    pub fn value(
        &self,
        inv: &Invocation<'_>,
        sample: &SampleEval,
        mode: DepthMode,
        stochastic: Option<(Texture, DepthEncoding)>,
    ) -> SampleValue {
        match mode {
            DepthMode::DualDepth => self.dual_value(inv, sample),
            DepthMode::StochasticDepth => match stochastic {
                Some((map, encoding)) => self.stochastic_value(inv, sample, map, encoding),
                None => self.raster_value(sample),
            },
            DepthMode::Raytraced => self
                .ray_value(sample)
                .map_or_else(|| self.raster_value(sample), SampleValue::resolved),
            DepthMode::SingleDepth
            | DepthMode::PerfectClassify
            | DepthMode::MachineClassify
            | DepthMode::MachinePredict => self.raster_value(sample),
        }
    }

    /// Collapses per-sample values into `(single, bright, dark)` AO.
    #[must_use]
    pub fn finish(&self, values: &[SampleValue]) -> (f32, f32, f32) {
        if values.is_empty() {
            return (1.0, 1.0, 1.0);
        }
        let n = values.len() as f32;
        let bright = values.iter().map(|v| v.bright).sum::<f32>() / n;
        let dark = values.iter().map(|v| v.dark).sum::<f32>() / n;
        let e = self.params.exponent;
        let (bright, dark) = (bright.powf(e), dark.powf(e));
        let single = if self.options.prevent_dark_halos { bright } else { dark };
        (single, bright, dark)
    }
}

/// Reads the stochastic map binding of a program, if any.
#[must_use]
pub fn stochastic_binding(inv: &Invocation<'_>) -> Option<(Texture, DepthEncoding)> {
    let map = inv.texture("stochasticDepth")?;
    let encoding = DepthEncoding::from_define(
        inv.defines()
            .get_u32("STOCHASTIC_ENCODING")
            .unwrap_or(DepthEncoding::NormalizedLinear.define_value()),
    );
    Some((map, encoding))
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMN: Column = Column {
        front: 9.0,
        back: 10.0,
    };

    #[test]
    fn single_depth_rule() {
        assert_eq!(single_depth(COLUMN, 10.5, 0.5), RasterSample::Visible(1.0));
        assert_eq!(single_depth(COLUMN, 9.5, 0.5), RasterSample::Visible(0.5));
        assert_eq!(single_depth(COLUMN, 8.8, 0.5), RasterSample::Visible(0.0));
        assert_eq!(single_depth(COLUMN, 5.0, 0.5), RasterSample::Ambiguous);
    }

    #[test]
    fn parity_intervals_close_trailing_entry() {
        let mut layers: Layers = smallvec::smallvec![3.0, 1.0, 2.0];
        let intervals = layer_intervals(&mut layers, 0.5, 100.0);
        assert_eq!(intervals.as_slice(), &[(1.0, 2.0), (3.0, 3.5)]);
    }

    #[test]
    fn thin_occluder_in_front_leaves_column_visible() {
        // Entry at 5, exit at 6: the column behind is free.
        let mut layers: Layers = smallvec::smallvec![5.0, 6.0];
        let intervals = layer_intervals(&mut layers, 0.5, 100.0);
        assert!((COLUMN.visible_fraction(&intervals) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn merge_joins_overlaps() {
        let mut intervals: Intervals = smallvec::smallvec![(4.0, 5.0), (1.0, 2.5), (2.0, 3.0)];
        merge_intervals(&mut intervals);
        assert_eq!(intervals.as_slice(), &[(1.0, 3.0), (4.0, 5.0)]);
    }
}
