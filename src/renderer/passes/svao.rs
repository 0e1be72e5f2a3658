//! Stenciled Volumetric AO
//!
//! Two-phase volumetric AO. Pass 1 evaluates every kernel sample with the
//! cheap *primary* depth mode and flags, per pixel and sample, the ones whose
//! result is uncertain. Pass 2 revisits only flagged samples with the
//! expensive *secondary* mode.
//!
//! ```text
//!              ┌─────────┐  ao, stencil bits   ┌────────────────────┐
//!  depth ─────►│ pass 1  │────────────────────►│ pass 2             │──► ao
//!  normals ───►│ (8×8)   │  rayMin/rayMax ──┐  │ compute | ray-gen  │
//!              └─────────┘  accessStencil   │  └────────────────────┘
//!                                           ▼           ▲
//!                              ┌────────────────────┐   │ stochasticDepth
//!                              │ StochasticDepth    │───┘
//!                              │ (Raster | Ray)     │
//!                              └────────────────────┘
//! ```
//!
//! The stochastic depth source and the ray-interval textures only exist
//! when the secondary mode is `StochasticDepth`. They are owned by the pass
//! and sized `ceil(resolution / stochMapDivisor)`.
//!
//! # Properties
//!
//! | Key                   | Default        |
//! |-----------------------|----------------|
//! | `enabled`             | `true`         |
//! | `radius`              | 1.0            |
//! | `primaryDepthMode`    | `SingleDepth`  |
//! | `secondaryDepthMode`  | `Raytraced`    |
//! | `exponent`            | 2.0            |
//! | `rayPipeline`         | `true`         |
//! | `thickness`           | 0.5            |
//! | `stochMapDivisor`     | 1              |
//! | `dualAO`              | `false`        |
//! | `alphaTest`           | `true`         |
//! | `stochasticImpl`      | `Raster`       |
//! | `preventDarkHalos`    | `true`         |
//! | `traceOutOfScreen`    | `true`         |
//! | `traceDoubleOnDouble` | `true`         |
//! | `classifyProbability` | 0.5            |

use std::path::PathBuf;
use std::sync::Arc;

use glam::{UVec2, UVec3, Vec4};

use crate::errors::{AoError, Result};
use crate::renderer::core::context::RenderContext;
use crate::renderer::core::program::{ProgramDesc, ProgramSlot};
use crate::renderer::core::texture::{Texture, TextureDesc};
use crate::renderer::core::vars::ProgramVars;
use crate::renderer::graph::{CompileData, FrameContext, RenderData, RenderPass, RenderPassReflection};
use crate::renderer::programs;
use crate::resources::ao::{SVAO_KERNEL_SIZE, classify_threshold, generate_vao_kernel};
use crate::resources::{
    DepthFormat, DepthMode, ParamBlock, Properties, SampleDistribution, ShaderDefines,
    StochasticDepthImpl, VaoData,
};
use crate::scene::Scene;
use crate::utils::{align_up, div_ceil_uvec2};

use super::export::export_textures;
use super::stochastic_depth::{
    StochasticDepth, StochasticDepthInputs, StochasticDepthRaster, StochasticDepthRay,
};
use super::warn_unknown_property;

/// Cleared value of `rayMin`; any real depth is smaller.
const RAY_MIN_CLEAR: f32 = 1e30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvaoState {
    /// Configuration changed since the last rebuild.
    Uncompiled,
    Compiling,
    Ready,
    Disabled,
}

/// `rayMin`, `rayMax` and `accessStencil` at the stochastic map size.
#[derive(Debug, Clone, Copy)]
struct RayInterval {
    min: Texture,
    max: Texture,
    access: Texture,
}

impl RayInterval {
    fn create(ctx: &mut dyn RenderContext, size: UVec2) -> Self {
        let usage = wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING;
        Self {
            min: ctx.create_texture(
                TextureDesc::new_2d("rayMin", size, wgpu::TextureFormat::R32Float).with_usage(usage),
            ),
            max: ctx.create_texture(
                TextureDesc::new_2d("rayMax", size, wgpu::TextureFormat::R32Float).with_usage(usage),
            ),
            access: ctx.create_texture(
                TextureDesc::new_2d("accessStencil", size, wgpu::TextureFormat::R8Uint)
                    .with_usage(usage),
            ),
        }
    }

    fn clear(&self, ctx: &mut dyn RenderContext) -> Result<()> {
        ctx.clear_texture(self.min, Vec4::splat(RAY_MIN_CLEAR))?;
        ctx.clear_texture(self.max, Vec4::ZERO)?;
        ctx.clear_texture(self.access, Vec4::ZERO)
    }

    fn destroy(self, ctx: &mut dyn RenderContext) {
        ctx.destroy_texture(self.min);
        ctx.destroy_texture(self.max);
        ctx.destroy_texture(self.access);
    }
}

pub struct SvaoPass {
    // === Configuration ===
    enabled: bool,
    primary_mode: DepthMode,
    secondary_mode: DepthMode,
    ray_pipeline: bool,
    stoch_map_divisor: u32,
    dual_ao: bool,
    alpha_test: bool,
    stochastic_impl: StochasticDepthImpl,
    prevent_dark_halos: bool,
    trace_out_of_screen: bool,
    trace_double_on_double: bool,
    classify_probability: f32,
    params: ParamBlock<VaoData>,

    // === Programs ===
    state: SvaoState,
    vars: ProgramVars,
    pass1: ProgramSlot,
    pass2: ProgramSlot,
    pass2_ray: ProgramSlot,
    scene: Option<Arc<Scene>>,

    // === Stochastic depth ===
    stochastic: Option<Box<dyn StochasticDepth>>,
    interval: Option<RayInterval>,

    export_dir: Option<PathBuf>,
    warned_no_ray_tracing: bool,
    logged_stochastic_pipeline: bool,
}

impl Default for SvaoPass {
    fn default() -> Self {
        Self {
            enabled: true,
            primary_mode: DepthMode::SingleDepth,
            secondary_mode: DepthMode::Raytraced,
            ray_pipeline: true,
            stoch_map_divisor: 1,
            dual_ao: false,
            alpha_test: true,
            stochastic_impl: StochasticDepthImpl::Raster,
            prevent_dark_halos: true,
            trace_out_of_screen: true,
            trace_double_on_double: true,
            classify_probability: 0.5,
            params: ParamBlock::new(VaoData::default()),
            state: SvaoState::Uncompiled,
            vars: ProgramVars::new(),
            pass1: ProgramSlot::Uncompiled,
            pass2: ProgramSlot::Uncompiled,
            pass2_ray: ProgramSlot::Uncompiled,
            scene: None,
            stochastic: None,
            interval: None,
            export_dir: None,
            warned_no_ray_tracing: false,
            logged_stochastic_pipeline: false,
        }
    }
}

impl SvaoPass {
    pub const TYPE_NAME: &'static str = "SVAO";

    pub fn from_properties(props: &Properties) -> Result<Self> {
        let mut pass = Self::default();
        for (key, value) in props.iter() {
            match key {
                "enabled" => pass.set_enabled(Properties::parse_bool(key, value)?),
                "radius" => pass.set_radius(Properties::parse_f32(key, value)?),
                "primaryDepthMode" => pass.set_primary_depth_mode(Properties::parse(key, value)?),
                "secondaryDepthMode" => {
                    pass.set_secondary_depth_mode(Properties::parse(key, value)?);
                }
                "exponent" => pass.set_exponent(Properties::parse_f32(key, value)?),
                "rayPipeline" => pass.set_ray_pipeline(Properties::parse_bool(key, value)?),
                "thickness" => pass.set_thickness(Properties::parse_f32(key, value)?),
                "stochMapDivisor" => {
                    pass.set_stoch_map_divisor(Properties::parse_u32(key, value)?);
                }
                "dualAO" => pass.set_dual_ao(Properties::parse_bool(key, value)?),
                "alphaTest" => pass.set_alpha_test(Properties::parse_bool(key, value)?),
                "stochasticImpl" => pass.set_stochastic_impl(Properties::parse(key, value)?),
                "preventDarkHalos" => {
                    pass.prevent_dark_halos = Properties::parse_bool(key, value)?;
                }
                "traceOutOfScreen" => {
                    pass.trace_out_of_screen = Properties::parse_bool(key, value)?;
                }
                "traceDoubleOnDouble" => {
                    pass.trace_double_on_double = Properties::parse_bool(key, value)?;
                }
                "classifyProbability" => {
                    pass.set_classify_probability(Properties::parse_f32(key, value)?);
                }
                _ => warn_unknown_property(Self::TYPE_NAME, key),
            }
        }
        Ok(pass)
    }

    // ========================================================================
    // Setters
    // ========================================================================

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.state = if enabled {
            SvaoState::Uncompiled
        } else {
            SvaoState::Disabled
        };
    }

    pub fn set_radius(&mut self, radius: f32) {
        if radius.is_finite() && radius > 0.0 {
            self.params.write().radius = radius;
        }
    }

    pub fn set_exponent(&mut self, exponent: f32) {
        if exponent.is_finite() && exponent > 0.0 {
            self.params.write().exponent = exponent;
        }
    }

    pub fn set_thickness(&mut self, thickness: f32) {
        if thickness.is_finite() && thickness > 0.0 {
            self.params.write().thickness = thickness;
        }
    }

    pub fn set_classify_probability(&mut self, p: f32) {
        self.classify_probability = p.clamp(1e-4, 1.0 - 1e-4);
        self.params.write().classify_threshold = classify_threshold(self.classify_probability);
    }

    pub fn set_primary_depth_mode(&mut self, mode: DepthMode) {
        self.primary_mode = mode;
        self.invalidate();
    }

    pub fn set_secondary_depth_mode(&mut self, mode: DepthMode) {
        self.secondary_mode = mode;
        self.invalidate();
    }

    pub fn set_stochastic_impl(&mut self, implementation: StochasticDepthImpl) {
        self.stochastic_impl = implementation;
        self.invalidate();
    }

    pub fn set_dual_ao(&mut self, dual_ao: bool) {
        self.dual_ao = dual_ao;
        self.invalidate();
    }

    pub fn set_alpha_test(&mut self, alpha_test: bool) {
        self.alpha_test = alpha_test;
        self.invalidate();
    }

    pub fn set_ray_pipeline(&mut self, enabled: bool) {
        self.ray_pipeline = enabled;
        self.warned_no_ray_tracing = false;
        self.logged_stochastic_pipeline = false;
    }

    /// Clamped to at least 1. The stochastic targets follow at the next
    /// execute.
    pub fn set_stoch_map_divisor(&mut self, divisor: u32) {
        self.stoch_map_divisor = divisor.max(1);
    }

    /// Dumps `ao` and `stencil` after the next execute.
    pub fn request_export(&mut self, dir: impl Into<PathBuf>) {
        self.export_dir = Some(dir.into());
    }

    fn invalidate(&mut self) {
        if self.state != SvaoState::Disabled {
            self.state = SvaoState::Uncompiled;
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn state(&self) -> SvaoState {
        self.state
    }

    #[must_use]
    pub fn params(&self) -> &VaoData {
        self.params.read()
    }

    /// Target of the owned stochastic depth source, once acquired.
    #[must_use]
    pub fn stochastic_target(&self) -> Option<Texture> {
        self.stochastic.as_ref().and_then(|sd| sd.target())
    }

    #[must_use]
    pub fn stochastic_sample_count(&self) -> Option<u32> {
        self.stochastic.as_ref().map(|sd| sd.sample_count())
    }

    fn ao_format(&self) -> wgpu::TextureFormat {
        if self.dual_ao {
            wgpu::TextureFormat::Rg8Unorm
        } else {
            wgpu::TextureFormat::R8Unorm
        }
    }

    // ========================================================================
    // Rebuild
    // ========================================================================

    fn validate(&self) -> Result<()> {
        let unsupported = |mode: DepthMode| AoError::UnsupportedDepthMode {
            pass: Self::TYPE_NAME.to_string(),
            mode: mode.name().to_string(),
        };
        match self.primary_mode {
            DepthMode::SingleDepth | DepthMode::DualDepth | DepthMode::PerfectClassify => {}
            other => return Err(unsupported(other)),
        }
        match self.secondary_mode {
            DepthMode::SingleDepth
            | DepthMode::DualDepth
            | DepthMode::StochasticDepth
            | DepthMode::Raytraced => Ok(()),
            other => Err(unsupported(other)),
        }
    }

    fn create_stochastic(&self) -> Result<Box<dyn StochasticDepth>> {
        Ok(match self.stochastic_impl {
            StochasticDepthImpl::Raster => Box::new(StochasticDepthRaster::from_properties(
                &Properties::new()
                    .with("SampleCount", 8u32)
                    .with("Alpha", 0.2f32)
                    .with("linearize", true)
                    .with("depthFormat", DepthFormat::D24UnormS8)
                    .with("AlphaTest", self.alpha_test),
            )?),
            StochasticDepthImpl::Ray => Box::new(StochasticDepthRay::from_properties(
                &Properties::new()
                    .with("SampleCount", 4u32)
                    .with("normalize", true)
                    .with("AlphaTest", self.alpha_test),
            )?),
        })
    }

    fn rebuild(&mut self, ctx: &mut dyn RenderContext) -> Result<()> {
        self.validate()?;
        self.state = SvaoState::Compiling;

        {
            let params = self.params.write();
            if params.kernel_size != SVAO_KERNEL_SIZE {
                params.set_kernel(&generate_vao_kernel(
                    SVAO_KERNEL_SIZE,
                    SampleDistribution::VanDerCorput,
                ));
            }
            params.classify_threshold = classify_threshold(self.classify_probability);
        }
        self.pass1.invalidate();
        self.pass2.invalidate();
        self.pass2_ray.invalidate();

        if let Some(mut old) = self.stochastic.take() {
            old.release(ctx);
        }
        if let Some(interval) = self.interval.take() {
            interval.destroy(ctx);
        }
        self.vars
            .set_texture_opt("stochasticDepth", None)
            .set_texture_opt("rayMin", None)
            .set_texture_opt("rayMax", None)
            .set_texture_opt("accessStencil", None);
        if self.secondary_mode == DepthMode::StochasticDepth {
            let mut sd = self.create_stochastic()?;
            sd.rebuild(ctx)?;
            sd.update_scene(ctx, self.scene.clone());
            log::debug!(
                "{}: stochastic depth source {:?} with {} samples",
                Self::TYPE_NAME,
                self.stochastic_impl,
                sd.sample_count()
            );
            self.stochastic = Some(sd);
        }

        self.state = SvaoState::Ready;
        Ok(())
    }

    fn defines(&self) -> ShaderDefines {
        let stochastic = self.secondary_mode == DepthMode::StochasticDepth;
        let mut defines = ShaderDefines::new()
            .with("PRIMARY_DEPTH_MODE", self.primary_mode.define_value())
            .with("SECONDARY_DEPTH_MODE", self.secondary_mode.define_value())
            .with("DUAL_AO", self.dual_ao)
            .with("USE_ALPHA_TEST", self.alpha_test)
            .with("USE_RAY_INTERVAL", stochastic)
            .with("STOCHASTIC_IMPL", self.stochastic_impl.define_value())
            .with("PREVENT_DARK_HALOS", self.prevent_dark_halos)
            .with("TRACE_OUT_OF_SCREEN", self.trace_out_of_screen)
            .with("TRACE_DOUBLE_ON_DOUBLE", self.trace_double_on_double);
        if let Some(sd) = &self.stochastic {
            defines.set("NUM_SAMPLES", sd.sample_count());
            defines.set("STOCHASTIC_ENCODING", sd.encoding().define_value());
        }
        match &self.scene {
            Some(scene) => defines.merged_with(&scene.shader_defines()),
            None => defines,
        }
    }

    /// Interval textures at `size`, recreated when the size changed.
    fn ensure_interval(&mut self, ctx: &mut dyn RenderContext, size: UVec2) -> RayInterval {
        match self.interval {
            Some(interval) if interval.min.size() == size => interval,
            stale => {
                if let Some(old) = stale {
                    old.destroy(ctx);
                }
                log::debug!("{}: ray interval resized to {}x{}", Self::TYPE_NAME, size.x, size.y);
                let interval = RayInterval::create(ctx, size);
                self.interval = Some(interval);
                interval
            }
        }
    }

    fn export(
        &mut self,
        ctx: &dyn RenderContext,
        frame: &FrameContext,
        ao: Texture,
        stencil: Texture,
    ) -> Result<()> {
        if let Some(dir) = self.export_dir.take() {
            export_textures(
                ctx,
                &dir,
                Self::TYPE_NAME,
                frame.frame_index,
                &[("ao", ao), ("stencil", stencil)],
            )?;
        }
        Ok(())
    }
}

impl RenderPass for SvaoPass {
    fn name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn properties(&self) -> Properties {
        let params = self.params.read();
        Properties::new()
            .with("enabled", self.enabled)
            .with("radius", params.radius)
            .with("primaryDepthMode", self.primary_mode)
            .with("secondaryDepthMode", self.secondary_mode)
            .with("exponent", params.exponent)
            .with("rayPipeline", self.ray_pipeline)
            .with("thickness", params.thickness)
            .with("stochMapDivisor", self.stoch_map_divisor)
            .with("dualAO", self.dual_ao)
            .with("alphaTest", self.alpha_test)
            .with("stochasticImpl", self.stochastic_impl)
            .with("preventDarkHalos", self.prevent_dark_halos)
            .with("traceOutOfScreen", self.trace_out_of_screen)
            .with("traceDoubleOnDouble", self.trace_double_on_double)
            .with("classifyProbability", self.classify_probability)
    }

    fn reflect(&self, data: &CompileData) -> Result<RenderPassReflection> {
        let mut r = RenderPassReflection::new();
        r.add_input("gbufferDepth", "Non-linear primary depth").optional();
        r.add_input("depth", "Linear depth");
        r.add_input("depth2", "Second linear depth layer").optional();
        r.add_input("normals", "World-space normals");
        r.add_input("doubleSided", "Double-sided material flags").optional();

        let size = data.connected("depth").map(|d| d.size());
        let ao = r.add_output("ao", "Ambient occlusion").format(self.ao_format());
        if let Some(size) = size {
            ao.size(size);
        }
        let stencil = r
            .add_output("stencil", "Per-sample refinement bits")
            .format(wgpu::TextureFormat::R8Uint);
        if let Some(size) = size {
            stencil.size(size);
        }
        Ok(r)
    }

    fn compile(&mut self, ctx: &mut dyn RenderContext, data: &CompileData) -> Result<()> {
        if !self.enabled {
            self.state = SvaoState::Disabled;
            return Ok(());
        }
        self.validate()?;
        if self.secondary_mode == DepthMode::StochasticDepth
            && self.stochastic_impl == StochasticDepthImpl::Raster
            && data.connected("gbufferDepth").is_none()
        {
            return Err(AoError::MissingReflection {
                pass: Self::TYPE_NAME.to_string(),
                field: "gbufferDepth".into(),
            });
        }
        self.params.mark_dirty();
        self.rebuild(ctx)
    }

    fn execute(
        &mut self,
        ctx: &mut dyn RenderContext,
        data: &RenderData,
        frame: &mut FrameContext,
    ) -> Result<()> {
        let ao = data.required("ao")?;
        let stencil = data.required("stencil")?;
        if self.state == SvaoState::Disabled {
            return ctx.clear_texture(ao, Vec4::ONE);
        }
        if self.state == SvaoState::Uncompiled {
            self.rebuild(ctx)?;
        }

        // === Parameters ===
        let resolution = ao.size();
        let guard_band = frame.guard_band_size();
        {
            let current = self.params.read();
            if current.resolution.as_uvec2() != resolution || current.guard_band != guard_band {
                let params = self.params.write();
                params.set_resolution(resolution);
                params.guard_band = guard_band;
            }
        }
        if self.params.take_dirty() {
            log::debug!("{}: constants uploaded", Self::TYPE_NAME);
            let params = *self.params.read();
            self.vars.set_constants("VaoCB", &params);
            ctx.clear_texture(ao, Vec4::ZERO)?;
        }
        ctx.clear_texture(stencil, Vec4::ZERO)?;

        let defines = self.defines();
        let uses_depth2 = self.primary_mode.uses_depth2() || self.secondary_mode.uses_depth2();
        self.vars
            .set_scene(self.scene.clone())
            .set_texture("depth", data.required("depth")?)
            .set_texture("normals", data.required("normals")?)
            .set_texture_opt("depth2", data.get("depth2").filter(|_| uses_depth2))
            .set_texture_opt("doubleSided", data.get("doubleSided"))
            .set_texture("ao", ao)
            .set_texture("stencil", stencil);

        // === Ray interval ===
        // Last frame's stochastic map may have been resized or released.
        self.vars.set_texture_opt("stochasticDepth", None);
        let stochastic_size = div_ceil_uvec2(resolution, self.stoch_map_divisor);
        let interval = if self.secondary_mode == DepthMode::StochasticDepth {
            let interval = self.ensure_interval(ctx, stochastic_size);
            interval.clear(ctx)?;
            Some(interval)
        } else {
            None
        };
        self.vars
            .set_texture_opt("rayMin", interval.map(|i| i.min))
            .set_texture_opt("rayMax", interval.map(|i| i.max))
            .set_texture_opt("accessStencil", interval.map(|i| i.access));

        // === Pass 1 ===
        let program = self
            .pass1
            .ensure(ctx, ProgramDesc::compute(programs::SVAO_PASS1, defines.clone()))?;
        let inner = resolution.saturating_sub(UVec2::splat(guard_band.saturating_mul(2)));
        let threads = UVec2::new(align_up(inner.x, 32), align_up(inner.y, 32));
        ctx.dispatch(program, &self.vars, (threads / 8).extend(1))?;

        if self.secondary_mode == DepthMode::SingleDepth {
            return self.export(ctx, frame, ao, stencil);
        }

        // === Stochastic depth ===
        if let (Some(sd), Some(interval)) = (self.stochastic.as_mut(), interval) {
            let depth = match self.stochastic_impl {
                StochasticDepthImpl::Raster => data.required("gbufferDepth")?,
                StochasticDepthImpl::Ray => data.required("depth")?,
            };
            sd.resize(ctx, stochastic_size);
            let map = sd.acquire(
                ctx,
                &StochasticDepthInputs {
                    depth,
                    stencil_mask: Some(interval.access),
                    ray_min: Some(interval.min),
                    ray_max: Some(interval.max),
                },
            )?;
            self.vars.set_texture("stochasticDepth", map);
        }

        // === Pass 2 ===
        let hardware = ctx.supports_ray_tracing();
        if self.secondary_mode == DepthMode::Raytraced && self.ray_pipeline && hardware {
            let program = self
                .pass2_ray
                .ensure(ctx, ProgramDesc::ray_tracing(programs::SVAO_PASS2_RAY, defines))?;
            ctx.trace_rays(program, &self.vars, resolution.extend(1))?;
        } else {
            if self.ray_pipeline {
                if self.secondary_mode == DepthMode::Raytraced && !self.warned_no_ray_tracing {
                    log::warn!(
                        "{}: ray tracing unavailable, refining with the compute pass",
                        Self::TYPE_NAME
                    );
                    self.warned_no_ray_tracing = true;
                } else if self.secondary_mode == DepthMode::StochasticDepth
                    && !self.logged_stochastic_pipeline
                {
                    log::debug!(
                        "{}: rayPipeline has no effect with StochasticDepth",
                        Self::TYPE_NAME
                    );
                    self.logged_stochastic_pipeline = true;
                }
            }
            let program = self
                .pass2
                .ensure(ctx, ProgramDesc::compute(programs::SVAO_PASS2, defines))?;
            let groups = div_ceil_uvec2(resolution, 8);
            ctx.dispatch(program, &self.vars, UVec3::new(groups.x, groups.y, 1))?;
        }

        self.export(ctx, frame, ao, stencil)
    }

    fn set_scene(&mut self, ctx: &mut dyn RenderContext, scene: Option<Arc<Scene>>) {
        self.scene = scene.clone();
        self.pass1.invalidate();
        self.pass2.invalidate();
        self.pass2_ray.invalidate();
        if let Some(sd) = self.stochastic.as_mut() {
            sd.update_scene(ctx, scene);
        }
    }
}
