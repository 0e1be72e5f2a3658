//! Rasterized stochastic depth.
//!
//! One scene rasterization into an `N`-sample depth target. Every fragment
//! behind the primary surface claims a subset of the samples; the depth
//! test keeps, per sample, the nearest fragment that claimed it.
//!
//! # Properties
//!
//! | Key                 | Type        | Default        |
//! |---------------------|-------------|----------------|
//! | `SampleCount`       | `u32` 1..16 | 8              |
//! | `Alpha`             | `f32`       | 0.2            |
//! | `CullMode`          | `CullMode`  | `Back`         |
//! | `linearize`         | `bool`      | `true`         |
//! | `depthFormat`       | `DepthFormat`| `D32Float`    |
//! | `ReservoirSampling` | `bool`      | `false`        |
//! | `AlphaTest`         | `bool`      | `true`         |

use std::sync::Arc;

use glam::{UVec2, Vec4};

use crate::errors::{AoError, Result};
use crate::renderer::core::context::RenderContext;
use crate::renderer::core::program::{ProgramDesc, ProgramSlot};
use crate::renderer::core::state::{GraphicsState, RenderTargets, SamplePositions, StencilTest};
use crate::renderer::core::texture::{BufferId, Texture, TextureDesc, has_stencil};
use crate::renderer::core::vars::ProgramVars;
use crate::renderer::graph::{CompileData, FrameContext, RenderData, RenderPass, RenderPassReflection};
use crate::renderer::passes::warn_unknown_property;
use crate::renderer::programs;
use crate::resources::{
    CullMode, DepthEncoding, DepthFormat, Properties, ShaderDefines, StratifiedTable,
};
use crate::scene::Scene;

use super::{StochasticDepth, StochasticDepthInputs, TargetSlot};

/// Largest supported per-pixel sample count.
pub const MAX_RASTER_SAMPLES: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterState {
    Uninitialized,
    Compiled,
    Ready,
}

pub struct StochasticDepthRaster {
    // === Configuration ===
    sample_count: u32,
    alpha: f32,
    cull_mode: CullMode,
    linearize: bool,
    depth_format: DepthFormat,
    reservoir_sampling: bool,
    alpha_test: bool,

    // === State ===
    state: RasterState,
    table: StratifiedTable,
    table_buffer: Option<BufferId>,
    sample_positions: SamplePositions,
    raster_program: ProgramSlot,
    stencil_program: ProgramSlot,
    scene: Option<Arc<Scene>>,

    // === Resources ===
    target: TargetSlot,
    counter: Option<Texture>,
    warned_no_stencil: bool,
}

impl Default for StochasticDepthRaster {
    fn default() -> Self {
        Self {
            sample_count: 8,
            alpha: 0.2,
            cull_mode: CullMode::Back,
            linearize: true,
            depth_format: DepthFormat::D32Float,
            reservoir_sampling: false,
            alpha_test: true,
            state: RasterState::Uninitialized,
            table: StratifiedTable::generate(8),
            table_buffer: None,
            sample_positions: SamplePositions::Standard,
            raster_program: ProgramSlot::Uncompiled,
            stencil_program: ProgramSlot::Uncompiled,
            scene: None,
            target: TargetSlot::None,
            counter: None,
            warned_no_stencil: false,
        }
    }
}

impl StochasticDepthRaster {
    pub const TYPE_NAME: &'static str = "StochasticDepthMap";

    pub fn from_properties(props: &Properties) -> Result<Self> {
        let mut pass = Self::default();
        for (key, value) in props.iter() {
            match key {
                "SampleCount" => pass.set_sample_count(Properties::parse_u32(key, value)?)?,
                "Alpha" => pass.alpha = Properties::parse_f32(key, value)?,
                "CullMode" => pass.cull_mode = Properties::parse(key, value)?,
                "linearize" => pass.linearize = Properties::parse_bool(key, value)?,
                "depthFormat" => pass.depth_format = Properties::parse(key, value)?,
                "ReservoirSampling" => pass.reservoir_sampling = Properties::parse_bool(key, value)?,
                "AlphaTest" => pass.alpha_test = Properties::parse_bool(key, value)?,
                _ => warn_unknown_property(Self::TYPE_NAME, key),
            }
        }
        Ok(pass)
    }

    /// Changes `N`; takes effect at the next rebuild.
    pub fn set_sample_count(&mut self, count: u32) -> Result<()> {
        if !(1..=MAX_RASTER_SAMPLES).contains(&count) {
            return Err(AoError::UnsupportedSampleCount {
                pass: Self::TYPE_NAME.to_string(),
                count,
            });
        }
        if count != self.sample_count {
            self.sample_count = count;
            self.state = RasterState::Uninitialized;
        }
        Ok(())
    }

    pub fn set_depth_format(&mut self, format: DepthFormat) {
        self.depth_format = format;
        self.warned_no_stencil = false;
    }

    pub fn set_linearize(&mut self, linearize: bool) {
        self.linearize = linearize;
        self.raster_program.invalidate();
    }

    #[must_use]
    pub fn state(&self) -> RasterState {
        self.state
    }

    #[must_use]
    pub fn table(&self) -> &StratifiedTable {
        &self.table
    }

    #[must_use]
    pub fn sample_positions(&self) -> SamplePositions {
        self.sample_positions
    }

    fn missing_scene() -> AoError {
        AoError::MissingResource {
            pass: Self::TYPE_NAME.to_string(),
            name: "scene".into(),
        }
    }

    fn raster_desc(&self, scene: &Scene, ray_interval: bool) -> ProgramDesc {
        let defines = ShaderDefines::new()
            .with("NUM_SAMPLES", self.sample_count)
            .with("ALPHA", self.alpha)
            .with("RESERVOIR_SAMPLING", self.reservoir_sampling)
            .with("USE_ALPHA_TEST", self.alpha_test)
            .with("LINEARIZE", self.linearize)
            .with("USE_RAY_INTERVAL", ray_interval);
        ProgramDesc::raster(programs::STOCHASTIC_RASTER, defines).with_defines(&scene.shader_defines())
    }

    /// Per-pixel reservoir counters at the target size, cleared.
    fn prepare_counter(&mut self, ctx: &mut dyn RenderContext, size: UVec2) -> Result<Texture> {
        let counter = match self.counter {
            Some(c) if c.size() == size && ctx.is_texture_alive(c) => c,
            stale => {
                if let Some(c) = stale {
                    ctx.destroy_texture(c);
                }
                let c = ctx.create_texture(
                    TextureDesc::new_2d("stochasticCounter", size, wgpu::TextureFormat::R32Uint)
                        .with_usage(wgpu::TextureUsages::STORAGE_BINDING),
                );
                self.counter = Some(c);
                c
            }
        };
        ctx.clear_texture(counter, Vec4::ZERO)?;
        Ok(counter)
    }

    fn write_stencil_mask(
        &mut self,
        ctx: &mut dyn RenderContext,
        target: Texture,
        mask: Texture,
    ) -> Result<()> {
        let program = self.stencil_program.get_or_create(ctx, || {
            ProgramDesc::fullscreen(programs::STOCHASTIC_STENCIL, ShaderDefines::new())
        })?;
        let mut vars = ProgramVars::new();
        vars.set_texture("stencilMask", mask);
        let state = GraphicsState::default()
            .with_cull(None)
            .with_stencil(StencilTest {
                compare: wgpu::CompareFunction::Always,
                reference: 1,
                pass_op: wgpu::StencilOperation::Replace,
            });
        ctx.draw_fullscreen(program, &vars, &RenderTargets::depth(target), &state)
    }
}

impl StochasticDepth for StochasticDepthRaster {
    fn sample_count(&self) -> u32 {
        self.sample_count
    }

    fn encoding(&self) -> DepthEncoding {
        if self.linearize {
            DepthEncoding::NormalizedLinear
        } else {
            DepthEncoding::Hardware
        }
    }

    fn rebuild(&mut self, ctx: &mut dyn RenderContext) -> Result<()> {
        self.raster_program.invalidate();
        self.stencil_program.invalidate();
        self.table = StratifiedTable::generate(self.sample_count);
        let data = self.table.to_buffer();
        match self.table_buffer {
            Some(buffer) => ctx.write_buffer(buffer, &data)?,
            None => self.table_buffer = Some(ctx.create_buffer("stratifiedTable", &data)),
        }
        // Sample i must sit where coverage bit i is tested.
        self.sample_positions = SamplePositions::PixelCenter;
        self.state = RasterState::Compiled;
        Ok(())
    }

    fn update_scene(&mut self, _ctx: &mut dyn RenderContext, scene: Option<Arc<Scene>>) {
        self.scene = scene;
        self.raster_program.invalidate();
    }

    fn resize(&mut self, ctx: &mut dyn RenderContext, size: UVec2) {
        let desc = TextureDesc::new_2d("stochasticDepth", size, self.depth_format.texture_format())
            .with_samples(self.sample_count)
            .with_usage(
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            );
        if let TargetSlot::Owned(t) = self.target
            && t.desc == desc
        {
            return;
        }
        self.target.release(ctx);
        log::debug!("{}: target resized to {}x{}", Self::TYPE_NAME, size.x, size.y);
        self.target = TargetSlot::Owned(ctx.create_texture(desc));
    }

    fn target(&self) -> Option<Texture> {
        self.target.texture()
    }

    fn acquire(
        &mut self,
        ctx: &mut dyn RenderContext,
        inputs: &StochasticDepthInputs,
    ) -> Result<Texture> {
        if self.state == RasterState::Uninitialized {
            self.rebuild(ctx)?;
        }
        let scene = self.scene.clone().ok_or_else(Self::missing_scene)?;
        if self.target.texture().is_none() {
            self.resize(ctx, inputs.depth.size());
        }
        let target = self.target.texture().ok_or(AoError::InvalidTexture)?;

        let mut mask = inputs.stencil_mask.or(inputs.ray_max);
        if mask.is_some() && !has_stencil(target.format()) {
            if !self.warned_no_stencil {
                log::warn!(
                    "{}: {:?} has no stencil aspect, stencil mask ignored",
                    Self::TYPE_NAME,
                    target.format()
                );
                self.warned_no_stencil = true;
            }
            mask = None;
        }

        ctx.clear_depth_stencil(target, Some(1.0), mask.map(|_| 0))?;
        if let Some(mask) = mask {
            self.write_stencil_mask(ctx, target, mask)?;
        }
        let counter = if self.reservoir_sampling {
            Some(self.prepare_counter(ctx, target.size())?)
        } else {
            None
        };

        let ray_interval = inputs.ray_min.is_some() && inputs.ray_max.is_some();
        let desc = self.raster_desc(&scene, ray_interval);
        let program = self.raster_program.ensure(ctx, desc)?;

        let mut vars = ProgramVars::new();
        vars.set_scene(Some(scene))
            .set_texture("depth", inputs.depth)
            .set_texture_opt("counter", counter);
        if ray_interval {
            vars.set_texture_opt("rayMin", inputs.ray_min)
                .set_texture_opt("rayMax", inputs.ray_max);
        }
        if let Some(buffer) = self.table_buffer {
            vars.set_buffer("stratifiedTable", buffer);
        }

        let mut state = GraphicsState::default()
            .with_depth(wgpu::CompareFunction::Less, true)
            .with_cull(self.cull_mode.to_face());
        state.sample_positions = self.sample_positions;
        if mask.is_some() {
            state = state.with_stencil(StencilTest {
                compare: wgpu::CompareFunction::NotEqual,
                reference: 0,
                pass_op: wgpu::StencilOperation::Keep,
            });
        }
        ctx.rasterize_scene(program, &vars, &RenderTargets::depth(target), &state)?;
        self.state = RasterState::Ready;
        Ok(target)
    }

    fn release(&mut self, ctx: &mut dyn RenderContext) {
        self.target.release(ctx);
        if let Some(c) = self.counter.take() {
            ctx.destroy_texture(c);
        }
        if let Some(b) = self.table_buffer.take() {
            ctx.destroy_buffer(b);
        }
        self.state = RasterState::Uninitialized;
    }
}

impl RenderPass for StochasticDepthRaster {
    fn name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .with("SampleCount", self.sample_count)
            .with("Alpha", self.alpha)
            .with("CullMode", self.cull_mode)
            .with("linearize", self.linearize)
            .with("depthFormat", self.depth_format)
            .with("ReservoirSampling", self.reservoir_sampling)
            .with("AlphaTest", self.alpha_test)
    }

    fn reflect(&self, data: &CompileData) -> Result<RenderPassReflection> {
        let mut r = RenderPassReflection::new();
        r.add_input("depth", "Primary non-linear depth");
        r.add_input("stencilMask", "Pixels to sample").optional();
        r.add_input("rayMin", "Nearest depth worth sampling").optional();
        r.add_input("rayMax", "Farthest depth worth sampling").optional();
        let output = r
            .add_output("stochasticDepth", "Stochastic depth layers")
            .format(self.depth_format.texture_format())
            .samples(self.sample_count);
        if let Some(depth) = data.connected("depth") {
            output.size(depth.size());
        }
        Ok(r)
    }

    fn compile(&mut self, ctx: &mut dyn RenderContext, _data: &CompileData) -> Result<()> {
        self.rebuild(ctx)
    }

    fn execute(
        &mut self,
        ctx: &mut dyn RenderContext,
        data: &RenderData,
        _frame: &mut FrameContext,
    ) -> Result<()> {
        if matches!(self.target, TargetSlot::Owned(_)) {
            self.target.release(ctx);
        }
        self.target = TargetSlot::Borrowed(data.required("stochasticDepth")?);
        let inputs = StochasticDepthInputs {
            depth: data.required("depth")?,
            stencil_mask: data.get("stencilMask"),
            ray_min: data.get("rayMin"),
            ray_max: data.get("rayMax"),
        };
        self.acquire(ctx, &inputs)?;
        Ok(())
    }

    fn set_scene(&mut self, ctx: &mut dyn RenderContext, scene: Option<Arc<Scene>>) {
        self.update_scene(ctx, scene);
    }
}
