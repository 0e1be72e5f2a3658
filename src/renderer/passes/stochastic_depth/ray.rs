//! Ray-traced stochastic depth.
//!
//! One camera ray per pixel collects the surfaces behind the primary one
//! and writes up to four of them into the channels of a color target. The
//! ray-generation program needs hardware ray tracing; without it the same
//! work runs as a compute program issuing inline ray queries.

use std::sync::Arc;

use glam::{UVec2, UVec3};

use crate::errors::{AoError, Result};
use crate::renderer::core::context::RenderContext;
use crate::renderer::core::program::{ProgramDesc, ProgramSlot};
use crate::renderer::core::texture::{BufferId, Texture, TextureDesc};
use crate::renderer::core::vars::ProgramVars;
use crate::renderer::graph::{CompileData, FrameContext, RenderData, RenderPass, RenderPassReflection};
use crate::renderer::passes::warn_unknown_property;
use crate::renderer::programs;
use crate::resources::{
    CullMode, DepthEncoding, Properties, RayImplementation, ShaderDefines, StratifiedTable,
};
use crate::scene::Scene;
use crate::utils::div_ceil_uvec2;

use super::{StochasticDepth, StochasticDepthInputs, TargetSlot};

pub struct StochasticDepthRay {
    sample_count: u32,
    cull_mode: CullMode,
    normalize: bool,
    use_ray_pipeline: bool,
    alpha_test: bool,
    use_16_bit: bool,
    store_normals: bool,
    jitter: bool,
    implementation: RayImplementation,
    alpha: f32,
    ray_interval: bool,

    program: ProgramSlot,
    scene: Option<Arc<Scene>>,
    target: TargetSlot,
    alpha_mask: Option<BufferId>,
    table_buffer: Option<BufferId>,
    /// Sample count `table_buffer` was generated for.
    table_samples: u32,
    warned_fallback: bool,
}

impl Default for StochasticDepthRay {
    fn default() -> Self {
        Self {
            sample_count: 4,
            cull_mode: CullMode::Back,
            normalize: true,
            use_ray_pipeline: true,
            alpha_test: true,
            use_16_bit: false,
            store_normals: false,
            jitter: false,
            implementation: RayImplementation::Default,
            alpha: 0.2,
            ray_interval: true,
            program: ProgramSlot::Uncompiled,
            scene: None,
            target: TargetSlot::None,
            alpha_mask: None,
            table_buffer: None,
            table_samples: 0,
            warned_fallback: false,
        }
    }
}

impl StochasticDepthRay {
    pub const TYPE_NAME: &'static str = "StochasticDepthMapRT";

    pub fn from_properties(props: &Properties) -> Result<Self> {
        let mut pass = Self::default();
        for (key, value) in props.iter() {
            match key {
                "SampleCount" => pass.set_sample_count(Properties::parse_u32(key, value)?)?,
                "CullMode" => pass.cull_mode = Properties::parse(key, value)?,
                "normalize" => pass.normalize = Properties::parse_bool(key, value)?,
                "useRayPipeline" => pass.use_ray_pipeline = Properties::parse_bool(key, value)?,
                "AlphaTest" => pass.alpha_test = Properties::parse_bool(key, value)?,
                "Use16Bit" => pass.use_16_bit = Properties::parse_bool(key, value)?,
                "StoreNormals" => pass.store_normals = Properties::parse_bool(key, value)?,
                "Jitter" => pass.jitter = Properties::parse_bool(key, value)?,
                "Implementation" => pass.implementation = Properties::parse(key, value)?,
                "Alpha" => pass.alpha = Properties::parse_f32(key, value)?,
                "RayInterval" => pass.ray_interval = Properties::parse_bool(key, value)?,
                _ => warn_unknown_property(Self::TYPE_NAME, key),
            }
        }
        Ok(pass)
    }

    /// Only 1, 2 and 4 layers fit the channel layout of the target.
    pub fn set_sample_count(&mut self, count: u32) -> Result<()> {
        if !matches!(count, 1 | 2 | 4) {
            return Err(AoError::UnsupportedSampleCount {
                pass: Self::TYPE_NAME.to_string(),
                count,
            });
        }
        self.sample_count = count;
        self.program.invalidate();
        Ok(())
    }

    pub fn set_normalize(&mut self, normalize: bool) {
        self.normalize = normalize;
        self.program.invalidate();
    }

    pub fn set_use_ray_pipeline(&mut self, enabled: bool) {
        self.use_ray_pipeline = enabled;
        self.warned_fallback = false;
    }

    pub fn set_implementation(&mut self, implementation: RayImplementation) {
        self.implementation = implementation;
        self.program.invalidate();
    }

    /// Target format for the current sample count and precision.
    #[must_use]
    pub fn output_format(&self) -> wgpu::TextureFormat {
        use wgpu::TextureFormat as F;
        match (self.sample_count, self.use_16_bit) {
            (1, false) => F::R32Float,
            (2, false) => F::Rg32Float,
            (_, false) => F::Rgba32Float,
            (1, true) => F::R16Float,
            (2, true) => F::Rg16Float,
            (_, true) => F::Rgba16Float,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.store_normals {
            return Err(AoError::UnsupportedFeature {
                pass: Self::TYPE_NAME.to_string(),
                feature: "StoreNormals".into(),
            });
        }
        Ok(())
    }

    fn defines(&self, scene: &Scene, ray_interval: bool) -> ShaderDefines {
        ShaderDefines::new()
            .with("NUM_SAMPLES", self.sample_count)
            .with("ALPHA", self.alpha)
            .with("IMPLEMENTATION", self.implementation.define_value())
            .with("NORMALIZE", self.normalize)
            .with("USE_ALPHA_TEST", self.alpha_test)
            .with("JITTER", self.jitter)
            .with("USE_RAY_INTERVAL", ray_interval)
            .with("CULL_MODE", self.cull_mode.define_value())
            .merged_with(&scene.shader_defines())
    }

    fn upload_alpha_mask(&mut self, ctx: &mut dyn RenderContext) {
        let Some(scene) = &self.scene else {
            return;
        };
        let mask = scene.alpha_test_bitmask();
        if let Some(old) = self.alpha_mask.take() {
            ctx.destroy_buffer(old);
        }
        self.alpha_mask = Some(ctx.create_buffer("alphaMask", &mask));
    }

    fn ensure_table(&mut self, ctx: &mut dyn RenderContext) {
        if self.implementation != RayImplementation::CoverageMask {
            return;
        }
        if let Some(old) = self.table_buffer.take() {
            ctx.destroy_buffer(old);
        }
        let table = StratifiedTable::generate(self.sample_count);
        self.table_buffer = Some(ctx.create_buffer("stratifiedTable", &table.to_buffer()));
        self.table_samples = self.sample_count;
    }
}

impl StochasticDepth for StochasticDepthRay {
    fn sample_count(&self) -> u32 {
        self.sample_count
    }

    fn encoding(&self) -> DepthEncoding {
        if self.normalize {
            DepthEncoding::NormalizedLinear
        } else {
            DepthEncoding::Linear
        }
    }

    fn rebuild(&mut self, ctx: &mut dyn RenderContext) -> Result<()> {
        self.validate()?;
        self.program.invalidate();
        self.ensure_table(ctx);
        self.upload_alpha_mask(ctx);
        Ok(())
    }

    fn update_scene(&mut self, ctx: &mut dyn RenderContext, scene: Option<Arc<Scene>>) {
        self.scene = scene;
        self.program.invalidate();
        self.upload_alpha_mask(ctx);
    }

    fn resize(&mut self, ctx: &mut dyn RenderContext, size: UVec2) {
        let desc = TextureDesc::new_2d("stochasticDepth", size, self.output_format()).with_usage(
            wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
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
        let scene = self.scene.clone().ok_or_else(|| AoError::MissingResource {
            pass: Self::TYPE_NAME.to_string(),
            name: "scene".into(),
        })?;
        if self.target.texture().is_none() {
            self.resize(ctx, inputs.depth.size());
        }
        let target = self.target.texture().ok_or(AoError::InvalidTexture)?;
        if self.implementation == RayImplementation::CoverageMask
            && (self.table_buffer.is_none() || self.table_samples != self.sample_count)
        {
            self.ensure_table(ctx);
        }

        let ray_interval = self.ray_interval && inputs.ray_min.is_some() && inputs.ray_max.is_some();
        let hardware = self.use_ray_pipeline && ctx.supports_ray_tracing();
        if self.use_ray_pipeline && !hardware && !self.warned_fallback {
            log::warn!(
                "{}: ray tracing unavailable, using inline ray queries",
                Self::TYPE_NAME
            );
            self.warned_fallback = true;
        }

        let defines = self.defines(&scene, ray_interval);
        let desc = if hardware {
            ProgramDesc::ray_tracing(programs::STOCHASTIC_RAY, defines)
        } else {
            ProgramDesc::compute(programs::STOCHASTIC_RAY_QUERY, defines)
        };
        let workgroup = desc.workgroup_size.x;
        let program = self.program.ensure(ctx, desc)?;

        let mut vars = ProgramVars::new();
        vars.set_scene(Some(scene))
            .set_texture("linearZ", inputs.depth)
            .set_texture("stochasticDepth", target)
            .set_texture_opt("stencilMask", inputs.stencil_mask);
        if ray_interval {
            vars.set_texture_opt("rayMin", inputs.ray_min)
                .set_texture_opt("rayMax", inputs.ray_max);
        }
        if let Some(mask) = self.alpha_mask {
            vars.set_buffer("alphaMask", mask);
        }
        if let Some(table) = self.table_buffer
            && self.implementation == RayImplementation::CoverageMask
        {
            vars.set_buffer("stratifiedTable", table);
        }

        let size = target.size();
        if hardware {
            ctx.trace_rays(program, &vars, size.extend(1))?;
        } else {
            let groups = div_ceil_uvec2(size, workgroup);
            ctx.dispatch(program, &vars, UVec3::new(groups.x, groups.y, 1))?;
        }
        Ok(target)
    }

    fn release(&mut self, ctx: &mut dyn RenderContext) {
        self.target.release(ctx);
        for buffer in [self.alpha_mask.take(), self.table_buffer.take()].into_iter().flatten() {
            ctx.destroy_buffer(buffer);
        }
    }
}

impl RenderPass for StochasticDepthRay {
    fn name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .with("SampleCount", self.sample_count)
            .with("CullMode", self.cull_mode)
            .with("normalize", self.normalize)
            .with("useRayPipeline", self.use_ray_pipeline)
            .with("AlphaTest", self.alpha_test)
            .with("Use16Bit", self.use_16_bit)
            .with("StoreNormals", self.store_normals)
            .with("Jitter", self.jitter)
            .with("Implementation", self.implementation)
            .with("Alpha", self.alpha)
            .with("RayInterval", self.ray_interval)
    }

    fn reflect(&self, data: &CompileData) -> Result<RenderPassReflection> {
        let mut r = RenderPassReflection::new();
        r.add_input("linearZ", "Primary linear depth");
        r.add_input("stencilMask", "Pixels to sample").optional();
        r.add_input("rayMin", "Nearest depth worth sampling").optional();
        r.add_input("rayMax", "Farthest depth worth sampling").optional();
        let output = r
            .add_output("stochasticDepth", "Stochastic depth layers")
            .format(self.output_format());
        if let Some(depth) = data.connected("linearZ") {
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
            depth: data.required("linearZ")?,
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
