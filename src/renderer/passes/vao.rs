//! Volumetric AO
//!
//! Single-pass volumetric ambient occlusion. Every kernel sample is a
//! column through a sphere around the shaded point; the visible fraction of
//! the column is estimated with the configured [`DepthMode`].
//!
//! Besides the ambient map, the pass keeps one internal array per decision
//! quantity, with one layer per kernel sample:
//!
//! | Field        | Format   | Meaning                                   |
//! |--------------|----------|-------------------------------------------|
//! | `rasterDepth`| R32Float | depth read from the raster buffers        |
//! | `rayDepth`   | R32Float | first hit of the sample's ray             |
//! | `askRay`     | R8Uint   | raster result ambiguous or forced         |
//! | `requireRay` | R8Uint   | ray and raster results differ             |
//! | `forceRay`   | R8Uint   | 0, out of screen, double sided, invalid   |
//! | `rasterAO`   | R32Float | raster visibility                         |
//! | `rayAO`      | R32Float | ray visibility                            |
//! | `sphereEnd`  | R32Float | back end of the sample column             |
//!
//! [`VaoPass::request_export`] dumps them after the next execute.

use std::path::PathBuf;
use std::sync::Arc;

use glam::{UVec3, Vec4};

use crate::errors::{AoError, Result};
use crate::renderer::core::context::RenderContext;
use crate::renderer::core::program::{ProgramDesc, ProgramSlot};
use crate::renderer::core::vars::ProgramVars;
use crate::renderer::graph::{CompileData, FrameContext, RenderData, RenderPass, RenderPassReflection};
use crate::renderer::programs::{self, VAO_DECISION_BUFFERS};
use crate::resources::ao::{MAX_KERNEL_SIZE, generate_vao_kernel};
use crate::resources::{
    DepthEncoding, DepthMode, ParamBlock, Properties, SampleDistribution, ShaderDefines, VaoData,
};
use crate::scene::Scene;
use crate::utils::div_ceil_uvec2;

use super::export::export_textures;
use super::warn_unknown_property;

/// Decision layers holding flags rather than depths or visibilities.
const FLAG_BUFFERS: [&str; 3] = ["askRay", "requireRay", "forceRay"];

pub struct VaoPass {
    enabled: bool,
    kernel_size: u32,
    distribution: SampleDistribution,
    depth_mode: DepthMode,
    prevent_dark_halos: bool,
    stochastic_encoding: DepthEncoding,
    params: ParamBlock<VaoData>,

    program: ProgramSlot,
    vars: ProgramVars,
    /// Mode the current program was built for.
    active_mode: DepthMode,
    scene: Option<Arc<Scene>>,
    export_dir: Option<PathBuf>,
    warned_fallback: bool,
}

impl Default for VaoPass {
    fn default() -> Self {
        let mut pass = Self {
            enabled: true,
            kernel_size: 8,
            distribution: SampleDistribution::VanDerCorput,
            depth_mode: DepthMode::SingleDepth,
            prevent_dark_halos: true,
            stochastic_encoding: DepthEncoding::NormalizedLinear,
            params: ParamBlock::new(VaoData::default()),
            program: ProgramSlot::Uncompiled,
            vars: ProgramVars::new(),
            active_mode: DepthMode::SingleDepth,
            scene: None,
            export_dir: None,
            warned_fallback: false,
        };
        pass.regenerate_kernel();
        pass
    }
}

impl VaoPass {
    pub const TYPE_NAME: &'static str = "VAO";

    pub fn from_properties(props: &Properties) -> Result<Self> {
        let mut pass = Self::default();
        for (key, value) in props.iter() {
            match key {
                "enabled" => pass.enabled = Properties::parse_bool(key, value)?,
                "kernelSize" => pass.set_kernel_size(Properties::parse_u32(key, value)?),
                "distribution" => pass.set_distribution(Properties::parse(key, value)?),
                "radius" => pass.set_radius(Properties::parse_f32(key, value)?),
                "depthMode" => pass.set_depth_mode(Properties::parse(key, value)?),
                "thickness" => pass.set_thickness(Properties::parse_f32(key, value)?),
                "exponent" => pass.set_exponent(Properties::parse_f32(key, value)?),
                "preventDarkHalos" => {
                    pass.prevent_dark_halos = Properties::parse_bool(key, value)?;
                }
                "stochasticEncoding" => {
                    pass.stochastic_encoding = Properties::parse(key, value)?;
                }
                _ => warn_unknown_property(Self::TYPE_NAME, key),
            }
        }
        Ok(pass)
    }

    // === Setters ===

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Clamped to `1..=32`. Takes effect at the next graph compile, which
    /// reallocates the decision layers.
    pub fn set_kernel_size(&mut self, size: u32) {
        let clamped = size.clamp(1, MAX_KERNEL_SIZE as u32);
        if clamped != size {
            log::warn!("{}: kernel size {size} clamped to {clamped}", Self::TYPE_NAME);
        }
        self.kernel_size = clamped;
        self.regenerate_kernel();
    }

    pub fn set_distribution(&mut self, distribution: SampleDistribution) {
        self.distribution = distribution;
        self.regenerate_kernel();
    }

    pub fn set_radius(&mut self, radius: f32) {
        if radius.is_finite() && radius > 0.0 {
            self.params.write().radius = radius;
        }
    }

    pub fn set_thickness(&mut self, thickness: f32) {
        if thickness.is_finite() && thickness > 0.0 {
            self.params.write().thickness = thickness;
        }
    }

    pub fn set_exponent(&mut self, exponent: f32) {
        if exponent.is_finite() && exponent > 0.0 {
            self.params.write().exponent = exponent;
        }
    }

    pub fn set_depth_mode(&mut self, mode: DepthMode) {
        self.depth_mode = mode;
        self.warned_fallback = false;
        self.program.invalidate();
    }

    /// Dumps the ambient map and the decision layers after the next
    /// execute.
    pub fn request_export(&mut self, dir: impl Into<PathBuf>) {
        self.export_dir = Some(dir.into());
    }

    // === Accessors ===

    #[must_use]
    pub fn kernel_size(&self) -> u32 {
        self.kernel_size
    }

    #[must_use]
    pub fn params(&self) -> &VaoData {
        self.params.read()
    }

    fn regenerate_kernel(&mut self) {
        let kernel = generate_vao_kernel(self.kernel_size, self.distribution);
        self.params.write().set_kernel(&kernel);
    }

    fn unsupported(&self) -> Option<AoError> {
        self.depth_mode.requires_classifier().then(|| AoError::UnsupportedDepthMode {
            pass: Self::TYPE_NAME.to_string(),
            mode: self.depth_mode.name().to_string(),
        })
    }

    /// Mode usable with what is bound this frame.
    fn effective_mode(&mut self, data: &RenderData) -> DepthMode {
        let fallback = match self.depth_mode {
            DepthMode::DualDepth if data.get("depth2").is_none() => Some("depth2"),
            DepthMode::StochasticDepth if data.get("stochasticDepth").is_none() => {
                Some("stochasticDepth")
            }
            _ => None,
        };
        let mode = match fallback {
            Some(missing) => {
                if !self.warned_fallback {
                    log::warn!(
                        "{}: {} needs '{missing}', using SingleDepth",
                        Self::TYPE_NAME,
                        self.depth_mode.name()
                    );
                    self.warned_fallback = true;
                }
                DepthMode::SingleDepth
            }
            None => self.depth_mode,
        };
        if mode != self.active_mode {
            self.active_mode = mode;
            self.program.invalidate();
        }
        mode
    }

    fn defines(&self, mode: DepthMode) -> ShaderDefines {
        let defines = ShaderDefines::new()
            .with("DEPTH_MODE", mode.define_value())
            .with("PREVENT_DARK_HALOS", self.prevent_dark_halos)
            .with("TRACE_OUT_OF_SCREEN", true)
            .with("TRACE_DOUBLE_ON_DOUBLE", true)
            .with("USE_ALPHA_TEST", true)
            .with("STOCHASTIC_ENCODING", self.stochastic_encoding.define_value());
        match &self.scene {
            Some(scene) => defines.merged_with(&scene.shader_defines()),
            None => defines,
        }
    }
}

impl RenderPass for VaoPass {
    fn name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn properties(&self) -> Properties {
        let params = self.params.read();
        Properties::new()
            .with("enabled", self.enabled)
            .with("kernelSize", self.kernel_size)
            .with("distribution", self.distribution)
            .with("radius", params.radius)
            .with("depthMode", self.depth_mode)
            .with("thickness", params.thickness)
            .with("exponent", params.exponent)
            .with("preventDarkHalos", self.prevent_dark_halos)
            .with("stochasticEncoding", self.stochastic_encoding)
    }

    fn reflect(&self, data: &CompileData) -> Result<RenderPassReflection> {
        let mut r = RenderPassReflection::new();
        r.add_input("depth", "Linear depth");
        r.add_input("depth2", "Second linear depth layer").optional();
        r.add_input("normals", "World-space normals");
        r.add_input("stochasticDepth", "Stochastic depth layers").optional();
        r.add_input("doubleSided", "Double-sided material flags").optional();

        let size = data.connected("depth").map(|d| d.size());
        let output = r
            .add_output("ambientMap", "Ambient occlusion")
            .format(wgpu::TextureFormat::R8Unorm);
        if let Some(size) = size {
            output.size(size);
        }
        for name in VAO_DECISION_BUFFERS {
            let format = if FLAG_BUFFERS.contains(&name) {
                wgpu::TextureFormat::R8Uint
            } else {
                wgpu::TextureFormat::R32Float
            };
            let field = r
                .add_internal(name, "Per-sample decision data")
                .format(format)
                .layers(self.kernel_size);
            if let Some(size) = size {
                field.size(size);
            }
        }
        Ok(r)
    }

    fn compile(&mut self, _ctx: &mut dyn RenderContext, data: &CompileData) -> Result<()> {
        if let Some(err) = self.unsupported() {
            return Err(err);
        }
        if self.depth_mode == DepthMode::StochasticDepth
            && data.connected("stochasticDepth").is_none()
        {
            return Err(AoError::MissingReflection {
                pass: Self::TYPE_NAME.to_string(),
                field: "stochasticDepth".into(),
            });
        }
        self.program.invalidate();
        self.params.mark_dirty();
        Ok(())
    }

    fn execute(
        &mut self,
        ctx: &mut dyn RenderContext,
        data: &RenderData,
        frame: &mut FrameContext,
    ) -> Result<()> {
        let ambient = data.required("ambientMap")?;
        if !self.enabled {
            return ctx.clear_texture(ambient, Vec4::ONE);
        }
        if let Some(err) = self.unsupported() {
            return Err(err);
        }
        let mode = self.effective_mode(data);

        let resolution = ambient.size();
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
        }

        let defines = self.defines(mode);
        let program = self
            .program
            .get_or_create(ctx, || ProgramDesc::compute(programs::VAO, defines))?;

        self.vars
            .set_scene(self.scene.clone())
            .set_texture("depth", data.required("depth")?)
            .set_texture("normals", data.required("normals")?)
            .set_texture("ambientMap", ambient)
            .set_texture_opt("depth2", data.get("depth2").filter(|_| mode.uses_depth2()))
            .set_texture_opt(
                "stochasticDepth",
                data.get("stochasticDepth")
                    .filter(|_| mode == DepthMode::StochasticDepth),
            )
            .set_texture_opt("doubleSided", data.get("doubleSided"));
        for name in VAO_DECISION_BUFFERS {
            self.vars.set_texture_opt(name, data.get(name));
        }

        let groups = div_ceil_uvec2(resolution, 8);
        ctx.dispatch(program, &self.vars, UVec3::new(groups.x, groups.y, 1))?;

        if let Some(dir) = self.export_dir.take() {
            let mut textures = vec![("ambientMap", ambient)];
            textures.extend(
                VAO_DECISION_BUFFERS
                    .iter()
                    .filter_map(|&name| data.get(name).map(|t| (name, t))),
            );
            export_textures(ctx, &dir, Self::TYPE_NAME, frame.frame_index, &textures)?;
        }
        Ok(())
    }

    fn set_scene(&mut self, _ctx: &mut dyn RenderContext, scene: Option<Arc<Scene>>) {
        self.scene = scene;
        self.program.invalidate();
    }
}
