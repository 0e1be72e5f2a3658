//! Deinterleaved HBAO
//!
//! Horizon-based AO over a 4×4 deinterleaved depth buffer. Each of the 16
//! quarter-resolution slices is drawn as its own full-screen pass into one
//! layer of the output array:
//!
//! ```text
//!   depth[16 layers, W/4 × H/4] ──► slice s ──► ambientMap[s]
//!                                   │
//!                                   └─ full-res pixel = 4q + (s % 4, s / 4)
//! ```
//!
//! The red channel holds single-depth AO, the green channel the dual-depth
//! result (equal to red unless `depthMode` is `DualDepth`).

use std::sync::Arc;

use glam::{UVec2, Vec4};

use crate::errors::Result;
use crate::renderer::core::context::RenderContext;
use crate::renderer::core::program::{ProgramDesc, ProgramSlot};
use crate::renderer::core::state::{GraphicsState, RenderTargets};
use crate::renderer::core::vars::ProgramVars;
use crate::renderer::graph::{CompileData, FrameContext, RenderData, RenderPass, RenderPassReflection};
use crate::renderer::guard_band::compute_scissor_and_viewport;
use crate::renderer::programs;
use crate::resources::ao::{HBAO_SLICE_COUNT, generate_hbao_slice_noise};
use crate::resources::{DepthMode, HbaoData, HbaoSliceData, ParamBlock, Properties, ShaderDefines};
use crate::scene::Scene;
use crate::utils::div_ceil_uvec2;

use super::warn_unknown_property;

const NUM_DIRECTIONS: u32 = 8;
const NUM_STEPS: u32 = 4;

pub struct HbaoPass {
    enabled: bool,
    depth_mode: DepthMode,
    params: ParamBlock<HbaoData>,
    noise: [Vec4; HBAO_SLICE_COUNT as usize],
    program: ProgramSlot,
    vars: ProgramVars,
    /// Mode the current program was built for.
    active_mode: DepthMode,
    scene: Option<Arc<Scene>>,
    warned_mode: bool,
}

impl Default for HbaoPass {
    fn default() -> Self {
        Self {
            enabled: true,
            depth_mode: DepthMode::SingleDepth,
            params: ParamBlock::new(HbaoData::default()),
            noise: generate_hbao_slice_noise(),
            program: ProgramSlot::Uncompiled,
            vars: ProgramVars::new(),
            active_mode: DepthMode::SingleDepth,
            scene: None,
            warned_mode: false,
        }
    }
}

impl HbaoPass {
    pub const TYPE_NAME: &'static str = "HBAO";

    pub fn from_properties(props: &Properties) -> Result<Self> {
        let mut pass = Self::default();
        for (key, value) in props.iter() {
            match key {
                "enabled" => pass.enabled = Properties::parse_bool(key, value)?,
                "radius" => pass.set_radius(Properties::parse_f32(key, value)?),
                "depthMode" => pass.set_depth_mode(Properties::parse(key, value)?),
                "depthBias" => pass.set_depth_bias(Properties::parse_f32(key, value)?),
                "exponent" => pass.set_exponent(Properties::parse_f32(key, value)?),
                _ => warn_unknown_property(Self::TYPE_NAME, key),
            }
        }
        Ok(pass)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_radius(&mut self, radius: f32) {
        if radius.is_finite() && radius > 0.0 {
            self.params.write().set_radius(radius);
        }
    }

    pub fn set_depth_bias(&mut self, bias: f32) {
        self.params.write().n_dot_v_bias = bias.clamp(0.0, 0.99);
    }

    pub fn set_exponent(&mut self, exponent: f32) {
        if exponent.is_finite() && exponent > 0.0 {
            self.params.write().power_exponent = exponent;
        }
    }

    pub fn set_depth_mode(&mut self, mode: DepthMode) {
        self.depth_mode = mode;
        self.warned_mode = false;
        self.program.invalidate();
    }

    #[must_use]
    pub fn params(&self) -> &HbaoData {
        self.params.read()
    }

    /// Constant block as last uploaded, `None` before the first execute.
    #[must_use]
    pub fn uploaded_params(&self) -> Option<HbaoData> {
        self.vars.constants("HbaoCB")
    }

    /// Mode actually used given what is bound this frame.
    fn effective_mode(&mut self, has_depth2: bool) -> DepthMode {
        let mode = match self.depth_mode {
            DepthMode::SingleDepth => DepthMode::SingleDepth,
            DepthMode::DualDepth if has_depth2 => DepthMode::DualDepth,
            DepthMode::DualDepth => {
                if !self.warned_mode {
                    log::warn!("{}: DualDepth without depth2, using SingleDepth", Self::TYPE_NAME);
                    self.warned_mode = true;
                }
                DepthMode::SingleDepth
            }
            other => {
                if !self.warned_mode {
                    log::warn!(
                        "{}: depth mode {} is not supported, using SingleDepth",
                        Self::TYPE_NAME,
                        other.name()
                    );
                    self.warned_mode = true;
                }
                DepthMode::SingleDepth
            }
        };
        if mode != self.active_mode {
            self.active_mode = mode;
            self.program.invalidate();
        }
        mode
    }
}

impl RenderPass for HbaoPass {
    fn name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn properties(&self) -> Properties {
        let params = self.params.read();
        Properties::new()
            .with("enabled", self.enabled)
            .with("radius", params.radius)
            .with("depthMode", self.depth_mode)
            .with("depthBias", params.n_dot_v_bias)
            .with("exponent", params.power_exponent)
    }

    fn reflect(&self, data: &CompileData) -> Result<RenderPassReflection> {
        let mut r = RenderPassReflection::new();
        r.add_input("depth", "Deinterleaved linear depth");
        r.add_input("depth2", "Deinterleaved second depth layer").optional();
        r.add_input("normals", "World-space normals");
        let size = data
            .connected("depth")
            .map_or_else(|| div_ceil_uvec2(data.default_dims, 4), |d| d.size());
        r.add_output("ambientMap", "Per-slice AO (R single, G dual)")
            .format(wgpu::TextureFormat::Rg8Unorm)
            .layers(HBAO_SLICE_COUNT)
            .size(size);
        Ok(r)
    }

    fn compile(&mut self, _ctx: &mut dyn RenderContext, _data: &CompileData) -> Result<()> {
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
        let depth = data.required("depth")?;
        let normals = data.required("normals")?;
        let depth2 = data.get("depth2");
        let mode = self.effective_mode(depth2.is_some());

        let resolution = normals.size();
        let guard_band = frame.guard_band_size();
        {
            let current = self.params.read();
            if current.resolution.as_uvec2() != resolution || current.guard_band != guard_band {
                let params = self.params.write();
                params.set_resolution(resolution);
                params.guard_band = guard_band;
            }
        }

        let scene = self.scene.clone();
        let program = self.program.get_or_create(ctx, || {
            let defines = ShaderDefines::new()
                .with("NUM_DIRECTIONS", NUM_DIRECTIONS)
                .with("NUM_STEPS", NUM_STEPS)
                .with("DEPTH_MODE", mode.define_value());
            let desc = ProgramDesc::fullscreen(programs::HBAO, defines);
            match &scene {
                Some(s) => desc.with_defines(&s.shader_defines()),
                None => desc,
            }
        })?;

        ctx.clear_texture(ambient, Vec4::ONE)?;

        if self.params.take_dirty() {
            log::debug!("{}: constants uploaded", Self::TYPE_NAME);
            let params = *self.params.read();
            self.vars.set_constants("HbaoCB", &params);
        }
        let vars = &mut self.vars;
        vars.set_scene(scene)
            .set_texture("depth", depth)
            .set_texture("normals", normals)
            .set_texture_opt("depth2", depth2.filter(|_| mode == DepthMode::DualDepth));

        let quarter = ambient.size();
        let (scissor, viewport) = compute_scissor_and_viewport(quarter, guard_band / 4);
        let state = GraphicsState::default().with_cull(None).with_scissor(scissor, viewport);
        for slice in 0..HBAO_SLICE_COUNT {
            let slice_data = HbaoSliceData {
                noise: self.noise[slice as usize],
                quarter_offset: UVec2::new(slice % 4, slice / 4),
                slice,
                _pad: 0,
            };
            vars.set_constants("SliceCB", &slice_data);
            ctx.draw_fullscreen(
                program,
                vars,
                &RenderTargets::color(ambient).at_layer(slice),
                &state,
            )?;
        }
        Ok(())
    }

    fn set_scene(&mut self, _ctx: &mut dyn RenderContext, scene: Option<Arc<Scene>>) {
        self.scene = scene;
        self.program.invalidate();
    }
}
