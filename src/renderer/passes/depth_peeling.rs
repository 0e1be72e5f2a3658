//! Depth Peeling
//!
//! Produces the second depth layer used by the dual-depth techniques: the
//! nearest surface strictly behind the primary one. The output is a
//! non-linear depth target cleared to 1.0, so pixels with a single surface
//! read as background in the second layer.

use std::sync::Arc;

use crate::errors::Result;
use crate::renderer::core::context::RenderContext;
use crate::renderer::core::program::{ProgramDesc, ProgramSlot};
use crate::renderer::core::state::{GraphicsState, RenderTargets};
use crate::renderer::core::vars::ProgramVars;
use crate::renderer::graph::{CompileData, FrameContext, RenderData, RenderPass, RenderPassReflection};
use crate::renderer::programs;
use crate::resources::{CullMode, DepthFormat, Properties, ShaderDefines};
use crate::scene::Scene;

use super::warn_unknown_property;

#[derive(Default)]
pub struct DepthPeelingPass {
    cull_mode: CullMode,
    depth_format: DepthFormat,
    program: ProgramSlot,
    scene: Option<Arc<Scene>>,
}

impl DepthPeelingPass {
    pub const TYPE_NAME: &'static str = "DepthPeeling";

    pub fn from_properties(props: &Properties) -> Result<Self> {
        let mut pass = Self::default();
        for (key, value) in props.iter() {
            match key {
                "cullMode" => pass.cull_mode = Properties::parse(key, value)?,
                "depthFormat" => pass.depth_format = Properties::parse(key, value)?,
                _ => warn_unknown_property(Self::TYPE_NAME, key),
            }
        }
        Ok(pass)
    }
}

impl RenderPass for DepthPeelingPass {
    fn name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .with("cullMode", self.cull_mode)
            .with("depthFormat", self.depth_format)
    }

    fn reflect(&self, data: &CompileData) -> Result<RenderPassReflection> {
        let mut r = RenderPassReflection::new();
        r.add_input("depth", "Primary non-linear depth");
        let output = r
            .add_output("depth2", "Second depth layer")
            .format(self.depth_format.texture_format());
        if let Some(depth) = data.connected("depth") {
            output.size(depth.size());
        }
        Ok(r)
    }

    fn compile(&mut self, _ctx: &mut dyn RenderContext, _data: &CompileData) -> Result<()> {
        self.program.invalidate();
        Ok(())
    }

    fn execute(
        &mut self,
        ctx: &mut dyn RenderContext,
        data: &RenderData,
        _frame: &mut FrameContext,
    ) -> Result<()> {
        let depth = data.required("depth")?;
        let depth2 = data.required("depth2")?;
        ctx.clear_depth_stencil(depth2, Some(1.0), self.depth_format.has_stencil().then_some(0))?;

        let Some(scene) = self.scene.clone() else {
            return Ok(());
        };
        let program = self.program.get_or_create(ctx, || {
            ProgramDesc::raster(programs::DEPTH_PEELING, ShaderDefines::new())
                .with_defines(&scene.shader_defines())
        })?;

        let mut vars = ProgramVars::new();
        vars.set_texture("depth", depth).set_scene(Some(scene));
        let state = GraphicsState::default()
            .with_depth(wgpu::CompareFunction::Less, true)
            .with_cull(self.cull_mode.to_face());
        ctx.rasterize_scene(program, &vars, &RenderTargets::depth(depth2), &state)
    }

    fn set_scene(&mut self, _ctx: &mut dyn RenderContext, scene: Option<Arc<Scene>>) {
        self.scene = scene;
        self.program.invalidate();
    }
}
