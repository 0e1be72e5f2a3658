//! Depth Linearization
//!
//! Full-screen conversion of non-linear hardware depth into view-space
//! distance. The near/far planes live in a small constant block that is
//! re-uploaded only when the camera's clip range changes.

use std::sync::Arc;

use crate::errors::{AoError, Result};
use crate::renderer::core::context::RenderContext;
use crate::renderer::core::program::{ProgramDesc, ProgramSlot};
use crate::renderer::core::state::{GraphicsState, RenderTargets};
use crate::renderer::core::vars::ProgramVars;
use crate::renderer::graph::{CompileData, FrameContext, RenderData, RenderPass, RenderPassReflection};
use crate::renderer::programs;
use crate::resources::{DepthRangeData, LinearDepthFormat, Properties, ShaderDefines};
use crate::scene::Scene;

use super::warn_unknown_property;

#[derive(Default)]
pub struct LinearizeDepthPass {
    depth_format: LinearDepthFormat,
    program: ProgramSlot,
    vars: ProgramVars,
    /// Clip range currently held by `vars`.
    range: Option<DepthRangeData>,
    scene: Option<Arc<Scene>>,
}

impl LinearizeDepthPass {
    pub const TYPE_NAME: &'static str = "LinearizeDepth";

    pub fn from_properties(props: &Properties) -> Result<Self> {
        let mut pass = Self::default();
        for (key, value) in props.iter() {
            match key {
                "depthFormat" => pass.depth_format = Properties::parse(key, value)?,
                _ => warn_unknown_property(Self::TYPE_NAME, key),
            }
        }
        Ok(pass)
    }

    #[must_use]
    pub fn depth_format(&self) -> LinearDepthFormat {
        self.depth_format
    }

    /// Clip range held by the constant block, once a frame has run.
    #[must_use]
    pub fn bound_range(&self) -> Option<DepthRangeData> {
        self.range
    }
}

impl RenderPass for LinearizeDepthPass {
    fn name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn properties(&self) -> Properties {
        Properties::new().with("depthFormat", self.depth_format)
    }

    fn reflect(&self, data: &CompileData) -> Result<RenderPassReflection> {
        let mut r = RenderPassReflection::new();
        r.add_input("depth", "Non-linear depth");
        let output = r
            .add_output("linearDepth", "View-space linear depth")
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
        let output = data.required("linearDepth")?;
        let camera = self
            .scene
            .as_ref()
            .map(|s| s.camera.shader_data())
            .ok_or_else(|| AoError::MissingResource {
                pass: Self::TYPE_NAME.to_string(),
                name: "scene".into(),
            })?;

        let range = DepthRangeData::new(camera.near(), camera.far());
        if self.range != Some(range) {
            log::debug!("{}: clip range now [{}, {}]", Self::TYPE_NAME, range.near, range.far);
            self.vars.set_constants("CameraCB", &range);
            self.range = Some(range);
        }

        let program = self.program.get_or_create(ctx, || {
            ProgramDesc::fullscreen(programs::LINEARIZE_DEPTH, ShaderDefines::new())
        })?;
        self.vars.set_texture("depth", depth);
        ctx.draw_fullscreen(
            program,
            &self.vars,
            &RenderTargets::color(output),
            &GraphicsState::default(),
        )
    }

    fn set_scene(&mut self, _ctx: &mut dyn RenderContext, scene: Option<Arc<Scene>>) {
        self.scene = scene;
    }
}
