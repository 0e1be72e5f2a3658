//! Depth-Normal Prepass
//!
//! Rasterizes the scene once and produces the G-buffer subset the AO passes
//! read:
//!
//! | Output        | Format              | Content                                |
//! |---------------|---------------------|----------------------------------------|
//! | `depth`       | `depthFormat`       | Non-linear hardware depth, 1 = cleared |
//! | `normals`     | `Rgba16Float`       | World normal, `[0, 1]` encoded         |
//! | `doubleSided` | `R8Uint`            | 1 where the surface is double-sided    |
//!
//! Without a scene the targets are only cleared, which downstream passes
//! read as background.

use std::sync::Arc;

use glam::Vec4;

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

pub struct DepthNormalPrepass {
    depth_format: DepthFormat,
    cull_mode: CullMode,
    program: ProgramSlot,
    scene: Option<Arc<Scene>>,
    warned_no_scene: bool,
}

impl Default for DepthNormalPrepass {
    fn default() -> Self {
        Self {
            depth_format: DepthFormat::D32Float,
            cull_mode: CullMode::Back,
            program: ProgramSlot::Uncompiled,
            scene: None,
            warned_no_scene: false,
        }
    }
}

impl DepthNormalPrepass {
    pub const TYPE_NAME: &'static str = "DepthNormalPrepass";

    pub fn from_properties(props: &Properties) -> Result<Self> {
        let mut pass = Self::default();
        for (key, value) in props.iter() {
            match key {
                "depthFormat" => match Properties::parse::<DepthFormat>(key, value) {
                    Ok(format) => pass.depth_format = format,
                    Err(_) => log::warn!("{}: '{value}' is not a depth format, ignored", Self::TYPE_NAME),
                },
                "cullMode" => pass.cull_mode = Properties::parse(key, value)?,
                _ => warn_unknown_property(Self::TYPE_NAME, key),
            }
        }
        Ok(pass)
    }

    #[must_use]
    pub fn depth_format(&self) -> DepthFormat {
        self.depth_format
    }

    #[must_use]
    pub fn cull_mode(&self) -> CullMode {
        self.cull_mode
    }
}

impl RenderPass for DepthNormalPrepass {
    fn name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .with("depthFormat", self.depth_format)
            .with("cullMode", self.cull_mode)
    }

    fn reflect(&self, _data: &CompileData) -> Result<RenderPassReflection> {
        let mut r = RenderPassReflection::new();
        r.add_output("depth", "Non-linear depth")
            .format(self.depth_format.texture_format());
        r.add_output("normals", "World-space normals")
            .format(wgpu::TextureFormat::Rgba16Float);
        r.add_output("doubleSided", "Double-sided surface flags")
            .format(wgpu::TextureFormat::R8Uint);
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
        let normals = data.required("normals")?;
        let double_sided = data.required("doubleSided")?;

        ctx.clear_depth_stencil(depth, Some(1.0), self.depth_format.has_stencil().then_some(0))?;
        ctx.clear_texture(normals, Vec4::ZERO)?;
        ctx.clear_texture(double_sided, Vec4::ZERO)?;

        let Some(scene) = self.scene.clone() else {
            if !self.warned_no_scene {
                log::warn!("{}: no scene bound, outputs stay cleared", Self::TYPE_NAME);
                self.warned_no_scene = true;
            }
            return Ok(());
        };

        let program = self.program.get_or_create(ctx, || {
            ProgramDesc::raster(programs::DEPTH_NORMAL_PREPASS, ShaderDefines::new())
                .with_defines(&scene.shader_defines())
        })?;

        let mut vars = ProgramVars::new();
        vars.set_scene(Some(scene));
        let targets = RenderTargets::color(normals)
            .with_color(double_sided)
            .with_depth(depth);
        let state = GraphicsState::default()
            .with_depth(wgpu::CompareFunction::Less, true)
            .with_cull(self.cull_mode.to_face());
        ctx.rasterize_scene(program, &vars, &targets, &state)
    }

    fn set_scene(&mut self, _ctx: &mut dyn RenderContext, scene: Option<Arc<Scene>>) {
        self.scene = scene;
        self.warned_no_scene = false;
        self.program.invalidate();
    }
}
