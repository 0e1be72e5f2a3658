//! Render Context
//!
//! [`RenderContext`] is the command stream every pass records into. It owns
//! textures, buffers and compiled programs, and executes commands in
//! submission order on a single queue. Passes never synchronize explicitly:
//! a command always observes the results of every command recorded before
//! it.
//!
//! Two implementations ship with the crate: the CPU reference device in
//! [`crate::renderer::software`], which runs every program, and the wgpu
//! device in [`crate::renderer::gpu`], which runs compute and full-screen
//! programs from registered WGSL.

use glam::{UVec3, Vec4};

use crate::errors::Result;
use crate::renderer::core::program::{ProgramDesc, ProgramId};
use crate::renderer::core::state::{GraphicsState, RenderTargets};
use crate::renderer::core::texture::{BufferId, TexelData, Texture, TextureDesc};
use crate::renderer::core::vars::ProgramVars;

pub trait RenderContext {
    // ========================================================================
    // Resources
    // ========================================================================

    fn create_texture(&mut self, desc: TextureDesc) -> Texture;

    /// Destroys a texture. Destroying a stale handle is a no-op.
    fn destroy_texture(&mut self, texture: Texture);

    fn is_texture_alive(&self, texture: Texture) -> bool;

    /// Uploads one array layer (all samples) of texel data, laid out
    /// `[sample][y][x][channel]`.
    fn write_texture(&mut self, texture: Texture, layer: u32, data: &[f32]) -> Result<()>;

    fn read_texture(&self, texture: Texture) -> Result<TexelData>;

    fn create_buffer(&mut self, label: &'static str, data: &[u32]) -> BufferId;

    fn write_buffer(&mut self, buffer: BufferId, data: &[u32]) -> Result<()>;

    fn destroy_buffer(&mut self, buffer: BufferId);

    // ========================================================================
    // Programs
    // ========================================================================

    /// Compiles (or fetches from cache) the program variant `desc`.
    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId>;

    fn supports_ray_tracing(&self) -> bool;

    // ========================================================================
    // Commands
    // ========================================================================

    /// Clears every layer and sample of a color texture.
    fn clear_texture(&mut self, texture: Texture, value: Vec4) -> Result<()>;

    /// Clears the depth and/or stencil aspect of a depth-stencil texture.
    fn clear_depth_stencil(
        &mut self,
        texture: Texture,
        depth: Option<f32>,
        stencil: Option<u8>,
    ) -> Result<()>;

    fn dispatch(&mut self, program: ProgramId, vars: &ProgramVars, groups: UVec3) -> Result<()>;

    /// One fragment per pixel of the targets, honouring scissor and tests.
    fn draw_fullscreen(
        &mut self,
        program: ProgramId,
        vars: &ProgramVars,
        targets: &RenderTargets,
        state: &GraphicsState,
    ) -> Result<()>;

    /// Rasterizes the scene bound in `vars`.
    fn rasterize_scene(
        &mut self,
        program: ProgramId,
        vars: &ProgramVars,
        targets: &RenderTargets,
        state: &GraphicsState,
    ) -> Result<()>;

    /// One ray-generation invocation per element of `dims`.
    fn trace_rays(&mut self, program: ProgramId, vars: &ProgramVars, dims: UVec3) -> Result<()>;
}
