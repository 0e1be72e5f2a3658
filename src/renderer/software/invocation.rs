//! Kernel Invocations
//!
//! A kernel is a plain function receiving an [`Invocation`]: the program
//! variant being run, its bound variables, the launch shape and access to
//! device storage. Compute and ray-generation kernels loop over
//! [`Invocation::threads`] themselves. Fragment kernels hand a shading
//! closure to [`Invocation::run_fragments`], which generates fragments and
//! runs the output merger:
//!
//! ```text
//!   full-screen: one fragment per pixel in the scissor
//!   raster:      one fragment per ray/triangle hit at each pixel center
//!        │
//!        ▼
//!   shade(&Invocation, &Fragment) -> Option<FragmentOutput>   (None = discard)
//!        │
//!        ▼  per covered sample
//!   stencil test ─► depth test ─► depth / stencil / color writes
//! ```
//!
//! Shading only sees the storage immutably; all writes happen in the merge
//! phase, in fragment order.

use std::sync::Arc;

use glam::{UVec2, UVec3, Vec2, Vec4};
use rand::SeedableRng;
use rand::rngs::StdRng;
use slotmap::SlotMap;
use xxhash_rust::xxh3::xxh3_64;

use crate::errors::{AoError, Result};
use crate::renderer::core::program::ProgramDesc;
use crate::renderer::core::state::{
    GraphicsState, RenderTargets, Scissor, apply_stencil_op, compare,
};
use crate::renderer::core::texture::{BufferId, Texture, TextureId};
use crate::renderer::core::vars::ProgramVars;
use crate::renderer::software::storage::TextureStorage;
use crate::resources::ShaderDefines;
use crate::scene::{CameraData, Hit, Ray, RayFlags, Scene};

pub type KernelFn = fn(&mut Invocation<'_>) -> Result<()>;

#[derive(Debug, Clone, Copy)]
pub enum Launch<'a> {
    Dispatch {
        groups: UVec3,
    },
    FullScreen {
        targets: &'a RenderTargets,
        state: &'a GraphicsState,
    },
    Raster {
        targets: &'a RenderTargets,
        state: &'a GraphicsState,
    },
    Rays {
        dims: UVec3,
    },
}

/// Input to a fragment shading closure.
#[derive(Debug, Clone, Copy)]
pub struct Fragment {
    pub pixel: UVec2,
    /// Pixel center in uv space (y down).
    pub uv: Vec2,
    /// Raster only: the triangle hit that produced this fragment.
    pub hit: Option<Hit>,
    /// Raster only: the primary ray through the pixel center.
    pub ray: Option<Ray>,
    /// View-space distance of the fragment (0 for full-screen).
    pub linear_depth: f32,
    /// Hardware depth of the fragment (0 for full-screen).
    pub depth: f32,
}

/// What a fragment writes when it survives shading.
#[derive(Debug, Clone, Copy, Default)]
pub struct FragmentOutput {
    pub colors: [Option<Vec4>; 4],
    /// Overrides the fragment's depth.
    pub depth: Option<f32>,
    /// Sample coverage; `None` covers every sample.
    pub coverage: Option<u32>,
}

impl FragmentOutput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn color(mut self, target: usize, value: Vec4) -> Self {
        self.colors[target] = Some(value);
        self
    }

    #[must_use]
    pub fn with_depth(mut self, depth: f32) -> Self {
        self.depth = Some(depth);
        self
    }

    #[must_use]
    pub fn with_coverage(mut self, mask: u32) -> Self {
        self.coverage = Some(mask);
        self
    }
}

pub struct Invocation<'a> {
    pub program: &'a ProgramDesc,
    pub vars: &'a ProgramVars,
    pub launch: Launch<'a>,
    /// Distinct per command; feeds [`Invocation::rng`].
    pub seed: u64,
    textures: &'a mut SlotMap<TextureId, TextureStorage>,
    buffers: &'a SlotMap<BufferId, Vec<u32>>,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(
        program: &'a ProgramDesc,
        vars: &'a ProgramVars,
        launch: Launch<'a>,
        seed: u64,
        textures: &'a mut SlotMap<TextureId, TextureStorage>,
        buffers: &'a SlotMap<BufferId, Vec<u32>>,
    ) -> Self {
        Self {
            program,
            vars,
            launch,
            seed,
            textures,
            buffers,
        }
    }

    // ========================================================================
    // Bindings
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn defines(&self) -> &ShaderDefines {
        &self.program.defines
    }

    #[must_use]
    pub fn texture(&self, name: &str) -> Option<Texture> {
        self.vars.texture(name)
    }

    pub fn required(&self, name: &str) -> Result<Texture> {
        self.vars.texture(name).ok_or_else(|| self.missing(name))
    }

    pub fn constants<T: bytemuck::Pod>(&self, name: &str) -> Result<T> {
        self.vars.constants(name).ok_or_else(|| self.missing(name))
    }

    #[must_use]
    pub fn buffer(&self, name: &str) -> Option<&[u32]> {
        let id = self.vars.buffer(name)?;
        self.buffers.get(id).map(Vec::as_slice)
    }

    pub fn scene(&self) -> Result<&Arc<Scene>> {
        self.vars.scene().ok_or_else(|| self.missing("scene"))
    }

    /// Camera constants bound as `PerFrameCB`, or taken from the scene.
    pub fn camera(&self) -> Result<CameraData> {
        match self.vars.constants::<CameraData>("PerFrameCB") {
            Some(camera) => Ok(camera),
            None => Ok(self.scene()?.camera.shader_data()),
        }
    }

    fn missing(&self, name: &str) -> AoError {
        AoError::MissingResource {
            pass: self.program.name.to_string(),
            name: name.to_string(),
        }
    }

    /// Total threads of a dispatch, or the ray launch dimensions.
    #[must_use]
    pub fn threads(&self) -> UVec3 {
        match self.launch {
            Launch::Dispatch { groups } => groups * self.program.workgroup_size,
            Launch::Rays { dims } => dims,
            Launch::FullScreen { targets, .. } | Launch::Raster { targets, .. } => {
                targets.size().unwrap_or(UVec2::ZERO).extend(1)
            }
        }
    }

    /// Deterministic generator for one pixel of this command.
    #[must_use]
    pub fn rng(&self, pixel: UVec2, salt: u32) -> StdRng {
        let mut key = [0u8; 20];
        key[..8].copy_from_slice(&self.seed.to_le_bytes());
        key[8..12].copy_from_slice(&pixel.x.to_le_bytes());
        key[12..16].copy_from_slice(&pixel.y.to_le_bytes());
        key[16..].copy_from_slice(&salt.to_le_bytes());
        StdRng::seed_from_u64(xxh3_64(&key))
    }

    // ========================================================================
    // Texel access
    // ========================================================================

    #[must_use]
    pub fn size(&self, texture: Texture) -> UVec2 {
        texture.size()
    }

    /// Texel at clamped coordinates. Stale handles read as zero.
    #[must_use]
    pub fn load(&self, texture: Texture, x: u32, y: u32, layer: u32, sample: u32) -> Vec4 {
        self.textures
            .get(texture.id)
            .map_or(Vec4::ZERO, |s| s.load(x, y, layer, sample))
    }

    /// Nearest texel to `uv`.
    #[must_use]
    pub fn load_uv(&self, texture: Texture, uv: Vec2, layer: u32, sample: u32) -> Vec4 {
        let p = uv_to_pixel(uv, texture.size());
        self.load(texture, p.x, p.y, layer, sample)
    }

    #[must_use]
    pub fn stencil(&self, texture: Texture, x: u32, y: u32, layer: u32, sample: u32) -> u8 {
        self.textures
            .get(texture.id)
            .map_or(0, |s| s.stencil(x, y, layer, sample))
    }

    pub fn store(&mut self, texture: Texture, x: u32, y: u32, layer: u32, value: Vec4) {
        self.store_sample(texture, x, y, layer, 0, value);
    }

    pub fn store_sample(
        &mut self,
        texture: Texture,
        x: u32,
        y: u32,
        layer: u32,
        sample: u32,
        value: Vec4,
    ) {
        if let Some(s) = self.textures.get_mut(texture.id) {
            s.store(x, y, layer, sample, value);
        }
    }

    // ========================================================================
    // Fragment launches
    // ========================================================================

    /// Generates fragments for the current draw, shades them and merges the
    /// results into the render targets.
    pub fn run_fragments<F>(&mut self, mut shade: F) -> Result<()>
    where
        F: FnMut(&Self, &Fragment) -> Option<FragmentOutput>,
    {
        let (targets, state, raster) = match self.launch {
            Launch::FullScreen { targets, state } => (targets, state, false),
            Launch::Raster { targets, state } => (targets, state, true),
            _ => {
                return Err(AoError::UnsupportedFeature {
                    pass: self.program.name.to_string(),
                    feature: "fragment shading outside a draw".into(),
                });
            }
        };
        let Some(size) = targets.size() else {
            return Ok(());
        };
        let scissor = clip_scissor(state.scissor.unwrap_or(Scissor::full(size)), size);

        let this: &Self = self;
        let mut outputs: Vec<(Fragment, FragmentOutput)> = Vec::new();
        if raster {
            let scene = Arc::clone(this.scene()?);
            let camera = this.camera()?;
            let flags = RayFlags {
                cull: state.cull,
                alpha_test: false,
            };
            let (near, far) = (camera.near(), camera.far());
            for_each_pixel(scissor, |pixel| {
                let uv = (pixel.as_vec2() + 0.5) / size.as_vec2();
                let ray = camera.primary_ray(uv);
                for hit in scene.trace_all(&ray, 0.0, f32::INFINITY, flags) {
                    let linear_depth = camera.depth_along(&ray, hit.t);
                    if linear_depth < near || linear_depth > far {
                        continue;
                    }
                    let fragment = Fragment {
                        pixel,
                        uv,
                        hit: Some(hit),
                        ray: Some(ray),
                        linear_depth,
                        depth: camera.delinearize(linear_depth),
                    };
                    if let Some(out) = shade(this, &fragment) {
                        outputs.push((fragment, out));
                    }
                }
            });
        } else {
            for_each_pixel(scissor, |pixel| {
                let fragment = Fragment {
                    pixel,
                    uv: (pixel.as_vec2() + 0.5) / size.as_vec2(),
                    hit: None,
                    ray: None,
                    linear_depth: 0.0,
                    depth: 0.0,
                };
                if let Some(out) = shade(this, &fragment) {
                    outputs.push((fragment, out));
                }
            });
        }

        for (fragment, out) in outputs {
            self.merge(targets, state, &fragment, &out);
        }
        Ok(())
    }

    fn merge(
        &mut self,
        targets: &RenderTargets,
        state: &GraphicsState,
        fragment: &Fragment,
        out: &FragmentOutput,
    ) {
        let (x, y) = (fragment.pixel.x, fragment.pixel.y);
        let layer = targets.layer;
        let depth = out.depth.unwrap_or(fragment.depth);
        let coverage = out.coverage.unwrap_or(u32::MAX);

        for sample in 0..targets.sample_count() {
            if coverage & (1 << sample) == 0 {
                continue;
            }
            if let Some(ds) = targets.depth_stencil.and_then(|t| self.textures.get_mut(t.id)) {
                if let Some(stencil) = state.stencil.filter(|_| ds.has_stencil()) {
                    let stored = ds.stencil(x, y, layer, sample);
                    if !compare(stencil.compare, stencil.reference, stored) {
                        continue;
                    }
                }
                if let Some(test) = state.depth_test {
                    let stored = ds.load(x, y, layer, sample).x;
                    if !compare(test, depth, stored) {
                        continue;
                    }
                }
                if state.depth_write {
                    ds.store(x, y, layer, sample, Vec4::splat(depth));
                }
                if let Some(stencil) = state.stencil.filter(|_| ds.has_stencil()) {
                    let stored = ds.stencil(x, y, layer, sample);
                    let value = apply_stencil_op(stencil.pass_op, stored, stencil.reference);
                    ds.set_stencil(x, y, layer, sample, value);
                }
            }
            for (target, color) in targets.colors.iter().zip(out.colors) {
                if let (Some(color), Some(storage)) = (color, self.textures.get_mut(target.id)) {
                    storage.store(x, y, layer, sample, color);
                }
            }
        }
    }
}

#[must_use]
pub fn uv_to_pixel(uv: Vec2, size: UVec2) -> UVec2 {
    let p = (uv * size.as_vec2()).floor().max(Vec2::ZERO).as_uvec2();
    p.min(size.saturating_sub(UVec2::ONE))
}

fn clip_scissor(s: Scissor, size: UVec2) -> Scissor {
    let x = s.x.min(size.x);
    let y = s.y.min(size.y);
    Scissor {
        x,
        y,
        width: s.width.min(size.x - x),
        height: s.height.min(size.y - y),
    }
}

fn for_each_pixel(scissor: Scissor, mut f: impl FnMut(UVec2)) {
    for y in scissor.y..scissor.y + scissor.height {
        for x in scissor.x..scissor.x + scissor.width {
            f(UVec2::new(x, y));
        }
    }
}
