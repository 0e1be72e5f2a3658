//! Stochastic Depth Maps
//!
//! A stochastic depth map stores, per pixel, up to `N` depth layers behind
//! the primary surface. Two implementations exist:
//!
//! | Type                     | Acquisition                 | Storage                        |
//! |--------------------------|-----------------------------|--------------------------------|
//! | [`StochasticDepthRaster`]| rasterization, coverage     | `N`-sample depth-stencil       |
//! | [`StochasticDepthRay`]   | one ray per pixel           | `N` channels (`N` ∈ {1, 2, 4}) |
//!
//! Both work standalone as graph passes and as the private depth source of
//! the SVAO pass, which owns a `Box<dyn StochasticDepth>` and drives it
//! through this trait:
//!
//! ```text
//!   rebuild ─► resize ─► acquire (per frame) ─► ... ─► release
//!      ▲                    │
//!      └── update_scene ────┘ (programs rebuilt lazily)
//! ```

mod raster;
mod ray;

pub use raster::StochasticDepthRaster;
pub use ray::StochasticDepthRay;

use std::sync::Arc;

use glam::UVec2;

use crate::errors::Result;
use crate::renderer::core::context::RenderContext;
use crate::renderer::core::texture::Texture;
use crate::resources::DepthEncoding;
use crate::scene::Scene;

/// Per-frame inputs of a stochastic depth acquisition.
#[derive(Debug, Clone, Copy)]
pub struct StochasticDepthInputs {
    /// Primary depth. Non-linear for the raster variant, linear for the ray
    /// variant.
    pub depth: Texture,
    /// Pixels whose texel is zero are skipped.
    pub stencil_mask: Option<Texture>,
    /// Per-pixel depth interval worth sampling.
    pub ray_min: Option<Texture>,
    pub ray_max: Option<Texture>,
}

/// Direct-call contract of an owned stochastic depth source.
pub trait StochasticDepth {
    /// Layers stored per pixel.
    fn sample_count(&self) -> u32;

    /// How the stored layers map to linear depth.
    fn encoding(&self) -> DepthEncoding;

    /// Validates the configuration and drops cached programs and tables.
    fn rebuild(&mut self, ctx: &mut dyn RenderContext) -> Result<()>;

    fn update_scene(&mut self, ctx: &mut dyn RenderContext, scene: Option<Arc<Scene>>);

    /// (Re)creates the owned target at `size`; the previous target is
    /// destroyed. No-op when the size is unchanged.
    fn resize(&mut self, ctx: &mut dyn RenderContext, size: UVec2);

    /// Current target, once [`resize`](Self::resize) or a graph execution
    /// provided one.
    fn target(&self) -> Option<Texture>;

    /// Records the acquisition and returns the filled target.
    fn acquire(&mut self, ctx: &mut dyn RenderContext, inputs: &StochasticDepthInputs) -> Result<Texture>;

    /// Destroys every owned resource.
    fn release(&mut self, ctx: &mut dyn RenderContext);
}

/// Target held by a stochastic depth source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetSlot {
    None,
    /// Created by the source; destroyed on resize and release.
    Owned(Texture),
    /// Allocated by the render graph for this execution.
    Borrowed(Texture),
}

impl TargetSlot {
    fn texture(self) -> Option<Texture> {
        match self {
            Self::None => None,
            Self::Owned(t) | Self::Borrowed(t) => Some(t),
        }
    }

    fn release(&mut self, ctx: &mut dyn RenderContext) {
        if let Self::Owned(t) = *self {
            ctx.destroy_texture(t);
        }
        *self = Self::None;
    }
}
