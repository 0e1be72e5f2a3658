//! Guard Band
//!
//! A pixel margin around the render target whose contents are discarded.
//! Passes restrict rasterization to the inner rectangle through the scissor
//! while keeping the viewport at full resolution, so the NDC → pixel mapping
//! is unchanged:
//!
//! ```text
//!  (0,0) ┌──────────────────────────┐
//!        │ guard band               │
//!        │   (g,g) ┌────────────┐   │
//!        │         │  scissor   │   │
//!        │         └────────────┘   │
//!        │              (W-g, H-g)  │
//!        └──────────────────────────┘ (W,H) = viewport
//! ```
//!
//! Callers keep `0 <= g < min(W, H) / 2`. Larger bands yield an empty
//! scissor rather than a panic.

use glam::{UVec2, Vec2};

use crate::renderer::core::state::{Scissor, Viewport};

/// Scissor `[g, res - g)` on both axes and a full-resolution viewport.
#[must_use]
pub fn compute_scissor_and_viewport(resolution: UVec2, guard_band: u32) -> (Scissor, Viewport) {
    let scissor = Scissor {
        x: guard_band,
        y: guard_band,
        width: resolution.x.saturating_sub(guard_band.saturating_mul(2)),
        height: resolution.y.saturating_sub(guard_band.saturating_mul(2)),
    };
    (scissor, Viewport::full(resolution))
}

/// Guard band published for the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardBandInfo {
    pub size: u32,
    /// First valid texel center in uv space.
    pub uv_min: Vec2,
    /// Last valid texel center in uv space.
    pub uv_max: Vec2,
}

impl GuardBandInfo {
    #[must_use]
    pub fn new(size: u32, dims: UVec2) -> Self {
        let dims = dims.max(UVec2::ONE).as_vec2();
        let edge = Vec2::splat(size as f32 + 0.5);
        Self {
            size,
            uv_min: edge / dims,
            uv_max: (dims - edge) / dims,
        }
    }

    /// Whether `uv` lies within the valid region.
    #[inline]
    #[must_use]
    pub fn contains_uv(&self, uv: Vec2) -> bool {
        uv.cmpge(self.uv_min).all() && uv.cmple(self.uv_max).all()
    }
}
