//! Per-Execution Data
//!
//! [`RenderData`] maps a pass's field names to the textures bound for this
//! execution. [`FrameContext`] is the typed per-frame side channel shared by
//! every pass of one graph execution: a pass early in the frame publishes a
//! value, later passes read it.

use glam::UVec2;
use rustc_hash::FxHashMap;

use crate::errors::{AoError, Result};
use crate::renderer::core::texture::Texture;
use crate::renderer::guard_band::GuardBandInfo;

#[derive(Debug, Clone)]
pub struct RenderData {
    pass: &'static str,
    textures: FxHashMap<&'static str, Texture>,
    default_dims: UVec2,
}

impl RenderData {
    #[must_use]
    pub fn new(pass: &'static str, default_dims: UVec2) -> Self {
        Self {
            pass,
            textures: FxHashMap::default(),
            default_dims,
        }
    }

    pub fn insert(&mut self, name: &'static str, texture: Texture) {
        self.textures.insert(name, texture);
    }

    #[must_use]
    pub fn with(mut self, name: &'static str, texture: Texture) -> Self {
        self.insert(name, texture);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Texture> {
        self.textures.get(name).copied()
    }

    /// Fails fast when a field the pass cannot run without is unbound.
    pub fn required(&self, name: &str) -> Result<Texture> {
        self.get(name).ok_or_else(|| AoError::MissingResource {
            pass: self.pass.to_string(),
            name: name.to_string(),
        })
    }

    #[inline]
    #[must_use]
    pub fn default_dims(&self) -> UVec2 {
        self.default_dims
    }
}

/// Values published between passes within one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameContext {
    /// Set by the `GuardBand` pass; absent means no guard band.
    pub guard_band: Option<GuardBandInfo>,
    pub frame_index: u64,
}

impl FrameContext {
    #[must_use]
    pub fn new(frame_index: u64) -> Self {
        Self {
            guard_band: None,
            frame_index,
        }
    }

    #[inline]
    #[must_use]
    pub fn guard_band_size(&self) -> u32 {
        self.guard_band.map_or(0, |g| g.size)
    }
}
