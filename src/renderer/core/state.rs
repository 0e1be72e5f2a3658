//! Fixed-Function State
//!
//! Scissor, viewport, depth/stencil configuration and the render targets a
//! full-screen or raster draw writes to.

use glam::UVec2;
use smallvec::SmallVec;

use crate::renderer::core::texture::Texture;

/// Pixel rectangle `[x, x + width) × [y, y + height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Scissor {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Scissor {
    #[must_use]
    pub fn full(size: UVec2) -> Self {
        Self {
            x: 0,
            y: 0,
            width: size.x,
            height: size.y,
        }
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x - self.x < self.width && y - self.y < self.height
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    #[must_use]
    pub fn full(size: UVec2) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: size.x as f32,
            height: size.y as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Stencil test against a constant reference.
///
/// `pass_op` is applied to samples that pass both the stencil and the depth
/// test; failing samples keep their stencil value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilTest {
    pub compare: wgpu::CompareFunction,
    pub reference: u8,
    pub pass_op: wgpu::StencilOperation,
}

/// Multisample pattern used by raster draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplePositions {
    #[default]
    Standard,
    /// Every sample sits at the pixel center.
    PixelCenter,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphicsState {
    pub scissor: Option<Scissor>,
    pub viewport: Option<Viewport>,
    pub cull: Option<wgpu::Face>,
    /// `None` disables the depth test.
    pub depth_test: Option<wgpu::CompareFunction>,
    pub depth_write: bool,
    pub stencil: Option<StencilTest>,
    pub sample_positions: SamplePositions,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            scissor: None,
            viewport: None,
            cull: Some(wgpu::Face::Back),
            depth_test: None,
            depth_write: false,
            stencil: None,
            sample_positions: SamplePositions::Standard,
        }
    }
}

impl GraphicsState {
    #[must_use]
    pub fn with_scissor(mut self, scissor: Scissor, viewport: Viewport) -> Self {
        self.scissor = Some(scissor);
        self.viewport = Some(viewport);
        self
    }

    #[must_use]
    pub fn with_depth(mut self, compare: wgpu::CompareFunction, write: bool) -> Self {
        self.depth_test = Some(compare);
        self.depth_write = write;
        self
    }

    #[must_use]
    pub fn with_stencil(mut self, stencil: StencilTest) -> Self {
        self.stencil = Some(stencil);
        self
    }

    #[must_use]
    pub fn with_cull(mut self, cull: Option<wgpu::Face>) -> Self {
        self.cull = cull;
        self
    }
}

/// Color attachments plus an optional depth-stencil attachment.
#[derive(Debug, Clone, Default)]
pub struct RenderTargets {
    pub colors: SmallVec<[Texture; 4]>,
    pub depth_stencil: Option<Texture>,
    /// Array layer every attachment is written at.
    pub layer: u32,
}

impl RenderTargets {
    #[must_use]
    pub fn color(texture: Texture) -> Self {
        Self {
            colors: smallvec::smallvec![texture],
            ..Default::default()
        }
    }

    #[must_use]
    pub fn depth(texture: Texture) -> Self {
        Self {
            depth_stencil: Some(texture),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_color(mut self, texture: Texture) -> Self {
        self.colors.push(texture);
        self
    }

    #[must_use]
    pub fn with_depth(mut self, texture: Texture) -> Self {
        self.depth_stencil = Some(texture);
        self
    }

    #[must_use]
    pub fn at_layer(mut self, layer: u32) -> Self {
        self.layer = layer;
        self
    }

    /// Size of the first attachment.
    #[must_use]
    pub fn size(&self) -> Option<UVec2> {
        self.colors
            .first()
            .or(self.depth_stencil.as_ref())
            .map(Texture::size)
    }

    #[must_use]
    pub fn sample_count(&self) -> u32 {
        self.colors
            .first()
            .or(self.depth_stencil.as_ref())
            .map_or(1, |t| t.desc.sample_count)
    }
}

/// Evaluates `new <compare> stored`, the way depth and stencil tests do.
#[must_use]
pub fn compare<T: PartialOrd>(compare: wgpu::CompareFunction, new: T, stored: T) -> bool {
    use wgpu::CompareFunction as C;
    match compare {
        C::Never => false,
        C::Less => new < stored,
        C::Equal => new == stored,
        C::LessEqual => new <= stored,
        C::Greater => new > stored,
        C::NotEqual => new != stored,
        C::GreaterEqual => new >= stored,
        C::Always => true,
    }
}

/// Applies a stencil operation to a stored value.
#[must_use]
pub fn apply_stencil_op(op: wgpu::StencilOperation, stored: u8, reference: u8) -> u8 {
    use wgpu::StencilOperation as S;
    match op {
        S::Keep => stored,
        S::Zero => 0,
        S::Replace => reference,
        S::Invert => !stored,
        S::IncrementClamp => stored.saturating_add(1),
        S::DecrementClamp => stored.saturating_sub(1),
        S::IncrementWrap => stored.wrapping_add(1),
        S::DecrementWrap => stored.wrapping_sub(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scissor_contains_is_half_open() {
        let s = Scissor {
            x: 2,
            y: 2,
            width: 4,
            height: 4,
        };
        assert!(s.contains(2, 2));
        assert!(s.contains(5, 5));
        assert!(!s.contains(6, 5));
        assert!(!s.contains(1, 3));
    }

    #[test]
    fn stencil_compare_uses_reference_first() {
        // NotEqual 0 passes wherever the stored stencil is set.
        assert!(compare(wgpu::CompareFunction::NotEqual, 0u8, 1u8));
        assert!(!compare(wgpu::CompareFunction::NotEqual, 0u8, 0u8));
        assert!(compare(wgpu::CompareFunction::Less, 0.2f32, 0.5f32));
    }
}
