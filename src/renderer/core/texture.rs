//! Texture Handles and Descriptors
//!
//! A [`Texture`] is a `Copy` handle (`TextureId` + its [`TextureDesc`]). The
//! id is a generational slot-map key owned by the device, so a handle to a
//! destroyed texture is detectably stale rather than aliasing a new one.

use glam::{UVec2, Vec4};

slotmap::new_key_type! {
    /// Device-side identity of a texture.
    pub struct TextureId;

    /// Device-side identity of a structured buffer.
    pub struct BufferId;
}

/// Description of a 2D (array, optionally multisampled) texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub array_layers: u32,
    pub sample_count: u32,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
}

impl TextureDesc {
    #[must_use]
    pub fn new_2d(label: &'static str, size: UVec2, format: wgpu::TextureFormat) -> Self {
        Self {
            label,
            width: size.x.max(1),
            height: size.y.max(1),
            array_layers: 1,
            sample_count: 1,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
        }
    }

    #[must_use]
    pub fn with_layers(mut self, layers: u32) -> Self {
        self.array_layers = layers.max(1);
        self
    }

    #[must_use]
    pub fn with_samples(mut self, samples: u32) -> Self {
        self.sample_count = samples.max(1);
        self
    }

    #[must_use]
    pub fn with_usage(mut self, usage: wgpu::TextureUsages) -> Self {
        self.usage = usage;
        self
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    /// Texels per layer per sample.
    #[inline]
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Handle to a device texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Texture {
    pub id: TextureId,
    pub desc: TextureDesc,
}

impl Texture {
    #[inline]
    #[must_use]
    pub fn size(&self) -> UVec2 {
        self.desc.size()
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> wgpu::TextureFormat {
        self.desc.format
    }
}

// ============================================================================
// Format queries
// ============================================================================

/// Number of color channels stored per texel (depth formats report 1).
#[must_use]
pub fn channel_count(format: wgpu::TextureFormat) -> usize {
    use wgpu::TextureFormat as F;
    match format {
        F::Rg8Unorm | F::Rg8Uint | F::Rg16Float | F::Rg32Float | F::Rg32Uint => 2,
        F::Rgba8Unorm | F::Rgba8Uint | F::Rgba16Float | F::Rgba32Float | F::Rgba32Uint => 4,
        _ => 1,
    }
}

#[must_use]
pub fn is_depth_format(format: wgpu::TextureFormat) -> bool {
    use wgpu::TextureFormat as F;
    matches!(
        format,
        F::Depth16Unorm
            | F::Depth24Plus
            | F::Depth24PlusStencil8
            | F::Depth32Float
            | F::Depth32FloatStencil8
    )
}

#[must_use]
pub fn has_stencil(format: wgpu::TextureFormat) -> bool {
    use wgpu::TextureFormat as F;
    matches!(format, F::Depth24PlusStencil8 | F::Depth32FloatStencil8)
}

/// How a stored value is quantized on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantization {
    None,
    Unorm8,
    Unorm16,
    Unorm24,
    Half,
    Uint,
}

#[must_use]
pub fn quantization(format: wgpu::TextureFormat) -> Quantization {
    use wgpu::TextureFormat as F;
    match format {
        F::R8Unorm | F::Rg8Unorm | F::Rgba8Unorm => Quantization::Unorm8,
        F::Depth16Unorm => Quantization::Unorm16,
        F::Depth24Plus | F::Depth24PlusStencil8 => Quantization::Unorm24,
        F::R16Float | F::Rg16Float | F::Rgba16Float => Quantization::Half,
        F::R8Uint | F::Rg8Uint | F::Rgba8Uint | F::R32Uint | F::Rg32Uint | F::Rgba32Uint => {
            Quantization::Uint
        }
        _ => Quantization::None,
    }
}

/// Applies the storage precision of `q` to a value.
#[must_use]
pub fn quantize(q: Quantization, v: f32) -> f32 {
    match q {
        Quantization::None => v,
        Quantization::Unorm8 => (v.clamp(0.0, 1.0) * 255.0).round() / 255.0,
        Quantization::Unorm16 => (v.clamp(0.0, 1.0) * 65535.0).round() / 65535.0,
        Quantization::Unorm24 => (v.clamp(0.0, 1.0) * 16_777_215.0).round() / 16_777_215.0,
        Quantization::Half => half::f16::from_f32(v).to_f32(),
        Quantization::Uint => v.max(0.0).floor(),
    }
}

/// Texels read back from a texture.
///
/// `data` is laid out `[layer][sample][y][x][channel]`.
#[derive(Debug, Clone)]
pub struct TexelData {
    pub desc: TextureDesc,
    pub data: Vec<f32>,
    /// Present for depth-stencil formats; laid out `[layer][sample][y][x]`.
    pub stencil: Option<Vec<u8>>,
}

impl TexelData {
    #[inline]
    fn index(&self, x: u32, y: u32, layer: u32, sample: u32) -> usize {
        let d = &self.desc;
        let pixel = y as usize * d.width as usize + x as usize;
        let plane = (layer as usize * d.sample_count as usize + sample as usize) * d.pixel_count();
        plane + pixel
    }

    /// Texel value, unused channels are zero.
    #[must_use]
    pub fn texel(&self, x: u32, y: u32, layer: u32, sample: u32) -> Vec4 {
        let channels = channel_count(self.desc.format);
        let base = self.index(x, y, layer, sample) * channels;
        let mut out = [0.0; 4];
        out[..channels].copy_from_slice(&self.data[base..base + channels]);
        Vec4::from_array(out)
    }

    /// First channel of layer 0, sample 0.
    #[must_use]
    pub fn value(&self, x: u32, y: u32) -> f32 {
        self.texel(x, y, 0, 0).x
    }

    #[must_use]
    pub fn stencil(&self, x: u32, y: u32) -> Option<u8> {
        let idx = self.index(x, y, 0, 0);
        self.stencil.as_ref().map(|s| s[idx])
    }

    /// Every first-channel value of layer 0, sample 0.
    pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
        let channels = channel_count(self.desc.format);
        self.data[..self.desc.pixel_count() * channels]
            .iter()
            .step_by(channels)
            .copied()
    }
}
