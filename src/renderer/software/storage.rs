//! Texel storage of the software device.

use glam::{UVec2, Vec4};

use crate::renderer::core::texture::{
    Quantization, TexelData, TextureDesc, channel_count, has_stencil, quantization, quantize,
};

/// Backing store of one texture: `f32` texels laid out
/// `[layer][sample][y][x][channel]`, plus stencil for depth-stencil formats.
#[derive(Debug, Clone)]
pub struct TextureStorage {
    pub desc: TextureDesc,
    channels: usize,
    quant: Quantization,
    data: Vec<f32>,
    stencil: Option<Vec<u8>>,
}

impl TextureStorage {
    #[must_use]
    pub fn new(desc: TextureDesc) -> Self {
        let channels = channel_count(desc.format);
        let texels = desc.pixel_count() * (desc.array_layers * desc.sample_count) as usize;
        Self {
            desc,
            channels,
            quant: quantization(desc.format),
            data: vec![0.0; texels * channels],
            stencil: has_stencil(desc.format).then(|| vec![0; texels]),
        }
    }

    #[inline]
    fn texel_index(&self, x: u32, y: u32, layer: u32, sample: u32) -> usize {
        let d = &self.desc;
        let layer = layer.min(d.array_layers - 1) as usize;
        let sample = sample.min(d.sample_count - 1) as usize;
        let pixel = y.min(d.height - 1) as usize * d.width as usize + x.min(d.width - 1) as usize;
        (layer * d.sample_count as usize + sample) * d.pixel_count() + pixel
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> UVec2 {
        self.desc.size()
    }

    /// Texel at clamped coordinates; unused channels read as zero.
    #[must_use]
    pub fn load(&self, x: u32, y: u32, layer: u32, sample: u32) -> Vec4 {
        let base = self.texel_index(x, y, layer, sample) * self.channels;
        let mut out = [0.0; 4];
        out[..self.channels].copy_from_slice(&self.data[base..base + self.channels]);
        Vec4::from_array(out)
    }

    /// Writes the channels the format has, quantized to its precision.
    /// Out-of-bounds writes are dropped.
    pub fn store(&mut self, x: u32, y: u32, layer: u32, sample: u32, value: Vec4) {
        if x >= self.desc.width || y >= self.desc.height || layer >= self.desc.array_layers {
            return;
        }
        let base = self.texel_index(x, y, layer, sample) * self.channels;
        let v = value.to_array();
        for c in 0..self.channels {
            self.data[base + c] = quantize(self.quant, v[c]);
        }
    }

    #[must_use]
    pub fn stencil(&self, x: u32, y: u32, layer: u32, sample: u32) -> u8 {
        let idx = self.texel_index(x, y, layer, sample);
        self.stencil.as_ref().map_or(0, |s| s[idx])
    }

    pub fn set_stencil(&mut self, x: u32, y: u32, layer: u32, sample: u32, value: u8) {
        let idx = self.texel_index(x, y, layer, sample);
        if let Some(s) = self.stencil.as_mut() {
            s[idx] = value;
        }
    }

    #[must_use]
    pub fn has_stencil(&self) -> bool {
        self.stencil.is_some()
    }

    /// Sets every texel of every layer and sample.
    pub fn fill(&mut self, value: Vec4) {
        let v = value.to_array();
        for (i, texel) in self.data.iter_mut().enumerate() {
            *texel = quantize(self.quant, v[i % self.channels]);
        }
    }

    pub fn fill_stencil(&mut self, value: u8) {
        if let Some(s) = self.stencil.as_mut() {
            s.fill(value);
        }
    }

    /// Replaces one layer (all samples) from `[sample][y][x][channel]` data.
    /// Returns `false` when the length does not match.
    pub fn write_layer(&mut self, layer: u32, data: &[f32]) -> bool {
        let len = self.desc.pixel_count() * self.desc.sample_count as usize * self.channels;
        if data.len() != len || layer >= self.desc.array_layers {
            return false;
        }
        let start = layer as usize * len;
        for (dst, src) in self.data[start..start + len].iter_mut().zip(data) {
            *dst = quantize(self.quant, *src);
        }
        true
    }

    #[must_use]
    pub fn to_texel_data(&self) -> TexelData {
        TexelData {
            desc: self.desc,
            data: self.data.clone(),
            stencil: self.stencil.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_quantizes_to_format() {
        let desc = TextureDesc::new_2d("ao", UVec2::new(2, 2), wgpu::TextureFormat::R8Unorm);
        let mut storage = TextureStorage::new(desc);
        storage.store(1, 1, 0, 0, Vec4::splat(0.5));
        assert!((storage.load(1, 1, 0, 0).x - 128.0 / 255.0).abs() < 1e-6);
        // Out of bounds is dropped, reads clamp.
        storage.store(5, 5, 0, 0, Vec4::ONE);
        assert!((storage.load(9, 9, 0, 0).x - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn depth_stencil_keeps_separate_stencil() {
        let desc = TextureDesc::new_2d(
            "sd",
            UVec2::new(2, 1),
            wgpu::TextureFormat::Depth24PlusStencil8,
        )
        .with_samples(4);
        let mut storage = TextureStorage::new(desc);
        storage.fill(Vec4::ONE);
        storage.set_stencil(0, 0, 0, 3, 1);
        assert_eq!(storage.stencil(0, 0, 0, 3), 1);
        assert_eq!(storage.stencil(0, 0, 0, 2), 0);
        assert!((storage.load(1, 0, 0, 1).x - 1.0).abs() < 1e-6);
    }
}
