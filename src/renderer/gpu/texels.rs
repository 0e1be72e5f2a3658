//! Texel Encoding
//!
//! Conversion between the `f32` texel layout of [`RenderContext`] uploads
//! and readbacks and the packed bytes of a wgpu texture format.
//!
//! [`RenderContext`]: crate::renderer::core::RenderContext

use crate::errors::{AoError, Result};
use crate::renderer::core::texture::channel_count;

/// Storage of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Unorm8,
    Uint8,
    Unorm16,
    Half,
    Float,
    Uint32,
}

impl Component {
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            Self::Unorm8 | Self::Uint8 => 1,
            Self::Unorm16 | Self::Half => 2,
            Self::Float | Self::Uint32 => 4,
        }
    }

    fn encode(self, v: f32, out: &mut Vec<u8>) {
        match self {
            Self::Unorm8 => out.push((v.clamp(0.0, 1.0) * 255.0).round() as u8),
            Self::Uint8 => out.push(v.clamp(0.0, 255.0) as u8),
            Self::Unorm16 => {
                out.extend_from_slice(&((v.clamp(0.0, 1.0) * 65535.0).round() as u16).to_le_bytes());
            }
            Self::Half => out.extend_from_slice(&half::f16::from_f32(v).to_le_bytes()),
            Self::Float => out.extend_from_slice(&v.to_le_bytes()),
            Self::Uint32 => out.extend_from_slice(&(v.max(0.0) as u32).to_le_bytes()),
        }
    }

    fn decode(self, bytes: &[u8]) -> f32 {
        match self {
            Self::Unorm8 => f32::from(bytes[0]) / 255.0,
            Self::Uint8 => f32::from(bytes[0]),
            Self::Unorm16 => f32::from(u16::from_le_bytes([bytes[0], bytes[1]])) / 65535.0,
            Self::Half => half::f16::from_le_bytes([bytes[0], bytes[1]]).to_f32(),
            Self::Float => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            Self::Uint32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
        }
    }
}

/// Channel storage of a copyable format. `None` for formats whose texels
/// cannot be copied to or from a buffer (packed depth, compressed).
#[must_use]
pub fn component(format: wgpu::TextureFormat) -> Option<Component> {
    use wgpu::TextureFormat as F;
    Some(match format {
        F::R8Unorm | F::Rg8Unorm | F::Rgba8Unorm => Component::Unorm8,
        F::R8Uint | F::Rg8Uint | F::Rgba8Uint => Component::Uint8,
        F::Depth16Unorm => Component::Unorm16,
        F::R16Float | F::Rg16Float | F::Rgba16Float => Component::Half,
        F::R32Float | F::Rg32Float | F::Rgba32Float | F::Depth32Float => Component::Float,
        F::R32Uint | F::Rg32Uint | F::Rgba32Uint => Component::Uint32,
        _ => return None,
    })
}

fn unsupported(format: wgpu::TextureFormat) -> AoError {
    AoError::UnsupportedFeature {
        pass: "GpuDevice".into(),
        feature: format!("texel copies of {format:?}"),
    }
}

/// Bytes per texel of a copyable format.
pub fn texel_size(format: wgpu::TextureFormat) -> Result<usize> {
    component(format)
        .map(|c| c.size() * channel_count(format))
        .ok_or_else(|| unsupported(format))
}

/// Packs `[y][x][channel]` values into tightly packed rows.
pub fn encode(format: wgpu::TextureFormat, values: &[f32]) -> Result<Vec<u8>> {
    let c = component(format).ok_or_else(|| unsupported(format))?;
    let mut out = Vec::with_capacity(values.len() * c.size());
    for &v in values {
        c.encode(v, &mut out);
    }
    Ok(out)
}

/// Unpacks `rows` rows of `width` texels from a buffer whose rows are
/// `padded_row` bytes apart, appending `[y][x][channel]` values to `out`.
pub fn decode_rows(
    format: wgpu::TextureFormat,
    bytes: &[u8],
    width: usize,
    rows: usize,
    padded_row: usize,
    out: &mut Vec<f32>,
) -> Result<()> {
    let c = component(format).ok_or_else(|| unsupported(format))?;
    let tight = width * channel_count(format) * c.size();
    for row in 0..rows {
        let start = row * padded_row;
        out.extend(bytes[start..start + tight].chunks_exact(c.size()).map(|b| c.decode(b)));
    }
    Ok(())
}

/// Row pitch satisfying `COPY_BYTES_PER_ROW_ALIGNMENT`.
#[must_use]
pub fn padded_row_size(tight: usize) -> usize {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize;
    tight.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unorm_and_half_quantize_on_the_way_through() {
        let format = wgpu::TextureFormat::Rg8Unorm;
        let bytes = encode(format, &[0.5, 2.0]).unwrap();
        assert_eq!(bytes, vec![128, 255]);

        let mut out = Vec::new();
        decode_rows(format, &bytes, 1, 1, 2, &mut out).unwrap();
        assert!((out[0] - 128.0 / 255.0).abs() < 1e-6);
        assert!((out[1] - 1.0).abs() < 1e-6);

        let bytes = encode(wgpu::TextureFormat::R16Float, &[0.1]).unwrap();
        assert_eq!(bytes.len(), 2);
    }

    #[test]
    fn padded_rows_are_skipped() {
        let format = wgpu::TextureFormat::R32Float;
        let pitch = padded_row_size(2 * 4);
        assert_eq!(pitch, 256);
        let mut bytes = vec![0u8; pitch * 2];
        bytes[..4].copy_from_slice(&1.0f32.to_le_bytes());
        bytes[pitch + 4..pitch + 8].copy_from_slice(&3.0f32.to_le_bytes());

        let mut out = Vec::new();
        decode_rows(format, &bytes, 2, 2, pitch, &mut out).unwrap();
        assert_eq!(out, vec![1.0, 0.0, 0.0, 3.0]);
    }

    #[test]
    fn packed_depth_cannot_be_copied() {
        assert!(texel_size(wgpu::TextureFormat::Depth24PlusStencil8).is_err());
        assert_eq!(texel_size(wgpu::TextureFormat::Rgba16Float).unwrap(), 8);
    }
}
