//! Diagnostic texture export.
//!
//! Dumps textures to a directory for offline inspection:
//!
//! | File                 | Content                                         |
//! |----------------------|-------------------------------------------------|
//! | `<name>.npy`         | `float32` array shaped `(layers, H, W, C)`      |
//! | `<name>_<layer>.png` | 8-bit grayscale of channel 0, min–max stretched |
//! | `index.json`         | one [`ExportEntry`] per texture                 |
//!
//! The `.npy` writer emits format version 1.0 with a little-endian `<f4`
//! payload in C order.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::errors::Result;
use crate::renderer::core::context::RenderContext;
use crate::renderer::core::texture::{TexelData, Texture, channel_count};

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

/// One exported texture as listed in `index.json`.
#[derive(Debug, Clone, Serialize)]
pub struct ExportEntry {
    pub name: String,
    pub file: String,
    pub shape: [usize; 4],
    pub format: String,
    pub previews: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ExportIndex<'a> {
    pass: &'a str,
    frame: u64,
    entries: &'a [ExportEntry],
}

/// Writes every `(name, texture)` pair into `dir` and returns the entries
/// listed in the written index.
pub fn export_textures(
    ctx: &dyn RenderContext,
    dir: &Path,
    pass: &str,
    frame: u64,
    textures: &[(&str, Texture)],
) -> Result<Vec<ExportEntry>> {
    fs::create_dir_all(dir)?;
    let mut entries = Vec::with_capacity(textures.len());
    for &(name, texture) in textures {
        let texels = ctx.read_texture(texture)?;
        entries.push(export_one(dir, name, &texels)?);
    }
    let index = ExportIndex {
        pass,
        frame,
        entries: &entries,
    };
    fs::write(dir.join("index.json"), serde_json::to_vec_pretty(&index)?)?;
    log::info!("{pass}: exported {} textures to {}", entries.len(), dir.display());
    Ok(entries)
}

fn export_one(dir: &Path, name: &str, texels: &TexelData) -> Result<ExportEntry> {
    let desc = texels.desc;
    let channels = channel_count(desc.format);
    // Samples of a multisampled texture are flattened into extra layers.
    let layers = (desc.array_layers * desc.sample_count) as usize;
    let shape = [layers, desc.height as usize, desc.width as usize, channels];

    let file = format!("{name}.npy");
    write_npy(&dir.join(&file), &shape, &texels.data)?;

    let plane = desc.pixel_count() * channels;
    let mut previews = Vec::with_capacity(layers);
    for layer in 0..layers {
        let values = texels.data[layer * plane..(layer + 1) * plane]
            .iter()
            .step_by(channels)
            .copied();
        let preview = format!("{name}_{layer}.png");
        write_preview(&dir.join(&preview), desc.width, desc.height, values)?;
        previews.push(preview);
    }

    Ok(ExportEntry {
        name: name.to_string(),
        file,
        shape,
        format: format!("{:?}", desc.format),
        previews,
    })
}

/// `.npy` header: magic, version, header length, then a Python dict literal
/// padded with spaces so the payload starts on a 64-byte boundary.
#[must_use]
pub fn npy_header(shape: &[usize]) -> Vec<u8> {
    let dims = match shape {
        [single] => format!("({single},)"),
        _ => format!(
            "({})",
            shape.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        ),
    };
    let mut dict = format!("{{'descr': '<f4', 'fortran_order': False, 'shape': {dims}, }}");
    let unpadded = NPY_MAGIC.len() + 2 + 2 + dict.len() + 1;
    dict.push_str(&" ".repeat(unpadded.next_multiple_of(64) - unpadded));
    dict.push('\n');

    let mut header = Vec::with_capacity(NPY_MAGIC.len() + 4 + dict.len());
    header.extend_from_slice(NPY_MAGIC);
    header.extend_from_slice(&[1, 0]);
    header.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    header.extend_from_slice(dict.as_bytes());
    header
}

fn write_npy(path: &Path, shape: &[usize], data: &[f32]) -> Result<()> {
    let mut file = std::io::BufWriter::new(fs::File::create(path)?);
    file.write_all(&npy_header(shape))?;
    file.write_all(bytemuck::cast_slice(data))?;
    file.flush()?;
    Ok(())
}

fn write_preview(
    path: &Path,
    width: u32,
    height: u32,
    values: impl Iterator<Item = f32> + Clone,
) -> Result<()> {
    let (lo, hi) = values
        .clone()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let span = if hi > lo { hi - lo } else { 1.0 };
    let lo = if lo.is_finite() { lo } else { 0.0 };
    let pixels: Vec<u8> = values
        .map(|v| (((v - lo) / span).clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();
    let image = image::GrayImage::from_raw(width, height, pixels)
        .ok_or_else(|| crate::errors::AoError::Image(format!("{width}x{height} preview size mismatch")))?;
    image.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn npy_header_is_aligned() {
        let header = npy_header(&[8, 4, 4, 1]);
        assert_eq!(header.len() % 64, 0);
        assert_eq!(&header[..6], NPY_MAGIC);
        assert_eq!(header.last(), Some(&b'\n'));
        let dict = std::str::from_utf8(&header[10..]).unwrap();
        assert!(dict.contains("'shape': (8, 4, 4, 1)"));
    }

    #[test]
    fn one_dimensional_shape_keeps_trailing_comma() {
        let header = npy_header(&[5]);
        let dict = std::str::from_utf8(&header[10..]).unwrap();
        assert!(dict.contains("'shape': (5,)"));
    }
}
