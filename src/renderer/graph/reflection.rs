//! Pass Reflection
//!
//! Before compiling, every pass declares its named resource fields. Inputs
//! are bound to upstream outputs (or graph inputs); outputs and internals
//! are allocated by the graph from the description given here.
//!
//! A field's final shape may depend on what is connected upstream, which is
//! why [`reflect`](super::RenderPass::reflect) receives a [`CompileData`]
//! carrying the descriptors of already-resolved inputs.

use bitflags::bitflags;
use glam::UVec2;
use rustc_hash::FxHashMap;

use crate::renderer::core::texture::TextureDesc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Input,
    Output,
    /// Scratch texture owned by the pass for the lifetime of the compiled graph.
    Internal,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FieldFlags: u8 {
        /// Input that may be left unconnected.
        const OPTIONAL = 1 << 0;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDesc {
    pub name: &'static str,
    pub kind: FieldKind,
    pub flags: FieldFlags,
    /// Defaults to `R32Float` for allocated fields.
    pub format: Option<wgpu::TextureFormat>,
    /// Defaults to the graph's default dimensions.
    pub size: Option<UVec2>,
    pub array_layers: u32,
    pub sample_count: u32,
    pub description: &'static str,
}

impl FieldDesc {
    fn new(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            flags: FieldFlags::empty(),
            format: None,
            size: None,
            array_layers: 1,
            sample_count: 1,
            description,
        }
    }

    pub fn format(&mut self, format: wgpu::TextureFormat) -> &mut Self {
        self.format = Some(format);
        self
    }

    pub fn size(&mut self, size: UVec2) -> &mut Self {
        self.size = Some(size);
        self
    }

    pub fn layers(&mut self, layers: u32) -> &mut Self {
        self.array_layers = layers.max(1);
        self
    }

    pub fn samples(&mut self, samples: u32) -> &mut Self {
        self.sample_count = samples.max(1);
        self
    }

    pub fn optional(&mut self) -> &mut Self {
        self.flags |= FieldFlags::OPTIONAL;
        self
    }

    #[inline]
    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.flags.contains(FieldFlags::OPTIONAL)
    }

    /// Texture descriptor used when the graph allocates this field.
    #[must_use]
    pub fn texture_desc(&self, default_dims: UVec2) -> TextureDesc {
        TextureDesc::new_2d(
            self.name,
            self.size.unwrap_or(default_dims),
            self.format.unwrap_or(wgpu::TextureFormat::R32Float),
        )
        .with_layers(self.array_layers)
        .with_samples(self.sample_count)
        .with_usage(
            wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT,
        )
    }
}

/// Fields declared by one pass.
#[derive(Debug, Clone, Default)]
pub struct RenderPassReflection {
    fields: Vec<FieldDesc>,
}

impl RenderPassReflection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&mut self, name: &'static str, description: &'static str) -> &mut FieldDesc {
        self.add(FieldDesc::new(name, FieldKind::Input, description))
    }

    pub fn add_output(&mut self, name: &'static str, description: &'static str) -> &mut FieldDesc {
        self.add(FieldDesc::new(name, FieldKind::Output, description))
    }

    pub fn add_internal(&mut self, name: &'static str, description: &'static str) -> &mut FieldDesc {
        self.add(FieldDesc::new(name, FieldKind::Internal, description))
    }

    fn add(&mut self, field: FieldDesc) -> &mut FieldDesc {
        self.fields.retain(|f| f.name != field.name);
        self.fields.push(field);
        let last = self.fields.len() - 1;
        &mut self.fields[last]
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDesc] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDesc> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// What a pass knows about its surroundings while reflecting and compiling.
#[derive(Debug, Clone, Default)]
pub struct CompileData {
    pub default_dims: UVec2,
    /// Descriptors of the textures bound to this pass's connected inputs.
    pub connected: FxHashMap<&'static str, TextureDesc>,
}

impl CompileData {
    #[must_use]
    pub fn new(default_dims: UVec2) -> Self {
        Self {
            default_dims,
            connected: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn connected(&self, name: &str) -> Option<&TextureDesc> {
        self.connected.get(name)
    }
}
