//! wgpu Device
//!
//! [`GpuDevice`] implements [`RenderContext`] on a wgpu device and queue.
//! Every command is encoded into its own command buffer and submitted
//! immediately, so submission order is the recording order.
//!
//! Supported: texture and buffer lifetimes, texel upload and readback,
//! color and depth/stencil clears, compute dispatch and full-screen draws
//! into color targets. Scene rasterization and ray tracing report
//! [`AoError::UnsupportedFeature`] and [`AoError::RayTracingUnsupported`];
//! graphs that need them run on the
//! [`SoftwareDevice`](crate::renderer::software::SoftwareDevice).

use std::borrow::Cow;
use std::time::Duration;

use glam::{UVec3, Vec4};
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use smallvec::SmallVec;
use wgpu::util::DeviceExt;

use crate::errors::{AoError, Result};
use crate::renderer::core::context::RenderContext;
use crate::renderer::core::program::{ProgramCache, ProgramDesc, ProgramId, ProgramKind};
use crate::renderer::core::state::{GraphicsState, RenderTargets};
use crate::renderer::core::texture::{
    BufferId, TexelData, Texture, TextureDesc, TextureId, channel_count, has_stencil,
    is_depth_format,
};
use crate::renderer::core::vars::ProgramVars;
use crate::renderer::gpu::settings::GpuSettings;
use crate::renderer::gpu::shaders::{self, BindingKind, ShaderBinding, ShaderSource};
use crate::renderer::gpu::texels;

const READBACK_TIMEOUT: Duration = Duration::from_secs(5);

fn copy_aspect(format: wgpu::TextureFormat) -> wgpu::TextureAspect {
    if is_depth_format(format) {
        wgpu::TextureAspect::DepthOnly
    } else {
        wgpu::TextureAspect::All
    }
}

struct GpuTexture {
    texture: wgpu::Texture,
    /// Sampling/storage view: every layer, depth aspect only for
    /// depth-stencil formats.
    view: wgpu::TextureView,
    desc: TextureDesc,
}

impl GpuTexture {
    /// Attachment view of a single layer.
    fn layer_view(&self, layer: u32) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(self.desc.label),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_array_layer: layer,
            array_layer_count: Some(1),
            ..Default::default()
        })
    }
}

enum Stage {
    Compute {
        pipeline: wgpu::ComputePipeline,
        layout: wgpu::BindGroupLayout,
    },
    /// Render pipelines are built per target format set.
    FullScreen { module: wgpu::ShaderModule },
}

struct GpuProgram {
    name: &'static str,
    stage: Stage,
    bindings: Vec<ShaderBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FullScreenKey {
    program: ProgramId,
    formats: SmallVec<[wgpu::TextureFormat; 4]>,
    samples: u32,
}

struct FullScreenPipeline {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
}

pub struct GpuDevice {
    adapter_info: wgpu::AdapterInfo,
    device: wgpu::Device,
    queue: wgpu::Queue,
    textures: SlotMap<TextureId, GpuTexture>,
    buffers: SlotMap<BufferId, wgpu::Buffer>,
    programs: ProgramCache,
    compiled: Vec<GpuProgram>,
    fullscreen: FxHashMap<FullScreenKey, FullScreenPipeline>,
    sources: FxHashMap<&'static str, ShaderSource>,
}

impl GpuDevice {
    /// Requests an adapter and a device, blocking until both are ready.
    pub fn new(settings: &GpuSettings) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: settings.power_preference,
            compatible_surface: None,
            force_fallback_adapter: settings.force_fallback,
        }))
        .map_err(|e| AoError::AdapterRequestFailed(e.to_string()))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("myth-ao"),
            required_features: settings.required_features,
            required_limits: settings.required_limits.clone(),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        }))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "GPU device ready: {} ({:?})",
            adapter_info.name,
            adapter_info.backend
        );

        Ok(Self::from_parts(adapter_info, device, queue))
    }

    /// Wraps an existing device, e.g. one shared with a windowed renderer.
    #[must_use]
    pub fn from_parts(adapter_info: wgpu::AdapterInfo, device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            adapter_info,
            device,
            queue,
            textures: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            programs: ProgramCache::new(),
            compiled: Vec::new(),
            fullscreen: FxHashMap::default(),
            sources: shaders::builtin_sources().into_iter().collect(),
        }
    }

    #[must_use]
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Registers (or replaces) the WGSL behind a program name.
    ///
    /// Variants compiled before the call keep the previous source.
    pub fn register_shader(&mut self, name: &'static str, source: ShaderSource) -> &mut Self {
        self.sources.insert(name, source);
        self
    }

    #[must_use]
    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    // === Internals ===

    fn texture(&self, texture: Texture) -> Result<&GpuTexture> {
        self.textures.get(texture.id).ok_or(AoError::InvalidTexture)
    }

    fn program(&self, program: ProgramId) -> Result<&GpuProgram> {
        self.compiled
            .get(program.index())
            .ok_or_else(|| AoError::ShaderNotFound(format!("program #{}", program.index())))
    }

    fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(Some(encoder.finish()));
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Usage flags the backend needs on top of the requested ones, limited
    /// to what the format allows.
    fn texture_usage(&self, desc: &TextureDesc) -> wgpu::TextureUsages {
        let wanted = desc.usage
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::STORAGE_BINDING;
        let mut allowed = desc
            .format
            .guaranteed_format_features(self.device.features())
            .allowed_usages;
        if desc.sample_count > 1 {
            allowed -= wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST;
        }
        wanted & allowed
    }

    fn compile(
        device: &wgpu::Device,
        sources: &FxHashMap<&'static str, ShaderSource>,
        desc: &ProgramDesc,
    ) -> Result<GpuProgram> {
        match desc.kind {
            ProgramKind::RayTracing => return Err(AoError::RayTracingUnsupported),
            ProgramKind::Raster => {
                return Err(AoError::UnsupportedFeature {
                    pass: desc.name.to_string(),
                    feature: "scene rasterization on the GPU backend".to_string(),
                });
            }
            ProgramKind::Compute | ProgramKind::FullScreen => {}
        }
        let source = sources
            .get(desc.name)
            .ok_or_else(|| AoError::ShaderNotFound(desc.name.to_string()))?;
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.name),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(source.specialize(&desc.defines))),
        });

        let stage = if desc.kind == ProgramKind::Compute {
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(desc.name),
                layout: None,
                module: &module,
                entry_point: Some("main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });
            let layout = pipeline.get_bind_group_layout(0);
            Stage::Compute { pipeline, layout }
        } else {
            Stage::FullScreen { module }
        };

        Ok(GpuProgram {
            name: desc.name,
            stage,
            bindings: source.bindings.clone(),
        })
    }

    fn ensure_fullscreen(&mut self, key: FullScreenKey) -> Result<&FullScreenPipeline> {
        let program = self
            .compiled
            .get(key.program.index())
            .ok_or_else(|| AoError::ShaderNotFound(format!("program #{}", key.program.index())))?;
        let Stage::FullScreen { module } = &program.stage else {
            return Err(AoError::ShaderNotFound(format!("{} as FullScreen", program.name)));
        };
        let device = &self.device;
        let name = program.name;
        Ok(self.fullscreen.entry(key).or_insert_with_key(|key| {
            log::debug!("Building full-screen pipeline '{name}' for {:?}", key.formats);
            let targets: SmallVec<[Option<wgpu::ColorTargetState>; 4]> = key
                .formats
                .iter()
                .map(|&format| {
                    Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })
                })
                .collect();
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(name),
                layout: None,
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some("fs_main"),
                    targets: &targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState {
                    count: key.samples,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview_mask: None,
                cache: None,
            });
            let layout = pipeline.get_bind_group_layout(0);
            FullScreenPipeline { pipeline, layout }
        }))
    }

    /// Resolves every registered binding of `program` against `vars`.
    fn bind_group(
        &self,
        program: &GpuProgram,
        layout: &wgpu::BindGroupLayout,
        vars: &ProgramVars,
    ) -> Result<wgpu::BindGroup> {
        let missing = |name: &str| AoError::MissingResource {
            pass: program.name.to_string(),
            name: name.to_string(),
        };

        let mut uniforms = Vec::new();
        for binding in program.bindings.iter().filter(|b| b.kind == BindingKind::Constants) {
            let bytes = vars.constant_bytes(binding.name).ok_or_else(|| missing(binding.name))?;
            // Uniform blocks are sized in multiples of 16 bytes.
            let mut padded = bytes.to_vec();
            padded.resize(bytes.len().div_ceil(16).max(1) * 16, 0);
            uniforms.push(self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(binding.name),
                contents: &padded,
                usage: wgpu::BufferUsages::UNIFORM,
            }));
        }

        let mut uniforms = uniforms.iter();
        let mut entries = Vec::with_capacity(program.bindings.len());
        for binding in &program.bindings {
            let resource = match binding.kind {
                BindingKind::Texture | BindingKind::StorageTexture => {
                    let texture = vars.texture(binding.name).ok_or_else(|| missing(binding.name))?;
                    wgpu::BindingResource::TextureView(&self.texture(texture)?.view)
                }
                BindingKind::Constants => uniforms
                    .next()
                    .ok_or_else(|| missing(binding.name))?
                    .as_entire_binding(),
                BindingKind::Buffer => {
                    let id = vars.buffer(binding.name).ok_or_else(|| missing(binding.name))?;
                    self.buffers
                        .get(id)
                        .ok_or(AoError::InvalidTexture)?
                        .as_entire_binding()
                }
            };
            entries.push(wgpu::BindGroupEntry {
                binding: binding.binding,
                resource,
            });
        }

        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(program.name),
            layout,
            entries: &entries,
        }))
    }

    fn storage_buffer(&self, label: &'static str, data: &[u32]) -> wgpu::Buffer {
        // Zero-sized bindings are invalid.
        let contents: &[u32] = if data.is_empty() { &[0] } else { data };
        self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(contents),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
        })
    }

    fn unsupported(pass: &str, feature: &str) -> AoError {
        AoError::UnsupportedFeature {
            pass: pass.to_string(),
            feature: feature.to_string(),
        }
    }
}

impl RenderContext for GpuDevice {
    // ========================================================================
    // Resources
    // ========================================================================

    fn create_texture(&mut self, desc: TextureDesc) -> Texture {
        let usage = self.texture_usage(&desc);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.array_layers,
            },
            mip_level_count: 1,
            sample_count: desc.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(desc.label),
            dimension: Some(if desc.array_layers > 1 {
                wgpu::TextureViewDimension::D2Array
            } else {
                wgpu::TextureViewDimension::D2
            }),
            aspect: if has_stencil(desc.format) {
                wgpu::TextureAspect::DepthOnly
            } else {
                wgpu::TextureAspect::All
            },
            ..Default::default()
        });
        let id = self.textures.insert(GpuTexture {
            texture,
            view,
            desc,
        });
        log::trace!("Created GPU texture '{}' {}x{} ({usage:?})", desc.label, desc.width, desc.height);
        Texture { id, desc }
    }

    fn destroy_texture(&mut self, texture: Texture) {
        if let Some(gpu) = self.textures.remove(texture.id) {
            gpu.texture.destroy();
        }
    }

    fn is_texture_alive(&self, texture: Texture) -> bool {
        self.textures.contains_key(texture.id)
    }

    fn write_texture(&mut self, texture: Texture, layer: u32, data: &[f32]) -> Result<()> {
        let gpu = self.texture(texture)?;
        let desc = gpu.desc;
        if desc.sample_count > 1 {
            return Err(Self::unsupported(desc.label, "uploads to multisampled textures"));
        }
        if is_depth_format(desc.format) && desc.format != wgpu::TextureFormat::Depth16Unorm {
            return Err(Self::unsupported(desc.label, "uploads to this depth format"));
        }
        if layer >= desc.array_layers || data.len() != desc.pixel_count() * channel_count(desc.format) {
            return Err(AoError::InvalidTexture);
        }

        let bytes = texels::encode(desc.format, data)?;
        let row = desc.width as usize * texels::texel_size(desc.format)?;
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &gpu.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: copy_aspect(desc.format),
            },
            &bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(row as u32),
                rows_per_image: Some(desc.height),
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn read_texture(&self, texture: Texture) -> Result<TexelData> {
        let gpu = self.texture(texture)?;
        let desc = gpu.desc;
        if desc.sample_count > 1 {
            return Err(Self::unsupported(desc.label, "readback of multisampled textures"));
        }
        let tight = desc.width as usize * texels::texel_size(desc.format)?;
        let padded = texels::padded_row_size(tight);
        let layer_bytes = padded * desc.height as usize;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size: (layer_bytes * desc.array_layers as usize) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.encoder("Readback");
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &gpu.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: copy_aspect(desc.format),
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded as u32),
                    rows_per_image: Some(desc.height),
                },
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.array_layers,
            },
        );
        self.submit(encoder);

        let slice = staging.slice(..);
        let (sender, receiver) = flume::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: Some(READBACK_TIMEOUT),
            })
            .map_err(|e| AoError::Readback(e.to_string()))?;
        receiver
            .recv()
            .map_err(|e| AoError::Readback(e.to_string()))?
            .map_err(|e| AoError::Readback(e.to_string()))?;

        let mut data = Vec::with_capacity(
            desc.pixel_count() * channel_count(desc.format) * desc.array_layers as usize,
        );
        {
            let mapped = slice.get_mapped_range();
            for layer in 0..desc.array_layers as usize {
                texels::decode_rows(
                    desc.format,
                    &mapped[layer * layer_bytes..(layer + 1) * layer_bytes],
                    desc.width as usize,
                    desc.height as usize,
                    padded,
                    &mut data,
                )?;
            }
        }
        staging.unmap();

        Ok(TexelData {
            desc,
            data,
            stencil: None,
        })
    }

    fn create_buffer(&mut self, label: &'static str, data: &[u32]) -> BufferId {
        let buffer = self.storage_buffer(label, data);
        self.buffers.insert(buffer)
    }

    fn write_buffer(&mut self, buffer: BufferId, data: &[u32]) -> Result<()> {
        let size = std::mem::size_of_val(data) as u64;
        let current = self.buffers.get(buffer).ok_or(AoError::InvalidTexture)?;
        if size <= current.size() {
            self.queue.write_buffer(current, 0, bytemuck::cast_slice(data));
        } else {
            let grown = self.storage_buffer("Structured Buffer", data);
            if let Some(slot) = self.buffers.get_mut(buffer) {
                slot.destroy();
                *slot = grown;
            }
        }
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some(buffer) = self.buffers.remove(buffer) {
            buffer.destroy();
        }
    }

    // ========================================================================
    // Programs
    // ========================================================================

    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId> {
        let device = &self.device;
        let sources = &self.sources;
        let mut built = None;
        let (id, created) = self.programs.get_or_insert(desc, |d| {
            built = Some(Self::compile(device, sources, d)?);
            Ok(())
        })?;
        if created && let Some(program) = built {
            debug_assert_eq!(id.index(), self.compiled.len());
            self.compiled.push(program);
            log::debug!("Compiled GPU program '{}' ({} defines)", desc.name, desc.defines.len());
        }
        Ok(id)
    }

    fn supports_ray_tracing(&self) -> bool {
        false
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn clear_texture(&mut self, texture: Texture, value: Vec4) -> Result<()> {
        if is_depth_format(texture.format()) {
            return self.clear_depth_stencil(texture, Some(value.x), None);
        }
        let gpu = self.texture(texture)?;
        let color = wgpu::Color {
            r: f64::from(value.x),
            g: f64::from(value.y),
            b: f64::from(value.z),
            a: f64::from(value.w),
        };
        let mut encoder = self.encoder("Clear Texture");
        for layer in 0..gpu.desc.array_layers {
            let view = gpu.layer_view(layer);
            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(gpu.desc.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                ..Default::default()
            });
        }
        self.submit(encoder);
        Ok(())
    }

    fn clear_depth_stencil(
        &mut self,
        texture: Texture,
        depth: Option<f32>,
        stencil: Option<u8>,
    ) -> Result<()> {
        let gpu = self.texture(texture)?;
        let stencil = stencil.filter(|_| has_stencil(gpu.desc.format));
        if depth.is_none() && stencil.is_none() {
            return Ok(());
        }
        let mut encoder = self.encoder("Clear Depth Stencil");
        for layer in 0..gpu.desc.array_layers {
            let view = gpu.layer_view(layer);
            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(gpu.desc.label),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &view,
                    depth_ops: depth.map(|d| wgpu::Operations {
                        load: wgpu::LoadOp::Clear(d),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: stencil.map(|s| wgpu::Operations {
                        load: wgpu::LoadOp::Clear(u32::from(s)),
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }
        self.submit(encoder);
        Ok(())
    }

    fn dispatch(&mut self, program: ProgramId, vars: &ProgramVars, groups: UVec3) -> Result<()> {
        let gpu_program = self.program(program)?;
        let Stage::Compute { pipeline, layout } = &gpu_program.stage else {
            return Err(AoError::ShaderNotFound(format!("{} as Compute", gpu_program.name)));
        };
        let bind_group = self.bind_group(gpu_program, layout, vars)?;

        let mut encoder = self.encoder(gpu_program.name);
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(gpu_program.name),
                timestamp_writes: None,
            });
            cpass.set_pipeline(pipeline);
            cpass.set_bind_group(0, &bind_group, &[]);
            cpass.dispatch_workgroups(groups.x, groups.y, groups.z);
        }
        self.submit(encoder);
        Ok(())
    }

    fn draw_fullscreen(
        &mut self,
        program: ProgramId,
        vars: &ProgramVars,
        targets: &RenderTargets,
        state: &GraphicsState,
    ) -> Result<()> {
        let name = self.program(program)?.name;
        if targets.depth_stencil.is_some() || state.stencil.is_some() {
            return Err(Self::unsupported(name, "depth-stencil targets on the GPU backend"));
        }
        if state.scissor.is_some_and(|s| s.is_empty()) {
            return Ok(());
        }
        let key = FullScreenKey {
            program,
            formats: targets.colors.iter().map(Texture::format).collect(),
            samples: targets.colors.first().map_or(1, |t| t.desc.sample_count),
        };
        self.ensure_fullscreen(key.clone())?;

        let gpu_program = self.program(program)?;
        let Some(variant) = self.fullscreen.get(&key) else {
            return Err(AoError::ShaderNotFound(name.to_string()));
        };
        let bind_group = self.bind_group(gpu_program, &variant.layout, vars)?;
        let views = targets
            .colors
            .iter()
            .map(|t| self.texture(*t).map(|gpu| gpu.layer_view(targets.layer)))
            .collect::<Result<SmallVec<[wgpu::TextureView; 4]>>>()?;
        let attachments: SmallVec<[Option<wgpu::RenderPassColorAttachment>; 4]> = views
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();

        let mut encoder = self.encoder(name);
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(name),
                color_attachments: &attachments,
                ..Default::default()
            });
            pass.set_pipeline(&variant.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            if let Some(vp) = state.viewport {
                pass.set_viewport(vp.x, vp.y, vp.width, vp.height, vp.min_depth, vp.max_depth);
            }
            if let Some(s) = state.scissor {
                pass.set_scissor_rect(s.x, s.y, s.width, s.height);
            }
            pass.draw(0..3, 0..1); // fullscreen triangle
        }
        self.submit(encoder);
        Ok(())
    }

    fn rasterize_scene(
        &mut self,
        program: ProgramId,
        _vars: &ProgramVars,
        _targets: &RenderTargets,
        _state: &GraphicsState,
    ) -> Result<()> {
        let name = self.program(program)?.name;
        Err(Self::unsupported(name, "scene rasterization on the GPU backend"))
    }

    fn trace_rays(&mut self, _program: ProgramId, _vars: &ProgramVars, _dims: UVec3) -> Result<()> {
        Err(AoError::RayTracingUnsupported)
    }
}
