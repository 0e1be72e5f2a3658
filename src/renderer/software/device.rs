//! CPU Reference Device
//!
//! [`SoftwareDevice`] implements [`RenderContext`] by running every program
//! as a Rust kernel, synchronously and in submission order. Besides the
//! results it keeps two kinds of bookkeeping for inspection:
//!
//! - a command log ([`Command`]), one entry per recorded command;
//! - [`DeviceStats`]: per-program invocation counts, program compilations
//!   and texture lifetimes.

use glam::{UVec3, Vec4};
use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use crate::errors::{AoError, Result};
use crate::renderer::core::context::RenderContext;
use crate::renderer::core::program::{ProgramCache, ProgramDesc, ProgramId, ProgramKind};
use crate::renderer::core::state::{GraphicsState, RenderTargets, SamplePositions, Scissor};
use crate::renderer::core::texture::{BufferId, TexelData, Texture, TextureDesc, TextureId};
use crate::renderer::core::vars::ProgramVars;
use crate::renderer::software::invocation::{Invocation, KernelFn, Launch};
use crate::renderer::software::kernels;
use crate::renderer::software::settings::DeviceSettings;
use crate::renderer::software::storage::TextureStorage;
use crate::utils::interner;

/// One recorded command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ClearTexture {
        texture: TextureId,
        label: &'static str,
        value: Vec4,
    },
    ClearDepthStencil {
        texture: TextureId,
        label: &'static str,
        depth: Option<f32>,
        stencil: Option<u8>,
    },
    Dispatch {
        program: &'static str,
        groups: UVec3,
        threads: UVec3,
    },
    DrawFullScreen {
        program: &'static str,
        layer: u32,
        scissor: Option<Scissor>,
    },
    Rasterize {
        program: &'static str,
        sample_positions: SamplePositions,
        stencil: bool,
        scissor: Option<Scissor>,
    },
    TraceRays {
        program: &'static str,
        dims: UVec3,
    },
}

impl Command {
    /// Program name for program launches.
    #[must_use]
    pub fn program(&self) -> Option<&'static str> {
        match self {
            Self::Dispatch { program, .. }
            | Self::DrawFullScreen { program, .. }
            | Self::Rasterize { program, .. }
            | Self::TraceRays { program, .. } => Some(*program),
            Self::ClearTexture { .. } | Self::ClearDepthStencil { .. } => None,
        }
    }

    #[must_use]
    pub fn is_launch(&self) -> bool {
        self.program().is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeviceStats {
    pub invocations: FxHashMap<&'static str, u32>,
    pub programs_compiled: u32,
    pub textures_created: u32,
    pub textures_destroyed: u32,
}

impl DeviceStats {
    #[must_use]
    pub fn invocation_count(&self, program: &str) -> u32 {
        self.invocations.get(program).copied().unwrap_or(0)
    }

    /// Launches of every program.
    #[must_use]
    pub fn total_launches(&self) -> u32 {
        self.invocations.values().sum()
    }
}

pub struct SoftwareDevice {
    settings: DeviceSettings,
    textures: SlotMap<TextureId, TextureStorage>,
    buffers: SlotMap<BufferId, Vec<u32>>,
    programs: ProgramCache,
    kernels: FxHashMap<&'static str, (ProgramKind, KernelFn)>,
    commands: Vec<Command>,
    stats: DeviceStats,
    launch_counter: u64,
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new(DeviceSettings::default())
    }
}

impl SoftwareDevice {
    #[must_use]
    pub fn new(settings: DeviceSettings) -> Self {
        interner::preload_common_defines();
        let kernels = kernels::registry()
            .into_iter()
            .map(|(name, kind, f)| (name, (kind, f)))
            .collect();
        Self {
            settings,
            textures: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            programs: ProgramCache::new(),
            kernels,
            commands: Vec::new(),
            stats: DeviceStats::default(),
            launch_counter: 0,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    /// Registers (or replaces) the kernel behind a program name.
    pub fn register_kernel(&mut self, name: &'static str, kind: ProgramKind, kernel: KernelFn) {
        self.kernels.insert(name, (kind, kernel));
    }

    // === Inspection ===

    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Returns the log and starts a new one.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    #[must_use]
    pub fn stats(&self) -> &DeviceStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = DeviceStats::default();
        self.commands.clear();
    }

    #[must_use]
    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Launches of `program` in the current command log.
    #[must_use]
    pub fn launches_of(&self, program: &str) -> usize {
        self.commands
            .iter()
            .filter(|c| c.program() == Some(program))
            .count()
    }

    // === Internals ===

    fn record(&mut self, command: Command) {
        log::trace!("{command:?}");
        if let Some(program) = command.program() {
            *self.stats.invocations.entry(program).or_insert(0) += 1;
        }
        if self.settings.record_commands {
            self.commands.push(command);
        }
    }

    fn storage_mut(&mut self, texture: Texture) -> Result<&mut TextureStorage> {
        self.textures
            .get_mut(texture.id)
            .ok_or(AoError::InvalidTexture)
    }

    fn validate_vars(&self, vars: &ProgramVars) -> Result<()> {
        for (name, texture) in vars.textures() {
            if !self.textures.contains_key(texture.id) {
                log::warn!("Texture bound as '{name}' is no longer alive");
                return Err(AoError::InvalidTexture);
            }
        }
        Ok(())
    }

    fn validate_targets(&self, targets: &RenderTargets) -> Result<()> {
        let alive = targets
            .colors
            .iter()
            .chain(targets.depth_stencil.iter())
            .all(|t| self.textures.contains_key(t.id));
        if alive { Ok(()) } else { Err(AoError::InvalidTexture) }
    }

    fn launch(&mut self, program: ProgramId, vars: &ProgramVars, launch: Launch<'_>) -> Result<()> {
        self.validate_vars(vars)?;
        let desc = self
            .programs
            .get(program)
            .ok_or_else(|| AoError::ShaderNotFound(format!("program #{}", program.index())))?;
        let (_, kernel) = *self
            .kernels
            .get(desc.name)
            .ok_or_else(|| AoError::ShaderNotFound(desc.name.to_string()))?;

        self.launch_counter += 1;
        let mut invocation = Invocation::new(
            desc,
            vars,
            launch,
            self.launch_counter,
            &mut self.textures,
            &self.buffers,
        );
        kernel(&mut invocation)
    }

    fn program_name(&self, program: ProgramId) -> Result<&'static str> {
        self.programs
            .get(program)
            .map(|d| d.name)
            .ok_or_else(|| AoError::ShaderNotFound(format!("program #{}", program.index())))
    }
}

impl RenderContext for SoftwareDevice {
    // ========================================================================
    // Resources
    // ========================================================================

    fn create_texture(&mut self, mut desc: TextureDesc) -> Texture {
        if desc.sample_count > self.settings.max_samples {
            log::warn!(
                "Texture '{}' requests {} samples, clamping to {}",
                desc.label,
                desc.sample_count,
                self.settings.max_samples
            );
            desc.sample_count = self.settings.max_samples;
        }
        let id = self.textures.insert(TextureStorage::new(desc));
        self.stats.textures_created += 1;
        log::trace!("Created texture '{}' {}x{}", desc.label, desc.width, desc.height);
        Texture { id, desc }
    }

    fn destroy_texture(&mut self, texture: Texture) {
        if self.textures.remove(texture.id).is_some() {
            self.stats.textures_destroyed += 1;
        }
    }

    fn is_texture_alive(&self, texture: Texture) -> bool {
        self.textures.contains_key(texture.id)
    }

    fn write_texture(&mut self, texture: Texture, layer: u32, data: &[f32]) -> Result<()> {
        if self.storage_mut(texture)?.write_layer(layer, data) {
            Ok(())
        } else {
            Err(AoError::InvalidTexture)
        }
    }

    fn read_texture(&self, texture: Texture) -> Result<TexelData> {
        self.textures
            .get(texture.id)
            .map(TextureStorage::to_texel_data)
            .ok_or(AoError::InvalidTexture)
    }

    fn create_buffer(&mut self, _label: &'static str, data: &[u32]) -> BufferId {
        self.buffers.insert(data.to_vec())
    }

    fn write_buffer(&mut self, buffer: BufferId, data: &[u32]) -> Result<()> {
        let slot = self.buffers.get_mut(buffer).ok_or(AoError::InvalidTexture)?;
        slot.clear();
        slot.extend_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(buffer);
    }

    // ========================================================================
    // Programs
    // ========================================================================

    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId> {
        let kernels = &self.kernels;
        let ray_tracing = self.settings.ray_tracing;
        let (id, created) = self.programs.get_or_insert(desc, |d| {
            let (kind, _) = kernels
                .get(d.name)
                .ok_or_else(|| AoError::ShaderNotFound(d.name.to_string()))?;
            if *kind != d.kind {
                return Err(AoError::ShaderNotFound(format!("{} as {:?}", d.name, d.kind)));
            }
            if d.kind == ProgramKind::RayTracing && !ray_tracing {
                return Err(AoError::RayTracingUnsupported);
            }
            Ok(())
        })?;
        if created {
            self.stats.programs_compiled += 1;
            log::debug!("Compiled program '{}' ({} defines)", desc.name, desc.defines.len());
        }
        Ok(id)
    }

    fn supports_ray_tracing(&self) -> bool {
        self.settings.ray_tracing
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn clear_texture(&mut self, texture: Texture, value: Vec4) -> Result<()> {
        self.storage_mut(texture)?.fill(value);
        self.record(Command::ClearTexture {
            texture: texture.id,
            label: texture.desc.label,
            value,
        });
        Ok(())
    }

    fn clear_depth_stencil(
        &mut self,
        texture: Texture,
        depth: Option<f32>,
        stencil: Option<u8>,
    ) -> Result<()> {
        let storage = self.storage_mut(texture)?;
        if let Some(d) = depth {
            storage.fill(Vec4::splat(d));
        }
        if let Some(s) = stencil {
            storage.fill_stencil(s);
        }
        self.record(Command::ClearDepthStencil {
            texture: texture.id,
            label: texture.desc.label,
            depth,
            stencil,
        });
        Ok(())
    }

    fn dispatch(&mut self, program: ProgramId, vars: &ProgramVars, groups: UVec3) -> Result<()> {
        let name = self.program_name(program)?;
        let threads = groups * self.programs.get(program).map_or(UVec3::ONE, |d| d.workgroup_size);
        self.record(Command::Dispatch {
            program: name,
            groups,
            threads,
        });
        self.launch(program, vars, Launch::Dispatch { groups })
    }

    fn draw_fullscreen(
        &mut self,
        program: ProgramId,
        vars: &ProgramVars,
        targets: &RenderTargets,
        state: &GraphicsState,
    ) -> Result<()> {
        self.validate_targets(targets)?;
        let name = self.program_name(program)?;
        self.record(Command::DrawFullScreen {
            program: name,
            layer: targets.layer,
            scissor: state.scissor,
        });
        self.launch(program, vars, Launch::FullScreen { targets, state })
    }

    fn rasterize_scene(
        &mut self,
        program: ProgramId,
        vars: &ProgramVars,
        targets: &RenderTargets,
        state: &GraphicsState,
    ) -> Result<()> {
        self.validate_targets(targets)?;
        let name = self.program_name(program)?;
        self.record(Command::Rasterize {
            program: name,
            sample_positions: state.sample_positions,
            stencil: state.stencil.is_some(),
            scissor: state.scissor,
        });
        self.launch(program, vars, Launch::Raster { targets, state })
    }

    fn trace_rays(&mut self, program: ProgramId, vars: &ProgramVars, dims: UVec3) -> Result<()> {
        if !self.settings.ray_tracing {
            return Err(AoError::RayTracingUnsupported);
        }
        let name = self.program_name(program)?;
        self.record(Command::TraceRays {
            program: name,
            dims,
        });
        self.launch(program, vars, Launch::Rays { dims })
    }
}
