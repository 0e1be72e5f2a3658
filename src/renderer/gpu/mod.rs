//! wgpu Backend
//!
//! A [`RenderContext`](crate::renderer::core::RenderContext) on a real GPU.
//! Programs are WGSL modules looked up by program name, specialised with the
//! program's defines and bound by the names passes already use.
//!
//! - [`device`]: the [`GpuDevice`]
//! - [`settings`]: adapter and device requirements
//! - [`shaders`]: WGSL sources, binding tables and the built-in programs
//! - [`texels`]: texel packing for uploads and readbacks

pub mod device;
pub mod settings;
pub mod shaders;
pub mod texels;

pub use device::GpuDevice;
pub use settings::GpuSettings;
pub use shaders::{BindingKind, ShaderBinding, ShaderSource};
