//! Software Device Settings
//!
//! Capabilities the CPU reference device reports to the passes. Tests flip
//! them to exercise degraded paths (no ray tracing, sample-count limits)
//! without a real adapter.
//!
//! ```rust,ignore
//! use myth_ao::renderer::software::{DeviceSettings, SoftwareDevice};
//!
//! // A device that cannot build ray-tracing pipelines.
//! let device = SoftwareDevice::new(DeviceSettings {
//!     ray_tracing: false,
//!     ..Default::default()
//! });
//! ```

/// Capabilities and bookkeeping switches of a [`SoftwareDevice`].
///
/// # Fields
///
/// | Field             | Description                                     | Default |
/// |-------------------|-------------------------------------------------|---------|
/// | `ray_tracing`     | Ray-tracing programs can be created             | `true`  |
/// | `max_samples`     | Largest per-pixel sample count of a texture     | `16`    |
/// | `record_commands` | Keep the command log for inspection             | `true`  |
///
/// [`SoftwareDevice`]: super::SoftwareDevice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSettings {
    // === Capabilities ===
    /// When `false`, creating a [`RayTracing`](crate::renderer::core::ProgramKind::RayTracing)
    /// program fails and [`supports_ray_tracing`](crate::renderer::core::RenderContext::supports_ray_tracing)
    /// reports `false`, so passes fall back to compute.
    pub ray_tracing: bool,

    /// Textures requesting more samples are clamped (with a warning).
    pub max_samples: u32,

    // === Diagnostics ===
    /// Record every command in the device log. Statistics are kept either way.
    pub record_commands: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            ray_tracing: true,
            max_samples: 16,
            record_commands: true,
        }
    }
}
