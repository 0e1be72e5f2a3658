//! GPU Device Settings
//!
//! Adapter and device requirements of a [`GpuDevice`](super::GpuDevice).
//!
//! ```rust,ignore
//! use myth_ao::renderer::gpu::{GpuDevice, GpuSettings};
//!
//! // Prefer the integrated GPU, e.g. on laptops.
//! let device = GpuDevice::new(&GpuSettings {
//!     power_preference: wgpu::PowerPreference::LowPower,
//!     ..Default::default()
//! })?;
//! ```

/// Requirements used when requesting the adapter and device.
///
/// # Fields
///
/// | Field               | Description                                 | Default            |
/// |---------------------|---------------------------------------------|--------------------|
/// | `power_preference`  | Adapter selection hint                      | `HighPerformance`  |
/// | `required_features` | Features the device must expose             | `empty()`          |
/// | `required_limits`   | Limits the device must meet                 | `Limits::default()`|
/// | `force_fallback`    | Use the software (fallback) adapter         | `false`            |
#[derive(Debug, Clone)]
pub struct GpuSettings {
    pub power_preference: wgpu::PowerPreference,
    pub required_features: wgpu::Features,
    pub required_limits: wgpu::Limits,
    pub force_fallback: bool,
}

impl Default for GpuSettings {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            force_fallback: false,
        }
    }
}
