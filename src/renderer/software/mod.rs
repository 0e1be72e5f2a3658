//! Software Reference Device
//!
//! A CPU implementation of [`RenderContext`](crate::renderer::core::RenderContext).
//! Programs are Rust kernels looked up by name; rasterization and ray
//! tracing run against the brute-force triangle [`Scene`](crate::scene::Scene).
//! Every command is executed synchronously in submission order and logged,
//! which makes whole render graphs testable without an adapter.
//!
//! - [`device`]: the [`SoftwareDevice`], its command log and statistics
//! - [`invocation`]: what a kernel sees while it runs
//! - [`kernels`]: the reference kernels
//! - [`settings`]: capability switches
//! - [`storage`]: texel storage of one texture

pub mod device;
pub mod invocation;
pub mod kernels;
pub mod settings;
pub mod storage;

pub use device::{Command, DeviceStats, SoftwareDevice};
pub use invocation::{Fragment, FragmentOutput, Invocation, KernelFn, Launch};
pub use settings::DeviceSettings;
