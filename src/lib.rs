#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod errors;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod utils;

pub use errors::{AoError, Result};
pub use renderer::core::{ProgramDesc, ProgramVars, RenderContext, Texture, TextureDesc};
pub use renderer::graph::{FrameContext, RenderData, RenderGraph, RenderPass};
pub use renderer::gpu::{GpuDevice, GpuSettings};
pub use renderer::guard_band::{GuardBandInfo, compute_scissor_and_viewport};
pub use renderer::passes::{
    DepthNormalPrepass, DepthPeelingPass, GuardBandPass, HbaoPass, LinearizeDepthPass,
    StochasticDepth, StochasticDepthRaster, StochasticDepthRay, SvaoPass, VaoPass, create_pass,
};
pub use renderer::software::{DeviceSettings, SoftwareDevice};
pub use resources::{DepthMode, Properties, ShaderDefines, StratifiedTable};
pub use scene::{Camera, Mesh, Scene};
pub use utils::interner;
