//! Core Data Definitions
//!
//! Host-independent data used by the AO passes:
//!
//! - [`ShaderDefines`]: interned define sets specialising programs
//! - [`Properties`]: serde-backed configuration bags
//! - [`modes`]: depth modes, culling, formats and kernel distributions
//! - [`stratified`]: the popcount-stratified coverage-mask table
//! - [`ao`]: constant blocks, kernels and noise tables

pub mod ao;
pub mod modes;
pub mod properties;
pub mod shader_defines;
pub mod stratified;

pub use ao::{DepthRangeData, ForceRay, HbaoData, HbaoSliceData, ParamBlock, VaoData};
pub use modes::{
    CullMode, DepthEncoding, DepthFormat, DepthMode, LinearDepthFormat, RayImplementation,
    SampleDistribution, StochasticDepthImpl,
};
pub use properties::Properties;
pub use shader_defines::ShaderDefines;
pub use stratified::StratifiedTable;
