//! Render Passes
//!
//! Every pass implements [`RenderPass`] and is constructed from a
//! [`Properties`] bag. [`create_pass`] maps the type names a host uses in
//! its graph descriptions to constructors:
//!
//! | Type name              | Pass                                        |
//! |------------------------|---------------------------------------------|
//! | `GuardBand`            | [`GuardBandPass`]                           |
//! | `DepthNormalPrepass`   | [`DepthNormalPrepass`]                      |
//! | `LinearizeDepth`       | [`LinearizeDepthPass`]                      |
//! | `DepthPeeling`         | [`DepthPeelingPass`]                        |
//! | `StochasticDepthMap`   | [`StochasticDepthRaster`]                   |
//! | `StochasticDepthMapRT` | [`StochasticDepthRay`]                      |
//! | `HBAO`                 | [`HbaoPass`]                                |
//! | `VAO`                  | [`VaoPass`]                                 |
//! | `SVAO`                 | [`SvaoPass`]                                |
//!
//! # Typical wiring
//!
//! ```text
//! GuardBand   DepthNormalPrepass ──depth──► LinearizeDepth ──linearDepth──┐
//!                    │  └──normals / doubleSided──────────────────────────┤
//!                    └──depth (gbufferDepth)────────────────────────────► SVAO ──► ao
//! ```

pub mod depth_peeling;
pub mod export;
pub mod guard_band;
pub mod hbao;
pub mod linearize;
pub mod prepass;
pub mod stochastic_depth;
pub mod svao;
pub mod vao;

pub use depth_peeling::DepthPeelingPass;
pub use guard_band::GuardBandPass;
pub use hbao::HbaoPass;
pub use linearize::LinearizeDepthPass;
pub use prepass::DepthNormalPrepass;
pub use stochastic_depth::{
    StochasticDepth, StochasticDepthInputs, StochasticDepthRaster, StochasticDepthRay,
};
pub use svao::SvaoPass;
pub use vao::VaoPass;

use crate::errors::{AoError, Result};
use crate::renderer::graph::RenderPass;
use crate::resources::Properties;

/// Type names accepted by [`create_pass`].
pub const PASS_TYPES: [&str; 9] = [
    GuardBandPass::TYPE_NAME,
    DepthNormalPrepass::TYPE_NAME,
    LinearizeDepthPass::TYPE_NAME,
    DepthPeelingPass::TYPE_NAME,
    StochasticDepthRaster::TYPE_NAME,
    StochasticDepthRay::TYPE_NAME,
    HbaoPass::TYPE_NAME,
    VaoPass::TYPE_NAME,
    SvaoPass::TYPE_NAME,
];

/// Builds a pass by type name.
pub fn create_pass(type_name: &str, props: &Properties) -> Result<Box<dyn RenderPass>> {
    let pass: Box<dyn RenderPass> = match type_name {
        GuardBandPass::TYPE_NAME => Box::new(GuardBandPass::from_properties(props)?),
        DepthNormalPrepass::TYPE_NAME => Box::new(DepthNormalPrepass::from_properties(props)?),
        LinearizeDepthPass::TYPE_NAME => Box::new(LinearizeDepthPass::from_properties(props)?),
        DepthPeelingPass::TYPE_NAME => Box::new(DepthPeelingPass::from_properties(props)?),
        StochasticDepthRaster::TYPE_NAME => Box::new(StochasticDepthRaster::from_properties(props)?),
        StochasticDepthRay::TYPE_NAME => Box::new(StochasticDepthRay::from_properties(props)?),
        HbaoPass::TYPE_NAME => Box::new(HbaoPass::from_properties(props)?),
        VaoPass::TYPE_NAME => Box::new(VaoPass::from_properties(props)?),
        SvaoPass::TYPE_NAME => Box::new(SvaoPass::from_properties(props)?),
        _ => return Err(AoError::UnknownPass(type_name.to_string())),
    };
    Ok(pass)
}

/// Logs a property key the pass does not know.
pub(crate) fn warn_unknown_property(pass: &str, key: &str) {
    log::warn!("Unknown property '{key}' in a {pass} properties");
}
