//! Guard Band Pass
//!
//! Declares no resources. Each frame it publishes the configured margin
//! into [`FrameContext::guard_band`] so the AO passes further down the graph
//! derive their scissors and dispatch extents from the same value.

use crate::errors::Result;
use crate::renderer::core::context::RenderContext;
use crate::renderer::graph::{CompileData, FrameContext, RenderData, RenderPass, RenderPassReflection};
use crate::renderer::guard_band::GuardBandInfo;
use crate::resources::Properties;

use super::warn_unknown_property;

pub struct GuardBandPass {
    guard_band: u32,
    warned_oversized: bool,
}

impl Default for GuardBandPass {
    fn default() -> Self {
        Self {
            guard_band: 64,
            warned_oversized: false,
        }
    }
}

impl GuardBandPass {
    pub const TYPE_NAME: &'static str = "GuardBand";

    pub fn from_properties(props: &Properties) -> Result<Self> {
        let mut pass = Self::default();
        for (key, value) in props.iter() {
            match key {
                "guardBand" => pass.guard_band = Properties::parse_u32(key, value)?,
                _ => warn_unknown_property(Self::TYPE_NAME, key),
            }
        }
        Ok(pass)
    }

    #[must_use]
    pub fn guard_band(&self) -> u32 {
        self.guard_band
    }

    pub fn set_guard_band(&mut self, guard_band: u32) {
        self.guard_band = guard_band;
        self.warned_oversized = false;
    }
}

impl RenderPass for GuardBandPass {
    fn name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn properties(&self) -> Properties {
        Properties::new().with("guardBand", self.guard_band)
    }

    fn reflect(&self, _data: &CompileData) -> Result<RenderPassReflection> {
        Ok(RenderPassReflection::new())
    }

    fn execute(
        &mut self,
        _ctx: &mut dyn RenderContext,
        data: &RenderData,
        frame: &mut FrameContext,
    ) -> Result<()> {
        let dims = data.default_dims();
        if self.guard_band.saturating_mul(2) >= dims.x.min(dims.y) && !self.warned_oversized {
            log::warn!(
                "Guard band {} leaves no valid pixels at {}x{}",
                self.guard_band,
                dims.x,
                dims.y
            );
            self.warned_oversized = true;
        }
        frame.guard_band = Some(GuardBandInfo::new(self.guard_band, dims));
        Ok(())
    }
}
