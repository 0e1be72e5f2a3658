//! Render Pass Trait
//!
//! Every pass goes through the same lifecycle:
//!
//! ```text
//!  from_properties ─► reflect ─► compile ─► execute (per frame) ...
//!                       ▲           │
//!                       └───────────┘  graph topology or edge formats changed
//! ```
//!
//! - `reflect` declares fields and may fail when required upstream
//!   information is missing.
//! - `compile` validates configuration and drops cached programs. Programs
//!   are rebuilt lazily on the next `execute`.
//! - `execute` records commands into the context. It never panics on a
//!   missing resource: required fields are fetched through
//!   [`RenderData::required`].

use std::any::Any;
use std::sync::Arc;

use crate::errors::Result;
use crate::renderer::core::context::RenderContext;
use crate::renderer::graph::reflection::{CompileData, RenderPassReflection};
use crate::renderer::graph::render_data::{FrameContext, RenderData};
use crate::resources::Properties;
use crate::scene::Scene;

pub trait RenderPass: Any {
    /// Type name, as accepted by [`create_pass`](crate::renderer::passes::create_pass).
    fn name(&self) -> &'static str;

    /// Current configuration; feeding it back into `from_properties`
    /// reproduces an equivalent pass.
    fn properties(&self) -> Properties;

    fn reflect(&self, data: &CompileData) -> Result<RenderPassReflection>;

    fn compile(&mut self, _ctx: &mut dyn RenderContext, _data: &CompileData) -> Result<()> {
        Ok(())
    }

    fn execute(
        &mut self,
        ctx: &mut dyn RenderContext,
        data: &RenderData,
        frame: &mut FrameContext,
    ) -> Result<()>;

    fn set_scene(&mut self, _ctx: &mut dyn RenderContext, _scene: Option<Arc<Scene>>) {}
}
