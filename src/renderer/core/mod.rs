//! Host Interface Layer
//!
//! The narrow surface the render passes consume from their host:
//!
//! - [`texture`]: texture/buffer handles and descriptors
//! - [`program`]: program descriptors, variant keys and lazy program slots
//! - [`vars`]: named program bindings
//! - [`state`]: scissor, viewport, depth/stencil state and render targets
//! - [`context`]: the [`RenderContext`] command stream

pub mod context;
pub mod program;
pub mod state;
pub mod texture;
pub mod vars;

pub use context::RenderContext;
pub use program::{ProgramCache, ProgramDesc, ProgramId, ProgramKind, ProgramSlot, ShaderVariantKey};
pub use state::{GraphicsState, RenderTargets, SamplePositions, Scissor, StencilTest, Viewport};
pub use texture::{BufferId, TexelData, Texture, TextureDesc, TextureId};
pub use vars::ProgramVars;
