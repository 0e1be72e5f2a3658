//! Render Graph
//!
//! A linear list of passes wired by named fields:
//!
//! - [`RenderPass`]: the pass lifecycle (`reflect` → `compile` → `execute`)
//! - [`RenderPassReflection`] / [`CompileData`]: field declarations and
//!   connected-input information
//! - [`RenderData`] / [`FrameContext`]: per-execution bindings and the typed
//!   per-frame side channel
//! - [`RenderGraph`]: builds, compiles and executes the pass list
//! - [`TexturePool`]: recycles graph-owned textures across compiles

pub mod graph;
pub mod node;
pub mod pool;
pub mod reflection;
pub mod render_data;

pub use graph::RenderGraph;
pub use node::RenderPass;
pub use pool::TexturePool;
pub use reflection::{CompileData, FieldDesc, FieldFlags, FieldKind, RenderPassReflection};
pub use render_data::{FrameContext, RenderData};
