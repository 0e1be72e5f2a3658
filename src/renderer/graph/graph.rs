//! Render Graph Executor
//!
//! `RenderGraph` runs its passes in insertion order. Edges connect an output
//! field of an earlier pass to an input field of a later one, written as
//! `"Pass.field"`. Graph inputs bind externally owned textures to pass
//! inputs.
//!
//! # Lifecycle
//!
//! - Building (`add_pass`, `add_edge`, `set_input`, `set_default_dims`)
//!   marks the graph uncompiled.
//! - [`compile`](RenderGraph::compile) reflects every pass in order, resolves
//!   inputs, allocates outputs and internals from the [`TexturePool`] and
//!   calls each pass's `compile`. The first error aborts compilation.
//! - [`execute`](RenderGraph::execute) runs one frame with a fresh
//!   [`FrameContext`].

use std::any::Any;
use std::sync::Arc;

use glam::UVec2;
use rustc_hash::FxHashMap;

use crate::errors::{AoError, Result};
use crate::renderer::core::context::RenderContext;
use crate::renderer::core::texture::Texture;
use crate::renderer::graph::node::RenderPass;
use crate::renderer::graph::pool::TexturePool;
use crate::renderer::graph::reflection::{CompileData, FieldKind};
use crate::renderer::graph::render_data::{FrameContext, RenderData};
use crate::scene::Scene;
use crate::utils::interner;

/// `"Pass.field"` split into its two halves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FieldRef {
    pass: String,
    field: String,
}

impl FieldRef {
    fn parse(s: &str) -> Result<Self> {
        let (pass, field) = s
            .split_once('.')
            .ok_or_else(|| AoError::UnknownField(s.to_string()))?;
        Ok(Self {
            pass: pass.to_string(),
            field: field.to_string(),
        })
    }
}

impl std::fmt::Display for FieldRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.pass, self.field)
    }
}

struct PassEntry {
    name: String,
    pass: Box<dyn RenderPass>,
    /// Resolved during compile.
    bindings: FxHashMap<&'static str, Texture>,
}

struct Edge {
    src: FieldRef,
    dst: FieldRef,
}

pub struct RenderGraph {
    passes: Vec<PassEntry>,
    edges: Vec<Edge>,
    inputs: Vec<(FieldRef, Texture)>,
    pool: TexturePool,
    scene: Option<Arc<Scene>>,
    default_dims: UVec2,
    compiled: bool,
    frame_index: u64,
}

impl RenderGraph {
    #[must_use]
    pub fn new(default_dims: UVec2) -> Self {
        Self {
            passes: Vec::new(),
            edges: Vec::new(),
            inputs: Vec::new(),
            pool: TexturePool::new(),
            scene: None,
            default_dims,
            compiled: false,
            frame_index: 0,
        }
    }

    // ========================================================================
    // Building
    // ========================================================================

    /// Appends a pass under a unique instance name. Passes execute in the
    /// order they were added.
    pub fn add_pass(
        &mut self,
        ctx: &mut dyn RenderContext,
        name: &str,
        mut pass: Box<dyn RenderPass>,
    ) -> &mut Self {
        if self.scene.is_some() {
            pass.set_scene(ctx, self.scene.clone());
        }
        self.passes.retain(|p| p.name != name);
        self.passes.push(PassEntry {
            name: name.to_string(),
            pass,
            bindings: FxHashMap::default(),
        });
        self.compiled = false;
        self
    }

    /// Connects `"A.output"` to `"B.input"`. `A` must precede `B`.
    pub fn add_edge(&mut self, src: &str, dst: &str) -> Result<&mut Self> {
        let src = FieldRef::parse(src)?;
        let dst = FieldRef::parse(dst)?;
        let src_index = self.pass_index(&src.pass)?;
        let dst_index = self.pass_index(&dst.pass)?;
        if src_index >= dst_index {
            return Err(AoError::UnknownField(format!(
                "{src} must come from a pass that runs before {dst}"
            )));
        }
        self.edges.retain(|e| e.dst != dst);
        self.edges.push(Edge { src, dst });
        self.compiled = false;
        Ok(self)
    }

    /// Binds an externally owned texture to `"Pass.input"`.
    pub fn set_input(&mut self, dst: &str, texture: Texture) -> Result<&mut Self> {
        let dst = FieldRef::parse(dst)?;
        self.pass_index(&dst.pass)?;
        match self.inputs.iter_mut().find(|(f, _)| *f == dst) {
            // Same descriptor keeps the compiled graph valid.
            Some((_, existing)) if existing.desc == texture.desc => *existing = texture,
            Some((_, existing)) => {
                *existing = texture;
                self.compiled = false;
            }
            None => {
                self.inputs.push((dst, texture));
                self.compiled = false;
            }
        }
        // Rebind without recompiling when the shape is unchanged.
        if self.compiled {
            for entry in &mut self.passes {
                for (f, t) in &self.inputs {
                    if f.pass == entry.name
                        && let Some((&name, _)) =
                            entry.bindings.iter().find(|(n, _)| **n == f.field.as_str())
                    {
                        entry.bindings.insert(name, *t);
                    }
                }
            }
        }
        Ok(self)
    }

    /// Forwards the scene to every pass, now and to passes added later.
    pub fn set_scene(&mut self, ctx: &mut dyn RenderContext, scene: Option<Arc<Scene>>) {
        for entry in &mut self.passes {
            entry.pass.set_scene(ctx, scene.clone());
        }
        self.scene = scene;
    }

    pub fn set_default_dims(&mut self, dims: UVec2) {
        if dims != self.default_dims {
            self.default_dims = dims;
            self.compiled = false;
        }
    }

    #[must_use]
    pub fn default_dims(&self) -> UVec2 {
        self.default_dims
    }

    #[must_use]
    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    fn pass_index(&self, name: &str) -> Result<usize> {
        self.passes
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| AoError::UnknownPass(name.to_string()))
    }

    // ========================================================================
    // Compilation
    // ========================================================================

    pub fn compile(&mut self, ctx: &mut dyn RenderContext) -> Result<()> {
        self.compiled = false;
        self.pool.release_all();

        let mut produced: FxHashMap<(usize, &'static str), Texture> = FxHashMap::default();
        let result = self.compile_passes(ctx, &mut produced);

        self.pool.trim(ctx);
        result?;
        self.compiled = true;
        log::debug!(
            "Render graph compiled: {} passes, {} textures",
            self.passes.len(),
            self.pool.active_count()
        );
        Ok(())
    }

    fn compile_passes(
        &mut self,
        ctx: &mut dyn RenderContext,
        produced: &mut FxHashMap<(usize, &'static str), Texture>,
    ) -> Result<()> {
        let pass_names: Vec<String> = self.passes.iter().map(|p| p.name.clone()).collect();
        let find = |name: &str| pass_names.iter().position(|p| p == name);

        for index in 0..self.passes.len() {
            // Everything feeding this pass, keyed by input field name.
            let mut incoming: FxHashMap<String, Texture> = FxHashMap::default();
            for edge in self.edges.iter().filter(|e| e.dst.pass == pass_names[index]) {
                let src_index =
                    find(&edge.src.pass).ok_or_else(|| AoError::UnknownPass(edge.src.pass.clone()))?;
                let texture = produced
                    .iter()
                    .find(|((i, f), _)| *i == src_index && *f == edge.src.field.as_str())
                    .map(|(_, t)| *t)
                    .ok_or_else(|| AoError::UnknownField(edge.src.to_string()))?;
                incoming.insert(edge.dst.field.clone(), texture);
            }
            for (field, texture) in self.inputs.iter().filter(|(f, _)| f.pass == pass_names[index]) {
                incoming.insert(field.field.clone(), *texture);
            }

            let entry = &mut self.passes[index];
            entry.bindings.clear();

            let mut data = CompileData::new(self.default_dims);
            for (field, texture) in &incoming {
                data.connected.insert(interner::resolve(interner::intern(field)), texture.desc);
            }
            let reflection = entry.pass.reflect(&data)?;

            for name in incoming.keys() {
                let known = reflection
                    .field(name)
                    .is_some_and(|f| f.kind == FieldKind::Input);
                if !known {
                    return Err(AoError::UnknownField(format!("{}.{name}", entry.name)));
                }
            }

            for field in reflection.fields() {
                match field.kind {
                    FieldKind::Input => match incoming.get(field.name) {
                        Some(t) => {
                            entry.bindings.insert(field.name, *t);
                        }
                        None if field.is_optional() => {}
                        None => {
                            return Err(AoError::MissingResource {
                                pass: entry.name.clone(),
                                name: field.name.to_string(),
                            });
                        }
                    },
                    FieldKind::Output | FieldKind::Internal => {
                        let texture = self
                            .pool
                            .acquire(ctx, field.texture_desc(self.default_dims));
                        produced.insert((index, field.name), texture);
                        entry.bindings.insert(field.name, texture);
                    }
                }
            }

            entry.pass.compile(ctx, &data)?;
        }
        Ok(())
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Runs every pass once.
    pub fn execute(&mut self, ctx: &mut dyn RenderContext) -> Result<()> {
        if !self.compiled {
            return Err(AoError::GraphNotCompiled);
        }
        let mut frame = FrameContext::new(self.frame_index);
        for entry in &mut self.passes {
            let mut data = RenderData::new(entry.pass.name(), self.default_dims);
            for (&name, &texture) in &entry.bindings {
                data.insert(name, texture);
            }
            log::trace!("Executing pass '{}'", entry.name);
            entry.pass.execute(ctx, &data, &mut frame)?;
        }
        self.frame_index += 1;
        Ok(())
    }

    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    // ========================================================================
    // Access
    // ========================================================================

    /// Texture bound to `"Pass.field"` in the compiled graph.
    #[must_use]
    pub fn output(&self, field: &str) -> Option<Texture> {
        let field = FieldRef::parse(field).ok()?;
        let entry = self.passes.iter().find(|p| p.name == field.pass)?;
        entry
            .bindings
            .iter()
            .find(|(n, _)| **n == field.field.as_str())
            .map(|(_, t)| *t)
    }

    /// Downcasts a pass to its concrete type.
    pub fn pass_mut<T: RenderPass>(&mut self, name: &str) -> Option<&mut T> {
        let entry = self.passes.iter_mut().find(|p| p.name == name)?;
        let pass: &mut dyn Any = entry.pass.as_mut();
        pass.downcast_mut::<T>()
    }

    #[must_use]
    pub fn pass(&self, name: &str) -> Option<&dyn RenderPass> {
        self.passes
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.pass.as_ref())
    }

    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    #[must_use]
    pub fn pool(&self) -> &TexturePool {
        &self.pool
    }
}
