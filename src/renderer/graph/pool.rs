//! Graph Texture Pool
//!
//! Recycles the textures the graph allocates for pass outputs and internals.
//! Every compile releases all textures back to the free lists, re-acquires
//! what the new topology needs, then trims whatever stayed unused:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 TexturePool                  │
//! │                                              │
//! │  active: [Texture]                           │
//! │  free:   FxHashMap<TextureDesc, Vec<Texture>>│
//! │                                              │
//! │  acquire()      (compile, per field)         │
//! │  release_all()  (start of compile)           │
//! │  trim()         (end of compile)             │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Textures are matched on their full descriptor, so a recycled texture
//! always has the exact shape, format and usage that was asked for.

use rustc_hash::FxHashMap;

use crate::renderer::core::context::RenderContext;
use crate::renderer::core::texture::{Texture, TextureDesc};

#[derive(Debug, Default)]
pub struct TexturePool {
    active: Vec<Texture>,
    free: FxHashMap<TextureDesc, Vec<Texture>>,
}

impl TexturePool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuses a free texture matching `desc`, or creates one.
    pub fn acquire(&mut self, ctx: &mut dyn RenderContext, desc: TextureDesc) -> Texture {
        let recycled = self.free.get_mut(&desc).and_then(Vec::pop);
        let texture = match recycled {
            Some(t) if ctx.is_texture_alive(t) => t,
            _ => ctx.create_texture(desc),
        };
        self.active.push(texture);
        texture
    }

    /// Returns every active texture to the free lists.
    pub fn release_all(&mut self) {
        for t in self.active.drain(..) {
            self.free.entry(t.desc).or_default().push(t);
        }
    }

    /// Destroys every free texture.
    pub fn trim(&mut self, ctx: &mut dyn RenderContext) {
        let mut destroyed = 0usize;
        for (_, bucket) in self.free.drain() {
            for t in bucket {
                ctx.destroy_texture(t);
                destroyed += 1;
            }
        }
        if destroyed > 0 {
            log::debug!("Texture pool trimmed {destroyed} unused textures");
        }
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Active plus free textures.
    #[must_use]
    pub fn total_texture_count(&self) -> usize {
        self.active.len() + self.free.values().map(Vec::len).sum::<usize>()
    }
}
