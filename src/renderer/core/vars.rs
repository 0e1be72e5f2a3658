//! Program Variables
//!
//! The binding set handed to a dispatch, draw or trace. Resources are bound
//! by name: textures, plain-old-data constant blocks (stored as bytes so any
//! `Pod` block can be bound) and structured `u32` buffers. The scene a
//! program traces against is bound here as well.

use std::sync::Arc;

use bytemuck::Pod;
use rustc_hash::FxHashMap;

use crate::renderer::core::texture::{BufferId, Texture};
use crate::scene::Scene;

#[derive(Debug, Clone, Default)]
pub struct ProgramVars {
    textures: FxHashMap<&'static str, Texture>,
    constants: FxHashMap<&'static str, Vec<u8>>,
    buffers: FxHashMap<&'static str, BufferId>,
    scene: Option<Arc<Scene>>,
}

impl ProgramVars {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // === Textures ===

    pub fn set_texture(&mut self, name: &'static str, texture: Texture) -> &mut Self {
        self.textures.insert(name, texture);
        self
    }

    /// Binds `texture`, or unbinds `name` when `None`.
    pub fn set_texture_opt(&mut self, name: &'static str, texture: Option<Texture>) -> &mut Self {
        match texture {
            Some(t) => self.textures.insert(name, t),
            None => self.textures.remove(name),
        };
        self
    }

    #[must_use]
    pub fn texture(&self, name: &str) -> Option<Texture> {
        self.textures.get(name).copied()
    }

    pub fn textures(&self) -> impl Iterator<Item = (&'static str, Texture)> + '_ {
        self.textures.iter().map(|(k, v)| (*k, *v))
    }

    // === Constant blocks ===

    pub fn set_constants<T: Pod>(&mut self, name: &'static str, value: &T) -> &mut Self {
        self.constants
            .insert(name, bytemuck::bytes_of(value).to_vec());
        self
    }

    /// Reads a constant block back. `None` when unbound or of another size.
    #[must_use]
    pub fn constants<T: Pod>(&self, name: &str) -> Option<T> {
        let bytes = self.constants.get(name)?;
        (bytes.len() == std::mem::size_of::<T>()).then(|| bytemuck::pod_read_unaligned(bytes))
    }

    /// Raw bytes of a constant block, as uploaded to a uniform buffer.
    #[must_use]
    pub fn constant_bytes(&self, name: &str) -> Option<&[u8]> {
        self.constants.get(name).map(Vec::as_slice)
    }

    #[must_use]
    pub fn has_constants(&self, name: &str) -> bool {
        self.constants.contains_key(name)
    }

    // === Buffers ===

    pub fn set_buffer(&mut self, name: &'static str, buffer: BufferId) -> &mut Self {
        self.buffers.insert(name, buffer);
        self
    }

    #[must_use]
    pub fn buffer(&self, name: &str) -> Option<BufferId> {
        self.buffers.get(name).copied()
    }

    // === Scene ===

    pub fn set_scene(&mut self, scene: Option<Arc<Scene>>) -> &mut Self {
        self.scene = scene;
        self
    }

    #[must_use]
    pub fn scene(&self) -> Option<&Arc<Scene>> {
        self.scene.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::HbaoData;

    #[test]
    fn constants_round_trip_through_bytes() {
        let mut data = HbaoData::default();
        data.set_radius(3.0);
        let mut vars = ProgramVars::new();
        vars.set_constants("StaticCB", &data);

        let back: HbaoData = vars.constants("StaticCB").unwrap();
        assert!((back.radius - 3.0).abs() < 1e-6);
        assert!(vars.constants::<u32>("StaticCB").is_none());
        assert!(vars.constants::<HbaoData>("Missing").is_none());
    }
}
