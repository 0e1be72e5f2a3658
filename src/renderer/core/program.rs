//! Program Descriptors, Variant Keys and the Program Cache
//!
//! A program is identified by its name, its kind and the define set it was
//! specialised with. [`ShaderVariantKey`] hashes exactly that triple, so two
//! passes asking for the same specialisation share one compiled program.
//!
//! Passes never hold programs directly. They keep a [`ProgramSlot`] per
//! program, which is either `Uncompiled` or `Ready`. Anything that changes
//! the define set calls [`ProgramSlot::invalidate`]; the next execute
//! rebuilds lazily through [`ProgramSlot::get_or_create`].

use glam::UVec3;
use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::Xxh3;

use crate::errors::Result;
use crate::renderer::core::context::RenderContext;
use crate::resources::ShaderDefines;

/// Pipeline type of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    Compute,
    FullScreen,
    /// Scene rasterization with a custom fragment stage.
    Raster,
    RayTracing,
}

impl ProgramKind {
    fn tag(self) -> u8 {
        match self {
            Self::Compute => 0,
            Self::FullScreen => 1,
            Self::Raster => 2,
            Self::RayTracing => 3,
        }
    }
}

/// Everything needed to compile one program variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDesc {
    pub name: &'static str,
    pub kind: ProgramKind,
    pub defines: ShaderDefines,
    /// Only meaningful for compute programs.
    pub workgroup_size: UVec3,
}

impl ProgramDesc {
    #[must_use]
    pub fn compute(name: &'static str, defines: ShaderDefines) -> Self {
        Self {
            name,
            kind: ProgramKind::Compute,
            defines,
            workgroup_size: UVec3::new(8, 8, 1),
        }
    }

    #[must_use]
    pub fn fullscreen(name: &'static str, defines: ShaderDefines) -> Self {
        Self {
            name,
            kind: ProgramKind::FullScreen,
            defines,
            workgroup_size: UVec3::ONE,
        }
    }

    #[must_use]
    pub fn raster(name: &'static str, defines: ShaderDefines) -> Self {
        Self {
            name,
            kind: ProgramKind::Raster,
            defines,
            workgroup_size: UVec3::ONE,
        }
    }

    #[must_use]
    pub fn ray_tracing(name: &'static str, defines: ShaderDefines) -> Self {
        Self {
            name,
            kind: ProgramKind::RayTracing,
            defines,
            workgroup_size: UVec3::ONE,
        }
    }

    /// Adds `extra` on top of the current defines (scene defines, mostly).
    #[must_use]
    pub fn with_defines(mut self, extra: &ShaderDefines) -> Self {
        self.defines.merge(extra);
        self
    }

    #[must_use]
    pub fn with_workgroup_size(mut self, size: UVec3) -> Self {
        self.workgroup_size = size;
        self
    }

    #[must_use]
    pub fn variant_key(&self) -> ShaderVariantKey {
        ShaderVariantKey::new(self.name, self.kind, &self.defines)
    }
}

/// Stable 64-bit identity of a program specialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderVariantKey(pub u64);

impl ShaderVariantKey {
    /// xxh3 over the program name, its kind and the sorted define list.
    #[must_use]
    pub fn new(name: &str, kind: ProgramKind, defines: &ShaderDefines) -> Self {
        let mut hasher = Xxh3::new();
        hasher.update(name.as_bytes());
        hasher.update(&[0, kind.tag()]);
        hasher.update(&defines.stable_hash().to_le_bytes());
        Self(hasher.digest())
    }
}

/// Handle to a compiled program owned by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub(crate) u32);

impl ProgramId {
    /// Raw index into the device's program storage.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ─── Program Slot ─────────────────────────────────────────────────────────────

/// Lazily built program owned by a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgramSlot {
    #[default]
    Uncompiled,
    Ready {
        id: ProgramId,
        key: ShaderVariantKey,
    },
}

impl ProgramSlot {
    /// Drops the program; the next use rebuilds it.
    pub fn invalidate(&mut self) {
        *self = Self::Uncompiled;
    }

    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    #[must_use]
    pub fn id(&self) -> Option<ProgramId> {
        match self {
            Self::Ready { id, .. } => Some(*id),
            Self::Uncompiled => None,
        }
    }

    #[must_use]
    pub fn key(&self) -> Option<ShaderVariantKey> {
        match self {
            Self::Ready { key, .. } => Some(*key),
            Self::Uncompiled => None,
        }
    }

    /// Returns the ready program, or builds it from `build()` first.
    pub fn get_or_create(
        &mut self,
        ctx: &mut dyn RenderContext,
        build: impl FnOnce() -> ProgramDesc,
    ) -> Result<ProgramId> {
        if let Self::Ready { id, .. } = self {
            return Ok(*id);
        }
        let desc = build();
        let key = desc.variant_key();
        log::debug!("Building program '{}' ({key:016x?})", desc.name);
        let id = ctx.create_program(&desc)?;
        *self = Self::Ready { id, key };
        Ok(id)
    }

    /// Like [`get_or_create`](Self::get_or_create), but rebuilds when the
    /// ready program is a different variant than `desc`.
    pub fn ensure(&mut self, ctx: &mut dyn RenderContext, desc: ProgramDesc) -> Result<ProgramId> {
        if self.key() != Some(desc.variant_key()) {
            self.invalidate();
        }
        self.get_or_create(ctx, || desc)
    }
}

// ─── Program Cache ────────────────────────────────────────────────────────────

/// Deduplicating store of program variants, keyed by [`ShaderVariantKey`].
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: Vec<ProgramDesc>,
    lookup: FxHashMap<ShaderVariantKey, ProgramId>,
}

impl ProgramCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached id for `desc`, or validates and stores it.
    ///
    /// The second tuple element is `true` when a new variant was compiled.
    pub fn get_or_insert(
        &mut self,
        desc: &ProgramDesc,
        compile: impl FnOnce(&ProgramDesc) -> Result<()>,
    ) -> Result<(ProgramId, bool)> {
        let key = desc.variant_key();
        if let Some(&id) = self.lookup.get(&key) {
            return Ok((id, false));
        }
        compile(desc)?;
        let id = ProgramId(self.programs.len() as u32);
        self.programs.push(desc.clone());
        self.lookup.insert(key, id);
        Ok((id, true))
    }

    #[must_use]
    pub fn get(&self, id: ProgramId) -> Option<&ProgramDesc> {
        self.programs.get(id.index())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_key_depends_on_every_component() {
        let defines = ShaderDefines::new().with("NUM_SAMPLES", 8u32);
        let a = ProgramDesc::compute("svao/pass1", defines.clone()).variant_key();
        let b = ProgramDesc::fullscreen("svao/pass1", defines.clone()).variant_key();
        let c = ProgramDesc::compute("svao/pass2", defines.clone()).variant_key();
        let d = ProgramDesc::compute("svao/pass1", defines.with("NUM_SAMPLES", 4u32)).variant_key();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn variant_key_ignores_define_order() {
        let a = ShaderDefines::new().with("A", true).with("B", 2u32);
        let b = ShaderDefines::new().with("B", 2u32).with("A", true);
        assert_eq!(
            ShaderVariantKey::new("p", ProgramKind::Compute, &a),
            ShaderVariantKey::new("p", ProgramKind::Compute, &b)
        );
    }

    #[test]
    fn cache_deduplicates_variants() {
        let mut cache = ProgramCache::new();
        let desc = ProgramDesc::compute("vao", ShaderDefines::new());
        let (a, created_a) = cache.get_or_insert(&desc, |_| Ok(())).unwrap();
        let (b, created_b) = cache.get_or_insert(&desc, |_| Ok(())).unwrap();
        assert_eq!(a, b);
        assert!(created_a);
        assert!(!created_b);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_compile_is_not_cached() {
        let mut cache = ProgramCache::new();
        let desc = ProgramDesc::compute("missing", ShaderDefines::new());
        let err = cache.get_or_insert(&desc, |d| {
            Err(crate::errors::AoError::ShaderNotFound(d.name.to_string()))
        });
        assert!(err.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn slot_invalidate_resets_state() {
        let mut slot = ProgramSlot::Ready {
            id: ProgramId(3),
            key: ShaderVariantKey(7),
        };
        assert_eq!(slot.id(), Some(ProgramId(3)));
        slot.invalidate();
        assert!(!slot.is_ready());
        assert_eq!(slot.id(), None);
    }
}
