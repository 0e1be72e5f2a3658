//! Shader Define Sets
//!
//! Every AO program is specialised by a set of preprocessor-style defines
//! (`NUM_SAMPLES`, `PRIMARY_DEPTH_MODE`, `DUAL_AO`, ...). A [`ShaderDefines`]
//! value is the configuration half of a [`ShaderVariantKey`]: two passes that
//! produce equal define sets for the same program share one compiled variant.
//!
//! Keys and values are interned [`Symbol`]s kept sorted by symbol id, so
//! equality and in-process hashing are integer operations. Symbol order
//! depends on interning order, so [`ShaderDefines::stable_hash`] hashes the
//! resolved strings in lexicographic order instead, which is what program
//! caches key on.
//!
//! ```rust,ignore
//! use myth_ao::resources::ShaderDefines;
//!
//! let defines = ShaderDefines::new()
//!     .with("NUM_SAMPLES", 8u32)
//!     .with("DUAL_AO", true);
//! assert_eq!(defines.get("DUAL_AO").as_deref(), Some("1"));
//! ```
//!
//! [`ShaderVariantKey`]: crate::renderer::core::ShaderVariantKey

use std::hash::{Hash, Hasher};

use crate::utils::interner::{self, Symbol};

/// Value accepted by [`ShaderDefines::set`]; booleans become `"0"`/`"1"`.
pub trait DefineValue {
    fn to_define_string(&self) -> String;
}

impl DefineValue for bool {
    fn to_define_string(&self) -> String {
        if *self { "1".into() } else { "0".into() }
    }
}

impl DefineValue for &str {
    fn to_define_string(&self) -> String {
        (*self).to_string()
    }
}

impl DefineValue for String {
    fn to_define_string(&self) -> String {
        self.clone()
    }
}

macro_rules! impl_define_value_display {
    ($($t:ty),*) => {
        $(impl DefineValue for $t {
            fn to_define_string(&self) -> String {
                self.to_string()
            }
        })*
    };
}

impl_define_value_display!(u32, i32, usize);

impl DefineValue for f32 {
    fn to_define_string(&self) -> String {
        // Always keep a decimal point so the value parses as a float literal.
        if self.fract() == 0.0 && self.is_finite() {
            format!("{self:.1}")
        } else {
            format!("{self}")
        }
    }
}

/// A sorted collection of shader macro definitions.
#[derive(Debug, Clone, Default)]
pub struct ShaderDefines {
    defines: Vec<(Symbol, Symbol)>,
}

impl ShaderDefines {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            defines: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            defines: Vec::with_capacity(capacity),
        }
    }

    /// Sets a define, replacing any previous value for the key.
    pub fn set(&mut self, key: &str, value: impl DefineValue) {
        let key_sym = interner::intern(key);
        let value_sym = interner::intern(&value.to_define_string());
        self.set_symbol(key_sym, value_sym);
    }

    /// Builder form of [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, key: &str, value: impl DefineValue) -> Self {
        self.set(key, value);
        self
    }

    #[inline]
    pub fn set_symbol(&mut self, key: Symbol, value: Symbol) {
        match self.defines.binary_search_by_key(&key, |&(k, _)| k) {
            Ok(idx) => {
                self.defines[idx].1 = value;
            }
            Err(idx) => {
                self.defines.insert(idx, (key, value));
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let Some(key_sym) = interner::get(key) else {
            return false;
        };
        if let Ok(idx) = self.defines.binary_search_by_key(&key_sym, |&(k, _)| k) {
            self.defines.remove(idx);
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        interner::get(key).is_some_and(|key_sym| {
            self.defines
                .binary_search_by_key(&key_sym, |&(k, _)| k)
                .is_ok()
        })
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&'static str> {
        let key_sym = interner::get(key)?;
        self.defines
            .binary_search_by_key(&key_sym, |&(k, _)| k)
            .ok()
            .map(|idx| interner::resolve(self.defines[idx].1))
    }

    /// Parses a define back into a number; used by kernels that read their
    /// specialisation constants.
    #[must_use]
    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    #[must_use]
    pub fn get_f32(&self, key: &str) -> Option<f32> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// `true` when the define exists and is not `"0"`.
    #[must_use]
    pub fn is_enabled(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| v != "0")
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.defines.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }

    /// Iterates `(name, value)` pairs as strings.
    pub fn iter_strings(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.defines
            .iter()
            .map(|&(k, v)| (interner::resolve(k), interner::resolve(v)))
    }

    /// Merges `other` into `self`; values from `other` win on conflict.
    pub fn merge(&mut self, other: &ShaderDefines) {
        for &(key, value) in &other.defines {
            self.set_symbol(key, value);
        }
    }

    #[must_use]
    pub fn merged_with(&self, other: &ShaderDefines) -> ShaderDefines {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// In-process hash over the symbol pairs.
    #[must_use]
    pub fn compute_hash(&self) -> u64 {
        use std::hash::BuildHasher;

        rustc_hash::FxBuildHasher.hash_one(self)
    }

    /// Hash that is independent of interning order.
    #[must_use]
    pub fn stable_hash(&self) -> u64 {
        let mut pairs: Vec<_> = self.iter_strings().collect();
        pairs.sort_unstable();

        let mut bytes = Vec::with_capacity(pairs.len() * 16);
        for (k, v) in pairs {
            bytes.extend_from_slice(k.as_bytes());
            bytes.push(b'=');
            bytes.extend_from_slice(v.as_bytes());
            bytes.push(b';');
        }
        xxhash_rust::xxh3::xxh3_64(&bytes)
    }
}

impl Hash for ShaderDefines {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.defines.hash(state);
    }
}

impl PartialEq for ShaderDefines {
    fn eq(&self, other: &Self) -> bool {
        self.defines == other.defines
    }
}

impl Eq for ShaderDefines {}

impl From<&[(&str, &str)]> for ShaderDefines {
    fn from(defines: &[(&str, &str)]) -> Self {
        let mut result = Self::with_capacity(defines.len());
        for (k, v) in defines {
            result.set(k, *v);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut defines = ShaderDefines::new();
        defines.set("NUM_SAMPLES", 8u32);
        defines.set("DUAL_AO", true);
        defines.set("ALPHA", 0.2f32);

        assert!(defines.contains("NUM_SAMPLES"));
        assert!(!defines.contains("RESERVOIR_SAMPLING"));

        assert_eq!(defines.get_u32("NUM_SAMPLES"), Some(8));
        assert_eq!(defines.get("DUAL_AO"), Some("1"));
        assert!(defines.is_enabled("DUAL_AO"));
        assert_eq!(defines.get_f32("ALPHA"), Some(0.2));
    }

    #[test]
    fn test_float_formatting_keeps_decimal_point() {
        let defines = ShaderDefines::new().with("RADIUS", 1.0f32);
        assert_eq!(defines.get("RADIUS"), Some("1.0"));
    }

    #[test]
    fn test_merge_overrides() {
        let mut d1 = ShaderDefines::new().with("A", "1").with("B", "2");
        let d2 = ShaderDefines::new().with("B", "3").with("C", "4");

        d1.merge(&d2);

        assert_eq!(d1.get("A"), Some("1"));
        assert_eq!(d1.get("B"), Some("3"));
        assert_eq!(d1.get("C"), Some("4"));
    }

    #[test]
    fn test_hash_consistency() {
        let d1 = ShaderDefines::new().with("A", "1").with("B", "2");
        let d2 = ShaderDefines::new().with("B", "2").with("A", "1");

        assert_eq!(d1.compute_hash(), d2.compute_hash());
        assert_eq!(d1.stable_hash(), d2.stable_hash());
    }

    #[test]
    fn test_stable_hash_changes_with_value() {
        let d1 = ShaderDefines::new().with("NUM_SAMPLES", 4u32);
        let d2 = ShaderDefines::new().with("NUM_SAMPLES", 8u32);
        assert_ne!(d1.stable_hash(), d2.stable_hash());
    }
}
