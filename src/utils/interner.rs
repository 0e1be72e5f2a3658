//! Global String Interner
//!
//! Turns shader define names and values into integer [`Symbol`]s so that
//! define sets compare and hash as plain integers. Backs [`ShaderDefines`].
//!
//! [`ShaderDefines`]: crate::resources::ShaderDefines

use std::sync::LazyLock;

use lasso::{Spur, ThreadedRodeo};

static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::new);

/// Compact integer identifier for an interned string.
pub type Symbol = Spur;

/// Interns a string, returning the existing symbol if it was seen before.
#[inline]
pub fn intern(s: &str) -> Symbol {
    INTERNER.get_or_intern(s)
}

/// Looks up a string without interning it.
#[inline]
pub fn get(s: &str) -> Option<Symbol> {
    INTERNER.get(s)
}

/// Resolves a symbol back to its string.
#[inline]
pub fn resolve(sym: Symbol) -> &'static str {
    INTERNER.resolve(&sym)
}

/// Pre-interns the define names used by the AO programs so the first
/// program build does not pay for interning on the hot path.
pub fn preload_common_defines() {
    let common = [
        "PRIMARY_DEPTH_MODE",
        "SECONDARY_DEPTH_MODE",
        "DEPTH_MODE",
        "NUM_SAMPLES",
        "KERNEL_SIZE",
        "ALPHA",
        "LINEARIZE",
        "NORMALIZE",
        "RESERVOIR_SAMPLING",
        "USE_ALPHA_TEST",
        "USE_RAY_INTERVAL",
        "STOCHASTIC_DEPTH_IMPL",
        "DUAL_AO",
        "PREVENT_DARK_HALOS",
        "TRACE_OUT_OF_SCREEN",
        "TRACE_DOUBLE_ON_DOUBLE",
        "0",
        "1",
    ];

    for name in common {
        intern(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_and_resolve() {
        let s1 = intern("NUM_SAMPLES");
        let s2 = intern("NUM_SAMPLES");
        let s3 = intern("KERNEL_SIZE");

        assert_eq!(s1, s2);
        assert_ne!(s1, s3);

        assert_eq!(resolve(s1), "NUM_SAMPLES");
        assert_eq!(resolve(s3), "KERNEL_SIZE");
    }

    #[test]
    fn test_get() {
        let _ = intern("existing_define");

        assert!(get("existing_define").is_some());
        assert!(get("never_interned_define").is_none());
    }
}
