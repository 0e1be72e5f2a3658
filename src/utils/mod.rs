//! Utility Module
//!
//! - [`interner`]: String interning for shader define names and values.
//! - [`align_up`] / [`div_ceil_uvec2`]: small integer helpers shared by
//!   dispatch-extent and resolution computations.
//!
//! ```rust,ignore
//! use myth_ao::utils::interner;
//!
//! let sym1 = interner::intern("NUM_SAMPLES");
//! let sym2 = interner::intern("NUM_SAMPLES");
//! assert_eq!(sym1, sym2); // O(1) comparison
//! ```

pub mod interner;

pub use interner::Symbol;

use glam::UVec2;

/// Rounds `value` up to the next multiple of `alignment` (non-zero).
#[inline]
#[must_use]
pub fn align_up(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

/// Component-wise `ceil(v / d)`.
#[inline]
#[must_use]
pub fn div_ceil_uvec2(v: UVec2, d: u32) -> UVec2 {
    UVec2::new(v.x.div_ceil(d), v.y.div_ceil(d))
}
