//! WGSL Program Sources
//!
//! The GPU backend compiles a program from a registered [`ShaderSource`]:
//! WGSL text plus the names under which the pass binds each resource. The
//! program's defines are prepended as WGSL constants, so one source serves
//! every variant:
//!
//! ```text
//! const NUM_SAMPLES: u32 = 8u;     ◄── ShaderDefines
//! const RADIUS: f32 = 0.5;
//! ─────────────────────────
//! @group(0) @binding(0) var depth: texture_2d<f32>;   ◄── source.wgsl
//! ...
//! ```
//!
//! Every binding lives in group 0. A define whose value is neither an
//! integer nor a float literal is skipped.

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::renderer::programs;
use crate::resources::ShaderDefines;

/// What a named binding is resolved to at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// A sampled texture (`texture_2d`, `texture_depth_2d`, arrays).
    Texture,
    /// A write-only storage texture.
    StorageTexture,
    /// A constant block, uploaded as a uniform buffer.
    Constants,
    /// A structured `u32` buffer.
    Buffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderBinding {
    pub binding: u32,
    pub name: &'static str,
    pub kind: BindingKind,
}

impl ShaderBinding {
    #[must_use]
    pub const fn new(binding: u32, name: &'static str, kind: BindingKind) -> Self {
        Self {
            binding,
            name,
            kind,
        }
    }
}

/// WGSL source of one program plus its binding table.
///
/// Compute programs use the entry point `main`; full-screen programs use
/// `vs_main` and `fs_main`.
#[derive(Debug, Clone)]
pub struct ShaderSource {
    pub wgsl: Cow<'static, str>,
    pub bindings: Vec<ShaderBinding>,
}

impl ShaderSource {
    #[must_use]
    pub fn new(wgsl: impl Into<Cow<'static, str>>) -> Self {
        Self {
            wgsl: wgsl.into(),
            bindings: Vec::new(),
        }
    }

    #[must_use]
    pub fn bind(mut self, binding: u32, name: &'static str, kind: BindingKind) -> Self {
        self.bindings.push(ShaderBinding::new(binding, name, kind));
        self
    }

    /// Full module text for one define set.
    #[must_use]
    pub fn specialize(&self, defines: &ShaderDefines) -> String {
        let mut out = define_preamble(defines);
        out.push_str(&self.wgsl);
        out
    }
}

/// WGSL `const` declarations for every numeric define.
#[must_use]
pub fn define_preamble(defines: &ShaderDefines) -> String {
    let mut out = String::new();
    for (name, value) in defines.iter_strings() {
        if value.parse::<u32>().is_ok() {
            let _ = writeln!(out, "const {name}: u32 = {value}u;");
        } else if value.parse::<i32>().is_ok() {
            let _ = writeln!(out, "const {name}: i32 = {value}i;");
        } else if value.parse::<f32>().is_ok_and(f32::is_finite) {
            let _ = writeln!(out, "const {name}: f32 = {value};");
        }
    }
    out
}

/// Programs the backend can run without registration.
#[must_use]
pub fn builtin_sources() -> Vec<(&'static str, ShaderSource)> {
    vec![(
        programs::LINEARIZE_DEPTH,
        ShaderSource::new(include_str!("shaders/linearize_depth.wgsl"))
            .bind(0, "depth", BindingKind::Texture)
            .bind(1, "CameraCB", BindingKind::Constants),
    )]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preamble_types_follow_the_literal() {
        let defines = ShaderDefines::new()
            .with("NUM_SAMPLES", 8u32)
            .with("DUAL_AO", true)
            .with("BIAS", -2i32)
            .with("RADIUS", 0.5f32)
            .with("IMPL", "Raster");
        let preamble = define_preamble(&defines);
        assert!(preamble.contains("const NUM_SAMPLES: u32 = 8u;"));
        assert!(preamble.contains("const DUAL_AO: u32 = 1u;"));
        assert!(preamble.contains("const BIAS: i32 = -2i;"));
        assert!(preamble.contains("const RADIUS: f32 = 0.5;"));
        assert!(!preamble.contains("IMPL"));
    }

    #[test]
    fn builtin_linearize_binds_depth_and_camera() {
        let sources = builtin_sources();
        let (_, linearize) = sources
            .iter()
            .find(|(name, _)| *name == programs::LINEARIZE_DEPTH)
            .unwrap();
        let names: Vec<_> = linearize.bindings.iter().map(|b| b.name).collect();
        assert_eq!(names, ["depth", "CameraCB"]);
        assert!(linearize.wgsl.contains("fn fs_main"));
    }
}
