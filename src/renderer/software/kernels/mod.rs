//! Reference kernels, one per program name in [`crate::renderer::programs`].
//!
//! | Program                     | Kind        | Module         |
//! |-----------------------------|-------------|----------------|
//! | `prepass/depth_normal`      | Raster      | [`depth`]      |
//! | `linearize_depth`           | FullScreen  | [`depth`]      |
//! | `depth_peeling`             | Raster      | [`depth`]      |
//! | `stochastic_depth/stencil`  | FullScreen  | [`stochastic`] |
//! | `stochastic_depth/raster`   | Raster      | [`stochastic`] |
//! | `stochastic_depth/ray`      | RayTracing  | [`stochastic`] |
//! | `stochastic_depth/ray_query`| Compute     | [`stochastic`] |
//! | `hbao`                      | FullScreen  | [`hbao`]       |
//! | `vao`                       | Compute     | [`vao`]        |
//! | `svao/pass1`                | Compute     | [`svao`]       |
//! | `svao/pass2`                | Compute     | [`svao`]       |
//! | `svao/pass2_ray`            | RayTracing  | [`svao`]       |

pub mod ao;
pub mod depth;
pub mod hbao;
pub mod stochastic;
pub mod svao;
pub mod vao;

use crate::renderer::core::program::ProgramKind;
use crate::renderer::programs;
use crate::renderer::software::invocation::KernelFn;

/// Every built-in kernel with the program kind it must be compiled as.
#[must_use]
pub fn registry() -> Vec<(&'static str, ProgramKind, KernelFn)> {
    use ProgramKind::{Compute, FullScreen, Raster, RayTracing};
    vec![
        entry(programs::DEPTH_NORMAL_PREPASS, Raster, depth::depth_normal_prepass),
        entry(programs::LINEARIZE_DEPTH, FullScreen, depth::linearize_depth),
        entry(programs::DEPTH_PEELING, Raster, depth::depth_peeling),
        entry(programs::STOCHASTIC_STENCIL, FullScreen, stochastic::stencil_mask),
        entry(programs::STOCHASTIC_RASTER, Raster, stochastic::raster),
        entry(programs::STOCHASTIC_RAY, RayTracing, stochastic::ray),
        entry(programs::STOCHASTIC_RAY_QUERY, Compute, stochastic::ray),
        entry(programs::HBAO, FullScreen, hbao::hbao),
        entry(programs::VAO, Compute, vao::vao),
        entry(programs::SVAO_PASS1, Compute, svao::pass1),
        entry(programs::SVAO_PASS2, Compute, svao::pass2),
        entry(programs::SVAO_PASS2_RAY, RayTracing, svao::pass2),
    ]
}

fn entry(
    name: &'static str,
    kind: ProgramKind,
    kernel: KernelFn,
) -> (&'static str, ProgramKind, KernelFn) {
    (name, kind, kernel)
}
