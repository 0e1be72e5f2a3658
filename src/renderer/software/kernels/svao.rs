//! Stenciled volumetric AO, both passes.
//!
//! Pass 1 runs over the guard-banded rectangle (threads start at the guard
//! band origin; the over-dispatched tail discards itself). It writes the
//! raster AO and one stencil bit per kernel sample that still needs a
//! second opinion. Pass 2 (compute or ray generation) revisits only pixels
//! with a non-zero stencil and replaces the flagged samples.

use glam::{UVec2, Vec4};
use smallvec::SmallVec;

use crate::errors::Result;
use crate::renderer::software::invocation::{Invocation, uv_to_pixel};
use crate::renderer::software::kernels::ao::{AoContext, PixelEval, SampleValue, stochastic_binding};
use crate::resources::DepthMode;

struct Modes {
    primary: DepthMode,
    secondary: DepthMode,
    dual_ao: bool,
}

impl Modes {
    fn read(inv: &Invocation<'_>) -> Self {
        let defines = inv.defines();
        Self {
            primary: DepthMode::from_define(defines.get_u32("PRIMARY_DEPTH_MODE").unwrap_or(0)),
            secondary: DepthMode::from_define(defines.get_u32("SECONDARY_DEPTH_MODE").unwrap_or(0)),
            dual_ao: defines.is_enabled("DUAL_AO"),
        }
    }

    /// Technique used for pass 1 values. Perfect classification evaluates
    /// single depth and only uses rays to decide.
    fn raster_mode(&self) -> DepthMode {
        match self.primary {
            DepthMode::DualDepth => DepthMode::DualDepth,
            _ => DepthMode::SingleDepth,
        }
    }

    fn output(&self, ctx: &AoContext, values: &[SampleValue]) -> Vec4 {
        let (single, bright, dark) = ctx.finish(values);
        if self.dual_ao {
            Vec4::new(bright, dark, 0.0, 0.0)
        } else {
            Vec4::splat(single)
        }
    }
}

fn primary_values(
    inv: &Invocation<'_>,
    ctx: &AoContext,
    modes: &Modes,
    eval: &PixelEval,
) -> SmallVec<[SampleValue; 32]> {
    eval.samples
        .iter()
        .map(|s| ctx.value(inv, s, modes.raster_mode(), None))
        .collect()
}

pub fn pass1(inv: &mut Invocation<'_>) -> Result<()> {
    let ctx = AoContext::new(inv)?;
    let modes = Modes::read(inv);
    let prevent = ctx.options.prevent_dark_halos;
    let ao = inv.required("ao")?;
    let stencil = inv.required("stencil")?;
    let intervals = if modes.secondary == DepthMode::StochasticDepth
        && inv.defines().is_enabled("USE_RAY_INTERVAL")
    {
        Some((
            inv.required("rayMin")?,
            inv.required("rayMax")?,
            inv.required("accessStencil")?,
        ))
    } else {
        None
    };

    let res = ctx.resolution();
    let g = ctx.params.guard_band;
    let end = res.saturating_sub(UVec2::splat(g));
    let threads = inv.threads();
    for ty in 0..threads.y {
        for tx in 0..threads.x {
            let pixel = UVec2::new(tx.saturating_add(g), ty.saturating_add(g));
            if pixel.x >= end.x || pixel.y >= end.y {
                continue;
            }
            let Some(eval) = ctx.evaluate(inv, pixel) else {
                inv.store(ao, pixel.x, pixel.y, 0, Vec4::ONE);
                inv.store(stencil, pixel.x, pixel.y, 0, Vec4::ZERO);
                continue;
            };

            let values = primary_values(inv, &ctx, &modes, &eval);
            let mut bits = 0u32;
            if modes.secondary != DepthMode::SingleDepth && eval.weight > 0.0 {
                for (i, (sample, value)) in eval.samples.iter().zip(&values).enumerate() {
                    let flagged = if modes.primary == DepthMode::PerfectClassify {
                        ctx.ray_value(sample)
                            .is_some_and(|v| (v - value.single(prevent)).abs() > 0.01)
                    } else {
                        value.ambiguous || sample.force.is_forced()
                    };
                    if flagged {
                        bits |= 1 << i;
                    }
                }
            }

            inv.store(ao, pixel.x, pixel.y, 0, modes.output(&ctx, &values));
            inv.store(stencil, pixel.x, pixel.y, 0, Vec4::splat(bits as f32));

            // Seed the stochastic depth interval with every flagged column.
            if let Some((ray_min, ray_max, access)) = intervals {
                for (i, sample) in eval.samples.iter().enumerate() {
                    if bits & (1 << i) == 0 {
                        continue;
                    }
                    let p = uv_to_pixel(sample.uv, ray_min.size());
                    let lo = inv.load(ray_min, p.x, p.y, 0, 0).x.min(sample.column.front);
                    let hi = inv.load(ray_max, p.x, p.y, 0, 0).x.max(sample.column.back);
                    inv.store(ray_min, p.x, p.y, 0, Vec4::splat(lo));
                    inv.store(ray_max, p.x, p.y, 0, Vec4::splat(hi));
                    inv.store(access, p.x, p.y, 0, Vec4::ONE);
                }
            }
        }
    }
    Ok(())
}

/// Refinement; registered for both the compute and the ray-generation
/// program, which differ only in how rays are launched.
pub fn pass2(inv: &mut Invocation<'_>) -> Result<()> {
    let ctx = AoContext::new(inv)?;
    let modes = Modes::read(inv);
    let stochastic = if modes.secondary == DepthMode::StochasticDepth {
        stochastic_binding(inv)
    } else {
        None
    };
    let ao = inv.required("ao")?;
    let stencil = inv.required("stencil")?;

    let res = ctx.resolution();
    let threads = inv.threads();
    for y in 0..threads.y.min(res.y) {
        for x in 0..threads.x.min(res.x) {
            let bits = inv.load(stencil, x, y, 0, 0).x as u32;
            if bits == 0 {
                continue;
            }
            let Some(eval) = ctx.evaluate(inv, UVec2::new(x, y)) else {
                continue;
            };

            let mut values = primary_values(inv, &ctx, &modes, &eval);
            for (i, (sample, value)) in eval.samples.iter().zip(values.iter_mut()).enumerate() {
                if bits & (1 << i) == 0 {
                    continue;
                }
                let refined = ctx.value(inv, sample, modes.secondary, stochastic);
                if !refined.ambiguous {
                    *value = value.lerp(refined.bright, eval.weight);
                }
            }
            inv.store(ao, x, y, 0, modes.output(&ctx, &values));
        }
    }
    Ok(())
}
