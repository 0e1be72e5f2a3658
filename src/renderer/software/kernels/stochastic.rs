//! Stochastic depth acquisition kernels.
//!
//! Both variants record, per pixel, up to `NUM_SAMPLES` surfaces strictly
//! behind the primary one:
//!
//! - the raster kernel claims multisample slots with coverage masks drawn
//!   from the stratified table (or one reservoir slot per fragment);
//! - the ray kernel traces the pixel's camera ray once and picks hits with
//!   the configured [`RayImplementation`].

use std::sync::Arc;

use glam::{UVec2, Vec2, Vec4};
use rand::RngExt;
use smallvec::SmallVec;

use crate::errors::{AoError, Result};
use crate::renderer::software::invocation::{FragmentOutput, Invocation};
use crate::resources::{CullMode, DepthEncoding, RayImplementation, StratifiedTable};
use crate::scene::RayFlags;

/// Primary surfaces closer than this (relative) are the surface itself.
const PRIMARY_EPSILON: f32 = 1e-4;

#[inline]
fn behind_primary(linear: f32, primary: f32) -> bool {
    linear > primary * (1.0 + PRIMARY_EPSILON) + PRIMARY_EPSILON
}

fn stratified_table(inv: &Invocation<'_>, samples: u32) -> Result<StratifiedTable> {
    inv.buffer("stratifiedTable")
        .and_then(|data| StratifiedTable::from_buffer(samples, data))
        .ok_or_else(|| AoError::MissingResource {
            pass: inv.program.name.to_string(),
            name: "stratifiedTable".into(),
        })
}

/// Full-screen: marks pixels whose mask texel is non-zero. The draw's
/// stencil state (Always / Replace 1) turns the surviving fragments into
/// the stencil mask.
pub fn stencil_mask(inv: &mut Invocation<'_>) -> Result<()> {
    let mask = inv.required("stencilMask")?;
    inv.run_fragments(|this, fragment| {
        (this.load_uv(mask, fragment.uv, 0, 0).x != 0.0).then(FragmentOutput::new)
    })
}

/// Raster: one multisample depth target, every sample a stochastic layer.
pub fn raster(inv: &mut Invocation<'_>) -> Result<()> {
    let defines = inv.defines();
    let samples = defines.get_u32("NUM_SAMPLES").unwrap_or(8).clamp(1, 16);
    let alpha = defines.get_f32("ALPHA").unwrap_or(0.2);
    let reservoir = defines.is_enabled("RESERVOIR_SAMPLING");
    let alpha_test = defines.is_enabled("USE_ALPHA_TEST");
    let linearize = defines.is_enabled("LINEARIZE");
    let ray_interval = defines.is_enabled("USE_RAY_INTERVAL");

    let scene = Arc::clone(inv.scene()?);
    let camera = inv.camera()?;
    let (near, far) = (camera.near(), camera.far());
    let primary = inv.required("depth")?;
    let interval = if ray_interval {
        Some((inv.required("rayMin")?, inv.required("rayMax")?))
    } else {
        None
    };
    let table = if reservoir {
        None
    } else {
        Some(stratified_table(inv, samples)?)
    };

    // Reservoir counters are read once and written back after the draw.
    let counter = if reservoir {
        Some(inv.required("counter")?)
    } else {
        None
    };
    let counter_width = counter.map_or(0, |c| c.size().x);
    let mut counts: Vec<u32> = match counter {
        Some(c) => {
            let size = c.size();
            (0..size.y)
                .flat_map(|y| (0..size.x).map(move |x| (x, y)))
                .map(|(x, y)| inv.load(c, x, y, 0, 0).x as u32)
                .collect()
        }
        None => Vec::new(),
    };

    inv.run_fragments(|this, fragment| {
        let hit = fragment.hit?;
        let mesh = scene.meshes.get(hit.mesh as usize)?;
        if alpha_test && mesh.is_alpha_culled() {
            return None;
        }
        let front = camera.linearize(this.load_uv(primary, fragment.uv, 0, 0).x);
        if !behind_primary(fragment.linear_depth, front) {
            return None;
        }
        if let Some((min_tex, max_tex)) = interval {
            let lo = this.load_uv(min_tex, fragment.uv, 0, 0).x;
            let hi = this.load_uv(max_tex, fragment.uv, 0, 0).x;
            if hi <= 0.0 || fragment.linear_depth < lo || fragment.linear_depth > hi {
                return None;
            }
        }

        let mut rng = this.rng(fragment.pixel, hit.t.to_bits() ^ hit.mesh.rotate_left(16));
        let coverage = match &table {
            Some(table) => {
                let k = ((alpha * samples as f32) + rng.random_range(0.0..1.0)).floor() as u32;
                if k == 0 {
                    return None;
                }
                table.mask_for(k.min(samples), rng.random_range(0..u32::MAX))
            }
            None => {
                let index = (fragment.pixel.y * counter_width + fragment.pixel.x) as usize;
                let count = counts.get_mut(index)?;
                *count += 1;
                let slot = if *count <= samples {
                    *count - 1
                } else {
                    let r = rng.random_range(0..*count);
                    if r >= samples {
                        return None;
                    }
                    r
                };
                1 << slot
            }
        };

        let depth = if linearize {
            DepthEncoding::NormalizedLinear.from_linear(fragment.linear_depth, near, far)
        } else {
            fragment.depth
        };
        Some(
            FragmentOutput::new()
                .with_depth(depth)
                .with_coverage(coverage),
        )
    })?;

    if let Some(counter) = counter {
        let size = counter.size();
        for (i, count) in counts.into_iter().enumerate() {
            let (x, y) = (i as u32 % size.x, i as u32 / size.x);
            inv.store(counter, x, y, 0, Vec4::splat(count as f32));
        }
    }
    Ok(())
}

/// One camera ray per pixel, hits behind the primary surface written to the
/// channels of `stochasticDepth`. Registered both as a ray-generation
/// program and as a compute program issuing inline ray queries.
pub fn ray(inv: &mut Invocation<'_>) -> Result<()> {
    let defines = inv.defines();
    let samples = defines.get_u32("NUM_SAMPLES").unwrap_or(4).clamp(1, 4) as usize;
    let alpha = defines.get_f32("ALPHA").unwrap_or(0.2);
    let implementation =
        RayImplementation::from_define(defines.get_u32("IMPLEMENTATION").unwrap_or(0));
    let encoding = if defines.is_enabled("NORMALIZE") {
        DepthEncoding::NormalizedLinear
    } else {
        DepthEncoding::Linear
    };
    let alpha_test = defines.is_enabled("USE_ALPHA_TEST");
    let jitter = defines.is_enabled("JITTER");
    let ray_interval = defines.is_enabled("USE_RAY_INTERVAL");
    let cull = CullMode::from_define(defines.get_u32("CULL_MODE").unwrap_or(2));

    let scene = Arc::clone(inv.scene()?);
    let camera = inv.camera()?;
    let (near, far) = (camera.near(), camera.far());
    let linear_z = inv.required("linearZ")?;
    let output = inv.required("stochasticDepth")?;
    let mask = inv.texture("stencilMask");
    let interval = match (ray_interval, inv.texture("rayMin"), inv.texture("rayMax")) {
        (true, Some(lo), Some(hi)) => Some((lo, hi)),
        _ => None,
    };
    let alpha_mask: Vec<u32> = inv.buffer("alphaMask").map(<[u32]>::to_vec).unwrap_or_default();
    let table = if implementation == RayImplementation::CoverageMask {
        Some(stratified_table(inv, samples as u32)?)
    } else {
        None
    };

    let empty = encoding.from_linear(far, near, far);
    // Compute launches round up to whole workgroups.
    let size = output.size();
    let dims = inv.threads().truncate().min(size);
    let flags = RayFlags {
        cull: cull.to_face(),
        alpha_test: false,
    };
    let is_masked = |mesh: u32| {
        alpha_mask
            .get(mesh as usize / 32)
            .is_some_and(|word| word & (1 << (mesh % 32)) != 0)
    };

    let mut writes: Vec<(UVec2, Vec4)> = Vec::with_capacity((dims.x * dims.y) as usize);
    for y in 0..dims.y {
        for x in 0..dims.x {
            let pixel = UVec2::new(x, y);
            let mut rng = inv.rng(pixel, 0);
            let offset = if jitter {
                Vec2::new(rng.random_range(0.0..1.0), rng.random_range(0.0..1.0))
            } else {
                Vec2::splat(0.5)
            };
            let uv = (pixel.as_vec2() + offset) / size.as_vec2();
            let mut slots = [empty; 4];

            if let Some(mask) = mask
                && inv.load_uv(mask, uv, 0, 0).x == 0.0
            {
                writes.push((pixel, Vec4::from_array(slots)));
                continue;
            }

            let front = inv.load_uv(linear_z, uv, 0, 0).x;
            let (mut lo, mut hi) = (front, far);
            if let Some((min_tex, max_tex)) = interval {
                let max = inv.load_uv(max_tex, uv, 0, 0).x;
                if max <= 0.0 {
                    writes.push((pixel, Vec4::from_array(slots)));
                    continue;
                }
                lo = lo.max(inv.load_uv(min_tex, uv, 0, 0).x);
                hi = hi.min(max);
            }

            let ray = camera.primary_ray(uv);
            let depths: SmallVec<[f32; 16]> = scene
                .trace_all(&ray, 0.0, f32::INFINITY, flags)
                .into_iter()
                .filter(|hit| {
                    !(alpha_test
                        && is_masked(hit.mesh)
                        && scene
                            .meshes
                            .get(hit.mesh as usize)
                            .is_some_and(|m| m.is_alpha_culled()))
                })
                .map(|hit| camera.depth_along(&ray, hit.t))
                .filter(|d| behind_primary(*d, front) && *d >= lo && *d <= hi)
                .collect();

            let mut chosen: SmallVec<[f32; 4]> = SmallVec::new();
            match implementation {
                RayImplementation::Default | RayImplementation::KBuffer => {
                    chosen.extend(depths.iter().copied().take(samples));
                }
                RayImplementation::ReservoirSampling => {
                    for (i, d) in depths.iter().copied().enumerate() {
                        if i < samples {
                            chosen.push(d);
                        } else {
                            let j = rng.random_range(0..=i);
                            if j < samples {
                                chosen[j] = d;
                            }
                        }
                    }
                    chosen.sort_by(f32::total_cmp);
                }
                RayImplementation::CoverageMask => {
                    let mut filled = [false; 4];
                    if let Some(table) = &table {
                        for d in depths.iter().copied() {
                            let k = ((alpha * samples as f32) + rng.random_range(0.0..1.0))
                                .floor() as u32;
                            if k == 0 {
                                continue;
                            }
                            let mask = table
                                .mask_for(k.min(samples as u32), rng.random_range(0..u32::MAX));
                            for slot in 0..samples {
                                if mask & (1 << slot) != 0 && !filled[slot] {
                                    filled[slot] = true;
                                    slots[slot] = encoding.from_linear(d, near, far);
                                }
                            }
                        }
                    }
                }
            }
            for (slot, d) in slots.iter_mut().zip(chosen) {
                *slot = encoding.from_linear(d, near, far);
            }
            writes.push((pixel, Vec4::from_array(slots)));
        }
    }

    for (pixel, value) in writes {
        inv.store(output, pixel.x, pixel.y, 0, value);
    }
    Ok(())
}
