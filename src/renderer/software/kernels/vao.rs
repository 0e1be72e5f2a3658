//! Single-pass volumetric AO.
//!
//! Evaluates every kernel sample with the configured depth mode and
//! records, per sample, what each technique saw. Those decision layers are
//! the training data of the classifier depth modes.

use glam::{UVec2, Vec4};
use smallvec::SmallVec;

use crate::errors::Result;
use crate::renderer::core::texture::Texture;
use crate::renderer::programs::VAO_DECISION_BUFFERS;
use crate::renderer::software::invocation::Invocation;
use crate::renderer::software::kernels::ao::{AoContext, SampleValue, stochastic_binding};
use crate::resources::DepthMode;

pub fn vao(inv: &mut Invocation<'_>) -> Result<()> {
    let ctx = AoContext::new(inv)?;
    let mode = DepthMode::from_define(inv.defines().get_u32("DEPTH_MODE").unwrap_or(0));
    let stochastic = if mode == DepthMode::StochasticDepth {
        stochastic_binding(inv)
    } else {
        None
    };
    let ambient = inv.required("ambientMap")?;
    let decisions: [Option<Texture>; 8] = VAO_DECISION_BUFFERS.map(|name| inv.texture(name));
    let prevent = ctx.options.prevent_dark_halos;
    let far = ctx.camera.far();
    let background = [far, far, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0];

    let res = ctx.resolution();
    let threads = inv.threads();
    for y in 0..threads.y.min(res.y) {
        for x in 0..threads.x.min(res.x) {
            let pixel = UVec2::new(x, y);
            let Some(eval) = ctx.evaluate(inv, pixel) else {
                inv.store(ambient, x, y, 0, Vec4::ONE);
                for (texture, value) in decisions.iter().zip(background) {
                    if let Some(t) = *texture {
                        for layer in 0..t.desc.array_layers {
                            inv.store(t, x, y, layer, Vec4::splat(value));
                        }
                    }
                }
                continue;
            };

            let mut values: SmallVec<[SampleValue; 32]> = SmallVec::new();
            let mut records: SmallVec<[[f32; 8]; 32]> = SmallVec::new();
            for sample in &eval.samples {
                let raster = ctx.raster_value(sample);
                let ray = ctx.ray_sample(sample);
                let require = ray.is_some_and(|(v, _)| (v - raster.single(prevent)).abs() > 0.01);
                let ask = raster.ambiguous || sample.force.is_forced();

                let value = match (mode, ray) {
                    (DepthMode::PerfectClassify, Some((v, _))) if require => {
                        SampleValue::resolved(v)
                    }
                    (DepthMode::PerfectClassify, _) => raster,
                    (_, Some((v, _))) if sample.force.is_forced() => SampleValue::resolved(v),
                    _ => ctx.value(inv, sample, mode, stochastic),
                };
                values.push(value);
                records.push([
                    sample.raster_depth,
                    ray.map_or(far, |(_, d)| d),
                    f32::from(u8::from(ask)),
                    f32::from(u8::from(require)),
                    sample.force.texel(),
                    raster.single(prevent),
                    ray.map_or(raster.single(prevent), |(v, _)| v),
                    sample.column.back,
                ]);
            }

            let (single, _, _) = ctx.finish(&values);
            inv.store(ambient, x, y, 0, Vec4::splat(single));
            for (layer, record) in records.iter().enumerate() {
                for (texture, value) in decisions.iter().zip(record) {
                    if let Some(t) = *texture {
                        inv.store(t, x, y, layer as u32, Vec4::splat(*value));
                    }
                }
            }
        }
    }
    Ok(())
}
