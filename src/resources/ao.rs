//! Ambient Occlusion Parameter Blocks
//!
//! Pure data shared by the AO passes: the constant blocks uploaded to the
//! programs, the sample-kernel generators and the noise tables.
//!
//! # GPU Constant Blocks
//!
//! - [`VaoData`]: volumetric AO (VAO and SVAO). Sample kernel, radius,
//!   thickness, exponent, resolution, noise scale and screen-space radius
//!   limits.
//! - [`HbaoData`]: horizon-based AO. Radius with its exponential falloff
//!   constant, NdotV bias, power exponent and quarter-resolution sizes.
//!
//! Both are wrapped in a [`ParamBlock`], which tracks a dirty flag. Setters
//! write through [`ParamBlock::write`]; a pass uploads the block once on the
//! next execute and clears the flag. The block is never written while a
//! dispatch that reads it is being recorded.
//!
//! # Kernel Layout
//!
//! Each kernel entry is a `Vec4`: `xy` is a point in the unit disk (the
//! sample's footprint on the AO sphere), `zw` are per-sample jitter seeds.
//! The sphere height above the disk point is `sqrt(1 - x² - y²)`.

use bytemuck::{Pod, Zeroable};
use glam::{UVec2, Vec2, Vec4};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

use crate::resources::modes::SampleDistribution;

/// Compile-time cap on the VAO kernel size.
pub const MAX_KERNEL_SIZE: usize = 32;

/// SVAO evaluates a fixed kernel of this size (one stencil bit per sample).
pub const SVAO_KERNEL_SIZE: u32 = 8;

/// Side length of the tiled dither noise texture.
pub const NOISE_SIZE: u32 = 4;

/// Seed shared by every kernel generator so kernels are stable across runs.
pub const KERNEL_SEED: u64 = 5_960_372;

/// Number of deinterleaved HBAO slices (4×4 pattern).
pub const HBAO_SLICE_COUNT: u32 = 16;

/// Why a sample must be resolved by a ray regardless of its raster result.
///
/// Stored as the texel value of the `forceRay` decision layers.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ForceRay {
    #[default]
    None = 0,
    OutOfScreen = 1,
    DoubleSided = 2,
    Invalid = 3,
}

impl ForceRay {
    #[inline]
    #[must_use]
    pub fn is_forced(self) -> bool {
        self != Self::None
    }

    /// Texel value written to the decision layers.
    #[inline]
    #[must_use]
    pub fn texel(self) -> f32 {
        f32::from(self as u8)
    }
}

// ============================================================================
// GPU Constant Blocks
// ============================================================================

/// Constant block of the volumetric AO programs.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct VaoData {
    pub sample_kernel: [Vec4; MAX_KERNEL_SIZE],
    pub resolution: Vec2,
    pub inv_resolution: Vec2,
    pub noise_scale: Vec2,
    pub radius: f32,
    pub exponent: f32,
    pub thickness: f32,
    /// Screen-space sphere radius (pixels) below which refinement is skipped.
    pub ss_radius_fade_end: f32,
    /// Width (pixels) of the fade between raster-only and refined results.
    pub ss_radius_fade_size: f32,
    /// Screen-space sphere radius clamp (pixels).
    pub max_ss_radius: f32,
    /// Logit threshold used by classifier depth modes.
    pub classify_threshold: f32,
    pub kernel_size: u32,
    pub guard_band: u32,
    pub _pad: u32,
}

impl Default for VaoData {
    fn default() -> Self {
        let mut data = Self {
            radius: 1.0,
            exponent: 2.0,
            thickness: 0.5,
            ss_radius_fade_end: 2.0,
            ss_radius_fade_size: 2.0,
            max_ss_radius: 512.0,
            classify_threshold: classify_threshold(0.5),
            kernel_size: SVAO_KERNEL_SIZE,
            ..Zeroable::zeroed()
        };
        data.set_kernel(&generate_vao_kernel(
            SVAO_KERNEL_SIZE,
            SampleDistribution::VanDerCorput,
        ));
        data
    }
}

impl VaoData {
    /// Copies a kernel in, truncating to [`MAX_KERNEL_SIZE`].
    pub fn set_kernel(&mut self, kernel: &[Vec4]) {
        let n = kernel.len().min(MAX_KERNEL_SIZE);
        self.sample_kernel = [Vec4::ZERO; MAX_KERNEL_SIZE];
        self.sample_kernel[..n].copy_from_slice(&kernel[..n]);
        self.kernel_size = n as u32;
    }

    /// Updates resolution-derived fields.
    pub fn set_resolution(&mut self, resolution: UVec2) {
        let res = resolution.as_vec2();
        self.resolution = res;
        self.inv_resolution = Vec2::ONE / res.max(Vec2::ONE);
        self.noise_scale = res / NOISE_SIZE as f32;
    }

    #[must_use]
    pub fn kernel(&self) -> &[Vec4] {
        &self.sample_kernel[..self.kernel_size as usize]
    }
}

/// Constant block of the HBAO program.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct HbaoData {
    pub resolution: Vec2,
    pub inv_resolution: Vec2,
    pub quarter_resolution: Vec2,
    pub inv_quarter_resolution: Vec2,
    pub noise_scale: Vec2,
    pub radius: f32,
    /// `-1 / radius²`, the exponential falloff constant.
    pub neg_inv_r_sq: f32,
    pub n_dot_v_bias: f32,
    pub power_exponent: f32,
    pub guard_band: u32,
    pub _pad: u32,
}

impl Default for HbaoData {
    fn default() -> Self {
        Self {
            radius: 1.0,
            neg_inv_r_sq: -1.0,
            n_dot_v_bias: 0.1,
            power_exponent: 2.0,
            ..Zeroable::zeroed()
        }
    }
}

impl HbaoData {
    pub fn set_radius(&mut self, radius: f32) {
        self.radius = radius;
        self.neg_inv_r_sq = -1.0 / (radius * radius);
    }

    pub fn set_resolution(&mut self, resolution: UVec2) {
        let res = resolution.as_vec2();
        let quarter = UVec2::new(resolution.x.div_ceil(4), resolution.y.div_ceil(4)).as_vec2();
        self.resolution = res;
        self.inv_resolution = Vec2::ONE / res.max(Vec2::ONE);
        self.quarter_resolution = quarter;
        self.inv_quarter_resolution = Vec2::ONE / quarter.max(Vec2::ONE);
        self.noise_scale = res / NOISE_SIZE as f32;
    }
}

/// Per-slice constants of one HBAO draw.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct HbaoSliceData {
    /// `(sin, cos)` of the direction rotation, then two jitter values.
    pub noise: Vec4,
    pub quarter_offset: UVec2,
    pub slice: u32,
    pub _pad: u32,
}

/// Clip planes consumed by depth linearization.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct DepthRangeData {
    pub near: f32,
    pub far: f32,
    pub _pad: [f32; 2],
}

impl DepthRangeData {
    #[must_use]
    pub fn new(near: f32, far: f32) -> Self {
        Self {
            near,
            far,
            _pad: [0.0; 2],
        }
    }
}

// ============================================================================
// ParamBlock
// ============================================================================

/// A constant block plus a dirty flag.
#[derive(Debug, Clone)]
pub struct ParamBlock<T: Pod> {
    data: T,
    dirty: bool,
}

impl<T: Pod> ParamBlock<T> {
    /// New blocks start dirty so their first use uploads them.
    #[must_use]
    pub fn new(data: T) -> Self {
        Self { data, dirty: true }
    }

    #[inline]
    #[must_use]
    pub fn read(&self) -> &T {
        &self.data
    }

    /// Mutable access; marks the block dirty.
    #[inline]
    pub fn write(&mut self) -> &mut T {
        self.dirty = true;
        &mut self.data
    }

    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns the dirty state and clears it.
    #[inline]
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        bytemuck::bytes_of(&self.data)
    }
}

impl<T: Pod + Default> Default for ParamBlock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

// ============================================================================
// Kernel & Noise Generation
// ============================================================================

/// `-ln(1/p - 1)`: converts a classification probability into a logit.
#[must_use]
pub fn classify_threshold(probability: f32) -> f32 {
    let p = probability.clamp(1e-6, 1.0 - 1e-6);
    -(1.0 / p - 1.0).ln()
}

/// Base-2 radical inverse (Van der Corput sequence).
#[must_use]
pub fn radical_inverse(i: u32) -> f32 {
    i.reverse_bits() as f32 * 2.328_306_4e-10
}

/// Generates a volumetric AO kernel of `size` samples.
///
/// The seed is fixed so kernels are reproducible. Van der Corput kernels are
/// only uniformly spread when `size` is a power of two; other sizes log a
/// warning but are still produced.
#[must_use]
pub fn generate_vao_kernel(size: u32, distribution: SampleDistribution) -> Vec<Vec4> {
    let size = size.clamp(1, MAX_KERNEL_SIZE as u32);
    let mut rng = StdRng::seed_from_u64(KERNEL_SEED);

    match distribution {
        SampleDistribution::Poisson => poisson_kernel(size, &mut rng),
        SampleDistribution::Triangle => triangle_kernel(size, &mut rng),
        SampleDistribution::Random | SampleDistribution::VanDerCorput => {
            if distribution == SampleDistribution::VanDerCorput && !size.is_power_of_two() {
                log::warn!(
                    "VanDerCorput kernels are only uniform for power-of-two sizes (got {size})"
                );
            }
            (0..size)
                .map(|i| {
                    let rand = if distribution == SampleDistribution::Random {
                        Vec2::new(rng.random_range(0.0..1.0), rng.random_range(0.0..1.0))
                    } else {
                        // Offset by `size` so index 0 does not map to the disk center.
                        Vec2::new(i as f32 / size as f32, radical_inverse(size + i))
                    };
                    let theta = rand.x * std::f32::consts::TAU;
                    let r = (1.0 - rand.y.powf(2.0 / 3.0)).sqrt();
                    Vec4::new(
                        r * theta.sin(),
                        r * theta.cos(),
                        rng.random_range(0.0..1.0),
                        rng.random_range(0.0..1.0),
                    )
                })
                .collect()
        }
    }
}

/// Brute-force Poisson-disk rejection sampling inside the unit disk. The
/// minimal distance shrinks every hundred failed attempts.
fn poisson_kernel(size: u32, rng: &mut StdRng) -> Vec<Vec4> {
    let mut r: f32 = match size {
        0..16 => 0.28,
        16..24 => 0.19,
        24..32 => 0.15,
        _ => 0.13,
    };

    const MAX_RETRIES: u32 = 1_000;
    let mut attempt = 0u32;
    loop {
        let mut points: Vec<Vec4> = Vec::with_capacity(size as usize);
        let mut retries = 0;
        while points.len() < size as usize && retries < MAX_RETRIES {
            retries += 1;
            let p = Vec2::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0));
            if p.length_squared() > (1.0 - r) * (1.0 - r) {
                continue;
            }
            let min_dist_sq = (2.0 * r) * (2.0 * r);
            if points
                .iter()
                .any(|q| p.distance_squared(q.truncate().truncate()) < min_dist_sq)
            {
                continue;
            }
            points.push(Vec4::new(
                p.x,
                p.y,
                rng.random_range(0.0..1.0),
                rng.random_range(0.0..1.0),
            ));
        }

        if points.len() == size as usize {
            return points;
        }

        attempt += 1;
        if attempt.is_multiple_of(100) {
            r -= 0.01;
        }
    }
}

/// Samples along the closed path p0 → p1 → p2 → p0.
fn triangle_kernel(size: u32, rng: &mut StdRng) -> Vec<Vec4> {
    let p0 = Vec2::new(0.0, 0.8);
    let p1 = Vec2::new(0.6, -0.6);
    let p2 = Vec2::new(-0.6, -0.6);

    (0..size)
        .map(|i| {
            let t = i as f32 / size as f32 * 8.0;
            let p = if t < 3.0 {
                p0.lerp(p1, t / 3.0)
            } else if t < 5.0 {
                p1.lerp(p2, (t - 3.0) / 2.0)
            } else {
                p2.lerp(p0, (t - 5.0) / 3.0)
            };
            Vec4::new(
                p.x,
                p.y,
                rng.random_range(0.0..1.0),
                rng.random_range(0.0..1.0),
            )
        })
        .collect()
}

/// Sphere height above each kernel disk point.
#[must_use]
pub fn sphere_heights(kernel: &[Vec4]) -> Vec<f32> {
    kernel
        .iter()
        .map(|s| (1.0 - s.truncate().truncate().length_squared()).max(0.0).sqrt())
        .collect()
}

/// 4×4 ordered-dither noise (R8Unorm texels).
#[must_use]
pub fn generate_dither_noise() -> Vec<u8> {
    const DITHER: [f32; 16] = [
        0.0, 8.0, 2.0, 10.0, 12.0, 4.0, 14.0, 6.0, 3.0, 11.0, 1.0, 9.0, 15.0, 7.0, 13.0, 5.0,
    ];
    DITHER.iter().map(|v| (v / 16.0 * 255.0) as u8).collect()
}

/// Per-slice HBAO noise: rotation `(sin, cos)` and two jitter values.
#[must_use]
pub fn generate_hbao_slice_noise() -> [Vec4; HBAO_SLICE_COUNT as usize] {
    let mut rng = StdRng::seed_from_u64(0);
    std::array::from_fn(|_| {
        let angle = rng.random_range(0.0..std::f32::consts::TAU);
        Vec4::new(
            angle.sin(),
            angle.cos(),
            rng.random_range(0.0..1.0),
            rng.random_range(0.0..1.0),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernels_stay_in_unit_disk() {
        for dist in [
            SampleDistribution::Random,
            SampleDistribution::VanDerCorput,
            SampleDistribution::Poisson,
            SampleDistribution::Triangle,
        ] {
            let kernel = generate_vao_kernel(8, dist);
            assert_eq!(kernel.len(), 8);
            for s in &kernel {
                assert!(s.truncate().truncate().length() <= 1.0 + 1e-5, "{dist:?}: {s}");
                assert!((0.0..1.0).contains(&s.z));
            }
        }
    }

    #[test]
    fn kernel_is_deterministic() {
        let a = generate_vao_kernel(16, SampleDistribution::Random);
        let b = generate_vao_kernel(16, SampleDistribution::Random);
        assert_eq!(a, b);
    }

    #[test]
    fn poisson_respects_minimum_spacing() {
        let kernel = generate_vao_kernel(8, SampleDistribution::Poisson);
        for (i, a) in kernel.iter().enumerate() {
            for b in &kernel[i + 1..] {
                let d = a.truncate().truncate().distance(b.truncate().truncate());
                assert!(d >= 2.0 * 0.2, "points too close: {d}");
            }
        }
    }

    #[test]
    fn dither_noise_matches_bayer_pattern() {
        let noise = generate_dither_noise();
        assert_eq!(noise.len(), 16);
        assert_eq!(noise[0], 0);
        assert_eq!(noise[1], 127);
        assert_eq!(noise[12], 239);
    }

    #[test]
    fn hbao_radius_updates_falloff() {
        let mut data = HbaoData::default();
        data.set_radius(2.0);
        assert!((data.neg_inv_r_sq + 0.25).abs() < 1e-6);
    }

    #[test]
    fn classify_threshold_is_zero_at_half() {
        assert!(classify_threshold(0.5).abs() < 1e-6);
    }

    #[test]
    fn constant_blocks_have_no_padding() {
        assert_eq!(std::mem::size_of::<VaoData>(), 32 * 16 + 64);
        assert_eq!(std::mem::size_of::<HbaoData>(), 64);
    }
}
