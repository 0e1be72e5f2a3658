//! Resource Tests
//!
//! Tests for:
//! - StratifiedTable layout for every supported sample count
//! - Guard band scissor/viewport and valid uv region
//! - Properties parsing, JSON text form and per-pass round trips
//! - Pass factory lookup

use glam::{UVec2, Vec2};

use myth_ao::renderer::passes::PASS_TYPES;
use myth_ao::resources::stratified::binomial_row;
use myth_ao::resources::{DepthMode, SampleDistribution};
use myth_ao::{
    AoError, GuardBandInfo, Properties, RenderPass, StochasticDepthRaster, StochasticDepthRay,
    StratifiedTable, SvaoPass, VaoPass, compute_scissor_and_viewport, create_pass,
};

const EPSILON: f32 = 1e-6;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

// ============================================================================
// Stratified Table
// ============================================================================

#[test]
fn binomial_rows_match_pascal_triangle() {
    assert_eq!(binomial_row(0), vec![1]);
    assert_eq!(binomial_row(4), vec![1, 4, 6, 4, 1]);
    assert_eq!(binomial_row(8)[4], 70);
    assert_eq!(binomial_row(16).iter().sum::<u32>(), 1 << 16);
}

#[test]
fn stratified_table_layout_for_all_sample_counts() {
    for n in 1..=16u32 {
        let table = StratifiedTable::generate(n);
        let binomials = binomial_row(n);
        assert_eq!(table.sample_count(), n);
        assert_eq!(table.indices.len(), n as usize + 1);
        assert_eq!(table.lookup.len(), 1 << n);

        // Prefix sums of the binomial row.
        let mut expected = 0;
        for k in 0..=n as usize {
            assert_eq!(table.indices[k], expected, "n={n} k={k}");
            expected += binomials[k];
        }

        // Every mask exactly once.
        let mut seen = vec![false; 1 << n];
        for &mask in &table.lookup {
            assert!(!seen[mask as usize], "n={n}: mask {mask:#x} repeated");
            seen[mask as usize] = true;
        }

        for k in 0..=n {
            let range = table.class_range(k);
            assert_eq!(range.len() as u32, binomials[k as usize]);
            let class = &table.lookup[range];
            assert!(class.iter().all(|m| m.count_ones() == k), "n={n} k={k}");
            assert!(class.windows(2).all(|w| w[0] < w[1]), "n={n} k={k} not ascending");
        }
    }
}

#[test]
fn stratified_table_small_example() {
    let table = StratifiedTable::generate(3);
    assert_eq!(table.indices, vec![0, 1, 4, 7]);
    assert_eq!(table.lookup, vec![0, 1, 2, 4, 3, 5, 6, 7]);
}

#[test]
fn stratified_table_extreme_classes() {
    let table = StratifiedTable::generate(8);
    assert_eq!(table.mask_for(0, 0), 0);
    assert_eq!(table.mask_for(8, 0), 0xFF);
    // Rank wraps inside the class.
    assert_eq!(table.mask_for(1, 8), table.mask_for(1, 0));
}

#[test]
fn stratified_table_buffer_round_trip() {
    let table = StratifiedTable::generate(6);
    let buffer = table.to_buffer();
    assert_eq!(buffer.len(), 7 + 64);
    assert_eq!(StratifiedTable::from_buffer(6, &buffer), Some(table));
    assert_eq!(StratifiedTable::from_buffer(6, &buffer[1..]), None);
}

// ============================================================================
// Guard Band
// ============================================================================

#[test]
fn guard_band_scissor_keeps_full_viewport() {
    let (scissor, viewport) = compute_scissor_and_viewport(UVec2::new(1920, 1080), 64);
    assert_eq!((scissor.x, scissor.y), (64, 64));
    assert_eq!((scissor.width, scissor.height), (1792, 952));
    assert!(approx(viewport.width, 1920.0));
    assert!(approx(viewport.height, 1080.0));
    assert!(approx(viewport.x, 0.0));
}

#[test]
fn zero_guard_band_covers_everything() {
    let (scissor, _) = compute_scissor_and_viewport(UVec2::new(64, 32), 0);
    assert_eq!((scissor.x, scissor.y, scissor.width, scissor.height), (0, 0, 64, 32));
}

#[test]
fn oversized_guard_band_yields_empty_scissor() {
    let (scissor, _) = compute_scissor_and_viewport(UVec2::new(16, 16), 8);
    assert_eq!(scissor.width, 0);
    assert_eq!(scissor.height, 0);
}

#[test]
fn guard_band_near_u32_max_saturates() {
    for band in [u32::MAX / 2 + 1, u32::MAX] {
        let (scissor, viewport) = compute_scissor_and_viewport(UVec2::new(64, 64), band);
        assert!(scissor.is_empty());
        assert_eq!((scissor.x, scissor.y), (band, band));
        assert!(approx(viewport.width, 64.0));
    }
}

#[test]
fn guard_band_uv_region() {
    let info = GuardBandInfo::new(2, UVec2::new(64, 64));
    assert!(approx(info.uv_min.x, 2.5 / 64.0));
    assert!(approx(info.uv_max.y, 61.5 / 64.0));
    assert!(info.contains_uv(Vec2::splat(0.5)));
    assert!(!info.contains_uv(Vec2::new(0.01, 0.5)));
    assert!(!info.contains_uv(Vec2::new(0.5, 0.99)));
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn properties_parse_enums_by_name() {
    let props = Properties::new()
        .with("depthMode", DepthMode::DualDepth)
        .with("distribution", SampleDistribution::Poisson);
    assert_eq!(props.get::<DepthMode>("depthMode").unwrap(), Some(DepthMode::DualDepth));
    assert_eq!(props.get::<DepthMode>("missing").unwrap(), None);

    let json = props.to_json().unwrap();
    assert!(json.contains("\"DualDepth\""));
    assert_eq!(Properties::from_json(&json).unwrap(), props);
}

#[test]
fn wrong_property_type_is_an_error() {
    let err = VaoPass::from_properties(&Properties::new().with("radius", "large")).err();
    assert!(matches!(err, Some(AoError::InvalidProperty { ref key, .. }) if key == "radius"));

    let err = SvaoPass::from_properties(&Properties::new().with("enabled", 1u32)).err();
    assert!(matches!(err, Some(AoError::InvalidProperty { .. })));
}

#[test]
fn unknown_property_is_ignored() {
    let pass = VaoPass::from_properties(&Properties::new().with("noSuchKey", true)).unwrap();
    assert_eq!(pass.kernel_size(), 8);
}

#[test]
fn vao_kernel_size_is_clamped() {
    let pass = VaoPass::from_properties(&Properties::new().with("kernelSize", 100u32)).unwrap();
    assert_eq!(pass.kernel_size(), 32);
    assert_eq!(pass.params().kernel_size, 32);

    let pass = VaoPass::from_properties(&Properties::new().with("kernelSize", 0u32)).unwrap();
    assert_eq!(pass.kernel_size(), 1);
}

#[test]
fn svao_classify_probability_is_clamped() {
    let pass =
        SvaoPass::from_properties(&Properties::new().with("classifyProbability", 1.5f32)).unwrap();
    let p: f32 = pass
        .properties()
        .get("classifyProbability")
        .unwrap()
        .expect("classifyProbability reported");
    assert!(p < 1.0);
}

#[test]
fn stochastic_sample_counts_are_validated() {
    for count in [0u32, 17] {
        let err = StochasticDepthRaster::from_properties(
            &Properties::new().with("SampleCount", count),
        )
        .err();
        assert!(
            matches!(err, Some(AoError::UnsupportedSampleCount { count: c, .. }) if c == count),
            "raster count {count}"
        );
    }
    let err = StochasticDepthRay::from_properties(&Properties::new().with("SampleCount", 3u32)).err();
    assert!(matches!(err, Some(AoError::UnsupportedSampleCount { count: 3, .. })));
}

// ============================================================================
// Pass Factory
// ============================================================================

#[test]
fn every_pass_type_round_trips_its_properties() {
    for type_name in PASS_TYPES {
        let pass = create_pass(type_name, &Properties::new()).unwrap();
        assert_eq!(pass.name(), type_name);

        let props = pass.properties();
        let rebuilt = create_pass(type_name, &props).unwrap();
        assert_eq!(rebuilt.properties(), props, "{type_name}");
    }
}

#[test]
fn non_default_properties_survive_round_trip() {
    let props = Properties::new()
        .with("radius", 0.75f32)
        .with("secondaryDepthMode", DepthMode::StochasticDepth)
        .with("stochMapDivisor", 2u32)
        .with("dualAO", true);
    let pass = create_pass(SvaoPass::TYPE_NAME, &props).unwrap();
    let reported = pass.properties();
    for (key, value) in props.iter() {
        assert_eq!(reported.get_value(key), Some(value), "{key}");
    }
}

#[test]
fn unknown_pass_type_is_rejected() {
    let err = create_pass("SSAO", &Properties::new()).err();
    assert!(matches!(err, Some(AoError::UnknownPass(ref name)) if name == "SSAO"));
}
