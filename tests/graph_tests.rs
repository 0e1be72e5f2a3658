//! Render Graph and Pass Tests
//!
//! Tests for:
//! - RenderGraph edge validation, compile errors and texture pooling
//! - Depth/normal prepass, depth linearization and depth peeling output
//! - HBAO slice draws over a deinterleaved depth array
//! - VAO decision layers, unsupported modes and diagnostic export
//! - Stochastic depth sources (raster and ray) inside a graph: layer values,
//!   stencil masks, reservoir counters and ray implementations

use std::sync::Arc;

use glam::{UVec2, Vec3, Vec4};

use myth_ao::renderer::core::SamplePositions;
use myth_ao::renderer::programs;
use myth_ao::renderer::software::Command;
use myth_ao::resources::{DepthFormat, DepthMode, RayImplementation};
use myth_ao::{
    AoError, Camera, DepthNormalPrepass, DepthPeelingPass, DeviceSettings, HbaoPass,
    LinearizeDepthPass, Mesh, Properties, RenderContext, RenderGraph, Scene, SoftwareDevice,
    StochasticDepthRaster, StochasticDepthRay, Texture, TextureDesc, VaoPass,
};

const SIZE: u32 = 64;
const CENTER: u32 = SIZE / 2;

fn approx_eps(a: f32, b: f32, eps: f32) -> bool {
    (a - b).abs() < eps
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Camera 10 units above a large ground plane, looking straight down at a
/// unit cube resting on it.
fn plane_and_cube() -> Arc<Scene> {
    let camera = Camera::new_perspective(60.0, 1.0, 0.1, 100.0).looking_at(
        Vec3::new(0.0, 10.0, 0.0),
        Vec3::ZERO,
        Vec3::NEG_Z,
    );
    Arc::new(
        Scene::new(camera)
            .with_mesh(Mesh::ground_plane(Vec3::ZERO, 50.0))
            .with_mesh(Mesh::cuboid("Box", Vec3::new(0.0, 0.5, 0.0), Vec3::splat(0.5))),
    )
}

/// Prepass and linearization, the front of every AO graph.
fn depth_graph(device: &mut SoftwareDevice) -> anyhow::Result<RenderGraph> {
    let mut graph = RenderGraph::new(UVec2::splat(SIZE));
    graph.set_scene(device, Some(plane_and_cube()));
    graph.add_pass(device, "Prepass", Box::new(DepthNormalPrepass::default()));
    graph.add_pass(device, "Linearize", Box::new(LinearizeDepthPass::default()));
    graph.add_edge("Prepass.depth", "Linearize.depth")?;
    Ok(graph)
}

// ============================================================================
// Graph Validation
// ============================================================================

#[test]
fn execute_requires_compile() {
    let mut device = SoftwareDevice::default();
    let mut graph = depth_graph(&mut device).unwrap();
    let err = graph.execute(&mut device).err();
    assert!(matches!(err, Some(AoError::GraphNotCompiled)));
}

#[test]
fn edge_to_unknown_pass_is_rejected() {
    let mut device = SoftwareDevice::default();
    let mut graph = depth_graph(&mut device).unwrap();
    let err = graph.add_edge("Prepass.depth", "Nowhere.depth").err();
    assert!(matches!(err, Some(AoError::UnknownPass(ref name)) if name == "Nowhere"));
}

#[test]
fn backward_edge_is_rejected() {
    let mut device = SoftwareDevice::default();
    let mut graph = depth_graph(&mut device).unwrap();
    let err = graph.add_edge("Linearize.linearDepth", "Prepass.depth").err();
    assert!(matches!(err, Some(AoError::UnknownField(_))));
}

#[test]
fn unconnected_required_input_fails_compile() {
    let mut device = SoftwareDevice::default();
    let mut graph = depth_graph(&mut device).unwrap();
    graph.add_pass(&mut device, "VAO", Box::new(VaoPass::default()));
    let err = graph.compile(&mut device).err();
    assert!(
        matches!(err, Some(AoError::MissingResource { ref pass, ref name }) if pass == "VAO" && name == "depth"),
        "{err:?}"
    );
    assert!(!graph.is_compiled());
}

#[test]
fn edge_into_unknown_field_fails_compile() {
    let mut device = SoftwareDevice::default();
    let mut graph = depth_graph(&mut device).unwrap();
    graph.add_edge("Prepass.normals", "Linearize.normals").unwrap();
    let err = graph.compile(&mut device).err();
    assert!(matches!(err, Some(AoError::UnknownField(ref f)) if f == "Linearize.normals"));
}

#[test]
fn edge_from_unknown_output_fails_compile() {
    let mut device = SoftwareDevice::default();
    let mut graph = depth_graph(&mut device).unwrap();
    graph.add_edge("Prepass.color", "Linearize.depth").unwrap();
    let err = graph.compile(&mut device).err();
    assert!(matches!(err, Some(AoError::UnknownField(_))));
}

#[test]
fn recompile_reuses_pooled_textures() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let mut graph = depth_graph(&mut device)?;
    graph.compile(&mut device)?;
    let live = device.live_texture_count();
    let linear = graph.output("Linearize.linearDepth");
    assert!(linear.is_some());

    graph.compile(&mut device)?;
    assert_eq!(device.live_texture_count(), live);
    assert_eq!(graph.output("Linearize.linearDepth"), linear);
    assert_eq!(graph.output("Linearize.nothing"), None);
    Ok(())
}

#[test]
fn pass_downcast_checks_type() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let mut graph = depth_graph(&mut device)?;
    assert!(graph.pass_mut::<LinearizeDepthPass>("Linearize").is_some());
    assert!(graph.pass_mut::<VaoPass>("Linearize").is_none());
    assert!(graph.pass_mut::<LinearizeDepthPass>("Missing").is_none());
    assert_eq!(graph.pass("Prepass").map(|p| p.name()), Some(DepthNormalPrepass::TYPE_NAME));
    Ok(())
}

#[test]
fn frames_are_counted() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let mut graph = depth_graph(&mut device)?;
    graph.compile(&mut device)?;
    graph.execute(&mut device)?;
    graph.execute(&mut device)?;
    assert_eq!(graph.frame_index(), 2);
    // The prepass program is built once and reused.
    assert_eq!(device.launches_of(programs::DEPTH_NORMAL_PREPASS), 2);
    assert_eq!(device.stats().programs_compiled, 2);
    Ok(())
}

// ============================================================================
// Depth Acquisition
// ============================================================================

#[test]
fn prepass_and_linearize_produce_view_depth() -> anyhow::Result<()> {
    init_logging();
    let mut device = SoftwareDevice::default();
    let mut graph = depth_graph(&mut device)?;
    graph.compile(&mut device)?;
    graph.execute(&mut device)?;

    let linear = device.read_texture(graph.output("Linearize.linearDepth").unwrap())?;
    // Cube top at y = 1, ground at y = 0.
    assert!(approx_eps(linear.value(CENTER, CENTER), 9.0, 0.05));
    assert!(approx_eps(linear.value(2, 2), 10.0, 0.05));

    let normals = device.read_texture(graph.output("Prepass.normals").unwrap())?;
    let up = normals.texel(CENTER, CENTER, 0, 0);
    assert!(approx_eps(up.y, 1.0, 0.01), "{up}");
    assert!(approx_eps(up.x, 0.5, 0.01));

    let double_sided = device.read_texture(graph.output("Prepass.doubleSided").unwrap())?;
    assert!(double_sided.values().all(|v| v == 0.0));
    Ok(())
}

#[test]
fn prepass_without_scene_only_clears() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let mut graph = RenderGraph::new(UVec2::splat(16));
    graph.add_pass(&mut device, "Prepass", Box::new(DepthNormalPrepass::default()));
    graph.compile(&mut device)?;
    graph.execute(&mut device)?;

    assert_eq!(device.launches_of(programs::DEPTH_NORMAL_PREPASS), 0);
    let depth = device.read_texture(graph.output("Prepass.depth").unwrap())?;
    assert!(depth.values().all(|v| v == 1.0));
    Ok(())
}

#[test]
fn depth_peeling_finds_the_ground_behind_the_cube() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let mut graph = depth_graph(&mut device)?;
    graph.add_pass(&mut device, "Peel", Box::new(DepthPeelingPass::default()));
    graph.add_pass(&mut device, "Linearize2", Box::new(LinearizeDepthPass::default()));
    graph
        .add_edge("Prepass.depth", "Peel.depth")?
        .add_edge("Peel.depth2", "Linearize2.depth")?;
    graph.compile(&mut device)?;
    graph.execute(&mut device)?;

    let depth2 = device.read_texture(graph.output("Linearize2.linearDepth").unwrap())?;
    // Behind the cube top the next front face is the ground.
    assert!(approx_eps(depth2.value(CENTER, CENTER), 10.0, 0.05));
    // Nothing lies behind the ground; the cleared layer reads as far.
    assert!(depth2.value(2, 2) > 99.0);
    Ok(())
}

// ============================================================================
// HBAO
// ============================================================================

#[test]
fn hbao_draws_one_layer_per_slice() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let quarter = UVec2::splat(SIZE / 4);

    let depth = device.create_texture(
        TextureDesc::new_2d("deinterleavedDepth", quarter, wgpu::TextureFormat::R32Float)
            .with_layers(16),
    );
    let flat = vec![10.0f32; (quarter.x * quarter.y) as usize];
    for layer in 0..16 {
        device.write_texture(depth, layer, &flat)?;
    }
    let normals = device.create_texture(TextureDesc::new_2d(
        "normals",
        UVec2::splat(SIZE),
        wgpu::TextureFormat::Rgba16Float,
    ));
    let facing_up: Vec<f32> = std::iter::repeat_n([0.5, 1.0, 0.5, 1.0], (SIZE * SIZE) as usize)
        .flatten()
        .collect();
    device.write_texture(normals, 0, &facing_up)?;

    let mut graph = RenderGraph::new(UVec2::splat(SIZE));
    graph.set_scene(&mut device, Some(plane_and_cube()));
    graph.add_pass(&mut device, "HBAO", Box::new(HbaoPass::default()));
    graph
        .set_input("HBAO.depth", depth)?
        .set_input("HBAO.normals", normals)?;
    graph.compile(&mut device)?;
    device.take_commands();
    graph.execute(&mut device)?;

    let layers: Vec<u32> = device
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::DrawFullScreen { program, layer, .. } if *program == programs::HBAO => {
                Some(*layer)
            }
            _ => None,
        })
        .collect();
    assert_eq!(layers, (0..16).collect::<Vec<_>>());

    let ambient = graph.output("HBAO.ambientMap").unwrap();
    assert_eq!(ambient.desc.array_layers, 16);
    assert_eq!(ambient.size(), quarter);
    // A flat, camera-facing surface is unoccluded.
    let ao = device.read_texture(ambient)?;
    for layer in [0, 5, 15] {
        let texel = ao.texel(quarter.x / 2, quarter.y / 2, layer, 0);
        assert!(texel.x > 0.9, "slice {layer}: {texel}");
    }
    Ok(())
}

#[test]
fn hbao_constants_upload_only_after_an_edit() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let quarter = UVec2::splat(SIZE / 4);
    let depth = device.create_texture(
        TextureDesc::new_2d("deinterleavedDepth", quarter, wgpu::TextureFormat::R32Float)
            .with_layers(16),
    );
    let normals = device.create_texture(TextureDesc::new_2d(
        "normals",
        UVec2::splat(SIZE),
        wgpu::TextureFormat::Rgba16Float,
    ));

    let mut graph = RenderGraph::new(UVec2::splat(SIZE));
    graph.set_scene(&mut device, Some(plane_and_cube()));
    graph.add_pass(&mut device, "HBAO", Box::new(HbaoPass::default()));
    graph
        .set_input("HBAO.depth", depth)?
        .set_input("HBAO.normals", normals)?;
    graph.compile(&mut device)?;

    let hbao = graph.pass_mut::<HbaoPass>("HBAO").unwrap();
    assert!(hbao.uploaded_params().is_none());
    let initial = hbao.params().radius;

    graph.execute(&mut device)?;
    let hbao = graph.pass_mut::<HbaoPass>("HBAO").unwrap();
    let uploaded = hbao.uploaded_params().unwrap();
    assert_eq!(uploaded.radius, initial);
    assert_eq!(uploaded.resolution, UVec2::splat(SIZE).as_vec2());

    // An edit stays local until the next frame uploads it.
    hbao.set_radius(initial + 3.0);
    assert_eq!(hbao.uploaded_params().unwrap().radius, initial);

    graph.execute(&mut device)?;
    let hbao = graph.pass_mut::<HbaoPass>("HBAO").unwrap();
    let uploaded = hbao.uploaded_params().unwrap();
    assert_eq!(uploaded.radius, initial + 3.0);
    assert_eq!(uploaded.neg_inv_r_sq, -1.0 / (uploaded.radius * uploaded.radius));
    Ok(())
}

#[test]
fn disabled_hbao_writes_white() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let mut graph = RenderGraph::new(UVec2::splat(SIZE));
    let hbao = HbaoPass::from_properties(&Properties::new().with("enabled", false))?;
    graph.add_pass(&mut device, "HBAO", Box::new(hbao));
    let depth = device.create_texture(
        TextureDesc::new_2d("depth", UVec2::splat(SIZE / 4), wgpu::TextureFormat::R32Float)
            .with_layers(16),
    );
    let normals = device.create_texture(TextureDesc::new_2d(
        "normals",
        UVec2::splat(SIZE),
        wgpu::TextureFormat::Rgba16Float,
    ));
    graph
        .set_input("HBAO.depth", depth)?
        .set_input("HBAO.normals", normals)?;
    graph.compile(&mut device)?;
    graph.execute(&mut device)?;

    assert_eq!(device.launches_of(programs::HBAO), 0);
    let ao = device.read_texture(graph.output("HBAO.ambientMap").unwrap())?;
    assert_eq!(ao.texel(1, 1, 7, 0), Vec4::new(1.0, 1.0, 0.0, 0.0));
    Ok(())
}

// ============================================================================
// VAO
// ============================================================================

fn vao_graph(device: &mut SoftwareDevice, vao: VaoPass) -> anyhow::Result<RenderGraph> {
    let mut graph = depth_graph(device)?;
    graph.add_pass(device, "VAO", Box::new(vao));
    graph
        .add_edge("Linearize.linearDepth", "VAO.depth")?
        .add_edge("Prepass.normals", "VAO.normals")?
        .add_edge("Prepass.doubleSided", "VAO.doubleSided")?;
    Ok(graph)
}

#[test]
fn vao_allocates_one_decision_layer_per_sample() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let vao = VaoPass::from_properties(&Properties::new().with("kernelSize", 4u32))?;
    let mut graph = vao_graph(&mut device, vao)?;
    graph.compile(&mut device)?;
    graph.execute(&mut device)?;

    assert_eq!(device.launches_of(programs::VAO), 1);
    for name in programs::VAO_DECISION_BUFFERS {
        let texture = graph.output(&format!("VAO.{name}")).unwrap();
        assert_eq!(texture.desc.array_layers, 4, "{name}");
        assert_eq!(texture.size(), UVec2::splat(SIZE));
    }

    // Open ground far from the cube.
    let ao = device.read_texture(graph.output("VAO.ambientMap").unwrap())?;
    assert!(ao.value(4, CENTER) > 0.9);
    Ok(())
}

#[test]
fn vao_rejects_classifier_modes() {
    let mut device = SoftwareDevice::default();
    let vao = VaoPass::from_properties(
        &Properties::new().with("depthMode", DepthMode::MachineClassify),
    )
    .unwrap();
    let mut graph = vao_graph(&mut device, vao).unwrap();
    let err = graph.compile(&mut device).err();
    assert!(matches!(err, Some(AoError::UnsupportedDepthMode { .. })));
}

#[test]
fn vao_stochastic_mode_needs_a_stochastic_map() {
    let mut device = SoftwareDevice::default();
    let vao = VaoPass::from_properties(
        &Properties::new().with("depthMode", DepthMode::StochasticDepth),
    )
    .unwrap();
    let mut graph = vao_graph(&mut device, vao).unwrap();
    let err = graph.compile(&mut device).err();
    assert!(
        matches!(err, Some(AoError::MissingReflection { ref field, .. }) if field == "stochasticDepth")
    );
}

#[test]
fn vao_dual_depth_without_second_layer_still_runs() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let vao = VaoPass::from_properties(&Properties::new().with("depthMode", DepthMode::DualDepth))?;
    let mut graph = vao_graph(&mut device, vao)?;
    graph.compile(&mut device)?;
    graph.execute(&mut device)?;
    assert_eq!(device.launches_of(programs::VAO), 1);
    Ok(())
}

#[test]
fn vao_export_writes_index_and_arrays() -> anyhow::Result<()> {
    let dir = std::env::temp_dir().join(format!("myth-ao-export-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);

    let mut device = SoftwareDevice::default();
    let vao = VaoPass::from_properties(&Properties::new().with("kernelSize", 2u32))?;
    let mut graph = vao_graph(&mut device, vao)?;
    graph.compile(&mut device)?;
    graph.pass_mut::<VaoPass>("VAO").unwrap().request_export(&dir);
    graph.execute(&mut device)?;

    let index: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.join("index.json"))?)?;
    assert_eq!(index["pass"], "VAO");
    assert_eq!(index["entries"].as_array().map(Vec::len), Some(9));
    assert!(dir.join("ambientMap.npy").exists());
    assert!(dir.join("rasterDepth_1.png").exists());

    // One export per request.
    std::fs::remove_dir_all(&dir)?;
    graph.execute(&mut device)?;
    assert!(!dir.exists());
    Ok(())
}

// ============================================================================
// Stochastic Depth
// ============================================================================

#[test]
fn stochastic_raster_fills_a_multisampled_target() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let mut graph = depth_graph(&mut device)?;
    graph.add_pass(&mut device, "Stochastic", Box::new(StochasticDepthRaster::default()));
    graph.add_edge("Prepass.depth", "Stochastic.depth")?;
    graph.compile(&mut device)?;
    graph.execute(&mut device)?;

    let target = graph.output("Stochastic.stochasticDepth").unwrap();
    assert_eq!(target.desc.sample_count, 8);
    assert_eq!(target.size(), UVec2::splat(SIZE));
    assert_eq!(device.launches_of(programs::STOCHASTIC_RASTER), 1);
    Ok(())
}

#[test]
fn stochastic_ray_falls_back_to_ray_queries() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::new(DeviceSettings {
        ray_tracing: false,
        ..DeviceSettings::default()
    });
    let mut graph = depth_graph(&mut device)?;
    graph.add_pass(&mut device, "Stochastic", Box::new(StochasticDepthRay::default()));
    graph.add_edge("Linearize.linearDepth", "Stochastic.linearZ")?;
    graph.compile(&mut device)?;
    graph.execute(&mut device)?;

    assert_eq!(device.launches_of(programs::STOCHASTIC_RAY), 0);
    assert_eq!(device.launches_of(programs::STOCHASTIC_RAY_QUERY), 1);
    Ok(())
}

#[test]
fn stochastic_ray_uses_the_ray_pipeline_when_available() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let mut graph = depth_graph(&mut device)?;
    graph.add_pass(&mut device, "Stochastic", Box::new(StochasticDepthRay::default()));
    graph.add_edge("Linearize.linearDepth", "Stochastic.linearZ")?;
    graph.compile(&mut device)?;
    graph.execute(&mut device)?;

    assert_eq!(device.launches_of(programs::STOCHASTIC_RAY), 1);
    assert_eq!(device.launches_of(programs::STOCHASTIC_RAY_QUERY), 0);
    Ok(())
}

// ─── Stochastic layer values ────────────────────────────────────────────────

/// Normalized linear depth of the ground plane, 10 units below the camera.
const GROUND: f32 = (10.0 - 0.1) / (100.0 - 0.1);
/// Cube top pixels on either side of the mask edge at `CENTER`.
const MASKED_OUT: (u32, u32) = (CENTER - 2, CENTER);
const MASKED_IN: (u32, u32) = (CENTER + 1, CENTER);
const OPEN_GROUND: (u32, u32) = (4, CENTER);

fn raster_graph(
    device: &mut SoftwareDevice,
    props: &Properties,
    mask: Option<Texture>,
) -> anyhow::Result<RenderGraph> {
    let mut graph = depth_graph(device)?;
    let pass = StochasticDepthRaster::from_properties(props)?;
    graph.add_pass(device, "Stochastic", Box::new(pass));
    graph.add_edge("Prepass.depth", "Stochastic.depth")?;
    if let Some(mask) = mask {
        graph.set_input("Stochastic.stencilMask", mask)?;
    }
    graph.compile(device)?;
    Ok(graph)
}

fn ray_graph(
    device: &mut SoftwareDevice,
    props: &Properties,
    mask: Option<Texture>,
) -> anyhow::Result<RenderGraph> {
    let mut graph = depth_graph(device)?;
    let pass = StochasticDepthRay::from_properties(props)?;
    graph.add_pass(device, "Stochastic", Box::new(pass));
    graph.add_edge("Linearize.linearDepth", "Stochastic.linearZ")?;
    if let Some(mask) = mask {
        graph.set_input("Stochastic.stencilMask", mask)?;
    }
    graph.compile(device)?;
    Ok(graph)
}

/// Non-zero on the right half of the screen.
fn right_half_mask(device: &mut SoftwareDevice) -> anyhow::Result<Texture> {
    let mask = device.create_texture(TextureDesc::new_2d(
        "mask",
        UVec2::splat(SIZE),
        wgpu::TextureFormat::R8Uint,
    ));
    let values: Vec<f32> = (0..SIZE * SIZE)
        .map(|i| if i % SIZE >= CENTER { 1.0 } else { 0.0 })
        .collect();
    device.write_texture(mask, 0, &values)?;
    Ok(mask)
}

/// Every sample of a multisampled raster target at one pixel.
fn raster_layers(
    device: &SoftwareDevice,
    graph: &RenderGraph,
    (x, y): (u32, u32),
) -> anyhow::Result<Vec<f32>> {
    let target = graph.output("Stochastic.stochasticDepth").unwrap();
    let texels = device.read_texture(target)?;
    Ok((0..target.desc.sample_count)
        .map(|s| texels.texel(x, y, 0, s).x)
        .collect())
}

fn ray_layers(
    device: &SoftwareDevice,
    graph: &RenderGraph,
    (x, y): (u32, u32),
) -> anyhow::Result<Vec4> {
    let target = graph.output("Stochastic.stochasticDepth").unwrap();
    Ok(device.read_texture(target)?.texel(x, y, 0, 0))
}

fn count_ground(layers: &[f32]) -> usize {
    layers.iter().filter(|&&v| approx_eps(v, GROUND, 1e-3)).count()
}

fn all_empty(layers: &[f32]) -> bool {
    layers.iter().all(|&v| v == 1.0)
}

#[test]
fn raster_layers_hold_only_surfaces_behind_the_primary() -> anyhow::Result<()> {
    init_logging();
    let mut device = SoftwareDevice::default();
    let mut graph = raster_graph(&mut device, &Properties::new(), None)?;
    graph.execute(&mut device)?;

    // The ground behind the cube top claims floor(0.2 * 8 + u) of 8 slots.
    for pixel in [(CENTER, CENTER), (CENTER - 1, CENTER), MASKED_IN, MASKED_OUT] {
        let layers = raster_layers(&device, &graph, pixel)?;
        let ground = count_ground(&layers);
        assert!((1..=2).contains(&ground), "{pixel:?}: {layers:?}");
        assert_eq!(
            layers.iter().filter(|&&v| v == 1.0).count(),
            layers.len() - ground,
            "{pixel:?}: {layers:?}"
        );
    }
    // Nothing lies behind open ground.
    assert!(all_empty(&raster_layers(&device, &graph, OPEN_GROUND)?));
    Ok(())
}

#[test]
fn raster_alpha_one_claims_every_sample() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let props = Properties::new().with("Alpha", 1.0f32);
    let mut graph = raster_graph(&mut device, &props, None)?;
    graph.execute(&mut device)?;

    let layers = raster_layers(&device, &graph, (CENTER, CENTER))?;
    assert_eq!(count_ground(&layers), 8, "{layers:?}");
    Ok(())
}

#[test]
fn reservoir_sampling_fills_one_slot_per_surface_every_frame() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let props = Properties::new().with("ReservoirSampling", true);
    let mut graph = raster_graph(&mut device, &props, None)?;

    for frame in 0..3 {
        graph.execute(&mut device)?;
        let layers = raster_layers(&device, &graph, (CENTER, CENTER))?;
        // Counters restart at zero, so the only surface lands in slot 0.
        assert!(approx_eps(layers[0], GROUND, 1e-3), "frame {frame}: {layers:?}");
        assert!(all_empty(&layers[1..]), "frame {frame}: {layers:?}");
    }
    assert!(all_empty(&raster_layers(&device, &graph, OPEN_GROUND)?));
    Ok(())
}

#[test]
fn stencil_mask_limits_raster_to_marked_pixels() -> anyhow::Result<()> {
    init_logging();
    let mut device = SoftwareDevice::default();
    let mask = right_half_mask(&mut device)?;
    let props = Properties::new()
        .with("Alpha", 1.0f32)
        .with("depthFormat", DepthFormat::D32FloatS8X24);
    let mut graph = raster_graph(&mut device, &props, Some(mask))?;
    graph.execute(&mut device)?;

    assert_eq!(device.launches_of(programs::STOCHASTIC_STENCIL), 1);
    let stenciled = device.commands().iter().any(|c| {
        matches!(c, Command::Rasterize { program, stencil: true, .. }
            if *program == programs::STOCHASTIC_RASTER)
    });
    assert!(stenciled);

    assert_eq!(count_ground(&raster_layers(&device, &graph, MASKED_IN)?), 8);
    assert!(all_empty(&raster_layers(&device, &graph, MASKED_OUT)?));
    Ok(())
}

#[test]
fn stencil_mask_on_depth_only_target_is_dropped() -> anyhow::Result<()> {
    init_logging();
    let mut device = SoftwareDevice::default();
    let mask = right_half_mask(&mut device)?;
    let props = Properties::new()
        .with("Alpha", 1.0f32)
        .with("depthFormat", DepthFormat::D32Float);
    let mut graph = raster_graph(&mut device, &props, Some(mask))?;
    graph.execute(&mut device)?;
    graph.execute(&mut device)?;

    assert_eq!(device.launches_of(programs::STOCHASTIC_STENCIL), 0);
    let stenciled = device
        .commands()
        .iter()
        .any(|c| matches!(c, Command::Rasterize { stencil: true, .. }));
    assert!(!stenciled);

    // Without the mask both sides of the edge are sampled.
    assert_eq!(count_ground(&raster_layers(&device, &graph, MASKED_IN)?), 8);
    assert_eq!(count_ground(&raster_layers(&device, &graph, MASKED_OUT)?), 8);
    Ok(())
}

#[test]
fn raster_samples_sit_at_pixel_centers_after_compile() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let mut graph = raster_graph(&mut device, &Properties::new(), None)?;
    let pass = graph.pass_mut::<StochasticDepthRaster>("Stochastic").unwrap();
    assert_eq!(pass.sample_positions(), SamplePositions::PixelCenter);

    graph.execute(&mut device)?;
    let positions = device.commands().iter().find_map(|c| match c {
        Command::Rasterize {
            program,
            sample_positions,
            ..
        } if *program == programs::STOCHASTIC_RASTER => Some(*sample_positions),
        _ => None,
    });
    assert_eq!(positions, Some(SamplePositions::PixelCenter));
    Ok(())
}

#[test]
fn ray_implementations_agree_on_a_single_surface_behind() -> anyhow::Result<()> {
    init_logging();
    for implementation in [
        RayImplementation::Default,
        RayImplementation::KBuffer,
        RayImplementation::ReservoirSampling,
    ] {
        let mut device = SoftwareDevice::default();
        let props = Properties::new().with("Implementation", implementation);
        let mut graph = ray_graph(&mut device, &props, None)?;
        graph.execute(&mut device)?;

        let layers = ray_layers(&device, &graph, (CENTER, CENTER))?;
        assert!(approx_eps(layers.x, GROUND, 1e-3), "{implementation:?}: {layers}");
        assert_eq!(Vec3::new(layers.y, layers.z, layers.w), Vec3::ONE, "{implementation:?}: {layers}");
        assert_eq!(ray_layers(&device, &graph, OPEN_GROUND)?, Vec4::ONE);
    }

    // Every slot claims the surface when alpha covers all of them.
    let mut device = SoftwareDevice::default();
    let props = Properties::new()
        .with("Implementation", RayImplementation::CoverageMask)
        .with("Alpha", 1.0f32);
    let mut graph = ray_graph(&mut device, &props, None)?;
    graph.execute(&mut device)?;
    let layers = ray_layers(&device, &graph, (CENTER, CENTER))?;
    assert!(layers.to_array().iter().all(|&v| approx_eps(v, GROUND, 1e-3)), "{layers}");
    Ok(())
}

#[test]
fn ray_stencil_mask_skips_unmarked_pixels() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let mask = right_half_mask(&mut device)?;
    let mut graph = ray_graph(&mut device, &Properties::new(), Some(mask))?;
    graph.execute(&mut device)?;

    assert!(approx_eps(ray_layers(&device, &graph, MASKED_IN)?.x, GROUND, 1e-3));
    assert_eq!(ray_layers(&device, &graph, MASKED_OUT)?, Vec4::ONE);
    Ok(())
}
