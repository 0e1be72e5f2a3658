//! SVAO Tests
//!
//! Tests for:
//! - Disabled pass output and launch counts
//! - Primary-only configurations (no refinement phase)
//! - Stochastic depth ownership across stochMapDivisor changes, recompiles
//!   and runtime depth-mode switches
//! - Ray pipeline selection and its compute fallback
//! - Guard band restriction of the first phase
//! - AO values on open ground and next to an occluder

use std::sync::Arc;

use glam::{UVec2, UVec3, Vec3};

use myth_ao::renderer::programs;
use myth_ao::renderer::software::Command;
use myth_ao::resources::{DepthMode, StochasticDepthImpl};
use myth_ao::{
    Camera, DepthNormalPrepass, DeviceSettings, GuardBandPass, LinearizeDepthPass, Mesh,
    Properties, RenderContext, RenderGraph, Scene, SoftwareDevice, SvaoPass,
};

const SIZE: u32 = 64;

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

/// Prepass → LinearizeDepth → SVAO, optionally behind a guard band pass.
fn svao_graph(
    device: &mut SoftwareDevice,
    svao: SvaoPass,
    guard_band: Option<u32>,
) -> anyhow::Result<RenderGraph> {
    sized_svao_graph(device, svao, guard_band, UVec2::splat(SIZE))
}

fn sized_svao_graph(
    device: &mut SoftwareDevice,
    svao: SvaoPass,
    guard_band: Option<u32>,
    size: UVec2,
) -> anyhow::Result<RenderGraph> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut graph = RenderGraph::new(size);
    graph.set_scene(device, Some(plane_and_cube()));
    if let Some(size) = guard_band {
        let pass = GuardBandPass::from_properties(&Properties::new().with("guardBand", size))?;
        graph.add_pass(device, "GuardBand", Box::new(pass));
    }
    graph.add_pass(device, "Prepass", Box::new(DepthNormalPrepass::default()));
    graph.add_pass(device, "Linearize", Box::new(LinearizeDepthPass::default()));
    graph.add_pass(device, "SVAO", Box::new(svao));
    graph
        .add_edge("Prepass.depth", "Linearize.depth")?
        .add_edge("Linearize.linearDepth", "SVAO.depth")?
        .add_edge("Prepass.depth", "SVAO.gbufferDepth")?
        .add_edge("Prepass.normals", "SVAO.normals")?
        .add_edge("Prepass.doubleSided", "SVAO.doubleSided")?;
    graph.compile(device)?;
    Ok(graph)
}

fn svao(props: Properties) -> SvaoPass {
    SvaoPass::from_properties(&props).expect("valid SVAO properties")
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn disabled_pass_writes_white_without_dispatching() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let pass = svao(Properties::new().with("enabled", false));
    let mut graph = svao_graph(&mut device, pass, None)?;
    graph.execute(&mut device)?;

    assert_eq!(device.launches_of(programs::SVAO_PASS1), 0);
    assert_eq!(device.launches_of(programs::SVAO_PASS2), 0);
    assert_eq!(device.launches_of(programs::SVAO_PASS2_RAY), 0);
    let ao = device.read_texture(graph.output("SVAO.ao").unwrap())?;
    assert!(ao.values().all(|v| v == 1.0));
    Ok(())
}

#[test]
fn reenabling_rebuilds_on_next_execute() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let pass = svao(
        Properties::new()
            .with("enabled", false)
            .with("secondaryDepthMode", DepthMode::SingleDepth),
    );
    let mut graph = svao_graph(&mut device, pass, None)?;
    graph.execute(&mut device)?;
    graph.pass_mut::<SvaoPass>("SVAO").unwrap().set_enabled(true);
    graph.execute(&mut device)?;
    assert_eq!(device.launches_of(programs::SVAO_PASS1), 1);
    Ok(())
}

#[test]
fn single_depth_secondary_skips_refinement() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let pass = svao(Properties::new().with("secondaryDepthMode", DepthMode::SingleDepth));
    let mut graph = svao_graph(&mut device, pass, None)?;
    graph.execute(&mut device)?;

    assert_eq!(device.launches_of(programs::SVAO_PASS1), 1);
    assert_eq!(device.launches_of(programs::SVAO_PASS2), 0);
    assert_eq!(device.launches_of(programs::SVAO_PASS2_RAY), 0);
    assert_eq!(device.launches_of(programs::STOCHASTIC_RASTER), 0);
    let pass = graph.pass_mut::<SvaoPass>("SVAO").unwrap();
    assert_eq!(pass.stochastic_target(), None);
    Ok(())
}

#[test]
fn unsupported_modes_fail_compile() {
    let mut device = SoftwareDevice::default();
    let pass = svao(Properties::new().with("primaryDepthMode", DepthMode::Raytraced));
    assert!(svao_graph(&mut device, pass, None).is_err());

    let pass = svao(Properties::new().with("secondaryDepthMode", DepthMode::MachinePredict));
    assert!(svao_graph(&mut device, pass, None).is_err());
}

#[test]
fn dual_ao_uses_two_channel_output() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let pass = svao(Properties::new().with("dualAO", true));
    let graph = svao_graph(&mut device, pass, None)?;
    let ao = graph.output("SVAO.ao").unwrap();
    assert_eq!(ao.format(), wgpu::TextureFormat::Rg8Unorm);
    Ok(())
}

// ============================================================================
// Stochastic Depth Ownership
// ============================================================================

fn stochastic_target(graph: &mut RenderGraph) -> Option<myth_ao::Texture> {
    graph
        .pass_mut::<SvaoPass>("SVAO")
        .and_then(|p| p.stochastic_target())
}

#[test]
fn stoch_map_divisor_resizes_owned_target() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let pass = svao(Properties::new().with("secondaryDepthMode", DepthMode::StochasticDepth));
    let mut graph = sized_svao_graph(&mut device, pass, None, UVec2::splat(33))?;
    graph.execute(&mut device)?;

    let first = stochastic_target(&mut graph).expect("stochastic target after execute");
    assert_eq!(first.size(), UVec2::splat(33));
    assert_eq!(device.launches_of(programs::STOCHASTIC_RASTER), 1);
    assert_eq!(device.launches_of(programs::SVAO_PASS2), 1);

    graph.pass_mut::<SvaoPass>("SVAO").unwrap().set_stoch_map_divisor(2);
    graph.compile(&mut device)?;
    graph.execute(&mut device)?;

    // ceil(33 / 2)
    let second = stochastic_target(&mut graph).expect("stochastic target after resize");
    assert_eq!(second.size(), UVec2::splat(17));
    assert!(!device.is_texture_alive(first));
    assert!(device.is_texture_alive(second));
    assert_eq!(device.launches_of(programs::SVAO_PASS2), 2);
    Ok(())
}

#[test]
fn divisor_change_without_recompile_resizes_in_place() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let pass = svao(Properties::new().with("secondaryDepthMode", DepthMode::StochasticDepth));
    let mut graph = svao_graph(&mut device, pass, None)?;
    graph.execute(&mut device)?;
    let first = stochastic_target(&mut graph).expect("stochastic target");

    graph.pass_mut::<SvaoPass>("SVAO").unwrap().set_stoch_map_divisor(4);
    graph.execute(&mut device)?;
    graph.execute(&mut device)?;

    let second = stochastic_target(&mut graph).expect("resized target");
    assert_eq!(second.size(), UVec2::splat(SIZE / 4));
    assert!(!device.is_texture_alive(first));
    assert_eq!(device.launches_of(programs::SVAO_PASS2), 3);
    Ok(())
}

#[test]
fn recompiling_between_frames_rebinds_fresh_textures() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let pass = svao(Properties::new().with("secondaryDepthMode", DepthMode::StochasticDepth));
    let mut graph = svao_graph(&mut device, pass, None)?;

    let mut previous = None;
    for _ in 0..3 {
        graph.execute(&mut device)?;
        let current = stochastic_target(&mut graph).expect("stochastic target");
        if let Some(previous) = previous {
            assert_ne!(previous, current);
            assert!(!device.is_texture_alive(previous));
        }
        previous = Some(current);
        graph.compile(&mut device)?;
    }
    assert_eq!(device.launches_of(programs::SVAO_PASS2), 3);
    Ok(())
}

#[test]
fn secondary_mode_switch_at_runtime_releases_stochastic_source() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let pass = svao(Properties::new().with("secondaryDepthMode", DepthMode::StochasticDepth));
    let mut graph = svao_graph(&mut device, pass, None)?;
    graph.execute(&mut device)?;
    let stochastic = stochastic_target(&mut graph).expect("stochastic target");
    let live = device.live_texture_count();

    graph
        .pass_mut::<SvaoPass>("SVAO")
        .unwrap()
        .set_secondary_depth_mode(DepthMode::Raytraced);
    graph.execute(&mut device)?;

    assert!(!device.is_texture_alive(stochastic));
    assert_eq!(stochastic_target(&mut graph), None);
    assert!(device.live_texture_count() < live);
    assert_eq!(device.launches_of(programs::SVAO_PASS2_RAY), 1);

    // And back again.
    graph
        .pass_mut::<SvaoPass>("SVAO")
        .unwrap()
        .set_secondary_depth_mode(DepthMode::StochasticDepth);
    graph.execute(&mut device)?;
    assert!(stochastic_target(&mut graph).is_some());
    assert_eq!(device.launches_of(programs::SVAO_PASS2), 2);
    Ok(())
}

#[test]
fn ray_stochastic_source_keeps_four_layers() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let pass = svao(
        Properties::new()
            .with("secondaryDepthMode", DepthMode::StochasticDepth)
            .with("stochasticImpl", StochasticDepthImpl::Ray),
    );
    let mut graph = svao_graph(&mut device, pass, None)?;
    graph.execute(&mut device)?;

    let pass = graph.pass_mut::<SvaoPass>("SVAO").unwrap();
    assert_eq!(pass.stochastic_sample_count(), Some(4));
    assert_eq!(
        device.launches_of(programs::STOCHASTIC_RAY)
            + device.launches_of(programs::STOCHASTIC_RAY_QUERY),
        1
    );
    Ok(())
}

#[test]
fn changing_stochastic_impl_releases_previous_source() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let pass = svao(Properties::new().with("secondaryDepthMode", DepthMode::StochasticDepth));
    let mut graph = svao_graph(&mut device, pass, None)?;
    graph.execute(&mut device)?;
    let raster_target = graph
        .pass_mut::<SvaoPass>("SVAO")
        .and_then(|p| p.stochastic_target())
        .expect("raster target");

    let pass = graph.pass_mut::<SvaoPass>("SVAO").unwrap();
    pass.set_stochastic_impl(StochasticDepthImpl::Ray);
    graph.execute(&mut device)?;

    assert!(!device.is_texture_alive(raster_target));
    let pass = graph.pass_mut::<SvaoPass>("SVAO").unwrap();
    assert_eq!(pass.stochastic_sample_count(), Some(4));
    Ok(())
}

// ============================================================================
// Refinement Pipeline
// ============================================================================

#[test]
fn raytraced_secondary_uses_ray_pipeline() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let mut graph = svao_graph(&mut device, SvaoPass::default(), None)?;
    graph.execute(&mut device)?;

    assert_eq!(device.launches_of(programs::SVAO_PASS1), 1);
    assert_eq!(device.launches_of(programs::SVAO_PASS2_RAY), 1);
    assert_eq!(device.launches_of(programs::SVAO_PASS2), 0);
    Ok(())
}

#[test]
fn raytraced_secondary_falls_back_to_compute() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::new(DeviceSettings {
        ray_tracing: false,
        ..DeviceSettings::default()
    });
    let mut graph = svao_graph(&mut device, SvaoPass::default(), None)?;
    graph.execute(&mut device)?;
    graph.execute(&mut device)?;

    assert_eq!(device.launches_of(programs::SVAO_PASS2_RAY), 0);
    assert_eq!(device.launches_of(programs::SVAO_PASS2), 2);
    Ok(())
}

#[test]
fn ray_pipeline_off_uses_compute() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let pass = svao(Properties::new().with("rayPipeline", false));
    let mut graph = svao_graph(&mut device, pass, None)?;
    graph.execute(&mut device)?;

    assert_eq!(device.launches_of(programs::SVAO_PASS2_RAY), 0);
    assert_eq!(device.launches_of(programs::SVAO_PASS2), 1);
    Ok(())
}

#[test]
fn oversized_guard_band_skips_first_phase_without_overflow() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let pass = svao(Properties::new().with("secondaryDepthMode", DepthMode::SingleDepth));
    let mut graph = svao_graph(&mut device, pass, Some(u32::MAX / 2 + 1))?;
    graph.execute(&mut device)?;

    let groups = device.commands().iter().find_map(|c| match c {
        Command::Dispatch { program, groups, .. } if *program == programs::SVAO_PASS1 => {
            Some(*groups)
        }
        _ => None,
    });
    assert_eq!(groups, Some(UVec3::new(0, 0, 1)));
    Ok(())
}

#[test]
fn guard_band_shrinks_first_phase_dispatch() -> anyhow::Result<()> {
    let dispatch_groups = |device: &SoftwareDevice| {
        device.commands().iter().find_map(|c| match c {
            Command::Dispatch { program, groups, .. } if *program == programs::SVAO_PASS1 => {
                Some(*groups)
            }
            _ => None,
        })
    };

    let mut device = SoftwareDevice::default();
    let mut graph = svao_graph(&mut device, SvaoPass::default(), None)?;
    graph.execute(&mut device)?;
    assert_eq!(dispatch_groups(&device), Some(UVec3::new(8, 8, 1)));

    // 64 - 2·16 = 32 inner pixels, already a multiple of 32.
    let mut device = SoftwareDevice::default();
    let mut graph = svao_graph(&mut device, SvaoPass::default(), Some(16))?;
    graph.execute(&mut device)?;
    assert_eq!(dispatch_groups(&device), Some(UVec3::new(4, 4, 1)));
    Ok(())
}

// ============================================================================
// AO Values
// ============================================================================

#[test]
fn open_ground_is_unoccluded_and_cube_edges_darken() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let pass = svao(Properties::new().with("secondaryDepthMode", DepthMode::SingleDepth));
    let mut graph = svao_graph(&mut device, pass, None)?;
    graph.execute(&mut device)?;

    let ao = device.read_texture(graph.output("SVAO.ao").unwrap())?;
    let open = ao.value(4, SIZE / 2);
    assert!(open > 0.9, "open ground AO {open}");

    // The cube top covers roughly pixels 29..35. These are ground pixels
    // within one radius of its sides, with different dither rotations.
    let next_to_cube = [(35, 32), (28, 32), (32, 35), (32, 28), (36, 32), (27, 32)]
        .into_iter()
        .map(|(x, y)| ao.value(x, y))
        .fold(f32::INFINITY, f32::min);
    assert!(
        next_to_cube < open - 0.05,
        "ground next to the cube {next_to_cube}, open ground {open}"
    );
    Ok(())
}

#[test]
fn refinement_keeps_open_ground_bright() -> anyhow::Result<()> {
    let mut device = SoftwareDevice::default();
    let mut graph = svao_graph(&mut device, SvaoPass::default(), None)?;
    graph.execute(&mut device)?;

    let ao = device.read_texture(graph.output("SVAO.ao").unwrap())?;
    assert!(ao.value(4, SIZE / 2) > 0.9);
    assert!(ao.values().all(|v| (0.0..=1.0).contains(&v)));
    Ok(())
}
