//! wgpu Device Tests
//!
//! Tests for:
//! - Texture lifetimes, clears, uploads and readback on a real adapter
//! - Compute dispatch of a registered WGSL program into a storage texture
//! - The built-in full-screen depth linearization
//! - Capability errors (ray tracing, scene rasterization, missing bindings)
//!
//! Every test returns early when the machine has no usable adapter.

use glam::{UVec2, UVec3, Vec4};

use myth_ao::renderer::core::{GraphicsState, RenderTargets};
use myth_ao::renderer::gpu::{BindingKind, ShaderSource};
use myth_ao::renderer::programs;
use myth_ao::resources::DepthRangeData;
use myth_ao::{
    AoError, GpuDevice, GpuSettings, ProgramDesc, ProgramVars, RenderContext, ShaderDefines,
    TextureDesc,
};

const FILL_SHADER: &str = r"
struct Params {
    base: f32,
    _p0: f32,
    _p1: f32,
    _p2: f32,
};

@group(0) @binding(0) var output: texture_storage_2d<r32float, write>;
@group(0) @binding(1) var<uniform> params: Params;

@compute @workgroup_size(8, 8, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let size = textureDimensions(output);
    if (id.x >= size.x || id.y >= size.y) {
        return;
    }
    let value = params.base + f32(id.x * STEP) + 100.0 * f32(id.y);
    textureStore(output, vec2<i32>(id.xy), vec4<f32>(value, 0.0, 0.0, 1.0));
}
";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn gpu() -> Option<GpuDevice> {
    init_logging();
    match GpuDevice::new(&GpuSettings::default()) {
        Ok(device) => Some(device),
        Err(e) => {
            log::warn!("No GPU available, skipping: {e}");
            None
        }
    }
}

fn fill_source() -> ShaderSource {
    ShaderSource::new(FILL_SHADER)
        .bind(0, "output", BindingKind::StorageTexture)
        .bind(1, "Params", BindingKind::Constants)
}

// ============================================================================
// Resources
// ============================================================================

#[test]
fn clear_then_read_back_every_layer() {
    let Some(mut device) = gpu() else { return };
    let texture = device.create_texture(
        TextureDesc::new_2d("Cleared", UVec2::new(5, 3), wgpu::TextureFormat::Rgba8Unorm)
            .with_layers(2),
    );
    device
        .clear_texture(texture, Vec4::new(1.0, 0.0, 0.5, 1.0))
        .unwrap();

    let texels = device.read_texture(texture).unwrap();
    assert_eq!(texels.data.len(), 5 * 3 * 4 * 2);
    for layer in 0..2 {
        let t = texels.texel(4, 2, layer, 0);
        assert!((t.x - 1.0).abs() < 1e-6);
        assert!(t.y.abs() < 1e-6);
        assert!((t.z - 128.0 / 255.0).abs() < 1e-6);
    }
}

#[test]
fn uploaded_texels_read_back_unchanged() {
    let Some(mut device) = gpu() else { return };
    let texture = device.create_texture(TextureDesc::new_2d(
        "Upload",
        UVec2::new(3, 2),
        wgpu::TextureFormat::R32Float,
    ));
    let values = [0.0, 1.5, -2.0, 3.25, 1e4, 0.125];
    device.write_texture(texture, 0, &values).unwrap();

    let texels = device.read_texture(texture).unwrap();
    assert_eq!(texels.data, values);
    assert!((texels.value(1, 1) - 1e4).abs() < 1e-3);
}

#[test]
fn destroyed_texture_is_no_longer_alive() {
    let Some(mut device) = gpu() else { return };
    let texture = device.create_texture(TextureDesc::new_2d(
        "Transient",
        UVec2::splat(8),
        wgpu::TextureFormat::R16Float,
    ));
    assert!(device.is_texture_alive(texture));
    assert_eq!(device.live_texture_count(), 1);

    device.destroy_texture(texture);
    assert!(!device.is_texture_alive(texture));
    assert_eq!(device.live_texture_count(), 0);
    assert!(matches!(
        device.clear_texture(texture, Vec4::ZERO),
        Err(AoError::InvalidTexture)
    ));
    // A second destroy of the stale handle is a no-op.
    device.destroy_texture(texture);
}

#[test]
fn upload_with_wrong_length_is_rejected() {
    let Some(mut device) = gpu() else { return };
    let texture = device.create_texture(TextureDesc::new_2d(
        "Short",
        UVec2::splat(4),
        wgpu::TextureFormat::Rg32Float,
    ));
    assert!(device.write_texture(texture, 0, &[0.0; 16]).is_err());
    assert!(device.write_texture(texture, 1, &[0.0; 32]).is_err());
}

// ============================================================================
// Programs
// ============================================================================

#[test]
fn compute_dispatch_writes_storage_texture() {
    let Some(mut device) = gpu() else { return };
    device.register_shader("test/fill", fill_source());
    let program = device
        .create_program(&ProgramDesc::compute(
            "test/fill",
            ShaderDefines::new().with("STEP", 2u32),
        ))
        .unwrap();

    let size = UVec2::new(10, 9);
    let output = device.create_texture(
        TextureDesc::new_2d("Fill", size, wgpu::TextureFormat::R32Float)
            .with_usage(wgpu::TextureUsages::STORAGE_BINDING),
    );
    let mut vars = ProgramVars::new();
    vars.set_texture("output", output)
        .set_constants("Params", &[0.5f32, 0.0, 0.0, 0.0]);
    device
        .dispatch(program, &vars, UVec3::new(size.x.div_ceil(8), size.y.div_ceil(8), 1))
        .unwrap();

    let texels = device.read_texture(output).unwrap();
    assert!((texels.value(0, 0) - 0.5).abs() < 1e-6);
    assert!((texels.value(9, 0) - 18.5).abs() < 1e-6);
    assert!((texels.value(3, 8) - 806.5).abs() < 1e-6);
}

#[test]
fn same_variant_compiles_once() {
    let Some(mut device) = gpu() else { return };
    device.register_shader("test/fill", fill_source());
    let desc = ProgramDesc::compute("test/fill", ShaderDefines::new().with("STEP", 1u32));
    let a = device.create_program(&desc).unwrap();
    let b = device.create_program(&desc).unwrap();
    let c = device
        .create_program(&ProgramDesc::compute(
            "test/fill",
            ShaderDefines::new().with("STEP", 3u32),
        ))
        .unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(device.program_count(), 2);
}

#[test]
fn unbound_resource_is_reported_by_name() {
    let Some(mut device) = gpu() else { return };
    device.register_shader("test/fill", fill_source());
    let program = device
        .create_program(&ProgramDesc::compute(
            "test/fill",
            ShaderDefines::new().with("STEP", 1u32),
        ))
        .unwrap();
    let output = device.create_texture(TextureDesc::new_2d(
        "Fill",
        UVec2::splat(8),
        wgpu::TextureFormat::R32Float,
    ));

    let mut vars = ProgramVars::new();
    vars.set_texture("output", output);
    let err = device.dispatch(program, &vars, UVec3::ONE).unwrap_err();
    assert!(matches!(err, AoError::MissingResource { ref name, .. } if name == "Params"));
}

#[test]
fn builtin_linearize_matches_perspective_inverse() {
    let Some(mut device) = gpu() else { return };
    let program = device
        .create_program(&ProgramDesc::fullscreen(
            programs::LINEARIZE_DEPTH,
            ShaderDefines::new(),
        ))
        .unwrap();

    let size = UVec2::new(4, 1);
    let depth = device.create_texture(TextureDesc::new_2d(
        "Depth",
        size,
        wgpu::TextureFormat::Depth16Unorm,
    ));
    device.write_texture(depth, 0, &[0.0, 0.5, 0.9, 1.0]).unwrap();
    let linear = device.create_texture(TextureDesc::new_2d(
        "Linear",
        size,
        wgpu::TextureFormat::R32Float,
    ));

    let (near, far) = (0.1, 100.0);
    let mut vars = ProgramVars::new();
    vars.set_texture("depth", depth)
        .set_constants("CameraCB", &DepthRangeData::new(near, far));
    device
        .draw_fullscreen(
            program,
            &vars,
            &RenderTargets::color(linear),
            &GraphicsState::default(),
        )
        .unwrap();

    let stored = device.read_texture(depth).unwrap();
    let texels = device.read_texture(linear).unwrap();
    for x in 0..size.x {
        let d = stored.value(x, 0);
        let expected = near * far / (far - d * (far - near));
        let got = texels.value(x, 0);
        assert!((got - expected).abs() <= expected * 1e-4, "x={x}: {got} vs {expected}");
    }
    assert!((texels.value(0, 0) - near).abs() < 1e-4);
    assert!((texels.value(3, 0) - far).abs() < 1e-2);
}

#[test]
fn ray_tracing_and_scene_raster_are_unsupported() {
    let Some(mut device) = gpu() else { return };
    assert!(!device.supports_ray_tracing());
    assert!(matches!(
        device.create_program(&ProgramDesc::ray_tracing(
            programs::STOCHASTIC_RAY,
            ShaderDefines::new(),
        )),
        Err(AoError::RayTracingUnsupported)
    ));
    assert!(matches!(
        device.create_program(&ProgramDesc::raster(
            programs::DEPTH_NORMAL_PREPASS,
            ShaderDefines::new(),
        )),
        Err(AoError::UnsupportedFeature { .. })
    ));
    assert!(matches!(
        device.create_program(&ProgramDesc::compute("test/unknown", ShaderDefines::new())),
        Err(AoError::ShaderNotFound(_))
    ));
}
