//! Program names shared by the passes and the device kernels.

pub const DEPTH_NORMAL_PREPASS: &str = "prepass/depth_normal";
pub const LINEARIZE_DEPTH: &str = "linearize_depth";
pub const DEPTH_PEELING: &str = "depth_peeling";

pub const STOCHASTIC_STENCIL: &str = "stochastic_depth/stencil";
pub const STOCHASTIC_RASTER: &str = "stochastic_depth/raster";
pub const STOCHASTIC_RAY: &str = "stochastic_depth/ray";
/// Compute fallback of [`STOCHASTIC_RAY`] using inline ray queries.
pub const STOCHASTIC_RAY_QUERY: &str = "stochastic_depth/ray_query";

pub const HBAO: &str = "hbao";
pub const VAO: &str = "vao";

pub const SVAO_PASS1: &str = "svao/pass1";
pub const SVAO_PASS2: &str = "svao/pass2";
pub const SVAO_PASS2_RAY: &str = "svao/pass2_ray";

/// Per-sample decision layers written by the VAO program, in binding order.
pub const VAO_DECISION_BUFFERS: [&str; 8] = [
    "rasterDepth",
    "rayDepth",
    "askRay",
    "requireRay",
    "forceRay",
    "rasterAO",
    "rayAO",
    "sphereEnd",
];
