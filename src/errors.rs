//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`AoError`] separates two families of failure:
//!
//! - **Configuration errors** raised while reflecting or compiling a pass
//!   (missing upstream information, unsupported sample counts, unsupported
//!   depth modes). These abort graph compilation.
//! - **Lookup errors** raised while wiring or executing a graph (missing
//!   resources, unknown passes or fields, unknown shader programs).
//!
//! Degraded-capability conditions (a stencil mask bound to a depth format
//! without stencil, an optional input left unconnected) are *not* errors:
//! they are reported through `log::warn!` and the frame continues.
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for `std::result::Result<T, AoError>`.
//!
//! ```rust,ignore
//! use myth_ao::errors::{AoError, Result};
//!
//! fn compile_pass() -> Result<()> {
//!     Err(AoError::MissingReflection { pass: "VAO".into(), field: "stochasticDepth".into() })
//! }
//! ```

use thiserror::Error;

/// The main error type for the AO passes and their host layer.
#[derive(Error, Debug)]
pub enum AoError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Required information about a connected upstream resource is absent.
    #[error("{pass}: missing reflection data for '{field}'")]
    MissingReflection {
        /// Pass that requested the information
        pass: String,
        /// Field whose edge carries no information
        field: String,
    },

    /// The requested per-pixel sample count is not supported.
    #[error("{pass}: unsupported sample count {count}")]
    UnsupportedSampleCount {
        /// Pass that rejected the count
        pass: String,
        /// The rejected count
        count: u32,
    },

    /// The depth mode cannot be used by this pass.
    #[error("{pass}: depth mode {mode} is not supported")]
    UnsupportedDepthMode {
        /// Pass that rejected the mode
        pass: String,
        /// Name of the rejected mode
        mode: String,
    },

    /// A feature switch was enabled that this pass cannot honour.
    #[error("{pass}: {feature} is not supported")]
    UnsupportedFeature {
        /// Pass that rejected the feature
        pass: String,
        /// Description of the feature
        feature: String,
    },

    // ========================================================================
    // Property Errors
    // ========================================================================
    /// A property was present but its value had the wrong type or range.
    #[error("Invalid value for property '{key}': {reason}")]
    InvalidProperty {
        /// Property key
        key: String,
        /// Why the value was rejected
        reason: String,
    },

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // Graph Errors
    // ========================================================================
    /// A resource required by a pass was not bound for this execution.
    #[error("{pass}: required resource '{name}' is not bound")]
    MissingResource {
        /// Pass that requested the resource
        pass: String,
        /// Field name of the resource
        name: String,
    },

    /// No pass with this type name exists.
    #[error("Unknown render pass type: {0}")]
    UnknownPass(String),

    /// An edge refers to a pass or field that does not exist.
    #[error("Unknown field '{0}'")]
    UnknownField(String),

    /// The graph was executed before it was compiled.
    #[error("Render graph must be compiled before execution")]
    GraphNotCompiled,

    // ========================================================================
    // Device Errors
    // ========================================================================
    /// No kernel or shader is registered under this program name.
    #[error("Shader program not found: {0}")]
    ShaderNotFound(String),

    /// The texture handle is stale or belongs to another device.
    #[error("Invalid texture handle")]
    InvalidTexture,

    /// A ray-tracing program was requested on a device without ray tracing.
    #[error("Ray tracing is not supported by this device")]
    RayTracingUnsupported,

    /// No suitable GPU adapter was found.
    #[error("Failed to request GPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// The adapter refused to create a device.
    #[error("Failed to create GPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    /// A GPU readback did not complete.
    #[error("GPU readback failed: {0}")]
    Readback(String),

    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encoding error.
    #[error("Image encode error: {0}")]
    Image(String),
}

impl From<image::ImageError> for AoError {
    fn from(err: image::ImageError) -> Self {
        AoError::Image(err.to_string())
    }
}

/// Alias for `Result<T, AoError>`.
pub type Result<T> = std::result::Result<T, AoError>;
