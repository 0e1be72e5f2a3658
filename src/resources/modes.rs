//! Configuration Enums
//!
//! Enumerations shared by the AO passes. All of them serialize by variant
//! name so property bags stay readable, and all of them contribute to the
//! shader define sets of the programs that consume them.

use serde::{Deserialize, Serialize};

/// Depth acquisition technique used to evaluate AO samples.
///
/// For SVAO the *primary* mode drives pass 1 and the *secondary* mode drives
/// the refinement pass. `MachineClassify` and `MachinePredict` need a trained
/// classifier network and are rejected at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DepthMode {
    #[default]
    SingleDepth,
    DualDepth,
    StochasticDepth,
    Raytraced,
    MachineClassify,
    MachinePredict,
    PerfectClassify,
}

impl DepthMode {
    /// Inverse of [`define_value`](Self::define_value); unknown values map
    /// to `SingleDepth`.
    #[must_use]
    pub fn from_define(value: u32) -> Self {
        match value {
            1 => Self::DualDepth,
            2 => Self::StochasticDepth,
            3 => Self::Raytraced,
            4 => Self::MachineClassify,
            5 => Self::MachinePredict,
            6 => Self::PerfectClassify,
            _ => Self::SingleDepth,
        }
    }

    /// Integer value baked into shader defines.
    #[must_use]
    pub fn define_value(self) -> u32 {
        match self {
            Self::SingleDepth => 0,
            Self::DualDepth => 1,
            Self::StochasticDepth => 2,
            Self::Raytraced => 3,
            Self::MachineClassify => 4,
            Self::MachinePredict => 5,
            Self::PerfectClassify => 6,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::SingleDepth => "SingleDepth",
            Self::DualDepth => "DualDepth",
            Self::StochasticDepth => "StochasticDepth",
            Self::Raytraced => "Raytraced",
            Self::MachineClassify => "MachineClassify",
            Self::MachinePredict => "MachinePredict",
            Self::PerfectClassify => "PerfectClassify",
        }
    }

    /// Whether a second depth layer input is read.
    #[must_use]
    pub fn uses_depth2(self) -> bool {
        matches!(self, Self::DualDepth)
    }

    /// Modes that need a neural classifier.
    #[must_use]
    pub fn requires_classifier(self) -> bool {
        matches!(self, Self::MachineClassify | Self::MachinePredict)
    }
}

/// Backing implementation of [`DepthMode::StochasticDepth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StochasticDepthImpl {
    #[default]
    Raster,
    Ray,
}

impl StochasticDepthImpl {
    #[must_use]
    pub fn define_value(self) -> u32 {
        match self {
            Self::Raster => 0,
            Self::Ray => 1,
        }
    }
}

/// Sample selection strategy of the ray-traced stochastic depth map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RayImplementation {
    /// The N nearest surfaces behind the primary one.
    #[default]
    Default,
    /// Same stratified coverage-mask scheme as the raster variant.
    CoverageMask,
    /// Uniform subset of all surfaces in the ray interval.
    ReservoirSampling,
    /// Sorted k-buffer of the N nearest surfaces.
    KBuffer,
}

impl RayImplementation {
    #[must_use]
    pub fn from_define(value: u32) -> Self {
        match value {
            1 => Self::CoverageMask,
            2 => Self::ReservoirSampling,
            3 => Self::KBuffer,
            _ => Self::Default,
        }
    }

    #[must_use]
    pub fn define_value(self) -> u32 {
        match self {
            Self::Default => 0,
            Self::CoverageMask => 1,
            Self::ReservoirSampling => 2,
            Self::KBuffer => 3,
        }
    }
}

/// Distribution of the VAO sample kernel in the unit disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SampleDistribution {
    Random,
    #[default]
    VanDerCorput,
    Poisson,
    Triangle,
}

/// Face culling applied when geometry is rasterized or traced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

impl CullMode {
    #[must_use]
    pub fn define_value(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Front => 1,
            Self::Back => 2,
        }
    }

    #[must_use]
    pub fn from_define(value: u32) -> Self {
        match value {
            0 => Self::None,
            1 => Self::Front,
            _ => Self::Back,
        }
    }

    #[must_use]
    pub fn to_face(self) -> Option<wgpu::Face> {
        match self {
            Self::None => None,
            Self::Front => Some(wgpu::Face::Front),
            Self::Back => Some(wgpu::Face::Back),
        }
    }
}

/// Depth-stencil formats selectable through properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DepthFormat {
    D16Unorm,
    #[default]
    D32Float,
    D24UnormS8,
    D32FloatS8X24,
}

impl DepthFormat {
    #[must_use]
    pub fn texture_format(self) -> wgpu::TextureFormat {
        match self {
            Self::D16Unorm => wgpu::TextureFormat::Depth16Unorm,
            Self::D32Float => wgpu::TextureFormat::Depth32Float,
            Self::D24UnormS8 => wgpu::TextureFormat::Depth24PlusStencil8,
            Self::D32FloatS8X24 => wgpu::TextureFormat::Depth32FloatStencil8,
        }
    }

    #[must_use]
    pub fn has_stencil(self) -> bool {
        matches!(self, Self::D24UnormS8 | Self::D32FloatS8X24)
    }
}

/// Color formats used for linear depth targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LinearDepthFormat {
    R16Float,
    #[default]
    R32Float,
}

impl LinearDepthFormat {
    #[must_use]
    pub fn texture_format(self) -> wgpu::TextureFormat {
        match self {
            Self::R16Float => wgpu::TextureFormat::R16Float,
            Self::R32Float => wgpu::TextureFormat::R32Float,
        }
    }
}

/// How the values of a depth texture map to linear view depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DepthEncoding {
    /// Non-linear `[0, 1]` hardware depth.
    #[default]
    Hardware,
    /// `(z - near) / (far - near)`.
    NormalizedLinear,
    /// View-space distance.
    Linear,
}

impl DepthEncoding {
    #[must_use]
    pub fn define_value(self) -> u32 {
        match self {
            Self::Hardware => 0,
            Self::NormalizedLinear => 1,
            Self::Linear => 2,
        }
    }

    #[must_use]
    pub fn from_define(value: u32) -> Self {
        match value {
            1 => Self::NormalizedLinear,
            2 => Self::Linear,
            _ => Self::Hardware,
        }
    }

    /// Decodes a stored value to linear view depth.
    #[must_use]
    pub fn to_linear(self, value: f32, near: f32, far: f32) -> f32 {
        match self {
            Self::Hardware => crate::scene::camera::linearize_depth(value, near, far),
            Self::NormalizedLinear => near + value * (far - near),
            Self::Linear => value,
        }
    }

    /// Encodes a linear view depth.
    #[must_use]
    pub fn from_linear(self, linear: f32, near: f32, far: f32) -> f32 {
        match self {
            Self::Hardware => (far * (linear - near) / (linear * (far - near))).clamp(0.0, 1.0),
            Self::NormalizedLinear => ((linear - near) / (far - near)).clamp(0.0, 1.0),
            Self::Linear => linear,
        }
    }
}
