//! Renderer
//!
//! - [`core`]: the host interface every pass records into
//! - [`graph`]: pass lifecycle, reflection and the render graph executor
//! - [`passes`]: the AO passes and their depth utilities
//! - [`software`]: CPU reference implementation of [`core::RenderContext`]
//! - [`gpu`]: wgpu implementation of [`core::RenderContext`] for compute and
//!   full-screen programs
//! - [`guard_band`]: scissor/viewport helpers for the discarded border
//! - [`programs`]: program names shared by passes and device kernels

pub mod core;
pub mod gpu;
pub mod graph;
pub mod guard_band;
pub mod passes;
pub mod programs;
pub mod software;
