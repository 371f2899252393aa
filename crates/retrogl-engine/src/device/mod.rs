//! wgpu device layer.
//!
//! - [`Gpu`] creates the device and window surface and presents frames
//! - [`WgpuBackend`] implements [`crate::backend::GpuBackend`]: pipelines
//!   for the fixed-function shader, buffer arenas, off-screen pick targets
//!   and texel readback

mod backend;
mod gpu;
mod pipelines;
mod readback;
mod textures;

pub use backend::WgpuBackend;
pub use gpu::{Gpu, GpuFrame, GpuInit, SurfaceErrorAction};
