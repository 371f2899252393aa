//! retrogl: OpenGL 1.1 fixed-function commands on top of a shader-only GPU API.
//!
//! - [`gl`] is the GL state machine ([`gl::GlContext`])
//! - [`backend`] is the seam to the GPU ([`backend::GpuBackend`]) plus a
//!   recording implementation for headless use
//! - [`device`] implements the seam with wgpu
//! - [`window`] and [`core`] run a winit loop with one context per window

pub mod backend;
pub mod gl;

pub mod device;
pub mod window;
pub mod time;
pub mod core;

pub mod logging;
