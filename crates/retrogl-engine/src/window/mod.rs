//! Window + runtime loop.
//!
//! Owns the `winit` EventLoop and windows. Each window gets a [`Gpu`](crate::device::Gpu)
//! and a [`GlContext`](crate::gl::GlContext) rendering into its surface.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig, RuntimeCtx};
