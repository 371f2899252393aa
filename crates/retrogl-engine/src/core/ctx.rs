use winit::window::{Window, WindowId};

use crate::device::WgpuBackend;
use crate::gl::GlContext;
use crate::time::FrameTime;
use crate::window::RuntimeCtx;

/// Per-window handles.
pub struct WindowCtx<'a> {
    pub id: WindowId,
    pub window: &'a Window,
}

impl WindowCtx<'_> {
    /// Drawable size in physical pixels; what `viewport` expects.
    pub fn physical_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }
}

/// Per-frame context passed to [`super::App::on_frame`].
///
/// The frame's surface texture is already the main target of `gl`; commands
/// issued here are submitted and presented when the callback returns.
pub struct FrameCtx<'a> {
    pub window: WindowCtx<'a>,
    pub gl: &'a mut GlContext<WgpuBackend>,
    pub time: FrameTime,
    pub runtime: &'a mut RuntimeCtx,
}

impl FrameCtx<'_> {
    /// Sets the viewport to the whole drawable and returns its aspect ratio.
    pub fn fit_viewport(&mut self) -> f32 {
        let (w, h) = self.window.physical_size();
        self.gl.viewport(0, 0, w as i32, h as i32);
        w as f32 / h.max(1) as f32
    }
}
