use winit::event::WindowEvent;
use winit::window::WindowId;

use crate::device::WgpuBackend;
use crate::gl::GlContext;

use super::ctx::FrameCtx;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract implemented by programs drawing through the GL layer.
pub trait App {
    /// Called once per window after its GL context exists, before the first
    /// frame. Display lists and textures are usually built here.
    fn on_init(&mut self, window_id: WindowId, gl: &mut GlContext<WgpuBackend>) -> anyhow::Result<()> {
        let _ = (window_id, gl);
        Ok(())
    }

    /// Called for window events.
    fn on_window_event(&mut self, window_id: WindowId, event: &WindowEvent) -> AppControl {
        let _ = (window_id, event);
        AppControl::Continue
    }

    /// Called once per rendered frame per window.
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_>) -> AppControl;
}
