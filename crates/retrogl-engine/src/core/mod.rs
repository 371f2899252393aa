//! Contracts between the runtime loop and applications.
//!
//! An [`App`] sees one [`GlContext`](crate::gl::GlContext) per window and
//! issues GL commands from [`App::on_frame`].

mod app;
mod ctx;

pub use app::{App, AppControl};
pub use ctx::{FrameCtx, WindowCtx};
