//! OpenGL 1.1 fixed-function command layer.
//!
//! [`GlContext`] accepts the classic command set (matrix stacks, `begin`/`end`,
//! display lists, client arrays, selection mode, fog and friends) and lowers it
//! onto a [`crate::backend::GpuBackend`].
//!
//! Convention:
//! - matrices are column-major, as GL hands them over
//! - window coordinates have a bottom-left origin, except the pick cursor
//! - commands never panic or return errors; check [`GlContext::get_error`]

pub mod types;

mod error;
mod format;
mod immediate;
mod list;
mod matrix;
mod select;
mod state;
mod topology;

pub mod glu;

mod context;

#[cfg(test)]
mod tests;

pub use context::{ContextConfig, GlContext};
pub use error::{error_string, GlError};
pub use format::{FormatLayout, InterleavedFormat};
pub use list::ListMode;
pub use matrix::{MatrixMode, MatrixStack, StackUnderflow};
pub use select::{decode_pick_color, encode_pick_id, RenderMode, HIT_MAX_DEPTH};
pub use state::{Capability, FogMode};
pub use topology::Topology;
