//! GPU collaborator seam.
//!
//! [`GpuBackend`] is everything the fixed-function layer needs from a
//! shader-only GPU API: programs, buffers, one uniform block, draws,
//! off-screen framebuffers with pixel readback, and texture binding.
//!
//! Two implementations exist:
//! - [`crate::device::WgpuBackend`] drives wgpu
//! - [`RecordingBackend`] is CPU-only and records every call (tests, headless use)

mod recording;

pub use recording::{BackendCall, DrawRecord, RecordingBackend};

use bytemuck::{Pod, Zeroable};

use crate::gl::types::*;

// ── handles ────────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ProgramId(pub u32);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct BufferId(pub u32);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FramebufferId(pub u32);

/// Opaque texture handle supplied by the embedder (image decoding is external).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TextureHandle(pub u32);

// ── programs / buffers ─────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ProgramKind {
    /// Fixed-function emulation: vertex colour, texture, alpha test, fog, ambient.
    Main,
    /// Solid `pick_color` output for selection mode.
    Picking,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

/// Upload frequency hint.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferUsage {
    /// Written once (display lists).
    Static,
    /// Rewritten every draw (immediate batches, client arrays).
    Dynamic,
}

// ── vertex layout / draws ──────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct AttributeSlot {
    pub offset_bytes: u32,
    /// Number of f32 components.
    pub components: u32,
}

/// Byte layout of one interleaved vertex record.
///
/// Missing colour defaults to opaque white; missing texcoord to `(0, 0)`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VertexLayout {
    pub stride_bytes: u32,
    pub position: AttributeSlot,
    pub color: Option<AttributeSlot>,
    pub texcoord: Option<AttributeSlot>,
}

/// Primitive topologies a shader-only API draws natively.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DrawTopology {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ArrayDraw {
    pub buffer: BufferId,
    pub layout: VertexLayout,
    pub topology: DrawTopology,
    pub first: u32,
    pub count: u32,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct IndexedDraw {
    pub buffer: BufferId,
    pub index_buffer: BufferId,
    pub layout: VertexLayout,
    pub topology: DrawTopology,
    pub first_index: u32,
    pub index_count: u32,
    /// Added to every index before fetching a vertex.
    pub base_vertex: i32,
}

// ── uniforms ───────────────────────────────────────────────────────────────

pub const FOG_MODE_LINEAR: f32 = 0.0;
pub const FOG_MODE_EXP: f32 = 1.0;
pub const FOG_MODE_EXP2: f32 = 2.0;

/// The single uniform block shared by both programs.
///
/// Layout matches `Uniforms` in the WGSL shaders (256 bytes, std140-safe).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct ShaderUniforms {
    pub projection: [[f32; 4]; 4],
    pub modelview: [[f32; 4]; 4],
    pub current_color: [f32; 4],
    pub pick_color: [f32; 4],
    pub fog_color: [f32; 4],
    /// density, start, end, mode (`FOG_MODE_*`)
    pub fog_params: [f32; 4],
    pub light_ambient: [f32; 4],
    /// reference, compare function (`CompareFunc::shader_code`), enabled, unused
    pub alpha_test: [f32; 4],
    /// texture, fog, lighting, color material
    pub flags: [u32; 4],
    /// has color attribute, has texcoord attribute, unused, unused
    pub vertex_flags: [u32; 4],
}

impl Default for ShaderUniforms {
    fn default() -> Self {
        let identity = glam::Mat4::IDENTITY.to_cols_array_2d();
        Self {
            projection: identity,
            modelview: identity,
            current_color: [1.0; 4],
            pick_color: [0.0, 0.0, 0.0, 1.0],
            fog_color: [0.0, 0.0, 0.0, 0.0],
            fog_params: [1.0, 0.0, 1.0, FOG_MODE_EXP],
            light_ambient: [0.2, 0.2, 0.2, 1.0],
            alpha_test: [0.0, CompareFunc::Always.shader_code(), 0.0, 0.0],
            flags: [0; 4],
            vertex_flags: [0; 4],
        }
    }
}

impl ShaderUniforms {
    pub fn with_vertex_layout(mut self, layout: &VertexLayout) -> Self {
        self.vertex_flags = [
            layout.color.is_some() as u32,
            layout.texcoord.is_some() as u32,
            0,
            0,
        ];
        self
    }
}

// ── raster state ───────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

impl CompareFunc {
    pub const fn from_gl(value: GLenum) -> Option<Self> {
        match value {
            GL_NEVER => Some(Self::Never),
            GL_LESS => Some(Self::Less),
            GL_EQUAL => Some(Self::Equal),
            GL_LEQUAL => Some(Self::LessEqual),
            GL_GREATER => Some(Self::Greater),
            GL_NOTEQUAL => Some(Self::NotEqual),
            GL_GEQUAL => Some(Self::GreaterEqual),
            GL_ALWAYS => Some(Self::Always),
            _ => None,
        }
    }

    /// Index used by the shader's alpha test switch.
    pub const fn shader_code(self) -> f32 {
        match self {
            Self::Never => 0.0,
            Self::Less => 1.0,
            Self::Equal => 2.0,
            Self::LessEqual => 3.0,
            Self::Greater => 4.0,
            Self::NotEqual => 5.0,
            Self::GreaterEqual => 6.0,
            Self::Always => 7.0,
        }
    }

    pub fn passes(self, incoming: f32, stored: f32) -> bool {
        match self {
            Self::Never => false,
            Self::Less => incoming < stored,
            Self::Equal => incoming == stored,
            Self::LessEqual => incoming <= stored,
            Self::Greater => incoming > stored,
            Self::NotEqual => incoming != stored,
            Self::GreaterEqual => incoming >= stored,
            Self::Always => true,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    DstColor,
    OneMinusDstColor,
}

impl BlendFactor {
    pub const fn from_gl(value: GLenum) -> Option<Self> {
        match value {
            GL_ZERO => Some(Self::Zero),
            GL_ONE => Some(Self::One),
            GL_SRC_COLOR => Some(Self::SrcColor),
            GL_ONE_MINUS_SRC_COLOR => Some(Self::OneMinusSrcColor),
            GL_SRC_ALPHA => Some(Self::SrcAlpha),
            GL_ONE_MINUS_SRC_ALPHA => Some(Self::OneMinusSrcAlpha),
            GL_DST_ALPHA => Some(Self::DstAlpha),
            GL_ONE_MINUS_DST_ALPHA => Some(Self::OneMinusDstAlpha),
            GL_DST_COLOR => Some(Self::DstColor),
            GL_ONE_MINUS_DST_COLOR => Some(Self::OneMinusDstColor),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Face {
    Front,
    Back,
    FrontAndBack,
}

impl Face {
    pub const fn from_gl(value: GLenum) -> Option<Self> {
        match value {
            GL_FRONT => Some(Self::Front),
            GL_BACK => Some(Self::Back),
            GL_FRONT_AND_BACK => Some(Self::FrontAndBack),
            _ => None,
        }
    }
}

/// Pipeline-level state that cannot live in a uniform.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RasterState {
    pub depth_test: bool,
    pub depth_func: CompareFunc,
    pub blend: bool,
    pub blend_src: BlendFactor,
    pub blend_dst: BlendFactor,
    pub cull: bool,
    pub cull_face: Face,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            depth_test: false,
            depth_func: CompareFunc::Less,
            blend: false,
            blend_src: BlendFactor::One,
            blend_dst: BlendFactor::Zero,
            cull: false,
            cull_face: Face::Back,
        }
    }
}

// ── framebuffers / viewport / textures ─────────────────────────────────────

/// Buffers to clear and the values to clear them to.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct ClearRequest {
    pub color: Option<[f32; 4]>,
    pub depth: Option<f32>,
}

/// Viewport in window coordinates, origin bottom-left.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct ViewportRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ViewportRect {
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x
            && y >= self.y
            && (x - self.x) < self.width as i32
            && (y - self.y) < self.height as i32
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureFilter {
    Nearest,
    Linear,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureWrap {
    Repeat,
    ClampToEdge,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureParameter {
    MinFilter(TextureFilter),
    MagFilter(TextureFilter),
    WrapS(TextureWrap),
    WrapT(TextureWrap),
}

// ── the seam ───────────────────────────────────────────────────────────────

/// A shader-only GPU API as seen by [`crate::gl::GlContext`].
///
/// Calls are issued in program order from a single thread. Draws use whatever
/// program, uniforms, raster state, framebuffer and texture were set last.
pub trait GpuBackend {
    fn compile_program(&mut self, kind: ProgramKind) -> anyhow::Result<ProgramId>;
    fn use_program(&mut self, program: ProgramId);

    fn create_buffer(&mut self, kind: BufferKind) -> anyhow::Result<BufferId>;
    fn upload_vertices(&mut self, buffer: BufferId, data: &[f32], usage: BufferUsage);
    fn upload_indices(&mut self, buffer: BufferId, data: &[u32], usage: BufferUsage);
    fn delete_buffer(&mut self, buffer: BufferId);

    fn set_uniforms(&mut self, uniforms: &ShaderUniforms);
    fn set_raster_state(&mut self, state: &RasterState);

    fn draw_arrays(&mut self, draw: &ArrayDraw);
    fn draw_indexed(&mut self, draw: &IndexedDraw);

    fn create_framebuffer(&mut self, width: u32, height: u32) -> anyhow::Result<FramebufferId>;
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);
    /// `None` selects the main (presented) target.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);
    fn clear(&mut self, request: &ClearRequest);
    /// Reads one RGBA8 texel of the bound framebuffer; `(x, y)` has a
    /// bottom-left origin. Pending work is submitted first.
    fn read_pixel(&mut self, x: i32, y: i32) -> anyhow::Result<[u8; 4]>;

    fn bind_texture(&mut self, texture: Option<TextureHandle>);
    fn texture_parameter(&mut self, texture: TextureHandle, parameter: TextureParameter);

    fn set_viewport(&mut self, viewport: ViewportRect);

    /// Submits pending work.
    fn flush(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_is_256_bytes() {
        assert_eq!(std::mem::size_of::<ShaderUniforms>(), 256);
    }

    #[test]
    fn compare_func_round_trips_gl_names() {
        assert_eq!(CompareFunc::from_gl(GL_LEQUAL), Some(CompareFunc::LessEqual));
        assert_eq!(CompareFunc::from_gl(GL_TRIANGLES), None);
        assert!(CompareFunc::Greater.passes(0.5, 0.1));
        assert!(!CompareFunc::Greater.passes(0.1, 0.1));
    }

    #[test]
    fn viewport_contains_is_half_open() {
        let vp = ViewportRect { x: 0, y: 0, width: 10, height: 5 };
        assert!(vp.contains(0, 0));
        assert!(vp.contains(9, 4));
        assert!(!vp.contains(10, 4));
        assert!(!vp.contains(-1, 0));
    }
}
