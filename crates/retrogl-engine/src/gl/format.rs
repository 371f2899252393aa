//! Interleaved vertex format resolver.
//!
//! Field order within a record is fixed: texcoord, color, position. Immediate
//! batches, compiled lists and client arrays all resolve their GPU attribute
//! layout through [`InterleavedFormat::layout`], so every draw path configures
//! attributes identically.

use crate::backend::{AttributeSlot, VertexLayout};

use super::types::*;

const FLOAT_BYTES: u32 = std::mem::size_of::<f32>() as u32;

/// Symbolic interleaved formats (the `glInterleavedArrays` subset in use).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum InterleavedFormat {
    V2f,
    V3f,
    C3fV3f,
    T2fV3f,
    T2fC3fV3f,
}

/// Float-granular layout of one interleaved record.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FormatLayout {
    pub stride_floats: u32,
    pub position_offset: u32,
    pub color_offset: Option<u32>,
    pub texcoord_offset: Option<u32>,
    pub position_components: u32,
}

impl InterleavedFormat {
    pub const fn from_gl(value: GLenum) -> Option<Self> {
        match value {
            GL_V2F => Some(Self::V2f),
            GL_V3F => Some(Self::V3f),
            GL_C3F_V3F => Some(Self::C3fV3f),
            GL_T2F_V3F => Some(Self::T2fV3f),
            GL_T2F_C3F_V3F => Some(Self::T2fC3fV3f),
            _ => None,
        }
    }

    pub const fn to_gl(self) -> GLenum {
        match self {
            Self::V2f => GL_V2F,
            Self::V3f => GL_V3F,
            Self::C3fV3f => GL_C3F_V3F,
            Self::T2fV3f => GL_T2F_V3F,
            Self::T2fC3fV3f => GL_T2F_C3F_V3F,
        }
    }

    /// Picks the 3D format carrying exactly the requested channels.
    pub const fn from_channels(has_texcoord: bool, has_color: bool) -> Self {
        match (has_texcoord, has_color) {
            (true, true) => Self::T2fC3fV3f,
            (true, false) => Self::T2fV3f,
            (false, true) => Self::C3fV3f,
            (false, false) => Self::V3f,
        }
    }

    pub const fn layout(self) -> FormatLayout {
        match self {
            Self::V2f => FormatLayout {
                stride_floats: 2,
                position_offset: 0,
                color_offset: None,
                texcoord_offset: None,
                position_components: 2,
            },
            Self::V3f => FormatLayout {
                stride_floats: 3,
                position_offset: 0,
                color_offset: None,
                texcoord_offset: None,
                position_components: 3,
            },
            Self::C3fV3f => FormatLayout {
                stride_floats: 6,
                position_offset: 3,
                color_offset: Some(0),
                texcoord_offset: None,
                position_components: 3,
            },
            Self::T2fV3f => FormatLayout {
                stride_floats: 5,
                position_offset: 2,
                color_offset: None,
                texcoord_offset: Some(0),
                position_components: 3,
            },
            Self::T2fC3fV3f => FormatLayout {
                stride_floats: 8,
                position_offset: 5,
                color_offset: Some(2),
                texcoord_offset: Some(0),
                position_components: 3,
            },
        }
    }

    #[inline]
    pub const fn has_color(self) -> bool {
        self.layout().color_offset.is_some()
    }

    #[inline]
    pub const fn has_texcoord(self) -> bool {
        self.layout().texcoord_offset.is_some()
    }
}

impl FormatLayout {
    /// Record size in bytes when tightly packed.
    #[inline]
    pub const fn stride_bytes(&self) -> u32 {
        self.stride_floats * FLOAT_BYTES
    }

    /// Converts to the byte-based layout consumed by GPU backends.
    ///
    /// `stride_bytes == 0` means tightly packed, as in `glInterleavedArrays`.
    pub fn vertex_layout(&self, stride_bytes: u32) -> VertexLayout {
        let stride = if stride_bytes == 0 { self.stride_bytes() } else { stride_bytes };
        VertexLayout {
            stride_bytes: stride,
            position: AttributeSlot {
                offset_bytes: self.position_offset * FLOAT_BYTES,
                components: self.position_components,
            },
            color: self.color_offset.map(|o| AttributeSlot {
                offset_bytes: o * FLOAT_BYTES,
                components: 3,
            }),
            texcoord: self.texcoord_offset.map(|o| AttributeSlot {
                offset_bytes: o * FLOAT_BYTES,
                components: 2,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_match_field_counts() {
        assert_eq!(InterleavedFormat::V2f.layout().stride_floats, 2);
        assert_eq!(InterleavedFormat::V3f.layout().stride_floats, 3);
        assert_eq!(InterleavedFormat::C3fV3f.layout().stride_floats, 6);
        assert_eq!(InterleavedFormat::T2fV3f.layout().stride_floats, 5);
        assert_eq!(InterleavedFormat::T2fC3fV3f.layout().stride_floats, 8);
    }

    #[test]
    fn texcoord_precedes_color_precedes_position() {
        let l = InterleavedFormat::T2fC3fV3f.layout();
        assert_eq!(l.texcoord_offset, Some(0));
        assert_eq!(l.color_offset, Some(2));
        assert_eq!(l.position_offset, 5);
    }

    #[test]
    fn from_channels_picks_3d_formats() {
        assert_eq!(InterleavedFormat::from_channels(false, false), InterleavedFormat::V3f);
        assert_eq!(InterleavedFormat::from_channels(false, true), InterleavedFormat::C3fV3f);
        assert_eq!(InterleavedFormat::from_channels(true, false), InterleavedFormat::T2fV3f);
        assert_eq!(InterleavedFormat::from_channels(true, true), InterleavedFormat::T2fC3fV3f);
    }

    #[test]
    fn unknown_gl_format_is_rejected() {
        assert_eq!(InterleavedFormat::from_gl(GL_TRIANGLES), None);
        assert_eq!(InterleavedFormat::from_gl(GL_C3F_V3F), Some(InterleavedFormat::C3fV3f));
    }

    #[test]
    fn vertex_layout_in_bytes() {
        let vl = InterleavedFormat::C3fV3f.layout().vertex_layout(0);
        assert_eq!(vl.stride_bytes, 24);
        assert_eq!(vl.position.offset_bytes, 12);
        assert_eq!(vl.color.map(|c| c.offset_bytes), Some(0));
        assert!(vl.texcoord.is_none());
    }

    #[test]
    fn explicit_stride_overrides_packed_stride() {
        let vl = InterleavedFormat::V2f.layout().vertex_layout(16);
        assert_eq!(vl.stride_bytes, 16);
        assert_eq!(vl.position.components, 2);
    }
}
