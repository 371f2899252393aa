use crate::backend::DrawTopology;

use super::types::*;

/// Primitive modes accepted by `begin` and `draw_arrays`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Topology {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
    Quads,
    QuadStrip,
    Polygon,
}

impl Topology {
    pub const fn from_gl(value: GLenum) -> Option<Self> {
        match value {
            GL_POINTS => Some(Self::Points),
            GL_LINES => Some(Self::Lines),
            GL_LINE_LOOP => Some(Self::LineLoop),
            GL_LINE_STRIP => Some(Self::LineStrip),
            GL_TRIANGLES => Some(Self::Triangles),
            GL_TRIANGLE_STRIP => Some(Self::TriangleStrip),
            GL_TRIANGLE_FAN => Some(Self::TriangleFan),
            GL_QUADS => Some(Self::Quads),
            GL_QUAD_STRIP => Some(Self::QuadStrip),
            GL_POLYGON => Some(Self::Polygon),
            _ => None,
        }
    }

    /// Topology the backend draws after any expansion.
    pub const fn draw_topology(self) -> DrawTopology {
        match self {
            Self::Points => DrawTopology::Points,
            Self::Lines => DrawTopology::Lines,
            Self::LineLoop | Self::LineStrip => DrawTopology::LineStrip,
            Self::Triangles | Self::TriangleFan | Self::Quads | Self::Polygon => {
                DrawTopology::Triangles
            }
            Self::TriangleStrip | Self::QuadStrip => DrawTopology::TriangleStrip,
        }
    }

    /// True for primitives that are independent of their neighbours, so two
    /// runs of the same mode can be concatenated into one buffer.
    pub const fn is_mergeable(self) -> bool {
        matches!(self, Self::Points | Self::Lines | Self::Triangles | Self::Quads)
    }

    /// Number of source vertices that form whole primitives.
    pub const fn usable_count(self, count: u32) -> u32 {
        match self {
            Self::Lines => count - count % 2,
            Self::Triangles => count - count % 3,
            Self::Quads => count - count % 4,
            Self::QuadStrip => {
                if count < 4 {
                    0
                } else {
                    count - count % 2
                }
            }
            Self::TriangleStrip | Self::TriangleFan | Self::Polygon => {
                if count < 3 {
                    0
                } else {
                    count
                }
            }
            Self::LineStrip | Self::LineLoop => {
                if count < 2 {
                    0
                } else {
                    count
                }
            }
            Self::Points => count,
        }
    }

    /// Index remap that turns `count` source vertices into
    /// [`draw_topology`](Self::draw_topology) primitives.
    ///
    /// `None` means the vertices are drawn in order as-is. Indices are relative
    /// to the first vertex of the range.
    pub fn expansion_indices(self, count: u32) -> Option<Vec<u32>> {
        let count = self.usable_count(count);
        match self {
            Self::Quads => {
                let quads = count / 4;
                let mut indices = Vec::with_capacity(quads as usize * 6);
                for q in 0..quads {
                    let b = q * 4;
                    indices.extend_from_slice(&[b, b + 1, b + 2, b, b + 2, b + 3]);
                }
                Some(indices)
            }
            Self::TriangleFan | Self::Polygon => {
                let mut indices = Vec::with_capacity(count.saturating_sub(2) as usize * 3);
                for i in 1..count.saturating_sub(1) {
                    indices.extend_from_slice(&[0, i, i + 1]);
                }
                Some(indices)
            }
            Self::LineLoop => {
                if count == 0 {
                    return Some(Vec::new());
                }
                let mut indices: Vec<u32> = (0..count).collect();
                indices.push(0);
                Some(indices)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quads_expand_to_two_triangles_each() {
        let idx = Topology::Quads.expansion_indices(8).unwrap();
        assert_eq!(idx, vec![0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7]);
    }

    #[test]
    fn incomplete_trailing_quad_is_dropped() {
        assert_eq!(Topology::Quads.expansion_indices(6).unwrap().len(), 6);
    }

    #[test]
    fn fan_expands_around_first_vertex() {
        let idx = Topology::TriangleFan.expansion_indices(5).unwrap();
        assert_eq!(idx, vec![0, 1, 2, 0, 2, 3, 0, 3, 4]);
    }

    #[test]
    fn line_loop_closes_back_to_start() {
        let idx = Topology::LineLoop.expansion_indices(3).unwrap();
        assert_eq!(idx, vec![0, 1, 2, 0]);
        assert_eq!(Topology::LineLoop.draw_topology(), DrawTopology::LineStrip);
    }

    #[test]
    fn list_topologies_pass_through() {
        assert!(Topology::Triangles.expansion_indices(6).is_none());
        assert!(Topology::QuadStrip.expansion_indices(6).is_none());
        assert_eq!(Topology::QuadStrip.draw_topology(), DrawTopology::TriangleStrip);
    }

    #[test]
    fn only_independent_primitives_merge() {
        assert!(Topology::Quads.is_mergeable());
        assert!(!Topology::TriangleStrip.is_mergeable());
        assert!(!Topology::LineLoop.is_mergeable());
    }
}
