//! `begin`/`end` vertex assembly.
//!
//! Vertices are captured whole (with the sticky colour and texcoord at the
//! time of emission) and packed only when the batch closes, so the channel set
//! is decided by whether colour/texcoord were ever issued during the batch.

use crate::backend::DrawTopology;

use super::format::InterleavedFormat;
use super::topology::Topology;

/// One emitted vertex with every channel populated.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Vertex {
    pub texcoord: [f32; 2],
    pub color: [f32; 3],
    pub position: [f32; 3],
}

impl Vertex {
    /// Appends this vertex's record for `format` (texcoord, colour, position).
    pub fn write(&self, format: InterleavedFormat, out: &mut Vec<f32>) {
        if format.has_texcoord() {
            out.extend_from_slice(&self.texcoord);
        }
        if format.has_color() {
            out.extend_from_slice(&self.color);
        }
        match format {
            InterleavedFormat::V2f => out.extend_from_slice(&self.position[..2]),
            _ => out.extend_from_slice(&self.position),
        }
    }
}

/// A closed `begin`/`end` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub topology: Topology,
    pub vertices: Vec<Vertex>,
    pub has_color: bool,
    pub has_texcoord: bool,
}

/// Packed geometry ready for a single draw call.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledBatch {
    pub topology: DrawTopology,
    pub format: InterleavedFormat,
    pub data: Vec<f32>,
}

impl AssembledBatch {
    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.data.len() as u32 / self.format.layout().stride_floats
    }
}

impl Segment {
    #[inline]
    pub fn format(&self) -> InterleavedFormat {
        InterleavedFormat::from_channels(self.has_texcoord, self.has_color)
    }

    /// Vertices in draw order after topology expansion.
    pub fn expanded(&self) -> Vec<Vertex> {
        let count = self.topology.usable_count(self.vertices.len() as u32) as usize;
        match self.topology.expansion_indices(count as u32) {
            Some(indices) => indices.iter().map(|&i| self.vertices[i as usize]).collect(),
            None => self.vertices[..count].to_vec(),
        }
    }

    /// Expands and packs the segment. `None` if no whole primitive was formed.
    pub fn assemble(&self) -> Option<AssembledBatch> {
        let vertices = self.expanded();
        if vertices.is_empty() {
            return None;
        }

        let format = self.format();
        let mut data = Vec::with_capacity(vertices.len() * format.layout().stride_floats as usize);
        for v in &vertices {
            v.write(format, &mut data);
        }

        Some(AssembledBatch {
            topology: self.topology.draw_topology(),
            format,
            data,
        })
    }
}

/// The open `begin`/`end` batch, if any.
#[derive(Debug, Default)]
pub struct ImmediateBatch {
    open: Option<Segment>,
}

impl ImmediateBatch {
    #[inline]
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Starts a new batch, discarding anything still accumulated.
    pub fn begin(&mut self, topology: Topology) {
        self.open = Some(Segment {
            topology,
            vertices: Vec::new(),
            has_color: false,
            has_texcoord: false,
        });
    }

    pub fn note_color(&mut self) {
        if let Some(seg) = self.open.as_mut() {
            seg.has_color = true;
        }
    }

    pub fn note_texcoord(&mut self) {
        if let Some(seg) = self.open.as_mut() {
            seg.has_texcoord = true;
        }
    }

    /// Appends a vertex. Returns `false` when no batch is open.
    pub fn push(&mut self, vertex: Vertex) -> bool {
        match self.open.as_mut() {
            Some(seg) => {
                seg.vertices.push(vertex);
                true
            }
            None => false,
        }
    }

    /// Closes the batch and hands back what was accumulated.
    pub fn end(&mut self) -> Option<Segment> {
        self.open.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f32, y: f32) -> Vertex {
        Vertex {
            texcoord: [x * 0.5, y * 0.5],
            color: [x, y, 0.25],
            position: [x, y, 0.0],
        }
    }

    fn segment(topology: Topology, n: usize, has_color: bool, has_texcoord: bool) -> Segment {
        Segment {
            topology,
            vertices: (0..n).map(|i| v(i as f32, (i * 2) as f32)).collect(),
            has_color,
            has_texcoord,
        }
    }

    #[test]
    fn triangles_issue_one_vertex_per_call() {
        let batch = segment(Topology::Triangles, 6, false, false).assemble().unwrap();
        assert_eq!(batch.vertex_count(), 6);
        assert_eq!(batch.format, InterleavedFormat::V3f);
    }

    #[test]
    fn quads_expand_and_keep_full_records() {
        let seg = segment(Topology::Quads, 8, true, true);
        let batch = seg.assemble().unwrap();
        assert_eq!(batch.vertex_count(), 12);
        assert_eq!(batch.topology, DrawTopology::Triangles);

        // Second triangle of the first quad starts with v0 again, record intact.
        let stride = 8;
        let fourth = &batch.data[3 * stride..4 * stride];
        let mut expected = Vec::new();
        seg.vertices[0].write(InterleavedFormat::T2fC3fV3f, &mut expected);
        assert_eq!(fourth, expected.as_slice());
    }

    #[test]
    fn record_order_is_texcoord_color_position() {
        let mut out = Vec::new();
        v(1.0, 2.0).write(InterleavedFormat::T2fC3fV3f, &mut out);
        assert_eq!(out, vec![0.5, 1.0, 1.0, 2.0, 0.25, 1.0, 2.0, 0.0]);
    }

    #[test]
    fn empty_batch_assembles_to_nothing() {
        assert!(segment(Topology::Triangles, 0, true, false).assemble().is_none());
        assert!(segment(Topology::Quads, 3, true, false).assemble().is_none());
    }

    #[test]
    fn channel_flags_follow_calls_made_while_open() {
        let mut batch = ImmediateBatch::default();
        batch.note_color();
        batch.begin(Topology::Points);
        assert!(batch.push(v(0.0, 0.0)));
        batch.note_texcoord();
        let seg = batch.end().unwrap();
        assert!(!seg.has_color);
        assert!(seg.has_texcoord);
        assert_eq!(seg.format(), InterleavedFormat::T2fV3f);
        assert!(!batch.is_open());
    }

    #[test]
    fn push_without_begin_is_rejected() {
        let mut batch = ImmediateBatch::default();
        assert!(!batch.push(v(0.0, 0.0)));
    }
}
