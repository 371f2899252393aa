//! Selection mode emulated with colour picking.
//!
//! Every name-stack change in `SELECT` mode allocates a pick id; geometry is
//! drawn in that id's colour into an off-screen target, and leaving `SELECT`
//! reads the single pixel under the pick cursor back into a hit record.

use std::collections::HashMap;

use crate::backend::FramebufferId;

use super::types::*;

/// Hit records report this as their maximum depth.
pub const HIT_MAX_DEPTH: u32 = 0xFFFF_FFFF;

/// Largest pick id representable in 24-bit RGB.
pub const MAX_PICK_ID: u32 = 0x00FF_FFFF;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RenderMode {
    Render,
    Select,
}

impl RenderMode {
    pub const fn from_gl(value: GLenum) -> Option<Self> {
        match value {
            GL_RENDER => Some(Self::Render),
            GL_SELECT => Some(Self::Select),
            _ => None,
        }
    }

    pub const fn to_gl(self) -> GLenum {
        match self {
            Self::Render => GL_RENDER,
            Self::Select => GL_SELECT,
        }
    }
}

/// `r = id & 0xFF, g = (id >> 8) & 0xFF, b = (id >> 16) & 0xFF`, normalized.
pub fn encode_pick_id(id: u32) -> [f32; 4] {
    [
        (id & 0xFF) as f32 / 255.0,
        ((id >> 8) & 0xFF) as f32 / 255.0,
        ((id >> 16) & 0xFF) as f32 / 255.0,
        1.0,
    ]
}

pub fn decode_pick_color(rgba: [u8; 4]) -> u32 {
    rgba[0] as u32 | (rgba[1] as u32) << 8 | (rgba[2] as u32) << 16
}

// ── name stack ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameStack {
    names: Vec<u32>,
}

impl NameStack {
    pub fn init(&mut self) {
        self.names.clear();
    }

    pub fn push(&mut self, name: u32) {
        self.names.push(name);
    }

    /// Replaces the top name; pushes when empty.
    pub fn load(&mut self, name: u32) {
        self.names.pop();
        self.names.push(name);
    }

    /// Returns `false` when the stack was already empty.
    pub fn pop(&mut self) -> bool {
        self.names.pop().is_some()
    }

    #[inline]
    pub fn names(&self) -> &[u32] {
        &self.names
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.names.len()
    }
}

// ── pick ids ───────────────────────────────────────────────────────────────

/// Pick id → name-stack snapshot for one selection session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickMapping {
    next_id: u32,
    entries: HashMap<u32, Vec<u32>>,
}

impl Default for PickMapping {
    fn default() -> Self {
        Self {
            next_id: 1,
            entries: HashMap::new(),
        }
    }
}

impl PickMapping {
    /// Starts a new session: ids restart at 1.
    pub fn reset(&mut self) {
        self.next_id = 1;
        self.entries.clear();
    }

    /// Assigns the next id to `names`.
    pub fn allocate(&mut self, names: &[u32]) -> u32 {
        let id = self.next_id;
        if id == MAX_PICK_ID + 1 {
            log::warn!("pick ids exceed 24 bits; colours will alias");
        }
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.entries.insert(id, names.to_vec());
        id
    }

    pub fn lookup(&self, id: u32) -> Option<&[u32]> {
        self.entries.get(&id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

// ── hit buffer ─────────────────────────────────────────────────────────────

/// Caller-sized selection buffer receiving hit records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectBuffer {
    words: Vec<u32>,
    cursor: usize,
}

impl SelectBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity],
            cursor: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.words.len()
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Appends `[n, 0, HIT_MAX_DEPTH, names...]`. Returns `false` (writing
    /// nothing) when the record does not fit.
    pub fn write_hit(&mut self, names: &[u32]) -> bool {
        let len = 3 + names.len();
        if self.cursor + len > self.words.len() {
            return false;
        }
        let dst = &mut self.words[self.cursor..self.cursor + len];
        dst[0] = names.len() as u32;
        dst[1] = 0;
        dst[2] = HIT_MAX_DEPTH;
        dst[3..].copy_from_slice(names);
        self.cursor += len;
        true
    }

    #[inline]
    pub fn data(&self) -> &[u32] {
        &self.words
    }
}

// ── session state ──────────────────────────────────────────────────────────

/// Off-screen picking target, recreated when the viewport size changes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PickTarget {
    pub framebuffer: FramebufferId,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
pub struct Selection {
    pub mode: RenderMode,
    pub names: NameStack,
    pub mapping: PickMapping,
    pub buffer: SelectBuffer,
    /// Window coordinates with a top-left origin, as delivered by the windowing system.
    pub cursor: (i32, i32),
    pub target: Option<PickTarget>,
    /// Colour of the most recently allocated pick id.
    pub pick_color: [f32; 4],
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            mode: RenderMode::Render,
            names: NameStack::default(),
            mapping: PickMapping::default(),
            buffer: SelectBuffer::default(),
            cursor: (0, 0),
            target: None,
            pick_color: encode_pick_id(0),
        }
    }
}

impl Selection {
    #[inline]
    pub fn is_selecting(&self) -> bool {
        self.mode == RenderMode::Select
    }

    /// Snapshots the name stack under a fresh pick id when selecting.
    pub fn stamp(&mut self) {
        if !self.is_selecting() {
            return;
        }
        let id = self.mapping.allocate(self.names.names());
        self.pick_color = encode_pick_id(id);
        log::trace!("pick id {id} -> {:?}", self.names.names());
    }

    /// Resolves a read-back pixel into at most one hit record.
    pub fn resolve(&mut self, rgba: [u8; 4]) -> u32 {
        let id = decode_pick_color(rgba);
        if id == 0 {
            return 0;
        }
        let Some(names) = self.mapping.lookup(id) else {
            log::debug!("pick colour {rgba:?} decodes to unknown id {id}");
            return 0;
        };
        if self.buffer.write_hit(names) {
            1
        } else {
            log::debug!(
                "select buffer of {} words too small for hit with {} names",
                self.buffer.capacity(),
                names.len()
            );
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_colour_encoding_is_little_endian_rgb() {
        let c = encode_pick_id(0x030201);
        assert_eq!(c, [1.0 / 255.0, 2.0 / 255.0, 3.0 / 255.0, 1.0]);
        assert_eq!(decode_pick_color([1, 2, 3, 255]), 0x030201);
    }

    #[test]
    fn pop_on_empty_name_stack_is_harmless() {
        let mut s = NameStack::default();
        assert!(!s.pop());
        assert_eq!(s.depth(), 0);
    }

    #[test]
    fn load_replaces_top_or_pushes() {
        let mut s = NameStack::default();
        s.load(5);
        assert_eq!(s.names(), &[5]);
        s.push(6);
        s.load(7);
        assert_eq!(s.names(), &[5, 7]);
    }

    #[test]
    fn ids_increase_and_reset_to_one() {
        let mut m = PickMapping::default();
        assert_eq!(m.allocate(&[]), 1);
        assert_eq!(m.allocate(&[4]), 2);
        assert_eq!(m.lookup(2), Some(&[4][..]));
        m.reset();
        assert_eq!(m.len(), 0);
        assert_eq!(m.allocate(&[]), 1);
    }

    #[test]
    fn hit_record_layout() {
        let mut b = SelectBuffer::with_capacity(8);
        assert!(b.write_hit(&[42, 7]));
        assert_eq!(&b.data()[..5], &[2, 0, HIT_MAX_DEPTH, 42, 7]);
    }

    #[test]
    fn hit_that_does_not_fit_is_dropped() {
        let mut b = SelectBuffer::with_capacity(3);
        assert!(!b.write_hit(&[1]));
        assert_eq!(b.data(), &[0, 0, 0]);
    }

    #[test]
    fn stamping_outside_select_allocates_nothing() {
        let mut s = Selection::default();
        s.names.push(3);
        s.stamp();
        assert_eq!(s.mapping.len(), 0);
    }

    #[test]
    fn resolve_ignores_background_and_unknown_ids() {
        let mut s = Selection::default();
        s.buffer = SelectBuffer::with_capacity(16);
        s.mode = RenderMode::Select;
        s.names.push(9);
        s.stamp();
        assert_eq!(s.resolve([0, 0, 0, 255]), 0);
        assert_eq!(s.resolve([5, 0, 0, 255]), 0);
        assert_eq!(s.resolve([1, 0, 0, 255]), 1);
        assert_eq!(&s.buffer.data()[..4], &[1, 0, HIT_MAX_DEPTH, 9]);
    }

    #[test]
    fn resolve_into_undersized_buffer_reports_no_hit() {
        let mut s = Selection::default();
        s.buffer = SelectBuffer::with_capacity(3);
        s.mode = RenderMode::Select;
        s.names.push(4);
        s.stamp();
        assert_eq!(s.resolve([1, 0, 0, 255]), 0);
        assert_eq!(s.buffer.capacity(), 3);
        assert_eq!(s.buffer.data(), &[0, 0, 0]);
    }
}
