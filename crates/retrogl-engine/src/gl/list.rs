//! Display lists: command classification, recording and storage.
//!
//! While a list is open every command is routed by its [`CommandClass`]:
//! non-compilable commands always execute; state and geometry commands are
//! captured and, under `COMPILE_AND_EXECUTE`, also executed.

use std::collections::HashMap;

use crate::backend::{BufferId, TextureHandle};

use super::format::InterleavedFormat;
use super::immediate::{ImmediateBatch, Segment, Vertex};
use super::state::StateCommand;
use super::topology::Topology;
use super::types::*;

// ── routing ────────────────────────────────────────────────────────────────

/// Every command on the context surface.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Opcode {
    // matrices
    MatrixMode,
    LoadIdentity,
    PushMatrix,
    PopMatrix,
    Translate,
    Rotate,
    Scale,
    LoadMatrix,
    MultMatrix,
    Ortho,
    Perspective,
    PickMatrix,
    // geometry
    Begin,
    End,
    Color,
    TexCoord,
    Vertex,
    DrawArrays,
    // client arrays
    InterleavedArrays,
    EnableClientState,
    DisableClientState,
    // lists
    GenLists,
    NewList,
    EndList,
    CallList,
    CallLists,
    DeleteLists,
    IsList,
    // state
    Enable,
    Disable,
    BindTexture,
    TexParameter,
    BlendFunc,
    DepthFunc,
    CullFace,
    AlphaFunc,
    ColorMaterial,
    ShadeModel,
    Fog,
    LightModel,
    // framebuffer
    ClearColor,
    ClearDepth,
    Clear,
    Viewport,
    // selection
    SelectBuffer,
    RenderMode,
    InitNames,
    PushName,
    LoadName,
    PopName,
    SetPickCursor,
    // queries
    GetError,
    GetFloat,
    GetInteger,
    IsEnabled,
    Flush,
    Finish,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CommandClass {
    NonCompilable,
    State,
    Geometry,
}

impl Opcode {
    pub const fn class(self) -> CommandClass {
        use Opcode::*;
        match self {
            Enable | Disable | BindTexture | TexParameter | BlendFunc | DepthFunc | CullFace
            | AlphaFunc | ColorMaterial | ShadeModel | Fog | LightModel => CommandClass::State,

            Begin | End | Color | TexCoord | Vertex | DrawArrays => CommandClass::Geometry,

            MatrixMode | LoadIdentity | PushMatrix | PopMatrix | Translate | Rotate | Scale
            | LoadMatrix | MultMatrix | Ortho | Perspective | PickMatrix | InterleavedArrays
            | EnableClientState | DisableClientState | GenLists | NewList | EndList
            | CallList | CallLists | DeleteLists | IsList | ClearColor | ClearDepth | Clear
            | Viewport | SelectBuffer | RenderMode | InitNames | PushName | LoadName | PopName
            | SetPickCursor | GetError | GetFloat | GetInteger | IsEnabled | Flush | Finish => {
                CommandClass::NonCompilable
            }
        }
    }
}

impl StateCommand {
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Enable(_) => Opcode::Enable,
            Self::Disable(_) => Opcode::Disable,
            Self::BindTexture(_) => Opcode::BindTexture,
            Self::TexParameter(_) => Opcode::TexParameter,
            Self::BlendFunc(..) => Opcode::BlendFunc,
            Self::DepthFunc(_) => Opcode::DepthFunc,
            Self::CullFace(_) => Opcode::CullFace,
            Self::AlphaFunc(..) => Opcode::AlphaFunc,
            Self::ColorMaterial(..) => Opcode::ColorMaterial,
            Self::ShadeModel(_) => Opcode::ShadeModel,
            Self::Fog(_) => Opcode::Fog,
            Self::LightModel(_) => Opcode::LightModel,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ListMode {
    Compile,
    CompileAndExecute,
}

impl ListMode {
    pub const fn from_gl(value: GLenum) -> Option<Self> {
        match value {
            GL_COMPILE => Some(Self::Compile),
            GL_COMPILE_AND_EXECUTE => Some(Self::CompileAndExecute),
            _ => None,
        }
    }

    pub const fn to_gl(self) -> GLenum {
        match self {
            Self::Compile => GL_COMPILE,
            Self::CompileAndExecute => GL_COMPILE_AND_EXECUTE,
        }
    }
}

/// What to do with one command.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Route {
    Execute,
    Record,
    RecordAndExecute,
}

impl Route {
    #[inline]
    pub const fn records(self) -> bool {
        matches!(self, Self::Record | Self::RecordAndExecute)
    }

    #[inline]
    pub const fn executes(self) -> bool {
        matches!(self, Self::Execute | Self::RecordAndExecute)
    }
}

/// Routes `op` given the open list's mode (`None` when idle).
pub const fn route(op: Opcode, recording: Option<ListMode>) -> Route {
    match (op.class(), recording) {
        (CommandClass::NonCompilable, _) | (_, None) => Route::Execute,
        (_, Some(ListMode::Compile)) => Route::Record,
        (_, Some(ListMode::CompileAndExecute)) => Route::RecordAndExecute,
    }
}

// ── compiled lists ─────────────────────────────────────────────────────────

/// One static GPU buffer of list geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledGeometry {
    pub buffer: BufferId,
    /// Present for quads, fans, polygons and loops.
    pub index_buffer: Option<BufferId>,
    pub vertex_count: u32,
    pub index_count: u32,
    pub topology: Topology,
    pub format: InterleavedFormat,
    pub texture: Option<TextureHandle>,
}

impl CompiledGeometry {
    /// GPU buffers this entry owns.
    pub fn buffers(&self) -> impl Iterator<Item = BufferId> + '_ {
        std::iter::once(self.buffer).chain(self.index_buffer)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayList {
    pub geometry: Vec<CompiledGeometry>,
    pub state: Vec<StateCommand>,
}

impl DisplayList {
    pub fn buffers(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.geometry.iter().flat_map(CompiledGeometry::buffers)
    }
}

/// Packed run awaiting upload at `end_list`.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingGeometry {
    pub topology: Topology,
    pub format: InterleavedFormat,
    pub texture: Option<TextureHandle>,
    pub data: Vec<f32>,
    pub vertex_count: u32,
    pub indices: Option<Vec<u32>>,
}

// ── recording ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Run {
    topology: Topology,
    texture: Option<TextureHandle>,
    vertices: Vec<Vertex>,
    has_color: bool,
    has_texcoord: bool,
}

impl Run {
    fn triangulate(&mut self) {
        let seg = Segment {
            topology: self.topology,
            vertices: std::mem::take(&mut self.vertices),
            has_color: self.has_color,
            has_texcoord: self.has_texcoord,
        };
        self.vertices = seg.expanded();
        self.topology = Topology::Triangles;
    }

    /// Tries to append `seg`; gives it back when the two cannot share a buffer.
    fn absorb(&mut self, mut seg: Segment, texture: Option<TextureHandle>) -> Option<Segment> {
        if self.texture != texture || !self.topology.is_mergeable() || !seg.topology.is_mergeable()
        {
            return Some(seg);
        }

        match (self.topology, seg.topology) {
            (a, b) if a == b => {}
            (Topology::Quads, Topology::Triangles) => self.triangulate(),
            (Topology::Triangles, Topology::Quads) => {
                seg.vertices = seg.expanded();
                seg.topology = Topology::Triangles;
            }
            _ => return Some(seg),
        }

        self.vertices.extend(seg.vertices);
        self.has_color |= seg.has_color;
        self.has_texcoord |= seg.has_texcoord;
        None
    }

    fn pack(self) -> PendingGeometry {
        let format = InterleavedFormat::from_channels(self.has_texcoord, self.has_color);
        let mut data = Vec::with_capacity(self.vertices.len() * format.layout().stride_floats as usize);
        for v in &self.vertices {
            v.write(format, &mut data);
        }
        let vertex_count = self.vertices.len() as u32;
        PendingGeometry {
            topology: self.topology,
            format,
            texture: self.texture,
            data,
            vertex_count,
            indices: self.topology.expansion_indices(vertex_count),
        }
    }
}

/// The list under construction between `new_list` and `end_list`.
///
/// Colour and texcoord are list-local: under `COMPILE` they never touch the
/// context's current values. The texture starts unbound; only a bind recorded
/// inside the list attaches one to its geometry.
#[derive(Debug)]
pub struct ListBuilder {
    id: u32,
    mode: ListMode,
    batch: ImmediateBatch,
    color: [f32; 4],
    texcoord: [f32; 2],
    texture: Option<TextureHandle>,
    runs: Vec<Run>,
    state: Vec<StateCommand>,
}

impl ListBuilder {
    pub fn new(
        id: u32,
        mode: ListMode,
        color: [f32; 4],
        texcoord: [f32; 2],
    ) -> Self {
        Self {
            id,
            mode,
            batch: ImmediateBatch::default(),
            color,
            texcoord,
            texture: None,
            runs: Vec::new(),
            state: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn mode(&self) -> ListMode {
        self.mode
    }

    #[inline]
    pub fn is_batch_open(&self) -> bool {
        self.batch.is_open()
    }

    /// Sticky colour and texcoord as seen by list geometry.
    pub fn current_attributes(&self) -> ([f32; 4], [f32; 2]) {
        (self.color, self.texcoord)
    }

    pub fn record_state(&mut self, cmd: StateCommand) {
        if let StateCommand::BindTexture(t) = cmd {
            self.texture = t;
        }
        self.state.push(cmd);
    }

    pub fn begin(&mut self, topology: Topology) {
        self.batch.begin(topology);
    }

    pub fn color(&mut self, rgba: [f32; 4]) {
        self.color = rgba;
        self.batch.note_color();
    }

    pub fn tex_coord(&mut self, uv: [f32; 2]) {
        self.texcoord = uv;
        self.batch.note_texcoord();
    }

    pub fn vertex(&mut self, position: [f32; 3]) {
        let [r, g, b, _] = self.color;
        self.batch.push(Vertex {
            texcoord: self.texcoord,
            color: [r, g, b],
            position,
        });
    }

    pub fn end(&mut self) {
        if let Some(seg) = self.batch.end() {
            self.add_segment(seg);
        }
    }

    /// Captures array-sourced geometry (already resolved to vertices).
    pub fn add_segment(&mut self, seg: Segment) {
        let usable = seg.topology.usable_count(seg.vertices.len() as u32) as usize;
        if usable == 0 {
            return;
        }
        let mut seg = seg;
        seg.vertices.truncate(usable);

        let rest = match self.runs.last_mut() {
            Some(run) => run.absorb(seg, self.texture),
            None => Some(seg),
        };
        if let Some(seg) = rest {
            self.runs.push(Run {
                topology: seg.topology,
                texture: self.texture,
                vertices: seg.vertices,
                has_color: seg.has_color,
                has_texcoord: seg.has_texcoord,
            });
        }
    }

    /// Closes any open `begin` and packs every run.
    ///
    /// The builder keeps its contents so a failed upload can be retried.
    pub fn seal(&mut self) -> (Vec<PendingGeometry>, Vec<StateCommand>) {
        self.end();
        let pending = self.runs.iter().cloned().map(Run::pack).collect();
        (pending, self.state.clone())
    }
}

// ── storage ────────────────────────────────────────────────────────────────

/// Sealed lists keyed by id, plus the id allocator.
#[derive(Debug)]
pub struct ListStore {
    lists: HashMap<u32, DisplayList>,
    next_base: u32,
}

impl Default for ListStore {
    fn default() -> Self {
        Self {
            lists: HashMap::new(),
            next_base: 1,
        }
    }
}

impl ListStore {
    /// Reserves `range` contiguous ids not currently in use. Returns 0 for an
    /// empty range or when the id space is exhausted.
    pub fn generate(&mut self, range: u32) -> u32 {
        if range == 0 {
            return 0;
        }
        let mut base = self.next_base;
        loop {
            let Some(end) = base.checked_add(range) else { return 0 };
            match (base..end).find(|id| self.lists.contains_key(id)) {
                Some(used) => base = used + 1,
                None => {
                    self.next_base = end;
                    return base;
                }
            }
        }
    }

    #[inline]
    pub fn get(&self, id: u32) -> Option<&DisplayList> {
        self.lists.get(&id)
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        self.lists.contains_key(&id)
    }

    /// Stores `list` under `id`, returning the list it replaces.
    pub fn insert(&mut self, id: u32, list: DisplayList) -> Option<DisplayList> {
        self.lists.insert(id, list)
    }

    pub fn remove(&mut self, id: u32) -> Option<DisplayList> {
        self.lists.remove(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::state::Capability;

    fn builder(mode: ListMode) -> ListBuilder {
        ListBuilder::new(1, mode, [1.0; 4], [0.0; 2])
    }

    fn quad(b: &mut ListBuilder) {
        b.begin(Topology::Quads);
        for p in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]] {
            b.vertex(p);
        }
        b.end();
    }

    #[test]
    fn routing_table() {
        assert_eq!(route(Opcode::Vertex, None), Route::Execute);
        assert_eq!(route(Opcode::Vertex, Some(ListMode::Compile)), Route::Record);
        assert_eq!(
            route(Opcode::Enable, Some(ListMode::CompileAndExecute)),
            Route::RecordAndExecute
        );
        assert_eq!(route(Opcode::GenLists, Some(ListMode::Compile)), Route::Execute);
        assert_eq!(route(Opcode::Translate, Some(ListMode::Compile)), Route::Execute);
        assert_eq!(route(Opcode::PushName, Some(ListMode::Compile)), Route::Execute);
    }

    #[test]
    fn consecutive_quads_share_one_run() {
        let mut b = builder(ListMode::Compile);
        quad(&mut b);
        quad(&mut b);
        let (pending, _) = b.seal();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].vertex_count, 8);
        assert_eq!(pending[0].indices.as_ref().map(Vec::len), Some(12));
    }

    #[test]
    fn quads_meeting_triangles_become_triangles() {
        let mut b = builder(ListMode::Compile);
        quad(&mut b);
        b.begin(Topology::Triangles);
        for _ in 0..3 {
            b.vertex([0.0; 3]);
        }
        b.end();
        let (pending, _) = b.seal();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].topology, Topology::Triangles);
        assert_eq!(pending[0].vertex_count, 9);
        assert!(pending[0].indices.is_none());
    }

    #[test]
    fn strips_and_texture_changes_start_new_runs() {
        let mut b = builder(ListMode::Compile);
        quad(&mut b);
        b.record_state(StateCommand::BindTexture(Some(TextureHandle(9))));
        quad(&mut b);
        b.begin(Topology::TriangleStrip);
        for _ in 0..4 {
            b.vertex([0.0; 3]);
        }
        b.end();
        let (pending, state) = b.seal();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].texture, None);
        assert_eq!(pending[1].texture, Some(TextureHandle(9)));
        assert_eq!(pending[2].topology, Topology::TriangleStrip);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn colored_quad_packs_color_position() {
        let mut b = builder(ListMode::Compile);
        b.begin(Topology::Quads);
        b.color([1.0, 0.0, 0.0, 1.0]);
        for p in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]] {
            b.vertex(p);
        }
        b.end();
        let (pending, _) = b.seal();
        assert_eq!(pending[0].format, InterleavedFormat::C3fV3f);
        assert_eq!(&pending[0].data[..6], &[1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn unterminated_begin_is_closed_at_finish() {
        let mut b = builder(ListMode::Compile);
        b.begin(Topology::Triangles);
        for _ in 0..3 {
            b.vertex([0.0; 3]);
        }
        let (pending, _) = b.seal();
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn state_is_captured_in_order() {
        let mut b = builder(ListMode::Compile);
        b.record_state(StateCommand::Enable(Capability::Fog));
        b.record_state(StateCommand::Disable(Capability::Blend));
        let (pending, state) = b.seal();
        assert!(pending.is_empty());
        assert_eq!(
            state,
            vec![
                StateCommand::Enable(Capability::Fog),
                StateCommand::Disable(Capability::Blend)
            ]
        );
    }

    #[test]
    fn generated_ranges_are_disjoint() {
        let mut store = ListStore::default();
        assert_eq!(store.generate(3), 1);
        assert_eq!(store.generate(2), 4);
        assert_eq!(store.generate(0), 0);
    }

    #[test]
    fn generate_skips_ids_in_use() {
        let mut store = ListStore::default();
        store.insert(2, DisplayList::default());
        assert_eq!(store.generate(2), 3);
        assert_eq!(store.generate(1), 5);
    }
}
