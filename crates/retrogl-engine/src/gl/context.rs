use anyhow::Context as _;
use glam::Mat4;

use crate::backend::{
    ArrayDraw, BlendFactor, BufferId, BufferKind, BufferUsage, ClearRequest, CompareFunc, Face,
    GpuBackend, IndexedDraw, ProgramId, ProgramKind, RasterState, ShaderUniforms, TextureHandle,
    VertexLayout, ViewportRect,
};

use super::error::{ErrorRegister, GlError};
use super::format::InterleavedFormat;
use super::glu;
use super::immediate::{ImmediateBatch, Segment, Vertex};
use super::list::{
    route, CompiledGeometry, DisplayList, ListBuilder, ListMode, ListStore, Opcode,
    PendingGeometry, Route,
};
use super::matrix::{MatrixMode, MatrixStack};
use super::select::{PickTarget, RenderMode, SelectBuffer, Selection};
use super::state::{
    texture_parameter_from_gl, Capability, ClientArray, FixedState, FogParam, LightModelParam,
    MaterialMode, ShadeModel, StateCommand,
};
use super::topology::Topology;
use super::types::*;

/// Construction parameters for [`GlContext`].
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Initial viewport (and picking target) size in pixels.
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Execute a list's captured state commands before drawing its geometry.
    ///
    /// Off by default: `call_list` draws geometry only and appearance comes
    /// from whatever state the caller set beforehand.
    pub replay_list_state: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            viewport_width: 800,
            viewport_height: 600,
            replay_list_state: false,
        }
    }
}

/// Client-side interleaved array bound by `interleaved_arrays`.
#[derive(Debug)]
struct ClientArrays {
    format: Option<InterleavedFormat>,
    /// Record stride in floats.
    stride: u32,
    data: Vec<f32>,
    buffer: BufferId,
    index_buffer: BufferId,
    vertex: bool,
    color: bool,
    texcoord: bool,
}

impl ClientArrays {
    fn records(&self) -> u32 {
        if self.stride == 0 {
            return 0;
        }
        self.data.len() as u32 / self.stride
    }

    /// Layout restricted to the enabled arrays.
    fn layout(&self) -> Option<VertexLayout> {
        let format = self.format.filter(|_| self.vertex)?;
        let mut layout = format.layout().vertex_layout(self.stride * 4);
        if !self.color {
            layout.color = None;
        }
        if !self.texcoord {
            layout.texcoord = None;
        }
        Some(layout)
    }

    fn vertex_at(&self, layout: &VertexLayout, i: u32, color: [f32; 3], texcoord: [f32; 2]) -> Vertex {
        let base = (i * self.stride) as usize;
        let at = |offset_bytes: u32| base + (offset_bytes / 4) as usize;

        let p = at(layout.position.offset_bytes);
        let z = if layout.position.components >= 3 { self.data[p + 2] } else { 0.0 };
        Vertex {
            texcoord: layout
                .texcoord
                .map_or(texcoord, |s| [self.data[at(s.offset_bytes)], self.data[at(s.offset_bytes) + 1]]),
            color: layout.color.map_or(color, |s| {
                let c = at(s.offset_bytes);
                [self.data[c], self.data[c + 1], self.data[c + 2]]
            }),
            position: [self.data[p], self.data[p + 1], z],
        }
    }
}

/// An OpenGL 1.1 style rendering context over a shader-only [`GpuBackend`].
///
/// Every command is fail-soft: invalid calls log, set the error register and
/// return without side effects. Only construction can fail hard.
pub struct GlContext<B: GpuBackend> {
    backend: B,
    config: ContextConfig,
    errors: ErrorRegister,

    main_program: ProgramId,
    picking_program: ProgramId,

    matrix_mode: MatrixMode,
    projection: MatrixStack,
    modelview: MatrixStack,

    color: [f32; 4],
    texcoord: [f32; 2],
    immediate: ImmediateBatch,
    immediate_buffer: BufferId,
    arrays: ClientArrays,

    lists: ListStore,
    recording: Option<ListBuilder>,

    state: FixedState,
    clear_color: [f32; 4],
    clear_depth: f32,
    viewport: ViewportRect,

    selection: Selection,

    // Last values sent to the backend.
    gpu_raster: Option<RasterState>,
    gpu_texture: Option<TextureHandle>,
}

impl<B: GpuBackend> GlContext<B> {
    /// Compiles both programs and allocates the streaming buffers.
    pub fn create(mut backend: B, config: ContextConfig) -> anyhow::Result<Self> {
        let main_program = backend
            .compile_program(ProgramKind::Main)
            .context("failed to compile main program")?;
        let picking_program = backend
            .compile_program(ProgramKind::Picking)
            .context("failed to compile picking program")?;

        let immediate_buffer = backend
            .create_buffer(BufferKind::Vertex)
            .context("failed to create immediate vertex buffer")?;
        let array_buffer = backend
            .create_buffer(BufferKind::Vertex)
            .context("failed to create client array buffer")?;
        let array_index_buffer = backend
            .create_buffer(BufferKind::Index)
            .context("failed to create client array index buffer")?;

        let viewport = ViewportRect {
            x: 0,
            y: 0,
            width: config.viewport_width,
            height: config.viewport_height,
        };
        backend.use_program(main_program);
        backend.set_viewport(viewport);

        log::debug!(
            "GL context created ({}x{}, replay_list_state={})",
            config.viewport_width,
            config.viewport_height,
            config.replay_list_state
        );

        Ok(Self {
            backend,
            config,
            errors: ErrorRegister::default(),
            main_program,
            picking_program,
            matrix_mode: MatrixMode::ModelView,
            projection: MatrixStack::new(),
            modelview: MatrixStack::new(),
            color: [1.0; 4],
            texcoord: [0.0; 2],
            immediate: ImmediateBatch::default(),
            immediate_buffer,
            arrays: ClientArrays {
                format: None,
                stride: 0,
                data: Vec::new(),
                buffer: array_buffer,
                index_buffer: array_index_buffer,
                vertex: false,
                color: false,
                texcoord: false,
            },
            lists: ListStore::default(),
            recording: None,
            state: FixedState::default(),
            clear_color: [0.0; 4],
            clear_depth: 1.0,
            viewport,
            selection: Selection::default(),
            gpu_raster: None,
            gpu_texture: None,
        })
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline]
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    fn fail(&mut self, command: &str, err: GlError) {
        self.errors.set(command, err);
    }

    fn route(&self, op: Opcode) -> Route {
        route(op, self.recording.as_ref().map(ListBuilder::mode))
    }

    // ── matrices ───────────────────────────────────────────────────────────

    fn stack_mut(&mut self) -> &mut MatrixStack {
        match self.matrix_mode {
            MatrixMode::Projection => &mut self.projection,
            MatrixMode::ModelView => &mut self.modelview,
        }
    }

    pub fn matrix_mode(&mut self, mode: GLenum) {
        match MatrixMode::from_gl(mode) {
            Some(m) => self.matrix_mode = m,
            None => self.fail("glMatrixMode", GlError::InvalidEnum),
        }
    }

    pub fn load_identity(&mut self) {
        self.stack_mut().load_identity();
    }

    pub fn push_matrix(&mut self) {
        self.stack_mut().push();
    }

    pub fn pop_matrix(&mut self) {
        if self.stack_mut().pop().is_err() {
            self.fail("glPopMatrix", GlError::InvalidOperation);
        }
    }

    pub fn translatef(&mut self, x: f32, y: f32, z: f32) {
        self.stack_mut().translate(x, y, z);
    }

    pub fn rotatef(&mut self, angle_degrees: f32, x: f32, y: f32, z: f32) {
        self.stack_mut().rotate(angle_degrees, x, y, z);
    }

    pub fn scalef(&mut self, x: f32, y: f32, z: f32) {
        self.stack_mut().scale(x, y, z);
    }

    /// Replaces the current matrix with a column-major `m`.
    pub fn load_matrixf(&mut self, m: &[f32; 16]) {
        self.stack_mut().load(Mat4::from_cols_array(m));
    }

    pub fn mult_matrixf(&mut self, m: &[f32; 16]) {
        self.stack_mut().multiply(Mat4::from_cols_array(m));
    }

    pub fn ortho(&mut self, left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) {
        if left == right || bottom == top || near == far {
            self.fail("glOrtho", GlError::InvalidValue);
            return;
        }
        self.stack_mut()
            .multiply(glu::ortho(left, right, bottom, top, near, far));
    }

    pub fn perspective(&mut self, fovy_degrees: f32, aspect: f32, near: f32, far: f32) {
        if aspect == 0.0 || near <= 0.0 || far <= near {
            self.fail("gluPerspective", GlError::InvalidValue);
            return;
        }
        self.stack_mut()
            .multiply(glu::perspective(fovy_degrees, aspect, near, far));
    }

    /// `gluPickMatrix`; `viewport` is `[x, y, width, height]`.
    pub fn pick_matrix(&mut self, x: f32, y: f32, width: f32, height: f32, viewport: [i32; 4]) {
        self.stack_mut()
            .multiply(glu::pick_matrix(x, y, width, height, viewport));
    }

    // ── immediate geometry ─────────────────────────────────────────────────

    fn batch_open(&self, route: Route) -> bool {
        if route.executes() {
            self.immediate.is_open()
        } else {
            self.recording
                .as_ref()
                .is_some_and(ListBuilder::is_batch_open)
        }
    }

    pub fn begin(&mut self, mode: GLenum) {
        let Some(topology) = Topology::from_gl(mode) else {
            return self.fail("glBegin", GlError::InvalidEnum);
        };
        let route = self.route(Opcode::Begin);
        if self.batch_open(route) {
            return self.fail("glBegin", GlError::InvalidOperation);
        }

        if route.records() {
            if let Some(list) = self.recording.as_mut() {
                list.begin(topology);
            }
        }
        if route.executes() {
            self.immediate.begin(topology);
        }
    }

    pub fn end(&mut self) {
        let route = self.route(Opcode::End);
        if !self.batch_open(route) {
            return self.fail("glEnd", GlError::InvalidOperation);
        }

        if route.records() {
            if let Some(list) = self.recording.as_mut() {
                list.end();
            }
        }
        if route.executes() {
            self.end_immediate();
        }
    }

    fn end_immediate(&mut self) {
        let Some(segment) = self.immediate.end() else { return };
        self.draw_segment(&segment);
    }

    pub fn color3f(&mut self, r: f32, g: f32, b: f32) {
        self.color4f(r, g, b, 1.0);
    }

    pub fn color4f(&mut self, r: f32, g: f32, b: f32, a: f32) {
        let rgba = [r, g, b, a].map(|c| c.clamp(0.0, 1.0));
        let route = self.route(Opcode::Color);
        if route.records() {
            if let Some(list) = self.recording.as_mut() {
                list.color(rgba);
            }
        }
        if route.executes() {
            self.color = rgba;
            self.immediate.note_color();
        }
    }

    pub fn tex_coord2f(&mut self, s: f32, t: f32) {
        let route = self.route(Opcode::TexCoord);
        if route.records() {
            if let Some(list) = self.recording.as_mut() {
                list.tex_coord([s, t]);
            }
        }
        if route.executes() {
            self.texcoord = [s, t];
            self.immediate.note_texcoord();
        }
    }

    pub fn vertex2f(&mut self, x: f32, y: f32) {
        self.vertex3f(x, y, 0.0);
    }

    pub fn vertex3f(&mut self, x: f32, y: f32, z: f32) {
        let route = self.route(Opcode::Vertex);
        if route.records() {
            if let Some(list) = self.recording.as_mut() {
                list.vertex([x, y, z]);
            }
        }
        if route.executes() {
            let [r, g, b, _] = self.color;
            let accepted = self.immediate.push(Vertex {
                texcoord: self.texcoord,
                color: [r, g, b],
                position: [x, y, z],
            });
            if !accepted {
                log::debug!("glVertex outside glBegin/glEnd ignored");
            }
        }
    }

    fn draw_segment(&mut self, segment: &Segment) {
        let Some(batch) = segment.assemble() else { return };
        let layout = batch.format.layout().vertex_layout(0);

        self.backend
            .upload_vertices(self.immediate_buffer, &batch.data, BufferUsage::Dynamic);
        self.prepare_draw(&layout, self.state.texture);
        self.backend.draw_arrays(&ArrayDraw {
            buffer: self.immediate_buffer,
            layout,
            topology: batch.topology,
            first: 0,
            count: batch.vertex_count(),
        });
    }

    /// Sends raster state, texture binding and the uniform block for a draw.
    fn prepare_draw(&mut self, layout: &VertexLayout, texture: Option<TextureHandle>) {
        let raster = self.state.raster_state();
        if self.gpu_raster != Some(raster) {
            self.backend.set_raster_state(&raster);
            self.gpu_raster = Some(raster);
        }
        if self.gpu_texture != texture {
            self.backend.bind_texture(texture);
            self.gpu_texture = texture;
        }

        let mut u = ShaderUniforms {
            projection: self.projection.current().to_cols_array_2d(),
            modelview: self.modelview.current().to_cols_array_2d(),
            current_color: self.color,
            pick_color: self.selection.pick_color,
            ..ShaderUniforms::default()
        };
        self.state.write_uniforms(&mut u);
        u.flags[0] = (self.state.is_enabled(Capability::Texture2d) && texture.is_some()) as u32;
        let u = u.with_vertex_layout(layout);
        self.backend.set_uniforms(&u);
    }

    // ── client arrays ──────────────────────────────────────────────────────

    /// Binds `data` as the interleaved client array and enables the arrays the
    /// format carries. `stride` is in bytes; 0 means tightly packed.
    pub fn interleaved_arrays(&mut self, format: GLenum, stride: i32, data: &[f32]) {
        let Some(format) = InterleavedFormat::from_gl(format) else {
            return self.fail("glInterleavedArrays", GlError::InvalidEnum);
        };
        let packed = format.layout().stride_bytes();
        let stride = match u32::try_from(stride) {
            Ok(0) => packed,
            Ok(s) if s >= packed && s % 4 == 0 => s,
            _ => return self.fail("glInterleavedArrays", GlError::InvalidValue),
        };

        self.arrays.format = Some(format);
        self.arrays.stride = stride / 4;
        self.arrays.data = data.to_vec();
        self.arrays.vertex = true;
        self.arrays.color = format.has_color();
        self.arrays.texcoord = format.has_texcoord();
        self.backend
            .upload_vertices(self.arrays.buffer, data, BufferUsage::Dynamic);
    }

    pub fn enable_client_state(&mut self, array: GLenum) {
        self.set_client_state("glEnableClientState", array, true);
    }

    pub fn disable_client_state(&mut self, array: GLenum) {
        self.set_client_state("glDisableClientState", array, false);
    }

    fn set_client_state(&mut self, command: &str, array: GLenum, on: bool) {
        match ClientArray::from_gl(array) {
            Some(ClientArray::Vertex) => self.arrays.vertex = on,
            Some(ClientArray::Color) => self.arrays.color = on,
            Some(ClientArray::TexCoord) => self.arrays.texcoord = on,
            None => self.fail(command, GlError::InvalidEnum),
        }
    }

    pub fn draw_arrays(&mut self, mode: GLenum, first: i32, count: i32) {
        let Some(topology) = Topology::from_gl(mode) else {
            return self.fail("glDrawArrays", GlError::InvalidEnum);
        };
        let (Ok(first), Ok(count)) = (u32::try_from(first), u32::try_from(count)) else {
            return self.fail("glDrawArrays", GlError::InvalidValue);
        };
        let route = self.route(Opcode::DrawArrays);
        if self.batch_open(route) {
            return self.fail("glDrawArrays", GlError::InvalidOperation);
        }

        let Some(layout) = self.arrays.layout() else {
            log::debug!("glDrawArrays without an enabled vertex array ignored");
            return;
        };
        let available = self.arrays.records().saturating_sub(first);
        if count > available {
            log::debug!("glDrawArrays range exceeds the bound array; clamped to {available}");
        }
        let count = count.min(available);

        if route.records() {
            self.record_array_segment(topology, &layout, first, count);
        }
        if route.executes() {
            self.draw_client_arrays(topology, layout, first, count);
        }
    }

    fn record_array_segment(&mut self, topology: Topology, layout: &VertexLayout, first: u32, count: u32) {
        let Some(list) = self.recording.as_ref() else { return };
        let (color, texcoord) = list.current_attributes();
        let rgb = [color[0], color[1], color[2]];
        let vertices = (first..first + count)
            .map(|i| self.arrays.vertex_at(layout, i, rgb, texcoord))
            .collect();
        let segment = Segment {
            topology,
            vertices,
            has_color: layout.color.is_some(),
            has_texcoord: layout.texcoord.is_some(),
        };
        if let Some(list) = self.recording.as_mut() {
            list.add_segment(segment);
        }
    }

    fn draw_client_arrays(&mut self, topology: Topology, layout: VertexLayout, first: u32, count: u32) {
        let count = topology.usable_count(count);
        if count == 0 {
            return;
        }
        self.prepare_draw(&layout, self.state.texture);

        match topology.expansion_indices(count) {
            Some(indices) => {
                self.backend
                    .upload_indices(self.arrays.index_buffer, &indices, BufferUsage::Dynamic);
                self.backend.draw_indexed(&IndexedDraw {
                    buffer: self.arrays.buffer,
                    index_buffer: self.arrays.index_buffer,
                    layout,
                    topology: topology.draw_topology(),
                    first_index: 0,
                    index_count: indices.len() as u32,
                    base_vertex: first as i32,
                });
            }
            None => self.backend.draw_arrays(&ArrayDraw {
                buffer: self.arrays.buffer,
                layout,
                topology: topology.draw_topology(),
                first,
                count,
            }),
        }
    }

    // ── display lists ──────────────────────────────────────────────────────

    /// Reserves `range` contiguous unused list ids and returns the first.
    pub fn gen_lists(&mut self, range: i32) -> u32 {
        match u32::try_from(range) {
            Ok(range) => self.lists.generate(range),
            Err(_) => {
                self.fail("glGenLists", GlError::InvalidValue);
                0
            }
        }
    }

    pub fn new_list(&mut self, id: u32, mode: GLenum) {
        if id == 0 {
            return self.fail("glNewList", GlError::InvalidValue);
        }
        let Some(mode) = ListMode::from_gl(mode) else {
            return self.fail("glNewList", GlError::InvalidEnum);
        };
        if self.recording.is_some() || self.immediate.is_open() {
            return self.fail("glNewList", GlError::InvalidOperation);
        }

        log::trace!("recording list {id} ({mode:?})");
        self.recording = Some(ListBuilder::new(id, mode, self.color, self.texcoord));
    }

    pub fn end_list(&mut self) {
        let Some(mut builder) = self.recording.take() else {
            return self.fail("glEndList", GlError::InvalidOperation);
        };
        if builder.mode() == ListMode::CompileAndExecute {
            self.end_immediate();
        }

        let (pending, state) = builder.seal();
        match self.upload_list(pending) {
            Ok(geometry) => {
                let id = builder.id();
                log::debug!(
                    "compiled list {id}: {} geometry entries, {} state commands",
                    geometry.len(),
                    state.len()
                );
                if let Some(old) = self.lists.insert(id, DisplayList { geometry, state }) {
                    self.free_list(&old);
                }
            }
            Err(err) => {
                log::warn!("list {} upload failed: {err:#}", builder.id());
                self.fail("glEndList", GlError::OutOfMemory);
                self.recording = Some(builder);
            }
        }
    }

    fn upload_list(&mut self, pending: Vec<PendingGeometry>) -> anyhow::Result<Vec<CompiledGeometry>> {
        let mut out: Vec<CompiledGeometry> = Vec::with_capacity(pending.len());
        for p in pending {
            match self.upload_geometry(p) {
                Ok(g) => out.push(g),
                Err(err) => {
                    for b in out.iter().flat_map(CompiledGeometry::buffers) {
                        self.backend.delete_buffer(b);
                    }
                    return Err(err);
                }
            }
        }
        Ok(out)
    }

    fn upload_geometry(&mut self, p: PendingGeometry) -> anyhow::Result<CompiledGeometry> {
        let buffer = self
            .backend
            .create_buffer(BufferKind::Vertex)
            .context("list vertex buffer")?;
        self.backend
            .upload_vertices(buffer, &p.data, BufferUsage::Static);

        let (index_buffer, index_count) = match &p.indices {
            Some(indices) => {
                let ib = match self.backend.create_buffer(BufferKind::Index) {
                    Ok(ib) => ib,
                    Err(err) => {
                        self.backend.delete_buffer(buffer);
                        return Err(err.context("list index buffer"));
                    }
                };
                self.backend.upload_indices(ib, indices, BufferUsage::Static);
                (Some(ib), indices.len() as u32)
            }
            None => (None, 0),
        };

        Ok(CompiledGeometry {
            buffer,
            index_buffer,
            vertex_count: p.vertex_count,
            index_count,
            topology: p.topology,
            format: p.format,
            texture: p.texture,
        })
    }

    fn free_list(&mut self, list: &DisplayList) {
        for b in list.buffers() {
            self.backend.delete_buffer(b);
        }
    }

    /// Draws list `id`; unknown ids are ignored.
    pub fn call_list(&mut self, id: u32) {
        let Some(list) = self.lists.get(id).cloned() else {
            log::trace!("glCallList({id}): no such list");
            return;
        };

        if self.config.replay_list_state {
            for cmd in &list.state {
                self.execute_state(cmd);
            }
        }
        for g in &list.geometry {
            self.draw_compiled(g);
        }
    }

    pub fn call_lists(&mut self, ids: &[u32]) {
        for &id in ids {
            self.call_list(id);
        }
    }

    fn draw_compiled(&mut self, g: &CompiledGeometry) {
        let layout = g.format.layout().vertex_layout(0);
        self.prepare_draw(&layout, g.texture.or(self.state.texture));

        match g.index_buffer {
            Some(index_buffer) => self.backend.draw_indexed(&IndexedDraw {
                buffer: g.buffer,
                index_buffer,
                layout,
                topology: g.topology.draw_topology(),
                first_index: 0,
                index_count: g.index_count,
                base_vertex: 0,
            }),
            None => self.backend.draw_arrays(&ArrayDraw {
                buffer: g.buffer,
                layout,
                topology: g.topology.draw_topology(),
                first: 0,
                count: g.vertex_count,
            }),
        }
    }

    pub fn delete_lists(&mut self, id: u32, range: i32) {
        let Ok(range) = u32::try_from(range) else {
            return self.fail("glDeleteLists", GlError::InvalidValue);
        };
        for list_id in id..id.saturating_add(range) {
            if let Some(list) = self.lists.remove(list_id) {
                self.free_list(&list);
            }
        }
    }

    pub fn is_list(&self, id: u32) -> bool {
        self.lists.contains(id)
    }

    // ── state ──────────────────────────────────────────────────────────────

    fn issue_state(&mut self, cmd: StateCommand) {
        let route = self.route(cmd.opcode());
        if route.records() {
            if let Some(list) = self.recording.as_mut() {
                list.record_state(cmd);
            }
        }
        if route.executes() {
            self.execute_state(&cmd);
        }
    }

    fn execute_state(&mut self, cmd: &StateCommand) {
        if let StateCommand::TexParameter(p) = *cmd {
            match self.state.texture {
                Some(t) => self.backend.texture_parameter(t, p),
                None => self.fail("glTexParameteri", GlError::InvalidOperation),
            }
            return;
        }
        self.state.apply(cmd);
    }

    pub fn enable(&mut self, cap: GLenum) {
        match Capability::from_gl(cap) {
            Some(c) => self.issue_state(StateCommand::Enable(c)),
            None => self.fail("glEnable", GlError::InvalidEnum),
        }
    }

    pub fn disable(&mut self, cap: GLenum) {
        match Capability::from_gl(cap) {
            Some(c) => self.issue_state(StateCommand::Disable(c)),
            None => self.fail("glDisable", GlError::InvalidEnum),
        }
    }

    /// Server capabilities and client arrays.
    pub fn is_enabled(&mut self, cap: GLenum) -> bool {
        if let Some(c) = Capability::from_gl(cap) {
            return self.state.is_enabled(c);
        }
        match ClientArray::from_gl(cap) {
            Some(ClientArray::Vertex) => self.arrays.vertex,
            Some(ClientArray::Color) => self.arrays.color,
            Some(ClientArray::TexCoord) => self.arrays.texcoord,
            None => {
                self.fail("glIsEnabled", GlError::InvalidEnum);
                false
            }
        }
    }

    /// Binds an embedder-supplied texture handle; 0 unbinds.
    pub fn bind_texture(&mut self, target: GLenum, texture: u32) {
        if target != GL_TEXTURE_2D {
            return self.fail("glBindTexture", GlError::InvalidEnum);
        }
        let handle = (texture != 0).then_some(TextureHandle(texture));
        self.issue_state(StateCommand::BindTexture(handle));
    }

    pub fn tex_parameteri(&mut self, target: GLenum, pname: GLenum, param: i32) {
        if target != GL_TEXTURE_2D {
            return self.fail("glTexParameteri", GlError::InvalidEnum);
        }
        match texture_parameter_from_gl(pname, param) {
            Ok(p) => self.issue_state(StateCommand::TexParameter(p)),
            Err(e) => self.fail("glTexParameteri", e),
        }
    }

    pub fn blend_func(&mut self, sfactor: GLenum, dfactor: GLenum) {
        match (BlendFactor::from_gl(sfactor), BlendFactor::from_gl(dfactor)) {
            (Some(s), Some(d)) => self.issue_state(StateCommand::BlendFunc(s, d)),
            _ => self.fail("glBlendFunc", GlError::InvalidEnum),
        }
    }

    pub fn depth_func(&mut self, func: GLenum) {
        match CompareFunc::from_gl(func) {
            Some(f) => self.issue_state(StateCommand::DepthFunc(f)),
            None => self.fail("glDepthFunc", GlError::InvalidEnum),
        }
    }

    pub fn cull_face(&mut self, mode: GLenum) {
        match Face::from_gl(mode) {
            Some(f) => self.issue_state(StateCommand::CullFace(f)),
            None => self.fail("glCullFace", GlError::InvalidEnum),
        }
    }

    pub fn alpha_func(&mut self, func: GLenum, reference: f32) {
        match CompareFunc::from_gl(func) {
            Some(f) => self.issue_state(StateCommand::AlphaFunc(f, reference)),
            None => self.fail("glAlphaFunc", GlError::InvalidEnum),
        }
    }

    pub fn color_material(&mut self, face: GLenum, mode: GLenum) {
        match (Face::from_gl(face), MaterialMode::from_gl(mode)) {
            (Some(f), Some(m)) => self.issue_state(StateCommand::ColorMaterial(f, m)),
            _ => self.fail("glColorMaterial", GlError::InvalidEnum),
        }
    }

    pub fn shade_model(&mut self, mode: GLenum) {
        match ShadeModel::from_gl(mode) {
            Some(m) => self.issue_state(StateCommand::ShadeModel(m)),
            None => self.fail("glShadeModel", GlError::InvalidEnum),
        }
    }

    pub fn fog_i(&mut self, pname: GLenum, param: i32) {
        match FogParam::from_scalar(pname, param as f32) {
            Ok(p) => self.issue_state(StateCommand::Fog(p)),
            Err(e) => self.fail("glFogi", e),
        }
    }

    pub fn fog_f(&mut self, pname: GLenum, param: f32) {
        match FogParam::from_scalar(pname, param) {
            Ok(p) => self.issue_state(StateCommand::Fog(p)),
            Err(e) => self.fail("glFogf", e),
        }
    }

    pub fn fog_fv(&mut self, pname: GLenum, params: &[f32]) {
        match FogParam::from_vector(pname, params) {
            Ok(p) => self.issue_state(StateCommand::Fog(p)),
            Err(e) => self.fail("glFogfv", e),
        }
    }

    pub fn light_model_f(&mut self, pname: GLenum, param: f32) {
        match LightModelParam::from_scalar(pname, param) {
            Ok(p) => self.issue_state(StateCommand::LightModel(p)),
            Err(e) => self.fail("glLightModelf", e),
        }
    }

    pub fn light_model_fv(&mut self, pname: GLenum, params: &[f32]) {
        match LightModelParam::from_vector(pname, params) {
            Ok(p) => self.issue_state(StateCommand::LightModel(p)),
            Err(e) => self.fail("glLightModelfv", e),
        }
    }

    // ── framebuffer ────────────────────────────────────────────────────────

    pub fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.clear_color = [r, g, b, a].map(|c| c.clamp(0.0, 1.0));
    }

    pub fn clear_depth(&mut self, depth: f32) {
        self.clear_depth = depth.clamp(0.0, 1.0);
    }

    /// Clears the current target. In selection mode the colour clear is
    /// black so the background decodes to "no hit".
    pub fn clear(&mut self, mask: GLbitfield) {
        if mask & !(GL_COLOR_BUFFER_BIT | GL_DEPTH_BUFFER_BIT) != 0 {
            return self.fail("glClear", GlError::InvalidValue);
        }
        let color = if self.selection.is_selecting() {
            [0.0, 0.0, 0.0, 1.0]
        } else {
            self.clear_color
        };
        self.backend.clear(&ClearRequest {
            color: (mask & GL_COLOR_BUFFER_BIT != 0).then_some(color),
            depth: (mask & GL_DEPTH_BUFFER_BIT != 0).then_some(self.clear_depth),
        });
    }

    pub fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        let (Ok(width), Ok(height)) = (u32::try_from(width), u32::try_from(height)) else {
            return self.fail("glViewport", GlError::InvalidValue);
        };
        self.viewport = ViewportRect { x, y, width, height };
        self.backend.set_viewport(self.viewport);
    }

    // ── selection ──────────────────────────────────────────────────────────

    /// Allocates a selection buffer of `capacity` words.
    pub fn select_buffer(&mut self, capacity: usize) {
        if self.selection.is_selecting() {
            return self.fail("glSelectBuffer", GlError::InvalidOperation);
        }
        self.selection.buffer = SelectBuffer::with_capacity(capacity);
    }

    /// Hit records written by the last selection pass.
    pub fn select_buffer_data(&self) -> &[u32] {
        self.selection.buffer.data()
    }

    /// Cursor position for the next selection pass, in window pixels with a
    /// top-left origin.
    pub fn set_pick_cursor(&mut self, x: i32, y: i32) {
        self.selection.cursor = (x, y);
    }

    /// Switches render mode. Leaving `SELECT` returns the number of hit
    /// records written (0 or 1); every other transition returns 0.
    pub fn render_mode(&mut self, mode: GLenum) -> u32 {
        let Some(mode) = RenderMode::from_gl(mode) else {
            self.fail("glRenderMode", GlError::InvalidEnum);
            return 0;
        };
        if self.immediate.is_open() {
            self.fail("glRenderMode", GlError::InvalidOperation);
            return 0;
        }
        match (self.selection.mode, mode) {
            (RenderMode::Render, RenderMode::Select) => {
                self.enter_select();
                0
            }
            (RenderMode::Select, RenderMode::Render) => self.leave_select(),
            _ => 0,
        }
    }

    fn ensure_pick_target(&mut self) -> anyhow::Result<PickTarget> {
        let width = (self.viewport.x.max(0) as u32 + self.viewport.width).max(1);
        let height = (self.viewport.y.max(0) as u32 + self.viewport.height).max(1);

        if let Some(t) = self.selection.target {
            if t.width == width && t.height == height {
                return Ok(t);
            }
            self.backend.delete_framebuffer(t.framebuffer);
            self.selection.target = None;
        }

        let framebuffer = self
            .backend
            .create_framebuffer(width, height)
            .with_context(|| format!("failed to create {width}x{height} picking target"))?;
        let target = PickTarget {
            framebuffer,
            width,
            height,
        };
        self.selection.target = Some(target);
        Ok(target)
    }

    fn enter_select(&mut self) {
        let target = match self.ensure_pick_target() {
            Ok(t) => t,
            Err(err) => {
                log::warn!("{err:#}");
                return self.fail("glRenderMode", GlError::OutOfMemory);
            }
        };

        self.selection.mapping.reset();
        self.selection.buffer.rewind();
        self.selection.mode = RenderMode::Select;

        self.backend.bind_framebuffer(Some(target.framebuffer));
        self.backend.use_program(self.picking_program);
        self.clear(GL_COLOR_BUFFER_BIT | GL_DEPTH_BUFFER_BIT);
        self.init_names();

        log::debug!("entered selection mode ({}x{} target)", target.width, target.height);
    }

    fn leave_select(&mut self) -> u32 {
        self.backend.flush();

        let (cx, cy) = self.selection.cursor;
        let top = self.viewport.y + self.viewport.height as i32;
        let (x, y) = (cx, top - cy - 1);

        let hits = if self.viewport.contains(x, y) {
            match self.backend.read_pixel(x, y) {
                Ok(rgba) => self.selection.resolve(rgba),
                Err(err) => {
                    log::warn!("pick readback failed: {err:#}");
                    0
                }
            }
        } else {
            log::debug!("pick cursor ({cx}, {cy}) outside viewport");
            0
        };

        self.backend.bind_framebuffer(None);
        self.backend.use_program(self.main_program);
        self.selection.mode = RenderMode::Render;

        log::debug!("left selection mode with {hits} hit(s)");
        hits
    }

    pub fn init_names(&mut self) {
        self.selection.names.init();
        self.selection.stamp();
    }

    pub fn push_name(&mut self, name: u32) {
        self.selection.names.push(name);
        self.selection.stamp();
    }

    pub fn load_name(&mut self, name: u32) {
        self.selection.names.load(name);
        self.selection.stamp();
    }

    /// Popping an empty stack leaves it empty.
    pub fn pop_name(&mut self) {
        if !self.selection.names.pop() {
            log::debug!("glPopName on an empty name stack");
        }
        self.selection.stamp();
    }

    // ── queries ────────────────────────────────────────────────────────────

    /// Returns and clears the pending error code.
    pub fn get_error(&mut self) -> GLenum {
        self.errors.take()
    }

    pub fn get_float_v(&mut self, pname: GLenum, out: &mut [f32]) {
        let value: Vec<f32> = match pname {
            GL_PROJECTION_MATRIX => self.projection.current().to_cols_array().to_vec(),
            GL_MODELVIEW_MATRIX => self.modelview.current().to_cols_array().to_vec(),
            GL_CURRENT_COLOR => self.color.to_vec(),
            GL_FOG_COLOR => self.state.fog.color.to_vec(),
            GL_FOG_DENSITY => vec![self.state.fog.density],
            GL_FOG_START => vec![self.state.fog.start],
            GL_FOG_END => vec![self.state.fog.end],
            GL_COLOR_CLEAR_VALUE => self.clear_color.to_vec(),
            GL_LIGHT_MODEL_AMBIENT => self.state.light_model.ambient.to_vec(),
            _ => return self.fail("glGetFloatv", GlError::InvalidEnum),
        };
        match out.get_mut(..value.len()) {
            Some(dst) => dst.copy_from_slice(&value),
            None => self.fail("glGetFloatv", GlError::InvalidValue),
        }
    }

    pub fn get_integer_v(&mut self, pname: GLenum, out: &mut [i32]) {
        let value: Vec<i32> = match pname {
            GL_VIEWPORT => vec![
                self.viewport.x,
                self.viewport.y,
                self.viewport.width as i32,
                self.viewport.height as i32,
            ],
            GL_MATRIX_MODE => vec![self.matrix_mode.to_gl() as i32],
            GL_LIST_INDEX => vec![self.recording.as_ref().map_or(0, |l| l.id() as i32)],
            GL_LIST_MODE => vec![self.recording.as_ref().map_or(0, |l| l.mode().to_gl() as i32)],
            GL_NAME_STACK_DEPTH => vec![self.selection.names.depth() as i32],
            GL_RENDER_MODE => vec![self.selection.mode.to_gl() as i32],
            GL_MODELVIEW_STACK_DEPTH => vec![self.modelview.depth() as i32],
            GL_PROJECTION_STACK_DEPTH => vec![self.projection.depth() as i32],
            GL_FOG_MODE => vec![self.state.fog.mode.to_gl() as i32],
            _ => return self.fail("glGetIntegerv", GlError::InvalidEnum),
        };
        match out.get_mut(..value.len()) {
            Some(dst) => dst.copy_from_slice(&value),
            None => self.fail("glGetIntegerv", GlError::InvalidValue),
        }
    }

    pub fn flush(&mut self) {
        self.backend.flush();
    }

    pub fn finish(&mut self) {
        self.backend.flush();
    }

    #[cfg(test)]
    pub(crate) fn pending_error(&self) -> Option<GlError> {
        self.errors.peek()
    }

    #[cfg(test)]
    pub(crate) fn fixed_state(&self) -> &FixedState {
        &self.state
    }
}
