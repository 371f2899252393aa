//! [`GpuBackend`] over wgpu.
//!
//! Draw calls are not encoded immediately. Each one is recorded as an op that
//! captures its pipeline key, uniforms offset, texture bind group and buffer
//! sources; ops are turned into render passes on [`GpuBackend::flush`],
//! [`WgpuBackend::end_frame`] or before a pixel readback.
//!
//! Dynamic buffers (immediate batches, client arrays) are rewritten between
//! draws, so their bytes are copied into per-batch arenas at draw time. Static
//! buffers (display lists) own a GPU buffer each.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroU64;

use wgpu::util::DeviceExt;

use crate::backend::{
    ArrayDraw, BufferId, BufferKind, BufferUsage, ClearRequest, DrawTopology, Face, FramebufferId,
    GpuBackend, IndexedDraw, ProgramId, ProgramKind, RasterState, ShaderUniforms, TextureHandle,
    TextureParameter, VertexLayout, ViewportRect,
};

use super::pipelines::{
    is_polygonal, uniform_size, PipelineCache, PipelineKey, ATTRIBUTE_DEFAULTS, DEPTH_FORMAT,
};
use super::readback::read_texel;
use super::textures::{create_rgba8, TextureRegistry};

const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const ARENA_MIN_BYTES: u64 = 64 * 1024;
/// Vertex and u32 index offsets both need 4-byte alignment.
const BUFFER_ALIGN: usize = 4;

// ── buffers ────────────────────────────────────────────────────────────────

enum BufferData {
    Empty,
    Static {
        buffer: wgpu::Buffer,
        len: u64,
    },
    Dynamic {
        bytes: Vec<u8>,
        /// Arena offset for the batch generation it was copied in.
        placed: Option<(u64, u64)>,
    },
}

struct BufferSlot {
    kind: BufferKind,
    data: BufferData,
}

/// Grow-only GPU buffer refilled from a CPU staging vector once per batch.
struct Arena {
    label: &'static str,
    usage: wgpu::BufferUsages,
    staging: Vec<u8>,
    buffer: wgpu::Buffer,
}

impl Arena {
    fn new(device: &wgpu::Device, label: &'static str, usage: wgpu::BufferUsages) -> Self {
        let usage = usage | wgpu::BufferUsages::COPY_DST;
        Self {
            label,
            usage,
            staging: Vec::new(),
            buffer: Self::allocate(device, label, usage, ARENA_MIN_BYTES),
        }
    }

    fn allocate(
        device: &wgpu::Device,
        label: &str,
        usage: wgpu::BufferUsages,
        size: u64,
    ) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    /// Appends `bytes` at a multiple of `align` and returns the offset.
    fn push(&mut self, bytes: &[u8], align: usize) -> u64 {
        let offset = self.staging.len().next_multiple_of(align);
        self.staging.resize(offset, 0);
        self.staging.extend_from_slice(bytes);
        offset as u64
    }

    /// Uploads the staged bytes. Returns `true` when the GPU buffer was replaced.
    fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> bool {
        if self.staging.is_empty() {
            return false;
        }
        let needed = (self.staging.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        self.staging.resize(needed as usize, 0);

        let grew = self.buffer.size() < needed;
        if grew {
            let size = needed.next_power_of_two().max(ARENA_MIN_BYTES);
            log::debug!("growing {} to {size} bytes", self.label);
            self.buffer = Self::allocate(device, self.label, self.usage, size);
        }
        queue.write_buffer(&self.buffer, 0, &self.staging);
        grew
    }

    fn reset(&mut self) {
        self.staging.clear();
    }
}

// ── recorded work ──────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Target {
    Main,
    Offscreen(FramebufferId),
}

enum Source {
    Arena { offset: u64, len: u64 },
    Buffer { buffer: wgpu::Buffer, len: u64 },
}

enum DrawRange {
    Arrays { first: u32, count: u32 },
    Indexed {
        source: Source,
        first: u32,
        count: u32,
        base_vertex: i32,
    },
}

struct DrawOp {
    key: PipelineKey,
    viewport: ViewportRect,
    uniform_offset: u32,
    texture: wgpu::BindGroup,
    vertices: Source,
    range: DrawRange,
}

enum Op {
    Clear(Target, ClearRequest),
    Draw(Target, DrawOp),
}

impl Op {
    fn target(&self) -> Target {
        match self {
            Op::Clear(t, _) | Op::Draw(t, _) => *t,
        }
    }
}

#[derive(Default)]
struct Batch {
    ops: Vec<Op>,
    /// Static buffers read by pending ops.
    referenced: HashSet<BufferId>,
    last_uniforms: Option<(ShaderUniforms, u32)>,
    generation: u64,
}

// ── render targets ─────────────────────────────────────────────────────────

struct Offscreen {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    width: u32,
    height: u32,
}

struct MainFrame {
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

struct MainDepth {
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

// ── backend ────────────────────────────────────────────────────────────────

/// Drives wgpu on behalf of a [`crate::gl::GlContext`].
///
/// Draws to the main target are only recorded between
/// [`WgpuBackend::begin_frame`] and [`WgpuBackend::end_frame`]; off-screen
/// framebuffers accept draws at any time.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_format: wgpu::TextureFormat,
    next_id: u32,

    programs: HashMap<ProgramId, ProgramKind>,
    pipelines: PipelineCache,
    textures: TextureRegistry,
    buffers: HashMap<BufferId, BufferSlot>,
    framebuffers: HashMap<FramebufferId, Offscreen>,

    program: Option<ProgramKind>,
    target: Target,
    uniforms: ShaderUniforms,
    raster: RasterState,
    texture: Option<TextureHandle>,
    viewport: ViewportRect,

    frame: Option<MainFrame>,
    main_depth: Option<MainDepth>,

    defaults: wgpu::Buffer,
    vertex_arena: Arena,
    index_arena: Arena,
    uniform_arena: Arena,
    uniform_stride: usize,
    uniform_bind_group: wgpu::BindGroup,
    batch: Batch,
}

impl WgpuBackend {
    /// Creates the backend for a surface of `surface_format`.
    ///
    /// Fails when the fixed-function shader does not compile on this device.
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface_format: wgpu::TextureFormat,
    ) -> anyhow::Result<Self> {
        let pipelines = PipelineCache::new(&device)?;
        let textures = TextureRegistry::new(&device, &queue, &pipelines.texture_layout);

        let defaults = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("retrogl attribute defaults"),
            contents: bytemuck::bytes_of(&ATTRIBUTE_DEFAULTS),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let vertex_arena = Arena::new(&device, "retrogl vertex arena", wgpu::BufferUsages::VERTEX);
        let index_arena = Arena::new(&device, "retrogl index arena", wgpu::BufferUsages::INDEX);
        let uniform_arena =
            Arena::new(&device, "retrogl uniform arena", wgpu::BufferUsages::UNIFORM);

        let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let uniform_stride = uniform_size().next_multiple_of(alignment) as usize;
        let uniform_bind_group =
            uniform_bind_group(&device, &pipelines.uniform_layout, &uniform_arena.buffer);

        log::debug!("wgpu backend ready: surface {surface_format:?}, uniform stride {uniform_stride}");

        Ok(Self {
            device,
            queue,
            surface_format,
            next_id: 1,
            programs: HashMap::new(),
            pipelines,
            textures,
            buffers: HashMap::new(),
            framebuffers: HashMap::new(),
            program: None,
            target: Target::Main,
            uniforms: ShaderUniforms::default(),
            raster: RasterState::default(),
            texture: None,
            viewport: ViewportRect::default(),
            frame: None,
            main_depth: None,
            defaults,
            vertex_arena,
            index_arena,
            uniform_arena,
            uniform_stride,
            uniform_bind_group,
            batch: Batch::default(),
        })
    }

    /// Makes `view` the main target until [`Self::end_frame`].
    pub fn begin_frame(&mut self, view: &wgpu::TextureView, width: u32, height: u32) {
        let stale = self
            .main_depth
            .as_ref()
            .is_none_or(|d| d.width != width || d.height != height);
        if stale {
            let (_, view) = depth_target(&self.device, "retrogl main depth", width, height);
            self.main_depth = Some(MainDepth { view, width, height });
        }
        self.frame = Some(MainFrame {
            view: view.clone(),
            width,
            height,
        });
    }

    /// Submits everything recorded for the frame and releases the main target.
    pub fn end_frame(&mut self) {
        self.submit_batch();
        self.frame = None;
    }

    /// Registers an embedder-created texture. It must be sampleable as float.
    pub fn register_texture(&mut self, texture: wgpu::Texture) -> TextureHandle {
        self.textures
            .register(&self.device, &self.pipelines.texture_layout, texture)
    }

    /// Uploads tightly packed RGBA8 pixels as a new texture.
    pub fn create_texture_rgba8(
        &mut self,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> anyhow::Result<TextureHandle> {
        anyhow::ensure!(width > 0 && height > 0, "texture has zero size");
        anyhow::ensure!(
            pixels.len() as u64 == 4 * width as u64 * height as u64,
            "expected {} bytes of RGBA8, got {}",
            4 * width as u64 * height as u64,
            pixels.len()
        );
        let texture = create_rgba8(
            &self.device,
            &self.queue,
            "retrogl texture",
            width,
            height,
            pixels,
        );
        Ok(self.register_texture(texture))
    }

    pub fn unregister_texture(&mut self, texture: TextureHandle) -> bool {
        self.textures.unregister(texture)
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn target_format(&self, target: Target) -> wgpu::TextureFormat {
        match target {
            Target::Main => self.surface_format,
            Target::Offscreen(_) => OFFSCREEN_FORMAT,
        }
    }

    fn target_ready(&self, target: Target) -> bool {
        match target {
            Target::Main => self.frame.is_some(),
            Target::Offscreen(id) => self.framebuffers.contains_key(&id),
        }
    }

    /// Color view, depth view and size of `target`.
    fn attachments(&self, target: Target) -> Option<(&wgpu::TextureView, &wgpu::TextureView, u32, u32)> {
        match target {
            Target::Main => {
                let frame = self.frame.as_ref()?;
                let depth = self.main_depth.as_ref()?;
                Some((&frame.view, &depth.view, frame.width, frame.height))
            }
            Target::Offscreen(id) => {
                let fb = self.framebuffers.get(&id)?;
                Some((&fb.color_view, &fb.depth_view, fb.width, fb.height))
            }
        }
    }

    fn write_static(&mut self, buffer: BufferId, bytes: &[u8]) {
        if bytes.is_empty() {
            if let Some(slot) = self.buffers.get_mut(&buffer) {
                slot.data = BufferData::Empty;
            }
            return;
        }
        let Some(kind) = self.buffers.get(&buffer).map(|s| s.kind) else {
            log::debug!("upload to unknown buffer {buffer:?} ignored");
            return;
        };

        let fits = matches!(
            self.buffers.get(&buffer).map(|s| &s.data),
            Some(BufferData::Static { buffer: b, .. }) if b.size() >= bytes.len() as u64
        );
        if fits && self.batch.referenced.contains(&buffer) {
            // Pending ops read the old contents.
            self.submit_batch();
        }

        let Some(slot) = self.buffers.get_mut(&buffer) else {
            return;
        };
        match &mut slot.data {
            BufferData::Static { buffer: b, len } if fits => {
                self.queue.write_buffer(b, 0, bytes);
                *len = bytes.len() as u64;
            }
            data => {
                let usage = match kind {
                    BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
                    BufferKind::Index => wgpu::BufferUsages::INDEX,
                } | wgpu::BufferUsages::COPY_DST;
                let gpu = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("retrogl static buffer"),
                    contents: bytes,
                    usage,
                });
                *data = BufferData::Static {
                    buffer: gpu,
                    len: bytes.len() as u64,
                };
            }
        }
    }

    fn write_dynamic(&mut self, buffer: BufferId, bytes: &[u8]) {
        let Some(slot) = self.buffers.get_mut(&buffer) else {
            log::debug!("upload to unknown buffer {buffer:?} ignored");
            return;
        };
        match &mut slot.data {
            BufferData::Dynamic { bytes: stored, placed } => {
                stored.clear();
                stored.extend_from_slice(bytes);
                *placed = None;
            }
            data => {
                *data = BufferData::Dynamic {
                    bytes: bytes.to_vec(),
                    placed: None,
                };
            }
        }
    }

    /// Resolves `buffer` to something a pass can bind, copying dynamic data
    /// into the arena on first use in this batch.
    fn source(&mut self, buffer: BufferId) -> Option<Source> {
        let generation = self.batch.generation;
        let slot = self.buffers.get_mut(&buffer)?;
        let arena = match slot.kind {
            BufferKind::Vertex => &mut self.vertex_arena,
            BufferKind::Index => &mut self.index_arena,
        };
        match &mut slot.data {
            BufferData::Empty => None,
            BufferData::Static { buffer: b, len } => {
                self.batch.referenced.insert(buffer);
                Some(Source::Buffer {
                    buffer: b.clone(),
                    len: *len,
                })
            }
            BufferData::Dynamic { bytes, placed } => {
                if bytes.is_empty() {
                    return None;
                }
                let offset = match *placed {
                    Some((g, offset)) if g == generation => offset,
                    _ => {
                        let offset = arena.push(bytes, BUFFER_ALIGN);
                        *placed = Some((generation, offset));
                        offset
                    }
                };
                Some(Source::Arena {
                    offset,
                    len: bytes.len() as u64,
                })
            }
        }
    }

    fn push_uniforms(&mut self) -> u32 {
        if let Some((last, offset)) = &self.batch.last_uniforms
            && *last == self.uniforms
        {
            return *offset;
        }
        let offset = self
            .uniform_arena
            .push(bytemuck::bytes_of(&self.uniforms), self.uniform_stride) as u32;
        self.batch.last_uniforms = Some((self.uniforms, offset));
        offset
    }

    /// Common validation and op construction for both draw kinds.
    fn record_draw(
        &mut self,
        buffer: BufferId,
        layout: VertexLayout,
        topology: DrawTopology,
        index_buffer: Option<BufferId>,
        make_range: impl FnOnce(Option<Source>) -> Option<DrawRange>,
    ) {
        let Some(program) = self.program else {
            log::debug!("draw without a program ignored");
            return;
        };
        if self.raster.cull && self.raster.cull_face == Face::FrontAndBack && is_polygonal(topology) {
            return;
        }
        if !self.target_ready(self.target) {
            log::debug!("draw outside a frame ignored");
            return;
        }

        let Some(vertices) = self.source(buffer) else {
            return;
        };
        let indices = match index_buffer {
            Some(id) => match self.source(id) {
                Some(source) => Some(source),
                None => return,
            },
            None => None,
        };
        let Some(range) = make_range(indices) else {
            return;
        };

        let key = PipelineKey {
            program,
            layout,
            topology,
            raster: self.raster,
            format: self.target_format(self.target),
        };
        self.pipelines.ensure(&self.device, &key);

        let uniform_offset = self.push_uniforms();
        let texture = self.textures.bind_group(self.texture).clone();
        self.batch.ops.push(Op::Draw(
            self.target,
            DrawOp {
                key,
                viewport: self.viewport,
                uniform_offset,
                texture,
                vertices,
                range,
            },
        ));
    }

    /// Uploads arenas, encodes every pending op and submits.
    fn submit_batch(&mut self) {
        let ops = std::mem::take(&mut self.batch.ops);
        if !ops.is_empty() {
            self.vertex_arena.upload(&self.device, &self.queue);
            self.index_arena.upload(&self.device, &self.queue);
            if self.uniform_arena.upload(&self.device, &self.queue) {
                self.uniform_bind_group = uniform_bind_group(
                    &self.device,
                    &self.pipelines.uniform_layout,
                    &self.uniform_arena.buffer,
                );
            }

            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("retrogl batch encoder"),
                });
            self.encode(&mut encoder, &ops);
            self.queue.submit([encoder.finish()]);
            log::trace!("submitted {} ops", ops.len());
        }

        self.vertex_arena.reset();
        self.index_arena.reset();
        self.uniform_arena.reset();
        self.batch.referenced.clear();
        self.batch.last_uniforms = None;
        self.batch.generation += 1;
    }

    fn encode(&self, encoder: &mut wgpu::CommandEncoder, ops: &[Op]) {
        let mut i = 0;
        while i < ops.len() {
            let target = ops[i].target();
            let Some((color, depth, width, height)) = self.attachments(target) else {
                log::debug!("ops for missing target {target:?} dropped");
                while i < ops.len() && ops[i].target() == target {
                    i += 1;
                }
                continue;
            };

            // Leading clears become load ops.
            let mut color_load = wgpu::LoadOp::Load;
            let mut depth_load = wgpu::LoadOp::Load;
            while let Some(Op::Clear(t, request)) = ops.get(i) {
                if *t != target {
                    break;
                }
                if let Some([r, g, b, a]) = request.color {
                    color_load = wgpu::LoadOp::Clear(wgpu::Color {
                        r: r as f64,
                        g: g as f64,
                        b: b as f64,
                        a: a as f64,
                    });
                }
                if let Some(d) = request.depth {
                    depth_load = wgpu::LoadOp::Clear(d);
                }
                i += 1;
            }

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("retrogl pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            pass.set_vertex_buffer(1, self.defaults.slice(..));

            while let Some(Op::Draw(t, draw)) = ops.get(i) {
                if *t != target {
                    break;
                }
                self.encode_draw(&mut pass, draw, width, height);
                i += 1;
            }
        }
    }

    fn encode_draw(&self, pass: &mut wgpu::RenderPass<'_>, draw: &DrawOp, width: u32, height: u32) {
        let Some(pipeline) = self.pipelines.get(&draw.key) else {
            return;
        };
        let Some((x, y, w, h)) = flip_viewport(draw.viewport, width, height) else {
            return;
        };

        pass.set_pipeline(pipeline);
        pass.set_viewport(x, y, w, h, 0.0, 1.0);
        pass.set_bind_group(0, &self.uniform_bind_group, &[draw.uniform_offset]);
        pass.set_bind_group(1, &draw.texture, &[]);
        pass.set_vertex_buffer(0, self.slice(&draw.vertices, &self.vertex_arena));

        match &draw.range {
            DrawRange::Arrays { first, count } => {
                pass.draw(*first..first + count, 0..1);
            }
            DrawRange::Indexed {
                source,
                first,
                count,
                base_vertex,
            } => {
                pass.set_index_buffer(self.slice(source, &self.index_arena), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(*first..first + count, *base_vertex, 0..1);
            }
        }
    }

    fn slice<'a>(&'a self, source: &'a Source, arena: &'a Arena) -> wgpu::BufferSlice<'a> {
        match source {
            Source::Arena { offset, len } => arena.buffer.slice(*offset..offset + len),
            Source::Buffer { buffer, len } => buffer.slice(..*len),
        }
    }
}

impl GpuBackend for WgpuBackend {
    fn compile_program(&mut self, kind: ProgramKind) -> anyhow::Result<ProgramId> {
        // Both programs live in the shader module compiled by `new`.
        let id = ProgramId(self.next_id());
        self.programs.insert(id, kind);
        Ok(id)
    }

    fn use_program(&mut self, program: ProgramId) {
        match self.programs.get(&program) {
            Some(kind) => self.program = Some(*kind),
            None => log::warn!("use_program: unknown program {program:?}"),
        }
    }

    fn create_buffer(&mut self, kind: BufferKind) -> anyhow::Result<BufferId> {
        let id = BufferId(self.next_id());
        self.buffers.insert(
            id,
            BufferSlot {
                kind,
                data: BufferData::Empty,
            },
        );
        Ok(id)
    }

    fn upload_vertices(&mut self, buffer: BufferId, data: &[f32], usage: BufferUsage) {
        match usage {
            BufferUsage::Static => self.write_static(buffer, bytemuck::cast_slice(data)),
            BufferUsage::Dynamic => self.write_dynamic(buffer, bytemuck::cast_slice(data)),
        }
    }

    fn upload_indices(&mut self, buffer: BufferId, data: &[u32], usage: BufferUsage) {
        match usage {
            BufferUsage::Static => self.write_static(buffer, bytemuck::cast_slice(data)),
            BufferUsage::Dynamic => self.write_dynamic(buffer, bytemuck::cast_slice(data)),
        }
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        // Pending ops hold their own handle to static buffers.
        self.buffers.remove(&buffer);
    }

    fn set_uniforms(&mut self, uniforms: &ShaderUniforms) {
        self.uniforms = *uniforms;
    }

    fn set_raster_state(&mut self, state: &RasterState) {
        self.raster = *state;
    }

    fn draw_arrays(&mut self, draw: &ArrayDraw) {
        if draw.count == 0 {
            return;
        }
        let (first, count) = (draw.first, draw.count);
        self.record_draw(draw.buffer, draw.layout, draw.topology, None, |_| {
            Some(DrawRange::Arrays { first, count })
        });
    }

    fn draw_indexed(&mut self, draw: &IndexedDraw) {
        if draw.index_count == 0 {
            return;
        }
        let (first, count, base_vertex) = (draw.first_index, draw.index_count, draw.base_vertex);
        self.record_draw(
            draw.buffer,
            draw.layout,
            draw.topology,
            Some(draw.index_buffer),
            |indices| {
                indices.map(|source| DrawRange::Indexed {
                    source,
                    first,
                    count,
                    base_vertex,
                })
            },
        );
    }

    fn create_framebuffer(&mut self, width: u32, height: u32) -> anyhow::Result<FramebufferId> {
        let max = self.device.limits().max_texture_dimension_2d;
        anyhow::ensure!(
            width > 0 && height > 0 && width <= max && height <= max,
            "framebuffer size {width}x{height} outside 1..={max}"
        );

        let color = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("retrogl offscreen color"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let (_, depth_view) = depth_target(&self.device, "retrogl offscreen depth", width, height);

        let id = FramebufferId(self.next_id());
        self.framebuffers.insert(
            id,
            Offscreen {
                color,
                color_view,
                depth_view,
                width,
                height,
            },
        );
        log::debug!("created framebuffer {id:?} ({width}x{height})");
        Ok(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        // Pending ops resolve their target by id.
        self.submit_batch();
        self.framebuffers.remove(&framebuffer);
        if self.target == Target::Offscreen(framebuffer) {
            self.target = Target::Main;
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.target = match framebuffer {
            None => Target::Main,
            Some(id) if self.framebuffers.contains_key(&id) => Target::Offscreen(id),
            Some(id) => {
                log::warn!("bind_framebuffer: unknown framebuffer {id:?}");
                return;
            }
        };
    }

    fn clear(&mut self, request: &ClearRequest) {
        if request.color.is_none() && request.depth.is_none() {
            return;
        }
        if !self.target_ready(self.target) {
            log::debug!("clear outside a frame ignored");
            return;
        }
        self.batch.ops.push(Op::Clear(self.target, *request));
    }

    fn read_pixel(&mut self, x: i32, y: i32) -> anyhow::Result<[u8; 4]> {
        let Target::Offscreen(id) = self.target else {
            anyhow::bail!("read_pixel needs an off-screen framebuffer bound");
        };
        self.submit_batch();

        let fb = self
            .framebuffers
            .get(&id)
            .ok_or_else(|| anyhow::anyhow!("framebuffer {id:?} no longer exists"))?;
        anyhow::ensure!(
            x >= 0 && y >= 0 && (x as u32) < fb.width && (y as u32) < fb.height,
            "pixel ({x}, {y}) outside {}x{} framebuffer",
            fb.width,
            fb.height
        );
        let row = fb.height - 1 - y as u32;
        read_texel(&self.device, &self.queue, &fb.color, x as u32, row)
    }

    fn bind_texture(&mut self, texture: Option<TextureHandle>) {
        self.texture = texture;
    }

    fn texture_parameter(&mut self, texture: TextureHandle, parameter: TextureParameter) {
        self.textures.set_parameter(
            &self.device,
            &self.pipelines.texture_layout,
            texture,
            parameter,
        );
    }

    fn set_viewport(&mut self, viewport: ViewportRect) {
        self.viewport = viewport;
    }

    fn flush(&mut self) {
        self.submit_batch();
    }
}

fn uniform_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("retrogl uniforms bind group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer,
                offset: 0,
                size: NonZeroU64::new(uniform_size()),
            }),
        }],
    })
}

fn depth_target(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// Converts a bottom-left-origin viewport into wgpu's top-left space,
/// clipped to the target. `None` when nothing of it is visible.
fn flip_viewport(vp: ViewportRect, width: u32, height: u32) -> Option<(f32, f32, f32, f32)> {
    let top = height as i64 - (vp.y as i64 + vp.height as i64);
    let x0 = (vp.x as i64).max(0);
    let y0 = top.max(0);
    let x1 = (vp.x as i64 + vp.width as i64).min(width as i64);
    let y1 = (top + vp.height as i64).min(height as i64);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0 as f32, y0 as f32, (x1 - x0) as f32, (y1 - y0) as f32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_flips_to_top_left_origin() {
        let vp = ViewportRect { x: 0, y: 0, width: 100, height: 50 };
        assert_eq!(flip_viewport(vp, 100, 200), Some((0.0, 150.0, 100.0, 50.0)));

        let vp = ViewportRect { x: 10, y: 150, width: 20, height: 50 };
        assert_eq!(flip_viewport(vp, 100, 200), Some((10.0, 0.0, 20.0, 50.0)));
    }

    #[test]
    fn viewport_is_clipped_to_target() {
        let vp = ViewportRect { x: -10, y: 0, width: 50, height: 300 };
        assert_eq!(flip_viewport(vp, 100, 200), Some((0.0, 0.0, 40.0, 200.0)));

        let off = ViewportRect { x: 120, y: 0, width: 10, height: 10 };
        assert_eq!(flip_viewport(off, 100, 200), None);
    }
}
