use std::collections::HashMap;

use anyhow::{bail, Context};
use glam::{Mat4, Vec4};

use super::*;

/// One call made against a [`RecordingBackend`], in issue order.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CompileProgram(ProgramKind, ProgramId),
    UseProgram(ProgramId),
    CreateBuffer(BufferKind, BufferId),
    UploadVertices {
        buffer: BufferId,
        floats: usize,
        usage: BufferUsage,
    },
    UploadIndices {
        buffer: BufferId,
        indices: usize,
        usage: BufferUsage,
    },
    DeleteBuffer(BufferId),
    SetUniforms,
    SetRasterState(RasterState),
    DrawArrays(ArrayDraw),
    DrawIndexed(IndexedDraw),
    CreateFramebuffer {
        framebuffer: FramebufferId,
        width: u32,
        height: u32,
    },
    DeleteFramebuffer(FramebufferId),
    BindFramebuffer(Option<FramebufferId>),
    Clear(ClearRequest),
    ReadPixel {
        x: i32,
        y: i32,
    },
    BindTexture(Option<TextureHandle>),
    TextureParameter(TextureHandle, TextureParameter),
    SetViewport(ViewportRect),
    Flush,
}

/// A draw as the GPU would have seen it: the state in effect plus the vertex
/// records actually fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub program: Option<ProgramKind>,
    pub framebuffer: Option<FramebufferId>,
    pub texture: Option<TextureHandle>,
    pub buffer: BufferId,
    pub topology: DrawTopology,
    pub layout: VertexLayout,
    pub indexed: bool,
    /// Fetched records in issue order, `stride_bytes / 4` floats each.
    pub vertices: Vec<Vec<f32>>,
    pub uniforms: ShaderUniforms,
    pub raster: RasterState,
}

impl DrawRecord {
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Position of fetched vertex `i` (z = 0 for 2D layouts).
    pub fn position(&self, i: usize) -> [f32; 3] {
        read_position(&self.vertices[i], &self.layout)
    }

    /// RGB of fetched vertex `i`, if the layout carries colour.
    pub fn color(&self, i: usize) -> Option<[f32; 3]> {
        let slot = self.layout.color?;
        let o = (slot.offset_bytes / 4) as usize;
        let v = &self.vertices[i];
        Some([v[o], v[o + 1], v[o + 2]])
    }
}

struct SoftFramebuffer {
    width: u32,
    height: u32,
    /// Row 0 is the bottom row.
    color: Vec<[u8; 4]>,
    depth: Vec<f32>,
}

impl SoftFramebuffer {
    fn new(width: u32, height: u32) -> Self {
        let n = (width * height) as usize;
        Self {
            width,
            height,
            color: vec![[0, 0, 0, 0]; n],
            depth: vec![1.0; n],
        }
    }
}

/// CPU-only [`GpuBackend`].
///
/// Records every call and every draw, keeps buffer contents, and rasterizes
/// triangles drawn into off-screen framebuffers with a flat colour (the pick
/// colour under the picking program, the current colour otherwise) and an
/// optional depth test. Reading back from the main target is an error.
#[derive(Default)]
pub struct RecordingBackend {
    calls: Vec<BackendCall>,
    draws: Vec<DrawRecord>,

    next_id: u32,
    programs: HashMap<ProgramId, ProgramKind>,
    vertex_buffers: HashMap<BufferId, Vec<f32>>,
    index_buffers: HashMap<BufferId, Vec<u32>>,
    framebuffers: HashMap<FramebufferId, SoftFramebuffer>,

    program: Option<ProgramId>,
    framebuffer: Option<FramebufferId>,
    texture: Option<TextureHandle>,
    uniforms: ShaderUniforms,
    raster: RasterState,
    viewport: ViewportRect,

    fail_buffer_creation: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// Forgets recorded calls and draws; resources and bindings stay.
    pub fn clear_log(&mut self) {
        self.calls.clear();
        self.draws.clear();
    }

    pub fn vertex_data(&self, buffer: BufferId) -> Option<&[f32]> {
        self.vertex_buffers.get(&buffer).map(Vec::as_slice)
    }

    pub fn index_data(&self, buffer: BufferId) -> Option<&[u32]> {
        self.index_buffers.get(&buffer).map(Vec::as_slice)
    }

    /// Number of live vertex and index buffers.
    pub fn live_buffers(&self) -> usize {
        self.vertex_buffers.len() + self.index_buffers.len()
    }

    pub fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.framebuffer
    }

    pub fn active_program(&self) -> Option<ProgramKind> {
        self.program.and_then(|p| self.programs.get(&p).copied())
    }

    pub fn viewport(&self) -> ViewportRect {
        self.viewport
    }

    /// Makes subsequent `create_buffer` calls fail.
    pub fn set_fail_buffer_creation(&mut self, fail: bool) {
        self.fail_buffer_creation = fail;
    }

    fn alloc_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn record_draw(
        &mut self,
        buffer: BufferId,
        layout: VertexLayout,
        topology: DrawTopology,
        indexed: bool,
        fetch: impl Iterator<Item = i64>,
    ) {
        let stride = (layout.stride_bytes / 4) as usize;
        let data = self.vertex_buffers.get(&buffer);

        let mut vertices = Vec::new();
        for i in fetch {
            let start = i as usize * stride;
            let record = data
                .filter(|_| i >= 0 && stride > 0)
                .and_then(|d| d.get(start..start + stride));
            match record {
                Some(r) => vertices.push(r.to_vec()),
                None => log::debug!("draw fetched vertex {i} outside buffer {buffer:?}"),
            }
        }

        let record = DrawRecord {
            program: self.active_program(),
            framebuffer: self.framebuffer,
            texture: self.texture,
            buffer,
            topology,
            layout,
            indexed,
            vertices,
            uniforms: self.uniforms,
            raster: self.raster,
        };

        if self.framebuffer.is_some() {
            self.rasterize(&record);
        }
        self.draws.push(record);
    }

    // ── software raster ────────────────────────────────────────────────────

    fn rasterize(&mut self, draw: &DrawRecord) {
        let triangles: Vec<[usize; 3]> = match draw.topology {
            DrawTopology::Triangles => (0..draw.vertex_count() / 3)
                .map(|t| [t * 3, t * 3 + 1, t * 3 + 2])
                .collect(),
            DrawTopology::TriangleStrip => (0..draw.vertex_count().saturating_sub(2))
                .map(|t| [t, t + 1, t + 2])
                .collect(),
            _ => return,
        };

        let vp = self.viewport;
        let Some(fb) = self.framebuffer.and_then(|id| self.framebuffers.get_mut(&id)) else {
            return;
        };

        let mvp = Mat4::from_cols_array_2d(&draw.uniforms.projection)
            * Mat4::from_cols_array_2d(&draw.uniforms.modelview);
        let rgba = if draw.program == Some(ProgramKind::Picking) {
            draw.uniforms.pick_color
        } else {
            draw.uniforms.current_color
        };
        let color = rgba.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);

        let to_window = |i: usize| -> Option<[f32; 3]> {
            let [x, y, z] = draw.position(i);
            let clip = mvp * Vec4::new(x, y, z, 1.0);
            if clip.w.abs() < 1e-6 {
                return None;
            }
            let ndc = clip.truncate() / clip.w;
            Some([
                vp.x as f32 + (ndc.x + 1.0) * 0.5 * vp.width as f32,
                vp.y as f32 + (ndc.y + 1.0) * 0.5 * vp.height as f32,
                (ndc.z + 1.0) * 0.5,
            ])
        };

        for [a, b, c] in triangles {
            let (Some(s0), Some(s1), Some(s2)) = (to_window(a), to_window(b), to_window(c)) else {
                continue;
            };
            fill_triangle(fb, &draw.raster, color, s0, s1, s2);
        }
    }
}

fn read_position(record: &[f32], layout: &VertexLayout) -> [f32; 3] {
    let o = (layout.position.offset_bytes / 4) as usize;
    let z = if layout.position.components >= 3 { record[o + 2] } else { 0.0 };
    [record[o], record[o + 1], z]
}

fn edge(a: [f32; 3], b: [f32; 3], px: f32, py: f32) -> f32 {
    (b[0] - a[0]) * (py - a[1]) - (b[1] - a[1]) * (px - a[0])
}

fn fill_triangle(
    fb: &mut SoftFramebuffer,
    raster: &RasterState,
    color: [u8; 4],
    s0: [f32; 3],
    s1: [f32; 3],
    s2: [f32; 3],
) {
    let area = edge(s0, s1, s2[0], s2[1]);
    if area.abs() < 1e-6 {
        return;
    }

    let min_x = s0[0].min(s1[0]).min(s2[0]).floor().max(0.0) as i64;
    let max_x = (s0[0].max(s1[0]).max(s2[0]).ceil() as i64).min(fb.width as i64 - 1);
    let min_y = s0[1].min(s1[1]).min(s2[1]).floor().max(0.0) as i64;
    let max_y = (s0[1].max(s1[1]).max(s2[1]).ceil() as i64).min(fb.height as i64 - 1);

    for py in min_y..=max_y {
        for px in min_x..=max_x {
            let (cx, cy) = (px as f32 + 0.5, py as f32 + 0.5);
            // Normalized so both windings are accepted.
            let w0 = edge(s1, s2, cx, cy) / area;
            let w1 = edge(s2, s0, cx, cy) / area;
            let w2 = edge(s0, s1, cx, cy) / area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }

            let z = w0 * s0[2] + w1 * s1[2] + w2 * s2[2];
            let idx = (py as u32 * fb.width + px as u32) as usize;
            if raster.depth_test {
                if !raster.depth_func.passes(z, fb.depth[idx]) {
                    continue;
                }
                fb.depth[idx] = z;
            }
            fb.color[idx] = color;
        }
    }
}

impl GpuBackend for RecordingBackend {
    fn compile_program(&mut self, kind: ProgramKind) -> anyhow::Result<ProgramId> {
        let id = ProgramId(self.alloc_id());
        self.programs.insert(id, kind);
        self.calls.push(BackendCall::CompileProgram(kind, id));
        Ok(id)
    }

    fn use_program(&mut self, program: ProgramId) {
        self.program = Some(program);
        self.calls.push(BackendCall::UseProgram(program));
    }

    fn create_buffer(&mut self, kind: BufferKind) -> anyhow::Result<BufferId> {
        if self.fail_buffer_creation {
            bail!("buffer allocation refused");
        }
        let id = BufferId(self.alloc_id());
        match kind {
            BufferKind::Vertex => {
                self.vertex_buffers.insert(id, Vec::new());
            }
            BufferKind::Index => {
                self.index_buffers.insert(id, Vec::new());
            }
        }
        self.calls.push(BackendCall::CreateBuffer(kind, id));
        Ok(id)
    }

    fn upload_vertices(&mut self, buffer: BufferId, data: &[f32], usage: BufferUsage) {
        if let Some(dst) = self.vertex_buffers.get_mut(&buffer) {
            dst.clear();
            dst.extend_from_slice(data);
        } else {
            log::debug!("upload to unknown vertex buffer {buffer:?}");
        }
        self.calls.push(BackendCall::UploadVertices {
            buffer,
            floats: data.len(),
            usage,
        });
    }

    fn upload_indices(&mut self, buffer: BufferId, data: &[u32], usage: BufferUsage) {
        if let Some(dst) = self.index_buffers.get_mut(&buffer) {
            dst.clear();
            dst.extend_from_slice(data);
        } else {
            log::debug!("upload to unknown index buffer {buffer:?}");
        }
        self.calls.push(BackendCall::UploadIndices {
            buffer,
            indices: data.len(),
            usage,
        });
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.vertex_buffers.remove(&buffer);
        self.index_buffers.remove(&buffer);
        self.calls.push(BackendCall::DeleteBuffer(buffer));
    }

    fn set_uniforms(&mut self, uniforms: &ShaderUniforms) {
        self.uniforms = *uniforms;
        self.calls.push(BackendCall::SetUniforms);
    }

    fn set_raster_state(&mut self, state: &RasterState) {
        self.raster = *state;
        self.calls.push(BackendCall::SetRasterState(*state));
    }

    fn draw_arrays(&mut self, draw: &ArrayDraw) {
        self.calls.push(BackendCall::DrawArrays(*draw));
        let range = draw.first as i64..(draw.first as i64 + draw.count as i64);
        self.record_draw(draw.buffer, draw.layout, draw.topology, false, range);
    }

    fn draw_indexed(&mut self, draw: &IndexedDraw) {
        self.calls.push(BackendCall::DrawIndexed(*draw));
        let indices: Vec<i64> = self
            .index_buffers
            .get(&draw.index_buffer)
            .map(|ib| {
                let start = draw.first_index as usize;
                let end = (start + draw.index_count as usize).min(ib.len());
                ib.get(start..end)
                    .unwrap_or_default()
                    .iter()
                    .map(|&i| i as i64 + draw.base_vertex as i64)
                    .collect()
            })
            .unwrap_or_default();
        self.record_draw(draw.buffer, draw.layout, draw.topology, true, indices.into_iter());
    }

    fn create_framebuffer(&mut self, width: u32, height: u32) -> anyhow::Result<FramebufferId> {
        anyhow::ensure!(width > 0 && height > 0, "framebuffer has zero size");
        let id = FramebufferId(self.alloc_id());
        self.framebuffers.insert(id, SoftFramebuffer::new(width, height));
        self.calls.push(BackendCall::CreateFramebuffer {
            framebuffer: id,
            width,
            height,
        });
        Ok(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer);
        if self.framebuffer == Some(framebuffer) {
            self.framebuffer = None;
        }
        self.calls.push(BackendCall::DeleteFramebuffer(framebuffer));
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.framebuffer = framebuffer;
        self.calls.push(BackendCall::BindFramebuffer(framebuffer));
    }

    fn clear(&mut self, request: &ClearRequest) {
        self.calls.push(BackendCall::Clear(*request));
        let Some(fb) = self.framebuffer.and_then(|id| self.framebuffers.get_mut(&id)) else {
            return;
        };
        if let Some(c) = request.color {
            let rgba = c.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8);
            fb.color.fill(rgba);
        }
        if let Some(d) = request.depth {
            fb.depth.fill(d.clamp(0.0, 1.0));
        }
    }

    fn read_pixel(&mut self, x: i32, y: i32) -> anyhow::Result<[u8; 4]> {
        self.calls.push(BackendCall::ReadPixel { x, y });
        let id = self
            .framebuffer
            .context("read_pixel needs an off-screen framebuffer bound")?;
        let fb = self
            .framebuffers
            .get(&id)
            .with_context(|| format!("framebuffer {id:?} was deleted"))?;
        if x < 0 || y < 0 || x as u32 >= fb.width || y as u32 >= fb.height {
            bail!("pixel ({x}, {y}) outside {}x{} framebuffer", fb.width, fb.height);
        }
        Ok(fb.color[(y as u32 * fb.width + x as u32) as usize])
    }

    fn bind_texture(&mut self, texture: Option<TextureHandle>) {
        self.texture = texture;
        self.calls.push(BackendCall::BindTexture(texture));
    }

    fn texture_parameter(&mut self, texture: TextureHandle, parameter: TextureParameter) {
        self.calls.push(BackendCall::TextureParameter(texture, parameter));
    }

    fn set_viewport(&mut self, viewport: ViewportRect) {
        self.viewport = viewport;
        self.calls.push(BackendCall::SetViewport(viewport));
    }

    fn flush(&mut self) {
        self.calls.push(BackendCall::Flush);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v3f_layout() -> VertexLayout {
        VertexLayout {
            stride_bytes: 12,
            position: AttributeSlot { offset_bytes: 0, components: 3 },
            color: None,
            texcoord: None,
        }
    }

    #[test]
    fn indexed_draw_resolves_indices_with_base_vertex() {
        let mut b = RecordingBackend::new();
        let vb = b.create_buffer(BufferKind::Vertex).unwrap();
        let ib = b.create_buffer(BufferKind::Index).unwrap();
        b.upload_vertices(vb, &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0], BufferUsage::Static);
        b.upload_indices(ib, &[1, 0], BufferUsage::Static);
        b.draw_indexed(&IndexedDraw {
            buffer: vb,
            index_buffer: ib,
            layout: v3f_layout(),
            topology: DrawTopology::Lines,
            first_index: 0,
            index_count: 2,
            base_vertex: 1,
        });
        let d = &b.draws()[0];
        assert_eq!(d.vertex_count(), 2);
        assert_eq!(d.position(0), [2.0, 2.0, 2.0]);
        assert_eq!(d.position(1), [1.0, 1.0, 1.0]);
    }

    #[test]
    fn triangle_covering_viewport_fills_framebuffer() {
        let mut b = RecordingBackend::new();
        let picking = b.compile_program(ProgramKind::Picking).unwrap();
        b.use_program(picking);
        let fb = b.create_framebuffer(4, 4).unwrap();
        b.bind_framebuffer(Some(fb));
        b.set_viewport(ViewportRect { x: 0, y: 0, width: 4, height: 4 });
        b.clear(&ClearRequest { color: Some([0.0, 0.0, 0.0, 1.0]), depth: Some(1.0) });

        let mut u = ShaderUniforms::default();
        u.pick_color = [7.0 / 255.0, 0.0, 0.0, 1.0];
        b.set_uniforms(&u);

        let vb = b.create_buffer(BufferKind::Vertex).unwrap();
        b.upload_vertices(
            vb,
            &[-3.0, -1.0, 0.0, 3.0, -1.0, 0.0, 0.0, 3.0, 0.0],
            BufferUsage::Dynamic,
        );
        b.draw_arrays(&ArrayDraw {
            buffer: vb,
            layout: v3f_layout(),
            topology: DrawTopology::Triangles,
            first: 0,
            count: 3,
        });

        assert_eq!(b.read_pixel(0, 0).unwrap(), [7, 0, 0, 255]);
        assert_eq!(b.read_pixel(3, 3).unwrap(), [7, 0, 0, 255]);
    }

    #[test]
    fn read_pixel_on_main_target_fails() {
        let mut b = RecordingBackend::new();
        assert!(b.read_pixel(0, 0).is_err());
    }

    #[test]
    fn refused_buffer_creation_is_an_error() {
        let mut b = RecordingBackend::new();
        b.set_fail_buffer_creation(true);
        assert!(b.create_buffer(BufferKind::Vertex).is_err());
        assert_eq!(b.live_buffers(), 0);
    }
}
