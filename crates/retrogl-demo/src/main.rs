//! Spinning cubes drawn from display lists over a textured floor, with fog
//! and click-to-pick through selection mode.

use retrogl_engine::core::{App, AppControl, FrameCtx};
use retrogl_engine::device::{GpuInit, WgpuBackend};
use retrogl_engine::gl::types::*;
use retrogl_engine::gl::{GlContext, error_string};
use retrogl_engine::logging::{LoggingConfig, init_logging};
use retrogl_engine::window::{Runtime, RuntimeConfig};

use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::window::WindowId;

const CUBES: [(u32, [f32; 3]); 3] = [
    (1, [-2.5, 0.0, -8.0]),
    (2, [0.0, 0.0, -10.0]),
    (3, [2.5, 0.0, -8.0]),
];

/// Ribbon drawn through client arrays: `C3F_V3F` records.
const RIBBON_SEGMENTS: usize = 24;

#[derive(Default)]
struct Demo {
    cube_list: u32,
    floor_list: u32,
    checker: u32,
    ribbon: Vec<f32>,
    cursor: (f64, f64),
    pending_pick: Option<(i32, i32)>,
    selected: Option<u32>,
}

impl Demo {
    fn build_cube(gl: &mut GlContext<WgpuBackend>, id: u32) {
        let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
            ([1.0, 0.2, 0.2], [[-1., -1., 1.], [1., -1., 1.], [1., 1., 1.], [-1., 1., 1.]]),
            ([0.2, 1.0, 0.2], [[1., -1., -1.], [-1., -1., -1.], [-1., 1., -1.], [1., 1., -1.]]),
            ([0.2, 0.2, 1.0], [[-1., 1., 1.], [1., 1., 1.], [1., 1., -1.], [-1., 1., -1.]]),
            ([1.0, 1.0, 0.2], [[-1., -1., -1.], [1., -1., -1.], [1., -1., 1.], [-1., -1., 1.]]),
            ([1.0, 0.2, 1.0], [[1., -1., 1.], [1., -1., -1.], [1., 1., -1.], [1., 1., 1.]]),
            ([0.2, 1.0, 1.0], [[-1., -1., -1.], [-1., -1., 1.], [-1., 1., 1.], [-1., 1., -1.]]),
        ];

        gl.new_list(id, GL_COMPILE);
        gl.begin(GL_QUADS);
        for (color, corners) in faces {
            gl.color3f(color[0], color[1], color[2]);
            for [x, y, z] in corners {
                gl.vertex3f(x * 0.8, y * 0.8, z * 0.8);
            }
        }
        gl.end();
        gl.end_list();
    }

    fn build_floor(gl: &mut GlContext<WgpuBackend>, id: u32, texture: u32) {
        gl.new_list(id, GL_COMPILE);
        gl.bind_texture(GL_TEXTURE_2D, texture);
        gl.begin(GL_QUADS);
        gl.color3f(1.0, 1.0, 1.0);
        for (s, t, x, z) in [(0.0, 0.0, -20.0, 0.0), (8.0, 0.0, 20.0, 0.0), (8.0, 8.0, 20.0, -40.0), (0.0, 8.0, -20.0, -40.0)] {
            gl.tex_coord2f(s, t);
            gl.vertex3f(x, -1.5, z);
        }
        gl.end();
        gl.end_list();
    }

    fn build_ribbon() -> Vec<f32> {
        let mut data = Vec::with_capacity((RIBBON_SEGMENTS + 1) * 2 * 6);
        for i in 0..=RIBBON_SEGMENTS {
            let t = i as f32 / RIBBON_SEGMENTS as f32;
            let angle = t * std::f32::consts::TAU;
            let (x, z) = (angle.cos() * 5.0, angle.sin() * 2.0 - 9.0);
            let color = [t, 0.5, 1.0 - t];
            data.extend_from_slice(&color);
            data.extend_from_slice(&[x, 2.2, z]);
            data.extend_from_slice(&color);
            data.extend_from_slice(&[x, 2.6, z]);
        }
        data
    }

    fn draw_scene(&self, gl: &mut GlContext<WgpuBackend>, elapsed: f32) {
        gl.matrix_mode(GL_MODELVIEW);
        gl.load_identity();

        gl.enable(GL_TEXTURE_2D);
        gl.bind_texture(GL_TEXTURE_2D, self.checker);
        gl.load_name(0);
        gl.call_list(self.floor_list);
        gl.disable(GL_TEXTURE_2D);

        for (name, [x, y, z]) in CUBES {
            gl.push_matrix();
            gl.translatef(x, y, z);
            gl.rotatef(elapsed * 40.0 + name as f32 * 30.0, 0.3, 1.0, 0.1);
            if self.selected == Some(name) {
                gl.scalef(1.25, 1.25, 1.25);
            }
            gl.load_name(name);
            gl.call_list(self.cube_list);
            gl.pop_matrix();
        }

        // Both sides of the ribbon are visible.
        gl.disable(GL_CULL_FACE);
        gl.load_name(0);
        gl.interleaved_arrays(GL_C3F_V3F, 0, &self.ribbon);
        gl.draw_arrays(GL_TRIANGLE_STRIP, 0, ((RIBBON_SEGMENTS + 1) * 2) as i32);
        gl.disable_client_state(GL_VERTEX_ARRAY);
        gl.disable_client_state(GL_COLOR_ARRAY);
        gl.enable(GL_CULL_FACE);
    }

    fn pick(&mut self, gl: &mut GlContext<WgpuBackend>, cursor: (i32, i32), elapsed: f32) {
        gl.select_buffer(16);
        gl.set_pick_cursor(cursor.0, cursor.1);
        gl.render_mode(GL_SELECT);
        gl.init_names();
        gl.push_name(0);
        self.draw_scene(gl, elapsed);
        let hits = gl.render_mode(GL_RENDER);

        // One record: [name count, min depth, max depth, names...].
        let data = gl.select_buffer_data();
        self.selected = if hits > 0 && data.len() >= 4 && data[3] != 0 {
            Some(data[3])
        } else {
            None
        };
        log::info!("pick at {cursor:?}: {hits} hit(s), selected {:?}", self.selected);
    }
}

fn checkerboard(size: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let v = if (x / 8 + y / 8) % 2 == 0 { 230 } else { 70 };
            pixels.extend_from_slice(&[v, v, v, 255]);
        }
    }
    pixels
}

impl App for Demo {
    fn on_init(&mut self, _window_id: WindowId, gl: &mut GlContext<WgpuBackend>) -> anyhow::Result<()> {
        let texture = gl
            .backend_mut()
            .create_texture_rgba8(64, 64, &checkerboard(64))?;
        self.checker = texture.0;
        gl.bind_texture(GL_TEXTURE_2D, self.checker);
        gl.tex_parameteri(GL_TEXTURE_2D, GL_TEXTURE_MAG_FILTER, GL_NEAREST as i32);

        let base = gl.gen_lists(2);
        anyhow::ensure!(base != 0, "no display list names available");
        self.cube_list = base;
        self.floor_list = base + 1;
        Self::build_cube(gl, self.cube_list);
        Self::build_floor(gl, self.floor_list, self.checker);
        self.ribbon = Self::build_ribbon();

        gl.enable(GL_DEPTH_TEST);
        gl.enable(GL_CULL_FACE);
        gl.enable(GL_FOG);
        gl.fog_i(GL_FOG_MODE, GL_LINEAR as i32);
        gl.fog_f(GL_FOG_START, 8.0);
        gl.fog_f(GL_FOG_END, 40.0);
        gl.fog_fv(GL_FOG_COLOR, &[0.08, 0.09, 0.12, 1.0]);
        gl.clear_color(0.08, 0.09, 0.12, 1.0);

        match gl.get_error() {
            GL_NO_ERROR => Ok(()),
            code => anyhow::bail!("setup left error {}", error_string(code)),
        }
    }

    fn on_window_event(&mut self, _window_id: WindowId, event: &WindowEvent) -> AppControl {
        match event {
            WindowEvent::CursorMoved { position, .. } => self.cursor = (position.x, position.y),
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => self.pending_pick = Some((self.cursor.0 as i32, self.cursor.1 as i32)),
            _ => {}
        }
        AppControl::Continue
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_>) -> AppControl {
        let aspect = ctx.fit_viewport();
        let elapsed = ctx.time.elapsed;
        let gl = &mut *ctx.gl;

        gl.matrix_mode(GL_PROJECTION);
        gl.load_identity();
        gl.perspective(60.0, aspect, 0.5, 100.0);

        if let Some(cursor) = self.pending_pick.take() {
            self.pick(gl, cursor, elapsed);
        }

        gl.clear(GL_COLOR_BUFFER_BIT | GL_DEPTH_BUFFER_BIT);
        self.draw_scene(gl, elapsed);

        let err = gl.get_error();
        if err != GL_NO_ERROR {
            log::warn!("frame {}: {}", ctx.time.frame_index, error_string(err));
        }
        AppControl::Continue
    }
}

fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default());

    let config = RuntimeConfig {
        title: "retrogl demo".to_string(),
        ..RuntimeConfig::default()
    };
    Runtime::run(config, GpuInit::default(), Demo::default())
}
