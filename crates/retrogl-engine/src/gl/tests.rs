use crate::backend::{BackendCall, DrawTopology, ProgramKind, RecordingBackend, TextureHandle};

use super::state::Capability;
use super::types::*;
use super::{encode_pick_id, ContextConfig, GlContext, HIT_MAX_DEPTH};

fn context() -> GlContext<RecordingBackend> {
    GlContext::create(RecordingBackend::new(), ContextConfig::default()).unwrap()
}

fn small_context(size: u32) -> GlContext<RecordingBackend> {
    let config = ContextConfig {
        viewport_width: size,
        viewport_height: size,
        ..ContextConfig::default()
    };
    GlContext::create(RecordingBackend::new(), config).unwrap()
}

fn red_quad(gl: &mut GlContext<RecordingBackend>) {
    gl.begin(GL_QUADS);
    gl.color3f(1.0, 0.0, 0.0);
    gl.vertex3f(0.0, 0.0, 0.0);
    gl.vertex3f(1.0, 0.0, 0.0);
    gl.vertex3f(1.0, 1.0, 0.0);
    gl.vertex3f(0.0, 1.0, 0.0);
    gl.end();
}

/// A quad covering all of clip space under identity matrices.
fn full_screen_quad(gl: &mut GlContext<RecordingBackend>) {
    gl.begin(GL_QUADS);
    gl.vertex2f(-1.0, -1.0);
    gl.vertex2f(1.0, -1.0);
    gl.vertex2f(1.0, 1.0);
    gl.vertex2f(-1.0, 1.0);
    gl.end();
}

fn draw_calls(gl: &GlContext<RecordingBackend>) -> usize {
    gl.backend()
        .calls()
        .iter()
        .filter(|c| matches!(c, BackendCall::DrawArrays(_) | BackendCall::DrawIndexed(_)))
        .count()
}

// ── immediate mode ─────────────────────────────────────────────────────────

#[test]
fn triangles_issue_one_gpu_vertex_per_vertex_call() {
    let mut gl = context();
    gl.begin(GL_TRIANGLES);
    for i in 0..9 {
        gl.vertex3f(i as f32, 0.0, 0.0);
    }
    gl.end();

    let draws = gl.backend().draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].vertex_count(), 9);
    assert_eq!(draws[0].topology, DrawTopology::Triangles);
}

#[test]
fn quads_expand_to_six_vertices_each_with_full_records() {
    let mut gl = context();
    gl.begin(GL_QUADS);
    for i in 0..8 {
        gl.color3f(i as f32 / 8.0, 0.5, 0.25);
        gl.vertex3f(i as f32, 1.0, 2.0);
    }
    gl.end();

    let draw = &gl.backend().draws()[0];
    assert_eq!(draw.vertex_count(), 12);
    for quad in 0..2 {
        let t = quad * 6;
        assert_eq!(draw.vertices[t + 3], draw.vertices[t]);
        assert_eq!(draw.vertices[t + 4], draw.vertices[t + 2]);
    }
    assert_eq!(draw.color(5), Some([3.0 / 8.0, 0.5, 0.25]));
    assert_eq!(draw.position(5), [3.0, 1.0, 2.0]);
}

#[test]
fn begin_twice_and_stray_end_are_invalid_operations() {
    let mut gl = context();
    gl.end();
    assert_eq!(gl.get_error(), GL_INVALID_OPERATION);

    gl.begin(GL_POINTS);
    gl.begin(GL_LINES);
    assert_eq!(gl.get_error(), GL_INVALID_OPERATION);
    gl.vertex2f(0.0, 0.0);
    gl.end();
    assert_eq!(gl.backend().draws()[0].topology, DrawTopology::Points);
}

#[test]
fn line_loop_closes_back_to_first_vertex() {
    let mut gl = context();
    gl.begin(GL_LINE_LOOP);
    gl.vertex2f(0.0, 0.0);
    gl.vertex2f(1.0, 0.0);
    gl.vertex2f(1.0, 1.0);
    gl.end();

    let draw = &gl.backend().draws()[0];
    assert_eq!(draw.topology, DrawTopology::LineStrip);
    assert_eq!(draw.vertex_count(), 4);
    assert_eq!(draw.position(3), draw.position(0));
}

// ── errors ─────────────────────────────────────────────────────────────────

#[test]
fn error_register_keeps_latest_and_clears_on_read() {
    let mut gl = context();
    gl.begin(0x1234);
    gl.pop_matrix();
    assert_eq!(gl.get_error(), GL_INVALID_OPERATION);
    assert_eq!(gl.get_error(), GL_NO_ERROR);
}

#[test]
fn matrix_underflow_leaves_stack_untouched() {
    let mut gl = context();
    gl.translatef(1.0, 2.0, 3.0);
    gl.pop_matrix();
    assert_eq!(gl.pending_error(), Some(super::GlError::InvalidOperation));

    let mut m = [0.0; 16];
    gl.get_float_v(GL_MODELVIEW_MATRIX, &mut m);
    assert_eq!(&m[12..], &[1.0, 2.0, 3.0, 1.0]);
}

#[test]
fn too_small_query_output_is_invalid_value() {
    let mut gl = context();
    let mut out = [0.0; 4];
    gl.get_float_v(GL_PROJECTION_MATRIX, &mut out);
    assert_eq!(gl.get_error(), GL_INVALID_VALUE);
    gl.get_float_v(0xDEAD, &mut out);
    assert_eq!(gl.get_error(), GL_INVALID_ENUM);
}

// ── display lists ──────────────────────────────────────────────────────────

#[test]
fn compile_only_issues_no_draws_and_keeps_current_color() {
    let mut gl = context();
    gl.new_list(1, GL_COMPILE);
    red_quad(&mut gl);
    gl.end_list();

    assert_eq!(draw_calls(&gl), 0);
    assert!(gl.is_list(1));

    let mut color = [0.0; 4];
    gl.get_float_v(GL_CURRENT_COLOR, &mut color);
    assert_eq!(color, [1.0; 4]);
}

#[test]
fn compiled_quad_list_is_one_draw_of_six_color_position_vertices() {
    let mut gl = context();
    gl.new_list(1, GL_COMPILE);
    red_quad(&mut gl);
    gl.end_list();
    gl.call_list(1);

    let draws = gl.backend().draws();
    assert_eq!(draws.len(), 1);
    let draw = &draws[0];
    assert_eq!(draw.vertex_count(), 6);
    assert_eq!(draw.topology, DrawTopology::Triangles);
    assert!(draw.layout.color.is_some());
    assert!(draw.layout.texcoord.is_none());
    assert_eq!(draw.layout.stride_bytes, 24);
    assert_eq!(draw.color(4), Some([1.0, 0.0, 0.0]));
}

#[test]
fn compile_and_execute_matches_immediate_output() {
    let mut listed = context();
    listed.new_list(1, GL_COMPILE_AND_EXECUTE);
    red_quad(&mut listed);
    listed.end_list();

    let mut direct = context();
    red_quad(&mut direct);

    let a = listed.backend().draws();
    let b = direct.backend().draws();
    assert_eq!(a.len(), 1);
    assert_eq!(a.len(), b.len());
    assert_eq!(a[0].vertices, b[0].vertices);
    assert_eq!(a[0].topology, b[0].topology);
    assert_eq!(a[0].layout, b[0].layout);
    assert_eq!(a[0].uniforms, b[0].uniforms);
}

#[test]
fn calling_a_list_twice_is_bit_identical() {
    let mut gl = context();
    gl.new_list(1, GL_COMPILE);
    red_quad(&mut gl);
    gl.end_list();

    gl.call_list(1);
    gl.translatef(5.0, 0.0, 0.0);
    gl.call_list(1);

    let draws = gl.backend().draws();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].buffer, draws[1].buffer);
    assert_eq!(draws[0].vertices, draws[1].vertices);
    assert_ne!(draws[0].uniforms.modelview, draws[1].uniforms.modelview);
}

#[test]
fn gen_lists_returns_disjoint_ranges() {
    let mut gl = context();
    assert_eq!(gl.gen_lists(3), 1);
    assert_eq!(gl.gen_lists(2), 4);
    assert_eq!(gl.gen_lists(0), 0);
    gl.gen_lists(-1);
    assert_eq!(gl.get_error(), GL_INVALID_VALUE);
}

#[test]
fn list_lifecycle_errors() {
    let mut gl = context();
    gl.new_list(0, GL_COMPILE);
    assert_eq!(gl.get_error(), GL_INVALID_VALUE);
    gl.new_list(1, GL_TRIANGLES);
    assert_eq!(gl.get_error(), GL_INVALID_ENUM);
    gl.end_list();
    assert_eq!(gl.get_error(), GL_INVALID_OPERATION);

    gl.new_list(1, GL_COMPILE);
    gl.new_list(2, GL_COMPILE);
    assert_eq!(gl.get_error(), GL_INVALID_OPERATION);

    let mut out = [0; 2];
    gl.get_integer_v(GL_LIST_INDEX, &mut out[..1]);
    gl.get_integer_v(GL_LIST_MODE, &mut out[1..]);
    assert_eq!(out, [1, GL_COMPILE as i32]);
}

#[test]
fn failed_upload_reports_out_of_memory_and_can_retry() {
    let mut gl = context();
    gl.new_list(1, GL_COMPILE);
    red_quad(&mut gl);

    gl.backend_mut().set_fail_buffer_creation(true);
    gl.end_list();
    assert_eq!(gl.get_error(), GL_OUT_OF_MEMORY);
    assert!(!gl.is_list(1));

    gl.backend_mut().set_fail_buffer_creation(false);
    gl.end_list();
    assert_eq!(gl.get_error(), GL_NO_ERROR);
    assert!(gl.is_list(1));
    gl.call_list(1);
    assert_eq!(gl.backend().draws()[0].vertex_count(), 6);
}

#[test]
fn recompiling_and_deleting_release_buffers() {
    let mut gl = context();
    let baseline = gl.backend().live_buffers();

    gl.new_list(1, GL_COMPILE);
    red_quad(&mut gl);
    gl.end_list();
    let with_list = gl.backend().live_buffers();
    assert!(with_list > baseline);

    gl.new_list(1, GL_COMPILE);
    red_quad(&mut gl);
    gl.end_list();
    assert_eq!(gl.backend().live_buffers(), with_list);

    gl.delete_lists(1, 1);
    assert!(!gl.is_list(1));
    assert_eq!(gl.backend().live_buffers(), baseline);
}

#[test]
fn matrix_commands_inside_a_list_execute_immediately() {
    let mut gl = context();
    gl.new_list(1, GL_COMPILE);
    gl.translatef(0.0, 0.0, -4.0);
    gl.end_list();

    let mut m = [0.0; 16];
    gl.get_float_v(GL_MODELVIEW_MATRIX, &mut m);
    assert_eq!(m[14], -4.0);

    gl.load_identity();
    gl.call_list(1);
    gl.get_float_v(GL_MODELVIEW_MATRIX, &mut m);
    assert_eq!(m[14], 0.0);
}

#[test]
fn list_state_is_replayed_only_when_configured() {
    for replay in [false, true] {
        let config = ContextConfig {
            replay_list_state: replay,
            ..ContextConfig::default()
        };
        let mut gl = GlContext::create(RecordingBackend::new(), config).unwrap();
        gl.new_list(1, GL_COMPILE);
        gl.enable(GL_FOG);
        red_quad(&mut gl);
        gl.end_list();

        assert!(!gl.fixed_state().is_enabled(Capability::Fog));
        gl.call_list(1);
        assert_eq!(gl.fixed_state().is_enabled(Capability::Fog), replay);
    }
}

#[test]
fn list_without_a_bind_draws_with_the_call_time_texture() {
    let mut gl = context();
    gl.bind_texture(GL_TEXTURE_2D, 3);
    gl.new_list(1, GL_COMPILE);
    red_quad(&mut gl);
    gl.end_list();

    gl.bind_texture(GL_TEXTURE_2D, 5);
    gl.call_list(1);
    gl.bind_texture(GL_TEXTURE_2D, 0);
    gl.call_list(1);

    let draws = gl.backend().draws();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].texture, Some(TextureHandle(5)));
    assert_eq!(draws[1].texture, None);
}

#[test]
fn texture_bound_inside_a_list_wins_over_the_call_time_binding() {
    let mut gl = context();
    gl.new_list(1, GL_COMPILE);
    red_quad(&mut gl);
    gl.bind_texture(GL_TEXTURE_2D, 7);
    red_quad(&mut gl);
    gl.end_list();

    gl.bind_texture(GL_TEXTURE_2D, 5);
    gl.call_list(1);

    let draws = gl.backend().draws();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].texture, Some(TextureHandle(5)));
    assert_eq!(draws[1].texture, Some(TextureHandle(7)));
}

// ── client arrays ──────────────────────────────────────────────────────────

const COLORED_QUAD: [f32; 24] = [
    1.0, 0.0, 0.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 1.0, 1.0, 0.0, //
    1.0, 1.0, 1.0, 0.0, 1.0, 0.0,
];

#[test]
fn draw_arrays_expands_quads_from_the_bound_array() {
    let mut gl = context();
    gl.interleaved_arrays(GL_C3F_V3F, 0, &COLORED_QUAD);
    gl.draw_arrays(GL_QUADS, 0, 4);

    let draw = &gl.backend().draws()[0];
    assert!(draw.indexed);
    assert_eq!(draw.vertex_count(), 6);
    assert_eq!(draw.color(3), Some([1.0, 0.0, 0.0]));
    assert_eq!(draw.position(5), [0.0, 1.0, 0.0]);
}

#[test]
fn disabled_arrays_drop_channels_or_the_draw() {
    let mut gl = context();
    gl.interleaved_arrays(GL_C3F_V3F, 0, &COLORED_QUAD);
    gl.disable_client_state(GL_COLOR_ARRAY);
    gl.draw_arrays(GL_TRIANGLES, 0, 3);
    assert!(gl.backend().draws()[0].layout.color.is_none());
    assert!(!gl.is_enabled(GL_COLOR_ARRAY));

    gl.disable_client_state(GL_VERTEX_ARRAY);
    gl.draw_arrays(GL_TRIANGLES, 0, 3);
    assert_eq!(gl.backend().draws().len(), 1);
}

#[test]
fn interleaved_stride_validation() {
    let mut gl = context();
    gl.interleaved_arrays(GL_C3F_V3F, 12, &COLORED_QUAD);
    assert_eq!(gl.get_error(), GL_INVALID_VALUE);
    gl.interleaved_arrays(GL_C3F_V3F, -4, &COLORED_QUAD);
    assert_eq!(gl.get_error(), GL_INVALID_VALUE);
    gl.interleaved_arrays(GL_TRIANGLES, 0, &COLORED_QUAD);
    assert_eq!(gl.get_error(), GL_INVALID_ENUM);
    gl.interleaved_arrays(GL_V3F, 16, &[0.0; 12]);
    assert_eq!(gl.get_error(), GL_NO_ERROR);
}

#[test]
fn arrays_recorded_into_a_list_are_copied() {
    let mut gl = context();
    gl.interleaved_arrays(GL_V3F, 0, &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    gl.color3f(0.0, 1.0, 0.0);
    gl.new_list(1, GL_COMPILE);
    gl.draw_arrays(GL_TRIANGLES, 0, 3);
    gl.end_list();
    assert_eq!(draw_calls(&gl), 0);

    gl.interleaved_arrays(GL_V3F, 0, &[9.0; 9]);
    gl.call_list(1);

    let draw = &gl.backend().draws()[0];
    assert_eq!(draw.vertex_count(), 3);
    assert_eq!(draw.position(1), [1.0, 0.0, 0.0]);
    assert!(draw.layout.color.is_none());
}

// ── selection ──────────────────────────────────────────────────────────────

#[test]
fn picking_reports_the_name_under_the_cursor() {
    let mut gl = small_context(8);
    gl.select_buffer(16);
    gl.set_pick_cursor(4, 4);

    assert_eq!(gl.render_mode(GL_SELECT), 0);
    assert_eq!(gl.backend().active_program(), Some(ProgramKind::Picking));
    gl.init_names();
    gl.push_name(42);
    full_screen_quad(&mut gl);

    assert_eq!(gl.render_mode(GL_RENDER), 1);
    assert_eq!(&gl.select_buffer_data()[..4], &[1, 0, HIT_MAX_DEPTH, 42]);
    assert_eq!(gl.backend().bound_framebuffer(), None);
    assert_eq!(gl.backend().active_program(), Some(ProgramKind::Main));
}

#[test]
fn picking_background_reports_no_hit() {
    let mut gl = small_context(8);
    gl.select_buffer(16);
    gl.set_pick_cursor(1, 1);
    gl.render_mode(GL_SELECT);
    gl.push_name(7);

    assert_eq!(gl.render_mode(GL_RENDER), 0);
    assert_eq!(gl.select_buffer_data(), &[0; 16]);
}

#[test]
fn cursor_outside_viewport_still_restores_main_target() {
    let mut gl = small_context(8);
    gl.select_buffer(16);
    gl.set_pick_cursor(100, 100);
    gl.render_mode(GL_SELECT);
    gl.push_name(1);
    full_screen_quad(&mut gl);

    assert_eq!(gl.render_mode(GL_RENDER), 0);
    assert_eq!(gl.backend().bound_framebuffer(), None);
}

#[test]
fn pick_ids_increase_and_restart_each_session() {
    let mut gl = small_context(4);
    let session = |gl: &mut GlContext<RecordingBackend>| {
        gl.render_mode(GL_SELECT);
        gl.push_name(1);
        full_screen_quad(gl);
        gl.load_name(2);
        full_screen_quad(gl);
        gl.render_mode(GL_RENDER);
    };
    session(&mut gl);
    session(&mut gl);

    // init_names on entry takes id 1.
    let colors: Vec<_> = gl.backend().draws().iter().map(|d| d.uniforms.pick_color).collect();
    let expected = [encode_pick_id(2), encode_pick_id(3)];
    assert_eq!(colors, [expected, expected].concat());
}

#[test]
fn pop_name_on_empty_stack_is_harmless() {
    let mut gl = small_context(4);
    gl.pop_name();
    gl.render_mode(GL_SELECT);
    gl.pop_name();

    let mut depth = [9];
    gl.get_integer_v(GL_NAME_STACK_DEPTH, &mut depth);
    assert_eq!(depth, [0]);
    assert_eq!(gl.get_error(), GL_NO_ERROR);
}

#[test]
fn select_buffer_cannot_change_while_selecting() {
    let mut gl = small_context(4);
    gl.render_mode(GL_SELECT);
    gl.select_buffer(8);
    assert_eq!(gl.get_error(), GL_INVALID_OPERATION);
    assert_eq!(gl.render_mode(GL_SELECT), 0);

    let mut mode = [0];
    gl.get_integer_v(GL_RENDER_MODE, &mut mode);
    assert_eq!(mode, [GL_SELECT as i32]);
}

// ── state ──────────────────────────────────────────────────────────────────

#[test]
fn tex_parameter_needs_a_bound_texture() {
    let mut gl = context();
    gl.tex_parameteri(GL_TEXTURE_2D, GL_TEXTURE_MIN_FILTER, GL_NEAREST as i32);
    assert_eq!(gl.get_error(), GL_INVALID_OPERATION);

    gl.bind_texture(GL_TEXTURE_2D, 3);
    gl.tex_parameteri(GL_TEXTURE_2D, GL_TEXTURE_MIN_FILTER, GL_NEAREST as i32);
    assert_eq!(gl.get_error(), GL_NO_ERROR);
    assert!(gl
        .backend()
        .calls()
        .iter()
        .any(|c| matches!(c, BackendCall::TextureParameter(..))));
}

#[test]
fn raster_state_is_sent_only_when_it_changes() {
    let mut gl = context();
    let raster_calls = |gl: &GlContext<RecordingBackend>| {
        gl.backend()
            .calls()
            .iter()
            .filter(|c| matches!(c, BackendCall::SetRasterState(_)))
            .count()
    };

    full_screen_quad(&mut gl);
    full_screen_quad(&mut gl);
    assert_eq!(raster_calls(&gl), 1);

    gl.enable(GL_DEPTH_TEST);
    full_screen_quad(&mut gl);
    assert_eq!(raster_calls(&gl), 2);
    assert!(gl.backend().draws()[2].raster.depth_test);
}
