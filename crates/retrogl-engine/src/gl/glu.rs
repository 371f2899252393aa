//! GLU-style matrix builders.
//!
//! These only build matrices; [`GlContext`](super::GlContext) multiplies the
//! result onto the current stack.

use glam::{Mat4, Vec3};

/// `glOrtho` matrix (GL clip space, z in [-1, 1]).
pub fn ortho(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    Mat4::orthographic_rh_gl(left, right, bottom, top, near, far)
}

/// `gluPerspective` matrix; `fovy_degrees` is the vertical field of view.
pub fn perspective(fovy_degrees: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    Mat4::perspective_rh_gl(fovy_degrees.to_radians(), aspect, near, far)
}

/// `gluPickMatrix`: restricts drawing to a `width` x `height` region centered
/// on window position `(x, y)`.
///
/// `viewport` is `[x, y, width, height]`. A degenerate viewport yields the
/// identity matrix.
pub fn pick_matrix(x: f32, y: f32, width: f32, height: f32, viewport: [i32; 4]) -> Mat4 {
    let [vx, vy, vw, vh] = viewport.map(|v| v as f32);
    if vw <= 0.0 || vh <= 0.0 || width <= 0.0 || height <= 0.0 {
        return Mat4::IDENTITY;
    }

    let tx = (vw - 2.0 * (x - vx)) / width;
    let ty = (vh - 2.0 * (y - vy)) / height;
    let sx = vw / width;
    let sy = vh / height;

    Mat4::from_translation(Vec3::new(tx, ty, 0.0)) * Mat4::from_scale(Vec3::new(sx, sy, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn pick_matrix_maps_cursor_to_origin() {
        let vp = [0, 0, 800, 600];
        let m = pick_matrix(400.0, 300.0, 4.0, 4.0, vp);
        // The viewport center in NDC is (0, 0); the pick region centered there
        // must stay at the origin.
        let p = m * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!(p.x.abs() < 1e-4 && p.y.abs() < 1e-4);
    }

    #[test]
    fn pick_matrix_with_degenerate_viewport_is_identity() {
        assert_eq!(pick_matrix(1.0, 1.0, 2.0, 2.0, [0, 0, 0, 600]), Mat4::IDENTITY);
    }

    #[test]
    fn ortho_maps_bounds_to_ndc() {
        let m = ortho(0.0, 100.0, 0.0, 50.0, -1.0, 1.0);
        let p = m * Vec4::new(100.0, 50.0, 0.0, 1.0);
        assert!((p.x - 1.0).abs() < 1e-5);
        assert!((p.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn perspective_near_plane_maps_to_minus_one() {
        let m = perspective(70.0, 1.5, 0.1, 100.0);
        let p = m * Vec4::new(0.0, 0.0, -0.1, 1.0);
        assert!((p.z / p.w + 1.0).abs() < 1e-4);
    }
}
