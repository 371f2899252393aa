use std::fmt;

use glam::{Mat4, Vec3};

use super::types::*;

/// Which stack matrix commands target.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MatrixMode {
    Projection,
    ModelView,
}

impl MatrixMode {
    pub const fn from_gl(value: GLenum) -> Option<Self> {
        match value {
            GL_PROJECTION => Some(Self::Projection),
            GL_MODELVIEW => Some(Self::ModelView),
            _ => None,
        }
    }

    pub const fn to_gl(self) -> GLenum {
        match self {
            Self::Projection => GL_PROJECTION,
            Self::ModelView => GL_MODELVIEW,
        }
    }
}

/// Returned by [`MatrixStack::pop`] when nothing was pushed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct StackUnderflow;

impl fmt::Display for StackUnderflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("matrix stack underflow")
    }
}

impl std::error::Error for StackUnderflow {}

/// A current matrix plus the saved matrices below it.
///
/// All compositions post-multiply (`current = current * m`), matching the
/// fixed-function convention that the last-issued transform applies first to
/// vertices.
#[derive(Debug, Clone)]
pub struct MatrixStack {
    current: Mat4,
    saved: Vec<Mat4>,
}

impl Default for MatrixStack {
    fn default() -> Self {
        Self::new()
    }
}

impl MatrixStack {
    pub fn new() -> Self {
        Self {
            current: Mat4::IDENTITY,
            saved: Vec::new(),
        }
    }

    #[inline]
    pub fn current(&self) -> Mat4 {
        self.current
    }

    /// Number of matrices on the stack, counting the current one.
    #[inline]
    pub fn depth(&self) -> usize {
        self.saved.len() + 1
    }

    pub fn load_identity(&mut self) {
        self.current = Mat4::IDENTITY;
    }

    pub fn push(&mut self) {
        self.saved.push(self.current);
    }

    /// Restores the most recently pushed matrix.
    ///
    /// On underflow the current matrix is left untouched.
    pub fn pop(&mut self) -> Result<(), StackUnderflow> {
        let top = self.saved.pop().ok_or(StackUnderflow)?;
        self.current = top;
        Ok(())
    }

    pub fn translate(&mut self, x: f32, y: f32, z: f32) {
        self.current *= Mat4::from_translation(Vec3::new(x, y, z));
    }

    /// Rotates by `angle_degrees` around `(x, y, z)`.
    ///
    /// The axis is normalized; a zero-length axis leaves the matrix unchanged.
    pub fn rotate(&mut self, angle_degrees: f32, x: f32, y: f32, z: f32) {
        let axis = Vec3::new(x, y, z);
        let Some(axis) = axis.try_normalize() else { return };
        self.current *= Mat4::from_axis_angle(axis, angle_degrees.to_radians());
    }

    pub fn scale(&mut self, x: f32, y: f32, z: f32) {
        self.current *= Mat4::from_scale(Vec3::new(x, y, z));
    }

    pub fn load(&mut self, m: Mat4) {
        self.current = m;
    }

    pub fn multiply(&mut self, m: Mat4) {
        self.current *= m;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn approx(a: Vec4, b: Vec4) -> bool {
        (a - b).abs().max_element() < 1e-5
    }

    #[test]
    fn pop_on_empty_stack_underflows_and_keeps_current() {
        let mut s = MatrixStack::new();
        s.translate(1.0, 2.0, 3.0);
        let before = s.current();
        assert_eq!(s.pop(), Err(StackUnderflow));
        assert_eq!(s.current(), before);
    }

    #[test]
    fn push_pop_restores_saved_matrix() {
        let mut s = MatrixStack::new();
        s.push();
        s.scale(2.0, 2.0, 2.0);
        assert_eq!(s.depth(), 2);
        s.pop().unwrap();
        assert_eq!(s.current(), Mat4::IDENTITY);
        assert_eq!(s.depth(), 1);
    }

    #[test]
    fn rotate_uses_degrees() {
        let mut s = MatrixStack::new();
        s.rotate(90.0, 0.0, 0.0, 1.0);
        let p = s.current() * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert!(approx(p, Vec4::new(0.0, 1.0, 0.0, 1.0)));
    }

    #[test]
    fn rotate_around_zero_axis_is_ignored() {
        let mut s = MatrixStack::new();
        s.rotate(45.0, 0.0, 0.0, 0.0);
        assert_eq!(s.current(), Mat4::IDENTITY);
    }

    #[test]
    fn transforms_post_multiply() {
        // translate then scale: the scale applies to the vertex first.
        let mut s = MatrixStack::new();
        s.translate(10.0, 0.0, 0.0);
        s.scale(2.0, 2.0, 2.0);
        let p = s.current() * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert!(approx(p, Vec4::new(12.0, 0.0, 0.0, 1.0)));
    }

    #[test]
    fn load_replaces_and_multiply_composes() {
        let mut s = MatrixStack::new();
        s.load(Mat4::from_scale(Vec3::splat(3.0)));
        s.multiply(Mat4::from_translation(Vec3::X));
        let p = s.current() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!(approx(p, Vec4::new(3.0, 0.0, 0.0, 1.0)));
    }
}
