use std::fmt;

use super::types::*;

/// A run-time command error, reported through the context's error register.
///
/// Construction-time failures (shader compilation, framebuffer creation) are
/// not represented here; they surface as `anyhow::Error` from
/// [`GlContext::create`](super::GlContext::create).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum GlError {
    /// An enum argument was not one of the accepted values.
    InvalidEnum,
    /// A numeric argument was out of range.
    InvalidValue,
    /// The command is not allowed in the current state.
    InvalidOperation,
    /// The GPU collaborator could not allocate a resource.
    OutOfMemory,
}

impl GlError {
    /// Returns the OpenGL numeric error code.
    #[inline]
    pub const fn code(self) -> GLenum {
        match self {
            Self::InvalidEnum => GL_INVALID_ENUM,
            Self::InvalidValue => GL_INVALID_VALUE,
            Self::InvalidOperation => GL_INVALID_OPERATION,
            Self::OutOfMemory => GL_OUT_OF_MEMORY,
        }
    }

    pub const fn from_code(code: GLenum) -> Option<Self> {
        match code {
            GL_INVALID_ENUM => Some(Self::InvalidEnum),
            GL_INVALID_VALUE => Some(Self::InvalidValue),
            GL_INVALID_OPERATION => Some(Self::InvalidOperation),
            GL_OUT_OF_MEMORY => Some(Self::OutOfMemory),
            _ => None,
        }
    }
}

impl fmt::Display for GlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(error_string(self.code()))
    }
}

impl std::error::Error for GlError {}

/// Single-slot error register. The most recent error wins.
#[derive(Debug, Default)]
pub(crate) struct ErrorRegister {
    last: Option<GlError>,
}

impl ErrorRegister {
    pub(crate) fn set(&mut self, command: &str, err: GlError) {
        log::warn!("{command}: {err}");
        self.last = Some(err);
    }

    /// Returns the pending error code (or `GL_NO_ERROR`) and clears the register.
    pub(crate) fn take(&mut self) -> GLenum {
        self.last.take().map_or(GL_NO_ERROR, GlError::code)
    }

    #[cfg(test)]
    pub(crate) fn peek(&self) -> Option<GlError> {
        self.last
    }
}

/// Human-readable description of a GL error code (the `gluErrorString` table).
pub fn error_string(code: GLenum) -> &'static str {
    match code {
        GL_NO_ERROR => "no error",
        GL_INVALID_ENUM => "invalid enum",
        GL_INVALID_VALUE => "invalid value",
        GL_INVALID_OPERATION => "invalid operation",
        GL_STACK_OVERFLOW => "stack overflow",
        GL_STACK_UNDERFLOW => "stack underflow",
        GL_OUT_OF_MEMORY => "out of memory",
        _ => "unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_take_clears() {
        let mut reg = ErrorRegister::default();
        reg.set("glTest", GlError::InvalidValue);
        assert_eq!(reg.take(), GL_INVALID_VALUE);
        assert_eq!(reg.take(), GL_NO_ERROR);
    }

    #[test]
    fn register_latest_wins() {
        let mut reg = ErrorRegister::default();
        reg.set("glA", GlError::InvalidEnum);
        reg.set("glB", GlError::InvalidOperation);
        assert_eq!(reg.take(), GL_INVALID_OPERATION);
    }

    #[test]
    fn codes_round_trip_through_from_code() {
        for err in [
            GlError::InvalidEnum,
            GlError::InvalidValue,
            GlError::InvalidOperation,
            GlError::OutOfMemory,
        ] {
            assert_eq!(GlError::from_code(err.code()), Some(err));
        }
        assert_eq!(GlError::from_code(GL_NO_ERROR), None);
    }

    #[test]
    fn unknown_code_has_fallback_string() {
        assert_eq!(error_string(0xDEAD), "unknown error");
    }
}
