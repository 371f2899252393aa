//! Cross-cutting fixed-function state: capabilities, fog, lighting
//! approximation, alpha test and the raster state derived from them.

use crate::backend::{
    BlendFactor, CompareFunc, Face, RasterState, ShaderUniforms, TextureFilter, TextureHandle,
    TextureParameter, TextureWrap, FOG_MODE_EXP, FOG_MODE_EXP2, FOG_MODE_LINEAR,
};

use super::error::GlError;
use super::types::*;

// ── enums ──────────────────────────────────────────────────────────────────

/// Server-side capabilities accepted by `enable`/`disable`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Capability {
    CullFace,
    Lighting,
    ColorMaterial,
    Fog,
    DepthTest,
    AlphaTest,
    Blend,
    Texture2d,
}

impl Capability {
    pub const fn from_gl(value: GLenum) -> Option<Self> {
        match value {
            GL_CULL_FACE => Some(Self::CullFace),
            GL_LIGHTING => Some(Self::Lighting),
            GL_COLOR_MATERIAL => Some(Self::ColorMaterial),
            GL_FOG => Some(Self::Fog),
            GL_DEPTH_TEST => Some(Self::DepthTest),
            GL_ALPHA_TEST => Some(Self::AlphaTest),
            GL_BLEND => Some(Self::Blend),
            GL_TEXTURE_2D => Some(Self::Texture2d),
            _ => None,
        }
    }

    const fn bit(self) -> u16 {
        1 << self as u16
    }
}

/// Client-side arrays accepted by `enable_client_state`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ClientArray {
    Vertex,
    Color,
    TexCoord,
}

impl ClientArray {
    pub const fn from_gl(value: GLenum) -> Option<Self> {
        match value {
            GL_VERTEX_ARRAY => Some(Self::Vertex),
            GL_COLOR_ARRAY => Some(Self::Color),
            GL_TEXTURE_COORD_ARRAY => Some(Self::TexCoord),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FogMode {
    Linear,
    Exp,
    Exp2,
}

impl FogMode {
    pub const fn from_gl(value: GLenum) -> Option<Self> {
        match value {
            GL_LINEAR => Some(Self::Linear),
            GL_EXP => Some(Self::Exp),
            GL_EXP2 => Some(Self::Exp2),
            _ => None,
        }
    }

    pub const fn to_gl(self) -> GLenum {
        match self {
            Self::Linear => GL_LINEAR,
            Self::Exp => GL_EXP,
            Self::Exp2 => GL_EXP2,
        }
    }

    const fn shader_code(self) -> f32 {
        match self {
            Self::Linear => FOG_MODE_LINEAR,
            Self::Exp => FOG_MODE_EXP,
            Self::Exp2 => FOG_MODE_EXP2,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShadeModel {
    Flat,
    Smooth,
}

impl ShadeModel {
    pub const fn from_gl(value: GLenum) -> Option<Self> {
        match value {
            GL_FLAT => Some(Self::Flat),
            GL_SMOOTH => Some(Self::Smooth),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MaterialMode {
    Ambient,
    Diffuse,
    Specular,
    Emission,
    AmbientAndDiffuse,
}

impl MaterialMode {
    pub const fn from_gl(value: GLenum) -> Option<Self> {
        match value {
            GL_AMBIENT => Some(Self::Ambient),
            GL_DIFFUSE => Some(Self::Diffuse),
            GL_SPECULAR => Some(Self::Specular),
            GL_EMISSION => Some(Self::Emission),
            GL_AMBIENT_AND_DIFFUSE => Some(Self::AmbientAndDiffuse),
            _ => None,
        }
    }
}

// ── parameters ─────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum FogParam {
    Mode(FogMode),
    Density(f32),
    Start(f32),
    End(f32),
    Color([f32; 4]),
}

impl FogParam {
    /// `glFogf` / `glFogi`. `FOG_MODE` takes the enum as its value.
    pub fn from_scalar(pname: GLenum, value: f32) -> Result<Self, GlError> {
        match pname {
            GL_FOG_MODE => FogMode::from_gl(value as GLenum)
                .map(Self::Mode)
                .ok_or(GlError::InvalidEnum),
            GL_FOG_DENSITY if value < 0.0 => Err(GlError::InvalidValue),
            GL_FOG_DENSITY => Ok(Self::Density(value)),
            GL_FOG_START => Ok(Self::Start(value)),
            GL_FOG_END => Ok(Self::End(value)),
            _ => Err(GlError::InvalidEnum),
        }
    }

    /// `glFogfv`.
    pub fn from_vector(pname: GLenum, values: &[f32]) -> Result<Self, GlError> {
        if pname == GL_FOG_COLOR {
            let rgba: [f32; 4] = values
                .get(..4)
                .and_then(|s| s.try_into().ok())
                .ok_or(GlError::InvalidValue)?;
            return Ok(Self::Color(rgba.map(|c| c.clamp(0.0, 1.0))));
        }
        let first = *values.first().ok_or(GlError::InvalidValue)?;
        Self::from_scalar(pname, first)
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum LightModelParam {
    Ambient([f32; 4]),
    LocalViewer(bool),
    TwoSide(bool),
}

impl LightModelParam {
    /// `glLightModelf`; the ambient colour needs the vector form.
    pub fn from_scalar(pname: GLenum, value: f32) -> Result<Self, GlError> {
        match pname {
            GL_LIGHT_MODEL_LOCAL_VIEWER => Ok(Self::LocalViewer(value != 0.0)),
            GL_LIGHT_MODEL_TWO_SIDE => Ok(Self::TwoSide(value != 0.0)),
            _ => Err(GlError::InvalidEnum),
        }
    }

    /// `glLightModelfv`.
    pub fn from_vector(pname: GLenum, values: &[f32]) -> Result<Self, GlError> {
        if pname == GL_LIGHT_MODEL_AMBIENT {
            let rgba: [f32; 4] = values
                .get(..4)
                .and_then(|s| s.try_into().ok())
                .ok_or(GlError::InvalidValue)?;
            return Ok(Self::Ambient(rgba));
        }
        let first = *values.first().ok_or(GlError::InvalidValue)?;
        Self::from_scalar(pname, first)
    }
}

/// `glTexParameteri` arguments. Mipmap filters map to their base filter.
pub fn texture_parameter_from_gl(pname: GLenum, param: i32) -> Result<TextureParameter, GlError> {
    let value = param as GLenum;
    let filter = || match value {
        GL_NEAREST | GL_NEAREST_MIPMAP_NEAREST | GL_NEAREST_MIPMAP_LINEAR => {
            Ok(TextureFilter::Nearest)
        }
        GL_LINEAR | GL_LINEAR_MIPMAP_NEAREST | GL_LINEAR_MIPMAP_LINEAR => Ok(TextureFilter::Linear),
        _ => Err(GlError::InvalidEnum),
    };
    let wrap = || match value {
        GL_REPEAT => Ok(TextureWrap::Repeat),
        GL_CLAMP | GL_CLAMP_TO_EDGE => Ok(TextureWrap::ClampToEdge),
        _ => Err(GlError::InvalidEnum),
    };

    match pname {
        GL_TEXTURE_MIN_FILTER => filter().map(TextureParameter::MinFilter),
        GL_TEXTURE_MAG_FILTER => match value {
            GL_NEAREST => Ok(TextureParameter::MagFilter(TextureFilter::Nearest)),
            GL_LINEAR => Ok(TextureParameter::MagFilter(TextureFilter::Linear)),
            _ => Err(GlError::InvalidEnum),
        },
        GL_TEXTURE_WRAP_S => wrap().map(TextureParameter::WrapS),
        GL_TEXTURE_WRAP_T => wrap().map(TextureParameter::WrapT),
        _ => Err(GlError::InvalidEnum),
    }
}

// ── recorded state commands ────────────────────────────────────────────────

/// A validated state command, as executed or captured into a display list.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum StateCommand {
    Enable(Capability),
    Disable(Capability),
    BindTexture(Option<TextureHandle>),
    /// Applies to whichever texture is bound when executed.
    TexParameter(TextureParameter),
    BlendFunc(BlendFactor, BlendFactor),
    DepthFunc(CompareFunc),
    CullFace(Face),
    AlphaFunc(CompareFunc, f32),
    ColorMaterial(Face, MaterialMode),
    ShadeModel(ShadeModel),
    Fog(FogParam),
    LightModel(LightModelParam),
}

// ── aggregate state ────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FogState {
    pub mode: FogMode,
    pub density: f32,
    pub start: f32,
    pub end: f32,
    pub color: [f32; 4],
}

impl Default for FogState {
    fn default() -> Self {
        Self {
            mode: FogMode::Exp,
            density: 1.0,
            start: 0.0,
            end: 1.0,
            color: [0.0; 4],
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LightModelState {
    pub ambient: [f32; 4],
    pub local_viewer: bool,
    pub two_side: bool,
}

impl Default for LightModelState {
    fn default() -> Self {
        Self {
            ambient: [0.2, 0.2, 0.2, 1.0],
            local_viewer: false,
            two_side: false,
        }
    }
}

/// Everything `enable`, the state commands and `bind_texture` mutate.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedState {
    enabled: u16,
    pub texture: Option<TextureHandle>,
    pub blend_src: BlendFactor,
    pub blend_dst: BlendFactor,
    pub depth_func: CompareFunc,
    pub cull_face: Face,
    pub alpha_func: CompareFunc,
    pub alpha_ref: f32,
    pub color_material_face: Face,
    pub color_material_mode: MaterialMode,
    pub shade_model: ShadeModel,
    pub fog: FogState,
    pub light_model: LightModelState,
}

impl Default for FixedState {
    fn default() -> Self {
        Self {
            enabled: 0,
            texture: None,
            blend_src: BlendFactor::One,
            blend_dst: BlendFactor::Zero,
            depth_func: CompareFunc::Less,
            cull_face: Face::Back,
            alpha_func: CompareFunc::Greater,
            alpha_ref: 0.0,
            color_material_face: Face::FrontAndBack,
            color_material_mode: MaterialMode::AmbientAndDiffuse,
            shade_model: ShadeModel::Smooth,
            fog: FogState::default(),
            light_model: LightModelState::default(),
        }
    }
}

impl FixedState {
    #[inline]
    pub fn is_enabled(&self, cap: Capability) -> bool {
        self.enabled & cap.bit() != 0
    }

    pub fn set_enabled(&mut self, cap: Capability, on: bool) {
        if on {
            self.enabled |= cap.bit();
        } else {
            self.enabled &= !cap.bit();
        }
    }

    /// Applies `cmd` to the CPU-side state. Texture parameters are a GPU
    /// concern and are left to the caller.
    pub fn apply(&mut self, cmd: &StateCommand) {
        match *cmd {
            StateCommand::Enable(cap) => self.set_enabled(cap, true),
            StateCommand::Disable(cap) => self.set_enabled(cap, false),
            StateCommand::BindTexture(t) => self.texture = t,
            StateCommand::TexParameter(_) => {}
            StateCommand::BlendFunc(src, dst) => {
                self.blend_src = src;
                self.blend_dst = dst;
            }
            StateCommand::DepthFunc(f) => self.depth_func = f,
            StateCommand::CullFace(face) => self.cull_face = face,
            StateCommand::AlphaFunc(f, r) => {
                self.alpha_func = f;
                self.alpha_ref = r.clamp(0.0, 1.0);
            }
            StateCommand::ColorMaterial(face, mode) => {
                self.color_material_face = face;
                self.color_material_mode = mode;
            }
            StateCommand::ShadeModel(m) => {
                log::debug!("shade model {m:?} accepted; interpolation is always smooth");
                self.shade_model = m;
            }
            StateCommand::Fog(p) => match p {
                FogParam::Mode(m) => self.fog.mode = m,
                FogParam::Density(d) => self.fog.density = d,
                FogParam::Start(s) => self.fog.start = s,
                FogParam::End(e) => self.fog.end = e,
                FogParam::Color(c) => self.fog.color = c,
            },
            StateCommand::LightModel(p) => match p {
                LightModelParam::Ambient(a) => self.light_model.ambient = a,
                LightModelParam::LocalViewer(v) => self.light_model.local_viewer = v,
                LightModelParam::TwoSide(v) => self.light_model.two_side = v,
            },
        }
    }

    pub fn raster_state(&self) -> RasterState {
        RasterState {
            depth_test: self.is_enabled(Capability::DepthTest),
            depth_func: self.depth_func,
            blend: self.is_enabled(Capability::Blend),
            blend_src: self.blend_src,
            blend_dst: self.blend_dst,
            cull: self.is_enabled(Capability::CullFace),
            cull_face: self.cull_face,
        }
    }

    /// Fills the fog, lighting, alpha-test and feature-flag parts of `u`.
    pub fn write_uniforms(&self, u: &mut ShaderUniforms) {
        u.fog_color = self.fog.color;
        u.fog_params = [
            self.fog.density,
            self.fog.start,
            self.fog.end,
            self.fog.mode.shader_code(),
        ];
        u.light_ambient = self.light_model.ambient;
        u.alpha_test = [
            self.alpha_ref,
            self.alpha_func.shader_code(),
            self.is_enabled(Capability::AlphaTest) as u32 as f32,
            0.0,
        ];
        u.flags = [
            (self.is_enabled(Capability::Texture2d) && self.texture.is_some()) as u32,
            self.is_enabled(Capability::Fog) as u32,
            self.is_enabled(Capability::Lighting) as u32,
            self.is_enabled(Capability::ColorMaterial) as u32,
        ];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_toggle_independently() {
        let mut s = FixedState::default();
        s.apply(&StateCommand::Enable(Capability::Fog));
        s.apply(&StateCommand::Enable(Capability::Blend));
        s.apply(&StateCommand::Disable(Capability::Fog));
        assert!(!s.is_enabled(Capability::Fog));
        assert!(s.is_enabled(Capability::Blend));
        assert!(s.raster_state().blend);
    }

    #[test]
    fn fog_mode_is_an_enum_value() {
        assert_eq!(
            FogParam::from_scalar(GL_FOG_MODE, GL_LINEAR as f32),
            Ok(FogParam::Mode(FogMode::Linear))
        );
        assert_eq!(FogParam::from_scalar(GL_FOG_MODE, 3.0), Err(GlError::InvalidEnum));
        assert_eq!(FogParam::from_scalar(GL_FOG_DENSITY, -1.0), Err(GlError::InvalidValue));
    }

    #[test]
    fn fog_color_needs_four_components() {
        assert_eq!(
            FogParam::from_vector(GL_FOG_COLOR, &[0.5, 0.5]),
            Err(GlError::InvalidValue)
        );
        assert_eq!(
            FogParam::from_vector(GL_FOG_COLOR, &[0.5, 0.6, 0.7, 1.0]),
            Ok(FogParam::Color([0.5, 0.6, 0.7, 1.0]))
        );
    }

    #[test]
    fn light_model_ambient_only_via_vector() {
        assert_eq!(
            LightModelParam::from_scalar(GL_LIGHT_MODEL_AMBIENT, 1.0),
            Err(GlError::InvalidEnum)
        );
        assert_eq!(
            LightModelParam::from_vector(GL_LIGHT_MODEL_AMBIENT, &[0.1, 0.2, 0.3, 1.0]),
            Ok(LightModelParam::Ambient([0.1, 0.2, 0.3, 1.0]))
        );
    }

    #[test]
    fn mipmap_min_filters_collapse_to_base_filter() {
        assert_eq!(
            texture_parameter_from_gl(GL_TEXTURE_MIN_FILTER, GL_LINEAR_MIPMAP_LINEAR as i32),
            Ok(TextureParameter::MinFilter(TextureFilter::Linear))
        );
        assert_eq!(
            texture_parameter_from_gl(GL_TEXTURE_MAG_FILTER, GL_NEAREST_MIPMAP_NEAREST as i32),
            Err(GlError::InvalidEnum)
        );
        assert_eq!(
            texture_parameter_from_gl(GL_TEXTURE_WRAP_S, GL_CLAMP as i32),
            Ok(TextureParameter::WrapS(TextureWrap::ClampToEdge))
        );
    }

    #[test]
    fn texture_flag_needs_binding_and_capability() {
        let mut s = FixedState::default();
        let mut u = ShaderUniforms::default();
        s.set_enabled(Capability::Texture2d, true);
        s.write_uniforms(&mut u);
        assert_eq!(u.flags[0], 0);

        s.apply(&StateCommand::BindTexture(Some(TextureHandle(3))));
        s.write_uniforms(&mut u);
        assert_eq!(u.flags[0], 1);
    }

    #[test]
    fn alpha_reference_is_clamped() {
        let mut s = FixedState::default();
        s.apply(&StateCommand::AlphaFunc(CompareFunc::GreaterEqual, 4.0));
        assert_eq!(s.alpha_ref, 1.0);
    }
}
