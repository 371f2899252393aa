//! Render pipelines for the fixed-function program, keyed by everything wgpu
//! bakes into a pipeline.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};

use crate::backend::{
    BlendFactor, CompareFunc, DrawTopology, Face, ProgramKind, RasterState, ShaderUniforms,
    VertexLayout,
};

pub(super) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub(super) struct PipelineKey {
    pub program: ProgramKind,
    pub layout: VertexLayout,
    pub topology: DrawTopology,
    pub raster: RasterState,
    pub format: wgpu::TextureFormat,
}

/// Values fed to attribute locations the bound layout does not carry.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(super) struct AttributeDefaults {
    pub color: [f32; 3],
    pub texcoord: [f32; 2],
}

pub(super) const ATTRIBUTE_DEFAULTS: AttributeDefaults = AttributeDefaults {
    color: [1.0, 1.0, 1.0],
    texcoord: [0.0, 0.0],
};

pub(super) struct PipelineCache {
    shader: wgpu::ShaderModule,
    pub uniform_layout: wgpu::BindGroupLayout,
    pub texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl PipelineCache {
    /// Compiles the shader module and reports WGSL errors.
    pub fn new(device: &wgpu::Device) -> anyhow::Result<Self> {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("retrogl fixed-function shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/fixed.wgsl").into()),
        });

        let info = pollster::block_on(shader.get_compilation_info());
        let errors: Vec<String> = info
            .messages
            .iter()
            .filter(|m| m.message_type == wgpu::CompilationMessageType::Error)
            .map(|m| m.message.clone())
            .collect();
        anyhow::ensure!(errors.is_empty(), "shader compilation failed: {}", errors.join("; "));

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("retrogl uniforms bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(uniform_size()),
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("retrogl texture bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("retrogl pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            immediate_size: 0,
        });

        Ok(Self {
            shader,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            pipelines: HashMap::new(),
        })
    }

    #[inline]
    pub fn get(&self, key: &PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(key)
    }

    pub fn ensure(&mut self, device: &wgpu::Device, key: &PipelineKey) {
        if self.pipelines.contains_key(key) {
            return;
        }
        log::debug!(
            "creating pipeline: {:?} {:?} stride={} raster={:?}",
            key.program,
            key.topology,
            key.layout.stride_bytes,
            key.raster
        );
        let pipeline = self.create(device, key);
        self.pipelines.insert(*key, pipeline);
    }

    fn create(&self, device: &wgpu::Device, key: &PipelineKey) -> wgpu::RenderPipeline {
        let (vertex_attrs, default_attrs) = vertex_attributes(&key.layout);
        let buffers = [
            wgpu::VertexBufferLayout {
                array_stride: key.layout.stride_bytes as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &vertex_attrs,
            },
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<AttributeDefaults>() as u64,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &default_attrs,
            },
        ];

        let fragment_entry = match key.program {
            ProgramKind::Main => "fs_main",
            ProgramKind::Picking => "fs_pick",
        };
        let raster = &key.raster;

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("retrogl pipeline"),
            layout: Some(&self.pipeline_layout),

            vertex: wgpu::VertexState {
                module: &self.shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &buffers,
            },

            fragment: Some(wgpu::FragmentState {
                module: &self.shader,
                entry_point: Some(fragment_entry),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: key.format,
                    blend: (raster.blend && key.program == ProgramKind::Main)
                        .then(|| blend_state(raster.blend_src, raster.blend_dst)),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology: primitive_topology(key.topology),
                strip_index_format: is_strip(key.topology).then_some(wgpu::IndexFormat::Uint32),
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: cull_mode(raster),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: raster.depth_test,
                depth_compare: if raster.depth_test {
                    compare_function(raster.depth_func)
                } else {
                    wgpu::CompareFunction::Always
                },
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),

            multiview_mask: None,
            cache: None,
        })
    }
}

/// Size of one uniform block.
pub(super) const fn uniform_size() -> u64 {
    std::mem::size_of::<ShaderUniforms>() as u64
}

/// Attributes sourced from the vertex buffer, then those sourced from the
/// per-instance defaults buffer.
fn vertex_attributes(layout: &VertexLayout) -> (Vec<wgpu::VertexAttribute>, Vec<wgpu::VertexAttribute>) {
    let mut from_buffer = vec![wgpu::VertexAttribute {
        format: if layout.position.components >= 3 {
            wgpu::VertexFormat::Float32x3
        } else {
            wgpu::VertexFormat::Float32x2
        },
        offset: layout.position.offset_bytes as u64,
        shader_location: 0,
    }];
    let mut defaults = Vec::new();

    let color_default = wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: 0,
        shader_location: 1,
    };
    match layout.color {
        Some(slot) => from_buffer.push(wgpu::VertexAttribute {
            offset: slot.offset_bytes as u64,
            ..color_default
        }),
        None => defaults.push(color_default),
    }

    let texcoord_default = wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x2,
        offset: std::mem::offset_of!(AttributeDefaults, texcoord) as u64,
        shader_location: 2,
    };
    match layout.texcoord {
        Some(slot) => from_buffer.push(wgpu::VertexAttribute {
            offset: slot.offset_bytes as u64,
            ..texcoord_default
        }),
        None => defaults.push(texcoord_default),
    }

    (from_buffer, defaults)
}

pub(super) fn primitive_topology(topology: DrawTopology) -> wgpu::PrimitiveTopology {
    match topology {
        DrawTopology::Points => wgpu::PrimitiveTopology::PointList,
        DrawTopology::Lines => wgpu::PrimitiveTopology::LineList,
        DrawTopology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        DrawTopology::Triangles => wgpu::PrimitiveTopology::TriangleList,
        DrawTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

fn is_strip(topology: DrawTopology) -> bool {
    matches!(topology, DrawTopology::LineStrip | DrawTopology::TriangleStrip)
}

pub(super) fn is_polygonal(topology: DrawTopology) -> bool {
    matches!(topology, DrawTopology::Triangles | DrawTopology::TriangleStrip)
}

fn cull_mode(raster: &RasterState) -> Option<wgpu::Face> {
    if !raster.cull {
        return None;
    }
    match raster.cull_face {
        Face::Front => Some(wgpu::Face::Front),
        Face::Back => Some(wgpu::Face::Back),
        // Handled by skipping the draw.
        Face::FrontAndBack => None,
    }
}

pub(super) fn compare_function(func: CompareFunc) -> wgpu::CompareFunction {
    match func {
        CompareFunc::Never => wgpu::CompareFunction::Never,
        CompareFunc::Less => wgpu::CompareFunction::Less,
        CompareFunc::Equal => wgpu::CompareFunction::Equal,
        CompareFunc::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunc::Greater => wgpu::CompareFunction::Greater,
        CompareFunc::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunc::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunc::Always => wgpu::CompareFunction::Always,
    }
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
    }
}

fn blend_state(src: BlendFactor, dst: BlendFactor) -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: blend_factor(src),
        dst_factor: blend_factor(dst),
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::AttributeSlot;

    #[test]
    fn missing_channels_come_from_defaults_buffer() {
        let layout = VertexLayout {
            stride_bytes: 24,
            position: AttributeSlot { offset_bytes: 12, components: 3 },
            color: Some(AttributeSlot { offset_bytes: 0, components: 3 }),
            texcoord: None,
        };
        let (buffer, defaults) = vertex_attributes(&layout);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer[0].offset, 12);
        assert_eq!(buffer[1].shader_location, 1);
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].shader_location, 2);
        assert_eq!(defaults[0].offset, 12);
    }

    #[test]
    fn two_component_positions_use_float32x2() {
        let layout = VertexLayout {
            stride_bytes: 8,
            position: AttributeSlot { offset_bytes: 0, components: 2 },
            color: None,
            texcoord: None,
        };
        let (buffer, defaults) = vertex_attributes(&layout);
        assert_eq!(buffer[0].format, wgpu::VertexFormat::Float32x2);
        assert_eq!(defaults.len(), 2);
    }

    #[test]
    fn strips_carry_an_index_format() {
        assert!(is_strip(DrawTopology::TriangleStrip));
        assert!(!is_strip(DrawTopology::Triangles));
        assert_eq!(
            primitive_topology(DrawTopology::LineStrip),
            wgpu::PrimitiveTopology::LineStrip
        );
    }
}
