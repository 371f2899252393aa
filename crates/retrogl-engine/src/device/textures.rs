//! Texture registry: embedder textures addressed by [`TextureHandle`], each
//! with its own GL-style sampler parameters.

use std::collections::HashMap;

use crate::backend::{TextureFilter, TextureHandle, TextureParameter, TextureWrap};

/// GL defaults: `NEAREST_MIPMAP_LINEAR` (no mipmaps here, so nearest) and
/// `LINEAR` magnification, `REPEAT` on both axes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub(super) struct SamplerParams {
    pub min: TextureFilter,
    pub mag: TextureFilter,
    pub wrap_s: TextureWrap,
    pub wrap_t: TextureWrap,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            min: TextureFilter::Nearest,
            mag: TextureFilter::Linear,
            wrap_s: TextureWrap::Repeat,
            wrap_t: TextureWrap::Repeat,
        }
    }
}

impl SamplerParams {
    pub fn apply(&mut self, parameter: TextureParameter) {
        match parameter {
            TextureParameter::MinFilter(f) => self.min = f,
            TextureParameter::MagFilter(f) => self.mag = f,
            TextureParameter::WrapS(w) => self.wrap_s = w,
            TextureParameter::WrapT(w) => self.wrap_t = w,
        }
    }
}

struct TextureEntry {
    view: wgpu::TextureView,
    params: SamplerParams,
    bind_group: wgpu::BindGroup,
    // Keeps the texture alive for as long as the handle is registered.
    _texture: wgpu::Texture,
}

pub(super) struct TextureRegistry {
    next_handle: u32,
    entries: HashMap<TextureHandle, TextureEntry>,
    samplers: HashMap<SamplerParams, wgpu::Sampler>,
    fallback: wgpu::BindGroup,
}

impl TextureRegistry {
    /// Creates the registry and its 1x1 white fallback texture.
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, layout: &wgpu::BindGroupLayout) -> Self {
        let mut samplers = HashMap::new();
        let white = create_rgba8(device, queue, "retrogl white texture", 1, 1, &[255; 4]);
        let view = white.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = sampler_for(device, &mut samplers, SamplerParams::default());
        let fallback = bind_group(device, layout, &view, &sampler);

        Self {
            next_handle: 1,
            entries: HashMap::new(),
            samplers,
            fallback,
        }
    }

    pub fn register(
        &mut self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        texture: wgpu::Texture,
    ) -> TextureHandle {
        let handle = TextureHandle(self.next_handle);
        self.next_handle += 1;

        let params = SamplerParams::default();
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = sampler_for(device, &mut self.samplers, params);
        let bind_group = bind_group(device, layout, &view, &sampler);

        self.entries.insert(
            handle,
            TextureEntry {
                view,
                params,
                bind_group,
                _texture: texture,
            },
        );
        log::debug!("registered texture {handle:?}");
        handle
    }

    pub fn unregister(&mut self, handle: TextureHandle) -> bool {
        self.entries.remove(&handle).is_some()
    }

    /// Updates sampler state; the bind group is rebuilt when it changes.
    pub fn set_parameter(
        &mut self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        handle: TextureHandle,
        parameter: TextureParameter,
    ) {
        let Some(entry) = self.entries.get_mut(&handle) else {
            log::debug!("parameter for unknown texture {handle:?} ignored");
            return;
        };
        let mut params = entry.params;
        params.apply(parameter);
        if params == entry.params {
            return;
        }

        let sampler = sampler_for(device, &mut self.samplers, params);
        entry.bind_group = bind_group(device, layout, &entry.view, &sampler);
        entry.params = params;
    }

    /// Bind group for `handle`, or the white fallback.
    pub fn bind_group(&self, handle: Option<TextureHandle>) -> &wgpu::BindGroup {
        match handle.and_then(|h| self.entries.get(&h)) {
            Some(entry) => &entry.bind_group,
            None => {
                if let Some(h) = handle {
                    log::trace!("texture {h:?} not registered; sampling white");
                }
                &self.fallback
            }
        }
    }
}

pub(super) fn create_rgba8(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> wgpu::Texture {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        pixels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    texture
}

fn sampler_for(
    device: &wgpu::Device,
    cache: &mut HashMap<SamplerParams, wgpu::Sampler>,
    params: SamplerParams,
) -> wgpu::Sampler {
    cache
        .entry(params)
        .or_insert_with(|| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("retrogl sampler"),
                address_mode_u: address_mode(params.wrap_s),
                address_mode_v: address_mode(params.wrap_t),
                address_mode_w: wgpu::AddressMode::Repeat,
                mag_filter: filter_mode(params.mag),
                min_filter: filter_mode(params.min),
                ..Default::default()
            })
        })
        .clone()
}

fn bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("retrogl texture bind group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn filter_mode(filter: TextureFilter) -> wgpu::FilterMode {
    match filter {
        TextureFilter::Nearest => wgpu::FilterMode::Nearest,
        TextureFilter::Linear => wgpu::FilterMode::Linear,
    }
}

fn address_mode(wrap: TextureWrap) -> wgpu::AddressMode {
    match wrap {
        TextureWrap::Repeat => wgpu::AddressMode::Repeat,
        TextureWrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_update_one_field_each() {
        let mut p = SamplerParams::default();
        p.apply(TextureParameter::WrapT(TextureWrap::ClampToEdge));
        p.apply(TextureParameter::MinFilter(TextureFilter::Linear));
        assert_eq!(p.wrap_s, TextureWrap::Repeat);
        assert_eq!(p.wrap_t, TextureWrap::ClampToEdge);
        assert_eq!(p.min, TextureFilter::Linear);
        assert_eq!(p.mag, TextureFilter::Linear);
    }
}
