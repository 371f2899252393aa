//! Blocking single-texel readback for picking.

use std::sync::mpsc::channel;

use anyhow::Context;

/// `bytes_per_row` must be a multiple of this for texture-to-buffer copies.
const ROW_ALIGN: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// Copies the RGBA8 texel at `(x, y)` (top-left origin) into a mappable
/// buffer and waits for it.
///
/// Work already submitted on `queue` completes first, so callers flush their
/// pending batch before calling this.
pub(super) fn read_texel(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    x: u32,
    y: u32,
) -> anyhow::Result<[u8; 4]> {
    let readback = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("retrogl pick readback"),
        size: ROW_ALIGN as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("retrogl readback encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d { x, y, z: 0 },
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &readback,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(ROW_ALIGN),
                rows_per_image: Some(1),
            },
        },
        wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
    );
    queue.submit([encoder.finish()]);

    let slice = readback.slice(..);
    let (sender, receiver) = channel();
    slice.map_async(wgpu::MapMode::Read, move |res| {
        drop(sender.send(res));
    });
    device
        .poll(wgpu::PollType::wait_indefinitely())
        .context("device poll failed during readback")?;
    receiver
        .recv()
        .context("readback callback dropped")?
        .context("failed to map readback buffer")?;

    let mapped = slice.get_mapped_range();
    let mut texel = [0u8; 4];
    texel.copy_from_slice(&mapped[..4]);
    drop(mapped);
    readback.unmap();
    Ok(texel)
}
