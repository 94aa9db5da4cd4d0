use super::context::OFFSCREEN_FORMAT;
use crate::source::Frame;

/// A render-target texture sized to the output grid, readable both as a
/// sampling input and by the capture readback.
pub(crate) struct OffscreenBuffer {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl OffscreenBuffer {
    pub(crate) fn new(device: &wgpu::Device, size: (u32, u32), label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.0.max(1),
                height: size.1.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

/// Encodes a clear of each given buffer; used once at (re)creation so the
/// echo history starts black instead of undefined.
pub(crate) fn clear_buffers(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffers: &[&OffscreenBuffer],
) {
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("offscreen clear encoder"),
    });
    for buffer in buffers {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("offscreen clear pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &buffer.view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
    }
    queue.submit(std::iter::once(encoder.finish()));
}

/// The video upload target, reallocated only when the source resolution
/// changes.
pub(crate) struct VideoTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub size: (u32, u32),
}

impl VideoTexture {
    pub(crate) fn new(device: &wgpu::Device, size: (u32, u32)) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("video texture"),
            size: wgpu::Extent3d {
                width: size.0.max(1),
                height: size.1.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size,
        }
    }

    /// In-place upload of one frame; the caller guarantees matching
    /// dimensions.
    pub(crate) fn upload(&self, queue: &wgpu::Queue, frame: &Frame) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(frame.width * 4),
                rows_per_image: Some(frame.height),
            },
            wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

/// Two buffers with explicit read/write roles, swapped by flipping an index.
///
/// Generic over the slot type so the swap discipline is testable without a
/// GPU.
pub(crate) struct PingPong<T> {
    slots: [T; 2],
    read: usize,
}

impl<T> PingPong<T> {
    pub(crate) fn new(first: T, second: T) -> Self {
        Self {
            slots: [first, second],
            read: 0,
        }
    }

    /// The buffer holding the previous tick's accumulation.
    pub(crate) fn read(&self) -> &T {
        &self.slots[self.read]
    }

    /// The buffer the current tick may write into.
    pub(crate) fn write(&self) -> &T {
        &self.slots[1 - self.read]
    }

    /// Promotes the freshly written buffer to `read`. At most once per tick.
    pub(crate) fn swap(&mut self) {
        self.read = 1 - self.read;
    }
}

#[cfg(test)]
mod tests {
    use super::PingPong;

    #[test]
    fn read_and_write_never_alias() {
        let mut pair = PingPong::new("a", "b");
        for _ in 0..5 {
            assert_ne!(*pair.read(), *pair.write());
            pair.swap();
        }
    }

    #[test]
    fn swap_promotes_the_written_buffer() {
        let mut pair = PingPong::new(0u32, 1u32);
        for _ in 0..4 {
            let written = *pair.write();
            pair.swap();
            // What was just written is read next, both for presentation this
            // tick and for compositing next tick.
            assert_eq!(*pair.read(), written);
        }
    }

    #[test]
    fn roles_alternate_every_tick() {
        let mut pair = PingPong::new('x', 'y');
        assert_eq!(*pair.read(), 'x');
        pair.swap();
        assert_eq!(*pair.read(), 'y');
        pair.swap();
        assert_eq!(*pair.read(), 'x');
    }
}
