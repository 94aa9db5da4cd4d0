use std::mem::size_of;
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;

use crate::capture::{encode_png, upscale_nearest};
use crate::params::{EchoMode, ParamsHandle, RenderParams};
use crate::source::{Frame, FrameSource};

use super::buffers::{clear_buffers, OffscreenBuffer, PingPong, VideoTexture};
use super::context::GpuContext;
use super::passes::PassPipelines;
use super::uniforms::{center_crop, CropMapping, EchoUniforms, QuantizeUniforms};

/// Counters exposed for logging and tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineStats {
    /// Ticks that executed the pass sequence (a tick with no frame yet only
    /// re-presents).
    pub ticks: u64,
    /// Video texture reallocations; exactly one per source resolution
    /// change.
    pub source_reallocs: u32,
}

/// Which offscreen buffer holds this tick's authoritative image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FinalSlot {
    Present,
    Echo,
}

/// The per-tick orchestrator: owns every GPU resource and encodes the pass
/// sequence selected by the current echo mode.
///
/// The authoritative image always lands in an offscreen target (swapchain
/// images cannot be read back), so presentation is a nearest-neighbor blit
/// and capture reads the same texture presentation samples.
pub struct PixelPipeline {
    params: ParamsHandle,
    inner: Option<PipelineState>,
}

impl PixelPipeline {
    /// Builds the pipeline against a window-like surface target. The target
    /// must outlive the pipeline.
    pub fn new<T>(
        target: &T,
        surface_size: PhysicalSize<u32>,
        output_size: (u32, u32),
        params: ParamsHandle,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::with_surface(target, surface_size)?;
        let inner = PipelineState::new(context, output_size, params.clone())?;
        Ok(Self {
            params,
            inner: Some(inner),
        })
    }

    /// Builds a pipeline with no presentable surface; used by the capture
    /// paths and tests.
    pub fn headless(output_size: (u32, u32), params: ParamsHandle) -> Result<Self> {
        let context = GpuContext::headless()?;
        let inner = PipelineState::new(context, output_size, params.clone())?;
        Ok(Self {
            params,
            inner: Some(inner),
        })
    }

    /// Runs one tick: poll the source, upload, run the pass sequence, and
    /// present. Never fails on transient conditions (missing frames, lost
    /// surfaces); a tick that cannot render simply presents stale content.
    pub fn tick(&mut self, source: &mut dyn FrameSource) -> Result<()> {
        match self.inner.as_mut() {
            Some(state) => state.tick(source),
            None => {
                tracing::warn!("tick on a disposed pipeline ignored");
                Ok(())
            }
        }
    }

    /// Handle through which the UI collaborator adjusts parameters.
    pub fn params(&self) -> ParamsHandle {
        self.params.clone()
    }

    pub fn resize_surface(&mut self, new_size: PhysicalSize<u32>) {
        if let Some(state) = self.inner.as_mut() {
            state.context.resize_surface(new_size);
        }
    }

    /// Changes the output grid, resizing every offscreen buffer and
    /// recomputing the crop. No-op when the size is unchanged.
    pub fn set_output_size(&mut self, size: (u32, u32)) -> Result<()> {
        match self.inner.as_mut() {
            Some(state) => state.set_output_size(size),
            None => Ok(()),
        }
    }

    pub fn output_size(&self) -> (u32, u32) {
        self.inner
            .as_ref()
            .map(|state| state.output_size)
            .unwrap_or((0, 0))
    }

    pub fn stats(&self) -> PipelineStats {
        self.inner
            .as_ref()
            .map(|state| state.stats)
            .unwrap_or_default()
    }

    /// Reads back this tick's authoritative image as tightly packed RGBA.
    pub fn read_output_rgba(&mut self) -> Result<Vec<u8>> {
        self.inner
            .as_mut()
            .context("pipeline disposed")?
            .read_final_rgba()
    }

    /// Still capture: readback, integer nearest-neighbor upscale, PNG.
    pub fn capture_still(&mut self, scale: u32) -> Result<Vec<u8>> {
        self.inner
            .as_mut()
            .context("pipeline disposed")?
            .capture_still(scale)
    }

    /// Releases all GPU resources and destroys the device. Idempotent; also
    /// runs on drop.
    pub fn dispose(&mut self) {
        if let Some(state) = self.inner.take() {
            let device = state.context.device.clone();
            drop(state);
            device.destroy();
            tracing::debug!("GPU resources released");
        }
    }
}

impl Drop for PixelPipeline {
    fn drop(&mut self) {
        self.dispose();
    }
}

struct Readback {
    buffer: wgpu::Buffer,
    padded_bytes_per_row: u32,
    unpadded_bytes_per_row: u32,
}

impl Readback {
    fn new(device: &wgpu::Device, size: (u32, u32)) -> Result<Self> {
        let unpadded = size
            .0
            .checked_mul(4)
            .context("output width overflows row size")?;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("output readback buffer"),
            size: u64::from(padded) * u64::from(size.1),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Ok(Self {
            buffer,
            padded_bytes_per_row: padded,
            unpadded_bytes_per_row: unpadded,
        })
    }
}

struct PipelineState {
    context: GpuContext,
    passes: PassPipelines,
    params: ParamsHandle,
    output_size: (u32, u32),
    video: Option<VideoTexture>,
    crop: CropMapping,
    echo: PingPong<OffscreenBuffer>,
    intermediate: OffscreenBuffer,
    present_target: OffscreenBuffer,
    quantize_uniforms: QuantizeUniforms,
    quantize_buffer: wgpu::Buffer,
    quantize_bind: wgpu::BindGroup,
    echo_uniforms: EchoUniforms,
    echo_buffer: wgpu::Buffer,
    echo_bind: wgpu::BindGroup,
    readback: Readback,
    final_slot: FinalSlot,
    stats: PipelineStats,
    last_log: Instant,
}

impl PipelineState {
    fn new(context: GpuContext, output_size: (u32, u32), params: ParamsHandle) -> Result<Self> {
        ensure!(
            output_size.0 > 0 && output_size.1 > 0,
            "output resolution must be non-zero, got {}x{}",
            output_size.0,
            output_size.1
        );

        let passes = PassPipelines::new(&context.device, context.surface_format)?;

        let echo_a = OffscreenBuffer::new(&context.device, output_size, "echo buffer 0");
        let echo_b = OffscreenBuffer::new(&context.device, output_size, "echo buffer 1");
        let intermediate = OffscreenBuffer::new(&context.device, output_size, "quantized intermediate");
        let present_target = OffscreenBuffer::new(&context.device, output_size, "present target");
        clear_buffers(
            &context.device,
            &context.queue,
            &[&echo_a, &echo_b, &intermediate, &present_target],
        );

        let quantize_uniforms = QuantizeUniforms::new();
        let quantize_buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("quantize uniform buffer"),
            size: size_of::<QuantizeUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let quantize_bind = passes.uniform_bind_group(
            &context.device,
            "quantize uniform bind group",
            &passes.quantize_uniform_layout,
            &quantize_buffer,
        );

        let echo_uniforms = EchoUniforms::new();
        let echo_buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("echo uniform buffer"),
            size: size_of::<EchoUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let echo_bind = passes.uniform_bind_group(
            &context.device,
            "echo uniform bind group",
            &passes.echo_uniform_layout,
            &echo_buffer,
        );

        let readback = Readback::new(&context.device, output_size)?;

        Ok(Self {
            context,
            passes,
            params,
            output_size,
            video: None,
            crop: CropMapping::IDENTITY,
            echo: PingPong::new(echo_a, echo_b),
            intermediate,
            present_target,
            quantize_uniforms,
            quantize_buffer,
            quantize_bind,
            echo_uniforms,
            echo_buffer,
            echo_bind,
            readback,
            final_slot: FinalSlot::Present,
            stats: PipelineStats::default(),
            last_log: Instant::now(),
        })
    }

    fn tick(&mut self, source: &mut dyn FrameSource) -> Result<()> {
        let params = self.params.snapshot();

        if let Some(frame) = source.current_frame() {
            self.upload_frame(&frame);
        }

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tick encoder"),
            });

        // No frame has ever arrived: skip the passes but keep presenting the
        // (cleared or stale) final target.
        if self.video.is_some() {
            self.write_uniforms(&params);
            self.encode_passes(&mut encoder, params.echo_mode);
            self.stats.ticks += 1;
        }

        let surface_frame = self.acquire_surface_frame()?;
        if let Some(frame) = &surface_frame {
            let view = frame
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            let textures = self
                .passes
                .blit_textures(&self.context.device, &self.final_buffer().view);
            encode_pass(&mut encoder, "present blit", &self.passes.blit, &[&textures], &view);
        }

        self.context.queue.submit(std::iter::once(encoder.finish()));
        if let Some(frame) = surface_frame {
            frame.present();
        }

        let now = Instant::now();
        if now.duration_since(self.last_log) >= Duration::from_secs(1) {
            tracing::debug!(
                ticks = self.stats.ticks,
                reallocs = self.stats.source_reallocs,
                echo_mode = %params.echo_mode,
                "render stats"
            );
            self.last_log = now;
        }

        Ok(())
    }

    fn upload_frame(&mut self, frame: &Frame) {
        let expected = frame.width as usize * frame.height as usize * 4;
        if frame.width == 0 || frame.height == 0 || frame.pixels.len() != expected {
            tracing::warn!(
                width = frame.width,
                height = frame.height,
                bytes = frame.pixels.len(),
                "ignoring malformed frame"
            );
            return;
        }

        let dims = (frame.width, frame.height);
        if self.video.as_ref().map(|video| video.size) != Some(dims) {
            self.video = Some(VideoTexture::new(&self.context.device, dims));
            self.crop = center_crop(dims, self.output_size);
            self.stats.source_reallocs += 1;
            tracing::info!(
                width = frame.width,
                height = frame.height,
                scale_x = self.crop.scale[0],
                scale_y = self.crop.scale[1],
                "source resolution changed; reallocated video texture"
            );
        }
        if let Some(video) = &self.video {
            video.upload(&self.context.queue, frame);
        }
    }

    fn write_uniforms(&mut self, params: &RenderParams) {
        // In "before" mode the echo pass does the cropping (it reads the raw
        // video) and quantize consumes an already-cropped buffer; otherwise
        // quantize crops and echo reads output-sized textures one-to-one.
        let (quantize_crop, echo_crop) = match params.echo_mode {
            EchoMode::Before => (CropMapping::IDENTITY, self.crop),
            EchoMode::Off | EchoMode::After => (self.crop, CropMapping::IDENTITY),
        };

        self.quantize_uniforms.set_palette(&params.palette);
        self.quantize_uniforms
            .set_adjust(params.brightness, params.contrast, params.dither);
        self.quantize_uniforms.set_crop(quantize_crop);
        self.context.queue.write_buffer(
            &self.quantize_buffer,
            0,
            bytemuck::bytes_of(&self.quantize_uniforms),
        );

        self.echo_uniforms.set_crop(echo_crop);
        self.echo_uniforms.set_decay(params.echo_decay);
        self.context
            .queue
            .write_buffer(&self.echo_buffer, 0, bytemuck::bytes_of(&self.echo_uniforms));
    }

    fn encode_passes(&mut self, encoder: &mut wgpu::CommandEncoder, mode: EchoMode) {
        let device = &self.context.device;
        let Some(video) = &self.video else { return };

        match mode {
            EchoMode::Off => {
                let textures = self.passes.quantize_textures(device, &video.view);
                encode_pass(
                    encoder,
                    "quantize pass",
                    &self.passes.quantize,
                    &[&self.quantize_bind, &textures],
                    &self.present_target.view,
                );
                self.final_slot = FinalSlot::Present;
            }
            EchoMode::Before => {
                {
                    let textures =
                        self.passes
                            .echo_textures(device, &video.view, &self.echo.read().view);
                    encode_pass(
                        encoder,
                        "echo pass",
                        &self.passes.echo,
                        &[&self.echo_bind, &textures],
                        &self.echo.write().view,
                    );
                }
                self.echo.swap();
                let textures = self
                    .passes
                    .quantize_textures(device, &self.echo.read().view);
                encode_pass(
                    encoder,
                    "quantize pass",
                    &self.passes.quantize,
                    &[&self.quantize_bind, &textures],
                    &self.present_target.view,
                );
                self.final_slot = FinalSlot::Present;
            }
            EchoMode::After => {
                {
                    let textures = self.passes.quantize_textures(device, &video.view);
                    encode_pass(
                        encoder,
                        "quantize pass",
                        &self.passes.quantize,
                        &[&self.quantize_bind, &textures],
                        &self.intermediate.view,
                    );
                }
                {
                    let textures = self.passes.echo_textures(
                        device,
                        &self.intermediate.view,
                        &self.echo.read().view,
                    );
                    encode_pass(
                        encoder,
                        "echo pass",
                        &self.passes.echo,
                        &[&self.echo_bind, &textures],
                        &self.echo.write().view,
                    );
                }
                self.echo.swap();
                // The buffer just written is `read` after the swap: it is
                // presented this tick and composited against next tick.
                self.final_slot = FinalSlot::Echo;
            }
        }
    }

    fn acquire_surface_frame(&mut self) -> Result<Option<wgpu::SurfaceTexture>> {
        let Some(surface) = &self.context.surface else {
            return Ok(None);
        };
        match surface.get_current_texture() {
            Ok(frame) => Ok(Some(frame)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::warn!("surface lost or outdated; reconfiguring");
                self.context.reconfigure_surface();
                Ok(None)
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("surface acquisition timed out; skipping presentation");
                Ok(None)
            }
            Err(err) => Err(err).context("surface acquisition failed"),
        }
    }

    fn final_buffer(&self) -> &OffscreenBuffer {
        match self.final_slot {
            FinalSlot::Present => &self.present_target,
            FinalSlot::Echo => self.echo.read(),
        }
    }

    fn set_output_size(&mut self, size: (u32, u32)) -> Result<()> {
        if size == self.output_size {
            return Ok(());
        }
        ensure!(
            size.0 > 0 && size.1 > 0,
            "output resolution must be non-zero, got {}x{}",
            size.0,
            size.1
        );

        let device = &self.context.device;
        let echo_a = OffscreenBuffer::new(device, size, "echo buffer 0");
        let echo_b = OffscreenBuffer::new(device, size, "echo buffer 1");
        let intermediate = OffscreenBuffer::new(device, size, "quantized intermediate");
        let present_target = OffscreenBuffer::new(device, size, "present target");
        clear_buffers(
            device,
            &self.context.queue,
            &[&echo_a, &echo_b, &intermediate, &present_target],
        );
        self.readback = Readback::new(device, size)?;

        self.echo = PingPong::new(echo_a, echo_b);
        self.intermediate = intermediate;
        self.present_target = present_target;
        self.final_slot = FinalSlot::Present;
        self.output_size = size;
        if let Some(video) = &self.video {
            self.crop = center_crop(video.size, size);
        }
        tracing::info!(width = size.0, height = size.1, "output resolution changed");
        Ok(())
    }

    fn read_final_rgba(&mut self) -> Result<Vec<u8>> {
        let (width, height) = self.output_size;
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.final_buffer().texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback.buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.readback.padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.context.queue.submit(std::iter::once(encoder.finish()));

        let slice = self.readback.buffer.slice(..);
        let (sender, receiver) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self
            .context
            .device
            .poll(wgpu::PollType::Wait)
            .context("failed to wait for GPU readback")?;
        receiver
            .recv()
            .context("readback map callback dropped")?
            .context("failed to map readback buffer")?;

        let mapped = slice.get_mapped_range();
        let unpadded = self.readback.unpadded_bytes_per_row as usize;
        let padded = self.readback.padded_bytes_per_row as usize;
        let mut tight = vec![0u8; unpadded * height as usize];
        for (row, chunk) in mapped.chunks(padded).take(height as usize).enumerate() {
            tight[row * unpadded..(row + 1) * unpadded].copy_from_slice(&chunk[..unpadded]);
        }
        drop(mapped);
        self.readback.buffer.unmap();
        Ok(tight)
    }

    fn capture_still(&mut self, scale: u32) -> Result<Vec<u8>> {
        let factor = scale.max(1);
        let (width, height) = self.output_size;
        let rgba = self.read_final_rgba()?;
        let scaled = upscale_nearest(&rgba, width, height, factor);
        encode_png(&scaled, width * factor, height * factor)
    }
}

fn encode_pass(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    pipeline: &wgpu::RenderPipeline,
    bind_groups: &[&wgpu::BindGroup],
    target: &wgpu::TextureView,
) {
    let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target,
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
    render_pass.set_pipeline(pipeline);
    for (index, bind_group) in bind_groups.iter().enumerate() {
        render_pass.set_bind_group(index as u32, *bind_group, &[]);
    }
    render_pass.draw(0..3, 0..1);
}
