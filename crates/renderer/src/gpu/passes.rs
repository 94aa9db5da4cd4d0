use std::mem::size_of;

use anyhow::{Context, Result};

use crate::compile;

use super::context::OFFSCREEN_FORMAT;
use super::uniforms::{EchoUniforms, QuantizeUniforms};

/// The three fixed-function passes plus the layouts their per-tick bind
/// groups are built against. The quantize and echo passes always target
/// offscreen buffers; only the blit targets the swapchain format.
pub(crate) struct PassPipelines {
    pub quantize: wgpu::RenderPipeline,
    pub echo: wgpu::RenderPipeline,
    pub blit: wgpu::RenderPipeline,
    pub quantize_uniform_layout: wgpu::BindGroupLayout,
    pub echo_uniform_layout: wgpu::BindGroupLayout,
    quantize_texture_layout: wgpu::BindGroupLayout,
    echo_texture_layout: wgpu::BindGroupLayout,
    blit_texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

impl PassPipelines {
    pub(crate) fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> Result<Self> {
        let vertex = compile::vertex_shader(device).context("failed to compile vertex shader")?;
        let quantize_fs = compile::fragment_shader(device, "quantize fragment", compile::QUANTIZE_FRAGMENT)
            .context("failed to compile quantize shader")?;
        let echo_fs = compile::fragment_shader(device, "echo fragment", compile::ECHO_FRAGMENT)
            .context("failed to compile echo shader")?;
        let blit_fs = compile::fragment_shader(device, "blit fragment", compile::BLIT_FRAGMENT)
            .context("failed to compile blit shader")?;

        let quantize_uniform_layout = uniform_layout(
            device,
            "quantize uniform layout",
            size_of::<QuantizeUniforms>() as u64,
        );
        let echo_uniform_layout = uniform_layout(
            device,
            "echo uniform layout",
            size_of::<EchoUniforms>() as u64,
        );
        let quantize_texture_layout = texture_layout(device, "quantize texture layout", 1);
        let echo_texture_layout = texture_layout(device, "echo texture layout", 2);
        let blit_texture_layout = texture_layout(device, "blit texture layout", 1);

        let quantize = build_pipeline(
            device,
            "quantize pipeline",
            &[&quantize_uniform_layout, &quantize_texture_layout],
            &vertex,
            &quantize_fs,
            OFFSCREEN_FORMAT,
        );
        let echo = build_pipeline(
            device,
            "echo pipeline",
            &[&echo_uniform_layout, &echo_texture_layout],
            &vertex,
            &echo_fs,
            OFFSCREEN_FORMAT,
        );
        let blit = build_pipeline(
            device,
            "blit pipeline",
            &[&blit_texture_layout],
            &vertex,
            &blit_fs,
            surface_format,
        );

        // Nearest filtering everywhere: hard pixel edges are the point.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("nearest sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Ok(Self {
            quantize,
            echo,
            blit,
            quantize_uniform_layout,
            echo_uniform_layout,
            quantize_texture_layout,
            echo_texture_layout,
            blit_texture_layout,
            sampler,
        })
    }

    pub(crate) fn uniform_bind_group(
        &self,
        device: &wgpu::Device,
        label: &str,
        layout: &wgpu::BindGroupLayout,
        buffer: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        })
    }

    pub(crate) fn quantize_textures(
        &self,
        device: &wgpu::Device,
        source: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        self.texture_bind_group(device, "quantize textures", &self.quantize_texture_layout, &[source])
    }

    pub(crate) fn echo_textures(
        &self,
        device: &wgpu::Device,
        current: &wgpu::TextureView,
        history: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        self.texture_bind_group(device, "echo textures", &self.echo_texture_layout, &[current, history])
    }

    pub(crate) fn blit_textures(
        &self,
        device: &wgpu::Device,
        source: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        self.texture_bind_group(device, "blit textures", &self.blit_texture_layout, &[source])
    }

    fn texture_bind_group(
        &self,
        device: &wgpu::Device,
        label: &str,
        layout: &wgpu::BindGroupLayout,
        views: &[&wgpu::TextureView],
    ) -> wgpu::BindGroup {
        let mut entries = Vec::with_capacity(views.len() * 2);
        for (index, view) in views.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: (index as u32) * 2,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: (index as u32) * 2 + 1,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            });
        }
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        })
    }
}

fn uniform_layout(device: &wgpu::Device, label: &str, min_size: u64) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(min_size),
            },
            count: None,
        }],
    })
}

fn texture_layout(device: &wgpu::Device, label: &str, pairs: u32) -> wgpu::BindGroupLayout {
    let mut entries = Vec::with_capacity(pairs as usize * 2);
    for index in 0..pairs {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: index * 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: index * 2 + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    })
}

fn build_pipeline(
    device: &wgpu::Device,
    label: &str,
    bind_group_layouts: &[&wgpu::BindGroupLayout],
    vertex: &wgpu::ShaderModule,
    fragment: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts,
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some("main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}
