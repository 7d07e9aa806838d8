//! Textured triangle pipeline for Image batches, plus [`ImageTexture`] —
//! an uploaded RGBA image that image draws sample from.
//!
//! Vertex data streams from a batch's position, color, and tex-coord
//! buffers; the sampled texel is tinted by the per-vertex color.

use thiserror::Error;
use uuid::Uuid;
use wgpu::{
    AddressMode, BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout,
    BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingResource, BindingType,
    Buffer, BufferBindingType, BufferDescriptor, BufferUsages, ColorTargetState,
    ColorWrites, Device, Extent3d, FilterMode, FragmentState, FrontFace,
    MultisampleState, PipelineCompilationOptions, PipelineLayoutDescriptor, PolygonMode,
    PrimitiveState, PrimitiveTopology, Queue, RenderPipeline, RenderPipelineDescriptor,
    SamplerBindingType, SamplerDescriptor, ShaderModuleDescriptor, ShaderStages,
    Texture, TextureDescriptor, TextureDimension, TextureFormat, TextureSampleType,
    TextureUsages, TextureViewDimension, VertexState,
};

use stipple_core::BlendMode;

use crate::pipelines::{
    blend_state, color_layout, position_layout, tex_coord_layout, ViewportUniform,
};

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Pixel data length {got} does not match {width}x{height} RGBA ({expected})")]
    BadLength {
        got: usize,
        expected: usize,
        width: u32,
        height: u32,
    },
    #[error("Image dimensions must be non-zero (got {width}x{height})")]
    ZeroSize { width: u32, height: u32 },
}

/// Owns the wgpu pipeline variants, viewport uniform, and the texture
/// bind group layout image textures are created against.
pub struct ImagePipeline {
    replace: RenderPipeline,
    alpha: RenderPipeline,
    viewport_buffer: Buffer,
    viewport_bind_group: BindGroup,
    texture_bgl: BindGroupLayout,
}

impl ImagePipeline {
    pub fn new(device: &Device, target_format: TextureFormat) -> Self {
        // ── Shader ──────────────────────────────────────────────
        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("image_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/image.wgsl").into()),
        });

        // ── Viewport bind group layout (group 0) ────────────────
        let viewport_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("image_viewport_bgl"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::VERTEX,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        // ── Texture bind group layout (group 1) ─────────────────
        let texture_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("image_texture_bgl"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: true },
                        view_dimension: TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Sampler(SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("image_pipeline_layout"),
            bind_group_layouts: &[&viewport_bgl, &texture_bgl],
            push_constant_ranges: &[],
        });

        // ── Pipeline variants, one per blend mode ───────────────
        let build = |mode: BlendMode, label: &str| {
            device.create_render_pipeline(&RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    compilation_options: PipelineCompilationOptions::default(),
                    buffers: &[position_layout(), color_layout(), tex_coord_layout()],
                },
                fragment: Some(FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    compilation_options: PipelineCompilationOptions::default(),
                    targets: &[Some(ColorTargetState {
                        format: target_format,
                        blend: Some(blend_state(mode)),
                        write_mask: ColorWrites::ALL,
                    })],
                }),
                primitive: PrimitiveState {
                    topology: PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: FrontFace::Ccw,
                    cull_mode: None, // 2D — no backface culling
                    polygon_mode: PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let replace = build(BlendMode::Replace, "image_pipeline_replace");
        let alpha = build(BlendMode::Alpha, "image_pipeline_alpha");

        // ── Viewport uniform ────────────────────────────────────
        let viewport_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("image_viewport_ub"),
            size: std::mem::size_of::<ViewportUniform>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let viewport_bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("image_viewport_bg"),
            layout: &viewport_bgl,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: viewport_buffer.as_entire_binding(),
            }],
        });

        Self {
            replace,
            alpha,
            viewport_buffer,
            viewport_bind_group,
            texture_bgl,
        }
    }

    /// Upload the viewport size. Called when the target (re)binds.
    pub fn upload_viewport(&self, queue: &Queue, width: u32, height: u32) {
        queue.write_buffer(
            &self.viewport_buffer,
            0,
            bytemuck::bytes_of(&ViewportUniform::new(width, height)),
        );
    }

    /// Pipeline variant for the given blend mode.
    pub fn pipeline(&self, mode: BlendMode) -> &RenderPipeline {
        match mode {
            BlendMode::Replace => &self.replace,
            BlendMode::Alpha => &self.alpha,
        }
    }

    pub fn viewport_bind_group(&self) -> &BindGroup {
        &self.viewport_bind_group
    }

    /// Layout image textures bind their texture+sampler against.
    pub fn texture_layout(&self) -> &BindGroupLayout {
        &self.texture_bgl
    }
}

/// An uploaded RGBA image, ready to be sampled by image draws.
///
/// The id distinguishes textures when interleaved image draws force a
/// flush between sources.
pub struct ImageTexture {
    id: Uuid,
    #[allow(dead_code)]
    texture: Texture,
    bind_group: BindGroup,
    width: u32,
    height: u32,
}

impl ImageTexture {
    /// Upload `pixels` (straight-alpha RGBA, row-major, top-left origin)
    /// as a nearest-filtered texture.
    pub fn from_rgba(
        device: &Device,
        queue: &Queue,
        pipeline: &ImagePipeline,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Self, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::ZeroSize { width, height });
        }
        let expected = (width * height * 4) as usize;
        if pixels.len() != expected {
            return Err(ImageError::BadLength {
                got: pixels.len(),
                expected,
                width,
                height,
            });
        }

        let texture = device.create_texture(&TextureDescriptor {
            label: Some("image_texture"),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
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
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&SamplerDescriptor {
            label: Some("image_texture_sampler"),
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            ..Default::default()
        });

        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("image_texture_bg"),
            layout: pipeline.texture_layout(),
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::TextureView(&view),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::Sampler(&sampler),
                },
            ],
        });

        Ok(Self {
            id: Uuid::new_v4(),
            texture,
            bind_group,
            width,
            height,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn bind_group(&self) -> &BindGroup {
        &self.bind_group
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

// ===================================================================
// Tests
// ===================================================================
