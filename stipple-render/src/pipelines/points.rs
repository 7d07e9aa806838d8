//! Point-list pipeline — one GPU point per staged pixel.
//!
//! Two pre-built variants, one per blend mode; vertex data streams from
//! a batch's separate position and color buffers.

use stipple_core::BlendMode;
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout,
    BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingType, Buffer,
    BufferBindingType, BufferDescriptor, BufferUsages, ColorTargetState, ColorWrites,
    Device, FragmentState, FrontFace, MultisampleState, PipelineCompilationOptions,
    PipelineLayoutDescriptor, PolygonMode, PrimitiveState, PrimitiveTopology, Queue,
    RenderPipeline, RenderPipelineDescriptor, ShaderModuleDescriptor, ShaderStages,
    TextureFormat, VertexState,
};

use crate::pipelines::{blend_state, color_layout, position_layout, ViewportUniform};

/// Owns the wgpu pipeline variants and viewport uniform for point draws.
pub struct PointsPipeline {
    replace: RenderPipeline,
    alpha: RenderPipeline,
    viewport_buffer: Buffer,
    viewport_bind_group: BindGroup,
}

impl PointsPipeline {
    pub fn new(device: &Device, target_format: TextureFormat) -> Self {
        // ── Shader ──────────────────────────────────────────────
        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("points_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/points.wgsl").into()),
        });

        // ── Viewport bind group layout ──────────────────────────
        let viewport_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("points_viewport_bgl"),
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

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("points_pipeline_layout"),
            bind_group_layouts: &[&viewport_bgl],
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
                    buffers: &[position_layout(), color_layout()],
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
                    topology: PrimitiveTopology::PointList,
                    strip_index_format: None,
                    front_face: FrontFace::Ccw,
                    cull_mode: None,
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

        let replace = build(BlendMode::Replace, "points_pipeline_replace");
        let alpha = build(BlendMode::Alpha, "points_pipeline_alpha");

        // ── Viewport uniform ────────────────────────────────────
        let viewport_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("points_viewport_ub"),
            size: std::mem::size_of::<ViewportUniform>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let viewport_bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("points_viewport_bg"),
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
}
