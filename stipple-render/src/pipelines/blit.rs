//! Compositor blit pipeline — draws the render target onto the visible
//! surface as a two-triangle full-screen quad, blending disabled.

use bytemuck::{Pod, Zeroable};
use wgpu::{
    BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingType,
    Buffer, BufferAddress, BufferDescriptor, BufferUsages, ColorTargetState,
    ColorWrites, Device, FragmentState, FrontFace, IndexFormat, MultisampleState,
    PipelineCompilationOptions, PipelineLayoutDescriptor, PolygonMode, PrimitiveState,
    PrimitiveTopology, RenderPass, RenderPipeline, RenderPipelineDescriptor,
    SamplerBindingType, ShaderModuleDescriptor, ShaderStages, TextureFormat,
    TextureSampleType, TextureViewDimension, VertexAttribute, VertexBufferLayout,
    VertexFormat, VertexState, VertexStepMode,
};

/// One corner of the full-screen quad, in [0, 1]² texture space.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct BlitVertex {
    corner: [f32; 2],
}

const QUAD_VERTICES: [BlitVertex; 4] = [
    BlitVertex { corner: [0.0, 0.0] }, // top-left
    BlitVertex { corner: [1.0, 0.0] }, // top-right
    BlitVertex { corner: [0.0, 1.0] }, // bottom-left
    BlitVertex { corner: [1.0, 1.0] }, // bottom-right
];

const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 1, 3];

fn quad_layout() -> VertexBufferLayout<'static> {
    static ATTRS: &[VertexAttribute] = &[VertexAttribute {
        offset: 0,
        shader_location: 0,
        format: VertexFormat::Float32x2,
    }];
    VertexBufferLayout {
        array_stride: std::mem::size_of::<BlitVertex>() as BufferAddress,
        step_mode: VertexStepMode::Vertex,
        attributes: ATTRS,
    }
}

/// Owns the blit pipeline, the static quad, and the bind group layout
/// render targets bind their texture+sampler against.
pub struct BlitPipeline {
    pipeline: RenderPipeline,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    layout: BindGroupLayout,
}

impl BlitPipeline {
    pub fn new(device: &Device, surface_format: TextureFormat) -> Self {
        // ── Shader ──────────────────────────────────────────────
        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("blit_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/blit.wgsl").into()),
        });

        // ── Target texture bind group layout ────────────────────
        let layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("blit_bgl"),
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
            label: Some("blit_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("blit_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: PipelineCompilationOptions::default(),
                buffers: &[quad_layout()],
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: PipelineCompilationOptions::default(),
                targets: &[Some(ColorTargetState {
                    format: surface_format,
                    blend: None, // compositor copies, never blends
                    write_mask: ColorWrites::ALL,
                })],
            }),
            primitive: PrimitiveState {
                topology: PrimitiveTopology::TriangleList,
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
        });

        // ── Static quad geometry, written at creation ───────────
        let vertex_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("blit_quad_vb"),
            size: std::mem::size_of_val(&QUAD_VERTICES) as u64,
            usage: BufferUsages::VERTEX,
            mapped_at_creation: true,
        });
        vertex_buffer
            .slice(..)
            .get_mapped_range_mut()
            .copy_from_slice(bytemuck::cast_slice(&QUAD_VERTICES));
        vertex_buffer.unmap();

        let index_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("blit_quad_ib"),
            size: std::mem::size_of_val(&QUAD_INDICES) as u64,
            usage: BufferUsages::INDEX,
            mapped_at_creation: true,
        });
        index_buffer
            .slice(..)
            .get_mapped_range_mut()
            .copy_from_slice(bytemuck::cast_slice(&QUAD_INDICES));
        index_buffer.unmap();

        Self {
            pipeline,
            vertex_buffer,
            index_buffer,
            layout,
        }
    }

    /// Layout render targets bind against (texture + nearest sampler).
    pub fn layout(&self) -> &BindGroupLayout {
        &self.layout
    }

    /// Record the full-screen blit. `bind_group` is the render target's
    /// blit bind group.
    pub fn draw<'a>(&'a self, pass: &mut RenderPass<'a>, bind_group: &'a wgpu::BindGroup) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), IndexFormat::Uint16);
        pass.draw_indexed(0..6, 0, 0..1);
    }
}
