//! wgpu render pipelines: points, image, and the compositor blit.
//!
//! The points and image pipelines come in two variants, one per
//! [`BlendMode`], because wgpu bakes blend state into the pipeline —
//! the flush picks the variant for the screen's current mode.

pub mod blit;
pub mod image;
pub mod points;

use bytemuck::{Pod, Zeroable};
use stipple_core::BlendMode;
use wgpu::{
    BlendState, BufferAddress, VertexAttribute, VertexBufferLayout, VertexFormat,
    VertexStepMode,
};

/// Viewport uniform: logical screen size in pixels. 16 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ViewportUniform {
    pub size: [f32; 2],
    pub _pad: [f32; 2],
}

impl ViewportUniform {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: [width as f32, height as f32],
            _pad: [0.0; 2],
        }
    }
}

/// GPU blend state for a [`BlendMode`].
///
/// `Replace` overwrites destination RGBA outright. `Alpha` is standard
/// source-over with destination alpha handled correctly:
/// `src·srcA + dst·(1−srcA)` for color, `srcA + dstA·(1−srcA)` for alpha.
pub fn blend_state(mode: BlendMode) -> BlendState {
    match mode {
        BlendMode::Replace => BlendState::REPLACE,
        BlendMode::Alpha => BlendState::ALPHA_BLENDING,
    }
}

/// Position buffer: 2×f32 per vertex at location 0.
pub(crate) fn position_layout() -> VertexBufferLayout<'static> {
    static ATTRS: &[VertexAttribute] = &[VertexAttribute {
        offset: 0,
        shader_location: 0,
        format: VertexFormat::Float32x2,
    }];
    VertexBufferLayout {
        array_stride: (2 * std::mem::size_of::<f32>()) as BufferAddress,
        step_mode: VertexStepMode::Vertex,
        attributes: ATTRS,
    }
}

/// Color buffer: 4×u8 per vertex at location 1, normalized to [0, 1].
pub(crate) fn color_layout() -> VertexBufferLayout<'static> {
    static ATTRS: &[VertexAttribute] = &[VertexAttribute {
        offset: 0,
        shader_location: 1,
        format: VertexFormat::Unorm8x4,
    }];
    VertexBufferLayout {
        array_stride: 4 as BufferAddress,
        step_mode: VertexStepMode::Vertex,
        attributes: ATTRS,
    }
}

/// Tex-coord buffer: 2×f32 per vertex at location 2 (Image batches only).
pub(crate) fn tex_coord_layout() -> VertexBufferLayout<'static> {
    static ATTRS: &[VertexAttribute] = &[VertexAttribute {
        offset: 0,
        shader_location: 2,
        format: VertexFormat::Float32x2,
    }];
    VertexBufferLayout {
        array_stride: (2 * std::mem::size_of::<f32>()) as BufferAddress,
        step_mode: VertexStepMode::Vertex,
        attributes: ATTRS,
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_uniform_size() {
        assert_eq!(std::mem::size_of::<ViewportUniform>(), 16);
    }

    #[test]
    fn test_viewport_uniform_values() {
        let vp = ViewportUniform::new(320, 240);
        assert_eq!(vp.size, [320.0, 240.0]);
    }

    #[test]
    fn test_blend_states() {
        assert_eq!(blend_state(BlendMode::Replace), BlendState::REPLACE);
        assert_eq!(blend_state(BlendMode::Alpha), BlendState::ALPHA_BLENDING);
    }

    #[test]
    fn test_layout_locations_are_distinct() {
        let layouts = [position_layout(), color_layout(), tex_coord_layout()];
        for (i, layout) in layouts.iter().enumerate() {
            assert_eq!(layout.attributes.len(), 1);
            assert_eq!(layout.attributes[0].shader_location, i as u32);
            assert_eq!(layout.step_mode, VertexStepMode::Vertex);
        }
    }
}
