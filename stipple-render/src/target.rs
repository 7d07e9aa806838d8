//! The offscreen render target every batched draw lands in.
//!
//! One `Rgba8Unorm` texture sized exactly to the logical screen, usable as
//! a render attachment (flush draws into it), a binding (the compositor
//! samples it), and a copy source (readback). Non-sRGB so the 8-bit colors
//! staged by the batches round-trip bit-exactly through readback. Sampling
//! is nearest-neighbor with clamp-to-edge — pixel-perfect, no smoothing.
//!
//! Targets are never resized in place: a screen resize tears this one
//! down and creates a fresh one. Content preservation across resize is the
//! caller's policy.

use thiserror::Error;
use wgpu::{
    AddressMode, BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout,
    BindingResource, Device, Extent3d, FilterMode, SamplerDescriptor, Texture,
    TextureDescriptor, TextureDimension, TextureFormat, TextureUsages, TextureView,
    TextureViewDescriptor,
};

/// Pixel format of every render target. Straight (non-sRGB) unorm.
pub const TARGET_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

#[derive(Error, Debug)]
pub enum TargetError {
    #[error("Render target dimensions must be non-zero (got {width}x{height})")]
    ZeroSize { width: u32, height: u32 },
    #[error("Render target {width}x{height} exceeds device limit {limit}")]
    TooLarge { width: u32, height: u32, limit: u32 },
}

/// Offscreen texture the flush renders into and the compositor blits from.
/// The nearest/clamp sampler lives inside the blit bind group.
pub struct RenderTarget {
    texture: Texture,
    view: TextureView,
    blit_bind_group: BindGroup,
    width: u32,
    height: u32,
}

impl RenderTarget {
    /// Allocate a target of exactly `width × height`.
    ///
    /// `blit_layout` is the compositor's texture+sampler bind group
    /// layout. Invalid dimensions are fatal initialization errors — there
    /// is no fallback target.
    pub fn create(
        device: &Device,
        blit_layout: &BindGroupLayout,
        width: u32,
        height: u32,
    ) -> Result<Self, TargetError> {
        if width == 0 || height == 0 {
            return Err(TargetError::ZeroSize { width, height });
        }
        let limit = device.limits().max_texture_dimension_2d;
        if width > limit || height > limit {
            return Err(TargetError::TooLarge {
                width,
                height,
                limit,
            });
        }

        let texture = device.create_texture(&TextureDescriptor {
            label: Some("stipple_target"),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: TextureUsages::RENDER_ATTACHMENT
                | TextureUsages::TEXTURE_BINDING
                | TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&TextureViewDescriptor::default());

        let sampler = device.create_sampler(&SamplerDescriptor {
            label: Some("stipple_target_sampler"),
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            mipmap_filter: FilterMode::Nearest,
            ..Default::default()
        });

        let blit_bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("stipple_target_blit_bg"),
            layout: blit_layout,
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
            texture,
            view,
            blit_bind_group,
            width,
            height,
        })
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn view(&self) -> &TextureView {
        &self.view
    }

    /// Bind group the compositor uses to sample this target.
    pub fn blit_bind_group(&self) -> &BindGroup {
        &self.blit_bind_group
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether `(x, y)` is inside the target, top-left origin.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GpuContext;
    use crate::pipelines::blit::BlitPipeline;

    #[test]
    fn test_create_and_bounds() {
        let gpu = pollster::block_on(GpuContext::new_headless());
        if let Ok(gpu) = gpu {
            let blit = BlitPipeline::new(&gpu.device, TARGET_FORMAT);
            let target = RenderTarget::create(&gpu.device, blit.layout(), 10, 20).unwrap();
            assert_eq!(target.width(), 10);
            assert_eq!(target.height(), 20);
            assert!(target.contains(0, 0));
            assert!(target.contains(9, 19));
            assert!(!target.contains(10, 19));
            assert!(!target.contains(-1, 0));
            assert!(!target.contains(0, 20));
        }
    }

    #[test]
    fn test_zero_size_is_fatal() {
        let gpu = pollster::block_on(GpuContext::new_headless());
        if let Ok(gpu) = gpu {
            let blit = BlitPipeline::new(&gpu.device, TARGET_FORMAT);
            let err = RenderTarget::create(&gpu.device, blit.layout(), 0, 10);
            assert!(matches!(err, Err(TargetError::ZeroSize { .. })));
        }
    }

    #[test]
    fn test_oversized_is_fatal() {
        let gpu = pollster::block_on(GpuContext::new_headless());
        if let Ok(gpu) = gpu {
            let blit = BlitPipeline::new(&gpu.device, TARGET_FORMAT);
            let limit = gpu.device.limits().max_texture_dimension_2d;
            let err = RenderTarget::create(&gpu.device, blit.layout(), limit + 1, 8);
            assert!(matches!(err, Err(TargetError::TooLarge { .. })));
        }
    }
}
