//! GPU context — owns `wgpu::Device`, `Queue`, and optional `Surface`,
//! plus the device-lost flag every screen consults before touching the GPU.
//!
//! Two construction paths:
//!
//! 1. **Headless** (`GpuContext::new_headless`) — no window, no surface.
//!    Used by tests and offscreen drawing.
//!
//! 2. **Windowed** (`GpuContext::new_with_surface`) — requires a
//!    `raw_window_handle`-compatible window. Used by `stipple-desktop`.
//!
//! Device loss is a recoverable runtime condition, not an error: the
//! callback installed at creation flips an atomic flag, and every draw,
//! flush, present, and readback becomes a silent no-op until the owner of
//! the affected screens calls `ScreenRenderer::reinitialize`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use thiserror::Error;
use wgpu::{
    Adapter, Device, DeviceDescriptor, Instance, InstanceDescriptor, Queue,
    RequestAdapterOptions, Surface, SurfaceConfiguration, TextureFormat,
    TextureUsages,
};

#[derive(Error, Debug)]
pub enum GpuError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,
    #[error("Failed to request device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("Surface error: {0}")]
    Surface(String),
}

/// Core GPU state shared by all screens drawing through this context.
pub struct GpuContext {
    pub device: Device,
    pub queue: Queue,
    pub adapter: Adapter,
    /// Present only when drawing to a window.
    pub surface: Option<Surface<'static>>,
    pub surface_config: Option<SurfaceConfiguration>,
    pub surface_format: TextureFormat,
    lost: Arc<AtomicBool>,
}

impl GpuContext {
    /// Create a headless context (no window, no surface).
    pub async fn new_headless() -> Result<Self, GpuError> {
        let instance = Instance::new(&InstanceDescriptor::default());

        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("stipple-headless"),
                    ..Default::default()
                },
                None,
            )
            .await?;

        let lost = Self::install_lost_callback(&device);

        Ok(Self {
            device,
            queue,
            adapter,
            surface: None,
            surface_config: None,
            // Offscreen targets are Rgba8Unorm regardless; this only
            // matters when a surface is attached later.
            surface_format: TextureFormat::Bgra8UnormSrgb,
            lost,
        })
    }

    /// Create a context with a surface attached to `window`.
    ///
    /// The caller must ensure `window` outlives the returned `GpuContext`.
    pub async fn new_with_surface<W>(window: W, width: u32, height: u32) -> Result<Self, GpuError>
    where
        W: wgpu::WasmNotSendSync + Into<wgpu::SurfaceTarget<'static>>,
    {
        let instance = Instance::new(&InstanceDescriptor::default());

        let surface = instance
            .create_surface(window)
            .map_err(|e| GpuError::Surface(e.to_string()))?;

        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("stipple-windowed"),
                    ..Default::default()
                },
                None,
            )
            .await?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(caps.formats[0]);

        let config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: wgpu::PresentMode::Fifo, // VSync
            desired_maximum_frame_latency: 2,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        info!(
            "GPU context ready: {} ({:?}), surface {}x{} {:?}",
            adapter.get_info().name,
            adapter.get_info().backend,
            width,
            height,
            format
        );

        let lost = Self::install_lost_callback(&device);

        Ok(Self {
            device,
            queue,
            adapter,
            surface: Some(surface),
            surface_config: Some(config),
            surface_format: format,
            lost,
        })
    }

    fn install_lost_callback(device: &Device) -> Arc<AtomicBool> {
        let lost = Arc::new(AtomicBool::new(false));
        let flag = lost.clone();
        device.set_device_lost_callback(move |reason, message| {
            warn!("GPU device lost ({reason:?}): {message}");
            flag.store(true, Ordering::SeqCst);
        });
        lost
    }

    /// True once the device has been lost. Screens check this before any
    /// GPU work and no-op while it is set.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// Clear the lost flag after the caller has rebuilt all GPU resources.
    /// `ScreenRenderer::reinitialize` calls this once per recovery.
    pub fn mark_restored(&self) {
        self.lost.store(false, Ordering::SeqCst);
    }

    /// Resize the surface. No-op if headless.
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        if let Some(config) = &mut self.surface_config {
            if width == 0 || height == 0 {
                return;
            }
            config.width = width;
            config.height = height;
            if let Some(surface) = &self.surface {
                surface.configure(&self.device, config);
            }
        }
    }

    /// Current surface dimensions, or `(0, 0)` if headless.
    pub fn surface_size(&self) -> (u32, u32) {
        self.surface_config
            .as_ref()
            .map(|c| (c.width, c.height))
            .unwrap_or((0, 0))
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_has_no_surface() {
        let ctx = pollster::block_on(GpuContext::new_headless());
        // May fail in CI without a GPU — skip gracefully.
        if let Ok(ctx) = ctx {
            assert_eq!(ctx.surface_size(), (0, 0));
            assert!(ctx.surface.is_none());
            assert!(ctx.surface_config.is_none());
            assert!(!ctx.is_lost());
        }
    }

    #[test]
    fn test_lost_flag_roundtrip() {
        let ctx = pollster::block_on(GpuContext::new_headless());
        if let Ok(ctx) = ctx {
            ctx.lost.store(true, Ordering::SeqCst);
            assert!(ctx.is_lost());
            ctx.mark_restored();
            assert!(!ctx.is_lost());
        }
    }
}
