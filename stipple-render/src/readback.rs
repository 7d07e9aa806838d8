//! Pixel readback from the render target — synchronous and deferred.
//!
//! Every read flushes first, so the target reflects all pending draws
//! before the copy. Coordinate conventions live here: callers speak
//! top-left-origin pixels, and wgpu's texture→buffer copies are already
//! top-origin (row 0 of the mapped buffer is the top row), so the
//! bottom-origin flip older GPU APIs require reduces to row unpadding.
//!
//! The deferred variants enqueue the identical synchronous logic to be
//! run by the host frame loop at its next tick ([`ScreenRenderer::
//! service_deferred`]); results are delivered through a completion
//! handle and match the synchronous calls exactly.

use std::sync::mpsc;

use log::trace;
use stipple_core::Color;
use wgpu::{
    BufferDescriptor, BufferUsages, CommandEncoderDescriptor, Extent3d, Origin3d,
    COPY_BYTES_PER_ROW_ALIGNMENT,
};

use crate::context::GpuContext;
use crate::screen::ScreenRenderer;
use crate::target::RenderTarget;

/// A deferred read, queued until the next frame tick.
#[derive(Clone, Copy, Debug)]
pub enum ReadRequest {
    Pixel { x: i32, y: i32 },
    Rect { x: i32, y: i32, width: u32, height: u32 },
}

/// Result of a deferred read. Mirrors the synchronous return types.
#[derive(Clone, Debug)]
pub enum ReadResult {
    Pixel(Option<Color>),
    Rect(Vec<Vec<Color>>),
}

pub(crate) struct PendingRead {
    request: ReadRequest,
    reply: mpsc::Sender<ReadResult>,
}

/// Completion handle for a deferred read.
pub struct ReadbackHandle {
    rx: mpsc::Receiver<ReadResult>,
}

impl ReadbackHandle {
    /// The result, if the frame loop has serviced this read yet.
    pub fn try_take(&self) -> Option<ReadResult> {
        self.rx.try_recv().ok()
    }

    /// Block until serviced. `None` if the screen was dropped first.
    pub fn take(self) -> Option<ReadResult> {
        self.rx.recv().ok()
    }
}

impl ScreenRenderer {
    /// Read one pixel, top-left origin. Out of bounds → `None`, no
    /// panic. Forces a flush so the value reflects every draw issued
    /// before the call.
    pub fn read_pixel(&mut self, gpu: &GpuContext, x: i32, y: i32) -> Option<Color> {
        if gpu.is_lost() || !self.target.contains(x, y) {
            return None;
        }
        self.flush(gpu);
        let rows = read_rect(gpu, &self.target, x as u32, y as u32, 1, 1);
        rows.into_iter().next().and_then(|row| row.into_iter().next())
    }

    /// Read a rectangle, clamped to screen bounds. The clamped rectangle
    /// being empty yields an empty vec; otherwise one bulk copy returns
    /// top-origin `[row][col]` colors.
    pub fn read_pixels(
        &mut self,
        gpu: &GpuContext,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    ) -> Vec<Vec<Color>> {
        if gpu.is_lost() {
            return Vec::new();
        }
        let x0 = x.max(0) as i64;
        let y0 = y.max(0) as i64;
        let x1 = (x as i64 + width as i64).min(self.target.width() as i64);
        let y1 = (y as i64 + height as i64).min(self.target.height() as i64);
        if x0 >= x1 || y0 >= y1 {
            return Vec::new();
        }
        self.flush(gpu);
        read_rect(
            gpu,
            &self.target,
            x0 as u32,
            y0 as u32,
            (x1 - x0) as u32,
            (y1 - y0) as u32,
        )
    }

    /// Queue a single-pixel read for the next frame tick.
    pub fn read_pixel_deferred(&mut self, x: i32, y: i32) -> ReadbackHandle {
        self.queue_read(ReadRequest::Pixel { x, y })
    }

    /// Queue a rectangle read for the next frame tick.
    pub fn read_pixels_deferred(
        &mut self,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    ) -> ReadbackHandle {
        self.queue_read(ReadRequest::Rect { x, y, width, height })
    }

    fn queue_read(&mut self, request: ReadRequest) -> ReadbackHandle {
        let (tx, rx) = mpsc::channel();
        self.pending_reads.push(PendingRead { request, reply: tx });
        ReadbackHandle { rx }
    }

    /// Run every queued deferred read. Called once per tick by the host
    /// frame loop; returns how many reads were serviced.
    pub fn service_deferred(&mut self, gpu: &GpuContext) -> usize {
        let pending = std::mem::take(&mut self.pending_reads);
        let count = pending.len();
        for read in pending {
            let result = match read.request {
                ReadRequest::Pixel { x, y } => ReadResult::Pixel(self.read_pixel(gpu, x, y)),
                ReadRequest::Rect { x, y, width, height } => {
                    ReadResult::Rect(self.read_pixels(gpu, x, y, width, height))
                }
            };
            // A dropped handle just means nobody wants the answer.
            let _ = read.reply.send(result);
        }
        if count > 0 {
            trace!("{}: serviced {count} deferred read(s)", self.id);
        }
        count
    }
}

/// One synchronous texture→buffer copy of an in-bounds rectangle.
fn read_rect(
    gpu: &GpuContext,
    target: &RenderTarget,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
) -> Vec<Vec<Color>> {
    debug_assert!(x + width <= target.width() && y + height <= target.height());

    let unpadded = width * 4;
    let padded = unpadded.div_ceil(COPY_BYTES_PER_ROW_ALIGNMENT) * COPY_BYTES_PER_ROW_ALIGNMENT;

    let staging = gpu.device.create_buffer(&BufferDescriptor {
        label: Some("stipple_readback"),
        size: (padded * height) as u64,
        usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = gpu.device.create_command_encoder(&CommandEncoderDescriptor {
        label: Some("stipple_readback_encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: target.texture(),
            mip_level: 0,
            origin: Origin3d { x, y, z: 0 },
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    gpu.queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = gpu.device.poll(wgpu::Maintain::Wait);
    if rx.recv().map_or(true, |r| r.is_err()) {
        return Vec::new();
    }

    let data = slice.get_mapped_range();
    let mut rows = Vec::with_capacity(height as usize);
    for row in 0..height {
        let start = (row * padded) as usize;
        let row_bytes = &data[start..start + unpadded as usize];
        rows.push(
            row_bytes
                .chunks_exact(4)
                .map(|px| Color::new(px[0], px[1], px[2], px[3]))
                .collect(),
        );
    }
    drop(data);
    staging.unmap();
    rows
}
