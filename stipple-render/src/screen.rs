//! Per-screen rendering state and frame orchestration.
//!
//! [`ScreenRenderer`] is the explicit per-screen instance every operation
//! runs against — batches, draw-order tracker, render target, pipelines,
//! blend mode, compiled pen, and scheduling flags. Nothing is shared
//! across screens and nothing is process-global.
//!
//! The flush path is where the immediate-mode promise is kept: staged
//! batches upload, then one draw call replays per recorded span, in
//! issuance order, under the blend state of the screen's current mode,
//! into the persistent offscreen target. `present` blits that target to
//! the visible surface; the host frame loop drives both through the
//! dirty flag so any number of draws coalesce into one flush per frame.

use std::time::Instant;

use log::{debug, error, trace, warn};
use thiserror::Error;
use uuid::Uuid;
use wgpu::{
    CommandEncoderDescriptor, LoadOp, Operations, RenderPassColorAttachment,
    RenderPassDescriptor, StoreOp, TextureViewDescriptor,
};

use stipple_core::{BlendMode, Color, Pen, ScreenId};

use crate::batch::{Batch, BatchKind, Reserve};
use crate::context::GpuContext;
use crate::order::DrawOrderTracker;
use crate::pen::CompiledPen;
use crate::pipelines::blit::BlitPipeline;
use crate::pipelines::image::{ImagePipeline, ImageTexture};
use crate::pipelines::points::PointsPipeline;
use crate::readback::PendingRead;
use crate::target::{RenderTarget, TargetError, TARGET_FORMAT};

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error("No surface configured (headless mode)")]
    NoSurface,
    #[error(transparent)]
    Target(#[from] TargetError),
}

/// Work performed by one flush, for logging and tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlushStats {
    /// Draw calls issued (one per non-empty span).
    pub draw_calls: u32,
    /// Vertices drawn across all spans.
    pub vertices: u32,
}

/// One staging batch per kind.
pub(crate) struct BatchSet {
    pub points: Batch,
    pub image: Batch,
}

impl BatchSet {
    fn new() -> Self {
        Self {
            points: Batch::new(BatchKind::Points),
            image: Batch::new(BatchKind::Image),
        }
    }

    pub(crate) fn get(&self, kind: BatchKind) -> &Batch {
        match kind {
            BatchKind::Points => &self.points,
            BatchKind::Image => &self.image,
        }
    }

    fn get_mut(&mut self, kind: BatchKind) -> &mut Batch {
        match kind {
            BatchKind::Points => &mut self.points,
            BatchKind::Image => &mut self.image,
        }
    }
}

/// All rendering state for one logical screen.
pub struct ScreenRenderer {
    pub(crate) id: ScreenId,
    pub(crate) width: u32,
    pub(crate) height: u32,
    points_pipeline: PointsPipeline,
    image_pipeline: ImagePipeline,
    blit_pipeline: BlitPipeline,
    pub(crate) batches: BatchSet,
    tracker: DrawOrderTracker,
    pub(crate) target: RenderTarget,
    blend: BlendMode,
    pen: CompiledPen,
    /// Image source the staged Image spans sample from.
    current_image: Option<(Uuid, wgpu::BindGroup)>,
    /// One pending flush+present per frame, however many draws arrive.
    dirty: bool,
    /// First-flush bookkeeping: the target clears to transparent exactly
    /// once, then behaves as persistent video memory.
    cleared: bool,
    pub(crate) pending_reads: Vec<PendingRead>,
}

impl ScreenRenderer {
    /// Create the renderer for a `width × height` logical screen.
    ///
    /// Fails on invalid target dimensions — there is no fallback here;
    /// choosing a different renderer is the caller's policy.
    pub fn new(gpu: &GpuContext, width: u32, height: u32) -> Result<Self, RenderError> {
        let points_pipeline = PointsPipeline::new(&gpu.device, TARGET_FORMAT);
        let image_pipeline = ImagePipeline::new(&gpu.device, TARGET_FORMAT);
        let blit_pipeline = BlitPipeline::new(&gpu.device, gpu.surface_format);
        let target = RenderTarget::create(&gpu.device, blit_pipeline.layout(), width, height)?;

        let id = ScreenId::new();
        debug!("{id}: created {width}x{height}");

        Ok(Self {
            id,
            width,
            height,
            points_pipeline,
            image_pipeline,
            blit_pipeline,
            batches: BatchSet::new(),
            tracker: DrawOrderTracker::new(),
            target,
            blend: BlendMode::default(),
            pen: CompiledPen::compile(Pen::default(), width, height),
            current_image: None,
            dirty: false,
            cleared: false,
            pending_reads: Vec::new(),
        })
    }

    pub fn id(&self) -> ScreenId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend
    }

    pub fn pen(&self) -> Pen {
        self.pen.pen()
    }

    // ───────────────────── Staging ────────────────────────────────

    /// Guarantee room for `additional` elements in the batch of `kind`
    /// and record the draw-order switch if the active kind changes.
    ///
    /// When the requirement exceeds the batch's hard ceiling, the whole
    /// screen flushes immediately and the reservation retries — a single
    /// accumulation burst never outgrows `max_capacity`. A request too
    /// large for even an empty batch is dropped with a logged error
    /// rather than retried forever.
    pub fn prepare(&mut self, gpu: &GpuContext, kind: BatchKind, additional: usize) {
        if gpu.is_lost() {
            return;
        }
        loop {
            if self.tracker.active() != Some(kind) {
                let prev_count = self
                    .tracker
                    .active()
                    .map(|k| self.batches.get(k).count())
                    .unwrap_or(0);
                self.tracker
                    .switch_to(kind, prev_count, self.batches.get(kind).count());
            }
            match self.batches.get_mut(kind).reserve(additional) {
                Reserve::Ready => return,
                Reserve::NeedsFlush if self.batches.get(kind).is_empty() => {
                    // Flushing cannot make room for a request this big.
                    error!(
                        "{}: reservation of {additional} {kind:?} elements exceeds the \
                         batch ceiling; draw dropped",
                        self.id
                    );
                    return;
                }
                Reserve::NeedsFlush => {
                    trace!("{}: mid-burst flush for {} more elements", self.id, additional);
                    self.flush(gpu);
                }
            }
        }
    }

    /// Append one pixel to the point batch. Unchecked hot path: the
    /// caller must have `prepare`d room for at least this many pixels.
    #[inline]
    pub fn push_pixel(&mut self, x: f32, y: f32, color: Color) {
        self.batches.points.push_point(x, y, color);
    }

    /// Stamp the compiled pen at `(x, y)`: reserves the pen's worst
    /// case, runs the specialized routine, and schedules a render.
    pub fn stamp(&mut self, gpu: &GpuContext, x: i32, y: i32, color: Color) {
        if gpu.is_lost() {
            return;
        }
        self.prepare(gpu, BatchKind::Points, self.pen.max_pixels());
        self.pen.run(&mut self.batches.points, x, y, color);
        self.mark_dirty();
    }

    /// Upload RGBA pixels as an image this screen can draw.
    pub fn create_image(
        &self,
        gpu: &GpuContext,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<ImageTexture, crate::pipelines::image::ImageError> {
        ImageTexture::from_rgba(&gpu.device, &gpu.queue, &self.image_pipeline, pixels, width, height)
    }

    /// Stage `image` as a textured quad with its top-left at `(x, y)`.
    ///
    /// Interleaving draws from different images forces a flush at the
    /// switch — one texture binds per flush for the image batch.
    pub fn draw_image(&mut self, gpu: &GpuContext, image: &ImageTexture, x: i32, y: i32) {
        if gpu.is_lost() {
            return;
        }
        let switching = self
            .current_image
            .as_ref()
            .is_some_and(|(id, _)| *id != image.id());
        if switching && !self.batches.image.is_empty() {
            self.flush(gpu);
        }
        self.current_image = Some((image.id(), image.bind_group().clone()));

        self.prepare(gpu, BatchKind::Image, 6);
        let (x, y) = (x as f32, y as f32);
        let (w, h) = (image.width() as f32, image.height() as f32);
        let tint = Color::rgb(255, 255, 255);
        let batch = &mut self.batches.image;
        batch.push_image_vertex(x, y, 0.0, 0.0, tint);
        batch.push_image_vertex(x, y + h, 0.0, 1.0, tint);
        batch.push_image_vertex(x + w, y, 1.0, 0.0, tint);
        batch.push_image_vertex(x + w, y, 1.0, 0.0, tint);
        batch.push_image_vertex(x, y + h, 0.0, 1.0, tint);
        batch.push_image_vertex(x + w, y + h, 1.0, 1.0, tint);
        self.mark_dirty();
    }

    // ───────────────────── Configuration ──────────────────────────

    /// Replace the pen; recompiles the specialized stamp routine.
    pub fn set_pen(&mut self, pen: Pen) {
        if pen != self.pen.pen() {
            self.pen = CompiledPen::compile(pen, self.width, self.height);
        }
    }

    /// Switch blend modes. Pending draws flush (and present, when a
    /// surface exists) under the *old* mode first — a mode change never
    /// re-blends already-issued draws.
    pub fn set_blend_mode(&mut self, gpu: &GpuContext, mode: BlendMode) {
        if mode == self.blend {
            return;
        }
        self.flush(gpu);
        if gpu.surface.is_some() {
            if let Err(e) = self.present(gpu) {
                warn!("{}: present on blend switch failed: {e}", self.id);
            }
        }
        self.blend = mode;
    }

    // ───────────────────── Scheduling ─────────────────────────────

    /// Schedule one flush+present. Idempotent — any number of draws in
    /// a frame coalesce into a single pending render.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Consume the dirty flag; the frame loop renders when this is true.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    // ───────────────────── Flush ──────────────────────────────────

    /// Upload staged batches and replay the recorded spans into the
    /// render target, in issuance order, under the current blend mode.
    ///
    /// Idempotent: with nothing staged (and the first clear done) this
    /// touches no GPU state beyond the shrink bookkeeping.
    pub fn flush(&mut self, gpu: &GpuContext) -> FlushStats {
        if gpu.is_lost() {
            return FlushStats::default();
        }

        let active_count = self
            .tracker
            .active()
            .map(|k| self.batches.get(k).count())
            .unwrap_or(0);
        let spans = self.tracker.drain(active_count);

        let needs_clear = !self.cleared;
        if spans.is_empty() && !needs_clear {
            // Nothing to draw; still advance the shrink windows.
            let now = Instant::now();
            self.batches.points.reset(now);
            self.batches.image.reset(now);
            return FlushStats::default();
        }

        self.batches.points.upload(&gpu.device, &gpu.queue);
        self.batches.image.upload(&gpu.device, &gpu.queue);
        self.points_pipeline
            .upload_viewport(&gpu.queue, self.width, self.height);
        self.image_pipeline
            .upload_viewport(&gpu.queue, self.width, self.height);

        let mut stats = FlushStats::default();
        let mut encoder = gpu.device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("stipple_flush_encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("stipple_flush_pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: self.target.view(),
                    resolve_target: None,
                    ops: Operations {
                        // Cleared exactly once; afterwards the target is
                        // persistent video memory.
                        load: if needs_clear {
                            LoadOp::Clear(wgpu::Color::TRANSPARENT)
                        } else {
                            LoadOp::Load
                        },
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for span in &spans {
                let range = span.start as u32..span.end as u32;
                match span.kind {
                    BatchKind::Points => {
                        let Some(buffers) = self.batches.points.gpu() else {
                            continue;
                        };
                        pass.set_pipeline(self.points_pipeline.pipeline(self.blend));
                        pass.set_bind_group(0, self.points_pipeline.viewport_bind_group(), &[]);
                        pass.set_vertex_buffer(0, buffers.vertices.slice(..));
                        pass.set_vertex_buffer(1, buffers.colors.slice(..));
                        pass.draw(range, 0..1);
                    }
                    BatchKind::Image => {
                        let Some(buffers) = self.batches.image.gpu() else {
                            continue;
                        };
                        let Some((_, image_bg)) = &self.current_image else {
                            continue;
                        };
                        let Some(tex_coords) = buffers.tex_coords.as_ref() else {
                            continue;
                        };
                        pass.set_pipeline(self.image_pipeline.pipeline(self.blend));
                        pass.set_bind_group(0, self.image_pipeline.viewport_bind_group(), &[]);
                        pass.set_bind_group(1, image_bg, &[]);
                        pass.set_vertex_buffer(0, buffers.vertices.slice(..));
                        pass.set_vertex_buffer(1, buffers.colors.slice(..));
                        pass.set_vertex_buffer(2, tex_coords.slice(..));
                        pass.draw(range, 0..1);
                    }
                }
                stats.draw_calls += 1;
                stats.vertices += span.len() as u32;
            }
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
        self.cleared = true;

        let now = Instant::now();
        self.batches.points.reset(now);
        self.batches.image.reset(now);

        trace!(
            "{}: flushed {} draw call(s), {} vertices",
            self.id,
            stats.draw_calls,
            stats.vertices
        );
        stats
    }

    // ───────────────────── Present ────────────────────────────────

    /// Blit the render target onto the visible surface.
    pub fn present(&mut self, gpu: &GpuContext) -> Result<(), RenderError> {
        if gpu.is_lost() {
            return Ok(());
        }
        let surface = gpu.surface.as_ref().ok_or(RenderError::NoSurface)?;
        let frame = surface.get_current_texture()?;
        let view = frame.texture.create_view(&TextureViewDescriptor::default());

        let mut encoder = gpu.device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("stipple_present_encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("stipple_present_pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.blit_pipeline
                .draw(&mut pass, self.target.blit_bind_group());
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }

    /// Flush and present if a render is pending. The frame-loop entry
    /// point; returns whether anything was rendered.
    pub fn render_if_dirty(&mut self, gpu: &GpuContext) -> Result<bool, RenderError> {
        if !self.take_dirty() {
            return Ok(false);
        }
        self.flush(gpu);
        match self.present(gpu) {
            // Headless screens flush without presenting.
            Err(RenderError::NoSurface) => Ok(true),
            Err(e) => Err(e),
            Ok(()) => Ok(true),
        }
    }

    // ───────────────────── Lifecycle ──────────────────────────────

    /// Resize the logical screen: the render target is recreated (not
    /// resized in place) and cleared on the next flush; the pen
    /// recompiles against the new bounds. Old content is gone — blit it
    /// beforehand if preservation is wanted.
    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) -> Result<(), RenderError> {
        if width == self.width && height == self.height {
            return Ok(());
        }
        self.target = RenderTarget::create(&gpu.device, self.blit_pipeline.layout(), width, height)?;
        self.width = width;
        self.height = height;
        self.pen = CompiledPen::compile(self.pen.pen(), width, height);
        self.cleared = false;
        debug!("{}: resized to {width}x{height}", self.id);
        Ok(())
    }

    /// Rebuild every GPU resource after a device-loss notification and
    /// clear the lost flag. Scheduling state resets; staged draws from
    /// the lost period are discarded.
    pub fn reinitialize(&mut self, gpu: &GpuContext) -> Result<(), RenderError> {
        self.points_pipeline = PointsPipeline::new(&gpu.device, TARGET_FORMAT);
        self.image_pipeline = ImagePipeline::new(&gpu.device, TARGET_FORMAT);
        self.blit_pipeline = BlitPipeline::new(&gpu.device, gpu.surface_format);
        self.target =
            RenderTarget::create(&gpu.device, self.blit_pipeline.layout(), self.width, self.height)?;
        let now = Instant::now();
        for batch in [&mut self.batches.points, &mut self.batches.image] {
            batch.release_gpu();
            batch.reset(now);
        }
        self.tracker = DrawOrderTracker::new();
        self.current_image = None;
        self.dirty = false;
        self.cleared = false;
        self.pending_reads.clear();
        gpu.mark_restored();
        debug!("{}: reinitialized after device loss", self.id);
        Ok(())
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn headless() -> Option<GpuContext> {
        pollster::block_on(GpuContext::new_headless()).ok()
    }

    #[test]
    fn test_new_screen_state() {
        let Some(gpu) = headless() else { return };
        let screen = ScreenRenderer::new(&gpu, 10, 10).unwrap();
        assert_eq!(screen.width(), 10);
        assert_eq!(screen.height(), 10);
        assert_eq!(screen.blend_mode(), BlendMode::Replace);
        assert!(!screen.is_dirty());
    }

    #[test]
    fn test_prepare_switches_spans_across_kinds() {
        let Some(gpu) = headless() else { return };
        let mut screen = ScreenRenderer::new(&gpu, 10, 10).unwrap();

        screen.prepare(&gpu, BatchKind::Points, 3);
        for i in 0..3 {
            screen.push_pixel(i as f32, 0.0, Color::rgb(255, 0, 0));
        }
        screen.prepare(&gpu, BatchKind::Image, 6);
        screen.prepare(&gpu, BatchKind::Points, 2);
        for i in 0..2 {
            screen.push_pixel(i as f32, 1.0, Color::rgb(0, 255, 0));
        }

        // Points staged across two spans share one batch.
        assert_eq!(screen.batches.points.count(), 5);
    }

    #[test]
    fn test_flush_idempotence() {
        let Some(gpu) = headless() else { return };
        let mut screen = ScreenRenderer::new(&gpu, 10, 10).unwrap();

        screen.stamp(&gpu, 5, 5, Color::rgb(255, 0, 0));
        let first = screen.flush(&gpu);
        assert_eq!(first.draw_calls, 1);
        assert_eq!(screen.batches.points.count(), 0);

        // Second flush with nothing staged: no GPU work.
        let second = screen.flush(&gpu);
        assert_eq!(second.draw_calls, 0);
        assert_eq!(second.vertices, 0);
    }

    #[test]
    fn test_dirty_flag_coalesces() {
        let Some(gpu) = headless() else { return };
        let mut screen = ScreenRenderer::new(&gpu, 10, 10).unwrap();

        for i in 0..50 {
            screen.stamp(&gpu, i % 10, i / 10, Color::rgb(255, 255, 255));
        }
        assert!(screen.is_dirty());
        assert!(screen.take_dirty());
        // Consumed: the next frame has nothing scheduled.
        assert!(!screen.take_dirty());
    }

    #[test]
    fn test_mid_burst_flush_bounds_capacity() {
        let Some(gpu) = headless() else { return };
        let mut screen = ScreenRenderer::new(&gpu, 64, 64).unwrap();

        // Push far past max capacity in one logical burst; the forced
        // flushes keep every reservation within bounds.
        let max = screen.batches.points.max_capacity();
        let burst = max * 2 + 17;
        for i in 0..burst {
            screen.prepare(&gpu, BatchKind::Points, 1);
            screen.push_pixel((i % 64) as f32, ((i / 64) % 64) as f32, Color::rgb(1, 2, 3));
        }
        assert!(screen.batches.points.count() <= max);
    }

    #[test]
    fn test_impossible_reservation_drops_instead_of_spinning() {
        let Some(gpu) = headless() else { return };
        let mut screen = ScreenRenderer::new(&gpu, 10, 10).unwrap();

        let too_big = screen.batches.points.max_capacity() + 1;
        screen.prepare(&gpu, BatchKind::Points, too_big);
        // Returned (no hang), staged nothing.
        assert_eq!(screen.batches.points.count(), 0);

        // With staged work the same request first flushes, then drops.
        screen.stamp(&gpu, 1, 1, Color::rgb(255, 0, 0));
        screen.prepare(&gpu, BatchKind::Points, too_big);
        assert_eq!(screen.batches.points.count(), 0);
    }

    #[test]
    fn test_set_pen_recompiles_only_on_change() {
        let Some(gpu) = headless() else { return };
        let mut screen = ScreenRenderer::new(&gpu, 10, 10).unwrap();
        let pen = Pen {
            shape: stipple_core::PenShape::Circle,
            size: 5,
            noise: 0,
        };
        screen.set_pen(pen);
        assert_eq!(screen.pen(), pen);
        screen.set_pen(pen); // no-op
        assert_eq!(screen.pen(), pen);
    }

    #[test]
    fn test_blend_switch_flushes_pending() {
        let Some(gpu) = headless() else { return };
        let mut screen = ScreenRenderer::new(&gpu, 10, 10).unwrap();

        screen.stamp(&gpu, 1, 1, Color::rgb(255, 0, 0));
        assert_eq!(screen.batches.points.count(), 1);
        screen.set_blend_mode(&gpu, BlendMode::Alpha);
        // Pending draw flushed under the old mode before the switch.
        assert_eq!(screen.batches.points.count(), 0);
        assert_eq!(screen.blend_mode(), BlendMode::Alpha);
    }

    #[test]
    fn test_present_headless_is_no_surface() {
        let Some(gpu) = headless() else { return };
        let mut screen = ScreenRenderer::new(&gpu, 10, 10).unwrap();
        assert!(matches!(screen.present(&gpu), Err(RenderError::NoSurface)));
        // render_if_dirty still reports the flush as rendered.
        screen.stamp(&gpu, 0, 0, Color::rgb(9, 9, 9));
        assert!(screen.render_if_dirty(&gpu).unwrap());
    }

    #[test]
    fn test_reinitialize_releases_and_resets() {
        let Some(gpu) = headless() else { return };
        let mut screen = ScreenRenderer::new(&gpu, 10, 10).unwrap();

        screen.stamp(&gpu, 5, 5, Color::rgb(255, 0, 0));
        screen.flush(&gpu);
        assert!(screen.batches.points.gpu().is_some());

        // Staged but unflushed work from the lost period is discarded.
        screen.stamp(&gpu, 6, 6, Color::rgb(0, 255, 0));
        screen.reinitialize(&gpu).unwrap();

        assert!(!screen.is_dirty());
        assert_eq!(screen.batches.points.count(), 0);
        assert!(screen.batches.points.gpu().is_none());
        // The fresh target clears on its next flush.
        assert_eq!(screen.read_pixel(&gpu, 5, 5), Some(Color::TRANSPARENT));
    }

    #[test]
    fn test_resize_recreates_target() {
        let Some(gpu) = headless() else { return };
        let mut screen = ScreenRenderer::new(&gpu, 10, 10).unwrap();
        screen.stamp(&gpu, 5, 5, Color::rgb(255, 0, 0));
        screen.flush(&gpu);

        screen.resize(&gpu, 20, 20).unwrap();
        assert_eq!(screen.target.width(), 20);
        assert_eq!(screen.target.height(), 20);
    }
}
