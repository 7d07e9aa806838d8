//! CPU-side staging batches and their capacity policy.
//!
//! A [`Batch`] holds one GPU draw call's worth of vertex data in growable
//! CPU arrays with fixed component counts per kind (vertex = 2×f32,
//! color = 4×u8, tex coord = 2×f32 for [`BatchKind::Image`] only), plus
//! the GPU buffers those arrays upload into. Buffers are reallocated only
//! when capacity changed since the last upload; otherwise just the staged
//! prefix is written.
//!
//! Capacity policy:
//! - grow to `max(required, capacity × 2)` when an append would overflow,
//!   never past `max_capacity` — a requirement beyond that forces the
//!   caller to flush the whole screen first, bounding a single
//!   accumulation burst;
//! - shrink by halving, at most once per 5-second window, and only when
//!   the peak usage observed across the whole window stayed under half
//!   the capacity. Bursty workloads keep their memory; sustained idle
//!   releases it slowly.

use std::time::{Duration, Instant};

use log::trace;
use stipple_core::Color;
use wgpu::{Buffer, BufferDescriptor, BufferUsages, Device, Queue};

/// Elements a fresh batch can hold before the first growth.
pub const DEFAULT_MIN_CAPACITY: usize = 2_048;
/// Hard ceiling per batch; a burst beyond this is split by a forced flush.
pub const DEFAULT_MAX_CAPACITY: usize = 1 << 20;
/// Cooldown between shrink checks.
pub const SHRINK_INTERVAL: Duration = Duration::from_secs(5);

/// Determines vertex layout and GPU draw primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BatchKind {
    /// One vertex per pixel, drawn as a point list.
    Points,
    /// Textured triangles (6 vertices per quad), drawn as a triangle list.
    Image,
}

impl BatchKind {
    pub fn has_tex_coords(self) -> bool {
        matches!(self, BatchKind::Image)
    }

    pub fn primitive(self) -> wgpu::PrimitiveTopology {
        match self {
            BatchKind::Points => wgpu::PrimitiveTopology::PointList,
            BatchKind::Image => wgpu::PrimitiveTopology::TriangleList,
        }
    }
}

/// Outcome of a capacity reservation. `NeedsFlush` means the request
/// would exceed `max_capacity`: the caller must flush the screen (which
/// resets every batch) and retry.
#[must_use]
#[derive(Debug, PartialEq, Eq)]
pub enum Reserve {
    Ready,
    NeedsFlush,
}

/// GPU-side buffers for one batch. Owned exclusively by the batch and
/// dropped with it; never shared across screens.
pub struct GpuBuffers {
    pub vertices: Buffer,
    pub colors: Buffer,
    pub tex_coords: Option<Buffer>,
    /// Capacity (in elements) these buffers were allocated for.
    allocated: usize,
}

impl GpuBuffers {
    fn allocate(device: &Device, kind: BatchKind, capacity: usize) -> Self {
        let vertex = |label: &str, bytes: usize| {
            device.create_buffer(&BufferDescriptor {
                label: Some(label),
                size: bytes as u64,
                usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };

        Self {
            vertices: vertex("batch_vertices", capacity * 2 * 4),
            colors: vertex("batch_colors", capacity * 4),
            tex_coords: kind
                .has_tex_coords()
                .then(|| vertex("batch_tex_coords", capacity * 2 * 4)),
            allocated: capacity,
        }
    }
}

/// Staging buffers for one kind of GPU draw call.
pub struct Batch {
    kind: BatchKind,
    vertices: Vec<f32>,
    colors: Vec<u8>,
    tex_coords: Vec<f32>,
    count: usize,
    capacity: usize,
    min_capacity: usize,
    max_capacity: usize,
    capacity_changed: bool,
    peak_since_check: usize,
    next_shrink_check: Instant,
    gpu: Option<GpuBuffers>,
}

impl Batch {
    pub fn new(kind: BatchKind) -> Self {
        Self::with_capacity_bounds(kind, DEFAULT_MIN_CAPACITY, DEFAULT_MAX_CAPACITY)
    }

    pub fn with_capacity_bounds(kind: BatchKind, min: usize, max: usize) -> Self {
        assert!(min >= 1 && min <= max);
        let mut batch = Self {
            kind,
            vertices: Vec::new(),
            colors: Vec::new(),
            tex_coords: Vec::new(),
            count: 0,
            capacity: min,
            min_capacity: min,
            max_capacity: max,
            capacity_changed: true,
            peak_since_check: 0,
            next_shrink_check: Instant::now() + SHRINK_INTERVAL,
            gpu: None,
        };
        batch.resize_arrays();
        batch
    }

    // ───────────────────── Capacity ───────────────────────────────

    /// Guarantee room for `additional` more elements.
    ///
    /// On [`Reserve::Ready`], `count + additional <= capacity` holds and
    /// the caller may append unchecked. A request beyond `max_capacity`
    /// answers [`Reserve::NeedsFlush`] even on an empty batch — whether
    /// to flush, drop, or split is the caller's call.
    pub fn reserve(&mut self, additional: usize) -> Reserve {
        let required = self.count + additional;
        if required < self.capacity {
            return Reserve::Ready;
        }
        if required > self.max_capacity {
            return Reserve::NeedsFlush;
        }

        let new_capacity = required.max(self.capacity * 2).min(self.max_capacity);
        trace!(
            "batch {:?}: grow {} -> {} (staged {})",
            self.kind,
            self.capacity,
            new_capacity,
            self.count
        );
        self.capacity = new_capacity;
        self.resize_arrays();
        self.capacity_changed = true;
        Reserve::Ready
    }

    /// Resize the staging arrays to the current capacity, preserving
    /// `[0, count)`.
    fn resize_arrays(&mut self) {
        self.vertices.resize(self.capacity * 2, 0.0);
        self.colors.resize(self.capacity * 4, 0);
        if self.kind.has_tex_coords() {
            self.tex_coords.resize(self.capacity * 2, 0.0);
        }
    }

    // ───────────────────── Append (hot path) ──────────────────────

    /// Append one point vertex. No bounds check in release builds —
    /// callers must have reserved room first.
    #[inline]
    pub fn push_point(&mut self, x: f32, y: f32, color: Color) {
        debug_assert!(self.count < self.capacity, "push_point without reserve");
        let v = self.count * 2;
        self.vertices[v] = x;
        self.vertices[v + 1] = y;
        let c = self.count * 4;
        self.colors[c] = color.r;
        self.colors[c + 1] = color.g;
        self.colors[c + 2] = color.b;
        self.colors[c + 3] = color.a;
        self.count += 1;
    }

    /// Append one textured vertex (Image kind only).
    #[inline]
    pub fn push_image_vertex(&mut self, x: f32, y: f32, u: f32, v: f32, color: Color) {
        debug_assert!(self.kind.has_tex_coords());
        debug_assert!(self.count < self.capacity, "push_image_vertex without reserve");
        let i = self.count * 2;
        self.vertices[i] = x;
        self.vertices[i + 1] = y;
        self.tex_coords[i] = u;
        self.tex_coords[i + 1] = v;
        let c = self.count * 4;
        self.colors[c] = color.r;
        self.colors[c + 1] = color.g;
        self.colors[c + 2] = color.b;
        self.colors[c + 3] = color.a;
        self.count += 1;
    }

    // ───────────────────── Flush support ──────────────────────────

    /// Upload the staged prefix to the GPU, reallocating the buffers
    /// first if capacity changed since the last upload.
    pub fn upload(&mut self, device: &Device, queue: &Queue) {
        if self.count == 0 {
            return;
        }
        if self.capacity_changed || self.gpu.is_none() {
            self.gpu = Some(GpuBuffers::allocate(device, self.kind, self.capacity));
            self.capacity_changed = false;
        }
        let Some(gpu) = self.gpu.as_ref() else { return };
        debug_assert_eq!(gpu.allocated, self.capacity);
        queue.write_buffer(
            &gpu.vertices,
            0,
            bytemuck::cast_slice(&self.vertices[..self.count * 2]),
        );
        queue.write_buffer(&gpu.colors, 0, &self.colors[..self.count * 4]);
        if let Some(tex_coords) = &gpu.tex_coords {
            queue.write_buffer(
                tex_coords,
                0,
                bytemuck::cast_slice(&self.tex_coords[..self.count * 2]),
            );
        }
    }

    /// Flush-time reset: sample peak usage, clear the count, and run the
    /// shrink check. `now` is injected so tests can step time.
    pub fn reset(&mut self, now: Instant) {
        self.peak_since_check = self.peak_since_check.max(self.count);
        self.count = 0;

        if now < self.next_shrink_check {
            return;
        }
        if self.capacity > self.min_capacity && self.peak_since_check < self.capacity / 2 {
            let new_capacity = (self.capacity / 2).max(self.min_capacity);
            trace!(
                "batch {:?}: shrink {} -> {} (peak {})",
                self.kind,
                self.capacity,
                new_capacity,
                self.peak_since_check
            );
            self.capacity = new_capacity;
            self.resize_arrays();
            self.capacity_changed = true;
        }
        self.peak_since_check = 0;
        self.next_shrink_check = now + SHRINK_INTERVAL;
    }

    /// Drop GPU buffers (device loss recovery). The next upload
    /// reallocates from scratch.
    pub fn release_gpu(&mut self) {
        self.gpu = None;
        self.capacity_changed = true;
    }

    // ───────────────────── Accessors ──────────────────────────────

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn min_capacity(&self) -> usize {
        self.min_capacity
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    pub fn gpu(&self) -> Option<&GpuBuffers> {
        self.gpu.as_ref()
    }

    /// Staged vertex components `[0, count·2)`.
    pub fn staged_vertices(&self) -> &[f32] {
        &self.vertices[..self.count * 2]
    }

    /// Staged color components `[0, count·4)`.
    pub fn staged_colors(&self) -> &[u8] {
        &self.colors[..self.count * 4]
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn red() -> Color {
        Color::rgb(255, 0, 0)
    }

    #[test]
    fn test_capacity_invariant_over_reserve_sequence() {
        let mut batch = Batch::with_capacity_bounds(BatchKind::Points, 4, 1024);
        for additional in [1, 3, 4, 9, 100, 500] {
            assert_eq!(batch.reserve(additional), Reserve::Ready);
            assert!(batch.count() + additional <= batch.capacity());
            assert!(batch.capacity() >= batch.min_capacity());
            assert!(batch.capacity() <= batch.max_capacity());
            for _ in 0..additional {
                batch.push_point(0.0, 0.0, red());
            }
        }
    }

    #[test]
    fn test_growth_doubles_or_fits_requirement() {
        let mut batch = Batch::with_capacity_bounds(BatchKind::Points, 4, 1024);
        assert_eq!(batch.reserve(4), Reserve::Ready);
        assert_eq!(batch.capacity(), 8); // 4 >= 4 triggers growth, 2× wins

        let mut batch = Batch::with_capacity_bounds(BatchKind::Points, 4, 1024);
        assert_eq!(batch.reserve(100), Reserve::Ready);
        assert_eq!(batch.capacity(), 100); // requirement wins over 2×
    }

    #[test]
    fn test_growth_preserves_staged_data() {
        let mut batch = Batch::with_capacity_bounds(BatchKind::Points, 4, 1024);
        let _ = batch.reserve(3);
        batch.push_point(1.0, 2.0, Color::new(10, 20, 30, 40));
        batch.push_point(3.0, 4.0, Color::new(50, 60, 70, 80));
        batch.push_point(5.0, 6.0, Color::new(90, 91, 92, 93));

        let _ = batch.reserve(500); // forces growth
        assert_eq!(batch.staged_vertices(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(
            batch.staged_colors(),
            &[10, 20, 30, 40, 50, 60, 70, 80, 90, 91, 92, 93]
        );
    }

    #[test]
    fn test_overflow_requests_flush() {
        let mut batch = Batch::with_capacity_bounds(BatchKind::Points, 4, 16);
        let _ = batch.reserve(10);
        for _ in 0..10 {
            batch.push_point(0.0, 0.0, red());
        }
        assert_eq!(batch.reserve(10), Reserve::NeedsFlush);

        // After the caller flushes (reset), the same request fits.
        batch.reset(Instant::now());
        assert_eq!(batch.reserve(10), Reserve::Ready);
    }

    #[test]
    fn test_oversized_request_needs_flush_even_when_empty() {
        let mut batch = Batch::with_capacity_bounds(BatchKind::Points, 4, 16);
        assert_eq!(batch.reserve(17), Reserve::NeedsFlush);
        // Unchanged: no partial growth happened.
        assert_eq!(batch.capacity(), 4);
        assert_eq!(batch.count(), 0);
    }

    #[test]
    fn test_reset_clears_count() {
        let mut batch = Batch::new(BatchKind::Points);
        let _ = batch.reserve(2);
        batch.push_point(0.0, 0.0, red());
        batch.push_point(1.0, 1.0, red());
        batch.reset(Instant::now());
        assert_eq!(batch.count(), 0);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_shrink_waits_for_cooldown() {
        let mut batch = Batch::with_capacity_bounds(BatchKind::Points, 4, 1024);
        let _ = batch.reserve(100);
        assert_eq!(batch.capacity(), 100);

        // Idle flushes inside the window never shrink.
        let now = Instant::now();
        batch.reset(now);
        batch.reset(now + Duration::from_millis(100));
        assert_eq!(batch.capacity(), 100);

        // Past the window with low peak: one halving.
        batch.reset(now + SHRINK_INTERVAL + Duration::from_millis(1));
        assert_eq!(batch.capacity(), 50);
    }

    #[test]
    fn test_shrink_respects_peak_usage() {
        let mut batch = Batch::with_capacity_bounds(BatchKind::Points, 4, 1024);
        let _ = batch.reserve(100);

        // Heavy usage inside the window: peak >= capacity/2 blocks the shrink.
        let _ = batch.reserve(60);
        for _ in 0..60 {
            batch.push_point(0.0, 0.0, red());
        }
        let now = Instant::now();
        batch.reset(now + SHRINK_INTERVAL + Duration::from_millis(1));
        assert_eq!(batch.capacity(), 100);
    }

    #[test]
    fn test_shrink_floor_is_min_capacity() {
        let mut batch = Batch::with_capacity_bounds(BatchKind::Points, 8, 1024);
        let _ = batch.reserve(64);
        assert_eq!(batch.capacity(), 64);

        // Many idle windows: capacity halves down to the floor, never below.
        let mut now = Instant::now();
        for _ in 0..20 {
            now += SHRINK_INTERVAL + Duration::from_millis(1);
            batch.reset(now);
            assert!(batch.capacity() >= batch.min_capacity());
        }
        assert_eq!(batch.capacity(), 8);
    }

    #[test]
    fn test_image_batch_stages_tex_coords() {
        let mut batch = Batch::new(BatchKind::Image);
        let _ = batch.reserve(1);
        batch.push_image_vertex(5.0, 6.0, 0.25, 0.75, red());
        assert_eq!(batch.count(), 1);
        assert_eq!(batch.staged_vertices(), &[5.0, 6.0]);
        assert_eq!(batch.tex_coords[..2], [0.25, 0.75]);
    }

    #[test]
    fn test_kind_primitives() {
        assert_eq!(
            BatchKind::Points.primitive(),
            wgpu::PrimitiveTopology::PointList
        );
        assert_eq!(
            BatchKind::Image.primitive(),
            wgpu::PrimitiveTopology::TriangleList
        );
        assert!(!BatchKind::Points.has_tex_coords());
        assert!(BatchKind::Image.has_tex_coords());
    }
}
