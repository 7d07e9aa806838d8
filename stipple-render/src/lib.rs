//! # stipple-render
//!
//! GPU-batched pixel drawing engine built on `wgpu`.
//!
//! The drawing API is immediate-mode — pixels land one at a time, in
//! program order, against mutable pen/blend state — while execution is
//! batched: staged CPU arrays upload once per frame and render as a
//! handful of draw calls. The engine guarantees the visible result is
//! identical to drawing every pixel immediately.
//!
//! ## Architecture
//!
//! ```text
//!  stamp()/push_pixel()/draw_image()
//!       │
//!       ▼
//!  CompiledPen                  ◀─── specialized per (shape × noise)
//!       │
//!       ▼
//!  prepare() → Batch            ◀─── capacity growth/shrink, staging
//!       │          │
//!       │     DrawOrderTracker  ◀─── issuance-order spans
//!       ▼          ▼
//!  flush()                      ◀─── upload + ordered draws into the
//!       │                            offscreen RenderTarget
//!       ▼
//!  present()                    ◀─── full-screen blit to the surface
//! ```
//!
//! Readback (`read_pixel`, `read_pixels`) forces the deferred flush so
//! it always observes every draw issued before it.
//!
//! ## Crate modules
//!
//! - [`context`] — GPU device/queue/surface initialisation, lost flag
//! - [`batch`] — CPU staging arrays and the capacity policy
//! - [`order`] — chronological draw-order spans
//! - [`target`] — the offscreen render target
//! - [`pipelines`] — wgpu render pipelines (points, image, blit)
//! - [`pen`] — the per-configuration pen specializer
//! - [`screen`] — per-screen orchestration: prepare/flush/present
//! - [`readback`] — synchronous and deferred pixel queries

pub mod batch;
pub mod context;
pub mod order;
pub mod pen;
pub mod pipelines;
pub mod readback;
pub mod screen;
pub mod target;

// Re-exports for convenience
pub use batch::{Batch, BatchKind};
pub use context::{GpuContext, GpuError};
pub use order::{DrawOrderTracker, DrawSpan};
pub use pen::CompiledPen;
pub use pipelines::image::ImageTexture;
pub use readback::{ReadResult, ReadbackHandle};
pub use screen::{FlushStats, RenderError, ScreenRenderer};
pub use target::RenderTarget;
