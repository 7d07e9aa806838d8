//! Pen specialization — per-pixel loops with no per-pixel branching.
//!
//! A [`CompiledPen`] is rebuilt whenever the pen shape, size, noise, or
//! screen bounds change. Compilation resolves (shape × noise) through a
//! dispatch table into one concrete `fn` pointer, with screen bounds,
//! box offsets, and the squared disc radius precomputed by value — the
//! hot stamp path never re-examines configuration.
//!
//! Shapes: `Pixel` bounds-checks a single coordinate; `Square` walks a
//! size-sided box clipped to the screen; `Circle` walks the clipped
//! bounding box and accepts pixel centers within the squared radius
//! (no square root per pixel). With noise, each RGB channel is
//! perturbed by a uniform amount in `[-noise, +noise]` and clamped to
//! `[0, 255]`; alpha is left alone.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use stipple_core::{Color, Pen, PenShape};

use crate::batch::Batch;

/// Stamp diameters above this are clamped at compile time, keeping the
/// worst-case reservation (`size²`) well inside a batch's capacity
/// ceiling.
pub const MAX_PEN_SIZE: u32 = 512;

/// One specialized stamp routine. Appends into the screen's point
/// batch; the caller must have reserved [`CompiledPen::max_pixels`]
/// elements first.
pub type StampFn = fn(&mut CompiledPen, &mut Batch, i32, i32, Color);

/// A pen configuration compiled against fixed screen bounds.
pub struct CompiledPen {
    pen: Pen,
    size: i32,
    /// Box start offset: the stamp box is `[x - half, x - half + size)`.
    half: i32,
    /// Disc center offset from the box start, in pixels.
    center: f32,
    radius_sq: f32,
    width: i32,
    height: i32,
    stamp: StampFn,
    rng: SmallRng,
}

impl CompiledPen {
    pub fn compile(pen: Pen, width: u32, height: u32) -> Self {
        let size = pen.size.clamp(1, MAX_PEN_SIZE) as i32;
        let radius = size as f32 * 0.5;

        let stamp: StampFn = match (pen.shape, pen.noise > 0) {
            (PenShape::Pixel, false) => stamp_pixel,
            (PenShape::Pixel, true) => stamp_pixel_noise,
            (PenShape::Square, false) => stamp_square,
            (PenShape::Square, true) => stamp_square_noise,
            (PenShape::Circle, false) => stamp_circle,
            (PenShape::Circle, true) => stamp_circle_noise,
        };

        Self {
            pen,
            size,
            half: (size - 1) / 2,
            center: radius,
            radius_sq: radius * radius,
            width: width as i32,
            height: height as i32,
            stamp,
            rng: SmallRng::seed_from_u64(0x5717_913e_5eed),
        }
    }

    /// Configuration this pen was compiled from.
    pub fn pen(&self) -> Pen {
        self.pen
    }

    /// Worst-case pixels one stamp can append — what callers reserve.
    pub fn max_pixels(&self) -> usize {
        (self.size * self.size) as usize
    }

    /// Run the compiled stamp at `(x, y)`.
    #[inline]
    pub fn run(&mut self, batch: &mut Batch, x: i32, y: i32, color: Color) {
        let stamp = self.stamp;
        stamp(self, batch, x, y, color);
    }

    #[inline]
    fn perturb(&mut self, color: Color) -> Color {
        let n = self.pen.noise as i16;
        let channel = |c: u8, rng: &mut SmallRng| -> u8 {
            (c as i16 + rng.random_range(-n..=n)).clamp(0, 255) as u8
        };
        Color {
            r: channel(color.r, &mut self.rng),
            g: channel(color.g, &mut self.rng),
            b: channel(color.b, &mut self.rng),
            a: color.a,
        }
    }

    /// Clipped stamp box `[x0, x1) × [y0, y1)` around `(x, y)`.
    #[inline]
    fn clipped_box(&self, x: i32, y: i32) -> (i32, i32, i32, i32) {
        let x0 = x - self.half;
        let y0 = y - self.half;
        (
            x0.max(0),
            y0.max(0),
            (x0 + self.size).min(self.width),
            (y0 + self.size).min(self.height),
        )
    }

    /// Whether a pixel center at `(sx, sy)` lies inside the disc
    /// stamped at `(x, y)`.
    #[inline]
    fn in_disc(&self, x: i32, y: i32, sx: i32, sy: i32) -> bool {
        let cx = (x - self.half) as f32 + self.center;
        let cy = (y - self.half) as f32 + self.center;
        let dx = sx as f32 + 0.5 - cx;
        let dy = sy as f32 + 0.5 - cy;
        dx * dx + dy * dy <= self.radius_sq
    }
}

// ── Stamp table ─────────────────────────────────────────────────────

fn stamp_pixel(pen: &mut CompiledPen, batch: &mut Batch, x: i32, y: i32, color: Color) {
    if x >= 0 && y >= 0 && x < pen.width && y < pen.height {
        batch.push_point(x as f32, y as f32, color);
    }
}

fn stamp_pixel_noise(pen: &mut CompiledPen, batch: &mut Batch, x: i32, y: i32, color: Color) {
    if x >= 0 && y >= 0 && x < pen.width && y < pen.height {
        let color = pen.perturb(color);
        batch.push_point(x as f32, y as f32, color);
    }
}

fn stamp_square(pen: &mut CompiledPen, batch: &mut Batch, x: i32, y: i32, color: Color) {
    let (x0, y0, x1, y1) = pen.clipped_box(x, y);
    for sy in y0..y1 {
        for sx in x0..x1 {
            batch.push_point(sx as f32, sy as f32, color);
        }
    }
}

fn stamp_square_noise(pen: &mut CompiledPen, batch: &mut Batch, x: i32, y: i32, color: Color) {
    let (x0, y0, x1, y1) = pen.clipped_box(x, y);
    for sy in y0..y1 {
        for sx in x0..x1 {
            let color = pen.perturb(color);
            batch.push_point(sx as f32, sy as f32, color);
        }
    }
}

fn stamp_circle(pen: &mut CompiledPen, batch: &mut Batch, x: i32, y: i32, color: Color) {
    let (x0, y0, x1, y1) = pen.clipped_box(x, y);
    for sy in y0..y1 {
        for sx in x0..x1 {
            if pen.in_disc(x, y, sx, sy) {
                batch.push_point(sx as f32, sy as f32, color);
            }
        }
    }
}

fn stamp_circle_noise(pen: &mut CompiledPen, batch: &mut Batch, x: i32, y: i32, color: Color) {
    let (x0, y0, x1, y1) = pen.clipped_box(x, y);
    for sy in y0..y1 {
        for sx in x0..x1 {
            if pen.in_disc(x, y, sx, sy) {
                let color = pen.perturb(color);
                batch.push_point(sx as f32, sy as f32, color);
            }
        }
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchKind;

    fn stamp_at(pen: Pen, width: u32, height: u32, x: i32, y: i32) -> Vec<(f32, f32)> {
        let mut compiled = CompiledPen::compile(pen, width, height);
        let mut batch = Batch::new(BatchKind::Points);
        let _ = batch.reserve(compiled.max_pixels());
        compiled.run(&mut batch, x, y, Color::rgb(255, 255, 255));
        batch
            .staged_vertices()
            .chunks(2)
            .map(|v| (v[0], v[1]))
            .collect()
    }

    #[test]
    fn test_pixel_pen_single_pixel() {
        let px = stamp_at(Pen::default(), 10, 10, 5, 5);
        assert_eq!(px, vec![(5.0, 5.0)]);
    }

    #[test]
    fn test_pixel_pen_clips_out_of_bounds() {
        assert!(stamp_at(Pen::default(), 10, 10, -1, 5).is_empty());
        assert!(stamp_at(Pen::default(), 10, 10, 10, 5).is_empty());
        assert!(stamp_at(Pen::default(), 10, 10, 5, 10).is_empty());
    }

    #[test]
    fn test_square_pen_full_box() {
        let pen = Pen {
            shape: PenShape::Square,
            size: 3,
            noise: 0,
        };
        let px = stamp_at(pen, 10, 10, 5, 5);
        assert_eq!(px.len(), 9);
        assert!(px.contains(&(4.0, 4.0)));
        assert!(px.contains(&(6.0, 6.0)));
    }

    #[test]
    fn test_square_pen_clips_at_border() {
        let pen = Pen {
            shape: PenShape::Square,
            size: 3,
            noise: 0,
        };
        // Stamp at the corner: only the in-bounds quadrant survives.
        let px = stamp_at(pen, 10, 10, 0, 0);
        assert_eq!(px.len(), 4);
        for (x, y) in px {
            assert!((0.0..=1.0).contains(&x));
            assert!((0.0..=1.0).contains(&y));
        }
    }

    #[test]
    fn test_circle_pen_excludes_corners() {
        let pen = Pen {
            shape: PenShape::Circle,
            size: 5,
            noise: 0,
        };
        let px = stamp_at(pen, 20, 20, 10, 10);
        // The 5-wide disc keeps the plus arms, drops the box corners.
        assert!(px.contains(&(10.0, 8.0)));
        assert!(px.contains(&(8.0, 10.0)));
        assert!(!px.contains(&(8.0, 8.0)));
        assert!(px.len() < 25);
    }

    #[test]
    fn test_max_pixels_covers_stamp() {
        for shape in [PenShape::Pixel, PenShape::Square, PenShape::Circle] {
            for size in [1, 2, 3, 7] {
                let pen = Pen {
                    shape,
                    size,
                    noise: 0,
                };
                let compiled = CompiledPen::compile(pen, 64, 64);
                let px = stamp_at(pen, 64, 64, 32, 32);
                assert!(px.len() <= compiled.max_pixels());
            }
        }
    }

    #[test]
    fn test_noise_preserves_alpha_and_clamps() {
        let pen = Pen {
            shape: PenShape::Square,
            size: 4,
            noise: 200,
        };
        let mut compiled = CompiledPen::compile(pen, 16, 16);
        let mut batch = Batch::new(BatchKind::Points);
        let _ = batch.reserve(compiled.max_pixels());
        compiled.run(&mut batch, 8, 8, Color::new(250, 5, 128, 77));

        let colors = batch.staged_colors();
        assert!(!colors.is_empty());
        for rgba in colors.chunks(4) {
            // Channels are clamped u8 by construction; alpha untouched.
            assert_eq!(rgba[3], 77);
        }
    }

    #[test]
    fn test_noise_actually_perturbs() {
        let pen = Pen {
            shape: PenShape::Square,
            size: 8,
            noise: 40,
        };
        let mut compiled = CompiledPen::compile(pen, 32, 32);
        let mut batch = Batch::new(BatchKind::Points);
        let _ = batch.reserve(compiled.max_pixels());
        compiled.run(&mut batch, 16, 16, Color::rgb(128, 128, 128));

        let distinct: std::collections::HashSet<&[u8]> =
            batch.staged_colors().chunks(4).collect();
        assert!(distinct.len() > 1, "64 noisy stamps should not all match");
    }

    #[test]
    fn test_oversized_pen_clamps() {
        let pen = Pen {
            shape: PenShape::Square,
            size: u32::MAX,
            noise: 0,
        };
        let compiled = CompiledPen::compile(pen, 64, 64);
        assert_eq!(compiled.max_pixels(), (MAX_PEN_SIZE * MAX_PEN_SIZE) as usize);
        // Still stamps, clipped to the screen.
        let px = stamp_at(pen, 64, 64, 32, 32);
        assert_eq!(px.len(), 64 * 64);
    }

    #[test]
    fn test_zero_size_pen_behaves_as_one() {
        let pen = Pen {
            shape: PenShape::Square,
            size: 0,
            noise: 0,
        };
        let px = stamp_at(pen, 10, 10, 5, 5);
        assert_eq!(px, vec![(5.0, 5.0)]);
    }

    #[test]
    fn test_recompile_on_resize_updates_bounds() {
        let pen = Pen::default();
        // (15, 15) is outside a 10×10 screen, inside a 20×20 one.
        assert!(stamp_at(pen, 10, 10, 15, 15).is_empty());
        assert_eq!(stamp_at(pen, 20, 20, 15, 15), vec![(15.0, 15.0)]);
    }
}
