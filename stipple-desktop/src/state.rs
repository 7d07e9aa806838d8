//! Application state — owns the GPU context, the screen renderer, and
//! the interactive scribble tool state (pen, palette, stroke tracking).
//!
//! Line stepping lives here, not in the engine: shape algorithms above
//! the pixel level are consumers of the drawing primitives.

use log::info;
use stipple_core::{BlendMode, Color, Pen, PenShape};
use stipple_render::{GpuContext, ReadResult, ReadbackHandle, RenderError, ScreenRenderer};

/// Scribble palette, cycled with the C key.
pub const PALETTE: [Color; 8] = [
    Color { r: 235, g: 235, b: 235, a: 255 }, // chalk
    Color { r: 244, g: 67, b: 54, a: 255 },   // red
    Color { r: 255, g: 193, b: 7, a: 255 },   // amber
    Color { r: 76, g: 175, b: 80, a: 255 },   // green
    Color { r: 33, g: 150, b: 243, a: 255 },  // blue
    Color { r: 156, g: 39, b: 176, a: 255 },  // violet
    Color { r: 121, g: 85, b: 72, a: 255 },   // umber
    Color { r: 255, g: 255, b: 255, a: 128 }, // glaze (pairs with alpha mode)
];

/// Owns the whole drawing pipeline for one window.
pub struct AppState {
    pub gpu: GpuContext,
    pub screen: ScreenRenderer,
    pub pen: Pen,
    pub color_index: usize,
    /// Previous stroke point while the mouse button is down.
    stroke_anchor: Option<(i32, i32)>,
    /// In-flight cursor inspection, logged once the tick services it.
    pending_inspect: Option<(i32, i32, ReadbackHandle)>,
}

impl AppState {
    pub fn new(gpu: GpuContext, width: u32, height: u32) -> Result<Self, RenderError> {
        let screen = ScreenRenderer::new(&gpu, width, height)?;
        Ok(Self {
            gpu,
            screen,
            pen: Pen {
                shape: PenShape::Circle,
                size: 4,
                noise: 0,
            },
            color_index: 0,
            stroke_anchor: None,
            pending_inspect: None,
        })
    }

    pub fn color(&self) -> Color {
        PALETTE[self.color_index % PALETTE.len()]
    }

    /// Seed the canvas so the window isn't empty on first present.
    pub fn load_demo_scene(&mut self) {
        let (w, h) = (self.screen.width() as i32, self.screen.height() as i32);

        self.screen.set_pen(Pen::default());
        // One-pixel frame around the canvas.
        let frame = Color::rgb(90, 90, 100);
        for x in 0..w {
            self.screen.stamp(&self.gpu, x, 0, frame);
            self.screen.stamp(&self.gpu, x, h - 1, frame);
        }
        for y in 0..h {
            self.screen.stamp(&self.gpu, 0, y, frame);
            self.screen.stamp(&self.gpu, w - 1, y, frame);
        }

        // A checkerboard image, drawn through the image batch.
        let cell = 8u32;
        let side = cell * 8;
        let mut pixels = Vec::with_capacity((side * side * 4) as usize);
        for y in 0..side {
            for x in 0..side {
                let dark = ((x / cell) + (y / cell)) % 2 == 0;
                let v = if dark { 60 } else { 140 };
                pixels.extend_from_slice(&[v, v, v, 255]);
            }
        }
        if let Ok(checker) = self.screen.create_image(&self.gpu, &pixels, side, side) {
            self.screen.draw_image(&self.gpu, &checker, 24, 24);
        }

        self.screen.set_pen(self.pen);
    }

    // ───────────────────── Stroke handling ──────────────────────────

    pub fn begin_stroke(&mut self, x: i32, y: i32) {
        self.stroke_anchor = Some((x, y));
        self.screen.stamp(&self.gpu, x, y, self.color());
    }

    pub fn end_stroke(&mut self) {
        self.stroke_anchor = None;
    }

    /// Continue a stroke: stamp along the line from the previous point.
    pub fn stroke_to(&mut self, x: i32, y: i32) {
        let Some((px, py)) = self.stroke_anchor else {
            return;
        };
        let color = self.color();
        for (sx, sy) in line_points(px, py, x, y).into_iter().skip(1) {
            self.screen.stamp(&self.gpu, sx, sy, color);
        }
        self.stroke_anchor = Some((x, y));
    }

    // ───────────────────── Tool controls ────────────────────────────

    pub fn set_shape(&mut self, shape: PenShape) {
        self.pen.shape = shape;
        self.screen.set_pen(self.pen);
        info!("pen shape: {shape:?}");
    }

    pub fn adjust_size(&mut self, delta: i32) {
        self.pen.size = (self.pen.size as i32 + delta).clamp(1, 64) as u32;
        self.screen.set_pen(self.pen);
        info!("pen size: {}", self.pen.size);
    }

    pub fn toggle_blend(&mut self) {
        let next = match self.screen.blend_mode() {
            BlendMode::Replace => BlendMode::Alpha,
            BlendMode::Alpha => BlendMode::Replace,
        };
        self.screen.set_blend_mode(&self.gpu, next);
        info!("blend mode: {next:?}");
    }

    pub fn toggle_noise(&mut self) {
        self.pen.noise = if self.pen.noise == 0 { 24 } else { 0 };
        self.screen.set_pen(self.pen);
        info!("pen noise: {}", self.pen.noise);
    }

    pub fn cycle_color(&mut self) {
        self.color_index = (self.color_index + 1) % PALETTE.len();
        info!("color: {:?}", self.color());
    }

    /// Queue a readback under the cursor; logged when the tick services it.
    pub fn inspect(&mut self, x: i32, y: i32) {
        let handle = self.screen.read_pixel_deferred(x, y);
        self.pending_inspect = Some((x, y, handle));
    }

    // ───────────────────── Frame loop ───────────────────────────────

    /// One frame tick: service deferred reads, then flush+present if a
    /// render is pending. Returns whether anything was rendered.
    pub fn frame(&mut self) -> Result<bool, RenderError> {
        self.screen.service_deferred(&self.gpu);
        if let Some((x, y, handle)) = self.pending_inspect.take() {
            match handle.try_take() {
                Some(ReadResult::Pixel(color)) => info!("pixel at ({x},{y}): {color:?}"),
                Some(other) => info!("pixel at ({x},{y}): {other:?}"),
                None => self.pending_inspect = Some((x, y, handle)),
            }
        }
        self.screen.render_if_dirty(&self.gpu)
    }

    /// Window resize: surface and render target both follow, then the
    /// demo frame redraws into the fresh (cleared) target.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.gpu.resize_surface(width, height);
        self.screen.resize(&self.gpu, width, height)?;
        self.load_demo_scene();
        self.screen.mark_dirty();
        Ok(())
    }
}

/// Integer line stepping (Bresenham) between two points, inclusive.
pub fn line_points(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<(i32, i32)> {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);
    let mut points = Vec::with_capacity((dx - dy) as usize + 1);
    loop {
        points.push((x, y));
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
    points
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_points_horizontal() {
        let pts = line_points(0, 0, 3, 0);
        assert_eq!(pts, vec![(0, 0), (1, 0), (2, 0), (3, 0)]);
    }

    #[test]
    fn test_line_points_diagonal() {
        let pts = line_points(0, 0, 3, 3);
        assert_eq!(pts, vec![(0, 0), (1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn test_line_points_reversed() {
        let pts = line_points(3, 1, 0, 1);
        assert_eq!(pts.first(), Some(&(3, 1)));
        assert_eq!(pts.last(), Some(&(0, 1)));
        assert_eq!(pts.len(), 4);
    }

    #[test]
    fn test_line_points_single() {
        assert_eq!(line_points(5, 5, 5, 5), vec![(5, 5)]);
    }

    #[test]
    fn test_demo_scene_marks_dirty() {
        let gpu = pollster::block_on(GpuContext::new_headless());
        if let Ok(gpu) = gpu {
            let mut app = AppState::new(gpu, 128, 128).unwrap();
            app.load_demo_scene();
            assert!(app.screen.is_dirty());
        }
    }

    #[test]
    fn test_stroke_stamps_along_line() {
        let gpu = pollster::block_on(GpuContext::new_headless());
        if let Ok(gpu) = gpu {
            let mut app = AppState::new(gpu, 64, 64).unwrap();
            app.begin_stroke(10, 10);
            app.stroke_to(20, 10);
            app.end_stroke();
            // The stroke drew through the pen; a pixel on the path reads
            // back as the current color.
            let got = app.screen.read_pixel(&app.gpu, 15, 10);
            assert_eq!(got, Some(app.color()));
        }
    }

    #[test]
    fn test_size_clamps() {
        let gpu = pollster::block_on(GpuContext::new_headless());
        if let Ok(gpu) = gpu {
            let mut app = AppState::new(gpu, 64, 64).unwrap();
            app.adjust_size(-100);
            assert_eq!(app.pen.size, 1);
            app.adjust_size(1000);
            assert_eq!(app.pen.size, 64);
        }
    }
}
