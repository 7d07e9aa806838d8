//! # stipple-core
//!
//! Plain data types shared by every stipple crate: colors, blend modes,
//! pen configuration, and screen identity. No GPU types live here — the
//! render crate binds these to wgpu.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An 8-bit straight-alpha RGBA color.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Fully transparent black — the render target's initial clear value.
    pub const TRANSPARENT: Color = Color { r: 0, g: 0, b: 0, a: 0 };

    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color shorthand.
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn from_array([r, g, b, a]: [u8; 4]) -> Self {
        Self { r, g, b, a }
    }

    /// CPU reference source-over composite of `self` over `dst`.
    ///
    /// Mirrors the GPU blend state used for [`BlendMode::Alpha`]:
    /// `out_c = src_c·src_a + dst_c·(1−src_a)` per channel and
    /// `out_a = src_a + dst_a·(1−src_a)`, computed in float and rounded
    /// exactly like Rgba8Unorm storage. Tests use this to validate GPU
    /// blending pixel by pixel.
    pub fn source_over(self, dst: Color) -> Color {
        let sa = self.a as f32 / 255.0;
        let blend = |s: u8, d: u8| -> u8 {
            (s as f32 * sa + d as f32 * (1.0 - sa)).round() as u8
        };
        Color {
            r: blend(self.r, dst.r),
            g: blend(self.g, dst.g),
            b: blend(self.b, dst.b),
            a: (self.a as f32 + dst.a as f32 * (1.0 - sa)).round() as u8,
        }
    }
}

/// Compositing rule applied when a new color lands on an existing one.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub enum BlendMode {
    /// Each write fully overwrites destination RGBA.
    #[default]
    Replace,
    /// Standard source-over compositing, destination alpha included.
    Alpha,
}

/// The footprint stamped at each logical drawing coordinate.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub enum PenShape {
    /// A single pixel; `size` is ignored.
    #[default]
    Pixel,
    /// A `size`-sided axis-aligned box centered on the coordinate.
    Square,
    /// A filled disc of diameter `size`.
    Circle,
}

/// Pen configuration. Serializable so tool presets can be saved.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Pen {
    pub shape: PenShape,
    /// Stamp diameter in pixels. The renderer clamps it to a workable
    /// range when compiling the stamp routine.
    pub size: u32,
    /// Per-channel perturbation amplitude, 0 disables noise.
    pub noise: u8,
}

impl Default for Pen {
    fn default() -> Self {
        Self {
            shape: PenShape::Pixel,
            size: 1,
            noise: 0,
        }
    }
}

/// Identity of one logical screen, used in log output and diagnostics.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub struct ScreenId(pub Uuid);

impl ScreenId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScreenId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScreenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short prefix is enough to tell screens apart in logs.
        write!(f, "screen-{}", &self.0.as_simple().to_string()[..8])
    }
}

// ===================================================================
// Tests
// ===================================================================
