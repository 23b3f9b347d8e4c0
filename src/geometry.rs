use egui::{Pos2, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// Slack allowed on `x + w` and `y + h` after float division.
pub const EPSILON: f32 = 1e-4;

/// Axis-aligned box in unit coordinates, top-left origin, relative to the
/// displayed image.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BBox {
    pub fn is_normalized(&self) -> bool {
        let unit = |v: f32| (0.0..=1.0).contains(&v);
        unit(self.x)
            && unit(self.y)
            && unit(self.w)
            && unit(self.h)
            && self.x + self.w <= 1.0 + EPSILON
            && self.y + self.h <= 1.0 + EPSILON
    }

    /// Map back onto a surface drawn at `surface` in screen space.
    pub fn to_screen(&self, surface: Rect) -> Rect {
        let size = surface.size();
        Rect::from_min_size(
            surface.min + egui::vec2(self.x * size.x, self.y * size.y),
            egui::vec2(self.w * size.x, self.h * size.y),
        )
    }
}

/// Convert a pixel-space drag into a unit box.
///
/// Both points are relative to the surface's top-left corner and are clamped
/// onto the surface first, so a drag that leaves the image still yields a box
/// inside the unit square. Zero-area boxes are allowed. Returns `None` when the
/// surface itself has no area.
pub fn normalize_drag(origin: Pos2, current: Pos2, surface: Vec2) -> Option<BBox> {
    if !(surface.x > 0.0 && surface.y > 0.0) {
        return None;
    }
    let clamp = |p: Pos2| egui::pos2(p.x.clamp(0.0, surface.x), p.y.clamp(0.0, surface.y));
    let (a, b) = (clamp(origin), clamp(current));

    Some(BBox {
        x: a.x.min(b.x) / surface.x,
        y: a.y.min(b.y) / surface.y,
        w: (b.x - a.x).abs() / surface.x,
        h: (b.y - a.y).abs() / surface.y,
    })
}

/// Screen-space pointer position to surface-relative pixels.
pub fn to_surface(surface: Rect, screen_pos: Pos2) -> Pos2 {
    (screen_pos - surface.min).to_pos2()
}

/// Surface-relative pixels back to screen space.
pub fn to_screen(surface: Rect, surface_pos: Pos2) -> Pos2 {
    surface.min + surface_pos.to_vec2()
}
