//! Rectangle math for fitting photos onto the output canvas.
//!
//! All rectangles are in pixel units of whatever they refer to: crop
//! rectangles in source-image pixels, placements in canvas pixels.

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub w: f64,
    /// Height.
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Right edge.
    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// Width over height.
    pub fn aspect(&self) -> f64 {
        self.w / self.h
    }

    /// The center point of this rectangle.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }
}

/// Output canvas dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }

    /// The whole canvas as a rectangle.
    pub fn rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width as f64, self.height as f64)
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(
            slidereel_project_model::ExportSettings::OUTPUT_WIDTH,
            slidereel_project_model::ExportSettings::OUTPUT_HEIGHT,
        )
    }
}

/// Source rectangle that covers a `target_w × target_h` area without
/// distortion.
///
/// An image that is relatively wider than the target keeps its full height and
/// is cropped horizontally around its center; otherwise it keeps its full width
/// and is cropped vertically.
pub fn cover_crop(src_w: u32, src_h: u32, target_w: u32, target_h: u32) -> Rect {
    let src_w = src_w.max(1) as f64;
    let src_h = src_h.max(1) as f64;
    let target_aspect = target_w.max(1) as f64 / target_h.max(1) as f64;
    let src_aspect = src_w / src_h;

    if src_aspect > target_aspect {
        let crop_w = src_h * target_aspect;
        Rect::new((src_w - crop_w) / 2.0, 0.0, crop_w, src_h)
    } else {
        let crop_h = src_w / target_aspect;
        Rect::new(0.0, (src_h - crop_h) / 2.0, src_w, crop_h)
    }
}

/// Where a layer lands on the canvas.
///
/// `scale` grows or shrinks the full-canvas rectangle about the canvas center;
/// `offset_x` then shifts it horizontally by that fraction of the canvas width.
pub fn placement(canvas: Canvas, scale: f64, offset_x: f64) -> Rect {
    let full = canvas.rect();
    let w = full.w * scale;
    let h = full.h * scale;
    let (cx, cy) = full.center();
    Rect::new(cx - w / 2.0 + offset_x * full.w, cy - h / 2.0, w, h)
}
