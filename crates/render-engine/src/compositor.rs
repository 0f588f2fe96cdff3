//! Frame compositor: draws the current and next photo for one output frame.
//!
//! Compositing is split in two steps. [`plan_layers`] turns a transition kind
//! and motion into an ordered list of [`Layer`]s (which photo, opacity, scale,
//! horizontal offset). [`FrameCompositor`] then paints those layers onto a
//! black canvas, cover-fitting each photo and blending source-over.

use image::RgbaImage;
use slidereel_project_model::{FrameSchedule, TransitionKind};

use crate::geometry::{cover_crop, placement, Canvas, Rect};

/// Scale the outgoing photo shrinks to, and the incoming photo starts from,
/// during a zoom transition.
pub const ZOOM_TRANSITION_SCALE: f64 = 0.9;

/// Scale reached by the slow drift at the end of a photo's display window.
pub const KEN_BURNS_SCALE: f64 = 1.05;

/// Which of the two photos a layer draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerSource {
    Current,
    Next,
}

/// One draw call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layer {
    pub source: LayerSource,
    /// Global opacity in `[0, 1]`.
    pub opacity: f64,
    /// Size relative to the canvas, about its center.
    pub scale: f64,
    /// Horizontal shift in canvas widths.
    pub offset_x: f64,
}

impl Layer {
    fn current() -> Self {
        Self {
            source: LayerSource::Current,
            opacity: 1.0,
            scale: 1.0,
            offset_x: 0.0,
        }
    }

    fn next() -> Self {
        Self {
            source: LayerSource::Next,
            ..Self::current()
        }
    }
}

/// How far along the frame is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameMotion {
    /// Outside a transition window; `elapsed` is the fraction of the photo's
    /// display window already shown.
    Hold { elapsed: f64 },
    /// Inside a transition window with progress `t`.
    Transition { t: f64 },
}

impl FrameMotion {
    pub fn from_schedule(schedule: &FrameSchedule) -> Self {
        if schedule.is_transitioning {
            Self::Transition {
                t: schedule.progress,
            }
        } else {
            Self::Hold {
                elapsed: schedule.hold_fraction,
            }
        }
    }
}

/// Layers to draw for one frame, bottom first.
pub fn plan_layers(kind: TransitionKind, motion: FrameMotion) -> Vec<Layer> {
    match motion {
        FrameMotion::Hold { elapsed } => {
            let scale = match kind {
                TransitionKind::Zoom => 1.0 + (KEN_BURNS_SCALE - 1.0) * elapsed.clamp(0.0, 1.0),
                _ => 1.0,
            };
            vec![Layer {
                scale,
                ..Layer::current()
            }]
        }
        FrameMotion::Transition { t } => {
            let t = t.clamp(0.0, 1.0);
            match kind {
                TransitionKind::Fade => vec![
                    Layer {
                        opacity: 1.0 - t,
                        ..Layer::current()
                    },
                    Layer {
                        opacity: t,
                        ..Layer::next()
                    },
                ],
                TransitionKind::Slide => vec![
                    Layer {
                        offset_x: -t,
                        ..Layer::current()
                    },
                    Layer {
                        offset_x: 1.0 - t,
                        ..Layer::next()
                    },
                ],
                TransitionKind::Zoom => vec![
                    Layer {
                        opacity: 1.0 - t,
                        scale: 1.0 - (1.0 - ZOOM_TRANSITION_SCALE) * t,
                        ..Layer::current()
                    },
                    Layer {
                        opacity: t,
                        scale: ZOOM_TRANSITION_SCALE + (1.0 - ZOOM_TRANSITION_SCALE) * t,
                        ..Layer::next()
                    },
                ],
                TransitionKind::None => vec![Layer::current()],
            }
        }
    }
}

/// Paints frames onto a fixed-size canvas.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCompositor {
    canvas: Canvas,
}

impl FrameCompositor {
    pub fn new(canvas: Canvas) -> Self {
        Self { canvas }
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    /// A fresh black, opaque surface of the canvas size.
    pub fn blank_surface(&self) -> RgbaImage {
        RgbaImage::from_pixel(
            self.canvas.width,
            self.canvas.height,
            image::Rgba([0, 0, 0, 255]),
        )
    }

    /// Draw exactly one frame onto `surface`.
    ///
    /// The surface is cleared to black first. `surface` must match the canvas
    /// size; anything outside it is clipped.
    pub fn composite(
        &self,
        surface: &mut RgbaImage,
        current: &RgbaImage,
        next: &RgbaImage,
        kind: TransitionKind,
        motion: FrameMotion,
    ) {
        for pixel in surface.pixels_mut() {
            pixel.0 = [0, 0, 0, 255];
        }

        for layer in plan_layers(kind, motion) {
            let image = match layer.source {
                LayerSource::Current => current,
                LayerSource::Next => next,
            };
            self.paint(surface, image, &layer);
        }
    }

    /// Convenience wrapper returning a new surface.
    pub fn render(
        &self,
        current: &RgbaImage,
        next: &RgbaImage,
        kind: TransitionKind,
        motion: FrameMotion,
    ) -> RgbaImage {
        let mut surface = self.blank_surface();
        self.composite(&mut surface, current, next, kind, motion);
        surface
    }

    fn paint(&self, surface: &mut RgbaImage, image: &RgbaImage, layer: &Layer) {
        if layer.opacity <= 0.0 || layer.scale <= 0.0 {
            return;
        }

        let crop = cover_crop(
            image.width(),
            image.height(),
            self.canvas.width,
            self.canvas.height,
        );
        let dest = placement(self.canvas, layer.scale, layer.offset_x);

        let (sw, sh) = surface.dimensions();
        let x0 = dest.x.floor().max(0.0) as u32;
        let y0 = dest.y.floor().max(0.0) as u32;
        let x1 = (dest.right().ceil().max(0.0) as u32).min(sw);
        let y1 = (dest.bottom().ceil().max(0.0) as u32).min(sh);
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        // Source coordinates only depend on one axis each.
        let us: Vec<Option<f64>> = (x0..x1)
            .map(|px| map_axis(px, dest.x, dest.w, crop.x, crop.w))
            .collect();
        let vs: Vec<Option<f64>> = (y0..y1)
            .map(|py| map_axis(py, dest.y, dest.h, crop.y, crop.h))
            .collect();

        let opacity = layer.opacity.min(1.0) as f32;
        for (py, v) in (y0..y1).zip(vs) {
            let Some(v) = v else { continue };
            for (px, u) in (x0..x1).zip(us.iter()) {
                let Some(u) = *u else { continue };
                let src = sample_bilinear(image, u, v);
                let dst = surface.get_pixel_mut(px, py);
                dst.0 = blend_over(dst.0, src, opacity);
            }
        }
    }

    /// Source rectangle used when drawing `image` on this canvas.
    pub fn crop_for(&self, image: &RgbaImage) -> Rect {
        cover_crop(
            image.width(),
            image.height(),
            self.canvas.width,
            self.canvas.height,
        )
    }
}

/// Map a destination pixel index to a source coordinate, if its center lies
/// inside the destination span.
fn map_axis(
    pixel: u32,
    dest_start: f64,
    dest_len: f64,
    src_start: f64,
    src_len: f64,
) -> Option<f64> {
    let center = pixel as f64 + 0.5;
    if center < dest_start || center >= dest_start + dest_len {
        return None;
    }
    Some(src_start + (center - dest_start) / dest_len * src_len)
}

fn sample_bilinear(image: &RgbaImage, u: f64, v: f64) -> [f32; 4] {
    let (w, h) = image.dimensions();
    let x = (u - 0.5).clamp(0.0, (w - 1) as f64);
    let y = (v - 0.5).clamp(0.0, (h - 1) as f64);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;

    let p00 = image.get_pixel(x0, y0).0;
    let p10 = image.get_pixel(x1, y0).0;
    let p01 = image.get_pixel(x0, y1).0;
    let p11 = image.get_pixel(x1, y1).0;

    let mut out = [0.0f32; 4];
    for c in 0..4 {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        out[c] = top * (1.0 - fy) + bottom * fy;
    }
    out
}

fn blend_over(dst: [u8; 4], src: [f32; 4], opacity: f32) -> [u8; 4] {
    let alpha = (src[3] / 255.0) * opacity;
    if alpha <= 0.0 {
        return dst;
    }
    let inv = 1.0 - alpha;
    let mut out = [0u8; 4];
    for c in 0..3 {
        out[c] = (src[c] * alpha + dst[c] as f32 * inv).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (alpha * 255.0 + dst[3] as f32 * inv).round().clamp(0.0, 255.0) as u8;
    out
}
