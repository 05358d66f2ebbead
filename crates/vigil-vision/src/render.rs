use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::glyph;
use crate::normalize::{BoxPx, NormalizedDetection};
use crate::threat::threat_color;

pub const STROKE: i32 = 2;

const LABEL_SCALE: u32 = 2;
const LABEL_BAND_H: i32 = 20;
const LABEL_TEXT_INSET: i32 = 2;

const WATERMARK_SCALE: u32 = 3;
const WATERMARK_ORIGIN: i32 = 10;
const WATERMARK_PAD: i32 = 10;
const WATERMARK_OPACITY: f32 = 0.6;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Per-request drawing options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRequest {
    /// Watermark text; `None` or empty draws nothing.
    pub camera_label: Option<String>,
    pub show_confidence: bool,
    /// Boxes are always drawn; this only controls the text band.
    pub show_label: bool,
}

impl Default for AnnotationRequest {
    fn default() -> Self {
        Self { camera_label: None, show_confidence: true, show_label: true }
    }
}

impl AnnotationRequest {
    fn watermark(&self) -> Option<&str> {
        self.camera_label.as_deref().filter(|s| !s.is_empty())
    }
}

/// `person 92%`, or just `person` without confidence. Halves round to even.
pub fn label_text(det: &NormalizedDetection, show_confidence: bool) -> String {
    if show_confidence {
        let pct = (f64::from(det.confidence) * 100.0).round_ties_even() as i64;
        format!("{} {}%", det.class_name, pct)
    } else {
        det.class_name.clone()
    }
}

/// Draw overlays for `dets` (in order) and the optional watermark onto a copy of `src`.
///
/// Pure: the same inputs always give the same pixels.
pub fn render(src: &RgbImage, dets: &[NormalizedDetection], req: &AnnotationRequest) -> RgbImage {
    let mut out = src.clone();
    for det in dets {
        draw_detection(&mut out, det, req);
    }
    // last, so overlays never cover it
    if let Some(label) = req.watermark() {
        draw_watermark(&mut out, label);
    }
    out
}

fn draw_detection(img: &mut RgbImage, det: &NormalizedDetection, req: &AnnotationRequest) {
    let color = threat_color(&det.class_name, det.confidence);
    let b = clamp_box(det.bbox_px, img.width(), img.height());

    for t in 0..STROKE {
        let (x1, y1, x2, y2) = (b.x1 + t, b.y1 + t, b.x2 - t, b.y2 - t);
        if x2 < x1 || y2 < y1 {
            break;
        }
        let rect = Rect::at(x1, y1).of_size((x2 - x1 + 1) as u32, (y2 - y1 + 1) as u32);
        draw_hollow_rect_mut(img, rect, color);
    }

    if req.show_label {
        draw_label(img, det.bbox_px, &label_text(det, req.show_confidence), color);
    }
}

/// Band of `LABEL_BAND_H` above the unclamped top-left corner, clipped to the image.
fn draw_label(img: &mut RgbImage, b: BoxPx, text: &str, color: Rgb<u8>) {
    let (tw, _) = glyph::text_size(text, LABEL_SCALE);
    let (w, h) = (img.width() as i64, img.height() as i64);
    let (left, bottom) = (b.x1 as i64, b.y1 as i64);
    let top = bottom - LABEL_BAND_H as i64;

    let (x0, x1) = (left.max(0), (left + tw as i64).min(w));
    let (y0, y1) = (top.max(0), bottom.min(h));
    if x1 <= x0 || y1 <= y0 {
        return;
    }
    // the visible part is inside the image, so it fits i32
    let band = Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0) as u32, (y1 - y0) as u32);
    draw_filled_rect_mut(img, band, color);
    glyph::draw_text(img, b.x1, b.y1.saturating_sub(LABEL_BAND_H - LABEL_TEXT_INSET), LABEL_SCALE, text, WHITE);
}

/// Pull coordinates into a band just around the image.
///
/// Primitives clip on their own; the clamp keeps extents small and overflow-free
/// while leaving off-image edges off-image.
fn clamp_box(b: BoxPx, w: u32, h: u32) -> BoxPx {
    let (w, h) = (w.min(i32::MAX as u32 / 2) as i32, h.min(i32::MAX as u32 / 2) as i32);
    let cx = |v: i32| v.clamp(-STROKE, w + STROKE);
    let cy = |v: i32| v.clamp(-STROKE, h + STROKE);
    BoxPx { x1: cx(b.x1), y1: cy(b.y1), x2: cx(b.x2), y2: cy(b.y2) }
}

fn draw_watermark(img: &mut RgbImage, label: &str) {
    let (tw, th) = glyph::text_size(label, WATERMARK_SCALE);
    let rect_w = tw.saturating_add(2 * WATERMARK_PAD as u32);
    let rect_h = th + 2 * WATERMARK_PAD as u32;
    darken(img, WATERMARK_ORIGIN as u32, WATERMARK_ORIGIN as u32, rect_w, rect_h, WATERMARK_OPACITY);
    glyph::draw_text(
        img,
        WATERMARK_ORIGIN + WATERMARK_PAD,
        WATERMARK_ORIGIN + WATERMARK_PAD,
        WATERMARK_SCALE,
        label,
        WHITE,
    );
}

/// Composite black at `opacity` over the given region, clipped to the image.
fn darken(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, opacity: f32) {
    let x_end = x.saturating_add(w).min(img.width());
    let y_end = y.saturating_add(h).min(img.height());
    let keep = 1.0 - opacity;
    for py in y..y_end {
        for px in x..x_end {
            let p = img.get_pixel_mut(px, py);
            for c in p.0.iter_mut() {
                *c = (*c as f32 * keep).round() as u8;
            }
        }
    }
}
