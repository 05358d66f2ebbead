//! Detection post-processing and annotation for the vigil service.
//!
//! A request flows through [`pipeline::process`]: decode, run the shared
//! [`Detector`], [`normalize`] the raw output against the class table,
//! [`render`] threat-colored overlays, then [`assemble`] the response.

mod glyph;
mod nms;
pub mod assemble;
pub mod doctor;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod render;
pub mod stub;
pub mod threat;
#[cfg(feature = "vision-tflite")]
pub mod tflite;

use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};

pub use assemble::AnnotatedResult;
pub use error::PipelineError;
pub use normalize::{BoxPx, NormalizedDetection};
pub use pipeline::VisionContext;
pub use render::AnnotationRequest;
pub use threat::ThreatTier;

/// Detector output in pixel coordinates of the source image.
///
/// Nothing here is validated yet; corners may be unordered or out of bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class_id: i32,
    pub conf: f32,
    /// [x1, y1, x2, y2]
    pub bbox: [f32; 4],
}

/// Model-space prediction before NMS.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub class_id: i32,
    pub conf: f32,
    // normalized 0..1
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

impl Candidate {
    pub(crate) fn corners(&self) -> (f32, f32, f32, f32) {
        (
            self.cx - self.w / 2.0,
            self.cy - self.h / 2.0,
            self.cx + self.w / 2.0,
            self.cy + self.h / 2.0,
        )
    }

    /// Scale to pixel corners of an image of the given size.
    pub fn to_pixels(&self, img_w: u32, img_h: u32) -> RawDetection {
        let (x1, y1, x2, y2) = self.corners();
        let (w, h) = (img_w as f32, img_h as f32);
        RawDetection {
            class_id: self.class_id,
            conf: self.conf,
            bbox: [x1 * w, y1 * h, x2 * w, y2 * h],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    pub backend: String, // "stub" | "tflite"
    #[serde(default = "default_model_name")]
    pub model_name: String,
    pub class_names: Vec<String>,

    #[serde(default)]
    pub use_coral: bool,
    #[serde(default)]
    pub model_path: String,
    #[serde(default)]
    pub model_path_edgetpu: String,

    #[serde(default = "default_input_size")]
    pub img_w: u32,
    #[serde(default = "default_input_size")]
    pub img_h: u32,

    #[serde(default = "default_conf_threshold")]
    pub conf_threshold: f32,
    #[serde(default = "default_nms_iou_threshold")]
    pub nms_iou_threshold: f32,
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,
    #[serde(default = "default_output_layout")]
    pub output_layout: String, // "ultralytics" | "yolov8"

    #[serde(default)]
    pub stub: stub::StubConfig,
}

fn default_model_name() -> String { "yolo11n".into() }
fn default_input_size() -> u32 { 640 }
fn default_conf_threshold() -> f32 { 0.25 }
fn default_nms_iou_threshold() -> f32 { 0.45 }
fn default_max_detections() -> usize { 300 }
fn default_output_layout() -> String { "yolov8".into() }

/// The object detector collaborator.
///
/// One instance is loaded at startup and shared read-only by every request,
/// so `detect` takes `&self`; backends holding mutable native state guard it
/// themselves.
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;
    /// Class index -> label table.
    fn class_names(&self) -> &[String];
    fn detect(&self, img: &RgbImage) -> Result<Vec<RawDetection>>;
}

pub fn postprocess_ultralytics(
    raw: &[f32],
    num_preds: usize,
    num_classes: usize,
    conf_th: f32,
) -> Vec<Candidate> {
    // Row-major export:
    // [cx, cy, w, h, obj, cls0..]
    let stride = 5 + num_classes;
    let mut out = Vec::new();

    for i in 0..num_preds {
        let base = i * stride;
        if base + stride > raw.len() { break; }
        let row = &raw[base..base + stride];
        let (best_c, best_p) = best_class(&row[5..]);
        let conf = row[4] * best_p;
        if conf >= conf_th {
            out.push(Candidate { class_id: best_c as i32, conf, cx: row[0], cy: row[1], w: row[2], h: row[3] });
        }
    }
    out
}

/// YOLOv8 / YOLO11 export: channel-major `[4 + nc, N]`, no objectness.
pub fn postprocess_yolov8(
    raw: &[f32],
    num_preds: usize,
    num_classes: usize,
    conf_th: f32,
) -> Vec<Candidate> {
    let channels = 4 + num_classes;
    if raw.len() < channels * num_preds {
        return Vec::new();
    }
    let at = |c: usize, i: usize| raw[c * num_preds + i];
    let mut out = Vec::new();

    for i in 0..num_preds {
        let mut best_c = 0usize;
        let mut best_p = 0.0f32;
        for c in 0..num_classes {
            let p = at(4 + c, i);
            if p > best_p { best_p = p; best_c = c; }
        }
        if best_p >= conf_th {
            out.push(Candidate {
                class_id: best_c as i32,
                conf: best_p,
                cx: at(0, i),
                cy: at(1, i),
                w: at(2, i),
                h: at(3, i),
            });
        }
    }
    out
}

fn best_class(scores: &[f32]) -> (usize, f32) {
    let mut best = (0usize, 0.0f32);
    for (c, &p) in scores.iter().enumerate() {
        if p > best.1 { best = (c, p); }
    }
    best
}

pub fn nms_filter(mut dets: Vec<Candidate>, iou_th: f32, max_det: usize) -> Vec<Candidate> {
    dets.sort_by(|a, b| b.conf.partial_cmp(&a.conf).unwrap_or(std::cmp::Ordering::Equal));
    let mut kept: Vec<Candidate> = Vec::new();

    'outer: for d in dets {
        if kept.len() >= max_det { break; }
        for k in &kept {
            if nms::iou(&d, k) >= iou_th {
                continue 'outer;
            }
        }
        kept.push(d);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(conf: f32, cx: f32) -> Candidate {
        Candidate { class_id: 0, conf, cx, cy: 0.5, w: 0.2, h: 0.2 }
    }

    #[test]
    fn ultralytics_rows_apply_objectness() {
        // two preds, two classes
        let raw = [
            0.5, 0.5, 0.1, 0.1, 0.9, 0.1, 0.8,
            0.2, 0.2, 0.1, 0.1, 0.1, 0.9, 0.1,
        ];
        let out = postprocess_ultralytics(&raw, 2, 2, 0.5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class_id, 1);
        assert!((out[0].conf - 0.72).abs() < 1e-6);
    }

    #[test]
    fn yolov8_reads_channel_major() {
        // 3 preds, 1 class: rows are cx, cy, w, h, cls0
        let raw = [
            0.1, 0.5, 0.9,
            0.1, 0.5, 0.9,
            0.2, 0.2, 0.2,
            0.2, 0.2, 0.2,
            0.3, 0.95, 0.6,
        ];
        let out = postprocess_yolov8(&raw, 3, 1, 0.5);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].cx, 0.5);
        assert_eq!(out[1].conf, 0.6);
    }

    #[test]
    fn yolov8_short_buffer_yields_nothing() {
        assert!(postprocess_yolov8(&[0.0; 4], 2, 1, 0.1).is_empty());
    }

    #[test]
    fn nms_drops_overlaps_and_caps() {
        let dets = vec![cand(0.6, 0.5), cand(0.9, 0.51), cand(0.7, 0.1)];
        let kept = nms_filter(dets, 0.5, 10);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].conf, 0.9);
        assert_eq!(kept[1].conf, 0.7);

        let capped = nms_filter(vec![cand(0.6, 0.1), cand(0.7, 0.9)], 0.5, 1);
        assert_eq!(capped.len(), 1);
    }

    #[test]
    fn candidate_scales_to_pixels() {
        let c = Candidate { class_id: 2, conf: 0.5, cx: 0.5, cy: 0.5, w: 0.5, h: 0.25 };
        let r = c.to_pixels(200, 100);
        assert_eq!(r.bbox, [50.0, 37.5, 150.0, 62.5]);
        assert_eq!(r.class_id, 2);
    }
}
