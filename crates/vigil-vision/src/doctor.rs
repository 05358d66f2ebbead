use anyhow::Result;
use std::path::Path;

use crate::VisionConfig;

pub fn check_class_table(names: &[String]) -> Result<()> {
    anyhow::ensure!(!names.is_empty(), "vision.class_names is empty");
    if let Some(i) = names.iter().position(|n| n.trim().is_empty()) {
        anyhow::bail!("vision.class_names[{}] is empty", i);
    }
    Ok(())
}

pub fn check_thresholds(cfg: &VisionConfig) -> Result<()> {
    anyhow::ensure!((0.0..=1.0).contains(&cfg.conf_threshold), "vision.conf_threshold should be 0..1");
    anyhow::ensure!((0.0..=1.0).contains(&cfg.nms_iou_threshold), "vision.nms_iou_threshold should be 0..1");
    anyhow::ensure!(cfg.max_detections >= 1, "vision.max_detections must be >= 1");
    anyhow::ensure!(cfg.img_w >= 32 && cfg.img_h >= 32, "vision.img_w/img_h too small");
    Ok(())
}

pub fn check_backend(cfg: &VisionConfig) -> Result<()> {
    match cfg.backend.as_str() {
        "stub" => {
            let n = cfg.class_names.len();
            for (i, d) in cfg.stub.detections.iter().enumerate() {
                anyhow::ensure!(
                    d.class_id >= 0 && (d.class_id as usize) < n,
                    "vision.stub.detections[{}].class_id {} outside class table",
                    i, d.class_id
                );
            }
            Ok(())
        }
        "tflite" => {
            let path = if cfg.use_coral { &cfg.model_path_edgetpu } else { &cfg.model_path };
            anyhow::ensure!(Path::new(path).is_file(), "model file missing: {}", path);
            anyhow::ensure!(
                matches!(cfg.output_layout.as_str(), "ultralytics" | "yolov8"),
                "unsupported vision.output_layout: {}",
                cfg.output_layout
            );
            Ok(())
        }
        other => anyhow::bail!("unknown vision.backend: {}", other),
    }
}

pub fn check_jpeg_quality(q: u8) -> Result<()> {
    anyhow::ensure!((1..=100).contains(&q), "annotate.jpeg_quality should be 1..100");
    Ok(())
}

pub fn check_vision(cfg: &VisionConfig) -> Result<()> {
    check_class_table(&cfg.class_names)?;
    check_thresholds(cfg)?;
    check_backend(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubConfig;
    use crate::RawDetection;

    fn cfg(backend: &str) -> VisionConfig {
        VisionConfig {
            backend: backend.into(),
            model_name: "yolo11n".into(),
            class_names: vec!["person".into(), "car".into()],
            use_coral: false,
            model_path: "/nonexistent/model.tflite".into(),
            model_path_edgetpu: String::new(),
            img_w: 640,
            img_h: 640,
            conf_threshold: 0.25,
            nms_iou_threshold: 0.45,
            max_detections: 100,
            output_layout: "yolov8".into(),
            stub: StubConfig::default(),
        }
    }

    #[test]
    fn stub_config_passes() {
        check_vision(&cfg("stub")).unwrap();
    }

    #[test]
    fn empty_names_fail() {
        let mut c = cfg("stub");
        c.class_names.push(" ".into());
        assert!(check_vision(&c).is_err());
        c.class_names.clear();
        assert!(check_vision(&c).is_err());
    }

    #[test]
    fn stub_detections_must_resolve() {
        let mut c = cfg("stub");
        c.stub.detections.push(RawDetection { class_id: 2, conf: 0.5, bbox: [0.0; 4] });
        assert!(check_backend(&c).is_err());
    }

    #[test]
    fn tflite_needs_model_file() {
        assert!(check_backend(&cfg("tflite")).is_err());
        assert!(check_backend(&cfg("onnx")).is_err());
    }

    #[test]
    fn thresholds_and_quality() {
        let mut c = cfg("stub");
        c.conf_threshold = 1.5;
        assert!(check_thresholds(&c).is_err());
        assert!(check_jpeg_quality(0).is_err());
        check_jpeg_quality(95).unwrap();
    }
}
