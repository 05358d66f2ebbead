use std::io::Cursor;
use std::sync::Arc;

use anyhow::Result;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use vigil_vision::normalize::normalize;
use vigil_vision::pipeline::{annotate_image, decode, process};
use vigil_vision::render::{label_text, render};
use vigil_vision::stub::StubDetector;
use vigil_vision::threat::classify;
use vigil_vision::{
    AnnotationRequest, Detector, PipelineError, RawDetection, ThreatTier, VisionContext,
};

const GRAY: Rgb<u8> = Rgb([90, 90, 90]);

fn coco_head() -> Vec<String> {
    ["person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn stub_ctx(dets: Vec<RawDetection>) -> VisionContext {
    VisionContext::new(Arc::new(StubDetector::new(coco_head(), dets)))
}

fn png_bytes(img: &RgbImage) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img.clone())
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn source() -> RgbImage {
    RgbImage::from_pixel(320, 240, GRAY)
}

#[test]
fn confident_person_is_critical_with_label() {
    let raw = RawDetection { class_id: 0, conf: 0.92, bbox: [10.0, 10.0, 50.0, 100.0] };
    let ctx = stub_ctx(vec![raw]);
    let res = process(&ctx, &png_bytes(&source()), &AnnotationRequest::default()).unwrap();

    assert_eq!(res.count, 1);
    let d = &res.detections[0];
    assert_eq!(d.class_name, "person");
    assert_eq!(classify(&d.class_name, d.confidence), ThreatTier::Critical);
    assert_eq!(label_text(d, true), "person 92%");

    let back = image::load_from_memory(&res.annotated_image).unwrap();
    assert_eq!((back.width(), back.height()), (320, 240));

    let img = source();
    let with = render(&img, &res.detections, &AnnotationRequest::default());
    assert_eq!(*with.get_pixel(10, 60), Rgb([255, 0, 0]));

    // the label adds pixels above the box top that a label-less render lacks
    let without = render(
        &img,
        &res.detections,
        &AnnotationRequest { show_label: false, ..Default::default() },
    );
    let above_differs = (10..170).any(|x| (0..10).any(|y| with.get_pixel(x, y) != without.get_pixel(x, y)));
    assert!(above_differs);
}

#[test]
fn low_confidence_car_is_still_caution() {
    let raw = RawDetection { class_id: 2, conf: 0.40, bbox: [0.0, 0.0, 20.0, 20.0] };
    let ctx = stub_ctx(vec![raw]);
    let res = annotate_image(&ctx, &source(), &AnnotationRequest::default()).unwrap();
    assert_eq!(res.count, 1);
    let d = &res.detections[0];
    assert_eq!(classify(&d.class_name, d.confidence), ThreatTier::Caution);

    let rendered = render(&source(), &res.detections, &AnnotationRequest::default());
    assert_eq!(*rendered.get_pixel(0, 10), Rgb([255, 255, 0]));
    assert_eq!(*rendered.get_pixel(20, 10), Rgb([255, 255, 0]));
}

#[test]
fn watermark_only_touches_top_left_when_nothing_detected() {
    let ctx = stub_ctx(vec![]);
    let req = AnnotationRequest { camera_label: Some("Lobby-Cam-1".into()), ..Default::default() };
    let res = process(&ctx, &png_bytes(&source()), &req).unwrap();
    assert_eq!(res.count, 0);
    assert!(res.detections.is_empty());

    let img = source();
    let rendered = render(&img, &res.detections, &req);
    let mut changed = 0;
    for (x, y, p) in rendered.enumerate_pixels() {
        if *p != GRAY {
            changed += 1;
            assert!(x < 300 && y < 60, "changed pixel outside watermark at ({}, {})", x, y);
        }
    }
    assert!(changed > 0);

    let back = image::load_from_memory(&res.annotated_image).unwrap();
    assert_eq!((back.width(), back.height()), (320, 240));
}

#[test]
fn no_detections_no_watermark_keeps_image() {
    let ctx = stub_ctx(vec![]);
    let res = annotate_image(&ctx, &source(), &AnnotationRequest::default()).unwrap();
    assert_eq!(res.count, 0);
    assert_eq!(render(&source(), &[], &AnnotationRequest::default()).as_raw(), source().as_raw());
}

#[test]
fn order_and_count_follow_detector() {
    let dets = vec![
        RawDetection { class_id: 7, conf: 0.5, bbox: [1.0, 1.0, 30.0, 30.0] },
        RawDetection { class_id: 0, conf: 0.7, bbox: [40.0, 40.0, 90.0, 120.0] },
        RawDetection { class_id: 5, conf: 0.99, bbox: [100.0, 10.0, 300.0, 200.0] },
    ];
    let ctx = stub_ctx(dets.clone());
    let res = annotate_image(&ctx, &source(), &AnnotationRequest::default()).unwrap();
    assert_eq!(res.count, 3);
    let names: Vec<_> = res.detections.iter().map(|d| d.class_name.as_str()).collect();
    assert_eq!(names, ["truck", "person", "bus"]);

    let wire = res.to_response();
    assert_eq!(wire.count, wire.detections.len());
    assert_eq!(wire.detections[1].bbox, dets[1].bbox);
    assert_eq!(wire.detections[1].confidence, 0.7);
}

#[test]
fn out_of_bounds_box_keeps_dimensions() {
    let raw = RawDetection { class_id: 0, conf: 0.9, bbox: [300.0, 200.0, 5000.0, 9000.0] };
    let ctx = stub_ctx(vec![raw]);
    let res = process(&ctx, &png_bytes(&source()), &AnnotationRequest::default()).unwrap();
    let back = image::load_from_memory(&res.annotated_image).unwrap();
    assert_eq!((back.width(), back.height()), (320, 240));
}

#[test]
fn same_input_same_bytes() {
    let raw = RawDetection { class_id: 0, conf: 0.7, bbox: [10.0, 30.0, 80.0, 120.0] };
    let ctx = stub_ctx(vec![raw]);
    let req = AnnotationRequest { camera_label: Some("Gate".into()), ..Default::default() };
    let bytes = png_bytes(&source());
    let a = process(&ctx, &bytes, &req).unwrap();
    let b = process(&ctx, &bytes, &req).unwrap();
    assert_eq!(a.annotated_image, b.annotated_image);
}

#[test]
fn garbage_bytes_are_decode_errors() {
    let ctx = stub_ctx(vec![]);
    for bytes in [&b""[..], &b"not an image"[..]] {
        let err = process(&ctx, bytes, &AnnotationRequest::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
        assert!(err.is_client_error());
    }
    assert!(decode(&png_bytes(&source())).is_ok());
}

#[test]
fn bad_class_index_is_detection_data_error() {
    let raw = RawDetection { class_id: 80, conf: 0.9, bbox: [0.0, 0.0, 1.0, 1.0] };
    let ctx = stub_ctx(vec![raw]);
    let err = annotate_image(&ctx, &source(), &AnnotationRequest::default()).unwrap_err();
    assert!(matches!(err, PipelineError::DetectionData(_)));
    assert!(!err.is_client_error());
}

struct FailingDetector;

impl Detector for FailingDetector {
    fn name(&self) -> &str {
        "failing"
    }

    fn class_names(&self) -> &[String] {
        &[]
    }

    fn detect(&self, _img: &RgbImage) -> Result<Vec<RawDetection>> {
        anyhow::bail!("inference backend unavailable")
    }
}

#[test]
fn detector_failure_propagates() {
    let ctx = VisionContext::new(Arc::new(FailingDetector));
    let err = annotate_image(&ctx, &source(), &AnnotationRequest::default()).unwrap_err();
    assert!(matches!(err, PipelineError::Detector(_)));
    assert!(err.to_string().contains("inference backend unavailable"));
}

#[test]
fn invalid_jpeg_quality_is_encoding_error() {
    let ctx = stub_ctx(vec![]).with_jpeg_quality(0);
    let err = annotate_image(&ctx, &source(), &AnnotationRequest::default()).unwrap_err();
    assert!(matches!(err, PipelineError::Encoding(_)));
}

#[test]
fn shared_context_across_threads() {
    let raw = RawDetection { class_id: 0, conf: 0.85, bbox: [20.0, 40.0, 100.0, 200.0] };
    let ctx = stub_ctx(vec![raw]);
    let bytes = png_bytes(&source());
    let req = AnnotationRequest::default();
    let expected = process(&ctx, &bytes, &req).unwrap().annotated_image;

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| process(&ctx, &bytes, &req).unwrap().annotated_image))
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), expected);
        }
    });
}

#[test]
fn normalize_matches_table_lookup() {
    let table = coco_head();
    let raw: Vec<_> = (0..8)
        .map(|i| RawDetection { class_id: i, conf: 0.5, bbox: [0.0, 0.0, 1.0, 1.0] })
        .collect();
    let out = normalize(&raw, &table).unwrap();
    for (i, d) in out.iter().enumerate() {
        assert_eq!(d.class_name, table[raw[i].class_id as usize]);
    }
}
