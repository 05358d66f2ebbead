use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use vigil_proto::detect::{DetectResponse, DetectionOut};

use crate::normalize::NormalizedDetection;
use crate::PipelineError;

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

#[derive(Debug, Clone)]
pub struct AnnotatedResult {
    pub detections: Vec<NormalizedDetection>,
    pub count: usize,
    /// JPEG bytes of the rendered image.
    pub annotated_image: Vec<u8>,
}

impl AnnotatedResult {
    /// Wire form, with the image base64-encoded.
    pub fn to_response(&self) -> DetectResponse {
        DetectResponse {
            detections: self.detections.iter().map(to_wire).collect(),
            count: self.count,
            annotated_image: base64::encode(&self.annotated_image),
        }
    }
}

fn to_wire(d: &NormalizedDetection) -> DetectionOut {
    DetectionOut { class: d.class_name.clone(), confidence: d.confidence, bbox: d.bbox }
}

pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, PipelineError> {
    if !(1..=100).contains(&quality) {
        return Err(PipelineError::Encoding(format!("jpeg quality {} outside 1..=100", quality)));
    }
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(img)
        .map_err(|e| PipelineError::Encoding(e.to_string()))?;
    Ok(buf)
}

pub fn assemble(
    detections: Vec<NormalizedDetection>,
    rendered: &RgbImage,
    quality: u8,
) -> Result<AnnotatedResult, PipelineError> {
    let annotated_image = encode_jpeg(rendered, quality)?;
    Ok(AnnotatedResult { count: detections.len(), detections, annotated_image })
}
