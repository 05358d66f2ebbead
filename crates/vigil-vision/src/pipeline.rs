use std::sync::Arc;

use image::RgbImage;
use tracing::debug;

use crate::assemble::{assemble, AnnotatedResult, DEFAULT_JPEG_QUALITY};
use crate::normalize::normalize;
use crate::render::{render, AnnotationRequest};
use crate::threat::classify;
use crate::{Detector, PipelineError};

/// Process-wide, read-only state built once at startup and handed to every request.
#[derive(Clone)]
pub struct VisionContext {
    detector: Arc<dyn Detector>,
    jpeg_quality: u8,
}

impl VisionContext {
    pub fn new(detector: Arc<dyn Detector>) -> Self {
        Self { detector, jpeg_quality: DEFAULT_JPEG_QUALITY }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }
}

pub fn decode(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    let img = image::load_from_memory(bytes).map_err(PipelineError::Decode)?;
    Ok(img.to_rgb8())
}

/// Detect, normalize, render and assemble for an already decoded image.
pub fn annotate_image(
    ctx: &VisionContext,
    img: &RgbImage,
    req: &AnnotationRequest,
) -> Result<AnnotatedResult, PipelineError> {
    let raw = ctx.detector.detect(img).map_err(PipelineError::Detector)?;
    let detections = normalize(&raw, ctx.detector.class_names())?;
    debug!(
        "pipeline: {} detections on {}x{} via {}",
        detections.len(),
        img.width(),
        img.height(),
        ctx.detector.name()
    );
    for d in &detections {
        debug!(
            "pipeline: {} {:.2} tier={}",
            d.class_name,
            d.confidence,
            classify(&d.class_name, d.confidence).as_str()
        );
    }
    let rendered = render(img, &detections, req);
    assemble(detections, &rendered, ctx.jpeg_quality)
}

/// Full request path from uploaded bytes.
pub fn process(
    ctx: &VisionContext,
    bytes: &[u8],
    req: &AnnotationRequest,
) -> Result<AnnotatedResult, PipelineError> {
    let img = decode(bytes)?;
    annotate_image(ctx, &img, req)
}
