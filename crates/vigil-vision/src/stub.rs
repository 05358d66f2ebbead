use anyhow::Result;
use image::RgbImage;
use serde::Deserialize;

use crate::{Detector, RawDetection};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StubConfig {
    #[serde(default)]
    pub detections: Vec<RawDetection>,
}

/// Returns the same configured detections for every image.
///
/// Stands in for a model in tests, demos and `doctor` runs.
pub struct StubDetector {
    class_names: Vec<String>,
    detections: Vec<RawDetection>,
}

impl StubDetector {
    pub fn new(class_names: Vec<String>, detections: Vec<RawDetection>) -> Self {
        Self { class_names, detections }
    }

    pub fn from_config(class_names: Vec<String>, cfg: &StubConfig) -> Self {
        Self::new(class_names, cfg.detections.clone())
    }
}

impl Detector for StubDetector {
    fn name(&self) -> &str {
        "stub"
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn detect(&self, _img: &RgbImage) -> Result<Vec<RawDetection>> {
        Ok(self.detections.clone())
    }
}
