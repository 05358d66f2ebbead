use serde::{Deserialize, Serialize};

/// One detection as it goes out on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionOut {
    pub class: String,
    pub confidence: f32,
    // pixel coords as reported by the detector, [x1, y1, x2, y2]
    pub bbox: [f32; 4],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResponse {
    pub detections: Vec<DetectionOut>,
    pub count: usize,
    /// base64 JPEG
    pub annotated_image: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadRequest,
    Decode,
    DetectionData,
    Encoding,
    Detector,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_uses_class_key() {
        let d = DetectionOut { class: "person".into(), confidence: 0.5, bbox: [1.0, 2.0, 3.0, 4.0] };
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["class"], "person");
        assert_eq!(v["bbox"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn error_kind_is_snake_case() {
        let e = ErrorBody { kind: ErrorKind::DetectionData, message: "x".into() };
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["kind"], "detection_data");
    }
}
