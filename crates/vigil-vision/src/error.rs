use thiserror::Error;

/// Request-level failures of the detection pipeline.
///
/// `Decode` is the caller's fault; everything else is internal.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("image decode failed: {0}")]
    Decode(#[source] image::ImageError),

    #[error("malformed detector output: {0}")]
    DetectionData(String),

    #[error("annotated image encode failed: {0}")]
    Encoding(String),

    #[error("detector failed: {0:#}")]
    Detector(anyhow::Error),
}

impl PipelineError {
    /// True when the request itself was bad, as opposed to a server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::Decode(_))
    }
}
