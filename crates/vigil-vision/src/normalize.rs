use crate::{PipelineError, RawDetection};

/// Integer pixel rectangle with ordered corners (`x1 <= x2`, `y1 <= y2`).
///
/// Not clamped to the image; may lie partly or wholly outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxPx {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoxPx {
    fn from_corners(bbox: [f32; 4]) -> Self {
        // `as` truncates toward zero and saturates at the i32 range
        let [ax, ay, bx, by] = bbox.map(|v| v as i32);
        Self { x1: ax.min(bx), y1: ay.min(by), x2: ax.max(bx), y2: ay.max(by) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDetection {
    pub class_name: String,
    pub confidence: f32,
    pub bbox_px: BoxPx,
    /// Float corners exactly as the detector reported them.
    pub bbox: [f32; 4],
}

/// Resolve every raw detection against the class table, keeping detector order.
///
/// No confidence filtering happens here; the detector's own threshold is final.
pub fn normalize(
    raw: &[RawDetection],
    class_names: &[String],
) -> Result<Vec<NormalizedDetection>, PipelineError> {
    raw.iter()
        .enumerate()
        .map(|(i, d)| normalize_one(i, d, class_names))
        .collect()
}

fn normalize_one(
    i: usize,
    d: &RawDetection,
    class_names: &[String],
) -> Result<NormalizedDetection, PipelineError> {
    let class_name = usize::try_from(d.class_id)
        .ok()
        .and_then(|idx| class_names.get(idx))
        .ok_or_else(|| {
            PipelineError::DetectionData(format!(
                "detection {}: class index {} outside table of {}",
                i,
                d.class_id,
                class_names.len()
            ))
        })?;
    if class_name.is_empty() {
        return Err(PipelineError::DetectionData(format!(
            "detection {}: class index {} maps to an empty name",
            i, d.class_id
        )));
    }
    if !(0.0..=1.0).contains(&d.conf) {
        return Err(PipelineError::DetectionData(format!(
            "detection {}: confidence {} outside [0, 1]",
            i, d.conf
        )));
    }
    if d.bbox.iter().any(|v| !v.is_finite()) {
        return Err(PipelineError::DetectionData(format!(
            "detection {}: non-finite bbox {:?}",
            i, d.bbox
        )));
    }

    Ok(NormalizedDetection {
        class_name: class_name.clone(),
        confidence: d.conf,
        bbox_px: BoxPx::from_corners(d.bbox),
        bbox: d.bbox,
    })
}
