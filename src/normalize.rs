use crate::config::{AuditConfig, GradeSplit, SplitTable};
use crate::error::{AuditError, Result};
use crate::models::{DetectionBox, DetectionRecord, GradeBuckets, MaterialType};

/// Turns one detector invocation into a `DetectionRecord`.
#[derive(Debug, Clone)]
pub struct Normalizer {
    splits: SplitTable,
    zero_detection_confidence: f64,
}

impl Normalizer {
    pub fn new(config: &AuditConfig) -> Self {
        Self {
            splits: config.splits.clone(),
            zero_detection_confidence: config.zero_detection_confidence,
        }
    }

    pub fn normalize(&self, boxes: &[DetectionBox], material: MaterialType) -> DetectionRecord {
        let raw_count = boxes.len() as u64;
        let confidence = if boxes.is_empty() {
            self.zero_detection_confidence
        } else {
            let sum: f64 = boxes.iter().map(|b| b.confidence).sum();
            (sum / boxes.len() as f64).clamp(0.0, 1.0)
        };

        DetectionRecord {
            raw_count,
            grade_buckets: split_count(raw_count, self.splits.for_material(material)),
            confidence,
        }
    }
}

/// Floors the A, B and C shares and hands the remainder to D, so the
/// buckets always sum to `raw_count`.
pub fn split_count(raw_count: u64, split: GradeSplit) -> GradeBuckets {
    let a = raw_count * u64::from(split.a) / 100;
    let b = raw_count * u64::from(split.b) / 100;
    let c = raw_count * u64::from(split.c) / 100;
    GradeBuckets {
        a,
        b,
        c,
        d: raw_count - a - b - c,
    }
}

/// Parses recorded detector output: one array of boxes per image.
pub fn parse_detections(json: &str) -> Result<Vec<Vec<DetectionBox>>> {
    let images: Vec<Vec<DetectionBox>> = serde_json::from_str(json)?;
    for (index, boxes) in images.iter().enumerate() {
        if let Some(bad) = boxes
            .iter()
            .find(|b| !(0.0..=1.0).contains(&b.confidence))
        {
            return Err(AuditError::InvalidInput(format!(
                "image {} has a box with confidence {} outside [0, 1]",
                index + 1,
                bad.confidence
            )));
        }
    }
    Ok(images)
}
