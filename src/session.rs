use chrono::{DateTime, Utc};

use crate::aggregate;
use crate::error::Result;
use crate::models::{
    AuditMetadata, AuditSummary, DetectionBox, DetectionRecord, GeoPoint, ManualCounts,
    MaterialType, MillDetails, QualityFlag,
};
use crate::normalize::Normalizer;

/// One inspection, from first image to export. Owns its records; nothing
/// is shared between sessions.
#[derive(Debug, Clone)]
pub struct AuditSession {
    metadata: AuditMetadata,
    material: MaterialType,
    daily_consumption: i64,
    records: Vec<DetectionRecord>,
}

impl AuditSession {
    pub fn new(
        inspector_name: &str,
        material: MaterialType,
        daily_consumption: i64,
        started_at: DateTime<Utc>,
    ) -> Self {
        let audit_id = audit_id(inspector_name, started_at);
        tracing::info!(%audit_id, %material, "audit session started");

        let inspector_name = inspector_name.trim();
        Self {
            metadata: AuditMetadata {
                audit_id,
                inspector_name: (!inspector_name.is_empty()).then(|| inspector_name.to_string()),
                timestamp: Some(started_at),
                material_type: Some(material),
                ..AuditMetadata::default()
            },
            material,
            daily_consumption,
            records: Vec::new(),
        }
    }

    pub fn with_inspector_id(mut self, inspector_id: impl Into<String>) -> Self {
        self.metadata.inspector_id = Some(inspector_id.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.metadata.notes = notes.into();
        self
    }

    pub fn with_geolocation(mut self, point: GeoPoint) -> Self {
        self.metadata.geolocation = Some(point);
        self
    }

    pub fn with_mill(mut self, mill: MillDetails) -> Self {
        self.metadata.mill = Some(mill);
        self
    }

    pub fn audit_id(&self) -> &str {
        &self.metadata.audit_id
    }

    pub fn records(&self) -> &[DetectionRecord] {
        &self.records
    }

    pub fn flag(&mut self, flag: QualityFlag) {
        tracing::info!(audit_id = %self.metadata.audit_id, flag = ?flag, "quality flag raised");
        self.metadata.flags.push(flag);
    }

    pub fn mark_verified(&mut self) {
        self.metadata.inspector_verified = true;
    }

    /// Normalizes one image's detector output and keeps the record.
    pub fn add_detections(
        &mut self,
        normalizer: &Normalizer,
        boxes: &[DetectionBox],
    ) -> &DetectionRecord {
        let record = normalizer.normalize(boxes, self.material);
        tracing::debug!(
            image = self.records.len() + 1,
            count = record.raw_count,
            confidence = record.confidence,
            "normalized detections"
        );
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    /// Aggregates every record so far. Can be re-run after more images arrive.
    pub fn analyze(&self) -> Result<AuditSummary> {
        let summary = aggregate::aggregate(&self.records, self.daily_consumption)?;
        Ok(aggregate::finalize(summary, self.metadata.clone()))
    }

    /// Grades operator-entered counts, ignoring any detection records.
    pub fn manual_entry(&self, counts: &ManualCounts) -> Result<AuditSummary> {
        let summary = aggregate::aggregate_manual(counts, self.daily_consumption)?;
        Ok(aggregate::finalize(summary, self.metadata.clone()))
    }
}

/// `AUDIT-<date>-<time>-<first three letters of the inspector>`.
pub fn audit_id(inspector_name: &str, at: DateTime<Utc>) -> String {
    let initials: String = inspector_name
        .trim()
        .chars()
        .take(3)
        .collect::<String>()
        .to_uppercase();
    let initials = if initials.is_empty() {
        "UNK".to_string()
    } else {
        initials
    };
    format!("AUDIT-{}-{}", at.format("%Y%m%d-%H%M%S"), initials)
}
