use std::fmt::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::Branding;
use crate::error::Result;
use crate::integrity;
use crate::models::AuditSummary;

/// `{"summary": ..., "hash": ...}`. The hash sits beside the summary so it
/// never covers itself.
pub fn export_record(summary: &AuditSummary, hash: &str) -> Result<Value> {
    Ok(serde_json::json!({
        "summary": serde_json::to_value(summary)?,
        "hash": hash,
    }))
}

/// `Field,Value` rows, one per top-level summary field, then the hash.
/// Nested values are written as compact JSON.
pub fn build_csv(summary: &AuditSummary, hash: &str) -> Result<String> {
    let value = serde_json::to_value(summary)?;
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Field", "Value"])?;

    if let Value::Object(map) = &value {
        let mut fields: Vec<(&String, &Value)> = map.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));
        for (key, field) in fields {
            let rendered = match field {
                Value::String(text) => text.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            writer.write_record([key.as_str(), rendered.as_str()])?;
        }
    }
    writer.write_record(["hash", hash])?;

    let bytes = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn build_summary_text(summary: &AuditSummary, hash: &str, branding: &Branding) -> String {
    let metadata = &summary.metadata;
    let mut output = String::new();

    let heading = format!("{} AUDITOR - AUDIT SUMMARY", branding.system_label.trim());
    let _ = writeln!(output, "{heading}");
    let _ = writeln!(output, "{}", "=".repeat(heading.chars().count()));
    let _ = writeln!(output, "Audit ID: {}", metadata.audit_id);
    let _ = writeln!(
        output,
        "Inspector: {}",
        metadata
            .inspector_name
            .as_deref()
            .or(metadata.inspector_id.as_deref())
            .unwrap_or("N/A")
    );
    let _ = writeln!(
        output,
        "Date: {}",
        metadata
            .timestamp
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "N/A".to_string())
    );
    if let Some(point) = metadata.geolocation {
        let _ = writeln!(output, "Location: {:.5}, {:.5}", point.latitude, point.longitude);
    }
    let _ = writeln!(output);

    let _ = writeln!(
        output,
        "MATERIAL: {}",
        metadata
            .material_type
            .map(|m| m.as_str().to_uppercase())
            .unwrap_or_else(|| "N/A".to_string())
    );
    let _ = writeln!(output, "SOURCE: {:?}", summary.source);
    let _ = writeln!(output, "IMAGES: {}", summary.image_count);
    let _ = writeln!(output, "TOTAL COUNT: {}", summary.total_count);
    let _ = writeln!(output, "GRADE DISTRIBUTION:");
    let _ = writeln!(output, "  - Grade A (Premium): {}", summary.grade_totals.a);
    let _ = writeln!(output, "  - Grade B (Export): {}", summary.grade_totals.b);
    let _ = writeln!(output, "  - Grade C (Local): {}", summary.grade_totals.c);
    let _ = writeln!(output, "  - Grade D (Reject): {}", summary.grade_totals.d);
    let _ = writeln!(output, "OVERALL GRADE: {}", summary.grade_label());
    let _ = writeln!(output, "CONFIDENCE: {:.1}%", summary.mean_confidence * 100.0);
    let _ = writeln!(output, "ESTIMATED WEIGHT: {:.1} kg", summary.estimated_weight_kg);
    let _ = writeln!(output);

    let _ = writeln!(output, "COMPLIANCE: {}", summary.compliance_status);
    let _ = writeln!(
        output,
        "STOCK DAYS: {:.1} (required: {:.0}+ days at {}/day)",
        summary.stock_days,
        crate::aggregate::COMPLIANCE_THRESHOLD_DAYS,
        summary.daily_consumption
    );
    let _ = writeln!(
        output,
        "REVIEW RISK: {} ({})",
        summary.review_risk.level, summary.review_risk.score
    );
    for reason in &summary.review_risk.reasons {
        let _ = writeln!(output, "  - {reason}");
    }

    if !metadata.flags.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "QUALITY FLAGS:");
        for flag in &metadata.flags {
            let _ = writeln!(output, "  - {}", String::from(flag.clone()));
        }
    }

    if !metadata.notes.trim().is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "NOTES: {}", metadata.notes.trim());
    }

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "Verification Hash: {}...",
        &hash[..hash.len().min(32)]
    );

    output
}

/// Everything an export writes, held in memory until `write_to`.
#[derive(Debug, Clone)]
pub struct ExportBundle {
    pub audit_id: String,
    pub hash: String,
    pub record: Value,
    pub csv: String,
    pub summary_text: String,
    pub images: Vec<Vec<u8>>,
}

impl ExportBundle {
    pub fn build(
        summary: &AuditSummary,
        watermarked_images: Vec<Vec<u8>>,
        branding: &Branding,
    ) -> Result<Self> {
        let hash = integrity::audit_hash(summary)?;
        Ok(Self {
            audit_id: summary.metadata.audit_id.clone(),
            record: export_record(summary, &hash)?,
            csv: build_csv(summary, &hash)?,
            summary_text: build_summary_text(summary, &hash, branding),
            images: watermarked_images,
            hash,
        })
    }

    pub fn file_stem(&self) -> &str {
        if self.audit_id.is_empty() {
            "AUDIT"
        } else {
            &self.audit_id
        }
    }

    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let stem = self.file_stem();
        let mut written = Vec::new();

        let json_path = dir.join(format!("{stem}_DATA.json"));
        std::fs::write(&json_path, serde_json::to_string_pretty(&self.record)?)?;
        written.push(json_path);

        let csv_path = dir.join(format!("{stem}_DATA.csv"));
        std::fs::write(&csv_path, &self.csv)?;
        written.push(csv_path);

        let summary_path = dir.join(format!("{stem}_SUMMARY.txt"));
        std::fs::write(&summary_path, &self.summary_text)?;
        written.push(summary_path);

        for (index, image) in self.images.iter().enumerate() {
            let image_path = dir.join(format!("{stem}_IMAGE_{}.jpg", index + 1));
            std::fs::write(&image_path, image)?;
            written.push(image_path);
        }

        tracing::info!(
            audit_id = %self.audit_id,
            files = written.len(),
            dir = %dir.display(),
            "export written"
        );
        Ok(written)
    }
}
