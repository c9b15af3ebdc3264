use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
        };
        f.write_str(letter)
    }
}

/// Material being audited. Only selects the grade-split table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum MaterialType {
    Sacks,
    Fiber,
    Rolls,
}

impl MaterialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialType::Sacks => "sacks",
            MaterialType::Fiber => "fiber",
            MaterialType::Rolls => "rolls",
        }
    }
}

impl fmt::Display for MaterialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-grade counts. The four buckets always add up to the count they were split from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeBuckets {
    #[serde(rename = "A")]
    pub a: u64,
    #[serde(rename = "B")]
    pub b: u64,
    #[serde(rename = "C")]
    pub c: u64,
    #[serde(rename = "D")]
    pub d: u64,
}

impl GradeBuckets {
    /// Saturates at `u64::MAX`; use `checked_total` where overflow is an error.
    pub fn total(&self) -> u64 {
        self.checked_total().unwrap_or(u64::MAX)
    }

    pub fn checked_total(&self) -> Option<u64> {
        self.a
            .checked_add(self.b)?
            .checked_add(self.c)?
            .checked_add(self.d)
    }

    pub fn add(&mut self, other: &GradeBuckets) {
        self.a = self.a.saturating_add(other.a);
        self.b = self.b.saturating_add(other.b);
        self.c = self.c.saturating_add(other.c);
        self.d = self.d.saturating_add(other.d);
    }
}

/// One bounding box as reported by the external detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub confidence: f64,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub raw_count: u64,
    pub grade_buckets: GradeBuckets,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MillDetails {
    pub name: Option<String>,
    pub license: Option<String>,
    pub address: Option<String>,
    pub contact: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum QualityFlag {
    DamagedBales,
    IrregularStock,
    Other(String),
}

impl From<String> for QualityFlag {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_uppercase().replace(['-', ' '], "_").as_str() {
            "DAMAGED_BALES" => QualityFlag::DamagedBales,
            "IRREGULAR_STOCK" => QualityFlag::IrregularStock,
            _ => QualityFlag::Other(value),
        }
    }
}

impl From<QualityFlag> for String {
    fn from(flag: QualityFlag) -> Self {
        match flag {
            QualityFlag::DamagedBales => "DAMAGED_BALES".to_string(),
            QualityFlag::IrregularStock => "IRREGULAR_STOCK".to_string(),
            QualityFlag::Other(value) => value,
        }
    }
}

/// Operator and session supplied facts. Never derived from detections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditMetadata {
    pub audit_id: String,
    pub inspector_id: Option<String>,
    pub inspector_name: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub material_type: Option<MaterialType>,
    #[serde(default)]
    pub notes: String,
    pub geolocation: Option<GeoPoint>,
    pub mill: Option<MillDetails>,
    #[serde(default)]
    pub flags: Vec<QualityFlag>,
    #[serde(default)]
    pub inspector_verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComplianceStatus {
    Pass,
    Fail,
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplianceStatus::Pass => f.write_str("PASS"),
            ComplianceStatus::Fail => f.write_str("FAIL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Detected,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => f.write_str("LOW"),
            RiskLevel::Medium => f.write_str("MEDIUM"),
            RiskLevel::High => f.write_str("HIGH"),
        }
    }
}

/// Informational review score. Not a certified fraud check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRisk {
    pub score: u32,
    pub level: RiskLevel,
    pub reasons: Vec<String>,
}

/// Operator-entered counts for the manual path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManualCounts {
    pub total: u64,
    pub grades: GradeBuckets,
}

impl ManualCounts {
    pub fn validate(&self) -> Result<()> {
        let sum = self.grades.checked_total().ok_or_else(|| {
            AuditError::InvalidInput("grade counts overflow when summed".to_string())
        })?;
        if sum != self.total {
            return Err(AuditError::InvalidInput(format!(
                "grade counts sum to {sum} but total is {}",
                self.total
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub metadata: AuditMetadata,
    pub source: DataSource,
    pub image_count: usize,
    pub zero_detection_images: usize,
    pub total_count: u64,
    pub grade_totals: GradeBuckets,
    pub mean_confidence: f64,
    pub daily_consumption: u64,
    pub stock_days: f64,
    pub overall_grade: Grade,
    pub compliance_status: ComplianceStatus,
    pub estimated_weight_kg: f64,
    pub review_risk: ReviewRisk,
}

impl AuditSummary {
    /// Grade as shown to people: `N/A` when nothing was counted.
    pub fn grade_label(&self) -> String {
        if self.total_count == 0 {
            "N/A".to_string()
        } else {
            self.overall_grade.to_string()
        }
    }
}
