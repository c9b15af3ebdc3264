//! Audit configuration: grade-split tables, branding and defaults.
//!
//! Everything here used to be hard-coded per UI variant. A TOML file can
//! override any key; missing keys fall back to the compiled defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};
use crate::models::MaterialType;

/// Integer percentages for grades A, B and C. Grade D takes the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeSplit {
    pub a: u32,
    pub b: u32,
    pub c: u32,
}

impl GradeSplit {
    pub const fn new(a: u32, b: u32, c: u32) -> Self {
        Self { a, b, c }
    }

    fn validate(&self, material: &str) -> Result<()> {
        let sum = self.a.checked_add(self.b).and_then(|ab| ab.checked_add(self.c));
        if sum.map_or(true, |sum| sum > 100) {
            return Err(AuditError::InvalidConfiguration(format!(
                "grade split for {material} exceeds 100% ({} + {} + {})",
                self.a, self.b, self.c
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitTable {
    pub sacks: GradeSplit,
    pub fiber: GradeSplit,
    pub rolls: GradeSplit,
}

impl Default for SplitTable {
    fn default() -> Self {
        Self {
            sacks: GradeSplit::new(30, 40, 20),
            fiber: GradeSplit::new(25, 35, 25),
            rolls: GradeSplit::new(20, 30, 35),
        }
    }
}

impl SplitTable {
    pub fn for_material(&self, material: MaterialType) -> GradeSplit {
        match material {
            MaterialType::Sacks => self.sacks,
            MaterialType::Fiber => self.fiber,
            MaterialType::Rolls => self.rolls,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Branding {
    pub system_label: String,
    pub jurisdiction_label: String,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            system_label: "JUTEVISION".to_string(),
            jurisdiction_label: "MINISTRY OF TEXTILES, GOI".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub daily_consumption: i64,
    /// Confidence reported for an image with no detections at all.
    pub zero_detection_confidence: f64,
    pub branding: Branding,
    pub splits: SplitTable,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            daily_consumption: 50,
            zero_detection_confidence: 0.35,
            branding: Branding::default(),
            splits: SplitTable::default(),
        }
    }
}

impl AuditConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AuditConfig =
            toml::from_str(content).map_err(|e| AuditError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise the compiled defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                tracing::debug!(path = %path.display(), "loading audit config");
                Self::from_toml(&content)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.daily_consumption <= 0 {
            return Err(AuditError::InvalidConfiguration(format!(
                "daily_consumption must be at least 1, got {}",
                self.daily_consumption
            )));
        }
        if !(0.0..=1.0).contains(&self.zero_detection_confidence) {
            return Err(AuditError::InvalidConfiguration(format!(
                "zero_detection_confidence must be within [0, 1], got {}",
                self.zero_detection_confidence
            )));
        }
        self.splits.sacks.validate("sacks")?;
        self.splits.fiber.validate("fiber")?;
        self.splits.rolls.validate("rolls")?;
        Ok(())
    }
}
