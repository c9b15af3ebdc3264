use crate::error::{AuditError, Result};
use crate::models::{
    AuditMetadata, AuditSummary, ComplianceStatus, DataSource, DetectionRecord, Grade,
    GradeBuckets, ManualCounts, ReviewRisk, RiskLevel,
};

pub const COMPLIANCE_THRESHOLD_DAYS: f64 = 30.0;

const BASE_WEIGHT_KG: f64 = 12.5;
const WEIGHT_PER_DETECTION_KG: f64 = 3.2;

/// Running sums over detection records. Addition is order independent.
#[derive(Debug, Clone, Default)]
struct Tally {
    image_count: usize,
    zero_detection_images: usize,
    total_count: u64,
    grade_totals: GradeBuckets,
    confidence_sum: f64,
}

impl Tally {
    fn absorb(&mut self, record: &DetectionRecord) {
        self.image_count += 1;
        if record.raw_count == 0 {
            self.zero_detection_images += 1;
        }
        self.total_count = self.total_count.saturating_add(record.raw_count);
        self.grade_totals.add(&record.grade_buckets);
        self.confidence_sum += record.confidence;
    }

    fn mean_confidence(&self) -> f64 {
        if self.image_count == 0 {
            0.0
        } else {
            self.confidence_sum / self.image_count as f64
        }
    }
}

pub fn aggregate(records: &[DetectionRecord], daily_consumption: i64) -> Result<AuditSummary> {
    let daily = validate_consumption(daily_consumption)?;

    let mut tally = Tally::default();
    for record in records {
        tally.absorb(record);
    }

    let weight = BASE_WEIGHT_KG * tally.image_count as f64
        + WEIGHT_PER_DETECTION_KG * tally.total_count as f64;

    let summary = build_summary(
        DataSource::Detected,
        tally.total_count,
        tally.grade_totals,
        tally.mean_confidence(),
        daily,
        tally.image_count,
        tally.zero_detection_images,
        round_one_decimal(weight),
    );

    tracing::info!(
        images = summary.image_count,
        total = summary.total_count,
        stock_days = summary.stock_days,
        grade = %summary.overall_grade,
        compliance = %summary.compliance_status,
        "aggregated detection records"
    );

    Ok(summary)
}

/// Operator-entered counts, graded with the same rules as detected ones.
/// Confidence is pinned to 1.0 by convention for this path.
pub fn aggregate_manual(counts: &ManualCounts, daily_consumption: i64) -> Result<AuditSummary> {
    let daily = validate_consumption(daily_consumption)?;
    counts.validate()?;

    let summary = build_summary(
        DataSource::Manual,
        counts.total,
        counts.grades,
        1.0,
        daily,
        0,
        0,
        round_one_decimal(WEIGHT_PER_DETECTION_KG * counts.total as f64),
    );

    tracing::info!(
        total = summary.total_count,
        stock_days = summary.stock_days,
        grade = %summary.overall_grade,
        "recorded manual entry"
    );

    Ok(summary)
}

/// Attaches session metadata and rescores review risk, which depends on flags.
pub fn finalize(mut summary: AuditSummary, metadata: AuditMetadata) -> AuditSummary {
    summary.metadata = metadata;
    summary.review_risk = review_risk(&summary);
    summary
}

#[allow(clippy::too_many_arguments)]
fn build_summary(
    source: DataSource,
    total_count: u64,
    grade_totals: GradeBuckets,
    mean_confidence: f64,
    daily_consumption: u64,
    image_count: usize,
    zero_detection_images: usize,
    estimated_weight_kg: f64,
) -> AuditSummary {
    let days = stock_days(total_count, daily_consumption);
    let mut summary = AuditSummary {
        metadata: AuditMetadata::default(),
        source,
        image_count,
        zero_detection_images,
        total_count,
        grade_totals,
        mean_confidence,
        daily_consumption,
        stock_days: days,
        overall_grade: overall_grade(&grade_totals, total_count),
        compliance_status: compliance_status(days),
        estimated_weight_kg,
        review_risk: ReviewRisk {
            score: 0,
            level: RiskLevel::Low,
            reasons: Vec::new(),
        },
    };
    summary.review_risk = review_risk(&summary);
    summary
}

fn validate_consumption(daily_consumption: i64) -> Result<u64> {
    if daily_consumption <= 0 {
        return Err(AuditError::InvalidConfiguration(format!(
            "daily consumption must be positive, got {daily_consumption}"
        )));
    }
    Ok(daily_consumption as u64)
}

/// Rounds on the exact binary value, ties to even: `29.95` is stored just
/// below the tie and comes out as `29.9`.
pub fn round_one_decimal(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    format!("{value:.1}").parse().unwrap_or(value)
}

pub fn stock_days(total_count: u64, daily_consumption: u64) -> f64 {
    round_one_decimal(total_count as f64 / daily_consumption as f64)
}

/// First matching rule wins. A zero total falls through to `D`.
pub fn overall_grade(totals: &GradeBuckets, total_count: u64) -> Grade {
    // Integer form of `count > pct% of total`.
    let exceeds = |count: u64, pct: u64| {
        u128::from(count) * 100 > u128::from(total_count) * u128::from(pct)
    };

    if exceeds(totals.a, 35) {
        Grade::A
    } else if exceeds(totals.b, 30) {
        Grade::B
    } else if exceeds(totals.c, 25) {
        Grade::C
    } else {
        Grade::D
    }
}

pub fn compliance_status(stock_days: f64) -> ComplianceStatus {
    if stock_days >= COMPLIANCE_THRESHOLD_DAYS {
        ComplianceStatus::Pass
    } else {
        ComplianceStatus::Fail
    }
}

pub fn review_risk(summary: &AuditSummary) -> ReviewRisk {
    let mut score = 0u32;
    let mut reasons = Vec::new();

    if summary.source == DataSource::Detected && summary.image_count > 0 {
        if summary.mean_confidence < 0.60 {
            score += 30;
            reasons.push(format!("low detector confidence ({:.2})", summary.mean_confidence));
        } else if summary.mean_confidence < 0.75 {
            score += 15;
            reasons.push(format!("moderate detector confidence ({:.2})", summary.mean_confidence));
        }
    }

    if summary.zero_detection_images > 0 {
        score += 10 * summary.zero_detection_images.min(3) as u32;
        reasons.push(format!(
            "{} image(s) with no detections",
            summary.zero_detection_images
        ));
    }

    let rejects = u128::from(summary.grade_totals.d);
    if summary.total_count > 0 && rejects * 4 > u128::from(summary.total_count) {
        score += 20;
        reasons.push("reject share above 25%".to_string());
    }

    if !summary.metadata.flags.is_empty() {
        score += 10 * summary.metadata.flags.len().min(10) as u32;
        reasons.push(format!("{} quality flag(s) raised", summary.metadata.flags.len()));
    }

    if summary.source == DataSource::Manual {
        score += 15;
        reasons.push("counts entered manually".to_string());
    }

    let score = score.min(100);
    ReviewRisk {
        score,
        level: risk_level(score),
        reasons,
    }
}

pub fn risk_level(score: u32) -> RiskLevel {
    match score {
        0..=29 => RiskLevel::Low,
        30..=59 => RiskLevel::Medium,
        _ => RiskLevel::High,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QualityFlag;

    fn record(raw_count: u64, grades: (u64, u64, u64, u64), confidence: f64) -> DetectionRecord {
        DetectionRecord {
            raw_count,
            grade_buckets: GradeBuckets {
                a: grades.0,
                b: grades.1,
                c: grades.2,
                d: grades.3,
            },
            confidence,
        }
    }

    fn sample_records() -> Vec<DetectionRecord> {
        vec![
            record(40, (12, 16, 8, 4), 0.92),
            record(60, (18, 24, 12, 6), 0.88),
            record(0, (0, 0, 0, 0), 0.35),
            record(17, (5, 6, 3, 3), 0.95),
        ]
    }

    #[test]
    fn two_records_at_fifty_per_day_fail() {
        let records = vec![record(40, (12, 16, 8, 4), 0.9), record(60, (18, 24, 12, 6), 0.9)];
        let summary = aggregate(&records, 50).unwrap();

        assert_eq!(summary.total_count, 100);
        assert_eq!(summary.stock_days, 2.0);
        assert_eq!(summary.compliance_status, ComplianceStatus::Fail);
    }

    #[test]
    fn two_records_at_three_per_day_pass() {
        let records = vec![record(40, (12, 16, 8, 4), 0.9), record(60, (18, 24, 12, 6), 0.9)];
        let summary = aggregate(&records, 3).unwrap();

        assert_eq!(summary.stock_days, 33.3);
        assert_eq!(summary.compliance_status, ComplianceStatus::Pass);
    }

    #[test]
    fn empty_input_is_a_defined_state() {
        let summary = aggregate(&[], 25).unwrap();

        assert_eq!(summary.total_count, 0);
        assert_eq!(summary.mean_confidence, 0.0);
        assert_eq!(summary.stock_days, 0.0);
        assert_eq!(summary.compliance_status, ComplianceStatus::Fail);
        assert_eq!(summary.overall_grade, Grade::D);
        assert_eq!(summary.grade_label(), "N/A");
    }

    #[test]
    fn non_positive_consumption_is_rejected() {
        for daily in [0, -5] {
            let err = aggregate(&sample_records(), daily).unwrap_err();
            assert!(matches!(err, AuditError::InvalidConfiguration(_)));
        }
    }

    #[test]
    fn totals_do_not_depend_on_record_order() {
        let records = sample_records();
        let forward = aggregate(&records, 10).unwrap();

        let mut reversed = records.clone();
        reversed.reverse();
        let mut rotated = records.clone();
        rotated.rotate_left(2);

        for permutation in [reversed, rotated] {
            let summary = aggregate(&permutation, 10).unwrap();
            assert_eq!(summary.total_count, forward.total_count);
            assert_eq!(summary.grade_totals, forward.grade_totals);
            assert_eq!(summary.grade_totals.total(), summary.total_count);
        }
    }

    #[test]
    fn mean_confidence_averages_per_image_values() {
        let summary = aggregate(&sample_records(), 10).unwrap();
        let expected = (0.92 + 0.88 + 0.35 + 0.95) / 4.0;
        assert!((summary.mean_confidence - expected).abs() < 1e-9);
        assert_eq!(summary.zero_detection_images, 1);
    }

    #[test]
    fn compliance_boundary_is_inclusive() {
        assert_eq!(stock_days(300, 10), 30.0);
        assert_eq!(compliance_status(stock_days(300, 10)), ComplianceStatus::Pass);
        assert_eq!(stock_days(299, 10), 29.9);
        assert_eq!(compliance_status(stock_days(299, 10)), ComplianceStatus::Fail);
    }

    #[test]
    fn stock_days_never_rounds_up_across_the_threshold() {
        // 599 / 20 is stored as 29.949999..., so it stays below 30.
        assert_eq!(stock_days(599, 20), 29.9);
        assert_eq!(compliance_status(stock_days(599, 20)), ComplianceStatus::Fail);
        assert_eq!(stock_days(1, 4), 0.2);
        assert_eq!(stock_days(3, 4), 0.8);
        assert_eq!(stock_days(100, 3), 33.3);
    }

    #[test]
    fn huge_manual_total_does_not_overflow() {
        let total = u64::MAX / 50;
        let counts = ManualCounts {
            total,
            grades: GradeBuckets { a: total, b: 0, c: 0, d: 0 },
        };
        let summary = aggregate_manual(&counts, 1).unwrap();
        assert_eq!(summary.overall_grade, Grade::A);
        assert_eq!(summary.compliance_status, ComplianceStatus::Pass);

        let rejects = ManualCounts {
            total,
            grades: GradeBuckets { a: 0, b: 0, c: 0, d: total },
        };
        let summary = finalize(aggregate_manual(&rejects, 1).unwrap(), AuditMetadata::default());
        assert_eq!(summary.overall_grade, Grade::D);
        assert!(summary.review_risk.score >= 20);
    }

    #[test]
    fn grade_rules_apply_in_order() {
        // A and B both exceed their thresholds; A wins.
        let totals = GradeBuckets { a: 40, b: 40, c: 10, d: 10 };
        assert_eq!(overall_grade(&totals, 100), Grade::A);

        // Exactly 35% is not "more than" 35%.
        let totals = GradeBuckets { a: 35, b: 30, c: 25, d: 10 };
        assert_eq!(overall_grade(&totals, 100), Grade::D);

        let totals = GradeBuckets { a: 30, b: 31, c: 20, d: 19 };
        assert_eq!(overall_grade(&totals, 100), Grade::B);

        let totals = GradeBuckets { a: 20, b: 30, c: 26, d: 24 };
        assert_eq!(overall_grade(&totals, 100), Grade::C);
    }

    #[test]
    fn manual_entry_pins_confidence_to_one() {
        let counts = ManualCounts {
            total: 900,
            grades: GradeBuckets { a: 100, b: 200, c: 300, d: 300 },
        };
        let summary = aggregate_manual(&counts, 30).unwrap();

        assert_eq!(summary.mean_confidence, 1.0);
        assert_eq!(summary.source, DataSource::Manual);
        assert_eq!(summary.stock_days, 30.0);
        assert_eq!(summary.compliance_status, ComplianceStatus::Pass);
        assert_eq!(summary.overall_grade, Grade::C);
    }

    #[test]
    fn manual_entry_rejects_mismatched_counts() {
        let counts = ManualCounts {
            total: 10,
            grades: GradeBuckets { a: 1, b: 1, c: 1, d: 1 },
        };
        assert!(matches!(
            aggregate_manual(&counts, 5),
            Err(AuditError::InvalidInput(_))
        ));
    }

    #[test]
    fn weight_estimate_uses_per_image_base() {
        let records = vec![record(10, (3, 4, 2, 1), 0.9), record(0, (0, 0, 0, 0), 0.35)];
        let summary = aggregate(&records, 1).unwrap();
        // 2 * 12.5 + 10 * 3.2
        assert_eq!(summary.estimated_weight_kg, 57.0);
    }

    #[test]
    fn review_risk_accumulates_and_caps() {
        let records = vec![
            record(10, (0, 0, 0, 10), 0.4),
            record(0, (0, 0, 0, 0), 0.35),
            record(0, (0, 0, 0, 0), 0.35),
            record(0, (0, 0, 0, 0), 0.35),
            record(0, (0, 0, 0, 0), 0.35),
        ];
        let summary = aggregate(&records, 1).unwrap();
        // 30 confidence + 30 capped empties + 20 rejects
        assert_eq!(summary.review_risk.score, 80);
        assert_eq!(summary.review_risk.level, RiskLevel::High);

        let metadata = AuditMetadata {
            flags: vec![QualityFlag::DamagedBales, QualityFlag::IrregularStock],
            ..AuditMetadata::default()
        };
        let flagged = finalize(summary, metadata);
        assert_eq!(flagged.review_risk.score, 100);
    }

    #[test]
    fn clean_detection_run_is_low_risk() {
        let records = vec![record(40, (12, 16, 8, 4), 0.93)];
        let summary = aggregate(&records, 1).unwrap();
        assert_eq!(summary.review_risk.score, 0);
        assert_eq!(summary.review_risk.level, RiskLevel::Low);
        assert!(summary.review_risk.reasons.is_empty());
    }

    #[test]
    fn risk_levels_follow_tiers() {
        assert_eq!(risk_level(0), RiskLevel::Low);
        assert_eq!(risk_level(29), RiskLevel::Low);
        assert_eq!(risk_level(30), RiskLevel::Medium);
        assert_eq!(risk_level(60), RiskLevel::High);
    }
}
