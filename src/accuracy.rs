//! Expected shadow-edge error and result quality checks.
//!
//! The edge-error formula is empirical:
//! `shadow_edge = dem_resolution * 0.15 + dem_vertical_error * 0.5`.
//! Grading and checks are advisory and never fail an analysis.

use crate::types::ShadowAnalysisResult;
use serde::{Deserialize, Serialize};
use tracing::warn;

const RESOLUTION_EDGE_FACTOR: f64 = 0.15;
const VERTICAL_EDGE_FACTOR: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityGrade {
    Excellent,
    Good,
    Fair,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyAssessment {
    pub shadow_edge_meters: f64,
    pub quality_grade: QualityGrade,
}

/// Elevation model metadata from the elevation provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemMetadata {
    pub nominal_resolution_m: f64,
    pub vertical_error_m: f64,
}

impl Default for DemMetadata {
    fn default() -> Self {
        Self {
            nominal_resolution_m: 30.0,
            vertical_error_m: 10.0,
        }
    }
}

pub fn assess_accuracy(
    _cell_size: f64,
    dem_vertical_error_m: f64,
    dem_nominal_resolution_m: f64,
) -> AccuracyAssessment {
    let shadow_edge_meters = dem_nominal_resolution_m * RESOLUTION_EDGE_FACTOR
        + dem_vertical_error_m * VERTICAL_EDGE_FACTOR;
    let quality_grade = if shadow_edge_meters < 2.0 {
        QualityGrade::Excellent
    } else if shadow_edge_meters < 5.0 {
        QualityGrade::Good
    } else {
        QualityGrade::Fair
    };
    AccuracyAssessment {
        shadow_edge_meters,
        quality_grade,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl CheckStatus {
    fn score(self) -> f64 {
        match self {
            CheckStatus::Pass => 100.0,
            CheckStatus::Warn => 50.0,
            CheckStatus::Fail => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityCheckKind {
    GridResolution,
    DemQuality,
    BuildingData,
    Coverage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityCheck {
    pub kind: QualityCheckKind,
    pub status: CheckStatus,
    pub detail: String,
}

/// Non-fatal finding attached to a successful result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyWarning {
    pub kind: QualityCheckKind,
    pub status: CheckStatus,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub assessment: AccuracyAssessment,
    pub checks: Vec<QualityCheck>,
    /// Mean check score, 0-100.
    pub overall_score: f64,
    pub warnings: Vec<AccuracyWarning>,
}

pub fn validate_result(result: &ShadowAnalysisResult, dem: &DemMetadata) -> ValidationReport {
    let assessment = assess_accuracy(result.cell_size, dem.vertical_error_m, dem.nominal_resolution_m);

    let checks = vec![
        grid_resolution_check(result.cell_size),
        QualityCheck {
            kind: QualityCheckKind::DemQuality,
            status: if dem.nominal_resolution_m <= 30.0 {
                CheckStatus::Pass
            } else {
                CheckStatus::Warn
            },
            detail: format!("DEM resolution {} m", dem.nominal_resolution_m),
        },
        QualityCheck {
            kind: QualityCheckKind::BuildingData,
            status: if result.building_count > 0 {
                CheckStatus::Pass
            } else {
                CheckStatus::Warn
            },
            detail: format!("{} buildings integrated", result.building_count),
        },
        QualityCheck {
            kind: QualityCheckKind::Coverage,
            status: if result.stats.is_empty() {
                CheckStatus::Warn
            } else {
                CheckStatus::Pass
            },
            detail: format!("{} cells analyzed", result.stats.total_cells),
        },
    ];

    let overall_score = checks.iter().map(|c| c.status.score()).sum::<f64>() / checks.len() as f64;

    let warnings: Vec<AccuracyWarning> = checks
        .iter()
        .filter(|c| c.status != CheckStatus::Pass)
        .map(|c| AccuracyWarning {
            kind: c.kind,
            status: c.status,
            message: c.detail.clone(),
        })
        .collect();

    for w in &warnings {
        warn!(check = ?w.kind, status = ?w.status, "{}", w.message);
    }

    ValidationReport {
        assessment,
        checks,
        overall_score,
        warnings,
    }
}

fn grid_resolution_check(cell_size: f64) -> QualityCheck {
    let status = if cell_size <= 2.0 {
        CheckStatus::Pass
    } else if cell_size <= 5.0 {
        CheckStatus::Warn
    } else {
        CheckStatus::Fail
    };
    QualityCheck {
        kind: QualityCheckKind::GridResolution,
        status,
        detail: format!("grid cell size {} m", cell_size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnalysisMode, AnalysisStats};

    fn result(cell_size: f64, building_count: usize, total_cells: usize) -> ShadowAnalysisResult {
        ShadowAnalysisResult {
            mode: AnalysisMode::Instant,
            cells: vec![],
            cell_size,
            grid_width: 0,
            grid_height: 0,
            percent_shaded: Some(0.0),
            building_count,
            stats: AnalysisStats {
                total_cells,
                shaded_cells: 0,
                lit_cells: total_cells,
                daily: None,
            },
        }
    }

    #[test]
    fn test_edge_formula_and_grades() {
        let a = assess_accuracy(1.0, 1.0, 5.0);
        assert!((a.shadow_edge_meters - 1.25).abs() < 1e-12);
        assert_eq!(a.quality_grade, QualityGrade::Excellent);

        // 30m SRTM-class DEM: 4.5 + 0.5 * vertical error.
        assert_eq!(assess_accuracy(2.0, 0.0, 30.0).quality_grade, QualityGrade::Good);
        assert_eq!(assess_accuracy(2.0, 10.0, 30.0).quality_grade, QualityGrade::Fair);
        assert_eq!(assess_accuracy(2.0, 1.0, 20.0).quality_grade, QualityGrade::Good);
    }

    #[test]
    fn test_grade_boundaries_are_exclusive() {
        assert_eq!(assess_accuracy(1.0, 4.0, 0.0).quality_grade, QualityGrade::Good);
        assert_eq!(assess_accuracy(1.0, 10.0, 0.0).quality_grade, QualityGrade::Fair);
    }

    #[test]
    fn test_all_checks_pass() {
        let report = validate_result(&result(1.0, 3, 100), &DemMetadata {
            nominal_resolution_m: 10.0,
            vertical_error_m: 1.0,
        });
        assert_eq!(report.overall_score, 100.0);
        assert!(report.warnings.is_empty());
        assert_eq!(report.assessment.quality_grade, QualityGrade::Excellent);
    }

    #[test]
    fn test_mixed_checks_average() {
        // fail (cell 10m), warn (90m DEM), warn (no buildings), pass
        let report = validate_result(&result(10.0, 0, 100), &DemMetadata {
            nominal_resolution_m: 90.0,
            vertical_error_m: 16.0,
        });
        assert_eq!(report.overall_score, 50.0);
        assert_eq!(report.warnings.len(), 3);
        assert_eq!(report.checks[0].status, CheckStatus::Fail);
        assert_eq!(report.assessment.quality_grade, QualityGrade::Fair);
    }

    #[test]
    fn test_empty_stats_warn_coverage() {
        let report = validate_result(&result(3.0, 1, 0), &DemMetadata::default());
        let coverage = report
            .checks
            .iter()
            .find(|c| c.kind == QualityCheckKind::Coverage)
            .unwrap();
        assert_eq!(coverage.status, CheckStatus::Warn);
        assert_eq!(report.overall_score, 75.0);
    }
}
