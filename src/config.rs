use crate::accuracy::DemMetadata;
use crate::sun_path::{preset_date, DatePreset, DEFAULT_STEP_MINUTES};
use crate::terrain::{BuildingMass, TerrainSurface};
use crate::types::*;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_step_minutes() -> f64 {
    DEFAULT_STEP_MINUTES
}

fn default_cell_size() -> f64 {
    2.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingConfig {
    pub footprint: Vec<[f64; 2]>,
    #[serde(default)]
    pub base_height: f64,
    pub top_height: f64,
}

/// Analysis request as loaded from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub site: GeoPoint,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub preset: Option<DatePreset>,
    /// Instant for single-position runs.
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(default = "default_step_minutes")]
    pub step_minutes: f64,
    #[serde(default = "default_cell_size")]
    pub cell_size: f64,
    pub bounds: BoundingRect,
    pub terrain: TerrainSurface,
    #[serde(default)]
    pub buildings: Vec<BuildingConfig>,
    #[serde(default)]
    pub dem: DemMetadata,
    #[serde(default)]
    pub cpu_cores: Option<usize>,
}

impl AnalysisConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.site.validate()?;
        if self.date.is_some() && self.preset.is_some() {
            return Err(ShadowError::InvalidConfig(
                "set either date or preset, not both".to_string(),
            ));
        }
        if !self.step_minutes.is_finite() || self.step_minutes <= 0.0 || self.step_minutes > 1440.0 {
            return Err(ShadowError::InvalidConfig(format!(
                "step_minutes must be in (0, 1440], got {}",
                self.step_minutes
            )));
        }
        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            return Err(ShadowError::InvalidConfig(format!(
                "cell_size must be positive, got {}",
                self.cell_size
            )));
        }
        if self.cpu_cores == Some(0) {
            return Err(ShadowError::InvalidConfig(
                "cpu_cores must be at least 1".to_string(),
            ));
        }
        if self.dem.nominal_resolution_m < 0.0 || self.dem.vertical_error_m < 0.0 {
            return Err(ShadowError::InvalidConfig(
                "DEM metadata must be non-negative".to_string(),
            ));
        }
        self.bounds.validate()?;
        self.terrain.validate()?;
        Ok(())
    }

    /// Explicit date, else preset in the current year, else today (UTC).
    pub fn analysis_date(&self) -> NaiveDate {
        match (self.date, self.preset) {
            (Some(date), _) => date,
            (None, Some(preset)) => preset_date(preset),
            (None, None) => self
                .time
                .map(|t| t.date_naive())
                .unwrap_or_else(|| Utc::now().date_naive()),
        }
    }

    pub fn to_buildings(&self) -> Result<Vec<BuildingMass>> {
        self.buildings
            .iter()
            .map(|b| BuildingMass::from_ring(&b.footprint, b.base_height, b.top_height))
            .collect()
    }

    pub fn get_cpu_cores(&self) -> usize {
        self.cpu_cores.unwrap_or_else(num_cpus::get)
    }
}
