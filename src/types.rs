use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, ShadowError>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ShadowError::InvalidConfig(format!(
                "latitude {} outside [-90, 90]",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ShadowError::InvalidConfig(format!(
                "longitude {} outside [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SunPosition {
    /// Degrees above the horizon, in [-90, 90].
    pub altitude_degrees: f64,
    /// Degrees clockwise from north, in [0, 360).
    pub azimuth_degrees: f64,
    pub timestamp: DateTime<Utc>,
}

impl SunPosition {
    pub fn is_above_horizon(&self) -> bool {
        self.altitude_degrees > 0.0
    }
}

/// Axis-aligned rectangle in the site's local planar frame (meters, x east, y north).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingRect {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingRect {
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn validate(&self) -> Result<()> {
        let values = [self.min_x, self.max_x, self.min_y, self.max_y];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ShadowError::InvalidGeometry(
                "bounds contain non-finite coordinates".to_string(),
            ));
        }
        if self.width() <= 0.0 || self.height() <= 0.0 {
            return Err(ShadowError::InvalidGeometry(format!(
                "bounds are empty ({} x {} m)",
                self.width(),
                self.height()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    Instant,
    Daily,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadowCell {
    /// Column index.
    pub x: usize,
    /// Row index, growing northward.
    pub y: usize,
    pub is_shaded: bool,
    pub sun_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowAnalysisResult {
    pub mode: AnalysisMode,
    pub cells: Vec<ShadowCell>,
    pub cell_size: f64,
    pub grid_width: usize,
    pub grid_height: usize,
    /// Exact percentage; see [`ShadowAnalysisResult::display_percent_shaded`].
    pub percent_shaded: Option<f64>,
    pub building_count: usize,
    pub stats: AnalysisStats,
}

impl ShadowAnalysisResult {
    pub fn display_percent_shaded(&self) -> Option<f64> {
        self.percent_shaded.map(|p| (p * 10.0).round() / 10.0)
    }

    pub fn cell(&self, x: usize, y: usize) -> Option<&ShadowCell> {
        if x >= self.grid_width || y >= self.grid_height {
            return None;
        }
        self.cells.get(y * self.grid_width + x)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub total_cells: usize,
    pub shaded_cells: usize,
    pub lit_cells: usize,
    pub daily: Option<DailyStats>,
}

impl AnalysisStats {
    pub fn is_empty(&self) -> bool {
        self.total_cells == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub samples: usize,
    pub step_minutes: f64,
    pub sampled_daylight_hours: f64,
    pub min_sun_hours: f64,
    pub max_sun_hours: f64,
    pub mean_sun_hours: f64,
    /// Mean sun hours over sampled daylight hours, 0.0-1.0.
    pub mean_exposure_ratio: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum ShadowError {
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("No daylight: {0}")]
    NoDaylight(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Analysis cancelled")]
    Cancelled,
    #[error("Analysis task failed: {0}")]
    TaskFailed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
