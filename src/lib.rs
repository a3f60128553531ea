//! Sun position and shadow casting over site height grids.
//!
//! Build a [`HeightGrid`] from terrain and building massing, then either cast
//! shadows for one sun position ([`compute_instant_shadows`]) or accumulate
//! direct-sun hours over a sampled day ([`compute_sun_hours`]). Results can be
//! graded with [`assess_accuracy`] / [`validate_result`].

pub mod accuracy;
pub mod config;
pub mod shadow_engine;
pub mod sun_hours;
pub mod sun_path;
pub mod sun_position;
pub mod task;
pub mod terrain;
pub mod types;

pub use accuracy::{
    assess_accuracy, validate_result, AccuracyAssessment, AccuracyWarning, DemMetadata,
    QualityGrade, ValidationReport,
};
pub use config::AnalysisConfig;
pub use shadow_engine::{cast_shadows, compute_instant_shadows, ShadowCaster};
pub use sun_hours::{aggregate_sun_hours, compute_sun_hours, CancelToken, SunHoursAggregator};
pub use sun_path::{DatePreset, DaylightSample, SunPath};
pub use sun_position::{SolarTimes, SunCalculator};
pub use task::{ProgressUpdate, SunHoursTask};
pub use terrain::{build_grid, BuildingMass, HeightGrid, TerrainSurface};
pub use types::*;

use chrono::{DateTime, NaiveDate, Utc};

pub fn get_sun_position(latitude: f64, longitude: f64, instant: DateTime<Utc>) -> SunPosition {
    sun_position::compute_sun_position(latitude, longitude, instant)
}

/// Daylight sun path for `date`; fails only on an invalid step.
pub fn get_sun_path(
    latitude: f64,
    longitude: f64,
    date: NaiveDate,
    step_minutes: f64,
) -> Result<SunPath> {
    sun_path::sun_path(latitude, longitude, date, step_minutes)
}

pub fn get_preset_date(preset: DatePreset) -> NaiveDate {
    sun_path::preset_date(preset)
}

pub fn get_solar_times(latitude: f64, longitude: f64, date: NaiveDate) -> SolarTimes {
    sun_position::solar_times(latitude, longitude, date)
}
