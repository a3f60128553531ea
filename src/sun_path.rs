use crate::sun_position::{solar_day_window, SunCalculator, MILLIS_PER_HOUR};
use crate::types::{Result, ShadowError, SunPosition};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_STEP_MINUTES: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatePreset {
    Summer,
    Winter,
    SpringEquinox,
    FallEquinox,
}

/// Canonical analysis date for `preset` in the current UTC year.
pub fn preset_date(preset: DatePreset) -> NaiveDate {
    preset_date_in_year(preset, Utc::now().year())
}

pub fn preset_date_in_year(preset: DatePreset, year: i32) -> NaiveDate {
    let (month, day) = match preset {
        DatePreset::Summer => (6, 21),
        DatePreset::Winter => (12, 21),
        DatePreset::SpringEquinox => (3, 20),
        DatePreset::FallEquinox => (9, 22),
    };
    // All four dates exist in every proleptic Gregorian year chrono supports.
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

/// A daylight position and the share of the day's daylight it stands for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DaylightSample {
    pub position: SunPosition,
    /// Overlap of the sample's step interval with sunrise..sunset.
    pub credit_millis: u64,
}

impl DaylightSample {
    pub fn hours(&self) -> f64 {
        self.credit_millis as f64 / MILLIS_PER_HOUR
    }
}

/// Daylight sun positions sampled across one solar day.
///
/// Positions are computed on demand; [`SunPath::iter`] restarts the sweep
/// from the beginning each time it is called.
#[derive(Debug, Clone)]
pub struct SunPath {
    calculator: SunCalculator,
    latitude: f64,
    date: NaiveDate,
    start: DateTime<Utc>,
    step_minutes: f64,
    steps: usize,
}

impl SunPath {
    pub fn new(latitude: f64, longitude: f64, date: NaiveDate, step_minutes: f64) -> Result<Self> {
        if !step_minutes.is_finite() || step_minutes <= 0.0 || step_minutes > 1440.0 {
            return Err(ShadowError::InvalidConfig(format!(
                "step_minutes must be in (0, 1440], got {}",
                step_minutes
            )));
        }
        let (start, _) = solar_day_window(longitude, date);
        Ok(Self {
            calculator: SunCalculator::new(latitude, longitude),
            latitude,
            date,
            start,
            step_minutes,
            steps: (1440.0 / step_minutes).ceil() as usize,
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn step_minutes(&self) -> f64 {
        self.step_minutes
    }

    pub fn iter(&self) -> SunPathIter<'_> {
        SunPathIter {
            path: self,
            next_step: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Hours between sunrise and sunset, as reported by solar times.
    pub fn daylight_hours(&self) -> f64 {
        self.daylight_span()
            .map(|(rise, set)| (set - rise).num_milliseconds() as f64 / MILLIS_PER_HOUR)
            .unwrap_or(0.0)
    }

    /// Total credit of all daylight samples; never more than [`SunPath::daylight_hours`].
    pub fn sampled_daylight_hours(&self) -> f64 {
        let millis: u64 = self.daylight_samples().iter().map(|s| s.credit_millis).sum();
        millis as f64 / MILLIS_PER_HOUR
    }

    /// Daylight positions, each credited with the part of its step interval
    /// (centred on the sample) that falls between sunrise and sunset.
    ///
    /// Intervals of consecutive samples share their boundaries, so credits
    /// never sum past the day's daylight.
    pub fn daylight_samples(&self) -> Vec<DaylightSample> {
        let Some((rise, set)) = self.daylight_span() else {
            return Vec::new();
        };
        (0..self.steps)
            .filter_map(|step| {
                let position = self.calculator.get_position(&self.instant_at(step as f64));
                if !position.is_above_horizon() {
                    return None;
                }
                let lo = self.instant_at(step as f64 - 0.5).max(rise);
                let hi = self.instant_at(step as f64 + 0.5).min(set);
                let credit_millis = (hi - lo).num_milliseconds().max(0) as u64;
                Some(DaylightSample {
                    position,
                    credit_millis,
                })
            })
            .collect()
    }

    /// Daylight samples, failing with `NoDaylight` for an empty path.
    pub fn require_daylight(&self) -> Result<Vec<DaylightSample>> {
        let samples = self.daylight_samples();
        if samples.is_empty() {
            return Err(ShadowError::NoDaylight(format!(
                "sun stays below the horizon on {} at latitude {:.3}",
                self.date, self.latitude
            )));
        }
        Ok(samples)
    }

    fn daylight_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.calculator.day_profile(self.date).daylight()
    }

    fn instant_at(&self, step: f64) -> DateTime<Utc> {
        let millis = (step * self.step_minutes * 60_000.0).round() as i64;
        self.start + Duration::milliseconds(millis)
    }
}

impl<'a> IntoIterator for &'a SunPath {
    type Item = SunPosition;
    type IntoIter = SunPathIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct SunPathIter<'a> {
    path: &'a SunPath,
    next_step: usize,
}

impl Iterator for SunPathIter<'_> {
    type Item = SunPosition;

    fn next(&mut self) -> Option<SunPosition> {
        while self.next_step < self.path.steps {
            let instant = self.path.instant_at(self.next_step as f64);
            self.next_step += 1;
            let position = self.path.calculator.get_position(&instant);
            if position.is_above_horizon() {
                return Some(position);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.path.steps - self.next_step))
    }
}

pub fn sun_path(
    latitude: f64,
    longitude: f64,
    date: NaiveDate,
    step_minutes: f64,
) -> Result<SunPath> {
    SunPath::new(latitude, longitude, date, step_minutes)
}
