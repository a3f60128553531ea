use crate::types::SunPosition;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

const JULIAN_UNIX_EPOCH: f64 = 2440587.5;
const J2000: f64 = 2451545.0;
const SECONDS_PER_DAY: f64 = 86_400.0;
pub(crate) const MILLIS_PER_HOUR: f64 = 3_600_000.0;

const COARSE_SCAN_SECONDS: i64 = 600;
const BISECTION_TOLERANCE_SECONDS: f64 = 1.0;

/// Sunrise, solar noon and sunset for one solar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarTimes {
    /// `None` when the sun does not rise within the solar day.
    pub sunrise: Option<DateTime<Utc>>,
    pub solar_noon: DateTime<Utc>,
    pub sunset: Option<DateTime<Utc>>,
    pub noon_altitude_degrees: f64,
    pub daylight_hours: f64,
}

#[derive(Debug, Clone)]
pub struct LocalSolarTimes {
    pub sunrise: Option<DateTime<Tz>>,
    pub solar_noon: DateTime<Tz>,
    pub sunset: Option<DateTime<Tz>>,
    pub daylight_hours: f64,
}

impl SolarTimes {
    pub fn localized(&self, tz: Tz) -> LocalSolarTimes {
        LocalSolarTimes {
            sunrise: self.sunrise.map(|t| t.with_timezone(&tz)),
            solar_noon: self.solar_noon.with_timezone(&tz),
            sunset: self.sunset.map(|t| t.with_timezone(&tz)),
            daylight_hours: self.daylight_hours,
        }
    }
}

/// Solar position model for a fixed site.
#[derive(Debug, Clone, Copy)]
pub struct SunCalculator {
    latitude: f64,
    longitude: f64,
}

impl SunCalculator {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn get_position(&self, datetime: &DateTime<Utc>) -> SunPosition {
        let (azimuth, altitude) = self.calculate_position(datetime);
        SunPosition {
            altitude_degrees: altitude,
            azimuth_degrees: azimuth,
            timestamp: *datetime,
        }
    }

    /// Returns `(azimuth, altitude)` in degrees.
    ///
    /// NOAA solar calculator formulation (Meeus low-precision series),
    /// geometric altitude without refraction.
    fn calculate_position(&self, datetime: &DateTime<Utc>) -> (f64, f64) {
        let julian_day = Self::julian_day(datetime);
        let t = (julian_day - J2000) / 36525.0;

        let (declination, equation_of_time) = Self::declination_and_equation_of_time(t);

        let minutes_of_day = (julian_day + 0.5).fract() * 1440.0;
        let true_solar_time = (minutes_of_day + equation_of_time + 4.0 * self.longitude)
            .rem_euclid(1440.0);
        let hour_angle = true_solar_time / 4.0 - 180.0;

        let lat_rad = self.latitude.to_radians();
        let dec_rad = declination.to_radians();
        let hour_rad = hour_angle.to_radians();

        let cos_zenith = (lat_rad.sin() * dec_rad.sin()
            + lat_rad.cos() * dec_rad.cos() * hour_rad.cos())
        .clamp(-1.0, 1.0);
        let altitude = 90.0 - cos_zenith.acos().to_degrees();

        // Clockwise from north; atan2 keeps the poles well defined.
        let azimuth = hour_rad
            .sin()
            .atan2(hour_rad.cos() * lat_rad.sin() - dec_rad.tan() * lat_rad.cos())
            .to_degrees()
            + 180.0;

        (normalize_azimuth(azimuth), altitude.clamp(-90.0, 90.0))
    }

    fn julian_day(datetime: &DateTime<Utc>) -> f64 {
        let seconds =
            datetime.timestamp() as f64 + f64::from(datetime.timestamp_subsec_nanos()) * 1e-9;
        seconds / SECONDS_PER_DAY + JULIAN_UNIX_EPOCH
    }

    /// Declination (degrees) and equation of time (minutes) at Julian century `t`.
    fn declination_and_equation_of_time(t: f64) -> (f64, f64) {
        let mean_longitude = (280.46646 + t * (36000.76983 + t * 0.0003032)).rem_euclid(360.0);
        let mean_anomaly = 357.52911 + t * (35999.05029 - 0.0001537 * t);
        let eccentricity = 0.016708634 - t * (0.000042037 + 0.0000001267 * t);

        let m = mean_anomaly.to_radians();
        let equation_of_center = m.sin() * (1.914602 - t * (0.004817 + 0.000014 * t))
            + (2.0 * m).sin() * (0.019993 - 0.000101 * t)
            + (3.0 * m).sin() * 0.000289;

        let omega = (125.04 - 1934.136 * t).to_radians();
        let apparent_longitude =
            (mean_longitude + equation_of_center - 0.00569 - 0.00478 * omega.sin()).to_radians();

        let mean_obliquity =
            23.0 + (26.0 + (21.448 - t * (46.815 + t * (0.00059 - t * 0.001813))) / 60.0) / 60.0;
        let obliquity = (mean_obliquity + 0.00256 * omega.cos()).to_radians();

        let declination = (obliquity.sin() * apparent_longitude.sin()).asin().to_degrees();

        let y = (obliquity / 2.0).tan().powi(2);
        let l0 = mean_longitude.to_radians();
        let equation_of_time = 4.0
            * (y * (2.0 * l0).sin() - 2.0 * eccentricity * m.sin()
                + 4.0 * eccentricity * y * m.sin() * (2.0 * l0).cos()
                - 0.5 * y * y * (4.0 * l0).sin()
                - 1.25 * eccentricity * eccentricity * (2.0 * m).sin())
            .to_degrees();

        (declination, equation_of_time)
    }

    pub fn solar_times(&self, date: NaiveDate) -> SolarTimes {
        let profile = self.day_profile(date);
        let daylight = profile.daylight();
        SolarTimes {
            sunrise: profile.sunrise_seconds.map(|s| offset(profile.start, s)),
            solar_noon: offset(profile.start, profile.noon_seconds),
            sunset: profile.sunset_seconds.map(|s| offset(profile.start, s)),
            noon_altitude_degrees: profile.noon_altitude,
            daylight_hours: daylight
                .map(|(rise, set)| (set - rise).num_milliseconds() as f64 / MILLIS_PER_HOUR)
                .unwrap_or(0.0),
        }
    }

    pub(crate) fn day_profile(&self, date: NaiveDate) -> DayProfile {
        let (start, end) = solar_day_window(self.longitude, date);
        let altitude_at = |seconds: f64| self.get_position(&offset(start, seconds)).altitude_degrees;

        let span = (end - start).num_seconds();
        let samples: Vec<(f64, f64)> = (0..=span / COARSE_SCAN_SECONDS)
            .map(|i| {
                let s = (i * COARSE_SCAN_SECONDS) as f64;
                (s, altitude_at(s))
            })
            .collect();

        let (peak_idx, _) = samples
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, &(_, alt))| {
                if alt > best.1 {
                    (i, alt)
                } else {
                    best
                }
            });
        let lo = samples[peak_idx.saturating_sub(1)].0;
        let hi = samples[(peak_idx + 1).min(samples.len() - 1)].0;
        let noon_seconds = golden_section_max(&altitude_at, lo, hi);

        let sunrise_seconds = samples[..=peak_idx]
            .windows(2)
            .find(|w| w[0].1 <= 0.0 && w[1].1 > 0.0)
            .map(|w| bisect_horizon(&altitude_at, w[0].0, w[1].0));
        let sunset_seconds = samples[peak_idx..]
            .windows(2)
            .rev()
            .find(|w| w[0].1 > 0.0 && w[1].1 <= 0.0)
            .map(|w| bisect_horizon(&altitude_at, w[0].0, w[1].0));

        DayProfile {
            start,
            end,
            noon_seconds,
            noon_altitude: altitude_at(noon_seconds),
            sunrise_seconds,
            sunset_seconds,
        }
    }
}

/// Horizon crossings of one solar day, in seconds from the window start.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DayProfile {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    noon_seconds: f64,
    noon_altitude: f64,
    sunrise_seconds: Option<f64>,
    sunset_seconds: Option<f64>,
}

impl DayProfile {
    /// Daylight span as millisecond instants; `None` when the sun never rises.
    ///
    /// A missing sunrise or sunset is clipped to the window edge.
    pub(crate) fn daylight(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        if self.noon_altitude <= 0.0 {
            return None;
        }
        let rise = self
            .sunrise_seconds
            .map_or(self.start, |s| offset(self.start, s));
        let set = self.sunset_seconds.map_or(self.end, |s| offset(self.start, s));
        Some((rise, set))
    }
}

/// Computes the sun's altitude and azimuth at `instant` for a site.
pub fn compute_sun_position(latitude: f64, longitude: f64, instant: DateTime<Utc>) -> SunPosition {
    SunCalculator::new(latitude, longitude).get_position(&instant)
}

pub fn solar_times(latitude: f64, longitude: f64, date: NaiveDate) -> SolarTimes {
    SunCalculator::new(latitude, longitude).solar_times(date)
}

/// The 24 hour window centred on the approximate solar noon of `date`.
pub(crate) fn solar_day_window(longitude: f64, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN));
    let noon_offset_seconds = (12.0 - longitude / 15.0) * 3600.0;
    let center = offset(midnight, noon_offset_seconds);
    (center - Duration::hours(12), center + Duration::hours(12))
}

pub(crate) fn normalize_azimuth(azimuth: f64) -> f64 {
    let az = azimuth.rem_euclid(360.0);
    if az >= 360.0 {
        0.0
    } else {
        az
    }
}

fn offset(start: DateTime<Utc>, seconds: f64) -> DateTime<Utc> {
    start + Duration::milliseconds((seconds * 1000.0).round() as i64)
}

fn bisect_horizon(altitude_at: &impl Fn(f64) -> f64, mut below: f64, mut above: f64) -> f64 {
    // `below` and `above` bracket the zero crossing in either order of time.
    if altitude_at(below) > 0.0 {
        std::mem::swap(&mut below, &mut above);
    }
    while (above - below).abs() > BISECTION_TOLERANCE_SECONDS {
        let mid = 0.5 * (below + above);
        if altitude_at(mid) > 0.0 {
            above = mid;
        } else {
            below = mid;
        }
    }
    0.5 * (below + above)
}

fn golden_section_max(f: &impl Fn(f64) -> f64, mut a: f64, mut b: f64) -> f64 {
    let inv_phi = (5f64.sqrt() - 1.0) / 2.0;
    let mut c = b - inv_phi * (b - a);
    let mut d = a + inv_phi * (b - a);
    while (b - a).abs() > BISECTION_TOLERANCE_SECONDS {
        if f(c) > f(d) {
            b = d;
        } else {
            a = c;
        }
        c = b - inv_phi * (b - a);
        d = a + inv_phi * (b - a);
    }
    0.5 * (a + b)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NYC: (f64, f64) = (40.7128, -74.0060);

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_summer_solstice_noon_new_york() {
        let times = solar_times(NYC.0, NYC.1, date(2024, 6, 20));
        let pos = compute_sun_position(NYC.0, NYC.1, times.solar_noon);
        // 90 - 40.71 + 23.44
        assert!((pos.altitude_degrees - 72.73).abs() < 0.3, "{}", pos.altitude_degrees);
        assert!((pos.azimuth_degrees - 180.0).abs() < 1.0, "{}", pos.azimuth_degrees);
    }

    #[test]
    fn test_winter_solstice_noon_new_york() {
        let times = solar_times(NYC.0, NYC.1, date(2024, 12, 21));
        assert!((times.noon_altitude_degrees - 25.85).abs() < 0.3);
    }

    #[test]
    fn test_equinox_equator_sun_near_zenith() {
        let times = solar_times(0.0, 0.0, date(2024, 3, 20));
        assert!(times.noon_altitude_degrees > 89.0);
        // Equation of time in late March is about -7.5 minutes.
        let noon = times.solar_noon;
        let expected = Utc.with_ymd_and_hms(2024, 3, 20, 12, 7, 30).unwrap();
        assert!((noon - expected).num_seconds().abs() < 120);
        assert!((times.daylight_hours - 12.0).abs() < 0.1);
    }

    #[test]
    fn test_denver_morning_azimuth_is_east() {
        let at = Utc.with_ymd_and_hms(2024, 6, 21, 14, 0, 0).unwrap();
        let pos = compute_sun_position(39.7392, -104.9903, at);
        assert!(pos.altitude_degrees > 0.0);
        assert!(pos.azimuth_degrees > 45.0 && pos.azimuth_degrees < 135.0);
    }

    #[test]
    fn test_night_altitude_negative_without_error() {
        let at = Utc.with_ymd_and_hms(2024, 6, 21, 4, 0, 0).unwrap();
        let pos = compute_sun_position(NYC.0, NYC.1, at);
        assert!(pos.altitude_degrees < 0.0);
        assert!(!pos.is_above_horizon());
    }

    #[test]
    fn test_summer_has_more_daylight_than_winter() {
        let summer = solar_times(NYC.0, NYC.1, date(2024, 6, 21));
        let winter = solar_times(NYC.0, NYC.1, date(2024, 12, 21));
        assert!(summer.daylight_hours > winter.daylight_hours);
        // Geometric horizon, no refraction: 2 * acos(-tan(lat) * tan(dec)) / 15.
        assert!((summer.daylight_hours - 14.92).abs() < 0.15);
        assert!((winter.daylight_hours - 9.08).abs() < 0.15);
        assert!(summer.sunrise.unwrap() < summer.solar_noon);
        assert!(summer.solar_noon < summer.sunset.unwrap());
    }

    #[test]
    fn test_polar_night_and_polar_day() {
        let night = solar_times(89.0, 0.0, date(2024, 12, 21));
        assert_eq!(night.daylight_hours, 0.0);
        assert!(night.sunrise.is_none() && night.sunset.is_none());

        let day = solar_times(89.0, 0.0, date(2024, 6, 21));
        assert!((day.daylight_hours - 24.0).abs() < 1e-9);
        assert!(day.noon_altitude_degrees > 0.0);
    }

    #[test]
    fn test_position_ranges_over_a_day_at_the_pole() {
        let start = Utc.with_ymd_and_hms(2024, 6, 21, 0, 0, 0).unwrap();
        for hour in 0..24 {
            let pos = compute_sun_position(90.0, 0.0, start + Duration::hours(hour));
            assert!((0.0..360.0).contains(&pos.azimuth_degrees));
            assert!((-90.0..=90.0).contains(&pos.altitude_degrees));
        }
    }

    #[test]
    fn test_localized_times_keep_instants() {
        let times = solar_times(NYC.0, NYC.1, date(2024, 6, 21));
        let local = times.localized(chrono_tz::America::New_York);
        assert_eq!(local.solar_noon.with_timezone(&Utc), times.solar_noon);
        // EDT noon lands just before 13:00 local.
        assert_eq!(chrono::Timelike::hour(&local.solar_noon), 12);
    }
}
