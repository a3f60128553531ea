//! End-to-end shadow studies for a Manhattan site.

use chrono::NaiveDate;
use geo_types::polygon;
use site_shadow::sun_path::preset_date_in_year;
use site_shadow::*;

const LAT: f64 = 40.7128;
const LNG: f64 = -74.0060;
const TOWER_HEIGHT: f64 = 30.0;

fn tower_site(width: f64, depth: f64) -> HeightGrid {
    let tower = BuildingMass::new(
        polygon![(x: 45.0, y: 45.0), (x: 55.0, y: 45.0), (x: 55.0, y: 55.0), (x: 45.0, y: 55.0)],
        0.0,
        TOWER_HEIGHT,
    )
    .unwrap();
    build_grid(
        &TerrainSurface::Flat { elevation: 0.0 },
        &[tower],
        BoundingRect::new(0.0, width, 0.0, depth),
        1.0,
    )
    .unwrap()
}

fn noon_sun(date: NaiveDate) -> SunPosition {
    let times = get_solar_times(LAT, LNG, date);
    get_sun_position(LAT, LNG, times.solar_noon)
}

/// Shaded cells running north from the tower's north face along column 50.
fn north_shadow_length(result: &ShadowAnalysisResult) -> usize {
    (55..result.grid_height)
        .take_while(|&y| result.cell(50, y).unwrap().is_shaded)
        .count()
}

#[test]
fn summer_solstice_noon_shadow() {
    let date = preset_date_in_year(DatePreset::Summer, 2024);
    let sun = noon_sun(date);
    assert!((sun.altitude_degrees - 72.0).abs() < 1.5, "{}", sun.altitude_degrees);

    let grid = tower_site(100.0, 100.0);
    let result = compute_instant_shadows(&sun, &grid).unwrap();

    let expected = TOWER_HEIGHT / sun.altitude_degrees.to_radians().tan();
    assert!((expected - 9.7).abs() < 0.6);
    let length = north_shadow_length(&result) as f64;
    assert!((length - expected).abs() <= 1.0, "{} vs {}", length, expected);

    // Shadow covers roughly footprint width x shadow length.
    let shaded = result.stats.shaded_cells as f64;
    assert!((shaded - 10.0 * expected).abs() <= 15.0, "{}", shaded);
    let pct = result.percent_shaded.unwrap();
    assert_eq!(pct, shaded / 10_000.0 * 100.0);
    assert!(pct > 0.5 && pct < 1.5);
}

#[test]
fn winter_solstice_noon_shadow_is_longer() {
    let summer = noon_sun(preset_date_in_year(DatePreset::Summer, 2024));
    let winter = noon_sun(preset_date_in_year(DatePreset::Winter, 2024));
    assert!((winter.altitude_degrees - 26.0).abs() < 1.0, "{}", winter.altitude_degrees);

    // On the 100m site the winter shadow runs off the northern edge.
    let site = tower_site(100.0, 100.0);
    let summer_result = compute_instant_shadows(&summer, &site).unwrap();
    let winter_result = compute_instant_shadows(&winter, &site).unwrap();
    assert_eq!(north_shadow_length(&winter_result), 45);
    assert!(north_shadow_length(&winter_result) > north_shadow_length(&summer_result));
    assert!(winter_result.percent_shaded > summer_result.percent_shaded);

    // A deeper site shows the full length, about 61.5m.
    let deep = tower_site(100.0, 160.0);
    let result = compute_instant_shadows(&winter, &deep).unwrap();
    let expected = TOWER_HEIGHT / winter.altitude_degrees.to_radians().tan();
    assert!((expected - 61.5).abs() < 3.0);
    let length = north_shadow_length(&result) as f64;
    assert!((length - expected).abs() <= 1.0, "{} vs {}", length, expected);
}

#[test]
fn night_is_fully_shaded_and_flat_day_is_lit() {
    let date = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
    let times = get_solar_times(LAT, LNG, date);
    let midnight = times.solar_noon + chrono::Duration::hours(12);
    let night = get_sun_position(LAT, LNG, midnight);
    assert!(night.altitude_degrees < 0.0);

    let site = tower_site(100.0, 100.0);
    assert_eq!(compute_instant_shadows(&night, &site).unwrap().percent_shaded, Some(100.0));

    let flat = build_grid(
        &TerrainSurface::Flat { elevation: 12.0 },
        &[],
        BoundingRect::new(0.0, 100.0, 0.0, 100.0),
        2.0,
    )
    .unwrap();
    for sun in get_sun_path(LAT, LNG, date, 60.0).unwrap().iter() {
        let result = compute_instant_shadows(&sun, &flat).unwrap();
        assert_eq!(result.percent_shaded, Some(0.0));
    }
}

#[test]
fn daily_sun_hours_within_daylight() {
    let date = preset_date_in_year(DatePreset::SpringEquinox, 2024);
    let path = get_sun_path(LAT, LNG, date, 15.0).unwrap();
    let site = tower_site(100.0, 100.0);

    let result = compute_sun_hours(&path, &site, 15.0, |_, _| {}).unwrap();
    let daylight = get_solar_times(LAT, LNG, date).daylight_hours;
    let sampled = path.sampled_daylight_hours();
    assert!(sampled <= daylight && daylight - sampled <= 0.25);

    for cell in &result.cells {
        let hours = cell.sun_hours.unwrap();
        assert!(hours >= 0.0 && hours <= daylight);
    }
    // The roof sees the whole day; the cell hugging the north face loses most of it.
    assert_eq!(result.cell(50, 50).unwrap().sun_hours, Some(sampled));
    assert!(result.cell(50, 55).unwrap().sun_hours.unwrap() < daylight / 2.0);

    let again = compute_sun_hours(&path, &site, 15.0, |_, _| {}).unwrap();
    assert_eq!(result, again);
}

#[test]
fn polar_night_refuses_to_run() {
    let date = NaiveDate::from_ymd_opt(2024, 12, 21).unwrap();
    let path = get_sun_path(89.0, 0.0, date, 15.0).unwrap();
    assert!(path.is_empty());
    assert_eq!(path.daylight_hours(), 0.0);

    let site = tower_site(100.0, 100.0);
    let result = compute_sun_hours(&path, &site, 15.0, |_, _| {});
    assert!(matches!(result, Err(ShadowError::NoDaylight(_))));
}

#[test]
fn summer_has_more_daylight_than_winter() {
    let summer = get_solar_times(LAT, LNG, preset_date_in_year(DatePreset::Summer, 2024));
    let winter = get_solar_times(LAT, LNG, preset_date_in_year(DatePreset::Winter, 2024));
    assert!(summer.daylight_hours > winter.daylight_hours);
}

#[test]
fn validation_report_for_study() {
    let site = tower_site(100.0, 100.0);
    let sun = noon_sun(preset_date_in_year(DatePreset::Summer, 2024));
    let result = compute_instant_shadows(&sun, &site).unwrap();

    let report = validate_result(
        &result,
        &DemMetadata {
            nominal_resolution_m: 10.0,
            vertical_error_m: 2.0,
        },
    );
    assert_eq!(report.assessment.quality_grade, QualityGrade::Good);
    assert_eq!(report.overall_score, 100.0);
    assert!(report.warnings.is_empty());
}
