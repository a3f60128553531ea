use crate::terrain::HeightGrid;
use crate::types::*;
use rayon::prelude::*;
use tracing::debug;

/// Per-cell direct-sun visibility against a height grid.
pub struct ShadowCaster<'g> {
    grid: &'g HeightGrid,
    max_distance: f64,
}

impl<'g> ShadowCaster<'g> {
    pub fn new(grid: &'g HeightGrid) -> Result<Self> {
        if grid.cell_count() == 0 {
            return Err(ShadowError::InvalidGeometry(
                "height grid has no cells".to_string(),
            ));
        }
        let width = grid.columns() as f64 * grid.cell_size();
        let height = grid.rows() as f64 * grid.cell_size();
        Ok(Self {
            grid,
            max_distance: width.hypot(height),
        })
    }

    pub fn grid(&self) -> &HeightGrid {
        self.grid
    }

    /// Shaded flags in row-major order.
    pub fn shadow_mask(&self, sun: &SunPosition) -> Vec<bool> {
        let (n_rows, n_cols) = (self.grid.rows(), self.grid.columns());
        if sun.altitude_degrees <= 0.0 {
            return vec![true; n_rows * n_cols];
        }

        let sun_dir = self.sun_direction(sun.azimuth_degrees);
        let tan_altitude = sun.altitude_degrees.to_radians().tan();

        (0..n_rows * n_cols)
            .into_par_iter()
            .map(|idx| self.calculate_cell_shadow(idx / n_cols, idx % n_cols, sun_dir, tan_altitude))
            .collect()
    }

    pub fn cast_shadows(&self, sun: &SunPosition) -> Vec<ShadowCell> {
        let n_cols = self.grid.columns();
        self.shadow_mask(sun)
            .into_iter()
            .enumerate()
            .map(|(idx, is_shaded)| ShadowCell {
                x: idx % n_cols,
                y: idx / n_cols,
                is_shaded,
                sun_hours: None,
            })
            .collect()
    }

    fn calculate_cell_shadow(&self, row: usize, col: usize, sun_dir: (f64, f64), tan_altitude: f64) -> bool {
        let cell_height = self.grid.height(col, row);
        let rise = self.grid.max_height() - cell_height;
        if rise <= 0.0 {
            return false;
        }

        let cell_size = self.grid.cell_size();
        let (dx, dy) = sun_dir;
        let (n_rows, n_cols) = (self.grid.rows() as f64, self.grid.columns() as f64);

        // Nothing beyond this distance can rise above the sun line.
        let max_distance = (rise / tan_altitude).min(self.max_distance);
        let origin_x = col as f64 + 0.5;
        let origin_y = row as f64 + 0.5;

        let mut step = 1usize;
        loop {
            let distance = step as f64 * cell_size;
            if distance > max_distance + cell_size {
                return false;
            }
            let x = origin_x + dx * step as f64;
            let y = origin_y + dy * step as f64;
            if x < 0.0 || y < 0.0 || x >= n_cols || y >= n_rows {
                return false;
            }

            let obstruction = self.grid.height(x as usize, y as usize);
            // Clearance angle exceeds altitude <=> rise over distance exceeds tan(altitude).
            if obstruction - cell_height > distance * tan_altitude {
                return true;
            }
            step += 1;
        }
    }

    /// Unit vector toward the sun in (column, row) space; rows grow northward.
    fn sun_direction(&self, azimuth: f64) -> (f64, f64) {
        let az_rad = azimuth.to_radians();
        (az_rad.sin(), az_rad.cos())
    }
}

/// Instant shading of every cell for one sun position.
pub fn cast_shadows(sun: &SunPosition, grid: &HeightGrid) -> Result<Vec<ShadowCell>> {
    Ok(ShadowCaster::new(grid)?.cast_shadows(sun))
}

pub fn compute_instant_shadows(sun: &SunPosition, grid: &HeightGrid) -> Result<ShadowAnalysisResult> {
    let cells = cast_shadows(sun, grid)?;
    let total_cells = cells.len();
    let shaded_cells = cells.iter().filter(|c| c.is_shaded).count();
    let percent_shaded = shaded_cells as f64 / total_cells as f64 * 100.0;

    debug!(
        altitude = sun.altitude_degrees,
        azimuth = sun.azimuth_degrees,
        shaded_cells,
        total_cells,
        "instant shadows cast"
    );

    Ok(ShadowAnalysisResult {
        mode: AnalysisMode::Instant,
        cells,
        cell_size: grid.cell_size(),
        grid_width: grid.columns(),
        grid_height: grid.rows(),
        percent_shaded: Some(percent_shaded),
        building_count: grid.building_count(),
        stats: AnalysisStats {
            total_cells,
            shaded_cells,
            lit_cells: total_cells - shaded_cells,
            daily: None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::{build_grid, BuildingMass, TerrainSurface};
    use chrono::{TimeZone, Utc};
    use geo_types::polygon;
    use ndarray::Array2;

    fn sun(altitude: f64, azimuth: f64) -> SunPosition {
        SunPosition {
            altitude_degrees: altitude,
            azimuth_degrees: azimuth,
            timestamp: Utc.with_ymd_and_hms(2024, 6, 21, 12, 0, 0).unwrap(),
        }
    }

    fn tower_grid(size: f64, x0: f64, y0: f64, side: f64, height: f64) -> HeightGrid {
        let building = BuildingMass::new(
            polygon![
                (x: x0, y: y0),
                (x: x0 + side, y: y0),
                (x: x0 + side, y: y0 + side),
                (x: x0, y: y0 + side),
            ],
            0.0,
            height,
        )
        .unwrap();
        build_grid(
            &TerrainSurface::Flat { elevation: 0.0 },
            &[building],
            BoundingRect::new(0.0, size, 0.0, size),
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn test_sun_below_horizon_all_shaded() {
        let grid = tower_grid(20.0, 8.0, 8.0, 4.0, 10.0);
        for altitude in [0.0, -5.0, -90.0] {
            let result = compute_instant_shadows(&sun(altitude, 180.0), &grid).unwrap();
            assert_eq!(result.percent_shaded, Some(100.0));
        }
    }

    #[test]
    fn test_flat_grid_never_shaded() {
        let grid = build_grid(
            &TerrainSurface::Flat { elevation: 42.0 },
            &[],
            BoundingRect::new(0.0, 30.0, 0.0, 30.0),
            2.0,
        )
        .unwrap();
        for (altitude, azimuth) in [(0.5, 90.0), (10.0, 200.0), (89.0, 0.0)] {
            let result = compute_instant_shadows(&sun(altitude, azimuth), &grid).unwrap();
            assert_eq!(result.percent_shaded, Some(0.0));
        }
    }

    #[test]
    fn test_shadow_falls_opposite_the_sun() {
        // Sun due south at 45 degrees: a 10m tower shades 10m to its north.
        let grid = tower_grid(40.0, 18.0, 10.0, 4.0, 10.0);
        let cells = cast_shadows(&sun(45.0, 180.0), &grid).unwrap();
        let at = |x: usize, y: usize| cells[y * grid.columns() + x].is_shaded;
        // Tower occupies rows 10..14; north face at y = 14.
        assert!(at(20, 14));
        assert!(at(20, 22));
        assert!(!at(20, 25));
        // South of the tower is lit, and so is the roof.
        assert!(!at(20, 8));
        assert!(!at(20, 12));
    }

    #[test]
    fn test_shadow_length_matches_tangent() {
        let height = 20.0;
        let altitude: f64 = 30.0;
        let grid = tower_grid(100.0, 45.0, 10.0, 10.0, height);
        let cells = cast_shadows(&sun(altitude, 180.0), &grid).unwrap();
        let expected = height / altitude.to_radians().tan();
        let shadow_rows = (20..grid.rows())
            .filter(|&y| cells[y * grid.columns() + 50].is_shaded)
            .count() as f64;
        assert!((shadow_rows - expected).abs() <= 1.0, "{} vs {}", shadow_rows, expected);
    }

    #[test]
    fn test_east_sun_shades_west() {
        let grid = tower_grid(30.0, 14.0, 14.0, 2.0, 6.0);
        let cells = cast_shadows(&sun(45.0, 90.0), &grid).unwrap();
        let at = |x: usize, y: usize| cells[y * grid.columns() + x].is_shaded;
        assert!(at(12, 15));
        assert!(!at(18, 15));
    }

    #[test]
    fn test_deterministic_results() {
        let grid = tower_grid(50.0, 20.0, 20.0, 6.0, 15.0);
        let s = sun(23.7, 211.3);
        let a = compute_instant_shadows(&s, &grid).unwrap();
        let b = compute_instant_shadows(&s, &grid).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_cell_grid_is_lit() {
        let grid = HeightGrid::from_heights(
            BoundingRect::new(0.0, 1.0, 0.0, 1.0),
            1.0,
            Array2::from_elem((1, 1), 7.0),
        )
        .unwrap();
        let result = compute_instant_shadows(&sun(5.0, 10.0), &grid).unwrap();
        assert_eq!(result.stats.lit_cells, 1);
        assert_eq!(result.percent_shaded, Some(0.0));
    }
}
