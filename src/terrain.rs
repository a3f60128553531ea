use crate::types::{BoundingRect, Result, ShadowError};
use geo::{Area, BoundingRect as _, Contains};
use geo_types::{Coord, Geometry, LineString, Point, Polygon};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Continuous terrain surface supplied by the terrain loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerrainSurface {
    Flat {
        elevation: f64,
    },
    /// Regular DEM; sample `[row, col]` sits at
    /// `(origin_x + col * spacing, origin_y + row * spacing)`.
    Raster {
        origin_x: f64,
        origin_y: f64,
        spacing: f64,
        heights: Array2<f64>,
    },
    /// Scattered `[x, y, z]` samples.
    Points { samples: Vec<[f64; 3]> },
    /// Triangulated surface, each triangle as three `[x, y, z]` vertices.
    Mesh { triangles: Vec<[[f64; 3]; 3]> },
}

impl TerrainSurface {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(ShadowError::InvalidGeometry(msg.to_string()));
        match self {
            TerrainSurface::Flat { elevation } => {
                if !elevation.is_finite() {
                    return invalid("flat terrain elevation is not finite");
                }
            }
            TerrainSurface::Raster {
                origin_x,
                origin_y,
                spacing,
                heights,
            } => {
                if heights.is_empty() {
                    return invalid("terrain raster has no samples");
                }
                if !(spacing.is_finite() && *spacing > 0.0) {
                    return invalid("terrain raster spacing must be positive");
                }
                if !origin_x.is_finite()
                    || !origin_y.is_finite()
                    || heights.iter().any(|h| !h.is_finite())
                {
                    return invalid("terrain raster contains non-finite values");
                }
            }
            TerrainSurface::Points { samples } => {
                if samples.is_empty() {
                    return invalid("terrain has no elevation samples");
                }
                if samples.iter().flatten().any(|v| !v.is_finite()) {
                    return invalid("terrain samples contain non-finite values");
                }
            }
            TerrainSurface::Mesh { triangles } => {
                if triangles.is_empty() {
                    return invalid("terrain mesh has no triangles");
                }
                if triangles.iter().flatten().flatten().any(|v| !v.is_finite()) {
                    return invalid("terrain mesh contains non-finite vertices");
                }
                if triangles.iter().all(|t| barycentric_denominator(t).abs() < f64::EPSILON) {
                    return invalid("terrain mesh triangles are all degenerate");
                }
            }
        }
        Ok(())
    }

    /// Surface elevation at planar point `(x, y)`.
    pub fn elevation_at(&self, x: f64, y: f64) -> f64 {
        match self {
            TerrainSurface::Flat { elevation } => *elevation,
            TerrainSurface::Raster {
                origin_x,
                origin_y,
                spacing,
                heights,
            } => interpolate_height(heights, (y - origin_y) / spacing, (x - origin_x) / spacing),
            TerrainSurface::Points { samples } => inverse_distance(samples, x, y),
            TerrainSurface::Mesh { triangles } => mesh_elevation(triangles, x, y),
        }
    }
}

fn interpolate_height(heights: &Array2<f64>, row: f64, col: f64) -> f64 {
    let (n_rows, n_cols) = heights.dim();
    let row = row.clamp(0.0, (n_rows - 1) as f64);
    let col = col.clamp(0.0, (n_cols - 1) as f64);

    let r0 = row.floor() as usize;
    let c0 = col.floor() as usize;
    let r1 = (r0 + 1).min(n_rows - 1);
    let c1 = (c0 + 1).min(n_cols - 1);

    let fx = col - c0 as f64;
    let fy = row - r0 as f64;

    let h00 = heights[[r0, c0]];
    let h01 = heights[[r0, c1]];
    let h10 = heights[[r1, c0]];
    let h11 = heights[[r1, c1]];

    let h0 = h00 * (1.0 - fx) + h01 * fx;
    let h1 = h10 * (1.0 - fx) + h11 * fx;

    h0 * (1.0 - fy) + h1 * fy
}

fn inverse_distance(samples: &[[f64; 3]], x: f64, y: f64) -> f64 {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for &[sx, sy, sz] in samples {
        let d2 = (sx - x).powi(2) + (sy - y).powi(2);
        if d2 < 1e-12 {
            return sz;
        }
        let w = 1.0 / d2;
        weighted += w * sz;
        total_weight += w;
    }
    weighted / total_weight
}

fn barycentric_denominator(t: &[[f64; 3]; 3]) -> f64 {
    (t[1][1] - t[2][1]) * (t[0][0] - t[2][0]) + (t[2][0] - t[1][0]) * (t[0][1] - t[2][1])
}

fn mesh_elevation(triangles: &[[[f64; 3]; 3]], x: f64, y: f64) -> f64 {
    const EDGE_TOLERANCE: f64 = -1e-9;
    for t in triangles {
        let denom = barycentric_denominator(t);
        if denom.abs() < f64::EPSILON {
            continue;
        }
        let a = ((t[1][1] - t[2][1]) * (x - t[2][0]) + (t[2][0] - t[1][0]) * (y - t[2][1])) / denom;
        let b = ((t[2][1] - t[0][1]) * (x - t[2][0]) + (t[0][0] - t[2][0]) * (y - t[2][1])) / denom;
        let c = 1.0 - a - b;
        if a >= EDGE_TOLERANCE && b >= EDGE_TOLERANCE && c >= EDGE_TOLERANCE {
            return a * t[0][2] + b * t[1][2] + c * t[2][2];
        }
    }
    // Outside the mesh: nearest vertex.
    triangles
        .iter()
        .flatten()
        .map(|v| ((v[0] - x).powi(2) + (v[1] - y).powi(2), v[2]))
        .fold((f64::INFINITY, 0.0), |best, cur| if cur.0 < best.0 { cur } else { best })
        .1
}

/// Building massing used as an obstruction.
///
/// Heights are absolute surface elevations in the terrain's datum, not
/// heights above ground: `base_height` is where the walls meet the ground and
/// `top_height` is the roof elevation written into the grid. A roof below the
/// local terrain leaves the cell unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingMass {
    pub footprint: Polygon<f64>,
    pub base_height: f64,
    pub top_height: f64,
}

impl BuildingMass {
    pub fn new(footprint: Polygon<f64>, base_height: f64, top_height: f64) -> Result<Self> {
        let building = Self {
            footprint,
            base_height,
            top_height,
        };
        building.validate()?;
        Ok(building)
    }

    pub fn from_ring(ring: &[[f64; 2]], base_height: f64, top_height: f64) -> Result<Self> {
        let coords: Vec<(f64, f64)> = ring.iter().map(|p| (p[0], p[1])).collect();
        Self::new(
            Polygon::new(LineString::from(coords), vec![]),
            base_height,
            top_height,
        )
    }

    /// One building per polygon part; point and line geometries are rejected.
    pub fn from_geometry(geometry: Geometry<f64>, base_height: f64, top_height: f64) -> Result<Vec<Self>> {
        match geometry {
            Geometry::Polygon(polygon) => Ok(vec![Self::new(polygon, base_height, top_height)?]),
            Geometry::MultiPolygon(parts) => parts
                .into_iter()
                .map(|p| Self::new(p, base_height, top_height))
                .collect(),
            Geometry::Rect(rect) => Ok(vec![Self::new(rect.to_polygon(), base_height, top_height)?]),
            other => Err(ShadowError::InvalidGeometry(format!(
                "building footprint must be a polygon, got {}",
                geometry_kind(&other)
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ring = self.footprint.exterior();
        if ring.coords().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
            return Err(ShadowError::InvalidGeometry(
                "building footprint has non-finite coordinates".to_string(),
            ));
        }
        let mut distinct: Vec<Coord<f64>> = ring.coords().copied().collect();
        distinct.dedup();
        if distinct.len() > 1 && distinct.first() == distinct.last() {
            distinct.pop();
        }
        if distinct.len() < 3 || self.footprint.unsigned_area() <= 0.0 {
            return Err(ShadowError::InvalidGeometry(
                "building footprint is degenerate".to_string(),
            ));
        }
        if !self.base_height.is_finite()
            || !self.top_height.is_finite()
            || self.top_height < self.base_height
        {
            return Err(ShadowError::InvalidGeometry(format!(
                "building heights invalid (base {}, top {})",
                self.base_height, self.top_height
            )));
        }
        Ok(())
    }
}

fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Upper bound on grid cardinality.
pub const MAX_GRID_CELLS: usize = 1 << 28;

/// Surface heights over a site, read-only once built.
#[derive(Debug, Clone)]
pub struct HeightGrid {
    bounds: BoundingRect,
    cell_size: f64,
    heights: Array2<f64>,
    max_height: f64,
    building_count: usize,
}

impl HeightGrid {
    /// Wraps precomputed heights, shape `(rows, columns)` with row 0 at `min_y`.
    pub fn from_heights(bounds: BoundingRect, cell_size: f64, heights: Array2<f64>) -> Result<Self> {
        let (rows, columns) = grid_dimensions(&bounds, cell_size)?;
        if heights.dim() != (rows, columns) {
            return Err(ShadowError::InvalidGeometry(format!(
                "height array is {:?}, bounds require ({}, {})",
                heights.dim(),
                rows,
                columns
            )));
        }
        if heights.iter().any(|h| !h.is_finite()) {
            return Err(ShadowError::InvalidGeometry(
                "height grid contains non-finite values".to_string(),
            ));
        }
        Ok(Self::assemble(bounds, cell_size, heights, 0))
    }

    fn assemble(bounds: BoundingRect, cell_size: f64, heights: Array2<f64>, building_count: usize) -> Self {
        let max_height = heights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self {
            bounds,
            cell_size,
            heights,
            max_height,
            building_count,
        }
    }

    pub fn bounds(&self) -> &BoundingRect {
        &self.bounds
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn rows(&self) -> usize {
        self.heights.nrows()
    }

    pub fn columns(&self) -> usize {
        self.heights.ncols()
    }

    pub fn cell_count(&self) -> usize {
        self.heights.len()
    }

    pub fn max_height(&self) -> f64 {
        self.max_height
    }

    pub fn building_count(&self) -> usize {
        self.building_count
    }

    pub fn heights(&self) -> ArrayView2<'_, f64> {
        self.heights.view()
    }

    pub fn height(&self, col: usize, row: usize) -> f64 {
        self.heights[[row, col]]
    }

    /// Planar center of cell `(col, row)`.
    pub fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.bounds.min_x + (col as f64 + 0.5) * self.cell_size,
            self.bounds.min_y + (row as f64 + 0.5) * self.cell_size,
        )
    }
}

fn grid_dimensions(bounds: &BoundingRect, cell_size: f64) -> Result<(usize, usize)> {
    bounds.validate()?;
    if !cell_size.is_finite() || cell_size <= 0.0 {
        return Err(ShadowError::InvalidGeometry(format!(
            "cell size must be positive, got {}",
            cell_size
        )));
    }
    let too_large = || {
        ShadowError::InvalidGeometry(format!(
            "grid too large: {} x {} m at {} m cells exceeds {} cells",
            bounds.width(),
            bounds.height(),
            cell_size,
            MAX_GRID_CELLS
        ))
    };
    let columns = (bounds.width() / cell_size).ceil();
    let rows = (bounds.height() / cell_size).ceil();
    if !columns.is_finite() || !rows.is_finite() || columns * rows > MAX_GRID_CELLS as f64 {
        return Err(too_large());
    }
    let (rows, columns) = (rows as usize, columns as usize);
    match rows.checked_mul(columns) {
        Some(cells) if cells <= MAX_GRID_CELLS => Ok((rows, columns)),
        _ => Err(too_large()),
    }
}

/// Rasterizes terrain and building tops into a height grid.
pub fn build_grid(
    terrain: &TerrainSurface,
    buildings: &[BuildingMass],
    bounds: BoundingRect,
    cell_size: f64,
) -> Result<HeightGrid> {
    let (rows, columns) = grid_dimensions(&bounds, cell_size)?;
    terrain.validate()?;
    for building in buildings {
        building.validate()?;
    }

    let mut heights = Array2::<f64>::from_shape_fn((rows, columns), |(row, col)| {
        let x = bounds.min_x + (col as f64 + 0.5) * cell_size;
        let y = bounds.min_y + (row as f64 + 0.5) * cell_size;
        terrain.elevation_at(x, y)
    });

    let mut raised_cells = 0usize;
    for building in buildings {
        let Some(rect) = building.footprint.bounding_rect() else {
            continue;
        };
        let col_range = cell_range(rect.min().x, rect.max().x, bounds.min_x, cell_size, columns);
        let row_range = cell_range(rect.min().y, rect.max().y, bounds.min_y, cell_size, rows);
        for row in row_range {
            for col in col_range.clone() {
                let x = bounds.min_x + (col as f64 + 0.5) * cell_size;
                let y = bounds.min_y + (row as f64 + 0.5) * cell_size;
                if building.footprint.contains(&Point::new(x, y)) {
                    let cell = &mut heights[[row, col]];
                    if building.top_height > *cell {
                        *cell = building.top_height;
                        raised_cells += 1;
                    }
                }
            }
        }
    }

    debug!(
        rows,
        columns,
        cell_size,
        buildings = buildings.len(),
        raised_cells,
        "built height grid"
    );

    Ok(HeightGrid::assemble(bounds, cell_size, heights, buildings.len()))
}

fn cell_range(lo: f64, hi: f64, origin: f64, cell_size: f64, count: usize) -> std::ops::Range<usize> {
    let first = ((lo - origin) / cell_size - 0.5).floor().max(0.0) as usize;
    let last = (((hi - origin) / cell_size - 0.5).ceil() + 1.0).max(0.0) as usize;
    first.min(count)..last.min(count)
}
