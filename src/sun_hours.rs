use crate::shadow_engine::ShadowCaster;
use crate::sun_path::{DaylightSample, SunPath};
use crate::sun_position::MILLIS_PER_HOUR;
use crate::terrain::HeightGrid;
use crate::types::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

const STEP_TOLERANCE_MINUTES: f64 = 1e-9;

/// Cooperative cancellation flag, checked between sun-path steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Accumulates direct-sun hours per cell across a sampled sun path.
pub struct SunHoursAggregator<'g> {
    caster: ShadowCaster<'g>,
    step_minutes: f64,
    cancel: Option<CancelToken>,
}

impl<'g> SunHoursAggregator<'g> {
    pub fn new(grid: &'g HeightGrid, step_minutes: f64) -> Result<Self> {
        if !step_minutes.is_finite() || step_minutes <= 0.0 {
            return Err(ShadowError::InvalidConfig(format!(
                "step_minutes must be positive, got {}",
                step_minutes
            )));
        }
        Ok(Self {
            caster: ShadowCaster::new(grid)?,
            step_minutes,
            cancel: None,
        })
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Runs the daily accumulation; `on_progress(completed, total)` fires after every step.
    pub fn run<P>(&self, sun_path: &SunPath, on_progress: P) -> Result<Vec<ShadowCell>>
    where
        P: FnMut(usize, usize),
    {
        let samples = self.prepare(sun_path)?;
        self.accumulate(&samples, on_progress)
    }

    /// Daylight samples of `sun_path`, checked against the configured step.
    pub(crate) fn prepare(&self, sun_path: &SunPath) -> Result<Vec<DaylightSample>> {
        if (sun_path.step_minutes() - self.step_minutes).abs() > STEP_TOLERANCE_MINUTES {
            return Err(ShadowError::InvalidConfig(format!(
                "sun path is sampled every {} minutes but step_minutes is {}",
                sun_path.step_minutes(),
                self.step_minutes
            )));
        }
        sun_path.require_daylight()
    }

    pub(crate) fn accumulate<P>(&self, samples: &[DaylightSample], mut on_progress: P) -> Result<Vec<ShadowCell>>
    where
        P: FnMut(usize, usize),
    {
        let Some(first) = samples.first() else {
            return Err(ShadowError::NoDaylight(
                "sun path has no positions above the horizon".to_string(),
            ));
        };

        let grid = self.caster.grid();
        let n_cols = grid.columns();
        let n_steps = samples.len();
        let mut lit_millis = vec![0u64; grid.cell_count()];

        info!(
            steps = n_steps,
            cells = grid.cell_count(),
            step_minutes = self.step_minutes,
            date = %first.position.timestamp.date_naive(),
            "starting sun-hours analysis"
        );

        for (t_idx, sample) in samples.iter().enumerate() {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                debug!(completed = t_idx, total = n_steps, "sun-hours analysis cancelled");
                return Err(ShadowError::Cancelled);
            }

            let mask = self.caster.shadow_mask(&sample.position);
            for (millis, shaded) in lit_millis.iter_mut().zip(mask) {
                if !shaded {
                    *millis += sample.credit_millis;
                }
            }

            on_progress(t_idx + 1, n_steps);
        }

        // Integer milliseconds keep results exact and bounded by the daylight span.
        Ok(lit_millis
            .into_iter()
            .enumerate()
            .map(|(idx, millis)| ShadowCell {
                x: idx % n_cols,
                y: idx / n_cols,
                is_shaded: millis == 0,
                sun_hours: Some(millis as f64 / MILLIS_PER_HOUR),
            })
            .collect())
    }
}

pub fn aggregate_sun_hours<P>(
    sun_path: &SunPath,
    grid: &HeightGrid,
    step_minutes: f64,
    on_progress: P,
) -> Result<Vec<ShadowCell>>
where
    P: FnMut(usize, usize),
{
    SunHoursAggregator::new(grid, step_minutes)?.run(sun_path, on_progress)
}

/// Builds the daily result, including summary statistics.
pub fn summarize_sun_hours(
    cells: Vec<ShadowCell>,
    grid: &HeightGrid,
    samples: &[DaylightSample],
    step_minutes: f64,
) -> ShadowAnalysisResult {
    let total_cells = cells.len();
    let hours: Vec<f64> = cells.iter().filter_map(|c| c.sun_hours).collect();
    let shaded_cells = cells.iter().filter(|c| c.is_shaded).count();
    let credited_millis: u64 = samples.iter().map(|s| s.credit_millis).sum();
    let sampled_daylight_hours = credited_millis as f64 / MILLIS_PER_HOUR;

    let min_sun_hours = hours.iter().copied().fold(f64::INFINITY, f64::min);
    let max_sun_hours = hours.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean_sun_hours = hours.iter().sum::<f64>() / total_cells as f64;
    let mean_exposure_ratio = if sampled_daylight_hours > 0.0 {
        mean_sun_hours / sampled_daylight_hours
    } else {
        0.0
    };

    ShadowAnalysisResult {
        mode: AnalysisMode::Daily,
        cells,
        cell_size: grid.cell_size(),
        grid_width: grid.columns(),
        grid_height: grid.rows(),
        percent_shaded: None,
        building_count: grid.building_count(),
        stats: AnalysisStats {
            total_cells,
            shaded_cells,
            lit_cells: total_cells - shaded_cells,
            daily: Some(DailyStats {
                samples: samples.len(),
                step_minutes,
                sampled_daylight_hours,
                min_sun_hours,
                max_sun_hours,
                mean_sun_hours,
                mean_exposure_ratio,
            }),
        },
    }
}

pub fn compute_sun_hours<P>(
    sun_path: &SunPath,
    grid: &HeightGrid,
    step_minutes: f64,
    on_progress: P,
) -> Result<ShadowAnalysisResult>
where
    P: FnMut(usize, usize),
{
    let aggregator = SunHoursAggregator::new(grid, step_minutes)?;
    let samples = aggregator.prepare(sun_path)?;
    let cells = aggregator.accumulate(&samples, on_progress)?;
    Ok(summarize_sun_hours(cells, grid, &samples, step_minutes))
}
