use crate::sun_hours::{summarize_sun_hours, CancelToken, SunHoursAggregator};
use crate::sun_path::SunPath;
use crate::terrain::HeightGrid;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub progress: f64,
    pub current_step: String,
    pub total_steps: Option<usize>,
    pub current_step_number: Option<usize>,
}

impl ProgressUpdate {
    fn starting(total: usize) -> Self {
        Self {
            progress: 0.0,
            current_step: "Initializing sun-hours calculation...".to_string(),
            total_steps: Some(total),
            current_step_number: Some(0),
        }
    }

    fn step(completed: usize, total: usize) -> Self {
        let current_step = if completed == total {
            "Sun-hours calculation complete".to_string()
        } else {
            "Calculating shadows...".to_string()
        };
        Self {
            progress: completed as f64 / total as f64 * 100.0,
            current_step,
            total_steps: Some(total),
            current_step_number: Some(completed),
        }
    }
}

/// Daily analysis running on the blocking pool.
///
/// Dropping the task without joining it cancels the analysis at its next step.
pub struct SunHoursTask {
    progress: watch::Receiver<ProgressUpdate>,
    cancel: CancelToken,
    handle: Option<JoinHandle<Result<ShadowAnalysisResult>>>,
}

impl SunHoursTask {
    /// Spawns the analysis; must be called from within a tokio runtime.
    ///
    /// Path problems (no daylight, step mismatch) fail here without spawning.
    pub fn spawn(sun_path: &SunPath, grid: Arc<HeightGrid>, step_minutes: f64) -> Result<Self> {
        Self::spawn_with_cancel(sun_path, grid, step_minutes, CancelToken::new())
    }

    pub fn spawn_with_cancel(
        sun_path: &SunPath,
        grid: Arc<HeightGrid>,
        step_minutes: f64,
        cancel: CancelToken,
    ) -> Result<Self> {
        let samples = SunHoursAggregator::new(&grid, step_minutes)?.prepare(sun_path)?;

        let (tx, rx) = watch::channel(ProgressUpdate::starting(samples.len()));
        let token = cancel.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let aggregator = SunHoursAggregator::new(&grid, step_minutes)?.with_cancel(token);
            let cells = aggregator.accumulate(&samples, |completed, total| {
                // A dropped receiver only means nobody is watching.
                let _ = tx.send(ProgressUpdate::step(completed, total));
            })?;
            Ok(summarize_sun_hours(cells, &grid, &samples, step_minutes))
        });

        Ok(Self {
            progress: rx,
            cancel,
            handle: Some(handle),
        })
    }

    pub fn progress(&self) -> watch::Receiver<ProgressUpdate> {
        self.progress.clone()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn join(mut self) -> Result<ShadowAnalysisResult> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(ShadowError::TaskFailed("analysis already joined".to_string()));
        };
        let joined = handle.await;
        self.handle = None;
        match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(ShadowError::Cancelled),
            Err(e) => Err(ShadowError::TaskFailed(e.to_string())),
        }
    }
}

impl Drop for SunHoursTask {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancel.cancel();
        }
    }
}
