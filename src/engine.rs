//! Capability grid computation
//!
//! Every cell is an independent threshold search over the same read-only
//! [`Scenario`]. Cells are mapped in parallel with rayon and collected in
//! row-major order, so results do not depend on scheduling.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ndarray::Array2;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::attenuation::AttenuationModel;
use crate::error::{CapabilityError, Result};
use crate::geodesy::{GeoPoint, Geodesy};
use crate::grid::GridSpec;
use crate::station::{validate_stations, NoiseTable, StationSpec};
use crate::threshold::{Detection, DetectionCriteria, SolverSettings, ThresholdSolver};

/// Immutable inputs of one capability run
#[derive(Debug, Clone)]
pub struct Scenario {
    pub grid: GridSpec,
    /// Uniform source depth [km]
    pub depth_km: f64,
    pub stations: Vec<StationSpec>,
    pub noise: NoiseTable,
    pub model: AttenuationModel,
    pub geodesy: Geodesy,
    pub criteria: DetectionCriteria,
    pub solver: SolverSettings,
}

impl Scenario {
    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        if !(self.depth_km.is_finite() && self.depth_km >= 0.0) {
            return Err(CapabilityError::invalid("depth_km must be finite and >= 0"));
        }
        validate_stations(&self.stations)?;
        self.model.validate()?;
        self.criteria.validate()?;
        self.solver.validate()?;
        Ok(())
    }

    pub fn solver(&self) -> ThresholdSolver<'_> {
        ThresholdSolver::new(
            &self.stations,
            &self.noise,
            &self.model,
            &self.geodesy,
            self.criteria,
            self.solver,
            self.depth_km,
        )
    }

    /// Threshold at a single location
    pub fn detect_at(&self, point: GeoPoint) -> Result<Detection> {
        self.validate()?;
        self.solver().solve(point)
    }
}

/// Cooperative cancellation flag, checked before each cell
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

/// Minimum detectable magnitude over a lat/lon mesh
///
/// All four arrays share the shape `(n_lat, n_lon)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityGrid {
    pub lat: Array2<f64>,
    pub lon: Array2<f64>,
    pub mdet: Array2<f64>,
    /// Cells where the network never detects inside the magnitude bracket
    pub undetectable: Array2<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridSummary {
    pub cells: usize,
    pub undetectable_cells: usize,
    /// Range and mean over detectable cells, `None` when there are none
    pub mdet_min: Option<f64>,
    pub mdet_max: Option<f64>,
    pub mdet_mean: Option<f64>,
}

impl CapabilityGrid {
    pub fn new(
        lat: Array2<f64>,
        lon: Array2<f64>,
        mdet: Array2<f64>,
        undetectable: Array2<bool>,
    ) -> Result<Self> {
        let shape = lat.dim();
        if lon.dim() != shape || mdet.dim() != shape || undetectable.dim() != shape {
            return Err(CapabilityError::invalid(format!(
                "grid arrays disagree in shape: lat {:?}, lon {:?}, mdet {:?}, undetectable {:?}",
                shape,
                lon.dim(),
                mdet.dim(),
                undetectable.dim()
            )));
        }
        Ok(Self {
            lat,
            lon,
            mdet,
            undetectable,
        })
    }

    /// `(n_lat, n_lon)`
    pub fn shape(&self) -> (usize, usize) {
        self.mdet.dim()
    }

    pub fn summary(&self) -> GridSummary {
        let detectable: Vec<f64> = self
            .mdet
            .iter()
            .zip(self.undetectable.iter())
            .filter(|&(_, &flag)| !flag)
            .map(|(&m, _)| m)
            .collect();

        let (mdet_min, mdet_max, mdet_mean) = if detectable.is_empty() {
            (None, None, None)
        } else {
            let min = detectable.iter().copied().fold(f64::INFINITY, f64::min);
            let max = detectable.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mean = detectable.iter().sum::<f64>() / detectable.len() as f64;
            (Some(min), Some(max), Some(mean))
        };

        GridSummary {
            cells: self.mdet.len(),
            undetectable_cells: self.mdet.len() - detectable.len(),
            mdet_min,
            mdet_max,
            mdet_mean,
        }
    }

    /// Share of all cells where events of magnitude `ml` are detected
    pub fn coverage_fraction(&self, ml: f64) -> f64 {
        if self.mdet.is_empty() {
            return 0.0;
        }
        let covered = self
            .mdet
            .iter()
            .zip(self.undetectable.iter())
            .filter(|&(&m, &flag)| !flag && m <= ml)
            .count();
        covered as f64 / self.mdet.len() as f64
    }
}

enum CellOutcome {
    Done(Detection),
    Failed(CapabilityError),
    Skipped,
}

/// Evaluate the scenario on the global rayon pool
pub fn compute(scenario: &Scenario, cancel: &CancelToken) -> Result<CapabilityGrid> {
    scenario.validate()?;

    let (lat, lon) = scenario.grid.generate()?;
    let (n_lat, n_lon) = lat.dim();
    let total = n_lat * n_lon;

    let missing = scenario.noise.missing(&scenario.stations);
    if !missing.is_empty() {
        warn!(
            stations = ?missing,
            default_amplitude = scenario.noise.default_amplitude(),
            "no noise entry, using default amplitude"
        );
    }

    info!(
        n_lat,
        n_lon,
        stations = scenario.stations.len(),
        depth_km = scenario.depth_km,
        geodesy = scenario.geodesy.name(),
        "capability grid starting"
    );
    let started = Instant::now();

    let solver = scenario.solver();
    let completed = AtomicUsize::new(0);
    let points: Vec<GeoPoint> = lat
        .iter()
        .zip(lon.iter())
        .map(|(&la, &lo)| GeoPoint::new(la, lo))
        .collect();

    let outcomes: Vec<CellOutcome> = (0..total)
        .into_par_iter()
        .map(|idx| {
            if cancel.is_cancelled() {
                return CellOutcome::Skipped;
            }
            let outcome = match solver.solve(points[idx]) {
                Ok(det) => CellOutcome::Done(det),
                Err(err) => CellOutcome::Failed(err),
            };
            completed.fetch_add(1, Ordering::Relaxed);
            outcome
        })
        .collect();

    let mut mdet = Vec::with_capacity(total);
    let mut undetectable = Vec::with_capacity(total);
    let mut skipped = false;
    for (idx, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            CellOutcome::Done(det) => {
                mdet.push(det.magnitude);
                undetectable.push(det.undetectable);
            }
            CellOutcome::Failed(err) => {
                return Err(CapabilityError::CellFailed {
                    row: idx / n_lon,
                    col: idx % n_lon,
                    lat: points[idx].lat,
                    lon: points[idx].lon,
                    source: Box::new(err),
                });
            }
            CellOutcome::Skipped => skipped = true,
        }
    }

    if skipped {
        return Err(CapabilityError::Cancelled {
            completed: completed.load(Ordering::Relaxed),
            total,
        });
    }

    let mdet = Array2::from_shape_vec((n_lat, n_lon), mdet)
        .map_err(|e| CapabilityError::invalid(format!("mdet assembly failed: {e}")))?;
    let undetectable = Array2::from_shape_vec((n_lat, n_lon), undetectable)
        .map_err(|e| CapabilityError::invalid(format!("mask assembly failed: {e}")))?;
    let grid = CapabilityGrid::new(lat, lon, mdet, undetectable)?;

    let summary = grid.summary();
    info!(
        cells = total,
        undetectable = summary.undetectable_cells,
        mdet_min = ?summary.mdet_min,
        mdet_max = ?summary.mdet_max,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "capability grid complete"
    );

    Ok(grid)
}

/// Evaluate the scenario on a dedicated pool of `threads` workers
///
/// `threads == 0` uses rayon's default sizing.
pub fn compute_with_threads(
    scenario: &Scenario,
    threads: usize,
    cancel: &CancelToken,
) -> Result<CapabilityGrid> {
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    debug!(threads = pool.current_num_threads(), "thread pool ready");
    pool.install(|| compute(scenario, cancel))
}
