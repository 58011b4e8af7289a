//! Evaluation mesh over a latitude/longitude bounding box
//!
//! Axis lengths come from an integer point count,
//! `floor((max - min) / step + GRID_EPSILON) + 1`, and axis values are
//! `min + k * step`. Accumulating `step` in floating point would drop or
//! duplicate the upper bound for some step/range combinations.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{CapabilityError, Result};

/// Slack applied before flooring the point count
pub const GRID_EPSILON: f64 = 1e-9;

/// Largest mesh `validate` accepts, about 400 MB per f64 array
pub const MAX_GRID_CELLS: usize = 50_000_000;

/// Bounds and spacing of the evaluation mesh, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
    pub step: f64,
}

impl GridSpec {
    pub fn new(lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64, step: f64) -> Self {
        Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
            step,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let values = [self.lat_min, self.lat_max, self.lon_min, self.lon_max, self.step];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(CapabilityError::invalid("grid bounds and step must be finite"));
        }
        if self.step <= 0.0 {
            return Err(CapabilityError::invalid("grid step must be > 0"));
        }
        if self.lat_max < self.lat_min {
            return Err(CapabilityError::invalid(
                "lat_max must be greater than or equal to lat_min",
            ));
        }
        if self.lon_max < self.lon_min {
            return Err(CapabilityError::invalid(
                "lon_max must be greater than or equal to lon_min",
            ));
        }
        if self.lat_min < -90.0 || self.lat_max > 90.0 {
            return Err(CapabilityError::invalid("latitude bounds must lie in [-90, 90]"));
        }
        // Checked in floating point so tiny steps cannot overflow the count.
        let cells = axis_len_f64(self.lat_min, self.lat_max, self.step)
            * axis_len_f64(self.lon_min, self.lon_max, self.step);
        if cells > MAX_GRID_CELLS as f64 {
            return Err(CapabilityError::invalid(format!(
                "grid step {} gives about {cells:.3e} cells, limit is {MAX_GRID_CELLS}",
                self.step
            )));
        }
        Ok(())
    }

    pub fn lat_axis(&self) -> Vec<f64> {
        axis(self.lat_min, self.lat_max, self.step)
    }

    pub fn lon_axis(&self) -> Vec<f64> {
        axis(self.lon_min, self.lon_max, self.step)
    }

    /// `(n_lat, n_lon)`
    pub fn shape(&self) -> (usize, usize) {
        (
            axis_len(self.lat_min, self.lat_max, self.step),
            axis_len(self.lon_min, self.lon_max, self.step),
        )
    }

    /// Saturates for specs that fail [`GridSpec::validate`]
    pub fn cell_count(&self) -> usize {
        let (n_lat, n_lon) = self.shape();
        n_lat.saturating_mul(n_lon)
    }

    /// Latitude and longitude meshes in matrix indexing
    pub fn generate(&self) -> Result<(Array2<f64>, Array2<f64>)> {
        self.validate()?;
        Ok(mesh(&self.lat_axis(), &self.lon_axis()))
    }
}

/// Number of samples in `[min, max]` at spacing `step`, upper bound included
/// when it is reachable within `GRID_EPSILON`.
///
/// Saturates at `usize::MAX` instead of overflowing.
pub fn axis_len(min: f64, max: f64, step: f64) -> usize {
    (((max - min) / step + GRID_EPSILON).floor() as usize).saturating_add(1)
}

fn axis_len_f64(min: f64, max: f64, step: f64) -> f64 {
    ((max - min) / step + GRID_EPSILON).floor() + 1.0
}

pub fn axis(min: f64, max: f64, step: f64) -> Vec<f64> {
    (0..axis_len(min, max, step))
        .map(|k| min + k as f64 * step)
        .collect()
}

/// `lat[i, j] = lats[i]`, `lon[i, j] = lons[j]`
pub fn mesh(lats: &[f64], lons: &[f64]) -> (Array2<f64>, Array2<f64>) {
    let shape = (lats.len(), lons.len());
    let lat = Array2::from_shape_fn(shape, |(i, _)| lats[i]);
    let lon = Array2::from_shape_fn(shape, |(_, j)| lons[j]);
    (lat, lon)
}

/// Free-function form of [`GridSpec::generate`]
pub fn generate(
    lat_min: f64,
    lat_max: f64,
    lon_min: f64,
    lon_max: f64,
    step: f64,
) -> Result<(Array2<f64>, Array2<f64>)> {
    GridSpec::new(lat_min, lat_max, lon_min, lon_max, step).generate()
}
