//! seiscap - seismic network detection capability
//!
//! Computes, for every point of a latitude/longitude grid, the smallest
//! local magnitude (ML) that a station network detects with at least
//! `stations_required` stations above a signal-to-noise threshold.

pub mod attenuation;
pub mod engine;
pub mod error;
pub mod geodesy;
pub mod grid;
pub mod station;
pub mod threshold;

// Re-export main types
pub use attenuation::AttenuationModel;
pub use engine::{compute, compute_with_threads, CancelToken, CapabilityGrid, GridSummary, Scenario};
pub use error::{CapabilityError, Result};
pub use geodesy::{GeoPoint, GeodesicDistance, Geodesy};
pub use grid::GridSpec;
pub use station::{NoiseTable, StationSpec, DEFAULT_NOISE_AMPLITUDE};
pub use threshold::{m_detect, Detection, DetectionCriteria, SolverSettings, StationSnr, ThresholdSolver};
