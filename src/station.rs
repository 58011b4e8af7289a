//! Stations and their ambient noise levels

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{CapabilityError, Result};
use crate::geodesy::GeoPoint;

/// Noise amplitude used for stations without an entry, high enough that
/// they effectively never contribute a detection.
pub const DEFAULT_NOISE_AMPLITUDE: f64 = 1000.0;

/// A seismic station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StationSpec {
    /// Unique station code
    pub code: String,
    /// Latitude [deg]
    pub lat: f64,
    /// Longitude [deg]
    pub lon: f64,
    /// Inline noise amplitude, only used to seed a [`NoiseTable`] when no
    /// noise database is supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise: Option<f64>,
}

impl StationSpec {
    pub fn new(code: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            code: code.into(),
            lat,
            lon,
            noise: None,
        }
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

/// Check a station list for empty or duplicated codes and bad coordinates
pub fn validate_stations(stations: &[StationSpec]) -> Result<()> {
    if stations.is_empty() {
        return Err(CapabilityError::invalid("at least one station is required"));
    }

    let mut seen = BTreeSet::new();
    for station in stations {
        if station.code.trim().is_empty() {
            return Err(CapabilityError::invalid("station code must not be empty"));
        }
        if !seen.insert(station.code.as_str()) {
            return Err(CapabilityError::invalid(format!(
                "duplicate station code '{}'",
                station.code
            )));
        }
        if !station.lat.is_finite() || !station.lon.is_finite() || station.lat.abs() > 90.0 {
            return Err(CapabilityError::invalid(format!(
                "station '{}' has invalid coordinates ({}, {})",
                station.code, station.lat, station.lon
            )));
        }
        if let Some(noise) = station.noise {
            if !(noise.is_finite() && noise > 0.0) {
                return Err(CapabilityError::invalid(format!(
                    "station '{}' inline noise must be > 0",
                    station.code
                )));
            }
        }
    }

    Ok(())
}

/// Station code to noise amplitude, same units as predicted amplitudes
///
/// Lookups never fail: codes without an entry resolve to
/// `default_amplitude`. This leniency is intentional, a station with
/// unknown noise is treated as non-contributing rather than aborting a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoiseTable {
    entries: BTreeMap<String, f64>,
    default_amplitude: f64,
}

impl NoiseTable {
    pub fn new(entries: BTreeMap<String, f64>, default_amplitude: f64) -> Result<Self> {
        if !(default_amplitude.is_finite() && default_amplitude > 0.0) {
            return Err(CapabilityError::invalid(
                "default noise amplitude must be finite and > 0",
            ));
        }
        for (code, amp) in &entries {
            if !(amp.is_finite() && *amp > 0.0) {
                return Err(CapabilityError::invalid(format!(
                    "noise amplitude for '{code}' must be finite and > 0, got {amp}"
                )));
            }
        }
        Ok(Self {
            entries,
            default_amplitude,
        })
    }

    /// Table seeded from the stations' inline `noise` values
    pub fn from_stations(stations: &[StationSpec], default_amplitude: f64) -> Result<Self> {
        let entries = stations
            .iter()
            .filter_map(|s| s.noise.map(|n| (s.code.clone(), n)))
            .collect();
        Self::new(entries, default_amplitude)
    }

    /// Same amplitude for every station
    pub fn uniform(stations: &[StationSpec], amplitude: f64, default_amplitude: f64) -> Result<Self> {
        let entries = stations
            .iter()
            .map(|s| (s.code.clone(), amplitude))
            .collect();
        Self::new(entries, default_amplitude)
    }

    pub fn amplitude(&self, code: &str) -> f64 {
        self.entries
            .get(code)
            .copied()
            .unwrap_or(self.default_amplitude)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    pub fn default_amplitude(&self) -> f64 {
        self.default_amplitude
    }

    pub fn entries(&self) -> &BTreeMap<String, f64> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Codes in `stations` that will fall back to the default amplitude
    pub fn missing<'a>(&self, stations: &'a [StationSpec]) -> Vec<&'a str> {
        stations
            .iter()
            .filter(|s| !self.contains(&s.code))
            .map(|s| s.code.as_str())
            .collect()
    }
}
