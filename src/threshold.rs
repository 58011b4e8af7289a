//! Minimum detectable magnitude at a single point
//!
//! Bisection over magnitude: at each midpoint, count the stations whose
//! predicted amplitude clears `snr_threshold` times their noise. If at least
//! `stations_required` stations do, the network detects and the upper bound
//! moves down; otherwise the lower bound moves up.
//!
//! # Precondition
//!
//! The hit count must be non-decreasing in magnitude for a fixed point. The
//! attenuation model guarantees this (amplitude is strictly increasing in
//! magnitude while distances and noise stay fixed). It is not checked at
//! runtime in release builds; debug builds record the hit count at every
//! probed magnitude and assert the counts are ordered.

use serde::{Deserialize, Serialize};

use crate::attenuation::AttenuationModel;
use crate::error::{CapabilityError, Result};
use crate::geodesy::{slant_distance_km, GeoPoint, GeodesicDistance};
use crate::station::{NoiseTable, StationSpec};

/// What counts as a network detection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectionCriteria {
    /// Minimum amplitude-to-noise ratio for a station hit
    #[serde(alias = "snr")]
    pub snr_threshold: f64,
    /// Number of station hits required for a detection
    #[serde(alias = "n_req")]
    pub stations_required: usize,
}

impl DetectionCriteria {
    pub fn new(snr_threshold: f64, stations_required: usize) -> Self {
        Self {
            snr_threshold,
            stations_required,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.snr_threshold.is_finite() && self.snr_threshold > 0.0) {
            return Err(CapabilityError::invalid("snr threshold must be finite and > 0"));
        }
        if self.stations_required == 0 {
            return Err(CapabilityError::invalid("stations_required must be at least 1"));
        }
        Ok(())
    }
}

impl Default for DetectionCriteria {
    fn default() -> Self {
        Self::new(3.0, 4)
    }
}

/// Bisection bracket and stopping width
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverSettings {
    pub tolerance: f64,
    pub magnitude_min: f64,
    pub magnitude_max: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            tolerance: 0.05,
            magnitude_min: 0.0,
            magnitude_max: 6.0,
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(CapabilityError::invalid("solver tolerance must be finite and > 0"));
        }
        if !(self.magnitude_min.is_finite() && self.magnitude_max.is_finite()) {
            return Err(CapabilityError::invalid("magnitude bounds must be finite"));
        }
        if self.magnitude_max <= self.magnitude_min {
            return Err(CapabilityError::invalid(
                "magnitude_max must be greater than magnitude_min",
            ));
        }
        Ok(())
    }

    /// Number of bisection steps, `ceil(log2(width / tolerance))`
    pub fn iterations(&self) -> usize {
        let ratio = (self.magnitude_max - self.magnitude_min) / self.tolerance;
        if ratio <= 1.0 {
            0
        } else {
            ratio.log2().ceil() as usize
        }
    }
}

/// Result of a threshold search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Minimum detectable ML, rounded to 0.01
    pub magnitude: f64,
    /// The network never reached `stations_required` hits inside the
    /// bracket; `magnitude` is then the bracket's upper bound and is not a
    /// real threshold.
    pub undetectable: bool,
}

/// Per-station link budget at a given magnitude
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationSnr {
    pub code: String,
    pub distance_km: f64,
    pub amplitude: f64,
    pub noise: f64,
    pub snr: f64,
    pub hit: bool,
}

/// Threshold search bound to one network and source depth
///
/// Noise lookups are resolved once at construction; only the slant distances
/// change from point to point.
pub struct ThresholdSolver<'a> {
    stations: &'a [StationSpec],
    noise: Vec<f64>,
    model: &'a AttenuationModel,
    geodesy: &'a dyn GeodesicDistance,
    criteria: DetectionCriteria,
    settings: SolverSettings,
    depth_km: f64,
}

impl<'a> ThresholdSolver<'a> {
    pub fn new(
        stations: &'a [StationSpec],
        noise: &NoiseTable,
        model: &'a AttenuationModel,
        geodesy: &'a dyn GeodesicDistance,
        criteria: DetectionCriteria,
        settings: SolverSettings,
        depth_km: f64,
    ) -> Self {
        Self {
            stations,
            noise: stations.iter().map(|s| noise.amplitude(&s.code)).collect(),
            model,
            geodesy,
            criteria,
            settings,
            depth_km,
        }
    }

    /// Slant distance from the source under `point` to every station
    pub fn slant_distances(&self, point: GeoPoint) -> Result<Vec<f64>> {
        self.stations
            .iter()
            .map(|station| {
                let surface = self.geodesy.surface_km(point, station.position());
                let r = slant_distance_km(self.depth_km, surface);
                if r.is_finite() && r > 0.0 {
                    Ok(r)
                } else {
                    Err(CapabilityError::ZeroDistance {
                        station: station.code.clone(),
                        lat: point.lat,
                        lon: point.lon,
                    })
                }
            })
            .collect()
    }

    fn is_hit(&self, idx: usize, ml: f64, r_km: f64) -> bool {
        self.model.ml_to_amp(ml, r_km) / self.noise[idx] >= self.criteria.snr_threshold
    }

    /// Stations clearing the SNR threshold at `ml`, stopping at `limit`
    fn count_hits(&self, ml: f64, distances: &[f64], limit: usize) -> usize {
        let mut hits = 0;
        for (idx, &r) in distances.iter().enumerate() {
            if self.is_hit(idx, ml, r) {
                hits += 1;
                if hits >= limit {
                    break;
                }
            }
        }
        hits
    }

    pub fn solve(&self, point: GeoPoint) -> Result<Detection> {
        let distances = self.slant_distances(point)?;
        let required = self.criteria.stations_required;

        let mut low = self.settings.magnitude_min;
        let mut high = self.settings.magnitude_max;
        let mut detected = false;
        let mut probes = Vec::with_capacity(if cfg!(debug_assertions) {
            self.settings.iterations() + 1
        } else {
            0
        });

        while high - low > self.settings.tolerance {
            let mid = (low + high) / 2.0;
            let hits = self.count_hits(mid, &distances, required);
            if cfg!(debug_assertions) {
                probes.push((mid, hits));
            }
            if hits >= required {
                high = mid;
                detected = true;
            } else {
                low = mid;
            }
        }

        // The last midpoint sits one tolerance below the upper bound; the
        // bound itself may still detect.
        if !detected {
            let hits = self.count_hits(self.settings.magnitude_max, &distances, required);
            if cfg!(debug_assertions) {
                probes.push((self.settings.magnitude_max, hits));
            }
            detected = hits >= required;
        }

        debug_assert!(
            hits_non_decreasing(&mut probes),
            "hit count decreased with magnitude at ({}, {}): {probes:?}",
            point.lat,
            point.lon
        );

        if !detected {
            return Ok(Detection {
                magnitude: self.settings.magnitude_max,
                undetectable: true,
            });
        }

        let magnitude = ((high * 100.0).round() / 100.0)
            .clamp(self.settings.magnitude_min, self.settings.magnitude_max);
        Ok(Detection {
            magnitude,
            undetectable: false,
        })
    }

    /// Link budget of every station for an event of magnitude `ml` at `point`
    pub fn station_snr(&self, point: GeoPoint, ml: f64) -> Result<Vec<StationSnr>> {
        let distances = self.slant_distances(point)?;
        Ok(self
            .stations
            .iter()
            .zip(&distances)
            .enumerate()
            .map(|(idx, (station, &r))| {
                let amplitude = self.model.ml_to_amp(ml, r);
                let snr = amplitude / self.noise[idx];
                StationSnr {
                    code: station.code.clone(),
                    distance_km: r,
                    amplitude,
                    noise: self.noise[idx],
                    snr,
                    hit: snr >= self.criteria.snr_threshold,
                }
            })
            .collect())
    }
}

/// Whether `(magnitude, hits)` probes never lose hits as magnitude grows
fn hits_non_decreasing(probes: &mut [(f64, usize)]) -> bool {
    probes.sort_by(|a, b| a.0.total_cmp(&b.0));
    probes.windows(2).all(|w| w[0].1 <= w[1].1)
}

/// One-shot threshold search at `point`
#[allow(clippy::too_many_arguments)]
pub fn m_detect(
    point: GeoPoint,
    depth_km: f64,
    stations: &[StationSpec],
    noise: &NoiseTable,
    model: &AttenuationModel,
    geodesy: &dyn GeodesicDistance,
    criteria: DetectionCriteria,
    settings: SolverSettings,
) -> Result<Detection> {
    ThresholdSolver::new(stations, noise, model, geodesy, criteria, settings, depth_km).solve(point)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::geodesy::{Ellipsoidal, Spherical};
    use crate::station::DEFAULT_NOISE_AMPLITUDE;

    fn single_station() -> (Vec<StationSpec>, NoiseTable) {
        let stations = vec![StationSpec::new("STA1", 0.0, 0.0)];
        let noise = NoiseTable::new(
            BTreeMap::from([("STA1".to_string(), 1.0)]),
            DEFAULT_NOISE_AMPLITUDE,
        )
        .unwrap();
        (stations, noise)
    }

    fn ring(n: usize) -> Vec<StationSpec> {
        (0..n)
            .map(|k| {
                let theta = k as f64 * std::f64::consts::TAU / n as f64;
                StationSpec::new(format!("R{k:02}"), 0.5 * theta.sin(), 0.5 * theta.cos())
            })
            .collect()
    }

    #[test]
    fn single_station_threshold() {
        let (stations, noise) = single_station();
        let model = AttenuationModel::new(-1.3, 1.0, 0.003);
        let criteria = DetectionCriteria::new(3.0, 1);

        for geodesy in [&Ellipsoidal as &dyn GeodesicDistance, &Spherical::default()] {
            let det = m_detect(
                GeoPoint::new(0.0, 0.01),
                0.0,
                &stations,
                &noise,
                &model,
                geodesy,
                criteria,
                SolverSettings::default(),
            )
            .unwrap();
            assert!(!det.undetectable);
            assert!((det.magnitude - 1.83).abs() <= 0.05, "got {}", det.magnitude);
        }
    }

    #[test]
    fn too_many_required_stations_is_sentinel() {
        let (stations, noise) = single_station();
        let model = AttenuationModel::default();
        let settings = SolverSettings::default();
        let det = m_detect(
            GeoPoint::new(0.0, 0.01),
            5.0,
            &stations,
            &noise,
            &model,
            &Ellipsoidal,
            DetectionCriteria::new(3.0, 2),
            settings,
        )
        .unwrap();
        assert!(det.undetectable);
        assert!((settings.magnitude_max - det.magnitude).abs() <= settings.tolerance);
    }

    #[test]
    fn detection_at_bracket_max_is_not_sentinel() {
        let (stations, noise) = single_station();
        let model = AttenuationModel::default();
        let geodesy = Spherical::default();
        let solver = ThresholdSolver::new(
            &stations,
            &noise,
            &model,
            &geodesy,
            DetectionCriteria::new(3.0, 1),
            SolverSettings::default(),
            0.0,
        );
        let km_per_degree = crate::geodesy::MEAN_EARTH_RADIUS_KM.to_radians();

        // At 501 km the SNR is 3.14 at ML 6.0 and 2.82 at the last midpoint.
        let edge = GeoPoint::new(0.0, 501.0 / km_per_degree);
        let snr = solver.station_snr(edge, 6.0).unwrap();
        assert!(snr[0].hit);
        assert!(!solver.station_snr(edge, 5.953_125).unwrap()[0].hit);
        assert_eq!(
            solver.solve(edge).unwrap(),
            Detection {
                magnitude: 6.0,
                undetectable: false,
            }
        );

        let beyond = GeoPoint::new(0.0, 600.0 / km_per_degree);
        assert!(solver.solve(beyond).unwrap().undetectable);
    }

    #[test]
    fn hit_order_check_spots_a_drop() {
        let mut ordered = vec![(3.0, 1), (1.5, 0), (4.5, 2), (6.0, 2)];
        assert!(hits_non_decreasing(&mut ordered));
        assert_eq!(ordered[0], (1.5, 0));

        let mut dropped = vec![(3.0, 2), (4.5, 1), (1.5, 0)];
        assert!(!hits_non_decreasing(&mut dropped));
    }

    #[test]
    fn result_stays_inside_bracket() {
        let stations = ring(8);
        let noise = NoiseTable::uniform(&stations, 0.5, DEFAULT_NOISE_AMPLITUDE).unwrap();
        let model = AttenuationModel::default();
        let settings = SolverSettings {
            tolerance: 0.05,
            magnitude_min: -1.0,
            magnitude_max: 4.0,
        };
        let solver = ThresholdSolver::new(
            &stations,
            &noise,
            &model,
            &Ellipsoidal,
            DetectionCriteria::new(3.0, 4),
            settings,
            10.0,
        );

        for k in 0..25 {
            let point = GeoPoint::new(-3.0 + k as f64 * 0.25, 2.0 - k as f64 * 0.1);
            let det = solver.solve(point).unwrap();
            assert!(det.magnitude >= settings.magnitude_min);
            assert!(det.magnitude <= settings.magnitude_max);
        }
    }

    #[test]
    fn threshold_grows_away_from_network() {
        let stations = ring(6);
        let noise = NoiseTable::uniform(&stations, 0.5, DEFAULT_NOISE_AMPLITUDE).unwrap();
        let model = AttenuationModel::default();
        let solver = ThresholdSolver::new(
            &stations,
            &noise,
            &model,
            &Ellipsoidal,
            DetectionCriteria::new(3.0, 3),
            SolverSettings::default(),
            10.0,
        );
        let inside = solver.solve(GeoPoint::new(0.0, 0.0)).unwrap();
        let outside = solver.solve(GeoPoint::new(0.0, 3.0)).unwrap();
        assert!(outside.magnitude > inside.magnitude);
    }

    #[test]
    fn missing_noise_entry_matches_explicit_default() {
        let stations = ring(5);
        let model = AttenuationModel::default();
        let criteria = DetectionCriteria::new(3.0, 3);

        let mut entries: BTreeMap<String, f64> =
            stations.iter().map(|s| (s.code.clone(), 0.3)).collect();
        let mut explicit = entries.clone();
        explicit.insert("R02".to_string(), DEFAULT_NOISE_AMPLITUDE);
        entries.remove("R02");

        let lenient = NoiseTable::new(entries, DEFAULT_NOISE_AMPLITUDE).unwrap();
        let explicit = NoiseTable::new(explicit, DEFAULT_NOISE_AMPLITUDE).unwrap();

        for k in 0..10 {
            let point = GeoPoint::new(0.1 * k as f64, -0.2 + 0.05 * k as f64);
            let solve = |noise: &NoiseTable| {
                m_detect(
                    point,
                    8.0,
                    &stations,
                    noise,
                    &model,
                    &Ellipsoidal,
                    criteria,
                    SolverSettings::default(),
                )
                .unwrap()
            };
            assert_eq!(solve(&lenient), solve(&explicit));
        }
    }

    #[test]
    fn colocated_station_at_surface_is_rejected() {
        let (stations, noise) = single_station();
        let err = m_detect(
            GeoPoint::new(0.0, 0.0),
            0.0,
            &stations,
            &noise,
            &AttenuationModel::default(),
            &Ellipsoidal,
            DetectionCriteria::new(3.0, 1),
            SolverSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CapabilityError::ZeroDistance { ref station, .. } if station == "STA1"));
    }

    #[test]
    fn colocated_station_with_depth_is_fine() {
        let (stations, noise) = single_station();
        let det = m_detect(
            GeoPoint::new(0.0, 0.0),
            5.0,
            &stations,
            &noise,
            &AttenuationModel::default(),
            &Ellipsoidal,
            DetectionCriteria::new(3.0, 1),
            SolverSettings::default(),
        )
        .unwrap();
        assert!(!det.undetectable);
    }

    #[test]
    fn iteration_count_is_deterministic() {
        assert_eq!(SolverSettings::default().iterations(), 7);
        let wide = SolverSettings {
            tolerance: 0.01,
            magnitude_min: -2.0,
            magnitude_max: 8.0,
        };
        assert_eq!(wide.iterations(), 10);
    }

    #[test]
    fn station_snr_reports_hits() {
        let (stations, noise) = single_station();
        let model = AttenuationModel::new(-1.3, 1.0, 0.003);
        let solver = ThresholdSolver::new(
            &stations,
            &noise,
            &model,
            &Ellipsoidal,
            DetectionCriteria::new(3.0, 1),
            SolverSettings::default(),
            0.0,
        );
        let point = GeoPoint::new(0.0, 0.01);
        let above = solver.station_snr(point, 1.9).unwrap();
        let below = solver.station_snr(point, 1.7).unwrap();
        assert!(above[0].hit);
        assert!(!below[0].hit);
        assert!((above[0].distance_km - 1.113).abs() < 1e-3);
    }

    #[test]
    fn criteria_and_settings_validation() {
        assert!(DetectionCriteria::new(3.0, 0).validate().is_err());
        assert!(DetectionCriteria::new(0.0, 1).validate().is_err());
        let inverted = SolverSettings {
            magnitude_min: 6.0,
            magnitude_max: 0.0,
            ..SolverSettings::default()
        };
        assert!(inverted.validate().is_err());
    }
}
