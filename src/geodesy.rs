//! Surface and slant distances between geographic points
//!
//! Two surface models are provided. `Ellipsoidal` solves the inverse
//! geodesic problem on the WGS-84 ellipsoid (Karney, via geographiclib);
//! `Spherical` uses the haversine formula on a mean-radius sphere. Pick one per deployment and keep
//! it fixed, absolute thresholds shift slightly between them.

use std::sync::OnceLock;

use geographiclib_rs::{Geodesic, InverseGeodesic};
use serde::{Deserialize, Serialize};

/// Mean Earth radius (IUGG) in km
pub const MEAN_EARTH_RADIUS_KM: f64 = 6371.0088;

/// Geographic position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Great-circle surface distance between two points
pub trait GeodesicDistance: Send + Sync {
    /// Surface distance in km
    fn surface_km(&self, a: GeoPoint, b: GeoPoint) -> f64;
}

/// Haversine distance on a sphere
#[derive(Debug, Clone, Copy)]
pub struct Spherical {
    pub radius_km: f64,
}

impl Default for Spherical {
    fn default() -> Self {
        Self {
            radius_km: MEAN_EARTH_RADIUS_KM,
        }
    }
}

impl GeodesicDistance for Spherical {
    fn surface_km(&self, a: GeoPoint, b: GeoPoint) -> f64 {
        let dlat = (b.lat - a.lat).to_radians();
        let dlon = (b.lon - a.lon).to_radians();
        let lat1 = a.lat.to_radians();
        let lat2 = b.lat.to_radians();

        // Rounding can push h just past 1 for antipodal pairs.
        let h = ((dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2))
            .clamp(0.0, 1.0);
        let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
        self.radius_km * c
    }
}

/// Geodesic distance on the WGS-84 ellipsoid
///
/// Karney's inverse solution converges for every pair, antipodal ones
/// included.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ellipsoidal;

fn wgs84() -> &'static Geodesic {
    static WGS84: OnceLock<Geodesic> = OnceLock::new();
    WGS84.get_or_init(Geodesic::wgs84)
}

impl GeodesicDistance for Ellipsoidal {
    fn surface_km(&self, a: GeoPoint, b: GeoPoint) -> f64 {
        let meters: f64 = wgs84().inverse(a.lat, a.lon, b.lat, b.lon);
        meters / 1000.0
    }
}

/// Surface model selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Geodesy {
    #[default]
    Ellipsoidal,
    Spherical,
}

impl Geodesy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ellipsoidal => "ellipsoidal",
            Self::Spherical => "spherical",
        }
    }
}

impl GeodesicDistance for Geodesy {
    fn surface_km(&self, a: GeoPoint, b: GeoPoint) -> f64 {
        match self {
            Self::Ellipsoidal => Ellipsoidal.surface_km(a, b),
            Self::Spherical => Spherical::default().surface_km(a, b),
        }
    }
}

/// Straight-line distance from a source at `depth_km` to a surface station
pub fn slant_distance_km(depth_km: f64, surface_km: f64) -> f64 {
    depth_km.hypot(surface_km)
}
