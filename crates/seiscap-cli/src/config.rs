use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use seiscap::station::validate_stations;
use seiscap::{
    AttenuationModel, DetectionCriteria, Geodesy, GridSpec, NoiseTable, Scenario, SolverSettings,
    StationSpec, DEFAULT_NOISE_AMPLITUDE,
};

/// Study area and source depth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AreaConfig {
    /// Latitude range [deg], `[min, max]`
    pub lat: [f64; 2],
    /// Longitude range [deg], `[min, max]`
    pub lon: [f64; 2],
    /// Grid spacing [deg]
    pub step: f64,
    /// Uniform source depth [km]
    pub depth_km: f64,
}

impl AreaConfig {
    pub fn grid(&self) -> GridSpec {
        GridSpec::new(self.lat[0], self.lat[1], self.lon[0], self.lon[1], self.step)
    }
}

/// Network configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    #[serde(default)]
    pub geodesy: Geodesy,
    /// Noise amplitude for stations absent from the noise table
    #[serde(default = "default_noise_amplitude")]
    pub default_noise_amplitude: f64,
    pub area: AreaConfig,
    #[serde(default)]
    pub attenuation: AttenuationModel,
    pub detection: DetectionCriteria,
    #[serde(default)]
    pub solver: SolverSettings,
    pub stations: Vec<StationSpec>,
}

fn default_noise_amplitude() -> f64 {
    DEFAULT_NOISE_AMPLITUDE
}

impl NetworkConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid config file: {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let cfg: NetworkConfig = toml::from_str(raw).context("failed to parse TOML config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.area.grid().validate()?;
        anyhow::ensure!(
            self.area.depth_km.is_finite() && self.area.depth_km >= 0.0,
            "area.depth_km must be finite and >= 0"
        );
        anyhow::ensure!(
            self.default_noise_amplitude.is_finite() && self.default_noise_amplitude > 0.0,
            "default_noise_amplitude must be finite and > 0"
        );
        validate_stations(&self.stations)?;
        self.attenuation.validate()?;
        self.detection.validate()?;
        self.solver.validate()?;
        Ok(())
    }

    /// Read-only snapshot for the capability engine
    pub fn scenario(&self, noise: NoiseTable) -> Result<Scenario> {
        let scenario = Scenario {
            grid: self.area.grid(),
            depth_km: self.area.depth_km,
            stations: self.stations.clone(),
            noise,
            model: self.attenuation,
            geodesy: self.geodesy,
            criteria: self.detection,
            solver: self.solver,
        };
        scenario.validate()?;
        Ok(scenario)
    }
}
