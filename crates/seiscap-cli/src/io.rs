use anyhow::{Context, Result};
use chrono::Utc;
use csv::Writer;
use ndarray::Array2;
use ndarray_npy::{NpzReader, NpzWriter};
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use seiscap::{
    AttenuationModel, CapabilityGrid, DetectionCriteria, GridSpec, GridSummary, Scenario,
    SolverSettings,
};

use crate::noise::NoiseSource;

pub const OUTPUT_SCHEMA_VERSION: &str = "1.0.0";

const LAT: &str = "lat";
const LON: &str = "lon";
const MDET: &str = "mdet";
const UNDETECTABLE: &str = "undetectable";

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub schema_version: String,
    pub created_at: String,
    pub shape: [usize; 2],
    pub grid: GridSpec,
    pub depth_km: f64,
    pub stations: usize,
    pub noise_source: String,
    pub default_noise_amplitude: f64,
    pub geodesy: String,
    pub attenuation: AttenuationModel,
    pub detection: DetectionCriteria,
    pub solver: SolverSettings,
    pub summary: GridSummary,
}

impl Manifest {
    pub fn new(scenario: &Scenario, grid: &CapabilityGrid, noise_source: &NoiseSource) -> Self {
        let (n_lat, n_lon) = grid.shape();
        Self {
            schema_version: OUTPUT_SCHEMA_VERSION.to_string(),
            created_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            shape: [n_lat, n_lon],
            grid: scenario.grid,
            depth_km: scenario.depth_km,
            stations: scenario.stations.len(),
            noise_source: noise_source.to_string(),
            default_noise_amplitude: scenario.noise.default_amplitude(),
            geodesy: scenario.geodesy.name().to_string(),
            attenuation: scenario.model,
            detection: scenario.criteria,
            solver: scenario.solver,
            summary: grid.summary(),
        }
    }
}

fn fmt_f64(v: f64) -> String {
    format!("{v:.6}")
}

/// `capability.npz` -> `capability.manifest.json`
pub fn manifest_path(grid_path: &Path) -> PathBuf {
    grid_path.with_extension("manifest.json")
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory: {}", parent.display())),
        _ => Ok(()),
    }
}

/// Write `lat`, `lon`, `mdet` (float64) and `undetectable` (uint8 0/1).
pub fn write_capability_npz(path: &Path, grid: &CapabilityGrid) -> Result<()> {
    ensure_parent_dir(path)?;
    let file = File::create(path)
        .with_context(|| format!("failed to create grid file: {}", path.display()))?;
    let mask: Array2<u8> = grid.undetectable.mapv(u8::from);

    let mut npz = NpzWriter::new(file);
    npz.add_array(LAT, &grid.lat)?;
    npz.add_array(LON, &grid.lon)?;
    npz.add_array(MDET, &grid.mdet)?;
    npz.add_array(UNDETECTABLE, &mask)?;
    npz.finish()
        .with_context(|| format!("failed to finish grid file: {}", path.display()))?;
    Ok(())
}

/// Read a grid written by [`write_capability_npz`]
///
/// Files carrying only `lat`, `lon` and `mdet` load with an all-false mask.
pub fn read_capability_npz(path: &Path) -> Result<CapabilityGrid> {
    let file =
        File::open(path).with_context(|| format!("failed to open grid file: {}", path.display()))?;
    let mut npz = NpzReader::new(file)
        .with_context(|| format!("not an NPZ archive: {}", path.display()))?;

    let names = npz
        .names()
        .with_context(|| format!("failed to list arrays in {}", path.display()))?;
    let entry = |wanted: &str| {
        names
            .iter()
            .find(|name| name.trim_end_matches(".npy") == wanted)
            .cloned()
    };
    let required = |wanted: &str| {
        entry(wanted).with_context(|| format!("grid file has no '{wanted}' array"))
    };

    let lat: Array2<f64> = npz.by_name(&required(LAT)?)?;
    let lon: Array2<f64> = npz.by_name(&required(LON)?)?;
    let mdet: Array2<f64> = npz.by_name(&required(MDET)?)?;
    let undetectable = match entry(UNDETECTABLE) {
        Some(name) => {
            let mask: Array2<u8> = npz.by_name(&name)?;
            mask.mapv(|v| v != 0)
        }
        None => Array2::from_elem(mdet.dim(), false),
    };

    Ok(CapabilityGrid::new(lat, lon, mdet, undetectable)?)
}

/// Long-form export, one row per cell in row-major order.
pub fn write_capability_csv(path: &Path, grid: &CapabilityGrid) -> Result<()> {
    ensure_parent_dir(path)?;
    let mut wtr = Writer::from_path(path)
        .with_context(|| format!("failed to open csv for writing: {}", path.display()))?;

    wtr.write_record(["lat", "lon", "mdet", "undetectable"])?;
    for (((lat, lon), mdet), flag) in grid
        .lat
        .iter()
        .zip(grid.lon.iter())
        .zip(grid.mdet.iter())
        .zip(grid.undetectable.iter())
    {
        wtr.write_record([
            fmt_f64(*lat),
            fmt_f64(*lon),
            fmt_f64(*mdet),
            u8::from(*flag).to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_manifest_json(path: &Path, manifest: &Manifest) -> Result<()> {
    let payload = serde_json::to_string_pretty(manifest).context("failed to serialize manifest")?;
    fs::write(path, payload)
        .with_context(|| format!("failed to write manifest: {}", path.display()))
}
