//! Station noise database (`noise_db.json`)
//!
//! A flat JSON object mapping station codes to linear noise amplitudes in
//! µm/s, as produced by the PSD-based noise estimation tooling.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use seiscap::NoiseTable;

use crate::config::NetworkConfig;

pub const DEFAULT_NOISE_DB: &str = "noise_db.json";

/// Where the noise amplitudes of a run came from.
#[derive(Debug, Clone, PartialEq)]
pub enum NoiseSource {
    Database(PathBuf),
    InlineStations,
}

impl fmt::Display for NoiseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database(path) => write!(f, "{}", path.display()),
            Self::InlineStations => write!(f, "inline station noise"),
        }
    }
}

pub fn read_noise_db(path: &Path) -> Result<BTreeMap<String, f64>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read noise database: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse noise database: {}", path.display()))
}

pub fn write_noise_db(path: &Path, entries: &BTreeMap<String, f64>) -> Result<()> {
    let payload =
        serde_json::to_string_pretty(entries).context("failed to serialize noise database")?;
    fs::write(path, payload)
        .with_context(|| format!("failed to write noise database: {}", path.display()))
}

/// Noise table for a run
///
/// An explicit database path must exist. Without one, `fallback` is used when
/// present, otherwise the table is seeded from the stations' inline `noise`
/// values. Either way, stations without an entry resolve to
/// `cfg.default_noise_amplitude`.
pub fn resolve_noise_table(
    cfg: &NetworkConfig,
    explicit: Option<&Path>,
    fallback: &Path,
) -> Result<(NoiseTable, NoiseSource)> {
    let path = match explicit {
        Some(path) => Some(path),
        None if fallback.exists() => Some(fallback),
        None => None,
    };

    match path {
        Some(path) => {
            let entries = read_noise_db(path)?;
            let table = NoiseTable::new(entries, cfg.default_noise_amplitude)
                .with_context(|| format!("invalid noise database: {}", path.display()))?;
            Ok((table, NoiseSource::Database(path.to_path_buf())))
        }
        None => {
            let table = NoiseTable::from_stations(&cfg.stations, cfg.default_noise_amplitude)?;
            Ok((table, NoiseSource::InlineStations))
        }
    }
}

/// Database assigning `amplitude` to every configured station
pub fn uniform_noise_db(cfg: &NetworkConfig, amplitude: f64) -> Result<BTreeMap<String, f64>> {
    let table = NoiseTable::uniform(&cfg.stations, amplitude, cfg.default_noise_amplitude)?;
    Ok(table.entries().clone())
}
