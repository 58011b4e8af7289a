//! Command-line layer for seismic network detection capability grids.
//!
//! Loads the TOML network configuration and the station noise database,
//! runs the `seiscap` engine, and persists the resulting grid.

pub mod config;
pub mod io;
pub mod noise;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::{AreaConfig, NetworkConfig};
pub use noise::{resolve_noise_table, NoiseSource, DEFAULT_NOISE_DB};

/// Initialize logging on stderr.
///
/// `RUST_LOG` overrides the default filter (`info`, or `debug` when
/// `verbose` is set).
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Parse a comma-separated list of magnitudes, e.g. `"0.5,1,2,3"`.
pub fn parse_bins(raw: &str) -> anyhow::Result<Vec<f64>> {
    let mut bins = raw
        .split(',')
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(|b| {
            b.parse::<f64>()
                .map_err(|e| anyhow::anyhow!("invalid magnitude bin '{b}': {e}"))
        })
        .collect::<anyhow::Result<Vec<f64>>>()?;
    anyhow::ensure!(!bins.is_empty(), "bins list cannot be empty");
    bins.sort_by(|a, b| a.total_cmp(b));
    Ok(bins)
}
