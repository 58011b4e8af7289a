use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use seiscap::{compute_with_threads, CancelToken, GeoPoint};
use seiscap_cli::io::{
    manifest_path, read_capability_npz, write_capability_csv, write_capability_npz,
    write_manifest_json, Manifest,
};
use seiscap_cli::noise::{uniform_noise_db, write_noise_db};
use seiscap_cli::{init_logging, parse_bins, resolve_noise_table, NetworkConfig, DEFAULT_NOISE_DB};

#[derive(Debug, Parser)]
#[command(name = "seiscap")]
#[command(about = "Minimum detectable magnitude maps for seismic networks")]
struct Cli {
    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compute the capability grid over the configured area
    Compute {
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,

        /// Noise database; defaults to ./noise_db.json when present
        #[arg(long)]
        noise: Option<PathBuf>,

        #[arg(long, default_value = "capability.npz")]
        out: PathBuf,

        /// Also write a long-form CSV of every cell
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Worker threads, 0 = one per core
        #[arg(long, default_value_t = 0)]
        threads: usize,
    },
    /// Minimum detectable magnitude and station SNR at one location
    Point {
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,

        #[arg(long)]
        noise: Option<PathBuf>,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
    /// Write a noise database with one amplitude for every station
    MakeTestNoise {
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,

        #[arg(long, default_value = DEFAULT_NOISE_DB)]
        out: PathBuf,

        /// Noise amplitude [µm/s]
        #[arg(long, default_value_t = 0.5)]
        amplitude: f64,
    },
    /// Range and coverage of a saved grid
    Summary {
        grid: PathBuf,

        /// Comma-separated magnitude bins
        #[arg(long, default_value = "0.5,1,1.5,2,2.5,3")]
        bins: String,
    },
}

fn run_compute(
    config: &Path,
    noise: Option<&Path>,
    out: &Path,
    csv: Option<&Path>,
    threads: usize,
) -> Result<()> {
    let cfg = NetworkConfig::from_toml_file(config)?;
    let (table, source) = resolve_noise_table(&cfg, noise, Path::new(DEFAULT_NOISE_DB))?;
    info!(source = %source, entries = table.len(), "noise table loaded");

    let scenario = cfg.scenario(table)?;
    let grid = compute_with_threads(&scenario, threads, &CancelToken::new())
        .context("capability computation failed")?;

    write_capability_npz(out, &grid)?;
    if let Some(csv) = csv {
        write_capability_csv(csv, &grid)?;
        info!(path = %csv.display(), "csv written");
    }
    let manifest = Manifest::new(&scenario, &grid, &source);
    write_manifest_json(&manifest_path(out), &manifest)?;

    println!("Grid saved to {}", out.display());
    match (manifest.summary.mdet_min, manifest.summary.mdet_max) {
        (Some(lo), Some(hi)) => println!("Mdet range: {lo:.2} .. {hi:.2}"),
        _ => println!("Mdet range: no detectable cells"),
    }
    if manifest.summary.undetectable_cells > 0 {
        println!(
            "Undetectable cells: {} of {}",
            manifest.summary.undetectable_cells, manifest.summary.cells
        );
    }
    Ok(())
}

fn run_point(config: &Path, noise: Option<&Path>, lat: f64, lon: f64) -> Result<()> {
    let cfg = NetworkConfig::from_toml_file(config)?;
    let (table, _) = resolve_noise_table(&cfg, noise, Path::new(DEFAULT_NOISE_DB))?;
    let scenario = cfg.scenario(table)?;

    anyhow::ensure!(
        lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0,
        "invalid location ({lat}, {lon})"
    );
    let point = GeoPoint::new(lat, lon);
    let det = scenario.detect_at(point)?;
    if det.undetectable {
        println!(
            "({lat:.4}, {lon:.4}) depth {:.1} km: undetectable below ML {:.2}",
            scenario.depth_km, det.magnitude
        );
    } else {
        println!(
            "({lat:.4}, {lon:.4}) depth {:.1} km: Mdet = {:.2}",
            scenario.depth_km, det.magnitude
        );
    }

    println!(
        "{:<8} {:>10} {:>12} {:>10} {:>8} hit",
        "station", "dist_km", "amp", "noise", "snr"
    );
    for row in scenario.solver().station_snr(point, det.magnitude)? {
        println!(
            "{:<8} {:>10.2} {:>12.4} {:>10.4} {:>8.2} {}",
            row.code,
            row.distance_km,
            row.amplitude,
            row.noise,
            row.snr,
            if row.hit { "*" } else { "" }
        );
    }
    Ok(())
}

fn run_make_test_noise(config: &Path, out: &Path, amplitude: f64) -> Result<()> {
    let cfg = NetworkConfig::from_toml_file(config)?;
    let db = uniform_noise_db(&cfg, amplitude)?;
    write_noise_db(out, &db)?;
    println!("Wrote {} noise entries to {}", db.len(), out.display());
    Ok(())
}

fn run_summary(grid: &Path, bins: &str) -> Result<()> {
    let bins = parse_bins(bins)?;
    let grid = read_capability_npz(grid)?;
    let (n_lat, n_lon) = grid.shape();
    let summary = grid.summary();

    println!("Grid: {n_lat} x {n_lon} ({} cells)", summary.cells);
    match (summary.mdet_min, summary.mdet_max, summary.mdet_mean) {
        (Some(lo), Some(hi), Some(mean)) => {
            println!("Mdet range: {lo:.2} .. {hi:.2} (mean {mean:.2})")
        }
        _ => println!("Mdet range: no detectable cells"),
    }
    println!("Undetectable cells: {}", summary.undetectable_cells);
    for ml in bins {
        println!(
            "  ML <= {ml:>5.2}: {:>6.1}%",
            100.0 * grid.coverage_fraction(ml)
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Compute {
            config,
            noise,
            out,
            csv,
            threads,
        } => run_compute(&config, noise.as_deref(), &out, csv.as_deref(), threads),
        Command::Point {
            config,
            noise,
            lat,
            lon,
        } => run_point(&config, noise.as_deref(), lat, lon),
        Command::MakeTestNoise {
            config,
            out,
            amplitude,
        } => run_make_test_noise(&config, &out, amplitude),
        Command::Summary { grid, bins } => run_summary(&grid, &bins),
    }
}
