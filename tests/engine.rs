use std::collections::BTreeMap;

use seiscap::{
    compute, compute_with_threads, AttenuationModel, CancelToken, CapabilityError,
    DetectionCriteria, Geodesy, GridSpec, NoiseTable, Scenario, SolverSettings, StationSpec,
    DEFAULT_NOISE_AMPLITUDE,
};

fn network() -> Vec<StationSpec> {
    vec![
        StationSpec::new("STA1", 30.20, 100.20),
        StationSpec::new("STA2", 30.25, 100.85),
        StationSpec::new("STA3", 30.80, 100.15),
        StationSpec::new("STA4", 30.75, 100.90),
        StationSpec::new("STA5", 30.50, 100.55),
    ]
}

fn scenario() -> Scenario {
    let stations = network();
    let mut entries: BTreeMap<String, f64> =
        stations.iter().map(|s| (s.code.clone(), 0.5)).collect();
    entries.remove("STA5");

    Scenario {
        grid: GridSpec::new(30.0, 31.0, 100.0, 101.0, 0.1),
        depth_km: 10.0,
        noise: NoiseTable::new(entries, DEFAULT_NOISE_AMPLITUDE).unwrap(),
        stations,
        model: AttenuationModel::default(),
        geodesy: Geodesy::Ellipsoidal,
        criteria: DetectionCriteria::new(3.0, 3),
        solver: SolverSettings::default(),
    }
}

#[test]
fn grid_arrays_share_shape() {
    let grid = compute(&scenario(), &CancelToken::new()).unwrap();
    assert_eq!(grid.shape(), (11, 11));
    assert_eq!(grid.lat.dim(), (11, 11));
    assert_eq!(grid.lon.dim(), (11, 11));
    assert_eq!(grid.undetectable.dim(), (11, 11));
    assert!((grid.lat[[10, 0]] - 31.0).abs() < 1e-9);
    assert!((grid.lon[[0, 10]] - 101.0).abs() < 1e-9);
}

#[test]
fn compute_is_idempotent() {
    let scenario = scenario();
    let first = compute(&scenario, &CancelToken::new()).unwrap();
    let second = compute(&scenario, &CancelToken::new()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn single_thread_matches_parallel() {
    let scenario = scenario();
    let parallel = compute(&scenario, &CancelToken::new()).unwrap();
    let serial = compute_with_threads(&scenario, 1, &CancelToken::new()).unwrap();
    assert_eq!(parallel, serial);
}

#[test]
fn cells_match_point_queries() {
    let scenario = scenario();
    let grid = compute(&scenario, &CancelToken::new()).unwrap();
    for (i, j) in [(0, 0), (5, 5), (3, 8), (10, 10)] {
        let point = seiscap::GeoPoint::new(grid.lat[[i, j]], grid.lon[[i, j]]);
        let det = scenario.detect_at(point).unwrap();
        assert_eq!(grid.mdet[[i, j]], det.magnitude);
        assert_eq!(grid.undetectable[[i, j]], det.undetectable);
    }
}

#[test]
fn values_stay_inside_bracket() {
    let scenario = scenario();
    let grid = compute(&scenario, &CancelToken::new()).unwrap();
    for &m in grid.mdet.iter() {
        assert!(m >= scenario.solver.magnitude_min);
        assert!(m <= scenario.solver.magnitude_max);
    }
    assert!(grid.summary().mdet_min.is_some());
}

#[test]
fn unreachable_requirement_marks_every_cell() {
    let mut scenario = scenario();
    scenario.criteria.stations_required = scenario.stations.len() + 1;
    let grid = compute(&scenario, &CancelToken::new()).unwrap();
    assert!(grid.undetectable.iter().all(|&flag| flag));
    assert!(grid
        .mdet
        .iter()
        .all(|&m| (scenario.solver.magnitude_max - m).abs() <= scenario.solver.tolerance));
    assert_eq!(grid.coverage_fraction(6.0), 0.0);
}

#[test]
fn station_on_grid_node_at_surface_fails_cell() {
    let mut scenario = scenario();
    scenario.depth_km = 0.0;
    scenario.stations.push(StationSpec::new("GRID", 30.5, 100.5));

    let err = compute(&scenario, &CancelToken::new()).unwrap_err();
    match err {
        CapabilityError::CellFailed {
            row, col, source, ..
        } => {
            assert_eq!((row, col), (5, 5));
            assert!(matches!(*source, CapabilityError::ZeroDistance { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn cancelled_run_reports_cancellation() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = compute(&scenario(), &cancel).unwrap_err();
    assert!(matches!(
        err,
        CapabilityError::Cancelled { completed: 0, total: 121 }
    ));
}

#[test]
fn invalid_scenario_fails_before_compute() {
    let mut scenario = scenario();
    scenario.grid.step = -0.1;
    assert!(matches!(
        compute(&scenario, &CancelToken::new()),
        Err(CapabilityError::InvalidConfig(_))
    ));
}
