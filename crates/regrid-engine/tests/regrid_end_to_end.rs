//! End-to-end engine flow: normalize, inspect, cache, dispatch, reduce.

mod common;

use common::MockGenerator;
use regrid_engine::{
    GridReference, MaskedSpec, ReaderContext, ReduceOptions, RegridConfig, RemapMethod, Regridder,
};
use std::sync::Arc;
use test_utils::{add_masked_var, add_plev_var, regular_dataset};

fn test_config(dir: &tempfile::TempDir) -> RegridConfig {
    let mut config = RegridConfig::default();
    config.areas_root = dir.path().join("areas");
    config.weights_root = dir.path().join("weights");
    config
}

fn engine(
    dir: &tempfile::TempDir,
    generator: &Arc<MockGenerator>,
) -> Regridder {
    Regridder::new(
        test_config(dir),
        generator.clone(),
        "src",
        &GridReference::Spec("r4x4".into()),
        "tgt",
        &GridReference::Spec("r4x4".into()),
        None,
        RemapMethod::Nearest,
        None,
    )
    .unwrap()
}

#[test]
fn identity_regrid_preserves_values() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(MockGenerator::new(4, 4));
    let mut engine = engine(&dir, &generator);

    let ds = regular_dataset(4, 4);
    let out = engine.regrid(&ds).unwrap();

    let tas = out.var("tas").unwrap();
    assert_eq!(tas.values, ds.var("tas").unwrap().values);
    assert_eq!(tas.attr("regridded").unwrap().as_i64(), Some(1));
    assert_eq!(out.attr("regridded").unwrap().as_i64(), Some(1));
    assert!(out
        .attr("history")
        .unwrap()
        .as_text()
        .unwrap()
        .contains("Regrid from src to tgt"));
}

#[test]
fn repeated_regrid_generates_weights_once() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(MockGenerator::new(4, 4));
    let mut engine = engine(&dir, &generator);

    let ds = regular_dataset(4, 4);
    engine.regrid(&ds).unwrap();
    engine.regrid(&ds).unwrap();

    assert_eq!(generator.weight_calls(), 1);
}

#[test]
fn three_variable_groups_regrid_together() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(MockGenerator::new(4, 4));
    let mut engine = engine(&dir, &generator).with_masked_spec(MaskedSpec {
        attr_rule: Some(("cell_methods".into(), "where sea".into())),
        var_names: Vec::new(),
    });

    let mut ds = regular_dataset(4, 4);
    add_plev_var(&mut ds, &[100_000.0, 50_000.0]);
    add_masked_var(&mut ds, "sos");

    let out = engine.regrid(&ds).unwrap();

    for name in ["tas", "ta", "sos"] {
        assert_eq!(
            out.var(name).unwrap().values,
            ds.var(name).unwrap().values,
            "{} changed under identity weights",
            name
        );
    }
    // One weight set per tag: 2d, 2dm and plev.
    assert_eq!(generator.weight_calls(), 3);
    assert!(out.coord("plev").is_some());
}

#[test]
fn prepare_weights_covers_declared_tags() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(MockGenerator::new(4, 4));
    let mut engine = engine(&dir, &generator);

    engine.prepare_weights(false).unwrap();
    assert_eq!(generator.weight_calls(), 1); // single "2d" tag declared

    // Rebuild regenerates.
    engine.prepare_weights(true).unwrap();
    assert_eq!(generator.weight_calls(), 2);
}

#[test]
fn fldmean_uses_cached_areas() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(MockGenerator::new(6, 8));
    let mut engine = Regridder::new(
        test_config(&dir),
        generator.clone(),
        "src",
        &GridReference::Spec("r8x6".into()),
        "tgt",
        &GridReference::Spec("r8x6".into()),
        None,
        RemapMethod::Conservative,
        None,
    )
    .unwrap();

    let ds = regular_dataset(6, 8);
    let mean_a = engine.fldmean(&ds, "tas", &ReduceOptions::default()).unwrap();
    let mean_b = engine.fldmean(&ds, "tas", &ReduceOptions::default()).unwrap();

    assert_eq!(generator.area_calls(), 1);
    assert_eq!(mean_a.values, mean_b.values);
    assert_eq!(mean_a.ndim(), 0);
}

#[test]
fn in_memory_source_with_context_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(MockGenerator::new(4, 4));
    let sample = Arc::new(regular_dataset(4, 4));

    let mut engine = Regridder::new(
        test_config(&dir),
        generator.clone(),
        "adhoc",
        &GridReference::Unspecified,
        "tgt",
        &GridReference::Spec("r4x4".into()),
        Some(&sample),
        RemapMethod::Nearest,
        Some(ReaderContext::new("ifs", "hist", "hourly")),
    )
    .unwrap();

    assert!(engine.source().is_context_backed());

    let out = engine.regrid(&sample).unwrap();
    assert_eq!(
        out.var("tas").unwrap().values,
        sample.var("tas").unwrap().values
    );

    // The weight file is keyed by the reader context, not the grid name.
    let weights_root = dir.path().join("weights");
    assert!(weights_root
        .join("weights_ifs_hist_hourly_nn_to_tgt_l2d.json")
        .exists());
}

#[test]
fn undefined_source_grid_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(MockGenerator::new(4, 4));

    let err = Regridder::new(
        test_config(&dir),
        generator,
        "src",
        &GridReference::Unspecified,
        "tgt",
        &GridReference::Spec("r4x4".into()),
        None,
        RemapMethod::Nearest,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, regrid_engine::RegridError::GridUndefined));
}
