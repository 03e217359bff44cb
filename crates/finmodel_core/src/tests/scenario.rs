//! Tests for the scenario engine
//!
//! These tests verify:
//! - An empty override reproduces the baseline
//! - Raising growth never lowers revenue
//! - Delta records and percent changes
//! - Baseline projections are cached per model and horizon and never go stale

use std::sync::Arc;
use std::thread;

use super::saas_model;
use crate::config::AssumptionsBuilder;
use crate::error::EngineError;
use crate::model::{DeltaMetric, ModelId, Override, ParamPath};
use crate::projection::project;
use crate::scenario::ScenarioEngine;
use crate::store::MemoryAssumptionStore;

fn engine_with(id: &str, set: crate::model::AssumptionSet) -> ScenarioEngine {
    let store = MemoryAssumptionStore::new();
    store.insert(ModelId::new(id), set);
    ScenarioEngine::new(Arc::new(store))
}

#[test]
fn test_empty_override_matches_baseline() {
    let engine = engine_with("acme", saas_model());
    let run = engine
        .run_scenario(&ModelId::new("acme"), &Override::new(), 24)
        .unwrap();

    assert_eq!(run.projection, project(&saas_model(), 24).unwrap());
    assert_eq!(run.deltas.len(), DeltaMetric::ALL.len());
    for delta in &run.deltas {
        assert!(delta.absolute_delta.is_none_or(|d| d == 0.0), "{delta:?}");
    }
}

#[test]
fn test_growth_override_on_reference_example() {
    let set = AssumptionsBuilder::top_down("example")
        .revenue(100_000.0)
        .growth(0.08)
        .opening_cash(0.0)
        .build();
    let engine = engine_with("example", set);
    let patch = Override::new().set(ParamPath::RevenueGrowth, 0.12);
    let run = engine
        .run_scenario(&ModelId::new("example"), &patch, 12)
        .unwrap();

    let final_revenue = run.delta(DeltaMetric::FinalRevenue).unwrap();
    assert!((final_revenue.baseline.unwrap() - 251_817.0).abs() < 1.0);
    assert!(final_revenue.scenario.unwrap() > final_revenue.baseline.unwrap());
    assert!(final_revenue.absolute_delta.unwrap() > 0.0);
    let expected_pct =
        (1.12_f64.powi(12) - 1.08_f64.powi(12)) / 1.08_f64.powi(12) * 100.0;
    assert!((final_revenue.percent_delta.unwrap() - expected_pct).abs() < 1e-6);
}

#[test]
fn test_positive_growth_delta_is_monotonic() {
    let engine = engine_with("acme", saas_model());
    let id = ModelId::new("acme");
    let (_, baseline) = engine.baseline(&id, 24).unwrap();

    for delta in [0.001, 0.01, 0.05] {
        let patch = Override::new().delta(ParamPath::RevenueGrowth, delta);
        let run = engine.run_scenario(&id, &patch, 24).unwrap();
        for (base, scen) in baseline.months.iter().zip(&run.projection.months) {
            assert!(scen.revenue >= base.revenue);
        }
    }
}

#[test]
fn test_percent_delta_none_for_zero_baseline() {
    let engine = engine_with("acme", saas_model());
    let patch = Override::new().delta(ParamPath::CashOpening, 10_000.0);
    let run = engine
        .run_scenario(&ModelId::new("acme"), &patch, 6)
        .unwrap();

    // The fixture starts with a positive cash balance, so ending cash moves 1:1
    let ending = run.delta(DeltaMetric::EndingCash).unwrap();
    assert!((ending.absolute_delta.unwrap() - 10_000.0).abs() < 1e-6);

    let set = AssumptionsBuilder::top_down("zero")
        .revenue(0.0)
        .growth(0.1)
        .opening_cash(0.0)
        .build();
    let engine = engine_with("zero", set);
    let patch = Override::new().set(ParamPath::RevenueBaseline, 10.0);
    let run = engine.run_scenario(&ModelId::new("zero"), &patch, 3).unwrap();
    let revenue = run.delta(DeltaMetric::FinalRevenue).unwrap();
    assert_eq!(revenue.baseline, Some(0.0));
    assert_eq!(revenue.percent_delta, None);
    assert!(revenue.absolute_delta.unwrap() > 0.0);
}

#[test]
fn test_runway_delta_is_none_when_indefinite() {
    let engine = engine_with("acme", saas_model());
    let patch = Override::new().delta(ParamPath::CashOpening, 10_000_000.0);
    let run = engine
        .run_scenario(&ModelId::new("acme"), &patch, 24)
        .unwrap();
    let runway = run.delta(DeltaMetric::RunwayMonths).unwrap();
    assert!(runway.baseline.is_some());
    assert_eq!(runway.scenario, None);
    assert_eq!(runway.absolute_delta, None);
}

#[test]
fn test_missing_model_and_bad_path() {
    let engine = engine_with("acme", saas_model());
    assert!(matches!(
        engine.run_scenario(&ModelId::new("missing"), &Override::new(), 12),
        Err(EngineError::BaselineModelNotFound(_))
    ));

    let patch = Override::new().set(ParamPath::cost_line("marketing"), 1_000.0);
    assert!(matches!(
        engine.run_scenario(&ModelId::new("acme"), &patch, 12),
        Err(EngineError::InvalidOverridePath(_))
    ));
}

#[test]
fn test_string_keyed_override() {
    let engine = engine_with("acme", saas_model());
    let patch = Override::from_entries([("revenue.growth:delta", 0.02), ("costs.rent", 0.0)])
        .unwrap();
    let run = engine
        .run_scenario(&ModelId::new("acme"), &patch, 12)
        .unwrap();
    let baseline = project(&saas_model(), 12).unwrap();
    assert!(run.projection.months[0].revenue > baseline.months[0].revenue);
    assert!(run.projection.months[0].operating_expenses < baseline.months[0].operating_expenses);

    assert!(matches!(
        Override::from_entries([("revenue.growht", 0.1)]),
        Err(EngineError::InvalidOverridePath(_))
    ));
}

#[test]
fn test_baseline_cache_is_shared_and_versioned() {
    let store = Arc::new(MemoryAssumptionStore::new());
    let id = ModelId::new("acme");
    store.insert(id.clone(), saas_model());
    let engine = Arc::new(ScenarioEngine::new(store.clone()));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let id = id.clone();
            thread::spawn(move || {
                let patch = Override::new().delta(ParamPath::RevenueGrowth, 0.01 * i as f64);
                engine.run_scenario(&id, &patch, 12).map(|run| run.projection)
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap().is_ok());
    }
    assert_eq!(engine.cached_baselines(), 1);

    let (_, a) = engine.baseline(&id, 12).unwrap();
    let (_, b) = engine.baseline(&id, 12).unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    // A new version of the model replaces the cached entry
    let mut updated = saas_model();
    updated.created_at = updated.created_at + jiff::SignedDuration::from_secs(60);
    updated.revenue.baseline = Some(1.0);
    store.insert(id.clone(), updated);
    let (_, c) = engine.baseline(&id, 12).unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(engine.cached_baselines(), 1);
}

#[test]
fn test_replaced_model_with_same_timestamp_is_reprojected() {
    let store = Arc::new(MemoryAssumptionStore::new());
    let id = ModelId::new("acme");
    let original = saas_model();
    store.insert(id.clone(), original.clone());
    let engine = ScenarioEngine::new(store.clone());
    engine.run_scenario(&id, &Override::new(), 12).unwrap();

    let mut edited = original.clone();
    edited.revenue.baseline = Some(1_000_000.0);
    assert_eq!(edited.created_at, original.created_at);
    store.insert(id.clone(), edited.clone());

    let run = engine.run_scenario(&id, &Override::new(), 12).unwrap();
    assert_eq!(run.projection, project(&edited, 12).unwrap());
    let final_revenue = run.delta(DeltaMetric::FinalRevenue).unwrap();
    assert_eq!(final_revenue.absolute_delta, Some(0.0));
    assert_eq!(engine.cached_baselines(), 1);

    // An equal copy of the current set still hits the cache
    let (_, a) = engine.baseline(&id, 12).unwrap();
    store.insert(id.clone(), edited);
    let (_, b) = engine.baseline(&id, 12).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn test_baseline_cache_is_bounded_and_forgets_removed_models() {
    let store = Arc::new(MemoryAssumptionStore::new());
    let id = ModelId::new("acme");
    store.insert(id.clone(), saas_model());
    let engine = ScenarioEngine::new(store.clone());

    for horizon in 1..=100 {
        engine.baseline(&id, horizon).unwrap();
    }
    assert_eq!(engine.cached_baselines(), 64);

    store.remove(&id);
    assert!(matches!(
        engine.run_scenario(&id, &Override::new(), 12),
        Err(EngineError::BaselineModelNotFound(_))
    ));
    assert_eq!(engine.cached_baselines(), 0);
}
