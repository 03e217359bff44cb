//! Tests for the Monte Carlo engine
//!
//! These tests verify:
//! - A fixed seed reproduces the exact result
//! - Percentile bands are ordered for every metric and month
//! - Degenerate distributions collapse onto the deterministic projection
//! - Trials with invalid samples are excluded and counted
//! - Cancellation stops a run
//! - Run settings are validated before any trial

use super::{customer_model, saas_model};
use crate::error::EngineError;
use crate::model::{
    MonteCarloConfig, ParamPath, ParameterDistributions, SamplingRule, SimMetric,
    SimulationProgress,
};
use crate::monte_carlo::{simulate, simulate_with_progress};
use crate::projection::project;

fn seeded(trials: usize, seed: u64) -> MonteCarloConfig {
    MonteCarloConfig {
        trials,
        seed: Some(seed),
        ..MonteCarloConfig::default()
    }
}

fn uncertain_growth_and_churn() -> ParameterDistributions {
    ParameterDistributions::new()
        .with(
            ParamPath::RevenueGrowth,
            SamplingRule::Normal {
                mean: 0.08,
                std_dev: 0.03,
            },
        )
        .with(
            ParamPath::CustomersChurn,
            SamplingRule::Triangular {
                min: 0.01,
                mode: 0.03,
                max: 0.08,
            },
        )
        .with(
            ParamPath::cost_line("payroll"),
            SamplingRule::StudentT {
                mean: 120_000.0,
                scale: 5_000.0,
                df: 5.0,
            },
        )
}

#[test]
fn test_same_seed_same_result() {
    let set = saas_model();
    let dists = uncertain_growth_and_churn();
    let config = seeded(500, 1234);
    let a = simulate_with_progress(&set, 24, &dists, &config, &SimulationProgress::new()).unwrap();
    let b = simulate_with_progress(&set, 24, &dists, &config, &SimulationProgress::new()).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.seed, 1234);

    let c = simulate_with_progress(&set, 24, &dists, &seeded(500, 4321), &SimulationProgress::new())
        .unwrap();
    assert_ne!(a.bands, c.bands);
}

#[test]
fn test_bands_are_ordered() {
    let result = simulate_with_progress(
        &saas_model(),
        18,
        &uncertain_growth_and_churn(),
        &seeded(400, 7),
        &SimulationProgress::new(),
    )
    .unwrap();

    assert_eq!(result.trial_count, 400);
    assert_eq!(result.valid_trials, 400);
    assert!(!result.warning);
    for metric in SimMetric::ALL {
        let bands = &result.bands[&metric];
        assert_eq!(bands.len(), 18);
        for band in bands {
            assert!(band.band.is_ordered(), "{metric:?} month {}: {:?}", band.period, band.band);
        }
    }
    assert!(result.risk.min_cash.is_ordered());
    assert!(result.risk.ending_cash.is_ordered());
    assert!((0.0..=1.0).contains(&result.risk.probability_of_ruin));
}

#[test]
fn test_zero_spread_matches_projection() {
    let set = saas_model();
    let dists = ParameterDistributions::new().with(
        ParamPath::RevenueGrowth,
        SamplingRule::Normal {
            mean: 0.08,
            std_dev: 0.0,
        },
    );
    let result = simulate(&set, 12, 50, &dists).unwrap();
    let projection = project(&set, 12).unwrap();

    for month in &projection.months {
        let band = result.band(SimMetric::Revenue, month.period).unwrap();
        assert_eq!(band.p5, month.revenue);
        assert_eq!(band.p95, month.revenue);
        let cash = result.band(SimMetric::CashBalance, month.period).unwrap();
        assert_eq!(cash.p50, month.cash_balance);
    }
    let expected_ruin = if projection.runway.months().is_some() { 1.0 } else { 0.0 };
    assert_eq!(result.risk.probability_of_ruin, expected_ruin);
}

#[test]
fn test_invalid_samples_are_excluded() {
    // A third of churn samples land above 1 and fail projection
    let dists = ParameterDistributions::new().with(
        ParamPath::CustomersChurn,
        SamplingRule::Uniform {
            low: 0.5,
            high: 1.25,
        },
    );
    let result = simulate_with_progress(
        &saas_model(),
        12,
        &dists,
        &seeded(600, 99),
        &SimulationProgress::new(),
    )
    .unwrap();

    assert!(result.warning);
    assert!(result.excluded_trials > 100 && result.excluded_trials < 300);
    assert_eq!(result.valid_trials + result.excluded_trials, 600);
}

#[test]
fn test_too_many_exclusions_fail_the_run() {
    let dists = ParameterDistributions::new().with(
        ParamPath::CustomersChurn,
        SamplingRule::Uniform {
            low: 0.5,
            high: 1.25,
        },
    );
    let config = MonteCarloConfig {
        max_excluded_fraction: 0.1,
        ..seeded(600, 99)
    };
    assert!(matches!(
        simulate_with_progress(&saas_model(), 12, &dists, &config, &SimulationProgress::new()),
        Err(EngineError::InsufficientValidTrials { total: 600, .. })
    ));

    let always_invalid = ParameterDistributions::new().with(
        ParamPath::CostsCogsRatio,
        SamplingRule::Uniform {
            low: 1.5,
            high: 2.0,
        },
    );
    assert_eq!(
        simulate_with_progress(
            &saas_model(),
            12,
            &always_invalid,
            &seeded(50, 1),
            &SimulationProgress::new()
        ),
        Err(EngineError::InsufficientValidTrials {
            valid: 0,
            total: 50
        })
    );
}

#[test]
fn test_distribution_can_supply_required_input() {
    let mut set = saas_model();
    set.revenue.baseline = None;
    let dists = ParameterDistributions::new().with(
        ParamPath::RevenueBaseline,
        SamplingRule::LogNormal {
            mean: 11.5,
            std_dev: 0.2,
        },
    );
    let result = simulate(&set, 6, 100, &dists).unwrap();
    assert_eq!(result.valid_trials, 100);

    assert_eq!(
        simulate(&set, 6, 100, &ParameterDistributions::new()),
        Err(EngineError::IncompleteAssumptions {
            missing: vec!["revenue.baseline".into()]
        })
    );
}

#[test]
fn test_cancelled_run_stops() {
    let progress = SimulationProgress::new();
    progress.cancel();
    let result = simulate_with_progress(
        &saas_model(),
        24,
        &uncertain_growth_and_churn(),
        &seeded(1_000, 5),
        &progress,
    );
    assert_eq!(result, Err(EngineError::Cancelled));
    assert_eq!(progress.completed(), 0);
}

#[test]
fn test_progress_counts_every_trial() {
    let progress = SimulationProgress::new();
    simulate_with_progress(
        &customer_model(),
        12,
        &ParameterDistributions::new().with(
            ParamPath::CustomersArpa,
            SamplingRule::Uniform {
                low: 400.0,
                high: 600.0,
            },
        ),
        &seeded(250, 3),
        &progress,
    )
    .unwrap();
    assert_eq!(progress.completed(), 250);
}

#[test]
fn test_customer_driven_bands_follow_arpa() {
    let dists = ParameterDistributions::new().with(
        ParamPath::CustomersArpa,
        SamplingRule::Uniform {
            low: 400.0,
            high: 600.0,
        },
    );
    let result = simulate_with_progress(
        &customer_model(),
        12,
        &dists,
        &seeded(500, 11),
        &SimulationProgress::new(),
    )
    .unwrap();

    // Customers do not depend on ARPA, so their band has no spread
    let customers = result.band(SimMetric::Customers, 12).unwrap();
    assert!((customers.p95 - customers.p5).abs() < 1e-9);
    let revenue = result.band(SimMetric::Revenue, 12).unwrap();
    assert!(revenue.p95 > revenue.p5);
    assert!(revenue.is_ordered());
}

#[test]
fn test_engine_leaves_the_trial_ceiling_to_callers() {
    let progress = SimulationProgress::new();
    progress.cancel();
    let result = simulate_with_progress(
        &saas_model(),
        12,
        &uncertain_growth_and_churn(),
        &seeded(2_000_000, 5),
        &progress,
    );
    // Past any fixed limit, the run starts and is stopped by the cancel flag
    assert_eq!(result, Err(EngineError::Cancelled));
}

#[test]
fn test_excluded_fraction_must_be_a_fraction() {
    for fraction in [f64::NAN, -0.1, 1.5] {
        let config = MonteCarloConfig {
            max_excluded_fraction: fraction,
            ..seeded(10, 1)
        };
        let result = simulate_with_progress(
            &saas_model(),
            12,
            &uncertain_growth_and_churn(),
            &config,
            &SimulationProgress::new(),
        );
        assert!(
            matches!(result, Err(EngineError::InvalidParameter { ref path, .. }) if path == "max_excluded_fraction"),
            "{fraction} accepted: {result:?}"
        );
    }

    for fraction in [0.0, 1.0] {
        let config = MonteCarloConfig {
            max_excluded_fraction: fraction,
            ..seeded(10, 1)
        };
        assert!(
            simulate_with_progress(
                &saas_model(),
                12,
                &uncertain_growth_and_churn(),
                &config,
                &SimulationProgress::new(),
            )
            .is_ok()
        );
    }
}
