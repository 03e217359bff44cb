//! Monte Carlo Engine
//!
//! Each trial samples every uncertain parameter once, installs the samples as
//! absolute overrides and projects the result. Trials run in fixed-size
//! batches; a batch's RNG is seeded from the run seed and the batch index, and
//! hands every trial its own sub-seed, so a given seed reproduces the same
//! result no matter how batches are scheduled across threads.

use std::collections::BTreeMap;

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{EngineError, Result};
use crate::model::{
    AssumptionSet, MonteCarloConfig, Override, ParamPath, ParameterDistributions, PatchOp,
    PeriodBand, ProjectionResult, RiskMetrics, Sampler, SimMetric, SimulationProgress,
    SimulationResult,
};
use crate::percentiles;
use crate::projection::project;
use crate::scenario::derive_scenario;

/// Per-trial values kept for aggregation
struct TrialOutcome {
    /// `[metric][period]` in `SimMetric::ALL` order
    series: [Vec<f64>; 4],
    min_cash: f64,
    ending_cash: f64,
    /// 1-based month of first negative cash
    ruin_period: Option<u32>,
}

impl TrialOutcome {
    fn from_projection(projection: &ProjectionResult) -> Self {
        let series = SimMetric::ALL.map(|metric| {
            projection
                .months
                .iter()
                .map(|m| match metric {
                    SimMetric::Revenue => m.revenue,
                    SimMetric::Arr => m.arr,
                    SimMetric::CashBalance => m.cash_balance,
                    SimMetric::Customers => m.customers,
                })
                .collect()
        });
        Self {
            series,
            min_cash: projection.min_cash(),
            ending_cash: projection.ending_cash(),
            ruin_period: projection.runway.months(),
        }
    }
}

/// Run `trials` trials with default settings and a fresh seed
pub fn simulate(
    assumptions: &AssumptionSet,
    horizon: u32,
    trials: usize,
    distributions: &ParameterDistributions,
) -> Result<SimulationResult> {
    let config = MonteCarloConfig {
        trials,
        ..MonteCarloConfig::default()
    };
    simulate_with_progress(
        assumptions,
        horizon,
        distributions,
        &config,
        &SimulationProgress::new(),
    )
}

/// Run a simulation, reporting completed trials to `progress` and stopping with
/// `Cancelled` once it is cancelled.
pub fn simulate_with_progress(
    assumptions: &AssumptionSet,
    horizon: u32,
    distributions: &ParameterDistributions,
    config: &MonteCarloConfig,
    progress: &SimulationProgress,
) -> Result<SimulationResult> {
    let trials = config.trials;
    // Upper limits are the caller's policy (see `OrchestratorConfig::max_trials`)
    if trials < 1 {
        return Err(EngineError::InvalidTrialCount {
            requested: trials,
            max: None,
        });
    }
    config.validate()?;
    if horizon == 0 {
        return Err(EngineError::InvalidHorizon(horizon));
    }

    let samplers: Vec<(ParamPath, Sampler)> = distributions
        .rules
        .iter()
        .map(|(path, rule)| Ok((path.clone(), rule.sampler(path)?)))
        .collect::<Result<_>>()?;

    // Required inputs that no distribution will supply would fail every trial
    let missing: Vec<String> = assumptions
        .required_paths()
        .into_iter()
        .filter(|p| !assumptions.has(p) && !distributions.rules.contains_key(p))
        .map(|p| p.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(EngineError::IncompleteAssumptions { missing });
    }

    let seed = config.seed.unwrap_or_else(rand::random);
    let batch_size = config.batch_size.max(1);
    let num_batches = trials.div_ceil(batch_size);

    tracing::debug!(seed, trials, batch_size, horizon, "monte carlo started");

    let run_batch = |batch: usize| -> Result<Vec<Option<TrialOutcome>>> {
        let mut rng = SmallRng::seed_from_u64(batch_seed(seed, batch));
        let len = if batch == num_batches - 1 {
            trials - batch * batch_size
        } else {
            batch_size
        };
        let mut outcomes = Vec::with_capacity(len);
        for i in 0..len {
            if progress.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let trial_seed = rng.next_u64();
            let outcome = run_trial(assumptions, horizon, &samplers, trial_seed);
            if let Err(e) = &outcome {
                tracing::debug!(trial = batch * batch_size + i, error = %e, "trial excluded");
            }
            outcomes.push(outcome.ok());
            progress.increment();
        }
        Ok(outcomes)
    };

    #[cfg(feature = "parallel")]
    let batches: Vec<Vec<Option<TrialOutcome>>> = (0..num_batches)
        .into_par_iter()
        .map(run_batch)
        .collect::<Result<_>>()?;

    #[cfg(not(feature = "parallel"))]
    let batches: Vec<Vec<Option<TrialOutcome>>> = (0..num_batches)
        .map(run_batch)
        .collect::<Result<_>>()?;

    let outcomes: Vec<TrialOutcome> = batches.into_iter().flatten().flatten().collect();
    let valid = outcomes.len();
    let excluded = trials - valid;

    if valid == 0 || excluded as f64 / trials as f64 > config.max_excluded_fraction {
        return Err(EngineError::InsufficientValidTrials {
            valid,
            total: trials,
        });
    }
    if excluded > 0 {
        tracing::warn!(excluded, trials, "monte carlo trials excluded");
    }

    Ok(aggregate(seed, horizon, trials, &outcomes))
}

/// Seed of batch `batch`, well mixed so neighbouring batches share no state
fn batch_seed(seed: u64, batch: usize) -> u64 {
    // splitmix64 finalizer
    let mut z = seed ^ (batch as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn run_trial(
    assumptions: &AssumptionSet,
    horizon: u32,
    samplers: &[(ParamPath, Sampler)],
    trial_seed: u64,
) -> Result<TrialOutcome> {
    let mut rng = SmallRng::seed_from_u64(trial_seed);
    let patches = samplers
        .iter()
        .map(|(path, sampler)| (path.clone(), PatchOp::Set(sampler.sample(&mut rng))))
        .collect();
    let derived = derive_scenario(assumptions, &Override { patches })?;
    let projection = project(&derived, horizon)?;
    Ok(TrialOutcome::from_projection(&projection))
}

fn aggregate(seed: u64, horizon: u32, trials: usize, outcomes: &[TrialOutcome]) -> SimulationResult {
    let valid = outcomes.len();
    let periods = horizon as usize;
    let mut column = Vec::with_capacity(valid);

    let mut bands = BTreeMap::new();
    for (m, metric) in SimMetric::ALL.into_iter().enumerate() {
        let per_period = (0..periods)
            .map(|p| {
                column.clear();
                column.extend(outcomes.iter().map(|o| o.series[m][p]));
                PeriodBand {
                    period: p as u32 + 1,
                    band: percentiles::band(&mut column),
                }
            })
            .collect();
        bands.insert(metric, per_period);
    }

    let mut ruined_at = vec![0usize; periods];
    for period in outcomes.iter().filter_map(|o| o.ruin_period) {
        ruined_at[period as usize - 1] += 1;
    }
    let ruin_by_period: Vec<f64> = ruined_at
        .iter()
        .scan(0usize, |acc, &n| {
            *acc += n;
            Some(*acc as f64 / valid as f64)
        })
        .collect();
    let probability_of_ruin = ruin_by_period.last().copied().unwrap_or(0.0);

    let mut min_cash: Vec<f64> = outcomes.iter().map(|o| o.min_cash).collect();
    let mut ending_cash: Vec<f64> = outcomes.iter().map(|o| o.ending_cash).collect();

    SimulationResult {
        seed,
        horizon,
        trial_count: trials,
        valid_trials: valid,
        excluded_trials: trials - valid,
        warning: valid < trials,
        bands,
        risk: RiskMetrics {
            probability_of_ruin,
            ruin_by_period,
            min_cash: percentiles::band(&mut min_cash),
            ending_cash: percentiles::band(&mut ending_cash),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssumptionsBuilder;
    use crate::model::SamplingRule;

    fn base() -> AssumptionSet {
        AssumptionsBuilder::top_down("acme")
            .revenue(100_000.0)
            .growth(0.05)
            .cost_line("payroll", 150_000.0)
            .opening_cash(100_000.0)
            .build()
    }

    fn growth_normal() -> ParameterDistributions {
        ParameterDistributions::new().with(
            ParamPath::RevenueGrowth,
            SamplingRule::Normal {
                mean: 0.05,
                std_dev: 0.02,
            },
        )
    }

    #[test]
    fn test_batch_seeds_differ() {
        assert_ne!(batch_seed(42, 0), batch_seed(42, 1));
        assert_ne!(batch_seed(42, 0), batch_seed(43, 0));
        assert_eq!(batch_seed(42, 3), batch_seed(42, 3));
    }

    #[test]
    fn test_zero_trials_rejected() {
        assert!(matches!(
            simulate(&base(), 12, 0, &growth_normal()),
            Err(EngineError::InvalidTrialCount {
                requested: 0,
                max: None
            })
        ));
    }

    #[test]
    fn test_invalid_distribution_rejected_before_running() {
        let dists = ParameterDistributions::new().with(
            ParamPath::RevenueGrowth,
            SamplingRule::Uniform {
                low: 0.1,
                high: 0.0,
            },
        );
        let progress = SimulationProgress::new();
        let config = MonteCarloConfig {
            trials: 10,
            seed: Some(1),
            ..MonteCarloConfig::default()
        };
        let result = simulate_with_progress(&base(), 12, &dists, &config, &progress);
        assert!(matches!(result, Err(EngineError::InvalidDistribution { .. })));
        assert_eq!(progress.completed(), 0);
    }

    #[test]
    fn test_seed_is_recorded() {
        let result = simulate(&base(), 6, 20, &growth_normal()).unwrap();
        let config = MonteCarloConfig {
            trials: 20,
            seed: Some(result.seed),
            ..MonteCarloConfig::default()
        };
        let again = simulate_with_progress(
            &base(),
            6,
            &growth_normal(),
            &config,
            &SimulationProgress::new(),
        )
        .unwrap();
        assert_eq!(result, again);
    }

    #[test]
    fn test_ruin_is_cumulative() {
        let config = MonteCarloConfig {
            trials: 200,
            seed: Some(9),
            ..MonteCarloConfig::default()
        };
        let result = simulate_with_progress(
            &base(),
            24,
            &growth_normal(),
            &config,
            &SimulationProgress::new(),
        )
        .unwrap();
        let ruin = &result.risk.ruin_by_period;
        assert_eq!(ruin.len(), 24);
        assert!(ruin.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(result.risk.probability_of_ruin, ruin[23]);
        assert!(result.risk.probability_of_ruin > 0.0);
    }
}
