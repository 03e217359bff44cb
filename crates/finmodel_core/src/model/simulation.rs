//! Monte Carlo configuration and result types

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rand::Rng;
use rand::distr::Uniform;
use rand_distr::{Distribution, LogNormal, Normal, StudentT, Triangular};
use serde::{Deserialize, Serialize};

use super::assumptions::ParamPath;
use crate::error::EngineError;

/// Sampling rule for one uncertain parameter. Each sample replaces the
/// parameter's value for the whole trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SamplingRule {
    Normal {
        mean: f64,
        std_dev: f64,
    },
    /// `mean` and `std_dev` are those of the underlying normal distribution
    LogNormal {
        mean: f64,
        std_dev: f64,
    },
    /// Student's t for fat-tailed parameters.
    /// - `mean`: location
    /// - `scale`: scale applied to the standard t variate
    /// - `df`: degrees of freedom (lower = fatter tails)
    StudentT {
        mean: f64,
        scale: f64,
        df: f64,
    },
    Uniform {
        low: f64,
        high: f64,
    },
    Triangular {
        min: f64,
        mode: f64,
        max: f64,
    },
}

impl SamplingRule {
    /// Validate parameters and build a ready-to-use sampler
    pub fn sampler(&self, path: &ParamPath) -> Result<Sampler, EngineError> {
        let invalid = |reason: String| EngineError::InvalidDistribution {
            path: path.to_string(),
            reason,
        };
        match *self {
            SamplingRule::Normal { mean, std_dev } => Normal::new(mean, std_dev)
                .map(Sampler::Normal)
                .map_err(|e| invalid(format!("normal(mean={mean}, std_dev={std_dev}): {e}"))),
            SamplingRule::LogNormal { mean, std_dev } => LogNormal::new(mean, std_dev)
                .map(Sampler::LogNormal)
                .map_err(|e| invalid(format!("lognormal(mean={mean}, std_dev={std_dev}): {e}"))),
            SamplingRule::StudentT { mean, scale, df } => {
                if !(scale.is_finite() && scale >= 0.0 && mean.is_finite()) {
                    return Err(invalid(format!(
                        "student_t(mean={mean}, scale={scale}): scale must be non-negative and finite"
                    )));
                }
                StudentT::new(df)
                    .map(|dist| Sampler::StudentT { dist, mean, scale })
                    .map_err(|e| invalid(format!("student_t(df={df}): {e}")))
            }
            SamplingRule::Uniform { low, high } => Uniform::new(low, high)
                .map(Sampler::Uniform)
                .map_err(|e| invalid(format!("uniform(low={low}, high={high}): {e}"))),
            SamplingRule::Triangular { min, mode, max } => Triangular::new(min, max, mode)
                .map(Sampler::Triangular)
                .map_err(|e| invalid(format!("triangular(min={min}, mode={mode}, max={max}): {e}"))),
        }
    }
}

/// A validated sampling rule
#[derive(Debug, Clone)]
pub enum Sampler {
    Normal(Normal<f64>),
    LogNormal(LogNormal<f64>),
    StudentT {
        dist: StudentT<f64>,
        mean: f64,
        scale: f64,
    },
    Uniform(Uniform<f64>),
    Triangular(Triangular<f64>),
}

impl Sampler {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Sampler::Normal(d) => d.sample(rng),
            Sampler::LogNormal(d) => d.sample(rng),
            Sampler::StudentT { dist, mean, scale } => mean + scale * dist.sample(rng),
            Sampler::Uniform(d) => d.sample(rng),
            Sampler::Triangular(d) => d.sample(rng),
        }
    }
}

/// Uncertain parameters and how to sample them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterDistributions {
    pub rules: BTreeMap<ParamPath, SamplingRule>,
}

impl ParameterDistributions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, path: ParamPath, rule: SamplingRule) -> Self {
        self.rules.insert(path, rule);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Per-period metrics aggregated across trials
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimMetric {
    Revenue,
    Arr,
    CashBalance,
    Customers,
}

impl SimMetric {
    pub const ALL: [SimMetric; 4] = [
        SimMetric::Revenue,
        SimMetric::Arr,
        SimMetric::CashBalance,
        SimMetric::Customers,
    ];
}

/// p5 / p25 / p50 / p75 / p95 summary of a distribution of outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PercentileBand {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

impl PercentileBand {
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        self.p5 <= self.p25 && self.p25 <= self.p50 && self.p50 <= self.p75 && self.p75 <= self.p95
    }
}

/// Percentile band for a single projected month
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodBand {
    pub period: u32,
    #[serde(flatten)]
    pub band: PercentileBand,
}

/// Downside risk measures across valid trials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// Share of trials whose cash balance goes negative at any point
    pub probability_of_ruin: f64,
    /// Cumulative share of trials ruined by each period (index 0 = month 1)
    pub ruin_by_period: Vec<f64>,
    /// Distribution of each trial's lowest cash balance
    pub min_cash: PercentileBand,
    /// Distribution of closing cash in the final month
    pub ending_cash: PercentileBand,
}

/// Aggregated outcome of a Monte Carlo run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Seed that reproduces this result
    pub seed: u64,
    pub horizon: u32,
    pub trial_count: usize,
    pub valid_trials: usize,
    /// Trials whose projection failed and were left out of aggregation
    pub excluded_trials: usize,
    /// Set whenever any trial was excluded
    pub warning: bool,
    pub bands: BTreeMap<SimMetric, Vec<PeriodBand>>,
    pub risk: RiskMetrics,
}

impl SimulationResult {
    #[must_use]
    pub fn band(&self, metric: SimMetric, period: u32) -> Option<&PercentileBand> {
        self.bands
            .get(&metric)
            .and_then(|bands| bands.iter().find(|b| b.period == period))
            .map(|b| &b.band)
    }
}

fn default_trials() -> usize {
    1_000
}

fn default_max_excluded_fraction() -> f64 {
    0.5
}

fn default_batch_size() -> usize {
    100
}

/// Monte Carlo run settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    #[serde(default = "default_trials")]
    pub trials: usize,
    /// Fixed seed for reproducible runs; a fresh seed is drawn and recorded when absent
    #[serde(default)]
    pub seed: Option<u64>,
    /// Fail the run when more than this share of trials is excluded
    #[serde(default = "default_max_excluded_fraction")]
    pub max_excluded_fraction: f64,
    /// Trials per RNG batch. Changing it changes which sub-seed each trial gets.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            trials: default_trials(),
            seed: None,
            max_excluded_fraction: default_max_excluded_fraction(),
            batch_size: default_batch_size(),
        }
    }
}

impl MonteCarloConfig {
    /// Reject settings that would silently disable the exclusion check
    pub fn validate(&self) -> Result<(), EngineError> {
        let fraction = self.max_excluded_fraction;
        if !(0.0..=1.0).contains(&fraction) {
            return Err(EngineError::InvalidParameter {
                path: "max_excluded_fraction".into(),
                value: fraction,
                reason: "must be a fraction between 0 and 1",
            });
        }
        Ok(())
    }
}

/// Shared progress and cancellation state for a running simulation
#[derive(Debug, Clone, Default)]
pub struct SimulationProgress {
    completed: Arc<AtomicUsize>,
    cancelled: Arc<AtomicBool>,
}

impl SimulationProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Share counters owned by a job controller
    pub fn from_atomics(completed: Arc<AtomicUsize>, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            completed,
            cancelled,
        }
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn increment(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn test_invalid_rules_are_rejected() {
        let path = ParamPath::RevenueGrowth;
        let bad = [
            SamplingRule::Normal {
                mean: 0.0,
                std_dev: -1.0,
            },
            SamplingRule::Uniform {
                low: 1.0,
                high: 0.5,
            },
            SamplingRule::Triangular {
                min: 0.0,
                mode: 2.0,
                max: 1.0,
            },
            SamplingRule::StudentT {
                mean: 0.0,
                scale: 1.0,
                df: 0.0,
            },
        ];
        for rule in bad {
            assert!(
                matches!(rule.sampler(&path), Err(EngineError::InvalidDistribution { .. })),
                "{rule:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_uniform_samples_stay_in_bounds() {
        let sampler = SamplingRule::Uniform {
            low: 0.02,
            high: 0.04,
        }
        .sampler(&ParamPath::CustomersChurn)
        .unwrap();
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let x = sampler.sample(&mut rng);
            assert!((0.02..0.04).contains(&x));
        }
    }

    #[test]
    fn test_sampling_rule_serde_is_tagged() {
        let rule: SamplingRule =
            serde_json::from_str(r#"{"type":"Normal","mean":0.08,"std_dev":0.02}"#).unwrap();
        assert_eq!(
            rule,
            SamplingRule::Normal {
                mean: 0.08,
                std_dev: 0.02
            }
        );
    }

    #[test]
    fn test_band_ordering_check() {
        let band = PercentileBand {
            p5: 1.0,
            p25: 2.0,
            p50: 2.0,
            p75: 3.0,
            p95: 4.0,
        };
        assert!(band.is_ordered());
        assert!(
            !PercentileBand {
                p25: 5.0,
                ..band
            }
            .is_ordered()
        );
    }
}
