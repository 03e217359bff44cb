//! Fitted forecasting models
//!
//! - Trend: ordinary least squares line over the period index
//! - Seasonal: the same trend plus additive seasonal indices that sum to zero
//! - Arima: ARIMA(1,1,0), an AR(1) with intercept fitted by OLS on first differences

use crate::error::{EngineError, Result};
use crate::model::ForecastMethod;

const TREND_MIN_POINTS: usize = 3;
const ARIMA_MIN_POINTS: usize = 5;
/// Keeps the AR coefficient stationary so long horizons cannot explode
const MAX_AR_COEFFICIENT: f64 = 0.99;

/// Minimum history length for `method`
#[must_use]
pub fn min_points(method: ForecastMethod, season_length: usize) -> usize {
    match method {
        ForecastMethod::Trend | ForecastMethod::Auto => TREND_MIN_POINTS,
        ForecastMethod::Seasonal => (2 * season_length).max(TREND_MIN_POINTS),
        ForecastMethod::Arima => ARIMA_MIN_POINTS,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Model {
    Trend {
        intercept: f64,
        slope: f64,
        n: usize,
    },
    Seasonal {
        intercept: f64,
        slope: f64,
        n: usize,
        /// Indexed by `t % season_length`
        indices: Vec<f64>,
    },
    Arima {
        constant: f64,
        phi: f64,
        last_level: f64,
        last_diff: f64,
    },
}

/// A model together with its in-sample one-step residual spread
#[derive(Debug, Clone, PartialEq)]
pub struct Fitted {
    pub model: Model,
    pub residual_std: f64,
}

impl Fitted {
    pub fn method(&self) -> ForecastMethod {
        match self.model {
            Model::Trend { .. } => ForecastMethod::Trend,
            Model::Seasonal { .. } => ForecastMethod::Seasonal,
            Model::Arima { .. } => ForecastMethod::Arima,
        }
    }

    /// Point forecasts for the next `steps` periods
    #[must_use]
    pub fn predict(&self, steps: usize) -> Vec<f64> {
        match &self.model {
            Model::Trend {
                intercept,
                slope,
                n,
            } => (0..steps)
                .map(|h| intercept + slope * (n + h) as f64)
                .collect(),
            Model::Seasonal {
                intercept,
                slope,
                n,
                indices,
            } => (0..steps)
                .map(|h| {
                    let t = n + h;
                    intercept + slope * t as f64 + indices[t % indices.len()]
                })
                .collect(),
            Model::Arima {
                constant,
                phi,
                last_level,
                last_diff,
            } => {
                let mut level = *last_level;
                let mut diff = *last_diff;
                (0..steps)
                    .map(|_| {
                        diff = constant + phi * diff;
                        level += diff;
                        level
                    })
                    .collect()
            }
        }
    }
}

/// Fit `method` to `history`. `Auto` is not a concrete method and is rejected.
pub fn fit(method: ForecastMethod, history: &[f64], season_length: usize) -> Result<Fitted> {
    let required = min_points(method, season_length);
    if history.len() < required {
        return Err(EngineError::InsufficientHistory {
            method,
            required,
            actual: history.len(),
        });
    }
    match method {
        ForecastMethod::Trend => Ok(fit_trend(history)),
        ForecastMethod::Seasonal => fit_seasonal(history, season_length),
        ForecastMethod::Arima => Ok(fit_arima(history)),
        ForecastMethod::Auto => Err(EngineError::InternalComputationError(
            "auto must be resolved to a concrete method before fitting".into(),
        )),
    }
}

/// OLS of `ys` on `xs`: (intercept, slope). A constant `xs` gives a flat line.
fn ols(xs: impl Iterator<Item = f64> + Clone, ys: &[f64]) -> (f64, f64) {
    let n = ys.len() as f64;
    let x_mean = xs.clone().sum::<f64>() / n;
    let y_mean = ys.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (x, y) in xs.zip(ys) {
        sxy += (x - x_mean) * (y - y_mean);
        sxx += (x - x_mean) * (x - x_mean);
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    (y_mean - slope * x_mean, slope)
}

fn index(n: usize) -> impl Iterator<Item = f64> + Clone {
    (0..n).map(|t| t as f64)
}

fn residual_std(residuals: impl Iterator<Item = f64>, params: usize) -> f64 {
    let (count, sq) = residuals.fold((0usize, 0.0), |(c, s), r| (c + 1, s + r * r));
    let dof = if count > params { count - params } else { count.max(1) };
    (sq / dof as f64).sqrt()
}

fn fit_trend(history: &[f64]) -> Fitted {
    let n = history.len();
    let (intercept, slope) = ols(index(n), history);
    let residuals = history
        .iter()
        .enumerate()
        .map(|(t, y)| y - (intercept + slope * t as f64));
    Fitted {
        residual_std: residual_std(residuals, 2),
        model: Model::Trend {
            intercept,
            slope,
            n,
        },
    }
}

fn fit_seasonal(history: &[f64], season_length: usize) -> Result<Fitted> {
    if season_length < 2 {
        return Err(EngineError::InvalidParameter {
            path: "season_length".into(),
            value: season_length as f64,
            reason: "a season needs at least two periods",
        });
    }
    let n = history.len();
    let (intercept, slope) = ols(index(n), history);
    let detrended: Vec<f64> = history
        .iter()
        .enumerate()
        .map(|(t, y)| y - (intercept + slope * t as f64))
        .collect();

    let mut sums = vec![0.0; season_length];
    let mut counts = vec![0usize; season_length];
    for (t, e) in detrended.iter().enumerate() {
        sums[t % season_length] += e;
        counts[t % season_length] += 1;
    }
    let mut indices: Vec<f64> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &c)| s / c as f64)
        .collect();
    let mean = indices.iter().sum::<f64>() / season_length as f64;
    indices.iter_mut().for_each(|s| *s -= mean);

    let residuals = detrended
        .iter()
        .enumerate()
        .map(|(t, e)| e - indices[t % season_length]);
    Ok(Fitted {
        residual_std: residual_std(residuals, 1 + season_length),
        model: Model::Seasonal {
            intercept,
            slope,
            n,
            indices,
        },
    })
}

fn fit_arima(history: &[f64]) -> Fitted {
    let diffs: Vec<f64> = history.windows(2).map(|w| w[1] - w[0]).collect();
    let lagged = &diffs[..diffs.len() - 1];
    let current = &diffs[1..];
    let (constant, phi) = ols(lagged.iter().copied(), current);
    let phi = phi.clamp(-MAX_AR_COEFFICIENT, MAX_AR_COEFFICIENT);
    // Re-centre the intercept after clamping
    let constant = if phi == 0.0 {
        constant
    } else {
        let lag_mean = lagged.iter().sum::<f64>() / lagged.len() as f64;
        let cur_mean = current.iter().sum::<f64>() / current.len() as f64;
        cur_mean - phi * lag_mean
    };

    let residuals = lagged
        .iter()
        .zip(current)
        .map(|(prev, d)| d - (constant + phi * prev));
    Fitted {
        residual_std: residual_std(residuals, 2),
        model: Model::Arima {
            constant,
            phi,
            last_level: history[history.len() - 1],
            last_diff: diffs[diffs.len() - 1],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_recovers_line() {
        let ys: Vec<f64> = (0..10).map(|t| 5.0 + 3.0 * t as f64).collect();
        let fitted = fit(ForecastMethod::Trend, &ys, 12).unwrap();
        let next = fitted.predict(2);
        assert!((next[0] - 35.0).abs() < 1e-9);
        assert!((next[1] - 38.0).abs() < 1e-9);
        assert!(fitted.residual_std < 1e-9);
    }

    #[test]
    fn test_seasonal_indices_sum_to_zero_and_repeat() {
        // Orthogonal to the period index, so the trend fit is exact
        let pattern = [5.0, -10.0, 5.0, 0.0];
        let ys: Vec<f64> = (0..12)
            .map(|t| 100.0 + 2.0 * t as f64 + pattern[t % 4])
            .collect();
        let fitted = fit(ForecastMethod::Seasonal, &ys, 4).unwrap();
        match &fitted.model {
            Model::Seasonal { indices, .. } => {
                assert!(indices.iter().sum::<f64>().abs() < 1e-9);
            }
            other => panic!("unexpected {other:?}"),
        }
        let next = fitted.predict(4);
        for (h, value) in next.iter().enumerate() {
            let t = 12 + h;
            let expected = 100.0 + 2.0 * t as f64 + pattern[t % 4];
            assert!((value - expected).abs() < 1e-6, "h={h}: {value} vs {expected}");
        }
    }

    #[test]
    fn test_arima_continues_constant_growth() {
        let ys: Vec<f64> = (0..8).map(|t| 50.0 + 4.0 * t as f64).collect();
        let fitted = fit(ForecastMethod::Arima, &ys, 12).unwrap();
        let next = fitted.predict(3);
        assert!((next[0] - 82.0).abs() < 1e-9);
        assert!((next[2] - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_minimum_lengths() {
        assert!(matches!(
            fit(ForecastMethod::Trend, &[1.0, 2.0], 12),
            Err(EngineError::InsufficientHistory { required: 3, actual: 2, .. })
        ));
        assert!(matches!(
            fit(ForecastMethod::Seasonal, &[1.0; 10], 6),
            Err(EngineError::InsufficientHistory { required: 12, .. })
        ));
        assert!(matches!(
            fit(ForecastMethod::Arima, &[1.0; 4], 12),
            Err(EngineError::InsufficientHistory { required: 5, .. })
        ));
    }
}
