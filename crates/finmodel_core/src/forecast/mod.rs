//! Forecasting Engine
//!
//! Pure functions over a historical series: fit a method, extend it with
//! confidence bands, and walk-forward validate every method against history.

use crate::error::{EngineError, Result};
use crate::model::{
    AccuracyMetrics, ForecastMethod, ForecastOptions, ForecastResult, RankingMetric,
};

mod accuracy;
mod backtest;
mod methods;

pub use accuracy::{ErrorAccumulator, accuracy};
pub use backtest::backtest;
pub use methods::{Fitted, Model, fit, min_points};

/// Scores closer than this are treated as a tie
const SCORE_TOLERANCE: f64 = 1e-9;

/// Two-sided normal quantile for a supported confidence level
pub fn z_value(confidence_level: f64) -> Result<f64> {
    const LEVELS: [(f64, f64); 4] = [
        (0.80, 1.281_551_565_5),
        (0.90, 1.644_853_626_9),
        (0.95, 1.959_963_984_5),
        (0.99, 2.575_829_303_5),
    ];
    LEVELS
        .iter()
        .find(|(level, _)| (level - confidence_level).abs() < 1e-9)
        .map(|(_, z)| *z)
        .ok_or(EngineError::InvalidParameter {
            path: "confidence_level".into(),
            value: confidence_level,
            reason: "supported levels are 0.80, 0.90, 0.95 and 0.99",
        })
}

fn check_history(history: &[f64]) -> Result<()> {
    match history.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(EngineError::InternalComputationError(format!(
            "history value {} at index {i} is not finite",
            history[i]
        ))),
        None => Ok(()),
    }
}

/// Forecast `steps` periods past the end of `history`
pub fn forecast(
    history: &[f64],
    steps: usize,
    method: ForecastMethod,
    options: &ForecastOptions,
) -> Result<ForecastResult> {
    check_history(history)?;
    if steps == 0 {
        return Err(EngineError::InvalidHorizon(0));
    }
    let z = z_value(options.confidence_level)?;

    let (fitted, metrics) = match method {
        ForecastMethod::Auto => select_method(history, options)?,
        concrete => (fit(concrete, history, options.season_length)?, None),
    };

    let values = fitted.predict(steps);
    let (lower, upper) = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let half_width = z * fitted.residual_std * ((i + 1) as f64).sqrt();
            (v - half_width, v + half_width)
        })
        .unzip();

    Ok(ForecastResult {
        method: fitted.method(),
        values,
        lower,
        upper,
        confidence_level: options.confidence_level,
        residual_std: fitted.residual_std,
        metrics,
    })
}

/// Pick the candidate with the lowest hold-out score and refit it on the full history
fn select_method(
    history: &[f64],
    options: &ForecastOptions,
) -> Result<(Fitted, Option<AccuracyMetrics>)> {
    let n = history.len();
    let trend_min = min_points(ForecastMethod::Trend, options.season_length);
    if n <= trend_min {
        // Too short to hold anything out
        return Ok((fit(ForecastMethod::Trend, history, options.season_length)?, None));
    }

    let holdout = options
        .holdout
        .unwrap_or(n / 5)
        .clamp(1, n - trend_min);
    let (head, tail) = history.split_at(n - holdout);
    let ranking = RankingMetric::for_actuals(tail);

    let mut best: Option<(ForecastMethod, AccuracyMetrics)> = None;
    for method in ForecastMethod::CANDIDATES {
        let Ok(fitted) = fit(method, head, options.season_length) else {
            continue;
        };
        let Some(metrics) = accuracy(tail, &fitted.predict(holdout)) else {
            continue;
        };
        let better = match &best {
            None => true,
            Some((_, current)) => {
                ranking.score(&metrics) < ranking.score(current) - SCORE_TOLERANCE
            }
        };
        if better {
            best = Some((method, metrics));
        }
    }

    match best {
        Some((method, metrics)) => {
            tracing::debug!(
                %method,
                score = ranking.score(&metrics),
                ?ranking,
                holdout,
                "forecast method selected"
            );
            Ok((fit(method, history, options.season_length)?, Some(metrics)))
        }
        None => Err(EngineError::InsufficientHistory {
            method: ForecastMethod::Auto,
            required: trend_min + 1,
            actual: n,
        }),
    }
}
