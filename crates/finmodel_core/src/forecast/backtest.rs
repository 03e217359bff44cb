//! Walk-forward validation

use std::cmp::Reverse;

use super::accuracy::ErrorAccumulator;
use super::methods::fit;
use super::{SCORE_TOLERANCE, check_history};
use crate::error::{EngineError, Result};
use crate::model::{
    BacktestResult, ForecastMethod, ForecastOptions, MethodBacktest, RankingMetric,
};

/// One method's predictions per fold; `None` where it could not be fitted
type FoldPredictions = Vec<Option<Vec<f64>>>;

/// Walk-forward backtest of every candidate method.
///
/// Folds start at `window` and advance by `window` while a full fold fits. For
/// each fold a method is fitted on all data before the fold and asked to
/// predict it; errors are pooled per method across folds.
pub fn backtest(
    history: &[f64],
    window: usize,
    options: &ForecastOptions,
) -> Result<BacktestResult> {
    check_history(history)?;
    if window == 0 {
        return Err(EngineError::InvalidParameter {
            path: "window".into(),
            value: 0.0,
            reason: "window must be at least one period",
        });
    }
    let n = history.len();
    if n < 2 * window {
        return Err(EngineError::InsufficientHistory {
            method: ForecastMethod::Auto,
            required: 2 * window,
            actual: n,
        });
    }

    let fold_starts: Vec<usize> = (window..)
        .step_by(window)
        .take_while(|start| start + window <= n)
        .collect();

    let runs: Vec<(ForecastMethod, FoldPredictions)> = ForecastMethod::CANDIDATES
        .into_iter()
        .map(|method| {
            let predictions = fold_starts
                .iter()
                .map(|&start| {
                    fit(method, &history[..start], options.season_length)
                        .ok()
                        .map(|fitted| fitted.predict(window))
                })
                .collect();
            (method, predictions)
        })
        .collect();

    let methods = runs
        .iter()
        .map(|(method, predictions)| {
            let mut errors = ErrorAccumulator::default();
            for (&start, predicted) in fold_starts.iter().zip(predictions) {
                if let Some(predicted) = predicted {
                    errors.extend(&history[start..start + window], predicted);
                }
            }
            let evaluated = predictions.iter().flatten().count();
            MethodBacktest {
                method: *method,
                folds_evaluated: evaluated,
                folds_skipped: predictions.len() - evaluated,
                metrics: errors.finish(),
            }
        })
        .collect();

    let ranking = rank(history, window, &fold_starts, &runs);
    Ok(BacktestResult {
        window,
        folds: fold_starts.len(),
        methods,
        // Nothing could be fitted at all: fall back to the simplest method
        best_method: ranking.map_or(ForecastMethod::Trend, |r| r.0),
        ranked_by: ranking.map(|r| r.1),
        ranked_folds: ranking.map_or(0, |r| r.2),
    })
}

/// Choose the best method on the folds every contender evaluated.
///
/// When the contenders share no fold, the one with the fewest evaluated folds
/// drops out (the most complex first on ties) and the rest are compared again.
/// Ties in score go to the simpler method.
fn rank(
    history: &[f64],
    window: usize,
    fold_starts: &[usize],
    runs: &[(ForecastMethod, FoldPredictions)],
) -> Option<(ForecastMethod, RankingMetric, usize)> {
    let mut contenders: Vec<&(ForecastMethod, FoldPredictions)> = runs
        .iter()
        .filter(|(_, predictions)| predictions.iter().any(Option::is_some))
        .collect();

    loop {
        let shared: Vec<usize> = (0..fold_starts.len())
            .filter(|&i| contenders.iter().all(|(_, p)| p[i].is_some()))
            .collect();
        if shared.is_empty() {
            let (weakest, _) = contenders
                .iter()
                .enumerate()
                .min_by_key(|(i, (_, p))| (p.iter().flatten().count(), Reverse(*i)))?;
            contenders.remove(weakest);
            continue;
        }

        let actual = |i: usize| &history[fold_starts[i]..fold_starts[i] + window];
        let metric = RankingMetric::for_actuals(shared.iter().flat_map(|&i| actual(i)));

        let mut best: Option<(ForecastMethod, f64)> = None;
        for (method, predictions) in &contenders {
            let mut errors = ErrorAccumulator::default();
            for &i in &shared {
                if let Some(predicted) = &predictions[i] {
                    errors.extend(actual(i), predicted);
                }
            }
            let Some(metrics) = errors.finish() else {
                continue;
            };
            let score = metric.score(&metrics);
            if best.is_none_or(|(_, s)| score < s - SCORE_TOLERANCE) {
                best = Some((*method, score));
            }
        }
        return best.map(|(method, _)| (method, metric, shared.len()));
    }
}
