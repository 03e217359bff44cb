//! Forecast error metrics

use crate::model::AccuracyMetrics;

/// Running totals for MAPE, RMSE and MAE, pooled across any number of folds
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorAccumulator {
    abs_pct_sum: f64,
    pct_points: usize,
    sq_sum: f64,
    abs_sum: f64,
    points: usize,
}

impl ErrorAccumulator {
    pub fn push(&mut self, actual: f64, predicted: f64) {
        let err = actual - predicted;
        self.sq_sum += err * err;
        self.abs_sum += err.abs();
        self.points += 1;
        // MAPE is undefined at zero actuals; those points only count toward RMSE/MAE
        if actual != 0.0 {
            self.abs_pct_sum += (err / actual).abs();
            self.pct_points += 1;
        }
    }

    pub fn extend(&mut self, actual: &[f64], predicted: &[f64]) {
        for (&a, &p) in actual.iter().zip(predicted) {
            self.push(a, p);
        }
    }

    /// `None` until at least one point was pushed
    #[must_use]
    pub fn finish(&self) -> Option<AccuracyMetrics> {
        if self.points == 0 {
            return None;
        }
        let n = self.points as f64;
        Some(AccuracyMetrics {
            mape: (self.pct_points > 0).then(|| self.abs_pct_sum / self.pct_points as f64 * 100.0),
            rmse: (self.sq_sum / n).sqrt(),
            mae: self.abs_sum / n,
            points: self.points,
        })
    }
}

/// Accuracy of `predicted` against `actual`, pairwise
#[must_use]
pub fn accuracy(actual: &[f64], predicted: &[f64]) -> Option<AccuracyMetrics> {
    let mut acc = ErrorAccumulator::default();
    acc.extend(actual, predicted);
    acc.finish()
}
