//! Forecasting inputs and outputs

use std::fmt;

use serde::{Deserialize, Serialize};

/// Forecasting method. `Auto` picks among the concrete methods by hold-out error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    #[default]
    Auto,
    Trend,
    Seasonal,
    Arima,
}

impl ForecastMethod {
    /// Concrete methods in order of increasing complexity (tie-break order)
    pub const CANDIDATES: [ForecastMethod; 3] = [
        ForecastMethod::Trend,
        ForecastMethod::Seasonal,
        ForecastMethod::Arima,
    ];
}

impl fmt::Display for ForecastMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ForecastMethod::Auto => "auto",
            ForecastMethod::Trend => "trend",
            ForecastMethod::Seasonal => "seasonal",
            ForecastMethod::Arima => "arima",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ForecastMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(ForecastMethod::Auto),
            "trend" => Ok(ForecastMethod::Trend),
            "seasonal" => Ok(ForecastMethod::Seasonal),
            "arima" => Ok(ForecastMethod::Arima),
            other => Err(format!("unknown forecast method: {other}")),
        }
    }
}

fn default_season_length() -> usize {
    12
}

fn default_confidence_level() -> f64 {
    0.95
}

/// Tuning knobs shared by `forecast` and `backtest`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastOptions {
    /// Periods per seasonal cycle
    #[serde(default = "default_season_length")]
    pub season_length: usize,
    /// Two-sided confidence level for bands: 0.80, 0.90, 0.95 or 0.99
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
    /// Points held out when `Auto` compares methods; defaults to n / 5
    #[serde(default)]
    pub holdout: Option<usize>,
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            season_length: default_season_length(),
            confidence_level: default_confidence_level(),
            holdout: None,
        }
    }
}

/// Forecast accuracy against known actuals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    /// Mean absolute percentage error in percent, over non-zero actuals only.
    /// `None` when every actual is zero.
    pub mape: Option<f64>,
    pub rmse: f64,
    pub mae: f64,
    /// Points that contributed to RMSE and MAE
    pub points: usize,
}

/// Error used to rank competing methods. Methods are only ever ranked on the
/// same actuals, so one metric applies to all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMetric {
    Mape,
    Mae,
}

impl RankingMetric {
    /// MAPE when every actual is non-zero, so it covers every compared point;
    /// MAE otherwise
    pub fn for_actuals<'a>(actuals: impl IntoIterator<Item = &'a f64>) -> Self {
        if actuals.into_iter().all(|&a| a != 0.0) {
            RankingMetric::Mape
        } else {
            RankingMetric::Mae
        }
    }

    #[must_use]
    pub fn score(self, metrics: &AccuracyMetrics) -> f64 {
        match self {
            RankingMetric::Mape => metrics.mape.unwrap_or(metrics.mae),
            RankingMetric::Mae => metrics.mae,
        }
    }
}

/// A fitted forecast with symmetric confidence bands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub method: ForecastMethod,
    pub values: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub confidence_level: f64,
    /// Standard deviation of in-sample one-step residuals
    pub residual_std: f64,
    /// Hold-out or backtest accuracy, when evaluated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<AccuracyMetrics>,
}

/// Walk-forward results for one method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodBacktest {
    pub method: ForecastMethod,
    pub folds_evaluated: usize,
    /// Folds skipped because the method could not fit the data before them
    pub folds_skipped: usize,
    pub metrics: Option<AccuracyMetrics>,
}

/// Walk-forward validation across all candidate methods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub window: usize,
    pub folds: usize,
    pub methods: Vec<MethodBacktest>,
    pub best_method: ForecastMethod,
    /// Metric `best_method` was chosen by; `None` when no method fitted any fold
    pub ranked_by: Option<RankingMetric>,
    /// Folds every ranked method evaluated; the ranking uses only these
    pub ranked_folds: usize,
}

impl BacktestResult {
    #[must_use]
    pub fn method(&self, method: ForecastMethod) -> Option<&MethodBacktest> {
        self.methods.iter().find(|m| m.method == method)
    }
}

/// Ordered historical actuals for one metric of one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSeries {
    pub metric: String,
    pub values: Vec<f64>,
}
