//! Scenario overrides and comparison records

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::assumptions::ParamPath;
use super::ids::{ModelId, ScenarioRunId};
use super::projection::ProjectionResult;
use crate::error::EngineError;

/// Suffix marking a string override key as relative (`revenue.growth:delta`)
pub const DELTA_SUFFIX: &str = ":delta";

/// How an override changes one parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOp {
    /// Replace the value
    Set(f64),
    /// Add to the baseline value (every month for schedules)
    Delta(f64),
    /// Replace with a month-indexed schedule
    Schedule(Vec<f64>),
}

/// Partial patch over an assumption set, applied in path order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Override {
    pub patches: BTreeMap<ParamPath, PatchOp>,
}

impl Override {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, path: ParamPath, value: f64) -> Self {
        self.patches.insert(path, PatchOp::Set(value));
        self
    }

    #[must_use]
    pub fn delta(mut self, path: ParamPath, delta: f64) -> Self {
        self.patches.insert(path, PatchOp::Delta(delta));
        self
    }

    #[must_use]
    pub fn schedule(mut self, path: ParamPath, values: Vec<f64>) -> Self {
        self.patches.insert(path, PatchOp::Schedule(values));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Parse a flat `key = value` entry. Keys ending in `:delta` are relative.
    pub fn parse_entry(key: &str, value: f64) -> Result<(ParamPath, PatchOp), EngineError> {
        match key.strip_suffix(DELTA_SUFFIX) {
            Some(path) => Ok((path.parse()?, PatchOp::Delta(value))),
            None => Ok((key.parse()?, PatchOp::Set(value))),
        }
    }

    /// Build an override from flat entries such as `("costs.payroll", 80_000.0)`
    /// and `("revenue.growth:delta", 0.02)`.
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = (&'a str, f64)>,
    ) -> Result<Self, EngineError> {
        let mut patches = BTreeMap::new();
        for (key, value) in entries {
            let (path, op) = Self::parse_entry(key, value)?;
            patches.insert(path, op);
        }
        Ok(Self { patches })
    }
}

/// Metrics compared between a scenario and its baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaMetric {
    FinalRevenue,
    CumulativeRevenue,
    FinalArr,
    EndingCash,
    FinalCustomers,
    RunwayMonths,
}

impl DeltaMetric {
    pub const ALL: [DeltaMetric; 6] = [
        DeltaMetric::FinalRevenue,
        DeltaMetric::CumulativeRevenue,
        DeltaMetric::FinalArr,
        DeltaMetric::EndingCash,
        DeltaMetric::FinalCustomers,
        DeltaMetric::RunwayMonths,
    ];

    /// Value of this metric for a projection. Runway is `None` when indefinite.
    #[must_use]
    pub fn value(self, projection: &ProjectionResult) -> Option<f64> {
        let last = projection.last();
        match self {
            DeltaMetric::FinalRevenue => last.map(|m| m.revenue),
            DeltaMetric::CumulativeRevenue => Some(projection.total_revenue()),
            DeltaMetric::FinalArr => last.map(|m| m.arr),
            DeltaMetric::EndingCash => last.map(|m| m.cash_balance),
            DeltaMetric::FinalCustomers => last.map(|m| m.customers),
            DeltaMetric::RunwayMonths => projection.runway.months().map(f64::from),
        }
    }
}

/// Baseline vs scenario comparison for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub metric: DeltaMetric,
    pub baseline: Option<f64>,
    pub scenario: Option<f64>,
    pub absolute_delta: Option<f64>,
    /// Percent change relative to the baseline; `None` when the baseline is zero
    pub percent_delta: Option<f64>,
}

impl MetricDelta {
    #[must_use]
    pub fn compare(
        metric: DeltaMetric,
        baseline: &ProjectionResult,
        scenario: &ProjectionResult,
    ) -> Self {
        let b = metric.value(baseline);
        let s = metric.value(scenario);
        let absolute_delta = b.zip(s).map(|(b, s)| s - b);
        let percent_delta = b
            .zip(absolute_delta)
            .filter(|(b, _)| *b != 0.0)
            .map(|(b, d)| d / b.abs() * 100.0);
        Self {
            metric,
            baseline: b,
            scenario: s,
            absolute_delta,
            percent_delta,
        }
    }
}

/// A completed scenario comparison. Written once by the job that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRun {
    pub id: ScenarioRunId,
    pub baseline_model_id: ModelId,
    pub horizon: u32,
    #[serde(rename = "override")]
    pub patch: Override,
    pub projection: ProjectionResult,
    pub deltas: Vec<MetricDelta>,
}

impl ScenarioRun {
    #[must_use]
    pub fn delta(&self, metric: DeltaMetric) -> Option<&MetricDelta> {
        self.deltas.iter().find(|d| d.metric == metric)
    }
}
