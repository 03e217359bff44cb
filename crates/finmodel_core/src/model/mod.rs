mod assumptions;
mod forecast;
mod ids;
mod job;
mod projection;
mod scenario;
mod simulation;

pub use assumptions::{
    AssumptionSet, CashAssumptions, CostAssumptions, CostLine, CustomerAssumptions, FormulaSet,
    Param, ParamPath, RevenueAssumptions, Slot,
};
pub use forecast::{
    AccuracyMetrics, BacktestResult, ForecastMethod, ForecastOptions, ForecastResult,
    HistoricalSeries, MethodBacktest, RankingMetric,
};
pub use ids::{JobId, ModelId, ScenarioRunId};
pub use job::{Job, JobKind, JobOutput, JobRequest, JobStatus, ResultRef, Transition};
pub use projection::{MonthRecord, ProjectionResult, Runway};
pub use scenario::{DELTA_SUFFIX, DeltaMetric, MetricDelta, Override, PatchOp, ScenarioRun};
pub use simulation::{
    MonteCarloConfig, ParameterDistributions, PercentileBand, PeriodBand, RiskMetrics,
    Sampler, SamplingRule, SimMetric, SimulationProgress, SimulationResult,
};
