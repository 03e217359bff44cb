//! Financial model computation and simulation engine
//!
//! Turns a stored set of business assumptions into monthly projections and
//! builds everything else on top of that:
//! - Deterministic monthly projection of revenue, costs, customers and cash
//! - Scenario overrides compared against a cached baseline
//! - Seeded, parallel Monte Carlo simulation with percentile bands and ruin risk
//! - Trend, seasonal and ARIMA(1,1,0) forecasts with walk-forward backtesting
//! - An asynchronous, cancellable job orchestrator over a pluggable job repository
//!
//! # Builder DSL
//!
//! ```ignore
//! use finmodel_core::{AssumptionsBuilder, project};
//!
//! let assumptions = AssumptionsBuilder::top_down("Acme")
//!     .revenue(100_000.0)
//!     .growth(0.08)
//!     .cost_line("payroll", 80_000.0)
//!     .opening_cash(1_500_000.0)
//!     .build();
//!
//! let projection = project(&assumptions, 12)?;
//! ```

#![warn(clippy::all)]

// ============================================================================
// Engines
// ============================================================================

pub mod forecast;
pub mod monte_carlo;
pub mod percentiles;
pub mod projection;
pub mod scenario;

// ============================================================================
// Orchestration and storage
// ============================================================================

pub mod orchestrator;
pub mod repository;
pub mod store;

// ============================================================================
// Type definition modules
// ============================================================================

pub mod config;
pub mod error;
pub mod model;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use config::{AssumptionsBuilder, OrchestratorConfig};
pub use error::{EngineError, ErrorKind, JobError};
pub use forecast::{backtest, forecast};
pub use monte_carlo::{simulate, simulate_with_progress};
pub use orchestrator::Orchestrator;
pub use projection::project;
pub use repository::{JobRepository, MemoryJobRepository};
#[cfg(feature = "sqlite")]
pub use repository::SqliteJobRepository;
pub use scenario::{ScenarioEngine, derive_scenario};
pub use store::{AssumptionStore, MemoryAssumptionStore};
