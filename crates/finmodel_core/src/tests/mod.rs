//! Integration tests for the finmodel engines
//!
//! Tests are organized by topic:
//! - `projection` - Compounding, determinism and the reference example
//! - `scenario` - Override identity, monotonicity and the cached baseline
//! - `monte_carlo` - Reproducibility, band ordering and excluded trials
//! - `forecast` - Method selection and walk-forward backtests
//! - `orchestrator` - Job lifecycle, cancellation, timeouts, retries and dedupe

mod monte_carlo;
mod projection;
mod scenario;

use crate::config::AssumptionsBuilder;
use crate::model::AssumptionSet;

/// $100k monthly revenue growing 8% a month, with a cost base and runway
pub(crate) fn saas_model() -> AssumptionSet {
    AssumptionsBuilder::top_down("Acme SaaS")
        .revenue(100_000.0)
        .growth(0.08)
        .cogs_ratio(0.25)
        .cost_line("payroll", 120_000.0)
        .cost_line("rent", 15_000.0)
        .cost_growth(0.01)
        .customers(400.0)
        .new_customers(30.0)
        .churn(0.03)
        .opening_cash(200_000.0)
        .build()
}

/// Customer-driven model for formula-set coverage
pub(crate) fn customer_model() -> AssumptionSet {
    AssumptionsBuilder::customer_driven("Acme Seats")
        .customers(200.0)
        .new_customers(25.0)
        .churn(0.02)
        .arpa(500.0)
        .growth(0.005)
        .cogs_ratio(0.2)
        .cost_line("payroll", 90_000.0)
        .opening_cash(250_000.0)
        .build()
}
