//! Assumptions Builder
//!
//! Fluent construction of assumption sets, mostly for tests, benchmarks and
//! programmatic callers.
//!
//! ```ignore
//! use finmodel_core::config::AssumptionsBuilder;
//!
//! let assumptions = AssumptionsBuilder::top_down("Acme")
//!     .revenue(100_000.0)
//!     .growth(0.08)
//!     .opening_cash(1_500_000.0)
//!     .cost_line("payroll", 80_000.0)
//!     .cost_line("rent", 12_000.0)
//!     .cogs_ratio(0.2)
//!     .customers(250.0)
//!     .new_customers(15.0)
//!     .churn(0.02)
//!     .build();
//! ```

use jiff::Timestamp;

use crate::model::{AssumptionSet, CostLine, FormulaSet, Param};

pub struct AssumptionsBuilder {
    set: AssumptionSet,
}

impl AssumptionsBuilder {
    #[must_use]
    pub fn top_down(name: impl Into<String>) -> Self {
        Self {
            set: AssumptionSet::new(name, FormulaSet::TopDown),
        }
    }

    #[must_use]
    pub fn customer_driven(name: impl Into<String>) -> Self {
        Self {
            set: AssumptionSet::new(name, FormulaSet::CustomerDriven),
        }
    }

    #[must_use]
    pub fn created_at(mut self, ts: Timestamp) -> Self {
        self.set.created_at = ts;
        self
    }

    // =========================================================================
    // Revenue
    // =========================================================================

    #[must_use]
    pub fn revenue(mut self, baseline: f64) -> Self {
        self.set.revenue.baseline = Some(baseline);
        self
    }

    #[must_use]
    pub fn growth(mut self, rate: impl Into<Param>) -> Self {
        self.set.revenue.growth = Some(rate.into());
        self
    }

    #[must_use]
    pub fn growth_schedule(mut self, rates: Vec<f64>) -> Self {
        self.set.revenue.growth = Some(Param::Schedule(rates));
        self
    }

    /// Force revenue to `amount` in month `period`
    #[must_use]
    pub fn revenue_override(mut self, period: u32, amount: f64) -> Self {
        self.set.revenue.overrides.insert(period, amount);
        self
    }

    // =========================================================================
    // Customers
    // =========================================================================

    #[must_use]
    pub fn customers(mut self, opening: f64) -> Self {
        self.set.customers.opening = Some(opening);
        self
    }

    #[must_use]
    pub fn new_customers(mut self, per_month: impl Into<Param>) -> Self {
        self.set.customers.new = Some(per_month.into());
        self
    }

    #[must_use]
    pub fn churn(mut self, rate: impl Into<Param>) -> Self {
        self.set.customers.churn = Some(rate.into());
        self
    }

    #[must_use]
    pub fn arpa(mut self, amount: f64) -> Self {
        self.set.customers.arpa = Some(amount);
        self
    }

    // =========================================================================
    // Costs & Cash
    // =========================================================================

    #[must_use]
    pub fn cogs_ratio(mut self, ratio: impl Into<Param>) -> Self {
        self.set.costs.cogs_ratio = Some(ratio.into());
        self
    }

    #[must_use]
    pub fn cost_growth(mut self, rate: impl Into<Param>) -> Self {
        self.set.costs.growth = Some(rate.into());
        self
    }

    #[must_use]
    pub fn cost_line(mut self, name: impl Into<String>, amount: f64) -> Self {
        self.set.costs.lines.insert(name.into(), CostLine::new(amount));
        self
    }

    #[must_use]
    pub fn cost_line_with(mut self, name: impl Into<String>, line: CostLine) -> Self {
        self.set.costs.lines.insert(name.into(), line);
        self
    }

    #[must_use]
    pub fn opening_cash(mut self, amount: f64) -> Self {
        self.set.cash.opening = Some(amount);
        self
    }

    #[must_use]
    pub fn funding(mut self, period: u32, amount: f64) -> Self {
        *self.set.cash.funding.entry(period).or_insert(0.0) += amount;
        self
    }

    #[must_use]
    pub fn build(self) -> AssumptionSet {
        self.set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParamPath;

    #[test]
    fn test_builder_fills_required_top_down_paths() {
        let set = AssumptionsBuilder::top_down("acme")
            .revenue(100_000.0)
            .growth(0.08)
            .opening_cash(1_000_000.0)
            .build();

        assert!(set.required_paths().iter().all(|p| set.has(p)));
        assert_eq!(set.formula, FormulaSet::TopDown);
    }

    #[test]
    fn test_builder_accumulates_funding_in_same_month() {
        let set = AssumptionsBuilder::top_down("acme")
            .funding(6, 250_000.0)
            .funding(6, 50_000.0)
            .build();
        assert_eq!(set.cash.funding.get(&6), Some(&300_000.0));
    }

    #[test]
    fn test_builder_cost_lines_are_addressable() {
        let set = AssumptionsBuilder::top_down("acme")
            .cost_line("payroll", 80_000.0)
            .build();
        assert!(set.has(&ParamPath::cost_line("payroll")));
        assert!(!set.has(&ParamPath::cost_line("rent")));
    }
}
