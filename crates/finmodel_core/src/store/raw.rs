//! Loosely-shaped model input as it arrives from files or upstream systems.
//!
//! ```yaml
//! name: Acme
//! formula: top_down
//! revenue:
//!   monthly_revenue: 100000
//!   growth_pct: 8
//! costs:
//!   cogs: 0.2
//!   fixed:
//!     payroll: 80000
//!     rent: { amount: 12000, growth: 0.0 }
//! cash:
//!   starting_cash: 1500000
//! history:
//!   MRR: [81000, 84500, 90200]
//! ```

use std::collections::BTreeMap;

use jiff::Timestamp;
use serde::Deserialize;

use crate::error::StoreError;
use crate::model::{
    AssumptionSet, CashAssumptions, CostAssumptions, CostLine, CustomerAssumptions, FormulaSet,
    Param, ParamPath, RevenueAssumptions,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawModel {
    #[serde(alias = "model_name")]
    pub name: Option<String>,
    #[serde(alias = "formula_set", alias = "mode")]
    pub formula: Option<FormulaSet>,
    pub created_at: Option<Timestamp>,
    pub revenue: RawRevenue,
    pub customers: RawCustomers,
    pub costs: RawCosts,
    pub cash: RawCash,
    /// Historical actuals keyed by metric name
    #[serde(alias = "historical", alias = "actuals")]
    pub history: BTreeMap<String, Vec<f64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawRevenue {
    #[serde(alias = "monthly_revenue", alias = "starting_revenue", alias = "mrr")]
    pub baseline: Option<f64>,
    #[serde(alias = "growth_rate", alias = "monthly_growth")]
    pub growth: Option<Param>,
    pub growth_pct: Option<Param>,
    pub overrides: BTreeMap<u32, f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCustomers {
    #[serde(alias = "starting_customers", alias = "count")]
    pub opening: Option<f64>,
    #[serde(alias = "new_per_month", alias = "new_customers", alias = "acquisition")]
    pub new: Option<Param>,
    #[serde(alias = "churn_rate")]
    pub churn: Option<Param>,
    pub churn_pct: Option<Param>,
    #[serde(alias = "arpu")]
    pub arpa: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCosts {
    #[serde(alias = "cogs")]
    pub cogs_ratio: Option<Param>,
    pub cogs_pct: Option<Param>,
    #[serde(alias = "cost_growth", alias = "escalation")]
    pub growth: Option<Param>,
    #[serde(alias = "fixed", alias = "fixed_costs")]
    pub lines: BTreeMap<String, RawCostLine>,
}

/// A cost line given either as a bare monthly amount or in full
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawCostLine {
    Amount(f64),
    Detailed {
        amount: f64,
        #[serde(default)]
        growth: Option<Param>,
        #[serde(default)]
        overrides: BTreeMap<u32, f64>,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCash {
    #[serde(alias = "starting_cash", alias = "balance")]
    pub opening: Option<f64>,
    #[serde(alias = "injections", alias = "fundraising")]
    pub funding: BTreeMap<u32, f64>,
}

/// Canonical metric name: trimmed, lowercase, `snake_case`, common aliases folded
#[must_use]
pub fn normalize_metric(name: &str) -> String {
    let key = normalize_key(name);
    match key.as_str() {
        "mrr" | "monthly_revenue" | "sales" => "revenue".to_string(),
        "cash" | "balance" => "cash_balance".to_string(),
        "customer_count" | "accounts" => "customers".to_string(),
        "opex" | "expenses" => "operating_expenses".to_string(),
        _ => key,
    }
}

fn normalize_key(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Pick between a fraction and a percentage field
fn fraction(
    path: &str,
    fraction: Option<Param>,
    percent: Option<Param>,
) -> Result<Option<Param>, StoreError> {
    match (fraction, percent) {
        (Some(_), Some(_)) => Err(StoreError::Invalid(format!(
            "{path} is given both as a fraction and as a percentage"
        ))),
        (Some(f), None) => Ok(Some(f)),
        (None, Some(Param::Constant(p))) => Ok(Some(Param::Constant(p / 100.0))),
        (None, Some(Param::Schedule(ps))) => Ok(Some(Param::Schedule(
            ps.into_iter().map(|p| p / 100.0).collect(),
        ))),
        (None, None) => Ok(None),
    }
}

impl RawModel {
    /// Convert into the canonical assumption set plus normalized history
    pub fn normalize(self) -> Result<(AssumptionSet, BTreeMap<String, Vec<f64>>), StoreError> {
        let mut lines = BTreeMap::new();
        for (raw_name, raw_line) in self.costs.lines {
            let name = normalize_key(&raw_name);
            if format!("costs.{name}").parse::<ParamPath>().is_err() {
                return Err(StoreError::Invalid(format!(
                    "cost line name {raw_name:?} is not usable"
                )));
            }
            let line = match raw_line {
                RawCostLine::Amount(amount) => CostLine::new(amount),
                RawCostLine::Detailed {
                    amount,
                    growth,
                    overrides,
                } => CostLine {
                    amount,
                    growth,
                    overrides,
                },
            };
            if lines.insert(name.clone(), line).is_some() {
                return Err(StoreError::Invalid(format!("duplicate cost line {name:?}")));
            }
        }

        let mut history = BTreeMap::new();
        for (raw_metric, values) in self.history {
            let metric = normalize_metric(&raw_metric);
            if history.insert(metric.clone(), values).is_some() {
                return Err(StoreError::Invalid(format!(
                    "history for {metric:?} is given more than once"
                )));
            }
        }

        let set = AssumptionSet {
            name: self.name.unwrap_or_else(|| "untitled".to_string()),
            created_at: self.created_at.unwrap_or_else(Timestamp::now),
            formula: self.formula.unwrap_or_default(),
            revenue: RevenueAssumptions {
                baseline: self.revenue.baseline,
                growth: fraction(
                    "revenue.growth",
                    self.revenue.growth,
                    self.revenue.growth_pct,
                )?,
                overrides: self.revenue.overrides,
            },
            customers: CustomerAssumptions {
                opening: self.customers.opening,
                new: self.customers.new,
                churn: fraction(
                    "customers.churn",
                    self.customers.churn,
                    self.customers.churn_pct,
                )?,
                arpa: self.customers.arpa,
            },
            costs: CostAssumptions {
                cogs_ratio: fraction("costs.cogs_ratio", self.costs.cogs_ratio, self.costs.cogs_pct)?,
                growth: self.costs.growth,
                lines,
            },
            cash: CashAssumptions {
                opening: self.cash.opening,
                funding: self.cash.funding,
            },
        };
        Ok((set, history))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_and_percentages_normalize() {
        let raw: RawModel = serde_json::from_str(
            r#"{
                "model_name": "Acme",
                "revenue": {"monthly_revenue": 100000, "growth_pct": 8},
                "customers": {"starting_customers": 250, "churn_rate": 0.02},
                "costs": {"cogs": 0.2, "fixed": {"Payroll": 80000, "Office Rent": {"amount": 12000, "growth": 0.01}}},
                "cash": {"starting_cash": 1500000},
                "history": {"MRR": [1.0, 2.0]}
            }"#,
        )
        .unwrap();

        let (set, history) = raw.normalize().unwrap();
        assert_eq!(set.name, "Acme");
        assert_eq!(set.formula, FormulaSet::TopDown);
        assert_eq!(set.revenue.baseline, Some(100_000.0));
        assert_eq!(set.revenue.growth, Some(Param::Constant(0.08)));
        assert_eq!(set.customers.opening, Some(250.0));
        assert_eq!(set.costs.cogs_ratio, Some(Param::Constant(0.2)));
        assert_eq!(set.costs.lines["payroll"].amount, 80_000.0);
        assert_eq!(
            set.costs.lines["office_rent"].growth,
            Some(Param::Constant(0.01))
        );
        assert_eq!(set.cash.opening, Some(1_500_000.0));
        assert_eq!(history.get("revenue"), Some(&vec![1.0, 2.0]));
    }

    #[test]
    fn test_fraction_and_percent_conflict() {
        let raw: RawModel =
            serde_json::from_str(r#"{"revenue": {"growth": 0.08, "growth_pct": 8}}"#).unwrap();
        assert!(matches!(raw.normalize(), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn test_reserved_cost_line_name_rejected() {
        let raw: RawModel =
            serde_json::from_str(r#"{"costs": {"lines": {"growth": 100}}}"#).unwrap();
        assert!(matches!(raw.normalize(), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(normalize_metric("Cash"), "cash_balance");
        assert_eq!(normalize_metric("new-customers"), "new_customers");
        assert_eq!(normalize_metric("  ARR "), "arr");
    }
}
