//! Assumption sets: the typed inputs of a financial projection
//!
//! Every parameter that can be overridden or perturbed is addressed by a
//! [`ParamPath`], a closed set of known paths, so a misspelled override is
//! rejected instead of silently ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Which formulas drive revenue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaSet {
    /// Revenue compounds from a baseline at the growth rate
    #[default]
    TopDown,
    /// Revenue = customers x ARPA, with ARPA compounding at the growth rate
    CustomerDriven,
}

/// A parameter that is either constant or varies by month.
///
/// Schedules are indexed by month offset (entry 0 applies to month 1); the last
/// entry is held for every later month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Param {
    Constant(f64),
    Schedule(Vec<f64>),
}

impl Param {
    /// Value for the month at `index` (0-based)
    #[must_use]
    pub fn at(&self, index: usize) -> f64 {
        match self {
            Param::Constant(value) => *value,
            Param::Schedule(values) => values
                .get(index)
                .or_else(|| values.last())
                .copied()
                .unwrap_or(0.0),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Param::Schedule(values) if values.is_empty())
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        let slice: &[f64] = match self {
            Param::Constant(value) => std::slice::from_ref(value),
            Param::Schedule(values) => values,
        };
        slice.iter().copied()
    }

    /// Shift every month's value by `delta`
    #[must_use]
    pub fn shifted(&self, delta: f64) -> Param {
        match self {
            Param::Constant(value) => Param::Constant(value + delta),
            Param::Schedule(values) => Param::Schedule(values.iter().map(|v| v + delta).collect()),
        }
    }
}

impl From<f64> for Param {
    fn from(value: f64) -> Self {
        Param::Constant(value)
    }
}

/// A fixed monthly cost line (payroll, rent, tooling, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLine {
    /// Monthly amount at the close of month 0
    pub amount: f64,
    /// Monthly escalation; falls back to the cost-wide growth rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub growth: Option<Param>,
    /// Absolute amount for specific months (1-based month number)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<u32, f64>,
}

impl CostLine {
    #[must_use]
    pub fn new(amount: f64) -> Self {
        Self {
            amount,
            growth: None,
            overrides: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevenueAssumptions {
    /// Monthly revenue at the close of month 0
    pub baseline: Option<f64>,
    /// Monthly growth rate
    pub growth: Option<Param>,
    /// Absolute revenue for specific months (1-based month number)
    pub overrides: BTreeMap<u32, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomerAssumptions {
    pub opening: Option<f64>,
    /// New customers acquired per month
    pub new: Option<Param>,
    /// Monthly churn rate applied to the prior month's customers
    pub churn: Option<Param>,
    /// Average revenue per account at the close of month 0
    pub arpa: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostAssumptions {
    /// Cost of goods sold as a fraction of revenue
    pub cogs_ratio: Option<Param>,
    /// Monthly escalation applied to cost lines without their own rate
    pub growth: Option<Param>,
    pub lines: BTreeMap<String, CostLine>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CashAssumptions {
    pub opening: Option<f64>,
    /// Cash injections (funding rounds, loans) by 1-based month number
    pub funding: BTreeMap<u32, f64>,
}

/// Named, versioned set of financial assumptions.
///
/// Sets are shared as `Arc<AssumptionSet>` once handed out by a store and are
/// never mutated in place; overrides always produce a new set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssumptionSet {
    pub name: String,
    /// Version stamp: the creation time of this set
    pub created_at: Timestamp,
    #[serde(default)]
    pub formula: FormulaSet,
    #[serde(default)]
    pub revenue: RevenueAssumptions,
    #[serde(default)]
    pub customers: CustomerAssumptions,
    #[serde(default)]
    pub costs: CostAssumptions,
    #[serde(default)]
    pub cash: CashAssumptions,
}

impl AssumptionSet {
    #[must_use]
    pub fn new(name: impl Into<String>, formula: FormulaSet) -> Self {
        Self {
            name: name.into(),
            created_at: Timestamp::now(),
            formula,
            revenue: RevenueAssumptions::default(),
            customers: CustomerAssumptions::default(),
            costs: CostAssumptions::default(),
            cash: CashAssumptions::default(),
        }
    }

    /// Paths the selected formula set cannot run without
    #[must_use]
    pub fn required_paths(&self) -> Vec<ParamPath> {
        match self.formula {
            FormulaSet::TopDown => vec![
                ParamPath::RevenueBaseline,
                ParamPath::RevenueGrowth,
                ParamPath::CashOpening,
            ],
            FormulaSet::CustomerDriven => vec![
                ParamPath::CustomersOpening,
                ParamPath::CustomersArpa,
                ParamPath::CashOpening,
            ],
        }
    }

    /// Whether a value is present for `path`. Empty schedules count as missing.
    #[must_use]
    pub fn has(&self, path: &ParamPath) -> bool {
        let param_present = |p: &Option<Param>| p.as_ref().is_some_and(|p| !p.is_empty());
        match path {
            ParamPath::RevenueBaseline => self.revenue.baseline.is_some(),
            ParamPath::RevenueGrowth => param_present(&self.revenue.growth),
            ParamPath::CustomersOpening => self.customers.opening.is_some(),
            ParamPath::CustomersNew => param_present(&self.customers.new),
            ParamPath::CustomersChurn => param_present(&self.customers.churn),
            ParamPath::CustomersArpa => self.customers.arpa.is_some(),
            ParamPath::CostsCogsRatio => param_present(&self.costs.cogs_ratio),
            ParamPath::CostsGrowth => param_present(&self.costs.growth),
            ParamPath::CostLine(name) => self.costs.lines.contains_key(name),
            ParamPath::CashOpening => self.cash.opening.is_some(),
        }
    }

    /// Mutable access to the storage behind `path`.
    ///
    /// Fails with `InvalidOverridePath` for cost lines the set does not define.
    pub fn slot_mut(&mut self, path: &ParamPath) -> Result<Slot<'_>, EngineError> {
        Ok(match path {
            ParamPath::RevenueBaseline => Slot::Scalar(&mut self.revenue.baseline),
            ParamPath::RevenueGrowth => Slot::Param(&mut self.revenue.growth),
            ParamPath::CustomersOpening => Slot::Scalar(&mut self.customers.opening),
            ParamPath::CustomersNew => Slot::Param(&mut self.customers.new),
            ParamPath::CustomersChurn => Slot::Param(&mut self.customers.churn),
            ParamPath::CustomersArpa => Slot::Scalar(&mut self.customers.arpa),
            ParamPath::CostsCogsRatio => Slot::Param(&mut self.costs.cogs_ratio),
            ParamPath::CostsGrowth => Slot::Param(&mut self.costs.growth),
            ParamPath::CostLine(name) => match self.costs.lines.get_mut(name) {
                Some(line) => Slot::Amount(&mut line.amount),
                None => {
                    return Err(EngineError::InvalidOverridePath(format!(
                        "{path} (no cost line named {name:?})"
                    )));
                }
            },
            ParamPath::CashOpening => Slot::Scalar(&mut self.cash.opening),
        })
    }
}

/// Mutable view of one parameter's storage
#[derive(Debug)]
pub enum Slot<'a> {
    /// Optional scalar
    Scalar(&'a mut Option<f64>),
    /// Optional, possibly time-varying parameter
    Param(&'a mut Option<Param>),
    /// Cost line amount (always present)
    Amount(&'a mut f64),
}

const COST_RESERVED: [&str; 2] = ["cogs_ratio", "growth"];

/// A known parameter path, written in dotted form (`revenue.growth`, `costs.payroll`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ParamPath {
    RevenueBaseline,
    RevenueGrowth,
    CustomersOpening,
    CustomersNew,
    CustomersChurn,
    CustomersArpa,
    CostsCogsRatio,
    CostsGrowth,
    CostLine(String),
    CashOpening,
}

impl ParamPath {
    #[must_use]
    pub fn cost_line(name: impl Into<String>) -> Self {
        ParamPath::CostLine(name.into())
    }
}

impl fmt::Display for ParamPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamPath::RevenueBaseline => f.write_str("revenue.baseline"),
            ParamPath::RevenueGrowth => f.write_str("revenue.growth"),
            ParamPath::CustomersOpening => f.write_str("customers.opening"),
            ParamPath::CustomersNew => f.write_str("customers.new"),
            ParamPath::CustomersChurn => f.write_str("customers.churn"),
            ParamPath::CustomersArpa => f.write_str("customers.arpa"),
            ParamPath::CostsCogsRatio => f.write_str("costs.cogs_ratio"),
            ParamPath::CostsGrowth => f.write_str("costs.growth"),
            ParamPath::CostLine(name) => write!(f, "costs.{name}"),
            ParamPath::CashOpening => f.write_str("cash.opening"),
        }
    }
}

impl FromStr for ParamPath {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let path = match s.trim() {
            "revenue.baseline" => ParamPath::RevenueBaseline,
            "revenue.growth" => ParamPath::RevenueGrowth,
            "customers.opening" => ParamPath::CustomersOpening,
            "customers.new" => ParamPath::CustomersNew,
            "customers.churn" => ParamPath::CustomersChurn,
            "customers.arpa" => ParamPath::CustomersArpa,
            "costs.cogs_ratio" => ParamPath::CostsCogsRatio,
            "costs.growth" => ParamPath::CostsGrowth,
            "cash.opening" => ParamPath::CashOpening,
            other => match other.strip_prefix("costs.") {
                Some(name)
                    if !name.is_empty()
                        && !COST_RESERVED.contains(&name)
                        && name
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') =>
                {
                    ParamPath::CostLine(name.to_string())
                }
                _ => return Err(EngineError::InvalidOverridePath(other.to_string())),
            },
        };
        Ok(path)
    }
}

impl TryFrom<String> for ParamPath {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ParamPath> for String {
    fn from(path: ParamPath) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_schedule_holds_last_value() {
        let p = Param::Schedule(vec![0.1, 0.2, 0.3]);
        assert_eq!(p.at(0), 0.1);
        assert_eq!(p.at(2), 0.3);
        assert_eq!(p.at(10), 0.3);
        assert_eq!(Param::Constant(0.05).at(99), 0.05);
        assert_eq!(Param::Schedule(vec![]).at(0), 0.0);
    }

    #[test]
    fn test_param_path_parsing() {
        assert_eq!(
            "revenue.growth".parse::<ParamPath>(),
            Ok(ParamPath::RevenueGrowth)
        );
        assert_eq!(
            "costs.payroll".parse::<ParamPath>(),
            Ok(ParamPath::cost_line("payroll"))
        );
        assert_eq!(
            "costs.growth".parse::<ParamPath>(),
            Ok(ParamPath::CostsGrowth)
        );
        assert!(matches!(
            "revenue.grwth".parse::<ParamPath>(),
            Err(EngineError::InvalidOverridePath(_))
        ));
        assert!("costs.".parse::<ParamPath>().is_err());
        assert!("costs.pay roll".parse::<ParamPath>().is_err());
    }

    #[test]
    fn test_param_path_display_round_trips() {
        for path in [
            ParamPath::RevenueBaseline,
            ParamPath::CustomersChurn,
            ParamPath::CostsCogsRatio,
            ParamPath::cost_line("rent"),
            ParamPath::CashOpening,
        ] {
            assert_eq!(path.to_string().parse::<ParamPath>(), Ok(path));
        }
    }

    #[test]
    fn test_required_paths_depend_on_formula() {
        let mut set = AssumptionSet::new("acme", FormulaSet::TopDown);
        assert!(set.required_paths().contains(&ParamPath::RevenueGrowth));
        set.formula = FormulaSet::CustomerDriven;
        assert!(set.required_paths().contains(&ParamPath::CustomersArpa));
        assert!(!set.required_paths().contains(&ParamPath::RevenueGrowth));
    }

    #[test]
    fn test_empty_schedule_counts_as_missing() {
        let mut set = AssumptionSet::new("acme", FormulaSet::TopDown);
        set.revenue.growth = Some(Param::Schedule(vec![]));
        assert!(!set.has(&ParamPath::RevenueGrowth));
        set.revenue.growth = Some(Param::Constant(0.02));
        assert!(set.has(&ParamPath::RevenueGrowth));
    }

    #[test]
    fn test_slot_for_unknown_cost_line_is_rejected() {
        let mut set = AssumptionSet::new("acme", FormulaSet::TopDown);
        set.costs.lines.insert("rent".into(), CostLine::new(5_000.0));
        assert!(matches!(
            set.slot_mut(&ParamPath::cost_line("rent")),
            Ok(Slot::Amount(_))
        ));
        assert!(matches!(
            set.slot_mut(&ParamPath::cost_line("payroll")),
            Err(EngineError::InvalidOverridePath(_))
        ));
    }
}
