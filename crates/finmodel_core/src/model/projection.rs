//! Projection output types

use serde::{Deserialize, Serialize};

/// State of the business at the close of one projected month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthRecord {
    /// 1-based month number
    pub period: u32,
    pub revenue: f64,
    pub cogs: f64,
    pub operating_expenses: f64,
    pub total_costs: f64,
    pub net_income: f64,
    /// Running cash balance; negative values are kept as-is
    pub cash_balance: f64,
    pub customers: f64,
    pub new_customers: f64,
    pub churned_customers: f64,
    /// Annualized revenue run rate (revenue x 12)
    pub arr: f64,
}

/// Months of cash left before the balance goes negative
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Runway {
    /// First month whose closing cash balance is below zero
    Months(u32),
    /// Cash never goes negative within the horizon
    Indefinite,
}

impl Runway {
    #[must_use]
    pub fn months(self) -> Option<u32> {
        match self {
            Runway::Months(m) => Some(m),
            Runway::Indefinite => None,
        }
    }

    #[must_use]
    pub fn from_records(records: &[MonthRecord]) -> Self {
        records
            .iter()
            .find(|r| r.cash_balance < 0.0)
            .map_or(Runway::Indefinite, |r| Runway::Months(r.period))
    }
}

/// Deterministic monthly projection of one assumption set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionResult {
    pub horizon: u32,
    pub months: Vec<MonthRecord>,
    pub runway: Runway,
}

impl ProjectionResult {
    #[must_use]
    pub fn last(&self) -> Option<&MonthRecord> {
        self.months.last()
    }

    #[must_use]
    pub fn month(&self, period: u32) -> Option<&MonthRecord> {
        period
            .checked_sub(1)
            .and_then(|i| self.months.get(i as usize))
    }

    #[must_use]
    pub fn total_revenue(&self) -> f64 {
        self.months.iter().map(|m| m.revenue).sum()
    }

    #[must_use]
    pub fn ending_cash(&self) -> f64 {
        self.last().map_or(0.0, |m| m.cash_balance)
    }

    /// Lowest closing cash balance over the horizon
    #[must_use]
    pub fn min_cash(&self) -> f64 {
        self.months
            .iter()
            .map(|m| m.cash_balance)
            .fold(f64::INFINITY, f64::min)
    }

    /// Revenue series in period order
    pub fn revenue_series(&self) -> impl Iterator<Item = f64> + '_ {
        self.months.iter().map(|m| m.revenue)
    }
}
