//! Projection Engine
//!
//! Deterministic monthly projection of an assumption set.
//!
//! Assumption values describe the close of month 0. Each month then runs, in order:
//! churn on the prior customer base, acquisition, revenue (growth, then any
//! absolute override), cost lines (escalation, then overrides), COGS and the cash
//! roll-forward. Cash is never clamped; a negative balance sets the runway.

use crate::error::{EngineError, Result};
use crate::model::{
    AssumptionSet, FormulaSet, MonthRecord, Param, ParamPath, ProjectionResult, Runway,
};

/// Project `assumptions` forward `horizon` months
pub fn project(assumptions: &AssumptionSet, horizon: u32) -> Result<ProjectionResult> {
    if horizon == 0 {
        return Err(EngineError::InvalidHorizon(horizon));
    }
    check_required(assumptions)?;
    check_domain(assumptions, horizon)?;

    let formula = assumptions.formula;
    let revenue = &assumptions.revenue;
    let customers = &assumptions.customers;
    let costs = &assumptions.costs;

    let param = |p: &Option<Param>, i: usize| p.as_ref().map_or(0.0, |p| p.at(i));

    let mut prev_revenue = revenue.baseline.unwrap_or(0.0);
    let mut arpa = customers.arpa.unwrap_or(0.0);
    let mut prev_customers = customers.opening.unwrap_or(0.0);
    let mut cash = assumptions.cash.opening.unwrap_or(0.0);
    let mut lines: Vec<f64> = costs.lines.values().map(|l| l.amount).collect();

    let mut months = Vec::with_capacity(horizon as usize);

    for i in 0..horizon as usize {
        let period = i as u32 + 1;

        // Customers: churn the prior base first, then acquire
        let churned = prev_customers * param(&customers.churn, i);
        let new_customers = param(&customers.new, i);
        let customer_count = prev_customers - churned + new_customers;

        // Revenue
        let growth = param(&revenue.growth, i);
        let mut month_revenue = match formula {
            FormulaSet::TopDown => prev_revenue * (1.0 + growth),
            FormulaSet::CustomerDriven => {
                arpa *= 1.0 + growth;
                customer_count * arpa
            }
        };
        if let Some(&forced) = revenue.overrides.get(&period) {
            month_revenue = forced;
        }

        // Fixed costs
        let mut operating_expenses = 0.0;
        for (amount, line) in lines.iter_mut().zip(costs.lines.values()) {
            let rate = line
                .growth
                .as_ref()
                .or(costs.growth.as_ref())
                .map_or(0.0, |g| g.at(i));
            *amount *= 1.0 + rate;
            if let Some(&forced) = line.overrides.get(&period) {
                *amount = forced;
            }
            operating_expenses += *amount;
        }

        let cogs = month_revenue * param(&costs.cogs_ratio, i);
        let total_costs = cogs + operating_expenses;
        let net_income = month_revenue - total_costs;
        let funding = assumptions.cash.funding.get(&period).copied().unwrap_or(0.0);
        cash += net_income + funding;

        let record = MonthRecord {
            period,
            revenue: month_revenue,
            cogs,
            operating_expenses,
            total_costs,
            net_income,
            cash_balance: cash,
            customers: customer_count,
            new_customers,
            churned_customers: churned,
            arr: month_revenue * 12.0,
        };
        check_finite(&record)?;
        months.push(record);

        prev_revenue = month_revenue;
        prev_customers = customer_count;
    }

    let runway = Runway::from_records(&months);
    Ok(ProjectionResult {
        horizon,
        months,
        runway,
    })
}

fn check_required(assumptions: &AssumptionSet) -> Result<()> {
    let missing: Vec<String> = assumptions
        .required_paths()
        .into_iter()
        .filter(|p| !assumptions.has(p))
        .map(|p| p.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::IncompleteAssumptions { missing })
    }
}

fn invalid(path: &ParamPath, value: f64, reason: &'static str) -> EngineError {
    EngineError::InvalidParameter {
        path: path.to_string(),
        value,
        reason,
    }
}

/// Check every value the projection will read over `horizon` months
fn check_domain(assumptions: &AssumptionSet, horizon: u32) -> Result<()> {
    let months = horizon as usize;
    let check_param = |path: ParamPath,
                       param: &Option<Param>,
                       ok: fn(f64) -> bool,
                       reason: &'static str|
     -> Result<()> {
        if let Some(p) = param {
            // Schedules longer than the horizon are checked in full too
            let bad = p
                .values()
                .chain((0..months).map(|i| p.at(i)))
                .find(|v| !ok(*v));
            if let Some(v) = bad {
                return Err(invalid(&path, v, reason));
            }
        }
        Ok(())
    };

    let unit = |v: f64| (0.0..=1.0).contains(&v);
    let rate = |v: f64| v.is_finite() && v > -1.0;
    let non_negative = |v: f64| v.is_finite() && v >= 0.0;

    check_param(
        ParamPath::CustomersChurn,
        &assumptions.customers.churn,
        unit,
        "churn must be within [0, 1]",
    )?;
    check_param(
        ParamPath::CostsCogsRatio,
        &assumptions.costs.cogs_ratio,
        unit,
        "cogs ratio must be within [0, 1]",
    )?;
    check_param(
        ParamPath::RevenueGrowth,
        &assumptions.revenue.growth,
        rate,
        "growth must be greater than -1",
    )?;
    check_param(
        ParamPath::CostsGrowth,
        &assumptions.costs.growth,
        rate,
        "growth must be greater than -1",
    )?;
    check_param(
        ParamPath::CustomersNew,
        &assumptions.customers.new,
        non_negative,
        "new customers must be non-negative",
    )?;
    for (name, line) in &assumptions.costs.lines {
        let path = ParamPath::cost_line(name.as_str());
        if !line.amount.is_finite() {
            return Err(invalid(&path, line.amount, "amount must be finite"));
        }
        check_param(
            path,
            &line.growth,
            rate,
            "growth must be greater than -1",
        )?;
    }

    if let Some(opening) = assumptions.customers.opening
        && !non_negative(opening)
    {
        return Err(invalid(
            &ParamPath::CustomersOpening,
            opening,
            "opening customers must be non-negative",
        ));
    }
    for (path, value) in [
        (ParamPath::RevenueBaseline, assumptions.revenue.baseline),
        (ParamPath::CustomersArpa, assumptions.customers.arpa),
        (ParamPath::CashOpening, assumptions.cash.opening),
    ] {
        if let Some(v) = value
            && !v.is_finite()
        {
            return Err(invalid(&path, v, "value must be finite"));
        }
    }
    Ok(())
}

fn check_finite(record: &MonthRecord) -> Result<()> {
    let fields = [
        ("revenue", record.revenue),
        ("cogs", record.cogs),
        ("operating_expenses", record.operating_expenses),
        ("cash_balance", record.cash_balance),
        ("customers", record.customers),
    ];
    match fields.iter().find(|(_, v)| !v.is_finite()) {
        Some((name, v)) => Err(EngineError::InternalComputationError(format!(
            "{name} became {v} in month {}",
            record.period
        ))),
        None => Ok(()),
    }
}
