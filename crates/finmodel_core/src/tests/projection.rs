//! Tests for the projection engine
//!
//! These tests verify:
//! - The $100k / 8% / 12-month reference example
//! - Identical inputs produce identical outputs
//! - Cash roll-forward and runway detection
//! - Customer-driven revenue

use super::{customer_model, saas_model};
use crate::config::AssumptionsBuilder;
use crate::error::EngineError;
use crate::model::{Param, Runway};
use crate::projection::project;

#[test]
fn test_reference_example_month_12() {
    let set = AssumptionsBuilder::top_down("example")
        .revenue(100_000.0)
        .growth(0.08)
        .opening_cash(0.0)
        .build();
    let result = project(&set, 12).unwrap();

    let month_12 = result.month(12).unwrap();
    assert!(
        (month_12.revenue - 251_817.0).abs() < 1.0,
        "month 12 revenue was {}",
        month_12.revenue
    );
    assert!((month_12.arr - month_12.revenue * 12.0).abs() < 1e-6);
}

#[test]
fn test_projection_is_deterministic() {
    let set = saas_model();
    let a = project(&set, 36).unwrap();
    let b = project(&set, 36).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_periods_are_sequential() {
    let result = project(&saas_model(), 24).unwrap();
    assert_eq!(result.horizon, 24);
    let periods: Vec<u32> = result.months.iter().map(|m| m.period).collect();
    assert_eq!(periods, (1..=24).collect::<Vec<_>>());
}

#[test]
fn test_cash_rolls_forward() {
    let set = saas_model();
    let result = project(&set, 12).unwrap();
    let mut cash = set.cash.opening.unwrap();
    for month in &result.months {
        cash += month.revenue - month.cogs - month.operating_expenses;
        assert!((month.cash_balance - cash).abs() < 1e-6);
        assert!((month.total_costs - (month.cogs + month.operating_expenses)).abs() < 1e-9);
        assert!((month.net_income - (month.revenue - month.total_costs)).abs() < 1e-9);
    }
}

#[test]
fn test_runway_is_first_negative_month() {
    let result = project(&saas_model(), 36).unwrap();
    match result.runway {
        Runway::Months(m) => {
            let month = result.month(m).unwrap();
            assert!(month.cash_balance < 0.0);
            assert!(result.months[..(m - 1) as usize]
                .iter()
                .all(|r| r.cash_balance >= 0.0));
        }
        Runway::Indefinite => assert!(result.months.iter().all(|m| m.cash_balance >= 0.0)),
    }
}

#[test]
fn test_funding_extends_runway() {
    let without = project(&saas_model(), 36).unwrap();
    let Runway::Months(month) = without.runway else {
        panic!("fixture should run out of cash");
    };

    let mut funded = saas_model();
    funded.cash.funding.insert(1, 5_000_000.0);
    let with = project(&funded, 36).unwrap();
    assert!(with.runway > Runway::Months(month));
}

#[test]
fn test_customer_driven_revenue_tracks_customers() {
    let set = customer_model();
    let result = project(&set, 12).unwrap();
    let mut arpa = 500.0;
    for month in &result.months {
        arpa *= 1.005;
        assert!((month.revenue - month.customers * arpa).abs() < 1e-6);
    }
}

#[test]
fn test_growth_schedule_is_held() {
    let mut set = saas_model();
    set.revenue.growth = Some(Param::Schedule(vec![0.10, 0.0]));
    let result = project(&set, 4).unwrap();
    let r: Vec<f64> = result.revenue_series().collect();
    assert!((r[0] - 110_000.0).abs() < 1e-6);
    assert!((r[1] - 110_000.0).abs() < 1e-6);
    assert!((r[3] - 110_000.0).abs() < 1e-6);
}

#[test]
fn test_customer_driven_requires_arpa() {
    let mut set = customer_model();
    set.customers.arpa = None;
    assert_eq!(
        project(&set, 12),
        Err(EngineError::IncompleteAssumptions {
            missing: vec!["customers.arpa".into()]
        })
    );
}
