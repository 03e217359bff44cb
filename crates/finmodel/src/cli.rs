//! Command-line arguments

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use finmodel_core::model::{
    DELTA_SUFFIX, ForecastMethod, ForecastOptions, Override, ParamPath, ParameterDistributions,
    SamplingRule,
};

#[derive(Parser, Debug)]
#[command(name = "finmodel")]
#[command(about = "Projections, scenarios, Monte Carlo risk and forecasts for a financial model")]
pub struct Args {
    /// Path to the data directory (default: ~/.finmodel/)
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Model file (YAML)
    #[arg(short, long)]
    pub model: PathBuf,

    /// Submit with this dedupe key; repeating a key returns the earlier job
    #[arg(long)]
    pub dedupe_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Deterministic monthly projection
    Project {
        #[arg(long, default_value_t = 12)]
        horizon: u32,
    },
    /// Project with overrides and compare against the baseline
    Scenario {
        #[arg(long, default_value_t = 12)]
        horizon: u32,
        /// Override as PATH=VALUE, or PATH:delta=VALUE for a relative change
        #[arg(long = "set", value_name = "PATH=VALUE", required = true)]
        overrides: Vec<String>,
    },
    /// Monte Carlo simulation over uncertain parameters
    Simulate {
        #[arg(long, default_value_t = 24)]
        horizon: u32,
        #[arg(long, default_value_t = 1_000)]
        trials: usize,
        /// Fixed seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
        /// Normal distribution as PATH=MEAN,STD_DEV
        #[arg(long, value_name = "PATH=MEAN,STD_DEV")]
        normal: Vec<String>,
        /// Uniform distribution as PATH=LOW,HIGH
        #[arg(long, value_name = "PATH=LOW,HIGH")]
        uniform: Vec<String>,
        /// Triangular distribution as PATH=MIN,MODE,MAX
        #[arg(long, value_name = "PATH=MIN,MODE,MAX")]
        triangular: Vec<String>,
        /// YAML file of additional distributions keyed by parameter path
        #[arg(long)]
        distributions: Option<PathBuf>,
    },
    /// Forecast a historical metric
    Forecast {
        #[arg(long, default_value = "revenue")]
        metric: String,
        #[arg(long, default_value_t = 6)]
        steps: usize,
        /// auto, trend, seasonal or arima
        #[arg(long, default_value = "auto")]
        method: ForecastMethod,
        /// Attach walk-forward accuracy using this fold size
        #[arg(long)]
        backtest_window: Option<usize>,
        #[command(flatten)]
        options: ForecastArgs,
    },
    /// Walk-forward validation of every forecasting method
    Backtest {
        #[arg(long, default_value = "revenue")]
        metric: String,
        #[arg(long, default_value_t = 6)]
        window: usize,
        #[command(flatten)]
        options: ForecastArgs,
    },
}

#[derive(ClapArgs, Debug)]
pub struct ForecastArgs {
    #[arg(long, default_value_t = 12)]
    pub season_length: usize,
    /// 0.80, 0.90, 0.95 or 0.99
    #[arg(long, default_value_t = 0.95)]
    pub confidence: f64,
    /// Points held out when choosing a method automatically
    #[arg(long)]
    pub holdout: Option<usize>,
}

impl ForecastArgs {
    pub fn options(&self) -> ForecastOptions {
        ForecastOptions {
            season_length: self.season_length,
            confidence_level: self.confidence,
            holdout: self.holdout,
        }
    }
}

/// Split `PATH=REST` at the first `=`
fn split_assignment(entry: &str) -> Result<(&str, &str), String> {
    entry
        .split_once('=')
        .map(|(k, v)| (k.trim(), v.trim()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected PATH=VALUE, got {entry:?}"))
}

fn parse_numbers(path: &str, raw: &str, expected: usize) -> Result<Vec<f64>, String> {
    let values = raw
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| format!("{path}: {v:?} is not a number ({e})"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if values.len() != expected {
        return Err(format!(
            "{path}: expected {expected} comma-separated values, got {}",
            values.len()
        ));
    }
    Ok(values)
}

/// Build an override from `--set` entries
pub fn parse_overrides(entries: &[String]) -> Result<Override, String> {
    let parsed = entries
        .iter()
        .map(|entry| {
            let (key, raw) = split_assignment(entry)?;
            let value = raw
                .parse::<f64>()
                .map_err(|e| format!("{key}: {raw:?} is not a number ({e})"))?;
            Ok((key, value))
        })
        .collect::<Result<Vec<_>, String>>()?;
    Override::from_entries(parsed).map_err(|e| {
        format!("{e} (use a known path, optionally with the {DELTA_SUFFIX} suffix)")
    })
}

/// Add `--normal`, `--uniform` and `--triangular` entries to `distributions`
pub fn parse_distributions(
    mut distributions: ParameterDistributions,
    normal: &[String],
    uniform: &[String],
    triangular: &[String],
) -> Result<ParameterDistributions, String> {
    let specs = normal
        .iter()
        .map(|e| (e, 2))
        .chain(uniform.iter().map(|e| (e, 2)))
        .chain(triangular.iter().map(|e| (e, 3)));
    for (n, (entry, arity)) in specs.enumerate() {
        let (key, raw) = split_assignment(entry)?;
        let path: ParamPath = key.parse().map_err(|e| format!("{e}"))?;
        let v = parse_numbers(key, raw, arity)?;
        let rule = if n < normal.len() {
            SamplingRule::Normal {
                mean: v[0],
                std_dev: v[1],
            }
        } else if n < normal.len() + uniform.len() {
            SamplingRule::Uniform {
                low: v[0],
                high: v[1],
            }
        } else {
            SamplingRule::Triangular {
                min: v[0],
                mode: v[1],
                max: v[2],
            }
        };
        distributions.rules.insert(path, rule);
    }
    Ok(distributions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use finmodel_core::model::PatchOp;

    #[test]
    fn test_parse_overrides() {
        let patch = parse_overrides(&[
            "revenue.growth=0.12".to_string(),
            "costs.payroll:delta = -5000".to_string(),
        ])
        .unwrap();
        assert_eq!(
            patch.patches.get(&ParamPath::RevenueGrowth),
            Some(&PatchOp::Set(0.12))
        );
        assert_eq!(
            patch.patches.get(&ParamPath::cost_line("payroll")),
            Some(&PatchOp::Delta(-5000.0))
        );

        assert!(parse_overrides(&["revenue.growth".to_string()]).is_err());
        assert!(parse_overrides(&["revenue.growth=fast".to_string()]).is_err());
        assert!(parse_overrides(&["revenue.pace=1".to_string()]).is_err());
    }

    #[test]
    fn test_parse_distributions() {
        let dists = parse_distributions(
            ParameterDistributions::new(),
            &["revenue.growth=0.05,0.02".to_string()],
            &["customers.churn=0.01,0.04".to_string()],
            &["costs.payroll=70000,80000,95000".to_string()],
        )
        .unwrap();
        assert_eq!(dists.rules.len(), 3);
        assert_eq!(
            dists.rules[&ParamPath::CustomersChurn],
            SamplingRule::Uniform {
                low: 0.01,
                high: 0.04
            }
        );
        assert_eq!(
            dists.rules[&ParamPath::cost_line("payroll")],
            SamplingRule::Triangular {
                min: 70_000.0,
                mode: 80_000.0,
                max: 95_000.0
            }
        );

        let err = parse_distributions(
            ParameterDistributions::new(),
            &["revenue.growth=0.05".to_string()],
            &[],
            &[],
        )
        .unwrap_err();
        assert!(err.contains("expected 2"));
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "finmodel",
            "--model",
            "acme.yaml",
            "scenario",
            "--horizon",
            "24",
            "--set",
            "revenue.growth=0.1",
        ])
        .unwrap();
        assert!(matches!(args.command, Command::Scenario { horizon: 24, .. }));

        let args = Args::try_parse_from([
            "finmodel", "-m", "acme.yaml", "forecast", "--method", "arima", "--steps", "3",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Command::Forecast {
                method: ForecastMethod::Arima,
                steps: 3,
                ..
            }
        ));
    }
}
