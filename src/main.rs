use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use portfolio_risk::portfolio::symbol_allocation;
use portfolio_risk::portfolio::AdviceKind;
use portfolio_risk::portfolio::OptimizationConstraints;
use portfolio_risk::portfolio::Portfolio;
use portfolio_risk::portfolio::PricePoint;
use portfolio_risk::portfolio::PriceSeries;
use portfolio_risk::portfolio::RiskProfile;
use portfolio_risk::EngineConfig;
use portfolio_risk::PortfolioEngine;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "portfolio-risk", about = "Portfolio risk and optimization engine")]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Risk report, optimization and rebalancing for a JSON request
  Report {
    /// Request file
    #[arg(short, long)]
    input: PathBuf,
    /// Engine configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
  },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Request {
  portfolio: Portfolio,
  prices: BTreeMap<String, Vec<PricePoint>>,
  #[serde(default)]
  benchmark: Option<String>,
  #[serde(default)]
  profile: RiskProfile,
  #[serde(default)]
  constraints: OptimizationConstraints,
  #[serde(default)]
  expected_returns: Option<BTreeMap<String, f64>>,
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
  match path {
    Some(path) => {
      let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
      Ok(EngineConfig::from_json_str(&raw).with_context(|| format!("parsing {}", path.display()))?)
    }
    None => Ok(EngineConfig::default()),
  }
}

fn report(input: &PathBuf, config: Option<&PathBuf>) -> Result<serde_json::Value> {
  let engine = PortfolioEngine::new(load_config(config)?);
  let raw = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
  let request: Request =
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", input.display()))?;
  request.portfolio.validate()?;

  let benchmark_symbol = request.benchmark.as_deref().map(str::to_uppercase);
  let mut universe = Vec::new();
  let mut benchmark = None;
  for (symbol, points) in request.prices {
    let symbol = symbol.to_uppercase();
    let series = PriceSeries::new(symbol.clone(), points)?;
    if benchmark_symbol.as_deref() == Some(symbol.as_str()) {
      benchmark = Some(series);
    } else {
      universe.push(series);
    }
  }
  if let Some(symbol) = &benchmark_symbol {
    anyhow::ensure!(benchmark.is_some(), "benchmark {symbol} has no price history");
  }
  info!(assets = universe.len(), profile = %request.profile, "building report");

  let matrix = engine.returns_matrix(&universe)?;
  let benchmark_returns = benchmark
    .as_ref()
    .map(portfolio_risk::portfolio::series_log_returns)
    .transpose()?;

  let expected_returns = request
    .expected_returns
    .as_ref()
    .map(|overrides| {
      matrix
        .symbols()
        .iter()
        .map(|s| {
          overrides
            .iter()
            .find(|(key, _)| key.to_uppercase() == *s)
            .map(|(_, value)| *value)
            .with_context(|| format!("expected return missing for {s}"))
        })
        .collect::<Result<Vec<f64>>>()
    })
    .transpose()?;

  let metrics = engine.portfolio_metrics(&request.portfolio, &matrix)?;
  let held = symbol_allocation(&request.portfolio.holdings)?;
  let current_weights: Vec<f64> = matrix
    .symbols()
    .iter()
    .map(|s| held.get(s).copied().unwrap_or(0.0))
    .collect();
  let risk = engine.analyze_portfolio(&matrix, &current_weights, benchmark_returns.as_deref())?;
  let advice: Vec<_> = engine
    .risk_advice(request.profile, &risk)
    .into_iter()
    .map(|a| {
      let kind = match a.kind() {
        AdviceKind::Warning => "warning",
        AdviceKind::Suggestion => "suggestion",
      };
      json!({ "kind": kind, "message": a.message(), "detail": a })
    })
    .collect();

  let optimum = engine.optimize_with_expected_returns(
    &matrix,
    request.profile,
    &request.constraints,
    expected_returns.as_deref(),
  )?;

  Ok(json!({
    "profile": request.profile,
    "valuations": request.portfolio.valuations(),
    "allocation": engine.current_allocation(&request.portfolio)?,
    "metrics": metrics,
    "risk": risk,
    "advice": advice,
    "optimization": optimum,
    "profile_rebalance": engine.rebalance_to_profile(&request.portfolio, request.profile)?,
    "symbol_rebalance": engine.rebalance_to_optimum(&request.portfolio, &optimum)?,
  }))
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  match cli.command {
    Command::Report { input, config } => {
      let output = report(&input, config.as_ref())?;
      println!("{}", serde_json::to_string_pretty(&output)?);
    }
  }

  Ok(())
}
