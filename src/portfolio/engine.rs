//! # Portfolio Engine
//!
//! $$
//! \mathbf{w}^\* = \operatorname{Optimize}(\mu, \Sigma, \alpha, \beta)
//! $$
//!
//! High-level entry point wiring the returns calculator, risk analyzer,
//! allocation analyzer, optimizer and rebalancer to one [`EngineConfig`].
//! The engine holds no state besides its configuration.

use serde::Serialize;
use tracing::debug;
use tracing::instrument;

use super::allocation::align_keys;
use super::allocation::current_allocation;
use super::allocation::diversification_score;
use super::allocation::symbol_allocation;
use super::allocation::Category;
use super::allocation::ShareBasis;
use super::data::cumulative_values;
use super::data::series_log_returns;
use super::data::ReturnsMatrix;
use super::optimizers::optimize_mean_variance;
use super::optimizers::portfolio_return;
use super::optimizers::portfolio_volatility;
use super::optimizers::validate_weights;
use super::profile::RiskLevel;
use super::profile::RiskProfile;
use super::rebalance::rebalancing_actions;
use super::rebalance::RebalancingAction;
use super::risk::defined_sharpe;
use super::risk::risk_advice;
use super::risk::risk_report;
use super::risk::sharpe_from_moments;
use super::risk::RiskAdvice;
use super::risk::RiskReport;
use super::types::Allocation;
use super::types::OptimizationConstraints;
use super::types::OptimizationResult;
use super::types::Portfolio;
use super::types::PriceSeries;
use crate::config::EngineConfig;
use crate::error::Error;
use crate::error::Result;

/// Headline figures for a holdings set priced against a returns matrix.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PortfolioMetrics {
  pub total_value: f64,
  pub annual_return: f64,
  pub annual_risk: f64,
  pub sharpe_ratio: Option<f64>,
  /// Sector diversification, holding-count basis
  pub diversification_score: f64,
  pub risk_level: RiskLevel,
}

/// Single entry-point engine for risk, allocation and rebalancing workflows.
#[derive(Clone, Debug, Default)]
pub struct PortfolioEngine {
  config: EngineConfig,
}

impl PortfolioEngine {
  /// Construct a new engine with explicit configuration.
  pub fn new(config: EngineConfig) -> Self {
    Self { config }
  }

  /// Borrow engine configuration.
  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Aligned log returns for several price histories.
  pub fn returns_matrix(&self, prices: &[PriceSeries]) -> Result<ReturnsMatrix> {
    ReturnsMatrix::from_prices(prices)
  }

  /// Risk report of one instrument, optionally against a benchmark series.
  #[instrument(skip_all, fields(symbol = prices.symbol()))]
  pub fn analyze_series(
    &self,
    prices: &PriceSeries,
    benchmark: Option<&PriceSeries>,
  ) -> Result<RiskReport> {
    let returns = series_log_returns(prices)?;
    let bench = benchmark.map(series_log_returns).transpose()?;
    risk_report(&returns, &prices.prices(), bench.as_deref(), &self.config)
  }

  /// Risk report of a weighted combination of the matrix columns.
  ///
  /// Weights must be long-only and sum to one.
  #[instrument(skip_all, fields(assets = returns.n_assets()))]
  pub fn analyze_portfolio(
    &self,
    returns: &ReturnsMatrix,
    weights: &[f64],
    benchmark: Option<&[f64]>,
  ) -> Result<RiskReport> {
    let port_returns = returns.portfolio_returns(weights)?;
    validate_weights(weights)?;
    let path = cumulative_values(&port_returns);
    risk_report(&port_returns, &path, benchmark, &self.config)
  }

  /// Target weights for `profile` using historical mean returns.
  pub fn optimize(
    &self,
    returns: &ReturnsMatrix,
    profile: RiskProfile,
    constraints: &OptimizationConstraints,
  ) -> Result<OptimizationResult> {
    self.optimize_with_expected_returns(returns, profile, constraints, None)
  }

  /// Target weights for `profile`, optionally with injected expected returns.
  #[instrument(skip_all, fields(%profile, assets = returns.n_assets()))]
  pub fn optimize_with_expected_returns(
    &self,
    returns: &ReturnsMatrix,
    profile: RiskProfile,
    constraints: &OptimizationConstraints,
    expected_returns: Option<&[f64]>,
  ) -> Result<OptimizationResult> {
    let result = optimize_mean_variance(
      returns,
      profile.trade_off(),
      constraints,
      expected_returns,
      &self.config,
    )?;
    debug!(
      expected_return = result.expected_return,
      volatility = result.volatility,
      iterations = result.iterations,
      "optimization finished"
    );
    Ok(result)
  }

  /// Asset-class weights of a portfolio.
  pub fn current_allocation(&self, portfolio: &Portfolio) -> Result<Allocation> {
    current_allocation(&portfolio.holdings)
  }

  pub fn diversification_score(
    &self,
    portfolio: &Portfolio,
    category: Category,
    basis: ShareBasis,
  ) -> Result<f64> {
    diversification_score(&portfolio.holdings, category, basis)
  }

  /// Diff two allocations using the configured tolerance.
  pub fn rebalance(&self, current: &Allocation, target: &Allocation) -> Result<Vec<RebalancingAction>> {
    rebalancing_actions(current, target, self.config.rebalance_tolerance)
  }

  /// Asset-class actions toward the target mix of `profile`.
  ///
  /// Classes in the target but not held count as weight zero; held classes
  /// outside the target are a key-set mismatch.
  #[instrument(skip_all, fields(%profile))]
  pub fn rebalance_to_profile(
    &self,
    portfolio: &Portfolio,
    profile: RiskProfile,
  ) -> Result<Vec<RebalancingAction>> {
    let target = profile.target_allocation();
    let current = align_keys(&self.current_allocation(portfolio)?, target.keys());
    self.rebalance(&current, &target)
  }

  /// Symbol-level actions toward optimizer weights.
  ///
  /// Optimized symbols not yet held count as weight zero.
  pub fn rebalance_to_optimum(
    &self,
    portfolio: &Portfolio,
    optimum: &OptimizationResult,
  ) -> Result<Vec<RebalancingAction>> {
    let target = optimum.allocation();
    let current = align_keys(&symbol_allocation(&portfolio.holdings)?, target.keys());
    self.rebalance(&current, &target)
  }

  /// Value-weighted return, risk and diversification of the held symbols.
  #[instrument(skip_all, fields(holdings = portfolio.holdings.len()))]
  pub fn portfolio_metrics(
    &self,
    portfolio: &Portfolio,
    returns: &ReturnsMatrix,
  ) -> Result<PortfolioMetrics> {
    let held = symbol_allocation(&portfolio.holdings)?;
    let missing_in_target: Vec<String> = held
      .keys()
      .filter(|s| returns.column(s).is_none())
      .cloned()
      .collect();
    if !missing_in_target.is_empty() {
      return Err(Error::KeySetMismatch {
        missing_in_current: Vec::new(),
        missing_in_target,
      });
    }
    if returns.n_periods() < 2 {
      return Err(Error::insufficient(
        "observations per return series",
        2,
        returns.n_periods(),
      ));
    }

    let weights: Vec<f64> = returns
      .symbols()
      .iter()
      .map(|s| held.get(s).copied().unwrap_or(0.0))
      .collect();
    let mu = returns.mean_returns(self.config.periods_per_year);
    let cov = returns.covariance(self.config.periods_per_year);

    let annual_return = portfolio_return(&weights, &mu);
    let annual_risk = portfolio_volatility(&weights, &cov);
    let sharpe_ratio =
      defined_sharpe(sharpe_from_moments(annual_return, annual_risk, self.config.risk_free_rate))?;

    Ok(PortfolioMetrics {
      total_value: portfolio.total_value(),
      annual_return,
      annual_risk,
      sharpe_ratio,
      diversification_score: diversification_score(
        &portfolio.holdings,
        Category::Sector,
        ShareBasis::HoldingCount,
      )?,
      risk_level: RiskLevel::from_volatility(annual_risk),
    })
  }

  /// Findings for `report` under the limits of `profile`.
  pub fn risk_advice(&self, profile: RiskProfile, report: &RiskReport) -> Vec<RiskAdvice> {
    risk_advice(profile, report)
  }
}
