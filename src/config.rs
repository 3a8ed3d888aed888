//! # Engine Configuration
//!
//! Runtime knobs shared by every component. All fields have defaults, so an
//! empty JSON object is a valid configuration; unknown keys are rejected.

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;

/// Annualization periods for daily bars.
pub const TRADING_DAYS: usize = 252;

/// Iteration and time budget for the mean-variance solver.
///
/// The solve runs in two stages. Nelder-Mead gives a warm start within
/// `max_iters`; projected-gradient ascent then refines it until the
/// stationarity gap drops below `stationarity_tolerance`. Only the second
/// stage decides convergence: running out of `polish_iters` or `timeout_ms`
/// is a divergence. The defaults solve universes of 50 assets with a wide
/// margin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
  /// Nelder-Mead warm start iterations.
  pub max_iters: u64,
  /// Nelder-Mead stopping threshold on the standard deviation of simplex costs.
  pub sd_tolerance: f64,
  /// Projected-gradient iterations allowed to reach a stationary point.
  pub polish_iters: u64,
  /// Largest accepted `|w - P(w + grad f)| / max(1, |grad f|)` at the solution.
  pub stationarity_tolerance: f64,
  /// Optional wall-clock budget in milliseconds for both stages.
  pub timeout_ms: Option<u64>,
}

impl Default for SolverConfig {
  fn default() -> Self {
    Self {
      max_iters: 5000,
      sd_tolerance: 1e-10,
      polish_iters: 20_000,
      stationarity_tolerance: 1e-8,
      timeout_ms: None,
    }
  }
}

impl SolverConfig {
  pub fn timeout(&self) -> Option<Duration> {
    self.timeout_ms.map(Duration::from_millis)
  }
}

/// Runtime configuration for [`crate::portfolio::PortfolioEngine`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
  /// Annual risk-free rate used in Sharpe computations.
  pub risk_free_rate: f64,
  /// Bars per year used to annualize means and volatilities.
  pub periods_per_year: usize,
  /// Confidence level for VaR / CVaR.
  pub var_confidence: f64,
  /// Minimum absolute weight drift that triggers a rebalancing action.
  pub rebalance_tolerance: f64,
  /// Optimizer budget.
  pub solver: SolverConfig,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      risk_free_rate: 0.02,
      periods_per_year: TRADING_DAYS,
      var_confidence: 0.95,
      rebalance_tolerance: 0.05,
      solver: SolverConfig::default(),
    }
  }
}

impl EngineConfig {
  /// Parse a JSON document and validate the result.
  pub fn from_json_str(json: &str) -> Result<Self> {
    let config: Self = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<()> {
    if !self.risk_free_rate.is_finite() {
      return Err(Error::InvalidInput("risk_free_rate must be finite".into()));
    }
    if self.periods_per_year == 0 {
      return Err(Error::InvalidInput("periods_per_year must be positive".into()));
    }
    if !(self.var_confidence > 0.0 && self.var_confidence < 1.0) {
      return Err(Error::InvalidInput(format!(
        "var_confidence must lie in (0, 1), got {}",
        self.var_confidence
      )));
    }
    if !(self.rebalance_tolerance >= 0.0 && self.rebalance_tolerance.is_finite()) {
      return Err(Error::InvalidInput(format!(
        "rebalance_tolerance must be a non-negative number, got {}",
        self.rebalance_tolerance
      )));
    }
    if self.solver.max_iters == 0 {
      return Err(Error::InvalidInput("solver.max_iters must be positive".into()));
    }
    if !(self.solver.sd_tolerance > 0.0) {
      return Err(Error::InvalidInput("solver.sd_tolerance must be positive".into()));
    }
    if self.solver.polish_iters == 0 {
      return Err(Error::InvalidInput("solver.polish_iters must be positive".into()));
    }
    if !(self.solver.stationarity_tolerance > 0.0 && self.solver.stationarity_tolerance.is_finite()) {
      return Err(Error::InvalidInput(
        "solver.stationarity_tolerance must be a positive number".into(),
      ));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_json_yields_defaults() {
    let config = EngineConfig::from_json_str("{}").unwrap();
    assert_eq!(config, EngineConfig::default());
    assert_eq!(config.periods_per_year, 252);
    assert_eq!(config.solver.max_iters, 5000);
    assert_eq!(config.solver.polish_iters, 20_000);
  }

  #[test]
  fn partial_solver_section_keeps_other_defaults() {
    let config =
      EngineConfig::from_json_str(r#"{"risk_free_rate": 0.0, "solver": {"timeout_ms": 250}}"#)
        .unwrap();
    assert_eq!(config.risk_free_rate, 0.0);
    assert_eq!(config.solver.timeout(), Some(Duration::from_millis(250)));
    assert_eq!(config.solver.max_iters, 5000);
  }

  #[test]
  fn unknown_keys_are_rejected() {
    let err = EngineConfig::from_json_str(r#"{"risk_free": 0.01}"#).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
  }

  #[test]
  fn out_of_range_confidence_is_rejected() {
    let err = EngineConfig::from_json_str(r#"{"var_confidence": 1.0}"#).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
  }

  #[test]
  fn zero_polish_budget_is_rejected() {
    let err = EngineConfig::from_json_str(r#"{"solver": {"polish_iters": 0}}"#).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(ref msg) if msg.contains("polish_iters")));
  }
}
