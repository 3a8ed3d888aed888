//! # Risk Metrics
//!
//! $$
//! \sigma_a = \sigma\sqrt{252},\qquad
//! \mathrm{VaR}_c = Q_{1-c}(r),\qquad
//! \mathrm{CVaR}_c = \mathbb E[r \mid r \le \mathrm{VaR}_c]
//! $$
//!
//! Pure functions over a return series (or a value path for drawdowns), the
//! aggregated [`RiskReport`] and profile-based [`RiskAdvice`].

use serde::Serialize;
use statrs::statistics::Statistics;
use tracing::debug;
use tracing::warn;

use super::data::pearson;
use super::profile::RiskLevel;
use super::profile::RiskProfile;
use crate::config::EngineConfig;
use crate::error::Error;
use crate::error::Result;

/// Volatilities at or below this are treated as zero.
pub const VOLATILITY_EPSILON: f64 = 1e-12;

fn require_len(returns: &[f64], required: usize, context: &str) -> Result<()> {
  if returns.len() < required {
    return Err(Error::insufficient(context, required, returns.len()));
  }
  Ok(())
}

/// Population standard deviation scaled by `sqrt(periods_per_year)`.
pub fn annualized_volatility(returns: &[f64], periods_per_year: usize) -> Result<f64> {
  require_len(returns, 2, "volatility")?;
  Ok(returns.iter().population_std_dev() * (periods_per_year as f64).sqrt())
}

/// Mean return scaled by `periods_per_year`.
pub fn annualized_return(returns: &[f64], periods_per_year: usize) -> Result<f64> {
  require_len(returns, 1, "expected return")?;
  Ok(returns.iter().mean() * periods_per_year as f64)
}

/// `(expected_return - risk_free) / volatility` on annualized figures.
pub fn sharpe_from_moments(expected_return: f64, volatility: f64, risk_free: f64) -> Result<f64> {
  if volatility <= VOLATILITY_EPSILON {
    return Err(Error::DegenerateRisk { volatility });
  }
  Ok((expected_return - risk_free) / volatility)
}

/// Annualized Sharpe ratio of a periodic return series.
///
/// The risk-free rate is pro-rated per period before taking excess returns,
/// which is equivalent to `(252 * mean - rf) / (sqrt(252) * std)`.
pub fn sharpe_ratio(returns: &[f64], risk_free: f64, periods_per_year: usize) -> Result<f64> {
  let volatility = annualized_volatility(returns, periods_per_year)?;
  let expected_return = annualized_return(returns, periods_per_year)?;
  sharpe_from_moments(expected_return, volatility, risk_free)
}

/// Map a degenerate Sharpe to `None`, propagating every other failure.
pub(crate) fn defined_sharpe(sharpe: Result<f64>) -> Result<Option<f64>> {
  match sharpe {
    Ok(value) => Ok(Some(value)),
    Err(Error::DegenerateRisk { volatility }) => {
      warn!(volatility, "zero volatility, sharpe ratio is undefined");
      Ok(None)
    }
    Err(err) => Err(err),
  }
}

/// Largest peak-to-trough decline of a positive value path, in `[0, 1]`.
pub fn max_drawdown(values: &[f64]) -> Result<f64> {
  require_len(values, 1, "max drawdown")?;
  if let Some(i) = values.iter().position(|&v| !(v.is_finite() && v > 0.0)) {
    return Err(Error::InvalidInput(format!(
      "value path entry {i} must be positive, got {}",
      values[i]
    )));
  }

  let mut peak = values[0];
  let mut max_dd: f64 = 0.0;
  for &value in values {
    if value > peak {
      peak = value;
    }
    max_dd = max_dd.max((peak - value) / peak);
  }

  Ok(max_dd)
}

fn check_confidence(confidence: f64) -> Result<()> {
  if !(confidence > 0.0 && confidence < 1.0) {
    return Err(Error::InvalidInput(format!(
      "confidence must lie in (0, 1), got {confidence}"
    )));
  }
  Ok(())
}

/// Linear-interpolated quantile `q` of sorted data.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
  let pos = q * (sorted.len() - 1) as f64;
  let lo = pos.floor() as usize;
  let hi = pos.ceil() as usize;
  let frac = pos - lo as f64;
  sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// Historical VaR: the `(1 - confidence)` empirical percentile of returns.
pub fn value_at_risk(returns: &[f64], confidence: f64) -> Result<f64> {
  check_confidence(confidence)?;
  require_len(returns, 1, "value at risk")?;

  let mut sorted = returns.to_vec();
  sorted.sort_by(f64::total_cmp);
  Ok(quantile_sorted(&sorted, 1.0 - confidence))
}

/// Historical CVaR: mean of returns at or below the VaR threshold.
pub fn conditional_value_at_risk(returns: &[f64], confidence: f64) -> Result<f64> {
  let var = value_at_risk(returns, confidence)?;
  let tail: Vec<f64> = returns.iter().copied().filter(|&r| r <= var).collect();

  if tail.is_empty() {
    Ok(var)
  } else {
    Ok(tail.iter().mean())
  }
}

/// Pearson correlation with a benchmark; `None` when either side is flat.
pub fn market_correlation(returns: &[f64], benchmark: &[f64]) -> Result<Option<f64>> {
  if returns.len() != benchmark.len() {
    return Err(Error::misaligned(
      "benchmark returns",
      returns.len(),
      benchmark.len(),
    ));
  }
  require_len(returns, 2, "market correlation")?;
  Ok(pearson(returns, benchmark))
}

/// Risk summary of one return stream.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RiskReport {
  /// Annualized volatility
  pub volatility: f64,
  /// Annualized mean return
  pub expected_return: f64,
  /// `None` when volatility is zero
  pub sharpe_ratio: Option<f64>,
  /// Fraction in `[0, 1]`
  pub max_drawdown: f64,
  /// Confidence level of `var` / `cvar`
  pub confidence: f64,
  /// Periodic VaR (typically negative)
  pub var: f64,
  /// Periodic CVaR, never above `var`
  pub cvar: f64,
  /// Pearson correlation to the benchmark, when one is supplied and not flat
  pub market_correlation: Option<f64>,
  pub risk_level: RiskLevel,
}

/// Build a [`RiskReport`] from periodic returns and the matching value path.
pub fn risk_report(
  returns: &[f64],
  value_path: &[f64],
  benchmark: Option<&[f64]>,
  config: &EngineConfig,
) -> Result<RiskReport> {
  let periods = config.periods_per_year;
  let volatility = annualized_volatility(returns, periods)?;
  let expected_return = annualized_return(returns, periods)?;
  let sharpe_ratio =
    defined_sharpe(sharpe_from_moments(expected_return, volatility, config.risk_free_rate))?;
  let max_drawdown = max_drawdown(value_path)?;
  let var = value_at_risk(returns, config.var_confidence)?;
  let cvar = conditional_value_at_risk(returns, config.var_confidence)?;
  let market_correlation = match benchmark {
    Some(bench) => market_correlation(returns, bench)?,
    None => None,
  };

  let report = RiskReport {
    volatility,
    expected_return,
    sharpe_ratio,
    max_drawdown,
    confidence: config.var_confidence,
    var,
    cvar,
    market_correlation,
    risk_level: RiskLevel::from_volatility(volatility),
  };
  debug!(
    volatility,
    max_drawdown,
    var,
    cvar,
    risk_level = ?report.risk_level,
    "risk report computed"
  );

  Ok(report)
}

/// Severity of a [`RiskAdvice`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdviceKind {
  Warning,
  Suggestion,
}

/// Finding from comparing a [`RiskReport`] against a profile's limits.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "finding", rename_all = "snake_case")]
pub enum RiskAdvice {
  VolatilityAboveLimit { volatility: f64, limit: f64 },
  DrawdownAboveLimit { max_drawdown: f64, limit: f64 },
  LowSharpe { sharpe_ratio: f64 },
}

impl RiskAdvice {
  pub fn kind(&self) -> AdviceKind {
    match self {
      Self::VolatilityAboveLimit { .. } | Self::DrawdownAboveLimit { .. } => AdviceKind::Warning,
      Self::LowSharpe { .. } => AdviceKind::Suggestion,
    }
  }

  pub fn message(&self) -> String {
    match self {
      Self::VolatilityAboveLimit { volatility, limit } => format!(
        "volatility {:.1}% exceeds the {:.1}% limit; shift toward lower-volatility assets",
        volatility * 100.0,
        limit * 100.0
      ),
      Self::DrawdownAboveLimit { max_drawdown, limit } => format!(
        "max drawdown {:.1}% exceeds the {:.1}% limit; consider stop-losses and wider diversification",
        max_drawdown * 100.0,
        limit * 100.0
      ),
      Self::LowSharpe { sharpe_ratio } => format!(
        "sharpe ratio {sharpe_ratio:.2} is below 1; the portfolio may benefit from optimization"
      ),
    }
  }
}

/// Compare a report with the limits of `profile`. Findings come in a fixed
/// order: volatility, drawdown, sharpe.
pub fn risk_advice(profile: RiskProfile, report: &RiskReport) -> Vec<RiskAdvice> {
  let limits = profile.limits();
  let mut advice = Vec::new();

  if report.volatility > limits.max_volatility {
    advice.push(RiskAdvice::VolatilityAboveLimit {
      volatility: report.volatility,
      limit: limits.max_volatility,
    });
  }
  if report.max_drawdown > limits.max_drawdown {
    advice.push(RiskAdvice::DrawdownAboveLimit {
      max_drawdown: report.max_drawdown,
      limit: limits.max_drawdown,
    });
  }
  if let Some(sharpe_ratio) = report.sharpe_ratio {
    if sharpe_ratio < 1.0 {
      advice.push(RiskAdvice::LowSharpe { sharpe_ratio });
    }
  }

  advice
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use approx::assert_relative_eq;
  use tracing_test::traced_test;

  use super::*;
  use crate::portfolio::data::cumulative_values;

  fn sample_returns() -> Vec<f64> {
    vec![
      0.012, -0.034, 0.005, 0.021, -0.011, 0.0, 0.017, -0.052, 0.009, 0.003, -0.007, 0.026, -0.019,
      0.011, 0.004, -0.028, 0.015, 0.008, -0.002, 0.031,
    ]
  }

  #[test]
  fn volatility_uses_population_std() {
    let r = [0.01, -0.01, 0.01, -0.01];
    // population std is exactly 0.01
    assert_relative_eq!(annualized_volatility(&r, 252).unwrap(), 0.01 * 252f64.sqrt(), epsilon = 1e-12);
    assert!(matches!(
      annualized_volatility(&[0.01], 252),
      Err(Error::InsufficientData { required: 2, actual: 1, .. })
    ));
  }

  #[test]
  fn sharpe_prorates_risk_free_rate() {
    let r = sample_returns();
    let mean = r.iter().mean();
    let std = r.iter().population_std_dev();
    let expected = 252f64.sqrt() * (mean - 0.02 / 252.0) / std;
    assert_relative_eq!(sharpe_ratio(&r, 0.02, 252).unwrap(), expected, epsilon = 1e-10);
  }

  #[test]
  fn sharpe_is_degenerate_for_flat_returns() {
    let err = sharpe_ratio(&[0.0, 0.0, 0.0], 0.02, 252).unwrap_err();
    assert!(matches!(err, Error::DegenerateRisk { .. }));
  }

  #[test]
  fn drawdown_of_rising_path_is_zero() {
    assert_eq!(max_drawdown(&[1.0, 2.0, 3.0, 4.0]).unwrap(), 0.0);
  }

  #[test]
  fn drawdown_keeps_worst_dip_after_new_peak() {
    assert_abs_diff_eq!(max_drawdown(&[100.0, 80.0]).unwrap(), 0.2, epsilon = 1e-12);
    assert_abs_diff_eq!(max_drawdown(&[100.0, 80.0, 120.0]).unwrap(), 0.2, epsilon = 1e-12);
  }

  #[test]
  fn drawdown_never_shrinks_as_window_grows() {
    let path = cumulative_values(&sample_returns());
    let mut previous = 0.0;
    for end in 1..=path.len() {
      let dd = max_drawdown(&path[..end]).unwrap();
      assert!((0.0..=1.0).contains(&dd));
      assert!(dd >= previous);
      previous = dd;
    }
  }

  #[test]
  fn drawdown_rejects_non_positive_values() {
    assert!(matches!(max_drawdown(&[1.0, 0.0]), Err(Error::InvalidInput(_))));
    assert!(matches!(max_drawdown(&[]), Err(Error::InsufficientData { .. })));
  }

  #[test]
  fn var_interpolates_empirical_percentile() {
    let r: Vec<f64> = (1..=21).map(|i| i as f64 / 100.0 - 0.11).collect();
    // 5th percentile of an evenly spaced grid from -0.10 to 0.10
    assert_abs_diff_eq!(value_at_risk(&r, 0.95).unwrap(), -0.09, epsilon = 1e-12);
    assert!(value_at_risk(&r, 1.0).is_err());
  }

  #[test]
  fn cvar_is_at_most_var() {
    let r = sample_returns();
    for confidence in [0.8, 0.9, 0.95, 0.99] {
      let var = value_at_risk(&r, confidence).unwrap();
      let cvar = conditional_value_at_risk(&r, confidence).unwrap();
      assert!(cvar <= var, "confidence {confidence}: cvar {cvar} > var {var}");
    }
  }

  #[test]
  fn cvar_equals_var_for_constant_returns() {
    let r = [0.01; 10];
    assert_eq!(
      conditional_value_at_risk(&r, 0.95).unwrap(),
      value_at_risk(&r, 0.95).unwrap()
    );
  }

  #[test]
  fn correlation_requires_equal_lengths() {
    assert!(matches!(
      market_correlation(&[0.1, 0.2, 0.3], &[0.1, 0.2]),
      Err(Error::MisalignedSeries {
        expected: 3,
        actual: 2,
        ..
      })
    ));
    let rho = market_correlation(&[0.01, 0.02, -0.01], &[-0.01, -0.02, 0.01])
      .unwrap()
      .unwrap();
    assert_abs_diff_eq!(rho, -1.0, epsilon = 1e-12);
  }

  #[test]
  #[traced_test]
  fn report_with_flat_returns_has_undefined_sharpe() {
    let returns = [0.0; 5];
    let path = cumulative_values(&returns);
    let report = risk_report(&returns, &path, None, &EngineConfig::default()).unwrap();

    assert!(report.sharpe_ratio.is_none());
    assert_eq!(report.volatility, 0.0);
    assert_eq!(report.risk_level, RiskLevel::Low);
    assert!(logs_contain("sharpe ratio is undefined"));
  }

  #[test]
  fn report_collects_all_metrics() {
    let returns = sample_returns();
    let bench: Vec<f64> = returns.iter().map(|r| r * 0.5 + 0.001).collect();
    let path = cumulative_values(&returns);
    let report = risk_report(&returns, &path, Some(&bench), &EngineConfig::default()).unwrap();

    assert!(report.cvar <= report.var);
    assert_abs_diff_eq!(report.market_correlation.unwrap(), 1.0, epsilon = 1e-12);
    assert_eq!(report.risk_level, RiskLevel::from_volatility(report.volatility));
    assert!(report.max_drawdown > 0.0);
  }

  #[test]
  fn advice_flags_each_breached_limit() {
    let report = RiskReport {
      volatility: 0.30,
      expected_return: 0.05,
      sharpe_ratio: Some(0.1),
      max_drawdown: 0.25,
      confidence: 0.95,
      var: -0.03,
      cvar: -0.04,
      market_correlation: None,
      risk_level: RiskLevel::High,
    };

    let conservative = risk_advice(RiskProfile::Conservative, &report);
    assert_eq!(conservative.len(), 3);
    assert_eq!(conservative[0].kind(), AdviceKind::Warning);
    assert!(matches!(conservative[1], RiskAdvice::DrawdownAboveLimit { .. }));
    assert_eq!(conservative[2].kind(), AdviceKind::Suggestion);

    let aggressive = risk_advice(
      RiskProfile::Aggressive,
      &RiskReport {
        sharpe_ratio: None,
        ..report
      },
    );
    assert!(aggressive.is_empty());
  }
}
