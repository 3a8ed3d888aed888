//! # Portfolio Optimizers
//!
//! $$
//! \max_{\mathbf{w}}\ \alpha\,\mathbf{w}^\top\mu - \beta\sqrt{\mathbf{w}^\top\Sigma\mathbf{w}}
//! \quad\text{s.t.}\quad \mathbf 1^\top\mathbf{w}=1,\ \ell \le w_i \le u
//! $$
//!
//! Long-only mean-variance optimizer. Nelder-Mead searches over unconstrained
//! points which are projected onto the bounded simplex before evaluation and
//! provides a warm start. Projected-gradient ascent then refines it until
//! `w = P(w + grad f)` holds within tolerance, so every returned point is
//! feasible and stationary.

use std::time::Instant;

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::State;
use argmin::core::TerminationReason;
use argmin::solver::neldermead::NelderMead;
use tracing::debug;
use tracing::warn;

use super::data::ReturnsMatrix;
use super::profile::TradeOff;
use super::risk::defined_sharpe;
use super::risk::sharpe_from_moments;
use super::risk::VOLATILITY_EPSILON;
use super::types::OptimizationConstraints;
use super::types::OptimizationResult;
use crate::config::EngineConfig;
use crate::config::SolverConfig;
use crate::error::Error;
use crate::error::Result;

const PROJECTION_STEPS: usize = 200;
const DISTANCE_PENALTY: f64 = 10.0;
/// Sufficient-increase constant of the Armijo line search.
const ARMIJO_SLOPE: f64 = 1e-4;
const MIN_STEP: f64 = 1e-12;
const MAX_STEP: f64 = 1e6;
/// Tolerance of the long-only, fully-invested weight contract.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

fn dot(a: &[f64], b: &[f64]) -> f64 {
  a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn mat_vec_mul(mat: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
  mat
    .iter()
    .map(|row| row.iter().zip(v.iter()).map(|(a, b)| a * b).sum())
    .collect()
}

fn norm(v: &[f64]) -> f64 {
  dot(v, v).sqrt()
}

/// Portfolio expected return `w'mu`.
pub fn portfolio_return(weights: &[f64], mu: &[f64]) -> f64 {
  dot(weights, mu)
}

/// Portfolio volatility `sqrt(w' Sigma w)`.
pub fn portfolio_volatility(weights: &[f64], cov: &[Vec<f64>]) -> f64 {
  let sigma_w = mat_vec_mul(cov, weights);
  dot(weights, &sigma_w).max(0.0).sqrt()
}

/// Check `weights` against the long-only, fully-invested contract.
pub fn validate_weights(weights: &[f64]) -> Result<()> {
  if let Some((i, w)) = weights
    .iter()
    .enumerate()
    .find(|(_, w)| !(w.is_finite() && **w >= -WEIGHT_TOLERANCE))
  {
    return Err(Error::InvalidInput(format!(
      "weight at index {i} must be finite and non-negative, got {w}"
    )));
  }
  let total: f64 = weights.iter().sum();
  if (total - 1.0).abs() > WEIGHT_TOLERANCE {
    return Err(Error::InvalidInput(format!(
      "weights must sum to 1, got {total}"
    )));
  }
  Ok(())
}

/// Euclidean projection of `x` onto `{w : sum(w) = 1, lo <= w_i <= hi}`.
///
/// Solves for the shift `tau` with `sum(clamp(x_i - tau, lo, hi)) = 1` by
/// bisection. Requires `n * lo <= 1 <= n * hi`.
pub fn project_to_bounded_simplex(x: &[f64], lo: f64, hi: f64) -> Vec<f64> {
  let shifted_sum = |tau: f64| -> f64 { x.iter().map(|&v| (v - tau).clamp(lo, hi)).sum() };

  let x_min = x.iter().copied().fold(f64::INFINITY, f64::min);
  let x_max = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
  // sum is n * hi at tau_low and n * lo at tau_high
  let mut tau_low = x_min - hi;
  let mut tau_high = x_max - lo;

  for _ in 0..PROJECTION_STEPS {
    let mid = 0.5 * (tau_low + tau_high);
    if shifted_sum(mid) > 1.0 {
      tau_low = mid;
    } else {
      tau_high = mid;
    }
    if tau_high - tau_low <= f64::EPSILON * (1.0 + tau_low.abs().max(tau_high.abs())) {
      break;
    }
  }

  let tau = 0.5 * (tau_low + tau_high);
  x.iter().map(|&v| (v - tau).clamp(lo, hi)).collect()
}

/// Mean-variance objective `alpha * w'mu - beta * sqrt(w' Sigma w)`.
pub fn mean_variance_objective(
  weights: &[f64],
  mu: &[f64],
  cov: &[Vec<f64>],
  trade_off: TradeOff,
) -> f64 {
  trade_off.alpha * portfolio_return(weights, mu)
    - trade_off.beta * portfolio_volatility(weights, cov)
}

/// Gradient of [`mean_variance_objective`]. The volatility term is dropped
/// where the portfolio is riskless.
fn objective_gradient(weights: &[f64], mu: &[f64], cov: &[Vec<f64>], trade_off: TradeOff) -> Vec<f64> {
  let sigma_w = mat_vec_mul(cov, weights);
  let volatility = dot(weights, &sigma_w).max(0.0).sqrt();
  let risk_scale = if volatility > VOLATILITY_EPSILON {
    trade_off.beta / volatility
  } else {
    0.0
  };

  mu.iter()
    .zip(sigma_w.iter())
    .map(|(m, s)| trade_off.alpha * m - risk_scale * s)
    .collect()
}

fn gap_from_gradient(weights: &[f64], gradient: &[f64], lo: f64, hi: f64) -> f64 {
  let ascent: Vec<f64> = weights.iter().zip(gradient.iter()).map(|(w, g)| w + g).collect();
  let projected = project_to_bounded_simplex(&ascent, lo, hi);
  let residual: Vec<f64> = weights.iter().zip(projected.iter()).map(|(w, p)| w - p).collect();
  norm(&residual) / norm(gradient).max(1.0)
}

/// Relative stationarity gap `|w - P(w + grad f)| / max(1, |grad f|)`.
///
/// Zero exactly at the KKT points of the objective over the bounded simplex.
pub fn stationarity_gap(
  weights: &[f64],
  mu: &[f64],
  cov: &[Vec<f64>],
  trade_off: TradeOff,
  lo: f64,
  hi: f64,
) -> f64 {
  let gradient = objective_gradient(weights, mu, cov, trade_off);
  gap_from_gradient(weights, &gradient, lo, hi)
}

#[derive(Clone)]
struct MeanVarianceCost {
  mu: Vec<f64>,
  cov: Vec<Vec<f64>>,
  trade_off: TradeOff,
  lo: f64,
  hi: f64,
}

impl MeanVarianceCost {
  fn objective(&self, weights: &[f64]) -> f64 {
    mean_variance_objective(weights, &self.mu, &self.cov, self.trade_off)
  }

  fn gradient(&self, weights: &[f64]) -> Vec<f64> {
    objective_gradient(weights, &self.mu, &self.cov, self.trade_off)
  }

  fn project(&self, x: &[f64]) -> Vec<f64> {
    project_to_bounded_simplex(x, self.lo, self.hi)
  }
}

impl CostFunction for MeanVarianceCost {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    let w = self.project(x);
    let distance: f64 = x.iter().zip(w.iter()).map(|(a, b)| (a - b).powi(2)).sum();

    Ok(-self.objective(&w) + DISTANCE_PENALTY * distance)
  }
}

fn diverged(iterations: u64, reason: impl ToString) -> Error {
  Error::OptimizationDiverged {
    iterations,
    reason: reason.to_string(),
  }
}

fn timed_out(deadline: Option<Instant>) -> bool {
  matches!(deadline, Some(deadline) if Instant::now() >= deadline)
}

/// Projected-gradient ascent with an Armijo backtracking line search.
///
/// Returns the stationary weights and the iterations spent, or a divergence
/// when the budget, the deadline or the line search runs out first.
fn polish(
  cost: &MeanVarianceCost,
  start: &[f64],
  solver: &SolverConfig,
  deadline: Option<Instant>,
) -> Result<(Vec<f64>, u64)> {
  let mut weights = cost.project(start);
  let mut value = cost.objective(&weights);
  let mut step = 1.0;

  for iter in 0..=solver.polish_iters {
    if timed_out(deadline) {
      return Err(diverged(iter, "Timeout"));
    }

    let gradient = cost.gradient(&weights);
    let gap = gap_from_gradient(&weights, &gradient, cost.lo, cost.hi);
    if gap <= solver.stationarity_tolerance {
      return Ok((weights, iter));
    }
    if iter == solver.polish_iters {
      return Err(diverged(iter, format!("stationarity gap {gap:e} above tolerance")));
    }

    let mut accepted = None;
    while step >= MIN_STEP {
      let trial: Vec<f64> = weights
        .iter()
        .zip(gradient.iter())
        .map(|(w, g)| w + step * g)
        .collect();
      let candidate = cost.project(&trial);
      let candidate_value = cost.objective(&candidate);
      let moved: Vec<f64> = candidate.iter().zip(weights.iter()).map(|(c, w)| c - w).collect();
      if candidate_value >= value + ARMIJO_SLOPE * dot(&gradient, &moved) {
        accepted = Some((candidate, candidate_value));
        break;
      }
      step *= 0.5;
    }

    match accepted {
      Some((candidate, candidate_value)) => {
        weights = candidate;
        value = candidate_value;
        step = (step * 2.0).min(MAX_STEP);
      }
      None => {
        return Err(diverged(iter, format!("line search stalled at stationarity gap {gap:e}")));
      }
    }
  }

  Err(diverged(solver.polish_iters, "iteration budget exhausted"))
}

/// Solve for long-only weights given annualized moments.
///
/// Starts from uniform weights `1/N`. Returns stationary weights together
/// with the number of solver iterations across both stages.
pub fn optimize_weights(
  mu: &[f64],
  cov: &[Vec<f64>],
  trade_off: TradeOff,
  constraints: &OptimizationConstraints,
  solver: &SolverConfig,
) -> Result<(Vec<f64>, u64)> {
  let n = mu.len();
  if n < 2 {
    return Err(Error::insufficient("optimizer assets", 2, n));
  }
  if cov.len() != n {
    return Err(Error::misaligned("covariance rows", n, cov.len()));
  }
  if let Some(row) = cov.iter().find(|row| row.len() != n) {
    return Err(Error::misaligned("covariance columns", n, row.len()));
  }
  if mu.iter().chain(cov.iter().flatten()).any(|v| !v.is_finite()) {
    return Err(Error::InvalidInput(
      "expected returns and covariance must be finite".into(),
    ));
  }
  let (lo, hi) = constraints.bounds(n)?;
  let deadline = solver.timeout().map(|timeout| Instant::now() + timeout);

  let cost = MeanVarianceCost {
    mu: mu.to_vec(),
    cov: cov.to_vec(),
    trade_off,
    lo,
    hi,
  };

  let x0 = vec![1.0 / n as f64; n];
  let step = 1.0 / n as f64;
  let mut simplex = Vec::with_capacity(n + 1);
  simplex.push(x0.clone());
  for i in 0..n {
    let mut point = x0.clone();
    point[i] += step;
    simplex.push(point);
  }

  let nelder_mead = NelderMead::new(simplex)
    .with_sd_tolerance(solver.sd_tolerance)
    .map_err(|e| diverged(0, e))?;

  let mut executor =
    Executor::new(cost.clone(), nelder_mead).configure(|state| state.max_iters(solver.max_iters));
  if let Some(timeout) = solver.timeout() {
    executor = executor.timeout(timeout);
  }

  debug!(assets = n, lo, hi, max_iters = solver.max_iters, "starting mean-variance solve");
  let res = executor.run().map_err(|e| diverged(0, e))?;
  let warm_iterations = res.state.get_iter();

  match res.state.get_termination_reason() {
    Some(TerminationReason::SolverConverged)
    | Some(TerminationReason::TargetCostReached)
    | Some(TerminationReason::MaxItersReached) => {}
    reason => {
      let reason = reason.map_or_else(|| "solver did not terminate".to_string(), |r| format!("{r:?}"));
      warn!(iterations = warm_iterations, %reason, "mean-variance warm start aborted");
      return Err(diverged(warm_iterations, reason));
    }
  }

  let warm_start = res.state.best_param.unwrap_or(x0);
  let (weights, polish_iterations) =
    polish(&cost, &warm_start, solver, deadline).map_err(|err| match err {
      Error::OptimizationDiverged { iterations, reason } => {
        warn!(iterations = warm_iterations + iterations, %reason, "mean-variance solve did not converge");
        diverged(warm_iterations + iterations, reason)
      }
      other => other,
    })?;
  let iterations = warm_iterations + polish_iterations;
  debug!(
    iterations,
    warm_iterations,
    objective = cost.objective(&weights),
    "mean-variance solve converged"
  );

  Ok((weights, iterations))
}

/// Optimize a returns matrix for the given trade-off.
///
/// `expected_returns` replaces the historical annualized mean when supplied,
/// e.g. with forecasts; it must be aligned with the matrix symbols.
pub fn optimize_mean_variance(
  returns: &ReturnsMatrix,
  trade_off: TradeOff,
  constraints: &OptimizationConstraints,
  expected_returns: Option<&[f64]>,
  config: &EngineConfig,
) -> Result<OptimizationResult> {
  if returns.n_assets() < 2 {
    return Err(Error::insufficient("optimizer assets", 2, returns.n_assets()));
  }
  if returns.n_periods() < 2 {
    return Err(Error::insufficient(
      "observations per return series",
      2,
      returns.n_periods(),
    ));
  }

  let mu = match expected_returns {
    Some(mu) if mu.len() != returns.n_assets() => {
      return Err(Error::misaligned("expected returns", returns.n_assets(), mu.len()));
    }
    Some(mu) => mu.to_vec(),
    None => returns.mean_returns(config.periods_per_year),
  };
  let cov = returns.covariance(config.periods_per_year);

  let (weights, iterations) = optimize_weights(&mu, &cov, trade_off, constraints, &config.solver)?;

  let expected_return = portfolio_return(&weights, &mu);
  let volatility = portfolio_volatility(&weights, &cov);
  let sharpe_ratio =
    defined_sharpe(sharpe_from_moments(expected_return, volatility, config.risk_free_rate))?;

  Ok(OptimizationResult {
    symbols: returns.symbols().to_vec(),
    weights,
    expected_return,
    volatility,
    sharpe_ratio,
    iterations,
  })
}
