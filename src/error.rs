//! # Errors
//!
//! Typed failures for every engine operation. Each variant carries enough
//! context (series length, symbols, iteration count) to diagnose the input.

/// Error type for all engine operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error("portfolio is empty or has zero total value")]
  EmptyPortfolio,

  #[error("insufficient data for {context}: need at least {required}, got {actual}")]
  InsufficientData {
    context: String,
    required: usize,
    actual: usize,
  },

  /// Zero-volatility input. Reports map this to an undefined Sharpe ratio.
  #[error("degenerate risk: volatility {volatility} is zero")]
  DegenerateRisk { volatility: f64 },

  #[error("misaligned series ({context}): expected length {expected}, got {actual}")]
  MisalignedSeries {
    context: String,
    expected: usize,
    actual: usize,
  },

  #[error(
    "key sets differ: missing in current {missing_in_current:?}, missing in target {missing_in_target:?}"
  )]
  KeySetMismatch {
    missing_in_current: Vec<String>,
    missing_in_target: Vec<String>,
  },

  #[error("optimization diverged after {iterations} iterations: {reason}")]
  OptimizationDiverged { iterations: u64, reason: String },

  #[error("no feasible weights for {assets} assets with bounds [{min_weight}, {max_weight}]")]
  InfeasibleConstraints {
    assets: usize,
    min_weight: f64,
    max_weight: f64,
  },

  #[error("unknown risk profile: {0}")]
  UnknownRiskProfile(String),

  #[error("config error: {0}")]
  Config(#[from] serde_json::Error),
}

impl Error {
  pub(crate) fn insufficient(context: impl Into<String>, required: usize, actual: usize) -> Self {
    Self::InsufficientData {
      context: context.into(),
      required,
      actual,
    }
  }

  pub(crate) fn misaligned(context: impl Into<String>, expected: usize, actual: usize) -> Self {
    Self::MisalignedSeries {
      context: context.into(),
      expected,
      actual,
    }
  }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
