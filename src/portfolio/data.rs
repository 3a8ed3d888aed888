//! # Portfolio Data Utilities
//!
//! $$
//! r_t = \ln p_t - \ln p_{t-1},\qquad \Sigma_{ij} = 252\,\operatorname{cov}(r_i, r_j)
//! $$
//!
//! Returns calculator and the aligned multi-asset returns matrix consumed by
//! both the risk analyzer and the optimizer.

use statrs::statistics::Statistics;

use super::types::PriceSeries;
use crate::error::Error;
use crate::error::Result;

/// Convert prices to log returns `ln(p_t / p_{t-1})`.
pub fn log_returns(prices: &[f64]) -> Result<Vec<f64>> {
  if prices.len() < 2 {
    return Err(Error::InvalidInput(format!(
      "a return series needs at least 2 prices, got {}",
      prices.len()
    )));
  }
  if let Some(i) = prices.iter().position(|&p| !(p.is_finite() && p > 0.0)) {
    return Err(Error::InvalidInput(format!(
      "price at index {i} must be positive, got {}",
      prices[i]
    )));
  }

  Ok(prices.windows(2).map(|w| w[1].ln() - w[0].ln()).collect())
}

/// Log returns of a validated price series.
pub fn series_log_returns(series: &PriceSeries) -> Result<Vec<f64>> {
  log_returns(&series.prices()).map_err(|err| match err {
    Error::InvalidInput(msg) => Error::InvalidInput(format!("{}: {msg}", series.symbol())),
    other => other,
  })
}

/// Rebuild a price path from a starting price and log returns.
pub fn reconstruct_prices(initial: f64, returns: &[f64]) -> Vec<f64> {
  let mut out = Vec::with_capacity(returns.len() + 1);
  let mut level = initial;
  out.push(level);
  for r in returns {
    level *= r.exp();
    out.push(level);
  }
  out
}

/// Value path of one unit invested, used for drawdowns of return-only inputs.
pub fn cumulative_values(returns: &[f64]) -> Vec<f64> {
  reconstruct_prices(1.0, returns)
}

pub(crate) fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
  let n = x.len().min(y.len());
  if n < 2 {
    return None;
  }

  let mx = x.iter().mean();
  let my = y.iter().mean();

  let mut cov = 0.0;
  let mut sx = 0.0;
  let mut sy = 0.0;

  for i in 0..n {
    let dx = x[i] - mx;
    let dy = y[i] - my;
    cov += dx * dy;
    sx += dx * dx;
    sy += dy * dy;
  }

  let denom = (sx * sy).sqrt();
  if denom < 1e-15 {
    None
  } else {
    Some((cov / denom).clamp(-1.0, 1.0))
  }
}

/// Per-symbol return series sharing one time index.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnsMatrix {
  symbols: Vec<String>,
  columns: Vec<Vec<f64>>,
}

impl ReturnsMatrix {
  /// Build from `(symbol, returns)` columns. All columns must have equal length.
  pub fn new(columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
    let expected = columns.first().map(|(_, r)| r.len()).unwrap_or(0);
    let mut symbols = Vec::with_capacity(columns.len());
    let mut data = Vec::with_capacity(columns.len());

    for (symbol, returns) in columns {
      if symbols.contains(&symbol) {
        return Err(Error::InvalidInput(format!("duplicate symbol {symbol}")));
      }
      if returns.len() != expected {
        return Err(Error::misaligned(
          format!("returns for {symbol}"),
          expected,
          returns.len(),
        ));
      }
      if let Some(i) = returns.iter().position(|r| !r.is_finite()) {
        return Err(Error::InvalidInput(format!(
          "{symbol}: return at index {i} is not finite"
        )));
      }
      symbols.push(symbol);
      data.push(returns);
    }

    Ok(Self {
      symbols,
      columns: data,
    })
  }

  /// Compute log returns for each series. Every series must share the same timestamps.
  pub fn from_prices(series: &[PriceSeries]) -> Result<Self> {
    let Some(first) = series.first() else {
      return Self::new(Vec::new());
    };
    let index = first.timestamps();

    let mut columns = Vec::with_capacity(series.len());
    for s in series {
      if s.len() != index.len() {
        return Err(Error::misaligned(
          format!("prices for {}", s.symbol()),
          index.len(),
          s.len(),
        ));
      }
      if let Some(i) = s
        .points()
        .iter()
        .zip(index.iter())
        .position(|(p, t)| p.timestamp != *t)
      {
        return Err(Error::misaligned(
          format!("{} timestamp differs from {} at index {i}", s.symbol(), first.symbol()),
          index.len(),
          s.len(),
        ));
      }
      columns.push((s.symbol().to_string(), series_log_returns(s)?));
    }

    Self::new(columns)
  }

  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn columns(&self) -> &[Vec<f64>] {
    &self.columns
  }

  pub fn column(&self, symbol: &str) -> Option<&[f64]> {
    self
      .symbols
      .iter()
      .position(|s| s == symbol)
      .map(|i| self.columns[i].as_slice())
  }

  pub fn n_assets(&self) -> usize {
    self.symbols.len()
  }

  pub fn n_periods(&self) -> usize {
    self.columns.first().map(Vec::len).unwrap_or(0)
  }

  /// Annualized mean return per asset.
  pub fn mean_returns(&self, periods_per_year: usize) -> Vec<f64> {
    self
      .columns
      .iter()
      .map(|r| r.iter().mean() * periods_per_year as f64)
      .collect()
  }

  /// Annualized sample covariance matrix.
  pub fn covariance(&self, periods_per_year: usize) -> Vec<Vec<f64>> {
    let n = self.columns.len();
    let scale = periods_per_year as f64;
    let mut cov = vec![vec![0.0; n]; n];

    for i in 0..n {
      for j in i..n {
        let c = self.columns[i].iter().covariance(self.columns[j].iter()) * scale;
        cov[i][j] = c;
        cov[j][i] = c;
      }
    }

    cov
  }

  /// Per-period returns of the weighted portfolio.
  pub fn portfolio_returns(&self, weights: &[f64]) -> Result<Vec<f64>> {
    if weights.len() != self.n_assets() {
      return Err(Error::misaligned("portfolio weights", self.n_assets(), weights.len()));
    }

    Ok(
      (0..self.n_periods())
        .map(|t| {
          weights
            .iter()
            .zip(self.columns.iter())
            .map(|(w, col)| w * col[t])
            .sum()
        })
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use chrono::TimeZone;
  use chrono::Utc;

  use super::*;

  #[test]
  fn log_returns_match_definition() {
    let r = log_returns(&[100.0, 110.0, 99.0]).unwrap();
    assert_eq!(r.len(), 2);
    assert_abs_diff_eq!(r[0], (1.1_f64).ln(), epsilon = 1e-12);
    assert_abs_diff_eq!(r[1], (0.9_f64).ln(), epsilon = 1e-12);
  }

  #[test]
  fn log_returns_reject_short_or_bad_series() {
    assert!(matches!(log_returns(&[100.0]), Err(Error::InvalidInput(_))));
    assert!(matches!(log_returns(&[100.0, -1.0]), Err(Error::InvalidInput(_))));
    assert!(matches!(log_returns(&[100.0, f64::NAN]), Err(Error::InvalidInput(_))));
  }

  #[test]
  fn reconstructed_prices_round_trip() {
    let prices = [52.3, 55.1, 49.8, 49.8, 61.0, 58.25, 70.4];
    let returns = log_returns(&prices).unwrap();
    let rebuilt = reconstruct_prices(prices[0], &returns);

    assert_eq!(rebuilt.len(), prices.len());
    for (a, b) in rebuilt.iter().zip(prices.iter()) {
      assert_abs_diff_eq!(a, b, epsilon = 1e-9);
    }
  }

  #[test]
  fn matrix_rejects_unequal_lengths() {
    let err = ReturnsMatrix::new(vec![
      ("A".into(), vec![0.01, 0.02, 0.03]),
      ("B".into(), vec![0.01, 0.02]),
    ])
    .unwrap_err();
    assert!(matches!(
      err,
      Error::MisalignedSeries {
        expected: 3,
        actual: 2,
        ..
      }
    ));
  }

  #[test]
  fn matrix_from_prices_requires_shared_timestamps() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let a = PriceSeries::from_closes("A", t0, &[1.0, 2.0, 3.0]).unwrap();
    let b = PriceSeries::from_closes("B", t0 + chrono::Duration::days(1), &[1.0, 2.0, 3.0]).unwrap();
    assert!(matches!(
      ReturnsMatrix::from_prices(&[a.clone(), b]),
      Err(Error::MisalignedSeries { .. })
    ));

    let c = PriceSeries::from_closes("C", t0, &[4.0, 3.0, 5.0]).unwrap();
    let m = ReturnsMatrix::from_prices(&[a, c]).unwrap();
    assert_eq!(m.n_assets(), 2);
    assert_eq!(m.n_periods(), 2);
    assert_abs_diff_eq!(m.column("A").unwrap()[0], 2.0_f64.ln(), epsilon = 1e-12);
  }

  #[test]
  fn covariance_is_annualized_sample_covariance() {
    let m = ReturnsMatrix::new(vec![
      ("A".into(), vec![0.01, -0.01, 0.02, 0.0]),
      ("B".into(), vec![0.02, -0.02, 0.04, 0.0]),
    ])
    .unwrap();
    let cov = m.covariance(252);

    // var(A) with n - 1 denominator: mean 0.005, squared deviations sum 0.0005
    let var_a = 0.0005 / 3.0 * 252.0;
    assert_abs_diff_eq!(cov[0][0], var_a, epsilon = 1e-12);
    assert_abs_diff_eq!(cov[1][1], 4.0 * var_a, epsilon = 1e-12);
    assert_abs_diff_eq!(cov[0][1], 2.0 * var_a, epsilon = 1e-12);
    assert_eq!(cov[0][1], cov[1][0]);
  }

  #[test]
  fn portfolio_returns_weight_each_period() {
    let m = ReturnsMatrix::new(vec![
      ("A".into(), vec![0.01, 0.03]),
      ("B".into(), vec![-0.01, 0.01]),
    ])
    .unwrap();
    let r = m.portfolio_returns(&[0.5, 0.5]).unwrap();
    assert_abs_diff_eq!(r[0], 0.0, epsilon = 1e-15);
    assert_abs_diff_eq!(r[1], 0.02, epsilon = 1e-15);
    assert!(m.portfolio_returns(&[1.0]).is_err());
  }

  #[test]
  fn pearson_is_undefined_for_flat_series() {
    assert!(pearson(&[0.01, 0.01, 0.01], &[0.0, 0.1, 0.2]).is_none());
    assert_abs_diff_eq!(
      pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).unwrap(),
      1.0,
      epsilon = 1e-12
    );
  }
}
