//! # Portfolio Types
//!
//! $$
//! V = \sum_i q_i p_i,\qquad w_i = \frac{q_i p_i}{V}
//! $$
//!
//! Holdings, price histories and optimizer containers shared by the engine.

use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;

/// Asset class assumed for holdings without a tag.
pub const DEFAULT_ASSET_CLASS: &str = "stocks";
/// Sentinel bucket for holdings without a sector.
pub const UNKNOWN_SECTOR: &str = "Unknown";

/// Mapping from symbol or asset class to portfolio weight.
pub type Allocation = BTreeMap<String, f64>;

/// A single observation of an instrument's price.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
  pub timestamp: DateTime<Utc>,
  pub price: f64,
}

/// Validated price history for one instrument.
///
/// Timestamps are strictly increasing and every price is finite and positive.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PriceSeries {
  symbol: String,
  points: Vec<PricePoint>,
}

impl PriceSeries {
  pub fn new(symbol: impl Into<String>, points: Vec<PricePoint>) -> Result<Self> {
    let symbol = symbol.into();

    for (i, point) in points.iter().enumerate() {
      if !(point.price.is_finite() && point.price > 0.0) {
        return Err(Error::InvalidInput(format!(
          "{symbol}: price at index {i} must be positive, got {}",
          point.price
        )));
      }
      if i > 0 && point.timestamp <= points[i - 1].timestamp {
        return Err(Error::InvalidInput(format!(
          "{symbol}: timestamps must be strictly increasing (index {i})"
        )));
      }
    }

    Ok(Self { symbol, points })
  }

  /// Build a daily series from closes starting at `start`.
  pub fn from_closes(symbol: impl Into<String>, start: DateTime<Utc>, closes: &[f64]) -> Result<Self> {
    let points = closes
      .iter()
      .enumerate()
      .map(|(i, &price)| PricePoint {
        timestamp: start + Duration::days(i as i64),
        price,
      })
      .collect();
    Self::new(symbol, points)
  }

  pub fn symbol(&self) -> &str {
    &self.symbol
  }

  pub fn points(&self) -> &[PricePoint] {
    &self.points
  }

  pub fn prices(&self) -> Vec<f64> {
    self.points.iter().map(|p| p.price).collect()
  }

  pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
    self.points.iter().map(|p| p.timestamp).collect()
  }

  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }
}

fn uppercase_symbol<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  String::deserialize(deserializer).map(|symbol| symbol.to_uppercase())
}

/// A position held in a portfolio.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Holding {
  /// Ticker symbol, uppercased on construction and deserialization
  #[serde(deserialize_with = "uppercase_symbol")]
  pub symbol: String,
  /// Units held
  pub quantity: f64,
  /// Average acquisition price per unit
  pub average_price: f64,
  /// Latest market price, if known
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub current_price: Option<f64>,
  /// Asset class tag, e.g. "stocks", "bonds", "cash"
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub asset_class: Option<String>,
  /// Sector tag
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sector: Option<String>,
}

impl Holding {
  pub fn new(symbol: &str, quantity: f64, average_price: f64) -> Self {
    Self {
      symbol: symbol.to_uppercase(),
      quantity,
      average_price,
      current_price: None,
      asset_class: None,
      sector: None,
    }
  }

  pub fn with_asset_class(mut self, asset_class: &str) -> Self {
    self.asset_class = Some(asset_class.to_string());
    self
  }

  pub fn with_sector(mut self, sector: &str) -> Self {
    self.sector = Some(sector.to_string());
    self
  }

  /// Return a copy marked to `current_price`.
  pub fn with_price(&self, current_price: f64) -> Self {
    Self {
      current_price: Some(current_price),
      ..self.clone()
    }
  }

  pub fn validate(&self) -> Result<()> {
    if self.symbol.trim().is_empty() {
      return Err(Error::InvalidInput("holding symbol must not be empty".into()));
    }
    if !(self.quantity.is_finite() && self.quantity > 0.0) {
      return Err(Error::InvalidInput(format!(
        "{}: quantity must be positive, got {}",
        self.symbol, self.quantity
      )));
    }
    if !(self.average_price.is_finite() && self.average_price > 0.0) {
      return Err(Error::InvalidInput(format!(
        "{}: average price must be positive, got {}",
        self.symbol, self.average_price
      )));
    }
    if let Some(price) = self.current_price {
      if !(price.is_finite() && price > 0.0) {
        return Err(Error::InvalidInput(format!(
          "{}: current price must be positive, got {price}",
          self.symbol
        )));
      }
    }
    Ok(())
  }

  /// Asset class tag, falling back to [`DEFAULT_ASSET_CLASS`].
  pub fn asset_class_tag(&self) -> &str {
    match self.asset_class.as_deref() {
      Some(tag) if !tag.trim().is_empty() => tag,
      _ => DEFAULT_ASSET_CLASS,
    }
  }

  /// Sector tag, falling back to [`UNKNOWN_SECTOR`].
  pub fn sector_tag(&self) -> &str {
    match self.sector.as_deref() {
      Some(tag) if !tag.trim().is_empty() => tag,
      _ => UNKNOWN_SECTOR,
    }
  }

  pub fn cost_basis(&self) -> f64 {
    self.quantity * self.average_price
  }

  /// Quantity times the current price, or the average price when unknown.
  pub fn market_value(&self) -> f64 {
    self.quantity * self.current_price.unwrap_or(self.average_price)
  }

  pub fn valuation(&self) -> HoldingValuation {
    let market_value = self.market_value();
    let cost_basis = self.cost_basis();
    let profit_loss = market_value - cost_basis;
    let profit_loss_percent = if cost_basis > 0.0 {
      profit_loss / cost_basis * 100.0
    } else {
      0.0
    };

    HoldingValuation {
      symbol: self.symbol.clone(),
      market_value,
      cost_basis,
      profit_loss,
      profit_loss_percent,
    }
  }
}

/// Mark-to-market view of a [`Holding`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HoldingValuation {
  pub symbol: String,
  pub market_value: f64,
  pub cost_basis: f64,
  /// Unrealized gain/loss in currency units
  pub profit_loss: f64,
  /// Unrealized gain/loss percentage
  pub profit_loss_percent: f64,
}

/// Ordered holdings for one owner. Totals are always derived from holdings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
  #[serde(default)]
  pub owner: String,
  pub holdings: Vec<Holding>,
}

impl Portfolio {
  pub fn new(owner: impl Into<String>, holdings: Vec<Holding>) -> Self {
    Self {
      owner: owner.into(),
      holdings,
    }
  }

  pub fn validate(&self) -> Result<()> {
    self.holdings.iter().try_for_each(Holding::validate)
  }

  pub fn total_value(&self) -> f64 {
    self.holdings.iter().map(Holding::market_value).sum()
  }

  pub fn total_cost(&self) -> f64 {
    self.holdings.iter().map(Holding::cost_basis).sum()
  }

  pub fn valuations(&self) -> Vec<HoldingValuation> {
    self.holdings.iter().map(Holding::valuation).collect()
  }

  pub fn is_empty(&self) -> bool {
    self.holdings.is_empty()
  }
}

/// Optional per-asset weight bounds. Long-only and full investment are implied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptimizationConstraints {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub min_weight: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_weight: Option<f64>,
}

impl OptimizationConstraints {
  pub fn bounded(min_weight: f64, max_weight: f64) -> Self {
    Self {
      min_weight: Some(min_weight),
      max_weight: Some(max_weight),
    }
  }

  /// Resolve effective `[lo, hi]` bounds for `n` assets, checking feasibility.
  pub fn bounds(&self, n: usize) -> Result<(f64, f64)> {
    let lo = self.min_weight.unwrap_or(0.0);
    let hi = self.max_weight.unwrap_or(1.0);

    for (name, value) in [("min_weight", lo), ("max_weight", hi)] {
      if !(0.0..=1.0).contains(&value) {
        return Err(Error::InvalidInput(format!(
          "{name} must lie in [0, 1], got {value}"
        )));
      }
    }

    let n_f = n as f64;
    if lo > hi || n_f * lo > 1.0 + 1e-12 || n_f * hi < 1.0 - 1e-12 {
      return Err(Error::InfeasibleConstraints {
        assets: n,
        min_weight: lo,
        max_weight: hi,
      });
    }

    Ok((lo, hi))
  }
}

/// Output of a mean-variance optimization run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OptimizationResult {
  /// Asset symbols, in the column order of the input returns matrix.
  pub symbols: Vec<String>,
  /// Final portfolio weights, aligned with `symbols`.
  pub weights: Vec<f64>,
  /// Annualized expected return `w'mu`.
  pub expected_return: f64,
  /// Annualized volatility `sqrt(w' Sigma w)`.
  pub volatility: f64,
  /// `(expected_return - risk_free) / volatility`; `None` at zero volatility.
  pub sharpe_ratio: Option<f64>,
  /// Solver iterations used across the warm start and refinement stages.
  pub iterations: u64,
}

impl OptimizationResult {
  pub fn weight(&self, symbol: &str) -> Option<f64> {
    self
      .symbols
      .iter()
      .position(|s| s == symbol)
      .and_then(|i| self.weights.get(i).copied())
  }

  /// Symbol to weight map, suitable as a rebalancing target.
  pub fn allocation(&self) -> Allocation {
    self
      .symbols
      .iter()
      .cloned()
      .zip(self.weights.iter().copied())
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
  }

  #[test]
  fn price_series_rejects_non_positive_prices() {
    let err = PriceSeries::from_closes("AAPL", start(), &[100.0, 0.0, 101.0]).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(ref msg) if msg.contains("index 1")));
  }

  #[test]
  fn price_series_rejects_unordered_timestamps() {
    let t = start();
    let points = vec![
      PricePoint { timestamp: t, price: 10.0 },
      PricePoint { timestamp: t, price: 11.0 },
    ];
    assert!(PriceSeries::new("X", points).is_err());
  }

  #[test]
  fn holding_defaults_tags() {
    let h = Holding::new("aapl", 10.0, 150.0);
    assert_eq!(h.symbol, "AAPL");
    assert_eq!(h.asset_class_tag(), DEFAULT_ASSET_CLASS);
    assert_eq!(h.sector_tag(), UNKNOWN_SECTOR);
    assert_eq!(h.clone().with_sector("  ").sector_tag(), UNKNOWN_SECTOR);
  }

  #[test]
  fn deserialized_holding_symbol_is_uppercased() {
    let h: Holding =
      serde_json::from_str(r#"{"symbol": "aapl", "quantity": 2.0, "average_price": 10.0}"#).unwrap();
    assert_eq!(h, Holding::new("AAPL", 2.0, 10.0));
  }

  #[test]
  fn holding_valuation_uses_current_price() {
    let h = Holding::new("AAPL", 10.0, 150.0).with_price(175.0);
    let v = h.valuation();
    assert_eq!(v.market_value, 1750.0);
    assert_eq!(v.cost_basis, 1500.0);
    assert_eq!(v.profit_loss, 250.0);
    assert!((v.profit_loss_percent - 16.666666666666668).abs() < 1e-9);
  }

  #[test]
  fn holding_validation_catches_bad_quantity() {
    assert!(Holding::new("A", 0.0, 1.0).validate().is_err());
    assert!(Holding::new("A", 1.0, -1.0).validate().is_err());
    assert!(Holding::new("A", 1.0, 1.0).with_price(0.0).validate().is_err());
  }

  #[test]
  fn portfolio_totals_track_holdings() {
    let mut portfolio = Portfolio::new(
      "alice",
      vec![Holding::new("AAPL", 10.0, 150.0), Holding::new("GOOGL", 5.0, 100.0)],
    );
    assert_eq!(portfolio.total_value(), 2000.0);

    assert_eq!(portfolio.total_cost(), 2000.0);

    portfolio.holdings[0] = portfolio.holdings[0].with_price(200.0);
    assert_eq!(portfolio.total_value(), 2500.0);
    assert_eq!(portfolio.total_cost(), 2000.0);

    portfolio.holdings.pop();
    assert_eq!(portfolio.total_value(), 2000.0);
    assert_eq!(portfolio.total_cost(), 1500.0);
  }

  #[test]
  fn constraint_bounds_detect_infeasibility() {
    assert_eq!(OptimizationConstraints::default().bounds(3).unwrap(), (0.0, 1.0));
    assert!(matches!(
      OptimizationConstraints::bounded(0.4, 0.9).bounds(3),
      Err(Error::InfeasibleConstraints { assets: 3, .. })
    ));
    assert!(matches!(
      OptimizationConstraints::bounded(0.0, 0.2).bounds(3),
      Err(Error::InfeasibleConstraints { .. })
    ));
    assert!(matches!(
      OptimizationConstraints::bounded(-0.1, 0.5).bounds(3),
      Err(Error::InvalidInput(_))
    ));
  }

  #[test]
  fn optimization_result_looks_up_weights_by_symbol() {
    let result = OptimizationResult {
      symbols: vec!["AAA".into(), "BBB".into()],
      weights: vec![0.25, 0.75],
      expected_return: 0.1,
      volatility: 0.2,
      sharpe_ratio: Some(0.4),
      iterations: 10,
    };
    assert_eq!(result.weight("BBB"), Some(0.75));
    assert_eq!(result.weight("CCC"), None);
    assert_eq!(result.allocation()["AAA"], 0.25);
  }

  #[test]
  fn unknown_constraint_keys_are_rejected() {
    let parsed: std::result::Result<OptimizationConstraints, _> =
      serde_json::from_str(r#"{"min_weight": 0.1, "sector_cap": 0.3}"#);
    assert!(parsed.is_err());
  }
}
