//! # Allocation & Diversification
//!
//! $$
//! H = \sum_i s_i^2,\qquad D = 1 - H
//! $$
//!
//! Current weights by asset class or symbol, and a Herfindahl-based
//! diversification score.

use serde::Deserialize;
use serde::Serialize;

use super::types::Allocation;
use super::types::Holding;
use crate::error::Error;
use crate::error::Result;

/// Categorical dimension used for the diversification score.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
  #[default]
  Sector,
  AssetClass,
}

/// How category shares are measured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareBasis {
  /// Each holding counts once.
  #[default]
  HoldingCount,
  /// Holdings count by market value.
  MarketValue,
}

fn grouped_weights<'a, F>(holdings: &'a [Holding], key: F, basis: ShareBasis) -> Result<Allocation>
where
  F: Fn(&'a Holding) -> &'a str,
{
  if holdings.is_empty() {
    return Err(Error::EmptyPortfolio);
  }
  holdings.iter().try_for_each(Holding::validate)?;

  let size = |h: &Holding| match basis {
    ShareBasis::HoldingCount => 1.0,
    ShareBasis::MarketValue => h.market_value(),
  };
  let total: f64 = holdings.iter().map(size).sum();
  if total <= 0.0 {
    return Err(Error::EmptyPortfolio);
  }

  let mut weights = Allocation::new();
  for holding in holdings {
    *weights.entry(key(holding).to_string()).or_insert(0.0) += size(holding) / total;
  }
  Ok(weights)
}

/// Market-value weight of each asset class.
pub fn current_allocation(holdings: &[Holding]) -> Result<Allocation> {
  grouped_weights(holdings, Holding::asset_class_tag, ShareBasis::MarketValue)
}

/// Market-value weight of each symbol; repeated symbols are merged.
pub fn symbol_allocation(holdings: &[Holding]) -> Result<Allocation> {
  grouped_weights(holdings, |h| h.symbol.as_str(), ShareBasis::MarketValue)
}

/// Sum of squared shares.
pub fn herfindahl_index<I>(shares: I) -> f64
where
  I: IntoIterator<Item = f64>,
{
  shares.into_iter().map(|s| s * s).sum()
}

/// `1 - H` over category shares, clamped to `[0, 1]`.
///
/// Missing tags fall into the same sentinel bucket and count as one category.
pub fn diversification_score(
  holdings: &[Holding],
  category: Category,
  basis: ShareBasis,
) -> Result<f64> {
  let shares = match category {
    Category::Sector => grouped_weights(holdings, Holding::sector_tag, basis)?,
    Category::AssetClass => grouped_weights(holdings, Holding::asset_class_tag, basis)?,
  };

  Ok((1.0 - herfindahl_index(shares.into_values())).clamp(0.0, 1.0))
}

/// Copy `allocation`, adding zero weights for any of `keys` it lacks.
pub fn align_keys<'a, I>(allocation: &Allocation, keys: I) -> Allocation
where
  I: IntoIterator<Item = &'a String>,
{
  let mut aligned = allocation.clone();
  for key in keys {
    aligned.entry(key.clone()).or_insert(0.0);
  }
  aligned
}
