//! # Rebalancing
//!
//! $$
//! \delta_k = w_k^{\text{target}} - w_k^{\text{current}}
//! $$
//!
//! Diff of two allocations over the same keys into ranked buy/sell actions.

use std::cmp::Reverse;

use serde::Serialize;

use super::types::Allocation;
use crate::error::Error;
use crate::error::Result;

/// Deltas and the tolerance band are compared at this resolution.
const WEIGHT_RESOLUTION: f64 = 1e-9;

fn resolution_units(weight: f64) -> i64 {
  (weight / WEIGHT_RESOLUTION).round() as i64
}

/// Trade direction.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
  Buy,
  Sell,
}

/// One recommended adjustment for a symbol or asset class.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RebalancingAction {
  /// Symbol or asset class
  pub key: String,
  pub action: TradeSide,
  pub current_weight: f64,
  pub target_weight: f64,
  /// Absolute weight difference
  pub delta: f64,
}

impl RebalancingAction {
  pub fn message(&self) -> String {
    let verb = match self.action {
      TradeSide::Buy => "buy",
      TradeSide::Sell => "sell",
    };
    format!(
      "{verb} {}: move weight from {:.1}% to {:.1}% ({:.1} points)",
      self.key,
      self.current_weight * 100.0,
      self.target_weight * 100.0,
      self.delta * 100.0
    )
  }
}

/// Emit an action for every key whose drift exceeds `tolerance`.
///
/// Both allocations must cover the same keys. Actions are sorted by
/// descending delta, ties broken by key.
pub fn rebalancing_actions(
  current: &Allocation,
  target: &Allocation,
  tolerance: f64,
) -> Result<Vec<RebalancingAction>> {
  if !(tolerance >= 0.0 && tolerance.is_finite()) {
    return Err(Error::InvalidInput(format!(
      "tolerance must be a non-negative number, got {tolerance}"
    )));
  }

  let missing_in_current: Vec<String> = target
    .keys()
    .filter(|k| !current.contains_key(*k))
    .cloned()
    .collect();
  let missing_in_target: Vec<String> = current
    .keys()
    .filter(|k| !target.contains_key(*k))
    .cloned()
    .collect();
  if !missing_in_current.is_empty() || !missing_in_target.is_empty() {
    return Err(Error::KeySetMismatch {
      missing_in_current,
      missing_in_target,
    });
  }

  let band = resolution_units(tolerance);
  let mut actions: Vec<RebalancingAction> = current
    .iter()
    .filter_map(|(key, &current_weight)| {
      let target_weight = *target.get(key)?;
      let diff = target_weight - current_weight;
      (resolution_units(diff.abs()) > band).then(|| RebalancingAction {
        key: key.clone(),
        action: if diff > 0.0 {
          TradeSide::Buy
        } else {
          TradeSide::Sell
        },
        current_weight,
        target_weight,
        delta: diff.abs(),
      })
    })
    .collect();

  actions.sort_by_key(|a| {
    (
      Reverse(resolution_units(a.delta)),
      a.key.clone(),
    )
  });

  Ok(actions)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  fn alloc(pairs: &[(&str, f64)]) -> Allocation {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
  }

  #[test]
  fn two_asset_swap_emits_buy_then_sell() {
    let current = alloc(&[("A", 0.40), ("B", 0.60)]);
    let target = alloc(&[("A", 0.50), ("B", 0.50)]);
    let actions = rebalancing_actions(&current, &target, 0.05).unwrap();

    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0].key, "A");
    assert_eq!(actions[0].action, TradeSide::Buy);
    assert_abs_diff_eq!(actions[0].delta, 0.10, epsilon = 1e-12);
    assert_eq!(actions[1].key, "B");
    assert_eq!(actions[1].action, TradeSide::Sell);
    assert_abs_diff_eq!(actions[1].delta, 0.10, epsilon = 1e-12);
  }

  #[test]
  fn conservative_target_flags_stocks_and_bonds_only() {
    let current = alloc(&[("stocks", 0.5), ("bonds", 0.4), ("cash", 0.1)]);
    let target = alloc(&[("stocks", 0.3), ("bonds", 0.6), ("cash", 0.1)]);
    let actions = rebalancing_actions(&current, &target, 0.05).unwrap();

    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0].key, "bonds");
    assert_eq!(actions[0].action, TradeSide::Buy);
    assert_eq!(actions[1].key, "stocks");
    assert_eq!(actions[1].action, TradeSide::Sell);
    assert!(actions.iter().all(|a| a.key != "cash"));
  }

  #[test]
  fn sorted_by_largest_drift_first() {
    let current = alloc(&[("A", 0.10), ("B", 0.50), ("C", 0.40)]);
    let target = alloc(&[("A", 0.40), ("B", 0.40), ("C", 0.20)]);
    let actions = rebalancing_actions(&current, &target, 0.05).unwrap();

    let keys: Vec<&str> = actions.iter().map(|a| a.key.as_str()).collect();
    assert_eq!(keys, ["A", "C", "B"]);
    assert!(actions.windows(2).all(|w| w[0].delta >= w[1].delta));
  }

  #[test]
  fn drift_within_tolerance_is_ignored() {
    let current = alloc(&[("A", 0.48), ("B", 0.52)]);
    let target = alloc(&[("A", 0.50), ("B", 0.50)]);
    assert!(rebalancing_actions(&current, &target, 0.05).unwrap().is_empty());
  }

  #[test]
  fn drift_equal_to_tolerance_is_ignored() {
    // 0.55 - 0.50 is 0.050000000000000044 in binary floating point
    let current = alloc(&[("A", 0.50), ("B", 0.50)]);
    let target = alloc(&[("A", 0.55), ("B", 0.45)]);
    assert!(rebalancing_actions(&current, &target, 0.05).unwrap().is_empty());

    let target = alloc(&[("A", 0.5500001), ("B", 0.4499999)]);
    assert_eq!(rebalancing_actions(&current, &target, 0.05).unwrap().len(), 2);
  }

  #[test]
  fn mismatched_keys_are_rejected() {
    let current = alloc(&[("A", 0.5), ("B", 0.5)]);
    let target = alloc(&[("A", 0.5), ("C", 0.5)]);
    match rebalancing_actions(&current, &target, 0.05) {
      Err(Error::KeySetMismatch {
        missing_in_current,
        missing_in_target,
      }) => {
        assert_eq!(missing_in_current, ["C"]);
        assert_eq!(missing_in_target, ["B"]);
      }
      other => panic!("expected key set mismatch, got {other:?}"),
    }
  }

  #[test]
  fn message_describes_move() {
    let action = RebalancingAction {
      key: "bonds".into(),
      action: TradeSide::Buy,
      current_weight: 0.4,
      target_weight: 0.6,
      delta: 0.2,
    };
    assert_eq!(
      action.message(),
      "buy bonds: move weight from 40.0% to 60.0% (20.0 points)"
    );
  }
}
