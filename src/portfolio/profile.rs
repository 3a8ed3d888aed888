//! # Risk Profiles
//!
//! Closed set of investor profiles. Each profile fixes a target asset-class
//! mix, the return/volatility trade-off used by the optimizer and the limits
//! used for risk advice.

use std::fmt::Display;
use std::str::FromStr;

use impl_new_derive::ImplNew;
use serde::Deserialize;
use serde::Serialize;

use super::types::Allocation;
use crate::error::Error;

/// Investor risk appetite.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
  #[serde(alias = "low")]
  Conservative,
  #[default]
  #[serde(alias = "medium")]
  Moderate,
  #[serde(alias = "high")]
  Aggressive,
}

/// Objective weights: maximize `alpha * return - beta * volatility`.
#[derive(ImplNew, Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TradeOff {
  pub alpha: f64,
  pub beta: f64,
}

/// Risk limits a portfolio should respect for a given profile.
#[derive(ImplNew, Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RiskLimits {
  pub max_volatility: f64,
  pub max_drawdown: f64,
}

impl RiskProfile {
  pub const ALL: [RiskProfile; 3] = [Self::Conservative, Self::Moderate, Self::Aggressive];

  pub fn trade_off(self) -> TradeOff {
    match self {
      Self::Conservative => TradeOff::new(0.2, 0.8),
      Self::Moderate => TradeOff::new(0.5, 0.5),
      Self::Aggressive => TradeOff::new(0.8, 0.2),
    }
  }

  pub fn limits(self) -> RiskLimits {
    match self {
      Self::Conservative => RiskLimits::new(0.15, 0.10),
      Self::Moderate => RiskLimits::new(0.25, 0.20),
      Self::Aggressive => RiskLimits::new(0.35, 0.30),
    }
  }

  /// Target asset-class weights (stocks / bonds / cash).
  pub fn target_allocation(self) -> Allocation {
    let (stocks, bonds, cash) = match self {
      Self::Conservative => (0.3, 0.6, 0.1),
      Self::Moderate => (0.6, 0.3, 0.1),
      Self::Aggressive => (0.8, 0.15, 0.05),
    };

    Allocation::from([
      ("stocks".to_string(), stocks),
      ("bonds".to_string(), bonds),
      ("cash".to_string(), cash),
    ])
  }

  pub fn risk_level(self) -> RiskLevel {
    match self {
      Self::Conservative => RiskLevel::Low,
      Self::Moderate => RiskLevel::Medium,
      Self::Aggressive => RiskLevel::High,
    }
  }
}

impl FromStr for RiskProfile {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "conservative" | "low" => Ok(Self::Conservative),
      "moderate" | "medium" => Ok(Self::Moderate),
      "aggressive" | "high" => Ok(Self::Aggressive),
      _ => Err(Error::UnknownRiskProfile(s.to_string())),
    }
  }
}

impl Display for RiskProfile {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      RiskProfile::Conservative => write!(f, "conservative"),
      RiskProfile::Moderate => write!(f, "moderate"),
      RiskProfile::Aggressive => write!(f, "aggressive"),
    }
  }
}

/// Discrete classification of annualized volatility.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
  Low,
  Medium,
  High,
}

impl RiskLevel {
  /// `< 0.15` is low, `< 0.25` medium, anything else high.
  pub fn from_volatility(volatility: f64) -> Self {
    if volatility < 0.15 {
      Self::Low
    } else if volatility < 0.25 {
      Self::Medium
    } else {
      Self::High
    }
  }

  pub fn profile(self) -> RiskProfile {
    match self {
      Self::Low => RiskProfile::Conservative,
      Self::Medium => RiskProfile::Moderate,
      Self::High => RiskProfile::Aggressive,
    }
  }
}
