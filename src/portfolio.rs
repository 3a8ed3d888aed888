//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Risk metrics, allocation analysis, mean-variance optimization and
//! rebalancing over caller-supplied holdings and price histories.

pub mod allocation;
pub mod data;
pub mod engine;
pub mod optimizers;
pub mod profile;
pub mod rebalance;
pub mod risk;
pub mod types;

pub use allocation::align_keys;
pub use allocation::current_allocation;
pub use allocation::diversification_score;
pub use allocation::herfindahl_index;
pub use allocation::symbol_allocation;
pub use allocation::Category;
pub use allocation::ShareBasis;
pub use data::cumulative_values;
pub use data::log_returns;
pub use data::reconstruct_prices;
pub use data::series_log_returns;
pub use data::ReturnsMatrix;
pub use engine::PortfolioEngine;
pub use engine::PortfolioMetrics;
pub use optimizers::mean_variance_objective;
pub use optimizers::optimize_mean_variance;
pub use optimizers::optimize_weights;
pub use optimizers::portfolio_return;
pub use optimizers::portfolio_volatility;
pub use optimizers::project_to_bounded_simplex;
pub use optimizers::stationarity_gap;
pub use optimizers::validate_weights;
pub use profile::RiskLevel;
pub use profile::RiskLimits;
pub use profile::RiskProfile;
pub use profile::TradeOff;
pub use rebalance::rebalancing_actions;
pub use rebalance::RebalancingAction;
pub use rebalance::TradeSide;
pub use risk::annualized_return;
pub use risk::annualized_volatility;
pub use risk::conditional_value_at_risk;
pub use risk::market_correlation;
pub use risk::max_drawdown;
pub use risk::risk_advice;
pub use risk::risk_report;
pub use risk::sharpe_from_moments;
pub use risk::sharpe_ratio;
pub use risk::value_at_risk;
pub use risk::AdviceKind;
pub use risk::RiskAdvice;
pub use risk::RiskReport;
pub use types::Allocation;
pub use types::Holding;
pub use types::HoldingValuation;
pub use types::OptimizationConstraints;
pub use types::OptimizationResult;
pub use types::Portfolio;
pub use types::PricePoint;
pub use types::PriceSeries;
