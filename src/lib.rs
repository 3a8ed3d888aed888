//! # portfolio-risk-rs
//!
//! Portfolio risk and optimization engine. Turns holdings and historical
//! price series into a risk report, a target allocation under a constrained
//! mean-variance objective, and ranked rebalancing actions.
//!
//! Every operation is a pure function of its inputs; [`PortfolioEngine`]
//! only carries an [`EngineConfig`].
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use portfolio_risk::portfolio::OptimizationConstraints;
//! use portfolio_risk::portfolio::PriceSeries;
//! use portfolio_risk::portfolio::RiskProfile;
//! use portfolio_risk::PortfolioEngine;
//!
//! # fn main() -> portfolio_risk::Result<()> {
//! let start = Utc::now();
//! let a = PriceSeries::from_closes("AAA", start, &[100.0, 101.0, 99.5, 102.0])?;
//! let b = PriceSeries::from_closes("BBB", start, &[50.0, 50.5, 50.2, 50.9])?;
//!
//! let engine = PortfolioEngine::default();
//! let matrix = engine.returns_matrix(&[a, b])?;
//! let optimum = engine.optimize(&matrix, RiskProfile::Moderate, &OptimizationConstraints::default())?;
//! println!("{:?}", optimum.allocation());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod portfolio;

pub use config::EngineConfig;
pub use config::SolverConfig;
pub use error::Error;
pub use error::Result;
pub use portfolio::PortfolioEngine;
