//! Core domain types and logic.

pub mod calendar;
pub mod series;
pub mod market_data;
pub mod indicator;
pub mod params;
pub mod lookup;
pub mod strategy;
pub mod strategies;
pub mod backtest;
pub mod metrics;
pub mod strategy_manager;
pub mod sweep;
pub mod config_validation;
pub mod error;
