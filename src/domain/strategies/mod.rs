//! Built-in strategies registered by `StrategyRegistry::with_builtins`.

pub mod buy_and_hold;
pub mod fixed_weights;
pub mod ma_switch;

pub use buy_and_hold::BuyAndHold;
pub use fixed_weights::FixedWeights;
pub use ma_switch::MaSwitch;
