//! Strategy trait, step state, and the id → strategy registry.
//!
//! A strategy is called once per trading date with a [`Lookup`] bound to that
//! date, its merged parameters, and the state it returned the day before. It
//! returns the new state: the holdings to carry (units per ticker), a mode
//! label, and any scalar variables it wants to remember.

use crate::domain::error::PitError;
use crate::domain::lookup::Lookup;
use crate::domain::params::ParamTree;
use crate::domain::strategies;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Reserved ticker valued at 1.0 on every date.
pub const CASH: &str = "CASH";

/// Units held per ticker.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Allocation(BTreeMap<String, f64>);

impl Allocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(ticker: impl Into<String>, units: f64) -> Self {
        let mut holdings = BTreeMap::new();
        holdings.insert(ticker.into(), units);
        Self(holdings)
    }

    pub fn with(mut self, ticker: impl Into<String>, units: f64) -> Self {
        self.0.insert(ticker.into(), units);
        self
    }

    pub fn get(&self, ticker: &str) -> Option<f64> {
        self.0.get(ticker).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.0.iter().map(|(t, u)| (t.as_str(), *u))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Σ units × value on the lookup's date.
    pub fn value(&self, lookup: &Lookup<'_>) -> Result<f64, PitError> {
        self.0
            .iter()
            .try_fold(0.0, |acc, (ticker, units)| {
                Ok::<f64, PitError>(acc + units * lookup.value(ticker)?)
            })
    }
}

impl FromIterator<(String, f64)> for Allocation {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "-");
        }
        let parts: Vec<String> = self.0.iter().map(|(t, u)| format!("{t}={u}")).collect();
        write!(f, "{}", parts.join(" "))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyState {
    pub allocation: Allocation,
    pub mode: String,
    pub vars: BTreeMap<String, f64>,
}

impl StrategyState {
    pub fn new(allocation: Allocation, mode: impl Into<String>) -> Self {
        Self {
            allocation,
            mode: mode.into(),
            vars: BTreeMap::new(),
        }
    }

    /// True before the first step has run.
    pub fn is_initial(&self) -> bool {
        self.mode.is_empty() && self.allocation.is_empty()
    }
}

pub trait Strategy: Send + Sync {
    fn id(&self) -> &str;

    fn description(&self) -> &str;

    fn default_params(&self) -> ParamTree;

    /// Tickers the run must have loaded and covering its date range.
    fn required_tickers(&self, params: &ParamTree) -> Result<Vec<String>, PitError>;

    fn step(
        &self,
        date: NaiveDate,
        lookup: &Lookup<'_>,
        params: &ParamTree,
        prior: &StrategyState,
    ) -> Result<StrategyState, PitError>;
}

#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Arc<dyn Strategy>>,
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(strategies::BuyAndHold));
        registry.register(Arc::new(strategies::FixedWeights));
        registry.register(Arc::new(strategies::MaSwitch));
        registry
    }

    /// Register a strategy, replacing any with the same id.
    pub fn register(&mut self, strategy: Arc<dyn Strategy>) {
        self.strategies.insert(strategy.id().to_string(), strategy);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn Strategy>, PitError> {
        self.strategies
            .get(id)
            .cloned()
            .ok_or_else(|| PitError::UnknownStrategy { id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.strategies.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        self.strategies.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Strategy>> {
        self.strategies.values()
    }
}
