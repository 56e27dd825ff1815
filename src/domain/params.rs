//! Strategy parameter trees and the paths that address them.
//!
//! Parameters are a JSON object tree. A sweep addresses one leaf with a
//! [`ParamPath`], written either dotted (`thresholds.exit`) or bracketed
//! (`thresholds[exit]`); both spellings parse to the same key list.

use crate::domain::error::PitError;
use serde_json::{Map, Number, Value};
use std::fmt;
use std::str::FromStr;

pub type ParamTree = Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamPath(Vec<String>);

impl ParamPath {
    pub fn new(keys: Vec<String>) -> Result<Self, PitError> {
        if keys.is_empty() || keys.iter().any(|k| k.is_empty()) {
            return Err(PitError::invalid_param(keys.join("."), "empty key in path"));
        }
        Ok(Self(keys))
    }

    /// Parse `a.b.c`, `a[b][c]` or a mix such as `a.b[c]`.
    pub fn parse(raw: &str) -> Result<Self, PitError> {
        let mut keys = Vec::new();
        let mut current = String::new();
        let mut chars = raw.trim().chars();

        while let Some(c) = chars.next() {
            match c {
                '.' => keys.push(std::mem::take(&mut current)),
                '[' => {
                    if !current.is_empty() {
                        keys.push(std::mem::take(&mut current));
                    } else if keys.is_empty() {
                        return Err(PitError::invalid_param(raw, "path cannot start with '['"));
                    }
                    let mut inner = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(ch) => inner.push(ch),
                            None => return Err(PitError::invalid_param(raw, "unclosed '['")),
                        }
                    }
                    keys.push(inner);
                    // a bracket may be followed by another bracket, a dot, or the end
                    match chars.clone().next() {
                        None | Some('[') => {}
                        Some('.') => {
                            chars.next();
                        }
                        Some(other) => {
                            return Err(PitError::invalid_param(
                                raw,
                                format!("unexpected '{other}' after ']'"),
                            ));
                        }
                    }
                }
                ']' => return Err(PitError::invalid_param(raw, "unmatched ']'")),
                _ => current.push(c),
            }
        }
        if !current.is_empty() || raw.trim().ends_with('.') {
            keys.push(current);
        }

        Self::new(keys).map_err(|_| PitError::invalid_param(raw, "empty key in path"))
    }

    pub fn keys(&self) -> &[String] {
        &self.0
    }

    pub fn get<'a>(&self, tree: &'a ParamTree) -> Option<&'a Value> {
        self.0.iter().try_fold(tree, |node, key| node.get(key))
    }

    /// Set the leaf at this path, creating intermediate objects as needed.
    pub fn set(&self, tree: &mut ParamTree, value: Value) -> Result<(), PitError> {
        if tree.is_null() {
            *tree = Value::Object(Map::new());
        }
        let (leaf, parents) = self
            .0
            .split_last()
            .ok_or_else(|| PitError::invalid_param("", "empty path"))?;

        let mut node = tree;
        for key in parents {
            let map = node.as_object_mut().ok_or_else(|| {
                PitError::invalid_param(self.to_string(), format!("'{key}' is under a non-object value"))
            })?;
            node = map
                .entry(key.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        let map = node.as_object_mut().ok_or_else(|| {
            PitError::invalid_param(self.to_string(), format!("'{leaf}' is under a non-object value"))
        })?;
        map.insert(leaf.clone(), value);
        Ok(())
    }
}

impl fmt::Display for ParamPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl FromStr for ParamPath {
    type Err = PitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Deep-merge `overrides` over `defaults`. Objects merge key by key; any
/// other override value replaces the default outright.
pub fn merge(defaults: &ParamTree, overrides: &ParamTree) -> ParamTree {
    match (defaults, overrides) {
        (Value::Object(base), Value::Object(over)) => {
            let mut merged = base.clone();
            for (key, value) in over {
                let next = match base.get(key) {
                    Some(existing) => merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (base, Value::Null) => base.clone(),
        (_, over) => over.clone(),
    }
}

/// Build an override tree from numeric leaf assignments. A later assignment
/// to the same path wins.
pub fn overrides_from(assignments: &[(ParamPath, f64)]) -> Result<ParamTree, PitError> {
    let mut tree = Value::Object(Map::new());
    for (path, value) in assignments {
        let number = Number::from_f64(*value).ok_or_else(|| {
            PitError::invalid_param(path.to_string(), format!("{value} is not a finite number"))
        })?;
        path.set(&mut tree, Value::Number(number))?;
    }
    Ok(tree)
}

fn lookup<'a>(params: &'a ParamTree, keys: &[&str]) -> Result<&'a Value, PitError> {
    keys.iter()
        .try_fold(params, |node, key| node.get(*key))
        .ok_or_else(|| PitError::invalid_param(keys.join("."), "missing"))
}

pub fn require_f64(params: &ParamTree, keys: &[&str]) -> Result<f64, PitError> {
    lookup(params, keys)?
        .as_f64()
        .ok_or_else(|| PitError::invalid_param(keys.join("."), "expected a number"))
}

/// A whole number of days. Sweeps produce floats, so `20.0` is accepted.
pub fn require_days(params: &ParamTree, keys: &[&str]) -> Result<u32, PitError> {
    let raw = require_f64(params, keys)?;
    if !(0.0..=f64::from(u32::MAX)).contains(&raw) || raw.fract() != 0.0 {
        return Err(PitError::invalid_param(
            keys.join("."),
            format!("expected a whole number of days, got {raw}"),
        ));
    }
    Ok(raw as u32)
}

pub fn require_str<'a>(params: &'a ParamTree, keys: &[&str]) -> Result<&'a str, PitError> {
    lookup(params, keys)?
        .as_str()
        .ok_or_else(|| PitError::invalid_param(keys.join("."), "expected a string"))
}

pub fn require_object<'a>(
    params: &'a ParamTree,
    keys: &[&str],
) -> Result<&'a Map<String, Value>, PitError> {
    lookup(params, keys)?
        .as_object()
        .ok_or_else(|| PitError::invalid_param(keys.join("."), "expected an object"))
}
