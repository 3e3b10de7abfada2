// Environment variable loading

use crate::{ConfigError, Result};
use serde_json::{Map, Value};
use std::env;
use std::path::Path;

/// Prefix of recognized environment variables
pub const DEFAULT_PREFIX: &str = "TENANTRY_";

/// Separates nesting levels in variable names
pub const NESTING_SEPARATOR: &str = "__";

/// Environment variable loader
///
/// `TENANTRY_RESOLUTION__USE_CONSENSUS=true` becomes
/// `{"resolution": {"use_consensus": true}}`. Values are parsed as JSON when
/// they form a non-string JSON value (booleans, numbers, arrays, objects,
/// `null`) and kept as strings otherwise.
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Overlay built from the process environment
    pub fn load(&self) -> Value {
        self.overlay(env::vars())
    }

    /// Overlay built from a `.env` file, without touching the process
    /// environment.
    ///
    /// Without a path the nearest `.env` is used; its absence is not an
    /// error.
    pub fn load_dotenv(&self, path: Option<&Path>) -> Result<Value> {
        let iter = match path {
            Some(path) => dotenvy::from_path_iter(path),
            None => dotenvy::dotenv_iter(),
        };

        let iter = match iter {
            Ok(iter) => iter,
            Err(e) if path.is_none() && e.not_found() => return Ok(Value::Object(Map::new())),
            Err(e) => return Err(ConfigError::LoadError(e.to_string())),
        };

        let mut vars = Vec::new();
        for item in iter {
            vars.push(item.map_err(|e| ConfigError::ParseError(e.to_string()))?);
        }
        Ok(self.overlay(vars))
    }

    /// Overlay built from explicit variables
    pub fn overlay<I, K, V>(&self, vars: I) -> Value
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut root = Map::new();

        for (key, value) in vars {
            let Some(rest) = key.as_ref().strip_prefix(&self.prefix) else {
                continue;
            };
            let path: Vec<String> = rest
                .split(NESTING_SEPARATOR)
                .map(str::to_lowercase)
                .collect();
            if path.iter().any(|segment| segment.is_empty()) {
                continue;
            }
            insert_path(&mut root, &path, parse_value(value.as_ref()));
        }

        Value::Object(root)
    }

    /// Load a single variable (without nesting)
    pub fn load_var(&self, key: &str) -> Result<String> {
        Ok(env::var(format!("{}{}", self.prefix, key.to_uppercase()))?)
    }

    /// Load with default value
    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

fn parse_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(value) if !value.is_string() => value,
        _ => Value::String(raw.to_string()),
    }
}

fn insert_path(root: &mut Map<String, Value>, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut node = root;
    for segment in parents {
        let entry = node
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        node = match entry {
            Value::Object(map) => map,
            _ => return,
        };
    }
    node.insert(last.clone(), value);
}
