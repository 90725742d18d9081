//! Index configuration.
//!
//! Callers hand every operation a [`Config`], a loosely typed JSON object.
//! Each backend describes the keys it understands with a [`ConfigSchema`];
//! [`ConfigSchema::validate`] checks a config against that schema for one
//! [`Operation`] and index [`Version`], fills defaults and returns a
//! [`ValidatedConfig`] with typed getters.
//!
//! # Example
//!
//! ```
//! use annex_core::{Config, ConfigSchema, Operation, Version};
//!
//! let schema = ConfigSchema::base("FLAT");
//! let cfg = Config::new().set("metric_type", "l2").set("topk", 5);
//!
//! let valid = schema.validate(&cfg, Operation::Search, Version::current()).unwrap();
//! assert_eq!(valid.topk().unwrap(), 5);
//! assert_eq!(valid.str("metric_type").unwrap(), "L2");
//! ```

use crate::metric::MetricType;
use crate::version::Version;
use crate::{IndexError, Result};
use serde_json::{Map, Value};
use std::fmt;

/// Caller-supplied key/value configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config(Map<String, Value>);

impl Config {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert.
    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Parse a JSON object.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if the value is not an object.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(IndexError::InvalidParameter(format!(
                "config must be a JSON object, got {}",
                other
            ))),
        }
    }
}

impl From<Map<String, Value>> for Config {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Index operation a config is validated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Train,
    Add,
    Search,
    RangeSearch,
    Iterator,
    Deserialize,
    Meta,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Train => "train",
            Self::Add => "add",
            Self::Search => "search",
            Self::RangeSearch => "range_search",
            Self::Iterator => "ann_iterator",
            Self::Deserialize => "deserialize",
            Self::Meta => "get_index_meta",
        };
        f.write_str(name)
    }
}

/// Type and bounds of a config value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    /// Whole number in `[min, max]`.
    Integer { min: i64, max: i64 },
    /// Finite number in `[min, max]` (or `(min, max]` when `exclusive_min`).
    Float {
        min: f64,
        max: f64,
        exclusive_min: bool,
    },
    /// One of a fixed set of names, matched case-insensitively and stored
    /// in its listed spelling.
    Enum(&'static [&'static str]),
    /// Non-empty filesystem path or path prefix.
    Path,
    Bool,
}

impl ParamKind {
    fn name(&self) -> &'static str {
        match self {
            Self::Integer { .. } => "integer",
            Self::Float { .. } => "float",
            Self::Enum(_) => "enum",
            Self::Path => "path",
            Self::Bool => "bool",
        }
    }

    /// Check `value` and return its normalized form.
    fn check(&self, key: &str, value: &Value) -> Result<Value> {
        let wrong_type = || {
            IndexError::InvalidParameter(format!(
                "{} must be {}, got {}",
                key,
                self.name(),
                value
            ))
        };

        match self {
            Self::Integer { min, max } => {
                let v = value.as_i64().ok_or_else(wrong_type)?;
                if v < *min || v > *max {
                    return Err(IndexError::InvalidParameter(format!(
                        "{} = {} out of range [{}, {}]",
                        key, v, min, max
                    )));
                }
                Ok(Value::from(v))
            }
            Self::Float {
                min,
                max,
                exclusive_min,
            } => {
                let v = value.as_f64().ok_or_else(wrong_type)?;
                let below = if *exclusive_min { v <= *min } else { v < *min };
                if !v.is_finite() || below || v > *max {
                    return Err(IndexError::InvalidParameter(format!(
                        "{} = {} out of range",
                        key, v
                    )));
                }
                Ok(Value::from(v))
            }
            Self::Enum(values) => {
                let v = value.as_str().ok_or_else(wrong_type)?;
                values
                    .iter()
                    .find(|candidate| candidate.eq_ignore_ascii_case(v))
                    .map(|canonical| Value::from(*canonical))
                    .ok_or_else(|| {
                        IndexError::InvalidParameter(format!(
                            "{} = {:?} not one of {:?}",
                            key, v, values
                        ))
                    })
            }
            Self::Path => {
                let v = value.as_str().ok_or_else(wrong_type)?;
                if v.is_empty() {
                    return Err(IndexError::InvalidParameter(format!(
                        "{} must not be empty",
                        key
                    )));
                }
                Ok(value.clone())
            }
            Self::Bool => value.as_bool().map(Value::from).ok_or_else(wrong_type),
        }
    }
}

/// One recognised config key.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub key: &'static str,
    pub kind: ParamKind,
    pub default: Option<Value>,
    pub required_for: &'static [Operation],
    pub since: Version,
}

impl ParamSpec {
    pub fn new(key: &'static str, kind: ParamKind) -> Self {
        Self {
            key,
            kind,
            default: None,
            required_for: &[],
            since: Version::minimal(),
        }
    }

    pub fn integer(key: &'static str, min: i64, max: i64) -> Self {
        Self::new(key, ParamKind::Integer { min, max })
    }

    pub fn float(key: &'static str, min: f64, max: f64) -> Self {
        Self::new(
            key,
            ParamKind::Float {
                min,
                max,
                exclusive_min: false,
            },
        )
    }

    /// Float strictly greater than zero.
    pub fn positive_float(key: &'static str) -> Self {
        Self::new(
            key,
            ParamKind::Float {
                min: 0.0,
                max: f64::MAX,
                exclusive_min: true,
            },
        )
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn required_for(mut self, ops: &'static [Operation]) -> Self {
        self.required_for = ops;
        self
    }

    pub fn since(mut self, version: Version) -> Self {
        self.since = version;
        self
    }
}

/// Keys a backend understands.
#[derive(Debug, Clone)]
pub struct ConfigSchema {
    index_type: String,
    params: Vec<ParamSpec>,
}

impl ConfigSchema {
    /// Keys shared by every backend.
    pub fn base(index_type: &str) -> Self {
        Self {
            index_type: index_type.to_string(),
            params: vec![
                ParamSpec::new("metric_type", ParamKind::Enum(&["L2", "IP", "COSINE"]))
                    .required_for(&[Operation::Train]),
                ParamSpec::integer("dim", 1, i64::from(u32::MAX)),
                ParamSpec::integer("topk", 1, i64::from(u32::MAX))
                    .required_for(&[Operation::Search]),
                ParamSpec::float("radius", f64::MIN, f64::MAX)
                    .required_for(&[Operation::RangeSearch]),
                ParamSpec::float("range_filter", f64::MIN, f64::MAX).since(Version::new(3)),
            ],
        }
    }

    /// Add a backend-specific key, replacing any spec with the same name.
    pub fn with(mut self, spec: ParamSpec) -> Self {
        self.params.retain(|p| p.key != spec.key);
        self.params.push(spec);
        self
    }

    pub fn index_type(&self) -> &str {
        &self.index_type
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn param(&self, key: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.key == key)
    }

    /// Validate `cfg` for `op` on an index at `version`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for an unknown key, a key newer than
    /// `version`, a value of the wrong type or out of range, or a key
    /// required by `op` that is missing.
    pub fn validate(&self, cfg: &Config, op: Operation, version: Version) -> Result<ValidatedConfig> {
        let mut values = Map::new();

        for (key, value) in cfg.as_map() {
            let spec = self.param(key).ok_or_else(|| {
                IndexError::InvalidParameter(format!(
                    "unknown config key {:?} for {}",
                    key, self.index_type
                ))
            })?;
            if spec.since > version {
                return Err(IndexError::InvalidParameter(format!(
                    "config key {:?} requires {} but index is {}",
                    key, spec.since, version
                )));
            }
            values.insert(key.clone(), spec.kind.check(key, value)?);
        }

        for spec in &self.params {
            if values.contains_key(spec.key) || spec.since > version {
                continue;
            }
            if spec.required_for.contains(&op) {
                return Err(IndexError::InvalidParameter(format!(
                    "{} requires config key {:?}",
                    op, spec.key
                )));
            }
            if let Some(default) = &spec.default {
                values.insert(spec.key.to_string(), default.clone());
            }
        }

        Ok(ValidatedConfig { values })
    }

    /// JSON description of the schema, one entry per key.
    pub fn describe(&self) -> Value {
        let params: Vec<Value> = self
            .params
            .iter()
            .map(|p| {
                let mut entry = Map::new();
                entry.insert("key".into(), Value::from(p.key));
                entry.insert("type".into(), Value::from(p.kind.name()));
                if let ParamKind::Enum(values) = &p.kind {
                    entry.insert("values".into(), Value::from(values.to_vec()));
                }
                if let Some(default) = &p.default {
                    entry.insert("default".into(), default.clone());
                }
                let required: Vec<String> = p.required_for.iter().map(|op| op.to_string()).collect();
                if !required.is_empty() {
                    entry.insert("required_for".into(), Value::from(required));
                }
                entry.insert("since".into(), Value::from(p.since.number()));
                Value::Object(entry)
            })
            .collect();

        serde_json::json!({
            "index_type": self.index_type,
            "params": params,
        })
    }
}

/// A config that passed schema validation, with defaults applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedConfig {
    values: Map<String, Value>,
}

impl ValidatedConfig {
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn missing(key: &str) -> IndexError {
        IndexError::InvalidParameter(format!("missing config key {:?}", key))
    }

    pub fn opt_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(Value::as_i64)
    }

    pub fn opt_usize(&self, key: &str) -> Option<usize> {
        self.opt_i64(key).and_then(|v| usize::try_from(v).ok())
    }

    pub fn usize(&self, key: &str) -> Result<usize> {
        self.opt_usize(key).ok_or_else(|| Self::missing(key))
    }

    pub fn opt_u64(&self, key: &str) -> Option<u64> {
        self.opt_i64(key).and_then(|v| u64::try_from(v).ok())
    }

    pub fn opt_f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    pub fn f64(&self, key: &str) -> Result<f64> {
        self.opt_f64(key).ok_or_else(|| Self::missing(key))
    }

    pub fn opt_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn str(&self, key: &str) -> Result<&str> {
        self.opt_str(key).ok_or_else(|| Self::missing(key))
    }

    pub fn opt_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    pub fn opt_metric(&self) -> Result<Option<MetricType>> {
        self.opt_str("metric_type")
            .map(str::parse::<MetricType>)
            .transpose()
    }

    pub fn metric(&self) -> Result<MetricType> {
        self.opt_metric()?.ok_or_else(|| Self::missing("metric_type"))
    }

    pub fn topk(&self) -> Result<usize> {
        self.usize("topk")
    }

    /// Internal-distance bounds of a range query: everything with
    /// `lower <= d <= upper` qualifies, where `lower` comes from the
    /// optional `range_filter`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `radius` is missing or `range_filter`
    /// lies on the wrong side of it.
    pub fn range_bounds(&self, metric: MetricType) -> Result<(f32, Option<f32>)> {
        let radius = self.f64("radius")? as f32;
        let filter = self.opt_f64("range_filter").map(|v| v as f32);

        if let Some(filter) = filter {
            let inverted = if metric.is_similarity() {
                filter < radius
            } else {
                filter > radius
            };
            if inverted {
                return Err(IndexError::InvalidParameter(format!(
                    "range_filter {} lies outside radius {} for {}",
                    filter, radius, metric
                )));
            }
        }

        Ok((
            metric.to_distance(radius),
            filter.map(|f| metric.to_distance(f)),
        ))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}
