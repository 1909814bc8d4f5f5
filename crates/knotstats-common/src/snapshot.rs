//! Statistics snapshots as returned by the resolver.
//!
//! Knot Resolver exposes two layouts. The `webmgmt` `/stats` endpoint returns a
//! single flat object keyed by dotted metric names:
//!
//! ```json
//! {"answer.noerror": 10, "answer.servfail": 2, "request.udp": 12}
//! ```
//!
//! Multi-instance deployments (`/metrics/json`) return one nested object per
//! instance, keyed by section then field:
//!
//! ```json
//! {"kresd1": {"answer": {"noerror": 10}}, "kresd2": {"answer": {"noerror": 4}}}
//! ```
//!
//! The shape is decided by looking at the value, never by a fixed schema.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::aggregate::aggregate;
use crate::Result;
use crate::error::Error;

/// A JSON object as produced by the resolver.
pub type StatsMap = Map<String, Value>;

/// Top-level layout of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Flat,
    Grouped,
}

/// One poll's worth of resolver statistics.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsSnapshot {
    /// Dotted metric names mapped to scalar values.
    Flat(StatsMap),
    /// Instance id mapped to that instance's sectioned statistics.
    Grouped(BTreeMap<String, StatsMap>),
}

impl StatsSnapshot {
    /// Classify a decoded upstream body.
    ///
    /// A non-empty object whose every value is an object is treated as grouped
    /// by instance. Every other object, including `{}`, is flat.
    pub fn from_value(value: Value) -> Result<Self> {
        let map = match value {
            Value::Object(map) => map,
            other => {
                return Err(Error::NotAnObject {
                    found: json_type_name(&other),
                });
            }
        };

        let grouped = !map.is_empty() && map.values().all(Value::is_object);
        if !grouped {
            return Ok(StatsSnapshot::Flat(map));
        }

        let instances = map
            .into_iter()
            .filter_map(|(id, stats)| match stats {
                Value::Object(stats) => Some((id, stats)),
                _ => None,
            })
            .collect();
        Ok(StatsSnapshot::Grouped(instances))
    }

    pub fn shape(&self) -> Shape {
        match self {
            StatsSnapshot::Flat(_) => Shape::Flat,
            StatsSnapshot::Grouped(_) => Shape::Grouped,
        }
    }

    /// Instance ids in sorted order. Flat snapshots have none.
    pub fn instance_ids(&self) -> Vec<&str> {
        match self {
            StatsSnapshot::Flat(_) => Vec::new(),
            StatsSnapshot::Grouped(instances) => instances.keys().map(String::as_str).collect(),
        }
    }

    pub fn instance(&self, id: &str) -> Option<&StatsMap> {
        match self {
            StatsSnapshot::Flat(_) => None,
            StatsSnapshot::Grouped(instances) => instances.get(id),
        }
    }

    /// Number of metrics (flat) or instances (grouped).
    pub fn len(&self) -> usize {
        match self {
            StatsSnapshot::Flat(map) => map.len(),
            StatsSnapshot::Grouped(instances) => instances.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The statistics a dashboard shows for `selection`.
    ///
    /// Flat snapshots ignore the selection. Grouped snapshots return the
    /// selected instance, or the cross-instance aggregate for `All` and for
    /// instances that disappeared since the selection was made.
    pub fn view(&self, selection: &Selection) -> StatsMap {
        match self {
            StatsSnapshot::Flat(map) => map.clone(),
            StatsSnapshot::Grouped(instances) => match selection {
                Selection::Instance(id) => match instances.get(id) {
                    Some(stats) => stats.clone(),
                    None => aggregate(instances),
                },
                Selection::All => aggregate(instances),
            },
        }
    }
}

/// Which statistics of a grouped snapshot to display.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    Instance(String),
}

impl FromStr for Selection {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            Ok(Selection::All)
        } else {
            Ok(Selection::Instance(s.to_string()))
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
