//! Cross-instance aggregation of grouped snapshots.
//!
//! Rules:
//!
//! - numbers are summed per `section.field`, or per key for top-level scalars
//! - integers stay integers while every summand is an integer and the total fits
//! - strings, booleans, nulls and anything nested below a field are dropped
//! - fields containing `percent` are derived and never summed; `cache.hit_percent`
//!   is recomputed from the summed `cache.hit` and `cache.lookup` counters
//! - sections left without a numeric field are omitted

use std::collections::BTreeMap;

use serde_json::{Number, Value};

use crate::snapshot::StatsMap;

const CACHE_SECTION: &str = "cache";

/// Sum every instance's numeric statistics into one map.
pub fn aggregate(instances: &BTreeMap<String, StatsMap>) -> StatsMap {
    let mut sections: BTreeMap<String, BTreeMap<String, Sum>> = BTreeMap::new();
    let mut top_level: BTreeMap<String, Sum> = BTreeMap::new();

    for stats in instances.values() {
        for (key, value) in stats {
            match value {
                Value::Object(fields) => {
                    let section = sections.entry(key.clone()).or_default();
                    for (field, value) in fields {
                        if is_derived(field) {
                            continue;
                        }
                        if let Value::Number(n) = value {
                            section.entry(field.clone()).or_default().add(n);
                        }
                    }
                }
                Value::Number(n) if !is_derived(key) => {
                    top_level.entry(key.clone()).or_default().add(n);
                }
                _ => {}
            }
        }
    }

    let mut out = StatsMap::new();
    for (key, sum) in top_level {
        if let Some(n) = sum.into_number() {
            out.insert(key, Value::Number(n));
        }
    }
    for (name, fields) in sections {
        let mut section = StatsMap::new();
        for (field, sum) in fields {
            if let Some(n) = sum.into_number() {
                section.insert(field, Value::Number(n));
            }
        }
        if name == CACHE_SECTION {
            recompute_hit_percent(&mut section);
        }
        if !section.is_empty() {
            out.insert(name, Value::Object(section));
        }
    }
    out
}

fn is_derived(field: &str) -> bool {
    field.contains("percent")
}

fn recompute_hit_percent(cache: &mut StatsMap) {
    let (Some(hit), Some(lookup)) = (
        cache.get("hit").and_then(Value::as_f64),
        cache.get("lookup").and_then(Value::as_f64),
    ) else {
        return;
    };
    let percent = if lookup > 0.0 { hit * 100.0 / lookup } else { 0.0 };
    if let Some(n) = Number::from_f64(percent) {
        cache.insert("hit_percent".to_string(), Value::Number(n));
    }
}

/// Running total that remembers whether a float was ever involved.
#[derive(Debug, Default)]
struct Sum {
    int: i128,
    float: f64,
    saw_float: bool,
}

impl Sum {
    fn add(&mut self, n: &Number) {
        if let Some(i) = n.as_i64() {
            self.int += i128::from(i);
        } else if let Some(u) = n.as_u64() {
            self.int += i128::from(u);
        } else if let Some(f) = n.as_f64() {
            self.float += f;
            self.saw_float = true;
        }
    }

    fn into_number(self) -> Option<Number> {
        if !self.saw_float {
            if let Ok(i) = i64::try_from(self.int) {
                return Some(Number::from(i));
            }
            if let Ok(u) = u64::try_from(self.int) {
                return Some(Number::from(u));
            }
        }
        Number::from_f64(self.int as f64 + self.float)
    }
}
