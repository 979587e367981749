use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::AtomicBool;

/// Canonical record flowing between modules.
///
/// Both sides are dynamically keyed JSON maps. Two `meta` keys are
/// recognized: `timestamp` (ms since epoch) and `pipeline` (ordered list of
/// provenance tags). Everything else is passed through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

static TAGGING_ENABLED: AtomicBool = AtomicBool::new(true);

/// Process-wide tagging switch, set once from `--do-tag`.
pub mod tagging {
    use super::TAGGING_ENABLED;
    use std::sync::atomic::Ordering;

    pub fn set_enabled(enabled: bool) {
        TAGGING_ENABLED.store(enabled, Ordering::SeqCst);
    }

    pub fn enabled() -> bool {
        TAGGING_ENABLED.load(Ordering::SeqCst)
    }
}

impl Record {
    /// Normalizes an arbitrary decoded value into the canonical shape.
    ///
    /// Total and idempotent: a mapping carrying `meta`/`data` keys keeps
    /// them (non-mapping values are replaced with empty maps), any other
    /// mapping becomes the `data` payload wholesale, and scalars or arrays
    /// are wrapped as `{value: <input>}`.
    pub fn normalize(value: Value) -> Record {
        let mut record = match value {
            Value::Object(mut map) => {
                if map.contains_key("meta") || map.contains_key("data") {
                    let meta = match map.remove("meta") {
                        Some(Value::Object(m)) => m,
                        _ => Map::new(),
                    };
                    let data = match map.remove("data") {
                        Some(Value::Object(d)) => d,
                        _ => Map::new(),
                    };
                    Record { meta, data }
                } else {
                    Record {
                        meta: Map::new(),
                        data: map,
                    }
                }
            }
            other => {
                let mut data = Map::new();
                data.insert("value".to_string(), other);
                Record {
                    meta: Map::new(),
                    data,
                }
            }
        };
        record.normalize_pipeline();
        record
    }

    /// Fresh meta for a source record: current wall-clock timestamp plus,
    /// when tagging is enabled, `pipeline = [tag]`.
    pub fn create_meta(tag: impl AsRef<str>) -> Map<String, Value> {
        let mut meta = Map::new();
        meta.insert("timestamp".to_string(), json_number(utils::time::now_ms()));
        if tagging::enabled() {
            meta.insert(
                "pipeline".to_string(),
                Value::Array(vec![Value::String(tag.as_ref().to_string())]),
            );
        }
        meta
    }

    /// Pushes a provenance tag onto `meta.pipeline` in place.
    ///
    /// No-op when tagging is disabled; `pipeline` is created on demand.
    pub fn append_tag(&mut self, tag: impl AsRef<str>) {
        if !tagging::enabled() {
            return;
        }
        let pipeline = self
            .meta
            .entry("pipeline".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(tags) = pipeline {
            tags.push(Value::String(tag.as_ref().to_string()));
        } else {
            *pipeline = Value::Array(vec![Value::String(tag.as_ref().to_string())]);
        }
    }

    pub fn timestamp(&self) -> Option<f64> {
        self.meta.get("timestamp").and_then(Value::as_f64)
    }

    pub fn set_timestamp(&mut self, ts: f64) {
        self.meta.insert("timestamp".to_string(), json_number(ts));
    }

    /// Current tag chain, empty when absent.
    pub fn pipeline(&self) -> Vec<String> {
        match self.meta.get("pipeline") {
            Some(Value::Array(tags)) => tags
                .iter()
                .filter_map(|t| t.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl AsRef<str>) -> Record {
        self.append_tag(tag);
        self
    }

    fn normalize_pipeline(&mut self) {
        if !tagging::enabled() {
            return;
        }
        let pipeline = self
            .meta
            .entry("pipeline".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        match pipeline {
            Value::Array(tags) => {
                tags.retain(|t| t.is_string());
            }
            _ => *pipeline = Value::Array(Vec::new()),
        }
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Value {
        let mut map = Map::new();
        map.insert("meta".to_string(), Value::Object(record.meta));
        map.insert("data".to_string(), Value::Object(record.data));
        Value::Object(map)
    }
}

/// Encodes an f64 as a JSON number, preferring the integer form when exact.
pub fn json_number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
