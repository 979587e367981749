use common::numeric::tolerance_eq;
use common::Record;
use log::info;
use serde::Deserialize;
use serde_json::{Map, Value};

pub const TAG: &str = "ddp";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DedupConfig {
    #[serde(default, alias = "ignoreFields")]
    pub ignore_fields: Vec<String>,
    #[serde(default, alias = "checkFields")]
    pub check_fields: Option<Vec<String>>,
    #[serde(default, alias = "numericTolerance")]
    pub numeric_tolerance: f64,
    #[serde(default)]
    pub debug: bool,
}

/// Content-change filter.
///
/// Forwards a record only when its `data` differs meaningfully from the
/// last emitted one. Meta, timestamps included, never participates in the
/// decision.
#[derive(Debug)]
pub struct Dedup {
    config: DedupConfig,
    last: Option<Map<String, Value>>,
}

impl Dedup {
    pub fn new(config: DedupConfig) -> Dedup {
        Dedup { config, last: None }
    }

    pub fn on_record(&mut self, mut record: Record, _now_ms: f64) -> Option<Record> {
        let changed = match &self.last {
            None => true,
            Some(last) => self.changed(&record.data, last),
        };
        if !changed {
            if self.config.debug {
                info!("dropping unchanged record");
            }
            return None;
        }
        self.last = Some(record.data.clone());
        record.append_tag(TAG);
        Some(record)
    }

    fn changed(&self, current: &Map<String, Value>, last: &Map<String, Value>) -> bool {
        let keys: Vec<&String> = match &self.config.check_fields {
            Some(whitelist) => whitelist
                .iter()
                .filter(|k| !self.config.ignore_fields.contains(k))
                .collect(),
            None => current
                .keys()
                .filter(|k| !self.config.ignore_fields.contains(k))
                .collect(),
        };

        for key in keys {
            let now = current.get(key.as_str());
            let then = last.get(key.as_str());
            match (now, then) {
                (Some(now), Some(then)) => {
                    if self.value_changed(now, then) {
                        return true;
                    }
                }
                // Present now, absent before: a change. The reverse is not.
                (Some(_), None) => return true,
                (None, _) => {}
            }
        }
        false
    }

    fn value_changed(&self, now: &Value, then: &Value) -> bool {
        match (now, then) {
            (Value::Object(now), Value::Object(then)) => {
                // One level of shallow comparison: key sets plus
                // tolerance-aware values.
                if now.len() != then.len() {
                    return true;
                }
                for (key, value) in now {
                    match then.get(key) {
                        Some(other) => {
                            if !tolerance_eq(value, other, self.config.numeric_tolerance) {
                                return true;
                            }
                        }
                        None => return true,
                    }
                }
                false
            }
            _ => !tolerance_eq(now, then, self.config.numeric_tolerance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(data: Value) -> Record {
        Record::normalize(json!({ "data": data }))
    }

    fn dedup(config: Value) -> Dedup {
        Dedup::new(serde_json::from_value(config).unwrap())
    }

    #[test]
    fn test_first_record_always_passes() {
        let mut dedup = dedup(json!({}));
        let out = dedup.on_record(record(json!({"a": 1})), 0.0).unwrap();
        assert_eq!(out.pipeline(), vec![TAG.to_string()]);
    }

    #[test]
    fn test_ignore_fields_scenario() {
        let mut dedup = dedup(json!({"ignore_fields": ["t"]}));
        assert!(dedup.on_record(record(json!({"t": 1, "a": 1})), 0.0).is_some());
        assert!(dedup.on_record(record(json!({"t": 2, "a": 1})), 0.0).is_none());
        assert!(dedup.on_record(record(json!({"t": 3, "a": 2})), 0.0).is_some());
    }

    #[test]
    fn test_check_fields_whitelist() {
        let mut dedup = dedup(json!({"check_fields": ["a"]}));
        assert!(dedup.on_record(record(json!({"a": 1, "b": 1})), 0.0).is_some());
        assert!(dedup.on_record(record(json!({"a": 1, "b": 2})), 0.0).is_none());
        assert!(dedup.on_record(record(json!({"a": 2, "b": 2})), 0.0).is_some());
    }

    #[test]
    fn test_numeric_tolerance() {
        let mut dedup = dedup(json!({"numeric_tolerance": 0.5}));
        assert!(dedup.on_record(record(json!({"v": 10.0})), 0.0).is_some());
        assert!(dedup.on_record(record(json!({"v": 10.4})), 0.0).is_none());
        assert!(dedup.on_record(record(json!({"v": 11.0})), 0.0).is_some());
    }

    #[test]
    fn test_new_key_is_a_change_missing_key_is_not() {
        let mut dedup = dedup(json!({}));
        assert!(dedup.on_record(record(json!({"a": 1, "b": 2})), 0.0).is_some());
        // b disappeared: not a change under the key rules.
        assert!(dedup.on_record(record(json!({"a": 1})), 0.0).is_none());
        // Remembered snapshot is the last *emitted* record, so b is still
        // known; reappearing with the same value is no change either.
        assert!(dedup.on_record(record(json!({"a": 1, "b": 2})), 0.0).is_none());
        // A genuinely new key is a change.
        assert!(dedup.on_record(record(json!({"a": 1, "c": 3})), 0.0).is_some());
    }

    #[test]
    fn test_nested_map_shallow_compare() {
        let mut dedup = dedup(json!({"numeric_tolerance": 0.1}));
        assert!(dedup
            .on_record(record(json!({"pos": {"x": 1.0, "y": 2.0}})), 0.0)
            .is_some());
        assert!(dedup
            .on_record(record(json!({"pos": {"x": 1.05, "y": 2.0}})), 0.0)
            .is_none());
        assert!(dedup
            .on_record(record(json!({"pos": {"x": 1.5, "y": 2.0}})), 0.0)
            .is_some());
        assert!(dedup
            .on_record(record(json!({"pos": {"x": 1.5}})), 0.0)
            .is_some());
    }

    #[test]
    fn test_meta_never_participates() {
        let mut dedup = dedup(json!({}));
        let first = Record::normalize(json!({"meta": {"timestamp": 1}, "data": {"a": 1}}));
        let second = Record::normalize(json!({"meta": {"timestamp": 2}, "data": {"a": 1}}));
        assert!(dedup.on_record(first, 0.0).is_some());
        assert!(dedup.on_record(second, 0.0).is_none());
    }
}
