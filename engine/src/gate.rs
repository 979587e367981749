use common::Record;
use errors::{ConfigError, Result};
use log::{info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub const TAG: &str = "gat";

/// One activation block; a record must satisfy every configured condition.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GateBlock {
    #[serde(default, alias = "mustHave")]
    pub must_have: Vec<String>,
    #[serde(default, alias = "minValues")]
    pub min_values: BTreeMap<String, f64>,
    #[serde(default, alias = "boolEqual")]
    pub bool_equal: BTreeMap<String, bool>,
    #[serde(default, alias = "strEqual")]
    pub str_equal: BTreeMap<String, String>,
    #[serde(default, alias = "maxAgeMs")]
    pub max_age_ms: Option<f64>,
    #[serde(default, alias = "timeoutMs")]
    pub timeout_ms: Option<f64>,
}

impl GateBlock {
    fn is_empty(&self) -> bool {
        self.must_have.is_empty()
            && self.min_values.is_empty()
            && self.bool_equal.is_empty()
            && self.str_equal.is_empty()
            && self.max_age_ms.is_none()
            && self.timeout_ms.is_none()
    }

    fn satisfied(&self, record: &Record, now_ms: f64) -> bool {
        for key in &self.must_have {
            match record.data.get(key) {
                Some(Value::Null) | None => return false,
                Some(_) => {}
            }
        }
        for (key, bound) in &self.min_values {
            match record.data.get(key).and_then(Value::as_f64) {
                Some(value) if value >= *bound => {}
                _ => return false,
            }
        }
        for (key, required) in &self.bool_equal {
            let is_true = matches!(record.data.get(key), Some(Value::Bool(true)));
            // `true` requires presence with value true; `false` tolerates
            // absence but forbids true.
            if *required != is_true {
                return false;
            }
        }
        for (key, expected) in &self.str_equal {
            match record.data.get(key).and_then(Value::as_str) {
                Some(value) if value == expected => {}
                _ => return false,
            }
        }
        if let Some(max_age) = self.max_age_ms {
            // An absent timestamp fails the block forever; intentional.
            match record.timestamp() {
                Some(ts) if now_ms - ts <= max_age => {}
                _ => return false,
            }
        }
        true
    }
}

/// Gate configuration: an ordered block list, or one block written inline.
#[derive(Debug, Clone, Default)]
pub struct GateConfig {
    pub blocks: Vec<GateBlock>,
}

impl GateConfig {
    pub fn from_value(value: &Value) -> Result<GateConfig> {
        let blocks = match value.get("blocks") {
            Some(list) => serde_json::from_value::<Vec<GateBlock>>(list.clone())
                .map_err(|e| ConfigError::Invalid(format!("gate blocks: {e}")))?,
            None => {
                let block: GateBlock = serde_json::from_value(value.clone())
                    .map_err(|e| ConfigError::Invalid(format!("gate block: {e}")))?;
                if block.is_empty() {
                    Vec::new()
                } else {
                    vec![block]
                }
            }
        };
        Ok(GateConfig { blocks })
    }
}

/// Latching activation gate.
///
/// Closed until one record satisfies every block simultaneously, then open
/// forever. Nothing is buffered; records seen while closed are gone.
#[derive(Debug)]
pub struct Gate {
    blocks: Vec<GateBlock>,
    open: bool,
    warned: bool,
    started_at_ms: f64,
}

impl Gate {
    pub fn new(config: GateConfig, now_ms: f64) -> Gate {
        Gate {
            blocks: config.blocks,
            open: false,
            warned: false,
            started_at_ms: now_ms,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn on_record(&mut self, mut record: Record, now_ms: f64) -> Option<Record> {
        if !self.open && self.blocks.iter().all(|b| b.satisfied(&record, now_ms)) {
            self.open = true;
            info!("gate opened");
        }
        if self.open {
            record.append_tag(TAG);
            Some(record)
        } else {
            self.on_tick(now_ms);
            None
        }
    }

    /// Diagnostic timeout check; logs one warning, never opens the gate.
    pub fn on_tick(&mut self, now_ms: f64) {
        if self.open || self.warned {
            return;
        }
        let timeout = self
            .blocks
            .iter()
            .filter_map(|b| b.timeout_ms)
            .fold(None::<f64>, |acc, t| Some(acc.map_or(t, |a| a.max(t))));
        if let Some(timeout) = timeout {
            if now_ms - self.started_at_ms >= timeout {
                warn!("gate still closed after {timeout} ms");
                self.warned = true;
            }
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

    fn gate(config: Value) -> Gate {
        Gate::new(GateConfig::from_value(&config).unwrap(), 0.0)
    }

    #[test]
    fn test_empty_config_opens_on_first_record() {
        let mut gate = gate(json!({}));
        assert!(gate.on_record(record(json!({})), 0.0).is_some());
        assert!(gate.is_open());
    }

    #[test]
    fn test_activation_sequence_and_latch() {
        let mut gate = gate(json!({"must_have": ["ready"], "bool_equal": {"ready": true}}));

        assert!(gate.on_record(record(json!({})), 0.0).is_none());
        assert!(gate.on_record(record(json!({"ready": false})), 0.0).is_none());

        let out = gate
            .on_record(record(json!({"ready": true, "x": 9})), 0.0)
            .unwrap();
        assert_eq!(out.pipeline(), vec![TAG.to_string()]);
        assert_eq!(out.data.get("x"), Some(&json!(9)));

        // Latched: the next record passes even without the key.
        let out = gate.on_record(record(json!({"y": 1})), 0.0).unwrap();
        assert_eq!(out.data.get("y"), Some(&json!(1)));
        assert_eq!(out.pipeline(), vec![TAG.to_string()]);
    }

    #[test]
    fn test_min_values_and_str_equal() {
        let mut gate = gate(json!({
            "min_values": {"level": 3},
            "str_equal": {"mode": "run"}
        }));

        assert!(gate
            .on_record(record(json!({"level": 2, "mode": "run"})), 0.0)
            .is_none());
        assert!(gate
            .on_record(record(json!({"level": 3, "mode": "idle"})), 0.0)
            .is_none());
        assert!(gate
            .on_record(record(json!({"level": 3, "mode": "run"})), 0.0)
            .is_some());
    }

    #[test]
    fn test_bool_equal_false_tolerates_absence() {
        let mut gate1 = gate(json!({"bool_equal": {"fault": false}}));
        assert!(gate1.on_record(record(json!({})), 0.0).is_some());

        let mut gate2 = gate(json!({"bool_equal": {"fault": false}}));
        assert!(gate2.on_record(record(json!({"fault": true})), 0.0).is_none());
        assert!(gate2.on_record(record(json!({"fault": false})), 0.0).is_some());
    }

    #[test]
    fn test_max_age_requires_timestamp() {
        let mut gate = gate(json!({"max_age_ms": 100}));

        // No timestamp: fails forever.
        assert!(gate.on_record(record(json!({})), 1000.0).is_none());

        let stale = Record::normalize(json!({"meta": {"timestamp": 500}, "data": {}}));
        assert!(gate.on_record(stale, 1000.0).is_none());

        let fresh = Record::normalize(json!({"meta": {"timestamp": 950}, "data": {}}));
        assert!(gate.on_record(fresh, 1000.0).is_some());
    }

    #[test]
    fn test_multiple_blocks_must_all_pass() {
        let mut gate = gate(json!({"blocks": [
            {"must_have": ["a"]},
            {"min_values": {"b": 1}}
        ]}));

        assert!(gate.on_record(record(json!({"a": 1})), 0.0).is_none());
        assert!(gate.on_record(record(json!({"b": 2})), 0.0).is_none());
        assert!(gate
            .on_record(record(json!({"a": 1, "b": 2})), 0.0)
            .is_some());
    }

    #[test]
    fn test_timeout_warns_once_and_does_not_open() {
        let mut gate = gate(json!({"must_have": ["go"], "timeout_ms": 50}));
        gate.on_tick(40.0);
        assert!(!gate.warned);
        gate.on_tick(60.0);
        assert!(gate.warned);
        assert!(!gate.is_open());
        assert!(gate.on_record(record(json!({})), 70.0).is_none());
    }
}
