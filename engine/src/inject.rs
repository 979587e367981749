use common::Record;
use serde::Deserialize;
use serde_json::{Map, Value};

pub const TAG: &str = "inj";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InjectConfig {
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default, rename = "override")]
    pub override_existing: bool,
}

/// Constant-field annotator.
///
/// Writes the configured fields into every record's `data`; with
/// `override=false` keys already present are left untouched.
#[derive(Debug)]
pub struct Inject {
    config: InjectConfig,
}

impl Inject {
    pub fn new(config: InjectConfig) -> Inject {
        Inject { config }
    }

    pub fn on_record(&self, mut record: Record, _now_ms: f64) -> Record {
        for (key, value) in &self.config.fields {
            if self.config.override_existing || !record.data.contains_key(key) {
                record.data.insert(key.clone(), value.clone());
            }
        }
        record.append_tag(TAG);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inject(config: Value) -> Inject {
        Inject::new(serde_json::from_value(config).unwrap())
    }

    #[test]
    fn test_injects_missing_fields() {
        let inject = inject(json!({"fields": {"site": "plant-2", "unit": 7}}));
        let out = inject.on_record(Record::normalize(json!({"data": {"x": 1}})), 0.0);
        assert_eq!(out.data.get("site"), Some(&json!("plant-2")));
        assert_eq!(out.data.get("unit"), Some(&json!(7)));
        assert_eq!(out.data.get("x"), Some(&json!(1)));
        assert_eq!(out.pipeline(), vec![TAG.to_string()]);
    }

    #[test]
    fn test_present_keys_kept_without_override() {
        let inject = inject(json!({"fields": {"site": "plant-2"}}));
        let out = inject.on_record(Record::normalize(json!({"data": {"site": "lab"}})), 0.0);
        assert_eq!(out.data.get("site"), Some(&json!("lab")));
    }

    #[test]
    fn test_override_replaces_present_keys() {
        let inject = inject(json!({"fields": {"site": "plant-2"}, "override": true}));
        let out = inject.on_record(Record::normalize(json!({"data": {"site": "lab"}})), 0.0);
        assert_eq!(out.data.get("site"), Some(&json!("plant-2")));
    }
}
