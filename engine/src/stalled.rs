use common::Record;
use serde::Deserialize;
use serde_json::Value;

pub const TAG: &str = "stl";

#[derive(Debug, Clone, Deserialize)]
pub struct StalledConfig {
    #[serde(alias = "thresholdMs")]
    pub threshold_ms: f64,
    #[serde(default = "default_field")]
    pub field: String,
}

fn default_field() -> String {
    "stalled".to_string()
}

/// Gap annotator.
///
/// Marks each record with whether the logical gap to the previous record
/// exceeded the threshold. Records without a timestamp fall back to the
/// wall clock. The first record is never stalled.
#[derive(Debug)]
pub struct Stalled {
    config: StalledConfig,
    last_ts: Option<f64>,
}

impl Stalled {
    pub fn new(config: StalledConfig) -> Stalled {
        Stalled {
            config,
            last_ts: None,
        }
    }

    pub fn on_record(&mut self, mut record: Record, now_ms: f64) -> Record {
        let ts = record
            .timestamp()
            .filter(|t| t.is_finite())
            .unwrap_or(now_ms);
        let stalled = match self.last_ts {
            Some(last) => ts - last > self.config.threshold_ms,
            None => false,
        };
        self.last_ts = Some(ts);
        record
            .data
            .insert(self.config.field.clone(), Value::Bool(stalled));
        record.append_tag(TAG);
        record
    }
}
