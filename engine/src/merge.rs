use common::numeric::{as_f64, is_finite_number};
use common::record::json_number;
use common::Record;
use log::debug;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::VecDeque;

pub const TAG: &str = "mrg";

#[derive(Debug, Clone, Deserialize)]
pub struct MergeConfig {
    #[serde(default = "default_match_tolerance", alias = "matchToleranceMs")]
    pub match_tolerance_ms: f64,
    #[serde(default = "default_max_buffer", alias = "maxBufferMs")]
    pub max_buffer_ms: f64,
    #[serde(default, alias = "allowUnboundedDelay")]
    pub allow_unbounded_delay: Vec<bool>,
    #[serde(default)]
    pub postfix: Vec<String>,
}

fn default_match_tolerance() -> f64 {
    10.0
}

fn default_max_buffer() -> f64 {
    10_000.0
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            match_tolerance_ms: default_match_tolerance(),
            max_buffer_ms: default_max_buffer(),
            allow_unbounded_delay: Vec::new(),
            postfix: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct SideRecord {
    ts: f64,
    data: Map<String, Value>,
}

#[derive(Debug)]
enum SideState {
    /// Time-ordered window covering `[now - max_buffer_ms, now]`.
    Bounded(VecDeque<SideRecord>),
    /// Only the latest record with a numeric timestamp; never interpolated.
    Unbounded(Option<SideRecord>),
}

/// Time-aligned multi-stream join.
///
/// Exactly one output per primary record; side streams only contribute
/// fields, they never reorder or drop the primary.
#[derive(Debug)]
pub struct Merge {
    config: MergeConfig,
    sides: Vec<SideState>,
}

impl Merge {
    pub fn new(config: MergeConfig, side_count: usize) -> Merge {
        let sides = (0..side_count)
            .map(|i| {
                if config.allow_unbounded_delay.get(i).copied().unwrap_or(false) {
                    SideState::Unbounded(None)
                } else {
                    SideState::Bounded(VecDeque::new())
                }
            })
            .collect();
        Merge { config, sides }
    }

    fn postfix(&self, index: usize) -> String {
        self.config
            .postfix
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("_{}", index + 1))
    }

    /// Buffers one side record; entries without a numeric timestamp are
    /// unusable for alignment and dropped.
    pub fn on_side(&mut self, index: usize, record: Record, now_ms: f64) {
        let Some(state) = self.sides.get_mut(index) else {
            return;
        };
        let Some(ts) = record.timestamp().filter(|t| t.is_finite()) else {
            debug!("side {index} record without numeric timestamp dropped");
            return;
        };
        let entry = SideRecord {
            ts,
            data: record.data,
        };
        match state {
            SideState::Unbounded(slot) => {
                let newer = slot.as_ref().map(|held| ts >= held.ts).unwrap_or(true);
                if newer {
                    *slot = Some(entry);
                }
            }
            SideState::Bounded(window) => {
                let at = window.partition_point(|r| r.ts <= ts);
                window.insert(at, entry);
                trim_window(window, now_ms, self.config.max_buffer_ms);
            }
        }
    }

    /// Drops bounded-window entries older than the buffer horizon.
    pub fn on_tick(&mut self, now_ms: f64) {
        for state in &mut self.sides {
            if let SideState::Bounded(window) = state {
                trim_window(window, now_ms, self.config.max_buffer_ms);
            }
        }
    }

    /// Joins one primary record against every side.
    pub fn on_main(&mut self, mut record: Record, _now_ms: f64) -> Record {
        let Some(t) = record.timestamp().filter(|t| t.is_finite()) else {
            // Non-numeric main timestamp: pass through untouched, tag only.
            record.append_tag(TAG);
            return record;
        };

        let mut merged = record.clone();
        merged.set_timestamp(t);

        for index in 0..self.sides.len() {
            let selected = match &self.sides[index] {
                SideState::Unbounded(slot) => slot.as_ref().map(|held| held.data.clone()),
                SideState::Bounded(window) => {
                    select_bounded(window, t, self.config.match_tolerance_ms)
                }
            };
            if let Some(side_data) = selected {
                let postfix = self.postfix(index);
                for (key, value) in side_data {
                    merged.data.insert(format!("{key}{postfix}"), value);
                }
            }
        }

        merged.append_tag(TAG);
        merged
    }
}

fn trim_window(window: &mut VecDeque<SideRecord>, now_ms: f64, max_buffer_ms: f64) {
    let horizon = now_ms - max_buffer_ms;
    while window.front().map(|r| r.ts < horizon).unwrap_or(false) {
        window.pop_front();
    }
}

/// Bounded-mode selection: nearest-within-tolerance, else interpolation
/// between the bracketing records, else whichever neighbor exists.
fn select_bounded(
    window: &VecDeque<SideRecord>,
    t: f64,
    tolerance_ms: f64,
) -> Option<Map<String, Value>> {
    if window.is_empty() {
        return None;
    }

    let nearest = window
        .iter()
        .min_by(|a, b| {
            let da = (a.ts - t).abs();
            let db = (b.ts - t).abs();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .expect("window is non-empty");
    if (nearest.ts - t).abs() <= tolerance_ms {
        return Some(nearest.data.clone());
    }

    let before = window.iter().rev().find(|r| r.ts <= t);
    let after = window.iter().find(|r| r.ts > t);

    match (before, after) {
        (Some(before), Some(after)) if after.ts > before.ts => {
            let r = (t - before.ts) / (after.ts - before.ts);
            let mut data = before.data.clone();
            for (key, value) in &before.data {
                if is_finite_number(value) {
                    if let Some(after_value) = after.data.get(key).filter(|v| is_finite_number(v)) {
                        let a = as_f64(value).expect("checked finite");
                        let b = as_f64(after_value).expect("checked finite");
                        data.insert(key.clone(), json_number(a + (b - a) * r));
                    }
                }
            }
            Some(data)
        }
        (Some(only), None) | (None, Some(only)) => Some(only.data.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn side(ts: f64, data: Value) -> Record {
        Record::normalize(json!({"meta": {"timestamp": ts}, "data": data}))
    }

    fn main_record(ts: f64, data: Value) -> Record {
        Record::normalize(json!({"meta": {"timestamp": ts}, "data": data}))
    }

    fn config(raw: Value) -> MergeConfig {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_exact_match_within_tolerance() {
        let mut merge = Merge::new(config(json!({"match_tolerance_ms": 10})), 1);
        merge.on_side(0, side(995.0, json!({"y": 42})), 1000.0);

        let out = merge.on_main(main_record(1000.0, json!({"x": 1})), 1000.0);
        assert_eq!(out.data.get("y_1"), Some(&json!(42)));
        assert_eq!(out.timestamp(), Some(1000.0));
        assert_eq!(out.pipeline(), vec![TAG.to_string()]);
    }

    #[test]
    fn test_interpolation_scenario() {
        // Side at 980 -> y=10 and 1020 -> y=20; main at 1000 with tolerance
        // 10 interpolates to y_1 = 15.
        let mut merge = Merge::new(config(json!({"match_tolerance_ms": 10})), 1);
        merge.on_side(0, side(980.0, json!({"y": 10})), 1000.0);
        merge.on_side(0, side(1020.0, json!({"y": 20})), 1000.0);

        let out = merge.on_main(main_record(1000.0, json!({"x": 1})), 1000.0);
        assert_eq!(out.data.get("x"), Some(&json!(1)));
        assert_eq!(out.data.get("y_1").and_then(Value::as_f64), Some(15.0));
        assert_eq!(out.timestamp(), Some(1000.0));
    }

    #[test]
    fn test_interpolation_only_touches_shared_numeric_keys() {
        let mut merge = Merge::new(config(json!({"match_tolerance_ms": 1})), 1);
        merge.on_side(0, side(0.0, json!({"v": 0.0, "label": "lo", "only_before": 5})), 0.0);
        merge.on_side(0, side(100.0, json!({"v": 100.0, "label": "hi"})), 0.0);

        let out = merge.on_main(main_record(25.0, json!({})), 25.0);
        assert_eq!(out.data.get("v_1").and_then(Value::as_f64), Some(25.0));
        // Non-numeric and unshared keys come from `before` untouched.
        assert_eq!(out.data.get("label_1"), Some(&json!("lo")));
        assert_eq!(out.data.get("only_before_1"), Some(&json!(5)));
    }

    #[test]
    fn test_one_sided_fallback() {
        let mut merge = Merge::new(config(json!({"match_tolerance_ms": 1})), 1);
        merge.on_side(0, side(500.0, json!({"y": 9})), 500.0);

        // Only `before` exists.
        let out = merge.on_main(main_record(900.0, json!({})), 900.0);
        assert_eq!(out.data.get("y_1"), Some(&json!(9)));

        // Only `after` exists.
        let mut merge = Merge::new(config(json!({"match_tolerance_ms": 1})), 1);
        merge.on_side(0, side(2000.0, json!({"y": 3})), 1000.0);
        let out = merge.on_main(main_record(1000.0, json!({})), 1000.0);
        assert_eq!(out.data.get("y_1"), Some(&json!(3)));
    }

    #[test]
    fn test_empty_side_contributes_nothing() {
        let mut merge = Merge::new(MergeConfig::default(), 1);
        let out = merge.on_main(main_record(1000.0, json!({"x": 1})), 1000.0);
        assert_eq!(out.data.len(), 1);
        assert_eq!(out.data.get("x"), Some(&json!(1)));
    }

    #[test]
    fn test_unbounded_hold_last() {
        let mut merge = Merge::new(
            config(json!({"allow_unbounded_delay": [true]})),
            1,
        );
        merge.on_side(0, side(5.0, json!({"z": 42})), 5.0);

        let out = merge.on_main(main_record(1_000_000.0, json!({"x": 1})), 1_000_000.0);
        assert_eq!(out.data.get("x"), Some(&json!(1)));
        assert_eq!(out.data.get("z_1"), Some(&json!(42)));
        assert_eq!(out.timestamp(), Some(1_000_000.0));
    }

    #[test]
    fn test_unbounded_keeps_latest_by_timestamp() {
        let mut merge = Merge::new(config(json!({"allow_unbounded_delay": [true]})), 1);
        merge.on_side(0, side(100.0, json!({"z": 1})), 100.0);
        merge.on_side(0, side(50.0, json!({"z": 0})), 100.0);
        merge.on_side(0, side(200.0, json!({"z": 2})), 200.0);

        let out = merge.on_main(main_record(0.0, json!({})), 0.0);
        assert_eq!(out.data.get("z_1"), Some(&json!(2)));
    }

    #[test]
    fn test_non_numeric_main_timestamp_passes_through() {
        let mut merge = Merge::new(MergeConfig::default(), 1);
        merge.on_side(0, side(10.0, json!({"y": 1})), 10.0);

        let record = Record::normalize(json!({"meta": {"timestamp": "nope"}, "data": {"x": 1}}));
        let out = merge.on_main(record, 10.0);
        assert_eq!(out.data.get("x"), Some(&json!(1)));
        assert!(out.data.get("y_1").is_none());
        assert_eq!(out.pipeline(), vec![TAG.to_string()]);
    }

    #[test]
    fn test_postfix_configuration_and_defaults() {
        let mut merge = Merge::new(config(json!({"postfix": ["_left"]})), 2);
        merge.on_side(0, side(1000.0, json!({"a": 1})), 1000.0);
        merge.on_side(1, side(1000.0, json!({"a": 2})), 1000.0);

        let out = merge.on_main(main_record(1000.0, json!({})), 1000.0);
        assert_eq!(out.data.get("a_left"), Some(&json!(1)));
        assert_eq!(out.data.get("a_2"), Some(&json!(2)));
    }

    #[test]
    fn test_window_trimmed_by_max_buffer() {
        let mut merge = Merge::new(
            config(json!({"max_buffer_ms": 100, "match_tolerance_ms": 1000})),
            1,
        );
        merge.on_side(0, side(0.0, json!({"y": 1})), 0.0);
        merge.on_side(0, side(500.0, json!({"y": 2})), 500.0);
        merge.on_tick(700.0);

        // The 0.0 entry fell off the horizon; nearest is 500.
        let out = merge.on_main(main_record(300.0, json!({})), 700.0);
        assert_eq!(out.data.get("y_1"), Some(&json!(2)));
    }

    #[test]
    fn test_side_without_timestamp_is_ignored() {
        let mut merge = Merge::new(MergeConfig::default(), 1);
        let record = Record::normalize(json!({"data": {"y": 1}}));
        merge.on_side(0, record, 0.0);
        let out = merge.on_main(main_record(0.0, json!({})), 0.0);
        assert!(out.data.get("y_1").is_none());
    }
}
