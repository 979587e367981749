use common::Record;

pub const TAG: &str = "minr";

/// Minimum-rate guarantee: at least one record every `interval_ms`.
///
/// Real records are forwarded untouched (and never dropped); when the line
/// goes quiet a clone of the last emission is produced with its logical
/// timestamp advanced by exactly one interval, so replay clocks never step
/// backward.
#[derive(Debug)]
pub struct Minrate {
    interval_ms: f64,
    cached: Option<Record>,
    last_emit_wall_ms: f64,
    last_logical_ts: f64,
}

impl Minrate {
    pub fn new(interval_ms: f64) -> Minrate {
        Minrate {
            interval_ms,
            cached: None,
            last_emit_wall_ms: 0.0,
            last_logical_ts: 0.0,
        }
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    /// Timer period for the clone check.
    pub fn tick_ms(&self) -> f64 {
        (self.interval_ms / 4.0).max(5.0)
    }

    /// Forwards a real record immediately and caches it for cloning.
    pub fn on_record(&mut self, mut record: Record, now_ms: f64) -> Record {
        let ts = match record.timestamp() {
            Some(ts) => ts,
            None => {
                record.set_timestamp(now_ms);
                now_ms
            }
        };
        record.append_tag(TAG);
        self.cached = Some(record.clone());
        self.last_emit_wall_ms = now_ms;
        self.last_logical_ts = ts;
        record
    }

    /// Emits a clone when the interval has elapsed without traffic.
    pub fn on_tick(&mut self, now_ms: f64) -> Option<Record> {
        let cached = self.cached.as_ref()?;
        if now_ms - self.last_emit_wall_ms < self.interval_ms {
            return None;
        }
        // Deep copy; the cached pipeline already carries the tag.
        let mut clone = cached.clone();
        let next_ts = self.last_logical_ts + self.interval_ms;
        clone.set_timestamp(next_ts);
        self.last_logical_ts = next_ts;
        self.last_emit_wall_ms = now_ms;
        self.cached = Some(clone.clone());
        Some(clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_real_record_forwarded_with_tag() {
        let mut minrate = Minrate::new(100.0);
        let record = Record::normalize(json!({
            "meta": {"timestamp": 1000, "pipeline": []},
            "data": {"x": 7}
        }));
        let out = minrate.on_record(record, 0.0);
        assert_eq!(out.timestamp(), Some(1000.0));
        assert_eq!(out.pipeline(), vec![TAG.to_string()]);
        assert_eq!(out.data.get("x"), Some(&json!(7)));
    }

    #[test]
    fn test_missing_timestamp_defaults_to_now() {
        let mut minrate = Minrate::new(100.0);
        let record = Record::normalize(json!({"data": {}}));
        let out = minrate.on_record(record, 250.0);
        assert_eq!(out.timestamp(), Some(250.0));
    }

    #[test]
    fn test_clone_timeline() {
        // Input at wall 0 with ts=1000, silence for 350 ms: emissions carry
        // timestamps 1000, 1100, 1200, 1300.
        let mut minrate = Minrate::new(100.0);
        let record = Record::normalize(json!({
            "meta": {"timestamp": 1000, "pipeline": []},
            "data": {"x": 7}
        }));
        let mut emitted = vec![minrate.on_record(record, 0.0)];

        let mut wall = 0.0;
        while wall <= 350.0 {
            wall += minrate.tick_ms();
            if let Some(clone) = minrate.on_tick(wall) {
                emitted.push(clone);
            }
        }

        let timestamps: Vec<f64> = emitted.iter().filter_map(|r| r.timestamp()).collect();
        assert_eq!(timestamps, vec![1000.0, 1100.0, 1200.0, 1300.0]);
        for record in &emitted {
            assert_eq!(record.data.get("x"), Some(&json!(7)));
            assert_eq!(record.pipeline(), vec![TAG.to_string()]);
        }
    }

    #[test]
    fn test_no_clone_before_interval() {
        let mut minrate = Minrate::new(100.0);
        let record = Record::normalize(json!({"meta": {"timestamp": 1000}, "data": {}}));
        minrate.on_record(record, 0.0);
        assert!(minrate.on_tick(50.0).is_none());
        assert!(minrate.on_tick(99.9).is_none());
        assert!(minrate.on_tick(100.0).is_some());
    }

    #[test]
    fn test_no_clone_without_any_record() {
        let mut minrate = Minrate::new(100.0);
        assert!(minrate.on_tick(1000.0).is_none());
    }

    #[test]
    fn test_real_record_resets_clock() {
        let mut minrate = Minrate::new(100.0);
        let first = Record::normalize(json!({"meta": {"timestamp": 1000}, "data": {"x": 1}}));
        minrate.on_record(first, 0.0);
        minrate.on_tick(100.0).unwrap();

        let second = Record::normalize(json!({"meta": {"timestamp": 5000}, "data": {"x": 2}}));
        minrate.on_record(second, 150.0);

        // Next clone continues from the real record's logical clock.
        let clone = minrate.on_tick(250.0).unwrap();
        assert_eq!(clone.timestamp(), Some(5100.0));
        assert_eq!(clone.data.get("x"), Some(&json!(2)));
    }

    #[test]
    fn test_tick_floor() {
        assert_eq!(Minrate::new(8.0).tick_ms(), 5.0);
        assert_eq!(Minrate::new(400.0).tick_ms(), 100.0);
    }
}
