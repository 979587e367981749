use common::Record;
use std::collections::VecDeque;

pub const TAG: &str = "dly";

/// Logical-time delay with watermark-driven release.
///
/// Emission never outruns the input clock: a buffered item leaves only once
/// the watermark (the highest input timestamp seen) covers its shifted
/// timestamp. EOF flushes whatever remains, in order.
#[derive(Debug)]
pub struct Delay {
    delay_ms: f64,
    watermark: f64,
    buffer: VecDeque<(f64, Record)>,
}

impl Delay {
    pub fn new(delay_ms: f64, max_delay_ms: Option<f64>) -> Delay {
        let delay_ms = match max_delay_ms {
            Some(cap) => delay_ms.min(cap),
            None => delay_ms,
        };
        Delay {
            delay_ms,
            watermark: f64::NEG_INFINITY,
            buffer: VecDeque::new(),
        }
    }

    pub fn delay_ms(&self) -> f64 {
        self.delay_ms
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn on_record(&mut self, record: Record, now_ms: f64) -> Vec<Record> {
        let ts_in = record
            .timestamp()
            .filter(|t| t.is_finite())
            .unwrap_or(now_ms);
        self.watermark = self.watermark.max(ts_in);

        let ts_out = ts_in + self.delay_ms;
        let at = self.buffer.partition_point(|(t, _)| *t <= ts_out);
        self.buffer.insert(at, (ts_out, record));

        self.release()
    }

    fn release(&mut self) -> Vec<Record> {
        let mut ready = Vec::new();
        while self
            .buffer
            .front()
            .map(|(ts_out, _)| *ts_out <= self.watermark)
            .unwrap_or(false)
        {
            let (ts_out, record) = self.buffer.pop_front().expect("front checked");
            ready.push(stamp(record, ts_out));
        }
        ready
    }

    /// EOF drain: everything goes, watermark or not.
    pub fn flush(&mut self) -> Vec<Record> {
        self.buffer
            .drain(..)
            .map(|(ts_out, record)| stamp(record, ts_out))
            .collect()
    }
}

fn stamp(mut record: Record, ts_out: f64) -> Record {
    record.set_timestamp(ts_out);
    record.append_tag(TAG);
    record
}
