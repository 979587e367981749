use common::Record;
use log::info;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use utils::time::now_ms;

/// Per-interval throughput counters, logged once a second when verbose.
///
/// Delay is `now - meta.timestamp` and only counted when the timestamp is
/// numeric. Counters reset on every tick.
#[derive(Debug, Default)]
pub struct Stats {
    in_count: AtomicU64,
    out_count: AtomicU64,
    delay_sum_us: AtomicU64,
    delay_count: AtomicU64,
    last_tags: Mutex<String>,
}

impl Stats {
    pub fn new() -> Arc<Stats> {
        Arc::new(Stats::default())
    }

    pub fn record_in(&self, record: &Record) {
        self.in_count.fetch_add(1, Ordering::Relaxed);
        if let Some(ts) = record.timestamp() {
            let delay_ms = now_ms() - ts;
            if delay_ms.is_finite() && delay_ms >= 0.0 {
                self.delay_sum_us
                    .fetch_add((delay_ms * 1000.0) as u64, Ordering::Relaxed);
                self.delay_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_out(&self, record: &Record) {
        self.out_count.fetch_add(1, Ordering::Relaxed);
        let tags = record.pipeline();
        if !tags.is_empty() {
            if let Ok(mut last) = self.last_tags.lock() {
                *last = tags.join(">");
            }
        }
    }

    /// Drains the counters into one log line; exposed for tests.
    pub fn tick_line(&self) -> String {
        let in_count = self.in_count.swap(0, Ordering::Relaxed);
        let out_count = self.out_count.swap(0, Ordering::Relaxed);
        let delay_sum_us = self.delay_sum_us.swap(0, Ordering::Relaxed);
        let delay_count = self.delay_count.swap(0, Ordering::Relaxed);

        let avg_delay_ms = if delay_count > 0 {
            (delay_sum_us as f64 / delay_count as f64) / 1000.0
        } else {
            0.0
        };
        let tags = self
            .last_tags
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default();
        format!(
            "rate in={in_count}/s out={out_count}/s avg_delay={avg_delay_ms:.1}ms tags=[{tags}]"
        )
    }

    /// Starts the 1000 ms reporting loop on the current runtime.
    pub fn spawn_ticker(self: &Arc<Self>) {
        let stats = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(1000));
            interval.tick().await; // immediate first tick carries nothing
            loop {
                interval.tick().await;
                info!("{}", stats.tick_line());
            }
        });
    }
}
