use chrono::Utc;

/// Current wall clock in milliseconds since the Unix epoch.
pub fn now_ms() -> f64 {
    Utc::now().timestamp_millis() as f64
}
