use chrono::{SecondsFormat, Utc};
use log::{Level, LevelFilter, Log, Metadata, Record as LogEvent};
use once_cell::sync::OnceCell;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

/// Stderr diagnostic backend.
///
/// Every line carries the stable prefix `<moduleName>(<configPath|no-conf>)`
/// so interleaved pipelines remain attributable. stdout is never touched;
/// it belongs to the record stream.
pub struct StderrLogger {
    prefix: String,
    level: LevelFilter,
}

static LOGGER: OnceCell<StderrLogger> = OnceCell::new();
static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, event: &LogEvent) {
        if !self.enabled(event.metadata()) {
            return;
        }
        let time = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "{} [{}] {} - {}",
            time,
            event.level(),
            self.prefix,
            event.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Maps the `--verbose-log-level` values onto the log facade.
///
/// Accepted: `none`, `error`, `warn` (or `warning`), `info`. Anything else
/// falls back to `warn`.
pub fn parse_level(level: &str) -> LevelFilter {
    match level.trim().to_lowercase().as_str() {
        "none" | "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        _ => LevelFilter::Warn,
    }
}

/// Installs the stderr logger once; later calls are ignored.
pub fn init(module: &str, config_path: Option<&str>, level: LevelFilter) {
    if LOGGER_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    let prefix = format!("{}({})", module, config_path.unwrap_or("no-conf"));
    let logger = StderrLogger { prefix, level };
    if LOGGER.set(logger).is_ok() {
        if let Some(logger) = LOGGER.get() {
            let _ = log::set_logger(logger);
            log::set_max_level(level);
        }
    }
}

/// One formatted line, exposed for tests.
pub fn format_line(prefix: &str, level: Level, message: &str) -> String {
    let time = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    format!("{} [{}] {} - {}", time, level, prefix, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("none"), LevelFilter::Off);
        assert_eq!(parse_level("error"), LevelFilter::Error);
        assert_eq!(parse_level("warn"), LevelFilter::Warn);
        assert_eq!(parse_level("warning"), LevelFilter::Warn);
        assert_eq!(parse_level("INFO"), LevelFilter::Info);
        assert_eq!(parse_level("bogus"), LevelFilter::Warn);
    }

    #[test]
    fn test_format_line_prefix() {
        let line = format_line("gate(conf.json)", Level::Warn, "still closed");
        assert!(line.contains("[WARN] gate(conf.json) - still closed"));
    }

    #[test]
    fn test_init_is_idempotent() {
        init("test", None, LevelFilter::Info);
        init("other", Some("conf.json"), LevelFilter::Error);
        log::info!("logger smoke line");
    }
}
