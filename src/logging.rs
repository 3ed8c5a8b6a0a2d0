use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

static SILENT: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
}

#[derive(Serialize)]
struct LogEvent<'a> {
    level: Level,
    event: &'a str,
    message: &'a str,
    timestamp_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Value>,
}

/// Mutes every log line. Benchmarks and tests flip this so the JSON stream
/// does not drown their own output.
pub fn set_silent(silent: bool) {
    SILENT.store(silent, Ordering::Relaxed);
}

pub fn is_silent() -> bool {
    SILENT.load(Ordering::Relaxed)
}

fn emit(level: Level, event: &str, message: &str, metadata: Option<Value>) {
    if is_silent() {
        return;
    }

    match render(level, event, message, metadata) {
        Ok(payload) => {
            if level == Level::Error {
                eprintln!("{payload}");
            } else {
                println!("{payload}");
            }
        }
        Err(err) => eprintln!(
            "{{\"level\":\"error\",\"event\":\"logging_failure\",\"message\":\"failed to serialise log\",\"error\":\"{err}\"}}"
        ),
    }
}

fn render(
    level: Level,
    event: &str,
    message: &str,
    metadata: Option<Value>,
) -> serde_json::Result<String> {
    serde_json::to_string(&LogEvent {
        level,
        event,
        message,
        timestamp_ms: Utc::now().timestamp_millis(),
        metadata,
    })
}

pub fn info(event: &str, message: &str, metadata: Value) {
    emit(Level::Info, event, message, Some(metadata));
}

pub fn warn(event: &str, message: &str, metadata: Value) {
    emit(Level::Warn, event, message, Some(metadata));
}

pub fn error(event: &str, message: &str, metadata: Value) {
    emit(Level::Error, event, message, Some(metadata));
}

pub fn info_simple(event: &str, message: &str) {
    emit(Level::Info, event, message, None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rendered_line_carries_event_fields() {
        let line = render(
            Level::Warn,
            "store.scan",
            "no tickers",
            Some(json!({ "prefix": "Index_" })),
        )
        .expect("render log line");
        let parsed: Value = serde_json::from_str(&line).expect("log line is json");

        assert_eq!(parsed["level"], "warn");
        assert_eq!(parsed["event"], "store.scan");
        assert_eq!(parsed["metadata"]["prefix"], "Index_");
        assert!(parsed["timestamp_ms"].as_i64().unwrap_or_default() > 0);
    }

    #[test]
    fn metadata_is_omitted_when_absent() {
        let line = render(Level::Info, "scheduler.stop", "stopped", None).expect("render");
        assert!(!line.contains("metadata"));
    }
}
