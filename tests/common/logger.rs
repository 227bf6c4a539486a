//! Per-test progress output.
//!
//! Lines go to stderr so they show up with `--nocapture` and in CI logs.
//!
//! # Environment Variables
//!
//! - `TEST_LOG_LEVEL` - minimum level: debug, info, warn (default: info)
//! - `TEST_LOG_JSON` - "1" or "true" for one JSON object per line

use std::env;
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use super::log_capture::TestLogCapture;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Warn,
}

impl Level {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" | "trace" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" | "error" => Some(Self::Warn),
            _ => None,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
        }
    }
}

struct Settings {
    min_level: Level,
    json: bool,
}

fn settings() -> &'static Settings {
    static SETTINGS: OnceLock<Settings> = OnceLock::new();
    SETTINGS.get_or_init(|| Settings {
        min_level: env::var("TEST_LOG_LEVEL")
            .ok()
            .and_then(|s| Level::parse(&s))
            .unwrap_or(Level::Info),
        json: env::var("TEST_LOG_JSON").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
    })
}

#[derive(Serialize)]
struct Entry<'a> {
    timestamp: String,
    level: Level,
    test: &'a str,
    phase: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u128>,
}

/// Logger for one test: tracks the current phase and elapsed time.
pub struct TestLogger {
    test: String,
    started: Instant,
    phase: Mutex<String>,
}

impl TestLogger {
    #[must_use]
    pub fn new(test: &str) -> Self {
        let logger = Self {
            test: test.to_string(),
            started: Instant::now(),
            phase: Mutex::new("init".to_string()),
        };
        logger.emit(Level::Info, "starting", None);
        logger
    }

    /// Logger plus a tracing capture scoped to the current thread.
    pub fn with_capture(test: &str) -> (Self, TestLogCapture) {
        let capture = TestLogCapture::start();
        (Self::new(test), capture)
    }

    pub fn phase(&self, phase: &str) {
        if let Ok(mut current) = self.phase.lock() {
            *current = phase.to_string();
        }
        self.emit(Level::Debug, &format!("phase {phase}"), None);
    }

    pub fn debug(&self, message: &str) {
        self.emit(Level::Debug, message, None);
    }

    pub fn info(&self, message: &str) {
        self.emit(Level::Info, message, None);
    }

    pub fn warn(&self, message: &str) {
        self.emit(Level::Warn, message, None);
    }

    pub fn finish_ok(&self) {
        let elapsed = self.started.elapsed().as_millis();
        self.emit(Level::Info, "passed", Some(elapsed));
    }

    fn emit(&self, level: Level, message: &str, duration_ms: Option<u128>) {
        let settings = settings();
        if level < settings.min_level {
            return;
        }
        let phase = self
            .phase
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default();
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();

        if settings.json {
            let entry = Entry {
                timestamp,
                level,
                test: &self.test,
                phase: &phase,
                message,
                duration_ms,
            };
            if let Ok(line) = serde_json::to_string(&entry) {
                eprintln!("{line}");
            }
        } else {
            let suffix = duration_ms.map(|ms| format!(" ({ms}ms)")).unwrap_or_default();
            eprintln!(
                "{timestamp} {:<5} [{}:{phase}] {message}{suffix}",
                level.label(),
                self.test
            );
        }
    }
}
