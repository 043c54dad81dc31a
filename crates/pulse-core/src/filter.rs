//! Per-viewer event filtering.
//!
//! A filter is a conjunction of optional criteria. Filters apply to log
//! events only; metric ticks, alerts, notifications, and upload status
//! always pass so a narrowed log view never hides operational signals.

use serde::{Deserialize, Serialize};

use crate::event::{EventKind, LogLevel, LogRecord};

/// Criteria a log event must satisfy to reach a viewer.
///
/// `None` fields match everything; the default filter passes all events.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Exact severity match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
    /// Substring match on the source name (case-insensitive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Exact environment match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Substring match on the message text (case-insensitive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl EventFilter {
    /// A filter that passes every event.
    #[must_use]
    pub fn pass_all() -> Self {
        Self::default()
    }

    /// Whether no criteria are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.level.is_none()
            && self.source.is_none()
            && self.environment.is_none()
            && self.text.is_none()
    }

    /// Whether an event passes this filter.
    #[must_use]
    pub fn matches(&self, kind: &EventKind) -> bool {
        match kind {
            EventKind::LogEvent(record) => self.matches_log(record),
            _ => true,
        }
    }

    fn matches_log(&self, record: &LogRecord) -> bool {
        if let Some(level) = self.level {
            if record.level != level {
                return false;
            }
        }
        if let Some(ref needle) = self.source {
            let Some(ref source) = record.source else {
                return false;
            };
            if !contains_ignore_case(source, needle) {
                return false;
            }
        }
        if let Some(ref env) = self.environment {
            if record.environment.as_deref() != Some(env.as_str()) {
                return false;
            }
        }
        if let Some(ref needle) = self.text {
            if !contains_ignore_case(&record.message, needle) {
                return false;
            }
        }
        true
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
