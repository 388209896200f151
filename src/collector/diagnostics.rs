//! Scrape diagnostics events and sinks.
//!
//! Every task outcome is reported as an [`Event`] to a [`DiagnosticsSink`]. The
//! pool does not format log lines itself; the default [`TracingSink`] turns
//! events into structured `tracing` records, and [`MemorySink`] keeps them for
//! inspection.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumString};

/// Event kind classification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum EventKind {
    /// Fetch and all handlers succeeded.
    Completed,
    /// Fetch failed (network, status, or invalid URL).
    FetchFailed,
    /// A handler rejected the response body.
    HandlerFailed,
    /// Fetch or a handler panicked.
    Panicked,
    /// Cancellation stopped the task before or during its fetch.
    Canceled,
}

/// Event severity classification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EventSeverity {
    Debug,
    Info,
    Warn,
    Error,
}

/// A diagnostics record for one scrape task.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Event timestamp (UTC).
    pub ts: DateTime<Utc>,
    /// Event origin, `task.<task name>`.
    pub source: String,
    pub kind: EventKind,
    pub severity: EventSeverity,
    /// Short human-readable description.
    pub message: String,
    /// Context snapshot as JSON.
    pub payload: Option<serde_json::Value>,
}

impl Event {
    /// Create an event for `task` stamped with the current time.
    pub fn new(
        task: &str,
        kind: EventKind,
        severity: EventSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            ts: Utc::now(),
            source: format!("task.{task}"),
            kind,
            severity,
            message: message.into(),
            payload: None,
        }
    }

    /// Attach a JSON payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Receiver for scrape diagnostics.
///
/// Called from pool workers, possibly concurrently. Implementations must not
/// block.
pub trait DiagnosticsSink: Send + Sync + 'static {
    fn emit(&self, event: Event);
}

/// Sink writing events as `tracing` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn emit(&self, event: Event) {
        let payload = event
            .payload
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();

        match event.severity {
            EventSeverity::Debug => tracing::debug!(
                source = %event.source,
                kind = %event.kind,
                payload = %payload,
                "{}",
                event.message
            ),
            EventSeverity::Info => tracing::info!(
                source = %event.source,
                kind = %event.kind,
                payload = %payload,
                "{}",
                event.message
            ),
            EventSeverity::Warn => tracing::warn!(
                source = %event.source,
                kind = %event.kind,
                payload = %payload,
                "{}",
                event.message
            ),
            EventSeverity::Error => tracing::error!(
                source = %event.source,
                kind = %event.kind,
                payload = %payload,
                "{}",
                event.message
            ),
        }
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded events of `kind`.
    pub fn count(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }
}

impl DiagnosticsSink for MemorySink {
    fn emit(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
