// crates/analyst-core/src/events.rs
// ============================================================================
// Module: Analyst Run Events
// Description: Structured lifecycle events emitted during a refresh run.
// Purpose: Emit JSON-line run logs without hard logging dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every lock, ledger, quarantine, quality, anomaly, and materialization
//! transition emits a [`RunEvent`]. Sinks decide where events go: stderr,
//! an append-only file, an in-memory buffer, or nowhere. Sinks never fail the
//! caller; serialization or write errors are dropped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::time::unix_millis;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Severity of a run event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    /// Normal lifecycle transition.
    Info,
    /// Degraded but non-fatal condition.
    Warn,
    /// Failure of the operation being reported.
    Error,
}

/// Structured run event payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Severity.
    pub level: EventLevel,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Structured fields (namespace, run id, counters, error text).
    pub fields: Map<String, Value>,
}

impl RunEvent {
    /// Creates an event with the current timestamp and no fields.
    #[must_use]
    pub fn new(event: &'static str, level: EventLevel) -> Self {
        Self {
            event,
            level,
            timestamp_ms: unix_millis(),
            fields: Map::new(),
        }
    }

    /// Creates an info-level event.
    #[must_use]
    pub fn info(event: &'static str) -> Self {
        Self::new(event, EventLevel::Info)
    }

    /// Creates a warn-level event.
    #[must_use]
    pub fn warn(event: &'static str) -> Self {
        Self::new(event, EventLevel::Warn)
    }

    /// Creates an error-level event.
    #[must_use]
    pub fn error(event: &'static str) -> Self {
        Self::new(event, EventLevel::Error)
    }

    /// Attaches a structured field.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Returns a field value by key.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Run event sink.
pub trait RunEventSink: Send + Sync {
    /// Record a run event.
    fn record(&self, event: &RunEvent);
}

/// Event sink that logs JSON lines to stderr.
pub struct StderrRunEventSink;

impl RunEventSink for StderrRunEventSink {
    fn record(&self, event: &RunEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Event sink that logs JSON lines to a file.
pub struct FileRunEventSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileRunEventSink {
    /// Opens the event log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl RunEventSink for FileRunEventSink {
    fn record(&self, event: &RunEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op event sink.
pub struct NoopRunEventSink;

impl RunEventSink for NoopRunEventSink {
    fn record(&self, _event: &RunEvent) {}
}

/// Event sink that buffers events in memory.
#[derive(Default)]
pub struct MemoryRunEventSink {
    /// Buffered events in emission order.
    events: Mutex<Vec<RunEvent>>,
}

impl MemoryRunEventSink {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of buffered events.
    #[must_use]
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    /// Returns buffered event names in emission order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .map(|guard| guard.iter().map(|event| event.event).collect())
            .unwrap_or_default()
    }
}

impl RunEventSink for MemoryRunEventSink {
    fn record(&self, event: &RunEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event.clone());
        }
    }
}
