//! Trace-event log and scope-bound timing spans.
//!
//! [`TraceLog`] is an append-only list of [`TraceEvent`]s behind a global
//! on/off switch. Checking the switch is a single atomic load, so call sites
//! pay almost nothing while tracing is off. Appends take a lock; events
//! therefore appear in the order their appends acquired it, which is not
//! necessarily the order their spans were opened.
//!
//! A [`Span`] times its own lifetime and appends exactly one event when it
//! drops, on every exit path including `?` and unwinding. Whether the log is
//! active is decided at drop time, not when the span is created.
//!
//! # Example
//!
//! ```rust,ignore
//! use tracebacker::TraceLog;
//!
//! let log = TraceLog::new();
//! log.start();
//!
//! {
//!     let _span = log.span("load_model", file!(), line!());
//!     // ... work
//! }
//!
//! log.stop();
//! assert_eq!(log.get_traces().len(), 1);
//! ```

use parking_lot::Mutex;
use serde::Serialize;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracebacker_common::{Clock, MonotonicClock, Result, SharedClock, ThreadKey};
use tracing::debug;

/// One completed, timed call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEvent {
    pub function: String,
    pub filename: String,
    pub line: u32,
    /// Start time in seconds
    pub timestamp: f64,
    /// Elapsed seconds
    pub duration: f64,
    pub thread_id: ThreadKey,
}

impl TraceEvent {
    /// End time in seconds
    pub fn end(&self) -> f64 {
        self.timestamp + self.duration
    }

    /// Generic key-value form for a binding layer.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

// ============================================================================
// Trace Log
// ============================================================================

/// Globally toggled, append-only event log.
pub struct TraceLog {
    active: AtomicBool,
    events: Mutex<Vec<TraceEvent>>,
    clock: SharedClock,
}

impl std::fmt::Debug for TraceLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceLog")
            .field("active", &self.is_tracing())
            .field("len", &self.len())
            .finish()
    }
}

impl Default for TraceLog {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceLog {
    /// Create an inactive log timed by a [`MonotonicClock`]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::new()))
    }

    /// Create an inactive log that reads time from `clock`
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            active: AtomicBool::new(false),
            events: Mutex::new(Vec::new()),
            clock,
        }
    }

    /// Current reading of the log's clock, in seconds.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Drop previous events and start recording.
    pub fn start(&self) {
        let mut events = self.events.lock();
        events.clear();
        self.active.store(true, Ordering::Release);
        drop(events);

        debug!("tracing started");
    }

    /// Stop recording. Collected events are kept.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
        debug!("tracing stopped");
    }

    pub fn is_tracing(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Append an event for the calling thread. No-op while inactive.
    pub fn add_trace(
        &self,
        function: impl Into<String>,
        filename: impl Into<String>,
        line: u32,
        timestamp: f64,
        duration: f64,
    ) {
        if !self.is_tracing() {
            return;
        }

        let event = TraceEvent {
            function: function.into(),
            filename: filename.into(),
            line,
            timestamp,
            duration,
            thread_id: ThreadKey::current(),
        };
        self.events.lock().push(event);
    }

    /// Copy of every event in append order.
    pub fn get_traces(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    /// Drop every event, whether or not the log is active.
    pub fn clear(&self) {
        self.events.lock().clear();
        debug!("traces cleared");
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open a span that appends one event to this log when dropped.
    pub fn span<'a>(
        &'a self,
        function: impl Into<Cow<'a, str>>,
        filename: impl Into<Cow<'a, str>>,
        line: u32,
    ) -> Span<'a> {
        Span {
            log: self,
            function: function.into(),
            filename: filename.into(),
            line,
            start: self.clock.now(),
        }
    }

    /// Run `f` inside a span.
    ///
    /// The event is appended even if `f` panics.
    pub fn trace<'a, F, R>(
        &'a self,
        function: impl Into<Cow<'a, str>>,
        filename: impl Into<Cow<'a, str>>,
        line: u32,
        f: F,
    ) -> R
    where
        F: FnOnce() -> R,
    {
        let _span = self.span(function, filename, line);
        f()
    }

    /// All events as a pretty-printed JSON array.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.get_traces())?)
    }
}

// ============================================================================
// Span
// ============================================================================

/// Scoped timer bound to a function and source location.
///
/// Borrowed names (`&'static str` from `file!()`, literals) are not copied
/// unless an event is actually appended.
#[must_use = "a span records its event when dropped; binding it to `_` drops it immediately"]
pub struct Span<'a> {
    log: &'a TraceLog,
    function: Cow<'a, str>,
    filename: Cow<'a, str>,
    line: u32,
    start: f64,
}

impl Span<'_> {
    /// Start time in seconds
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Seconds since the span was opened
    pub fn elapsed(&self) -> f64 {
        self.log.clock.now() - self.start
    }

    /// Release the span now instead of at end of scope.
    pub fn finish(self) {}
}

impl std::fmt::Debug for Span<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Span")
            .field("function", &self.function)
            .field("filename", &self.filename)
            .field("line", &self.line)
            .field("start", &self.start)
            .finish()
    }
}

impl Drop for Span<'_> {
    fn drop(&mut self) {
        if !self.log.is_tracing() {
            return;
        }

        let duration = self.log.clock.now() - self.start;
        self.log.add_trace(
            std::mem::take(&mut self.function),
            std::mem::take(&mut self.filename),
            self.line,
            self.start,
            duration,
        );
    }
}

// ============================================================================
// Tests
// ============================================================================
