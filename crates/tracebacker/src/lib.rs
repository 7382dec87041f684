//! Low-overhead runtime instrumentation
//!
//! Records, per call, what ran, on which thread and for how long, and rolls
//! that into live statistics and a replayable trace log.
//!
//! # Features
//! - Per-thread call stacks with a cross-thread lookup registry
//! - Concurrent per-function statistics with bounded sample windows,
//!   nearest-rank percentiles and moving averages
//! - Globally toggled trace log fed by RAII timing spans
//!
//! Everything degrades silently: popping an empty stack, recording into a
//! disabled table or tracing into an inactive log are no-ops, never errors.
//!
//! # Example
//!
//! ```rust,ignore
//! use tracebacker::{Instrumentation, InstrumentationConfig};
//!
//! let domain = Instrumentation::new(InstrumentationConfig::new().tracing(true));
//! let stack = domain.call_stacks().register()?;
//!
//! domain.instrument(&stack, "decode", file!(), line!(), || {
//!     // ... work
//! });
//!
//! for (name, stats) in domain.stats().get_stats() {
//!     println!("{name}: {} calls, avg {:.6}s", stats.call_count, stats.avg_time);
//! }
//! ```

pub mod call_stack;
pub mod config;
pub mod instrumentation;
pub mod stats;
pub mod trace;

pub use tracebacker_common::{
    Clock, ManualClock, MonotonicClock, Result, SharedClock, ThreadKey, TracebackerError,
};
pub use call_stack::{CallFrame, CallStackRegistry, FrameGuard, FrameLocation, RemoteStack, StackHandle};
pub use config::InstrumentationConfig;
pub use instrumentation::{global, Instrumentation};
pub use stats::{FunctionStatsSnapshot, Percentiles, StatsTable, DEFAULT_MAX_SAMPLES, DEFAULT_WINDOW_SIZE};
pub use trace::{Span, TraceEvent, TraceLog};
