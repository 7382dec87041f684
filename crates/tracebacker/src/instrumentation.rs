//! Instrumentation domains.
//!
//! An [`Instrumentation`] bundles one call-stack registry, one stats table
//! and one trace log. The three share configuration and nothing else; each
//! can be used on its own. Tests and embedders create as many domains as
//! they need. [`global`] is a lazily built default domain for binding layers
//! that expose module-level functions.

use once_cell::sync::Lazy;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;
use tracebacker_common::{MonotonicClock, SharedClock};
use tracing::{debug, warn};

use crate::call_stack::{CallStackRegistry, StackHandle};
use crate::config::InstrumentationConfig;
use crate::stats::StatsTable;
use crate::trace::TraceLog;

static GLOBAL: Lazy<Instrumentation> = Lazy::new(|| {
    let config = InstrumentationConfig::from_env().unwrap_or_else(|e| {
        warn!(error = %e, "ignoring invalid tracebacker environment configuration");
        InstrumentationConfig::default()
    });
    Instrumentation::new(config)
});

/// Process-wide default domain, configured from `TRACEBACKER_*` variables
/// on first use.
pub fn global() -> &'static Instrumentation {
    &GLOBAL
}

/// One isolated set of instrumentation facilities.
#[derive(Debug)]
pub struct Instrumentation {
    config: InstrumentationConfig,
    call_stacks: CallStackRegistry,
    stats: StatsTable,
    traces: TraceLog,
}

impl Default for Instrumentation {
    fn default() -> Self {
        Self::new(InstrumentationConfig::default())
    }
}

impl Instrumentation {
    pub fn new(config: InstrumentationConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// Build a domain whose trace log reads time from `clock`.
    pub fn with_clock(config: InstrumentationConfig, clock: SharedClock) -> Self {
        let stats = StatsTable::with_config(&config);
        let traces = TraceLog::with_clock(clock);
        if config.tracing {
            traces.start();
        }

        debug!(
            stats_enabled = config.stats_enabled,
            tracing = config.tracing,
            max_samples = config.max_samples,
            "instrumentation domain created"
        );

        Self {
            config,
            call_stacks: CallStackRegistry::new(),
            stats,
            traces,
        }
    }

    pub fn config(&self) -> &InstrumentationConfig {
        &self.config
    }

    pub fn call_stacks(&self) -> &CallStackRegistry {
        &self.call_stacks
    }

    pub fn stats(&self) -> &StatsTable {
        &self.stats
    }

    pub fn traces(&self) -> &TraceLog {
        &self.traces
    }

    /// Moving average of `name` over the configured window.
    pub fn moving_average(&self, name: &str) -> Vec<f64> {
        self.stats
            .calculate_moving_average(name, self.config.window_size)
    }

    /// Run `f` with all three facilities engaged: a frame on `stack` for the
    /// duration of the call, a span in the trace log, and a duration record
    /// under `function` in the stats table.
    ///
    /// The frame and span are released on every exit path; the stats record
    /// is skipped if `f` panics.
    pub fn instrument<'a, F, R>(
        &'a self,
        stack: &StackHandle,
        function: impl Into<Cow<'a, str>>,
        module: impl Into<Cow<'a, str>>,
        line: u32,
        f: F,
    ) -> R
    where
        F: FnOnce() -> R,
    {
        let function = function.into();
        let module = module.into();

        let _frame = stack.enter(&*function, &*module, line, self.traces.now());
        let _span = self.traces.span(function.clone(), module, line);

        let start = Instant::now();
        let result = f();
        self.stats.record_duration(&function, start.elapsed());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracebacker_common::ManualClock;

    #[test]
    fn test_domain_from_config() {
        let config = InstrumentationConfig::new()
            .tracing(true)
            .stats_enabled(false)
            .window_size(2);
        let domain = Instrumentation::new(config);

        assert!(domain.traces().is_tracing());
        assert!(!domain.stats().is_enabled());
        assert!(domain.call_stacks().is_empty());
        assert_eq!(domain.config().window_size, 2);
    }

    #[test]
    fn test_domains_are_isolated() {
        let a = Instrumentation::default();
        let b = Instrumentation::default();

        a.stats().record_function_call("f", 1.0);
        assert!(b.stats().is_empty());

        a.traces().start();
        assert!(!b.traces().is_tracing());
    }

    #[test]
    fn test_instrument_engages_all_facilities() {
        let clock = Arc::new(ManualClock::new(10.0));
        let domain = Instrumentation::with_clock(
            InstrumentationConfig::new().tracing(true),
            clock.clone(),
        );
        let stack = domain.call_stacks().register().unwrap();

        let depth_inside = domain.instrument(&stack, "step", "pipeline.rs", 30, || {
            clock.advance(2.0);
            stack.get_depth()
        });

        assert_eq!(depth_inside, 1);
        assert_eq!(stack.get_depth(), 0);

        let traces = domain.traces().get_traces();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].function, "step");
        assert_eq!(traces[0].filename, "pipeline.rs");
        assert_eq!(traces[0].timestamp, 10.0);
        assert_eq!(traces[0].duration, 2.0);

        assert_eq!(domain.stats().get_stats_for("step").unwrap().call_count, 1);
    }

    #[test]
    fn test_moving_average_uses_configured_window() {
        let domain = Instrumentation::new(
            InstrumentationConfig::new()
                .window_size(2)
                .sample_function("f"),
        );
        for d in [1.0, 3.0, 5.0] {
            domain.stats().record_function_call("f", d);
        }
        assert_eq!(domain.moving_average("f"), vec![2.0, 4.0]);
    }

    #[test]
    fn test_global_is_shared() {
        assert!(std::ptr::eq(global(), global()));
    }
}
