//! Per-function performance statistics.
//!
//! [`StatsTable`] keeps running aggregates (count, total, min, max) for every
//! name it has seen, plus an optional bounded window of recent raw durations
//! from which percentiles and moving averages are derived on demand.
//!
//! The whole table sits behind a single lock. Recording is one hash lookup
//! and a handful of float operations, so contention stays low relative to
//! the work being measured.
//!
//! # Example
//!
//! ```rust,ignore
//! use tracebacker::StatsTable;
//!
//! let stats = StatsTable::new();
//! stats.enable_sampling("decode", 100);
//!
//! for d in [0.010, 0.012, 0.011] {
//!     stats.record_function_call("decode", d);
//! }
//!
//! let snapshot = &stats.get_stats()["decode"];
//! println!("avg={:.4}s p50={:?}", snapshot.avg_time, snapshot.p50());
//! ```

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracebacker_common::Result;
use tracing::debug;

use crate::config::InstrumentationConfig;

/// Sample capacity used when none is given
pub const DEFAULT_MAX_SAMPLES: usize = 100;

/// Moving-average window used when none is given
pub const DEFAULT_WINDOW_SIZE: usize = 5;

// ============================================================================
// Percentiles
// ============================================================================

/// Nearest-rank index into `n` sorted samples: `floor(n * percent / 100)`,
/// clamped to the last element.
///
/// The estimator is biased upwards for small `n` (with two samples every
/// percentile above p50 is the maximum). That bias is part of the reported
/// numbers and is kept as is.
pub fn percentile_index(n: usize, percent: usize) -> usize {
    (n * percent / 100).min(n.saturating_sub(1))
}

/// Nearest-rank percentile of an ascending slice.
pub fn nearest_rank(sorted: &[f64], percent: usize) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    Some(sorted[percentile_index(sorted.len(), percent)])
}

/// p50/p90/p95/p99 of a sample window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl Percentiles {
    /// Sort a copy of `samples` and pick the four ranks.
    ///
    /// Needs at least two samples.
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a f64>) -> Option<Self> {
        let mut sorted: Vec<f64> = samples.into_iter().copied().collect();
        if sorted.len() < 2 {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        Some(Self {
            p50: nearest_rank(&sorted, 50)?,
            p90: nearest_rank(&sorted, 90)?,
            p95: nearest_rank(&sorted, 95)?,
            p99: nearest_rank(&sorted, 99)?,
        })
    }
}

/// Mean of every contiguous window of `window` samples, in sample order.
///
/// Empty when `window` is zero or larger than the number of samples.
pub fn moving_average(samples: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || samples.len() < window {
        return Vec::new();
    }
    samples
        .windows(window)
        .map(|w| w.iter().sum::<f64>() / window as f64)
        .collect()
}

// ============================================================================
// Function Stats
// ============================================================================

/// Running aggregates for one name.
#[derive(Debug, Clone)]
struct FunctionStats {
    name: String,
    call_count: u64,
    total_time: f64,
    min_time: f64,
    max_time: f64,
    sampling_enabled: bool,
    max_samples: usize,
    samples: VecDeque<f64>,
}

impl FunctionStats {
    fn new(name: &str, max_samples: usize) -> Self {
        Self {
            name: name.to_string(),
            call_count: 0,
            total_time: 0.0,
            min_time: f64::INFINITY,
            max_time: 0.0,
            sampling_enabled: false,
            max_samples,
            samples: VecDeque::new(),
        }
    }

    fn record(&mut self, duration: f64) {
        self.call_count += 1;
        self.total_time += duration;
        self.min_time = self.min_time.min(duration);
        self.max_time = self.max_time.max(duration);

        if self.sampling_enabled {
            self.samples.push_back(duration);
            self.trim_samples();
        }
    }

    fn set_sampling(&mut self, max_samples: usize) {
        self.sampling_enabled = true;
        self.max_samples = max_samples;
        self.trim_samples();
        // Larger bounds grow on demand
        let upfront = max_samples.min(DEFAULT_MAX_SAMPLES);
        self.samples
            .reserve(upfront.saturating_sub(self.samples.len()));
    }

    fn trim_samples(&mut self) {
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    fn avg_time(&self) -> f64 {
        if self.call_count == 0 {
            0.0
        } else {
            self.total_time / self.call_count as f64
        }
    }

    fn snapshot(&self) -> FunctionStatsSnapshot {
        let (samples, percentiles) = if self.sampling_enabled && !self.samples.is_empty() {
            (
                Some(self.samples.iter().copied().collect()),
                Percentiles::from_samples(&self.samples),
            )
        } else {
            (None, None)
        };

        FunctionStatsSnapshot {
            name: self.name.clone(),
            call_count: self.call_count,
            total_time: self.total_time,
            min_time: if self.call_count == 0 { 0.0 } else { self.min_time },
            max_time: self.max_time,
            avg_time: self.avg_time(),
            sampling_enabled: self.sampling_enabled,
            max_samples: self.max_samples,
            samples,
            percentiles,
        }
    }
}

/// Point-in-time copy of one name's statistics.
///
/// Serializes to the flat key-value shape
/// `{name, call_count, total_time, min_time, max_time, avg_time}`, plus
/// `samples` when sampling is on and has data, plus `p50`/`p90`/`p95`/`p99`
/// once there are at least two samples. Absent parts are omitted rather than
/// written as null.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionStatsSnapshot {
    pub name: String,
    pub call_count: u64,
    pub total_time: f64,
    /// 0.0 when nothing has been recorded
    pub min_time: f64,
    pub max_time: f64,
    pub avg_time: f64,
    #[serde(skip)]
    pub sampling_enabled: bool,
    #[serde(skip)]
    pub max_samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<f64>>,
    #[serde(flatten)]
    pub percentiles: Option<Percentiles>,
}

impl FunctionStatsSnapshot {
    pub fn p50(&self) -> Option<f64> {
        self.percentiles.map(|p| p.p50)
    }

    pub fn p90(&self) -> Option<f64> {
        self.percentiles.map(|p| p.p90)
    }

    pub fn p95(&self) -> Option<f64> {
        self.percentiles.map(|p| p.p95)
    }

    pub fn p99(&self) -> Option<f64> {
        self.percentiles.map(|p| p.p99)
    }

    /// Generic key-value form for a binding layer.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

// ============================================================================
// Stats Table
// ============================================================================

/// Shared, name-keyed table of running per-function aggregates.
#[derive(Debug)]
pub struct StatsTable {
    enabled: AtomicBool,
    default_max_samples: usize,
    entries: Mutex<HashMap<String, FunctionStats>>,
}

impl Default for StatsTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsTable {
    /// Create an enabled, empty table
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            default_max_samples: DEFAULT_MAX_SAMPLES,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Create a table from configuration: initial gate state, default sample
    /// capacity and names sampled from the start.
    pub fn with_config(config: &InstrumentationConfig) -> Self {
        let table = Self {
            enabled: AtomicBool::new(config.stats_enabled),
            default_max_samples: config.max_samples,
            entries: Mutex::new(HashMap::new()),
        };
        for name in &config.sampled_functions {
            table.enable_sampling(name, config.max_samples);
        }
        table
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
        debug!("stats recording enabled");
    }

    /// Stop recording. Existing stats are kept.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        debug!("stats recording disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Record one call of `name` taking `duration` seconds.
    ///
    /// No-op while the table is disabled.
    pub fn record_function_call(&self, name: &str, duration: f64) {
        if !self.is_enabled() {
            return;
        }

        let mut entries = self.entries.lock();
        match entries.get_mut(name) {
            Some(stats) => stats.record(duration),
            None => {
                let mut stats = FunctionStats::new(name, self.default_max_samples);
                stats.record(duration);
                entries.insert(name.to_string(), stats);
            }
        }
    }

    /// [`record_function_call`](Self::record_function_call) with a
    /// [`Duration`].
    pub fn record_duration(&self, name: &str, duration: Duration) {
        self.record_function_call(name, duration.as_secs_f64());
    }

    /// Run `f` and record how long it took under `name`.
    ///
    /// Nothing is recorded if `f` panics.
    pub fn profile<F, R>(&self, name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        self.record_duration(name, start.elapsed());
        result
    }

    /// Start retaining up to `max_samples` recent durations for `name`.
    ///
    /// Creates the entry if needed. Re-enabling resets the capacity and
    /// drops the oldest samples if the window shrank.
    pub fn enable_sampling(&self, name: &str, max_samples: usize) {
        let mut entries = self.entries.lock();
        entries
            .entry(name.to_string())
            .or_insert_with(|| FunctionStats::new(name, max_samples))
            .set_sampling(max_samples);

        debug!(function = name, max_samples, "sampling enabled");
    }

    /// [`enable_sampling`](Self::enable_sampling) with the table's default
    /// capacity.
    pub fn enable_sampling_default(&self, name: &str) {
        self.enable_sampling(name, self.default_max_samples);
    }

    /// Stop retaining samples for `name`. Collected samples are kept.
    pub fn disable_sampling(&self, name: &str) {
        if let Some(stats) = self.entries.lock().get_mut(name) {
            stats.sampling_enabled = false;
            debug!(function = name, "sampling disabled");
        }
    }

    /// Snapshot of every entry, keyed by name.
    pub fn get_stats(&self) -> BTreeMap<String, FunctionStatsSnapshot> {
        self.entries
            .lock()
            .iter()
            .map(|(name, stats)| (name.clone(), stats.snapshot()))
            .collect()
    }

    /// Snapshot of a single entry
    pub fn get_stats_for(&self, name: &str) -> Option<FunctionStatsSnapshot> {
        self.entries.lock().get(name).map(FunctionStats::snapshot)
    }

    /// Known names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry.
    pub fn clear_stats(&self) {
        self.entries.lock().clear();
        debug!("stats cleared");
    }

    /// Remove one entry. Unknown names are ignored.
    pub fn clear_stats_for(&self, name: &str) {
        if self.entries.lock().remove(name).is_some() {
            debug!(function = name, "stats cleared");
        }
    }

    /// Sliding-window mean over the retained samples of `name`.
    ///
    /// Empty if the name is unknown or has fewer samples than
    /// `window_size`. Works on frozen samples too.
    pub fn calculate_moving_average(&self, name: &str, window_size: usize) -> Vec<f64> {
        let mut entries = self.entries.lock();
        match entries.get_mut(name) {
            Some(stats) => moving_average(stats.samples.make_contiguous(), window_size),
            None => Vec::new(),
        }
    }

    /// Every snapshot as a pretty-printed JSON object keyed by name.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.get_stats())?)
    }
}

// ============================================================================
// Tests
// ============================================================================
