//! Common utilities for tracebacker
//!
//! This crate provides the types shared by every tracebacker facility:
//! the error type, thread identity, and timestamp sources.

pub mod clock;
pub mod error;
pub mod thread;

pub use clock::{Clock, ManualClock, MonotonicClock, SharedClock};
pub use error::{Result, TracebackerError};
pub use thread::ThreadKey;
