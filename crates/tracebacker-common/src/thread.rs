//! Thread identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_THREAD_KEY: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: ThreadKey = ThreadKey::fresh();
}

/// Process-unique identity of an OS thread.
///
/// Keys are handed out lazily the first time a thread asks for its own
/// identity and are never reused within a process, so a key recorded in a
/// trace event stays meaningful after the thread exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadKey(u64);

impl ThreadKey {
    /// Identity of the calling thread.
    ///
    /// During thread-local teardown the cached key may already be gone; the
    /// caller then gets a fresh, never-reused key instead of a panic.
    pub fn current() -> Self {
        CURRENT.try_with(|key| *key).unwrap_or_else(|_| Self::fresh())
    }

    fn fresh() -> Self {
        Self(NEXT_THREAD_KEY.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw key value, e.g. one received back from a binding layer.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
