//! Per-thread call-stack tracking with a cross-thread lookup registry.
//!
//! A thread joins by calling [`CallStackRegistry::register`], which returns a
//! [`StackHandle`]. The handle is the only way to push or pop frames and it
//! cannot leave the thread that created it. Dropping the handle removes the
//! thread from the registry.
//!
//! Other threads look a stack up by [`ThreadKey`] and get a [`RemoteStack`],
//! which can only read.
//!
//! # Consistency
//!
//! Each stack sits behind its own `parking_lot::Mutex`. The owning thread is
//! the only writer, so on the push/pop path the lock is always uncontended.
//! A remote snapshot takes the same lock for the length of a `Vec` clone,
//! which makes every snapshot an exact point-in-time copy.
//!
//! # Example
//!
//! ```rust,ignore
//! use tracebacker::CallStackRegistry;
//!
//! let registry = CallStackRegistry::new();
//! let stack = registry.register()?;
//!
//! stack.push_frame("handle_request", "server.rs", 42, 0.0);
//! assert_eq!(stack.get_depth(), 1);
//!
//! let frame = stack.pop_frame();
//! assert_eq!(frame.function, "handle_request");
//! ```

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracebacker_common::{Result, ThreadKey, TracebackerError};
use tracing::debug;

// ============================================================================
// Frames
// ============================================================================

/// One recorded call context on a thread's stack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallFrame {
    pub function: String,
    pub module: String,
    pub line: u32,
    /// Entry time in seconds, as supplied by the caller
    pub enter_time: f64,
}

impl CallFrame {
    pub fn new(
        function: impl Into<String>,
        module: impl Into<String>,
        line: u32,
        enter_time: f64,
    ) -> Self {
        Self {
            function: function.into(),
            module: module.into(),
            line,
            enter_time,
        }
    }

    /// The frame returned when popping an empty stack.
    pub fn sentinel() -> Self {
        Self {
            function: String::new(),
            module: String::new(),
            line: 0,
            enter_time: 0.0,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.function.is_empty() && self.module.is_empty() && self.line == 0 && self.enter_time == 0.0
    }

    /// Location part of the frame, without the entry time.
    pub fn location(&self) -> FrameLocation {
        FrameLocation {
            function: self.function.clone(),
            module: self.module.clone(),
            line: self.line,
        }
    }
}

/// Function, module and line of a frame, as returned by stack snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FrameLocation {
    pub function: String,
    pub module: String,
    pub line: u32,
}

// ============================================================================
// Thread Stack
// ============================================================================

#[derive(Debug)]
struct ThreadStack {
    thread: ThreadKey,
    frames: Mutex<Vec<CallFrame>>,
    live: AtomicBool,
}

impl ThreadStack {
    fn new(thread: ThreadKey) -> Self {
        Self {
            thread,
            frames: Mutex::new(Vec::new()),
            live: AtomicBool::new(true),
        }
    }

    fn depth(&self) -> usize {
        self.frames.lock().len()
    }

    /// Top of stack first.
    fn locations(&self) -> Vec<FrameLocation> {
        self.frames.lock().iter().rev().map(CallFrame::location).collect()
    }

    /// Top of stack first.
    fn frames(&self) -> Vec<CallFrame> {
        self.frames.lock().iter().rev().cloned().collect()
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Debug, Default)]
struct RegistryInner {
    stacks: RwLock<HashMap<ThreadKey, Arc<ThreadStack>>>,
}

/// Maps thread identities to their call stacks.
///
/// Cloning is cheap and every clone refers to the same registry.
#[derive(Debug, Clone, Default)]
pub struct CallStackRegistry {
    inner: Arc<RegistryInner>,
}

impl CallStackRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the calling thread and hand back its stack.
    ///
    /// Fails with [`TracebackerError::AlreadyRegistered`] if this thread
    /// still holds a live handle from this registry.
    pub fn register(&self) -> Result<StackHandle> {
        let thread = ThreadKey::current();
        let stack = Arc::new(ThreadStack::new(thread));

        {
            let mut stacks = self.inner.stacks.write();
            if stacks.contains_key(&thread) {
                return Err(TracebackerError::AlreadyRegistered(thread));
            }
            stacks.insert(thread, Arc::clone(&stack));
        }

        debug!(thread = %thread, "registered call stack");

        Ok(StackHandle {
            registry: Arc::downgrade(&self.inner),
            stack,
            _not_send: PhantomData,
        })
    }

    /// Look up another thread's stack.
    ///
    /// Returns `None` if the thread never registered or has dropped its
    /// handle since.
    pub fn get_registered_stack(&self, thread: ThreadKey) -> Option<RemoteStack> {
        self.inner
            .stacks
            .read()
            .get(&thread)
            .map(|stack| RemoteStack {
                stack: Arc::clone(stack),
            })
    }

    /// Look up the calling thread's own stack.
    pub fn current_thread_stack(&self) -> Option<RemoteStack> {
        self.get_registered_stack(ThreadKey::current())
    }

    /// Identities of all registered threads, in ascending key order.
    pub fn registered_threads(&self) -> Vec<ThreadKey> {
        let mut threads: Vec<ThreadKey> = self.inner.stacks.read().keys().copied().collect();
        threads.sort_unstable();
        threads
    }

    pub fn len(&self) -> usize {
        self.inner.stacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Stack Handle
// ============================================================================

/// The calling thread's own call stack.
///
/// Not `Send`: frames are only ever pushed and popped by the thread that
/// registered. Dropping the handle deregisters the thread.
#[derive(Debug)]
pub struct StackHandle {
    registry: Weak<RegistryInner>,
    stack: Arc<ThreadStack>,
    _not_send: PhantomData<*const ()>,
}

impl StackHandle {
    /// Identity of the owning thread
    pub fn thread(&self) -> ThreadKey {
        self.stack.thread
    }

    /// Push a frame. No depth limit is enforced.
    pub fn push_frame(
        &self,
        function: impl Into<String>,
        module: impl Into<String>,
        line: u32,
        time: f64,
    ) {
        self.stack
            .frames
            .lock()
            .push(CallFrame::new(function, module, line, time));
    }

    /// Pop the top frame, or return [`CallFrame::sentinel`] if the stack is
    /// empty.
    pub fn pop_frame(&self) -> CallFrame {
        self.stack
            .frames
            .lock()
            .pop()
            .unwrap_or_else(CallFrame::sentinel)
    }

    /// Current number of frames
    pub fn get_depth(&self) -> usize {
        self.stack.depth()
    }

    /// Snapshot of the stack, most recently pushed frame first.
    pub fn get_stack(&self) -> Vec<FrameLocation> {
        self.stack.locations()
    }

    /// Snapshot including entry times, most recently pushed frame first.
    pub fn frames(&self) -> Vec<CallFrame> {
        self.stack.frames()
    }

    /// Push a frame and pop it again when the returned guard drops.
    pub fn enter(
        &self,
        function: impl Into<String>,
        module: impl Into<String>,
        line: u32,
        time: f64,
    ) -> FrameGuard<'_> {
        self.push_frame(function, module, line, time);
        FrameGuard { handle: self }
    }

    /// Read-only view of this stack that may be handed to other threads.
    pub fn remote(&self) -> RemoteStack {
        RemoteStack {
            stack: Arc::clone(&self.stack),
        }
    }
}

impl Drop for StackHandle {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            let mut stacks = inner.stacks.write();
            if matches!(stacks.get(&self.stack.thread), Some(s) if Arc::ptr_eq(s, &self.stack)) {
                stacks.remove(&self.stack.thread);
            }
        }
        self.stack.live.store(false, Ordering::Release);

        debug!(thread = %self.stack.thread, "deregistered call stack");
    }
}

/// Pops the frame pushed by [`StackHandle::enter`] on drop.
#[must_use = "the frame is popped as soon as the guard is dropped"]
#[derive(Debug)]
pub struct FrameGuard<'a> {
    handle: &'a StackHandle,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.handle.pop_frame();
    }
}

// ============================================================================
// Remote Stack
// ============================================================================

/// Read-only view of a registered thread's stack.
#[derive(Debug, Clone)]
pub struct RemoteStack {
    stack: Arc<ThreadStack>,
}

impl RemoteStack {
    pub fn thread(&self) -> ThreadKey {
        self.stack.thread
    }

    /// False once the owning thread has dropped its handle. A dead stack
    /// keeps whatever frames it had at that moment.
    pub fn is_live(&self) -> bool {
        self.stack.live.load(Ordering::Acquire)
    }

    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    /// Point-in-time copy, most recently pushed frame first.
    pub fn snapshot(&self) -> Vec<FrameLocation> {
        self.stack.locations()
    }

    /// Point-in-time copy including entry times.
    pub fn frames(&self) -> Vec<CallFrame> {
        self.stack.frames()
    }
}

// ============================================================================
// Tests
// ============================================================================
