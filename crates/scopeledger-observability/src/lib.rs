//! Unwind tracing and metrics for the scopeledger runtime.
//!
//! Provides the event type emitted by a scope context as it registers and
//! replays cleanups, an opt-in observer trait, and two ready-made sinks: a
//! bounded event log and a set of aggregated counters.
//!
//! # Design Principles
//!
//! - **Zero-cost when unused:** A context is generic over its
//!   [`UnwindObserver`]. The default [`NoOpObserver`] is inlined away.
//! - **Non-blocking:** Observers are called from inside the replay loop and
//!   MUST NOT call back into the scope context that emitted the event.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

// ---------------------------------------------------------------------------
// UnwindEvent: the core event type
// ---------------------------------------------------------------------------

/// Which top-level exit block ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExitPath {
    /// No error was signaled; the success block ran.
    Success,
    /// The error signal was raised; the error block ran.
    Error,
}

impl ExitPath {
    /// Whether this is the error path.
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::Error)
    }
}

/// Which fixed bound a capacity violation hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CapacityLimit {
    /// The cleanup ledger (C).
    Ledger,
    /// The scope nesting stack (D).
    ScopeDepth,
}

/// A single event emitted by a scope context.
///
/// `slot` is the ledger index the cleanup occupied; `depth` is the number of
/// open scopes at the time of the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UnwindEvent {
    /// A scope was opened.
    ScopeOpened {
        /// Nesting depth after the open.
        depth: usize,
        /// Ledger length recorded as the scope's bookmark.
        bookmark: usize,
    },

    /// A cleanup was pushed onto the ledger.
    CleanupRegistered {
        name: &'static str,
        slot: usize,
        depth: usize,
    },

    /// A cleanup was popped and executed.
    CleanupReplayed {
        name: &'static str,
        slot: usize,
        depth: usize,
    },

    /// A fallible cleanup reported failure. The unwind continued.
    CleanupFailed {
        name: &'static str,
        slot: usize,
        message: String,
    },

    /// A scope finished unwinding down to its bookmark.
    ScopeClosed {
        /// Nesting depth before the close.
        depth: usize,
        /// Number of cleanups replayed by this close.
        released: usize,
    },

    /// A declaration or scope open was refused.
    CapacityViolation {
        limit: CapacityLimit,
        capacity: usize,
    },

    /// The top-level exit drained the ledger and dispatched.
    ExitDispatched {
        path: ExitPath,
        /// Cleanups replayed by the exit itself (scopes left open).
        drained: usize,
    },
}

impl UnwindEvent {
    /// Whether this event reports something going wrong.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        match self {
            Self::CleanupFailed { .. } | Self::CapacityViolation { .. } => true,
            Self::ExitDispatched { path, .. } => path.is_error(),
            _ => false,
        }
    }

    /// Cleanup label carried by the event, if any.
    #[must_use]
    pub fn name(&self) -> Option<&'static str> {
        match self {
            Self::CleanupRegistered { name, .. }
            | Self::CleanupReplayed { name, .. }
            | Self::CleanupFailed { name, .. } => Some(*name),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// UnwindObserver: trait for zero-cost opt-in observation
// ---------------------------------------------------------------------------

/// Observer trait for unwind events.
pub trait UnwindObserver {
    /// Called once per event, in emission order.
    fn on_event(&self, event: &UnwindEvent);
}

/// No-op observer. Default when observability is not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl UnwindObserver for NoOpObserver {
    #[inline(always)]
    fn on_event(&self, _event: &UnwindEvent) {}
}

impl<O: UnwindObserver + ?Sized> UnwindObserver for &O {
    fn on_event(&self, event: &UnwindEvent) {
        (**self).on_event(event);
    }
}

// ---------------------------------------------------------------------------
// UnwindRingBuffer: bounded event storage
// ---------------------------------------------------------------------------

/// Bounded log of the most recent unwind events.
///
/// Once `capacity` events are held, each push evicts the oldest one.
pub struct UnwindRingBuffer {
    events: Mutex<VecDeque<UnwindEvent>>,
    capacity: usize,
}

impl UnwindRingBuffer {
    /// Create an empty log keeping at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append an event, evicting the oldest when full.
    pub fn push(&self, event: UnwindEvent) {
        if self.capacity == 0 {
            return;
        }
        let mut events = self.events.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Return all stored events in emission order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<UnwindEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Names of replayed cleanups, in replay order.
    #[must_use]
    pub fn replay_order(&self) -> Vec<&'static str> {
        self.snapshot()
            .iter()
            .filter_map(|event| match event {
                UnwindEvent::CleanupReplayed { name, .. } => Some(*name),
                _ => None,
            })
            .collect()
    }

    /// Clear all stored events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Current number of stored events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ---------------------------------------------------------------------------
// UnwindMetrics: aggregated statistics
// ---------------------------------------------------------------------------

/// Aggregated unwind statistics.
///
/// All counters are atomic so a shared metrics instance can be read while a
/// context is still emitting into it.
pub struct UnwindMetrics {
    pub scopes_opened: AtomicU64,
    pub scopes_closed: AtomicU64,
    pub cleanups_registered: AtomicU64,
    pub cleanups_replayed: AtomicU64,
    pub cleanups_failed: AtomicU64,
    pub capacity_violations: AtomicU64,
    pub success_exits: AtomicU64,
    pub error_exits: AtomicU64,
    /// Deepest nesting observed.
    pub peak_depth: AtomicU64,
    /// Longest ledger observed.
    pub peak_pending: AtomicU64,
    /// Replay counts per cleanup label.
    replays_by_name: Mutex<HashMap<&'static str, u64>>,
    created_at: Instant,
}

impl UnwindMetrics {
    /// Create a new metrics instance with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scopes_opened: AtomicU64::new(0),
            scopes_closed: AtomicU64::new(0),
            cleanups_registered: AtomicU64::new(0),
            cleanups_replayed: AtomicU64::new(0),
            cleanups_failed: AtomicU64::new(0),
            capacity_violations: AtomicU64::new(0),
            success_exits: AtomicU64::new(0),
            error_exits: AtomicU64::new(0),
            peak_depth: AtomicU64::new(0),
            peak_pending: AtomicU64::new(0),
            replays_by_name: Mutex::new(HashMap::new()),
            created_at: Instant::now(),
        }
    }

    /// Record an event, updating all relevant counters.
    pub fn record(&self, event: &UnwindEvent) {
        match event {
            UnwindEvent::ScopeOpened { depth, .. } => {
                self.scopes_opened.fetch_add(1, Ordering::Relaxed);
                self.peak_depth.fetch_max(widen(*depth), Ordering::Relaxed);
            }
            UnwindEvent::CleanupRegistered { slot, .. } => {
                self.cleanups_registered.fetch_add(1, Ordering::Relaxed);
                self.peak_pending
                    .fetch_max(widen(*slot).saturating_add(1), Ordering::Relaxed);
            }
            UnwindEvent::CleanupReplayed { name, .. } => {
                self.cleanups_replayed.fetch_add(1, Ordering::Relaxed);
                *self.replays_by_name.lock().entry(*name).or_insert(0) += 1;
            }
            UnwindEvent::CleanupFailed { .. } => {
                self.cleanups_failed.fetch_add(1, Ordering::Relaxed);
            }
            UnwindEvent::ScopeClosed { .. } => {
                self.scopes_closed.fetch_add(1, Ordering::Relaxed);
            }
            UnwindEvent::CapacityViolation { .. } => {
                self.capacity_violations.fetch_add(1, Ordering::Relaxed);
            }
            UnwindEvent::ExitDispatched { path, .. } => match path {
                ExitPath::Success => {
                    self.success_exits.fetch_add(1, Ordering::Relaxed);
                }
                ExitPath::Error => {
                    self.error_exits.fetch_add(1, Ordering::Relaxed);
                }
            },
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        for counter in [
            &self.scopes_opened,
            &self.scopes_closed,
            &self.cleanups_registered,
            &self.cleanups_replayed,
            &self.cleanups_failed,
            &self.capacity_violations,
            &self.success_exits,
            &self.error_exits,
            &self.peak_depth,
            &self.peak_pending,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.replays_by_name.lock().clear();
    }

    /// Elapsed time since metrics creation.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Top N cleanup labels by replay count, ties broken by name.
    #[must_use]
    pub fn busiest_names(&self, n: usize) -> Vec<(&'static str, u64)> {
        let mut entries: Vec<(&'static str, u64)> = {
            let map = self.replays_by_name.lock();
            map.iter().map(|(&k, &v)| (k, v)).collect()
        };
        entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        entries.truncate(n);
        entries
    }

    /// Snapshot all metrics as a serializable summary.
    #[must_use]
    pub fn snapshot(&self) -> UnwindMetricsSnapshot {
        UnwindMetricsSnapshot {
            scopes_opened: self.scopes_opened.load(Ordering::Relaxed),
            scopes_closed: self.scopes_closed.load(Ordering::Relaxed),
            cleanups_registered: self.cleanups_registered.load(Ordering::Relaxed),
            cleanups_replayed: self.cleanups_replayed.load(Ordering::Relaxed),
            cleanups_failed: self.cleanups_failed.load(Ordering::Relaxed),
            capacity_violations: self.capacity_violations.load(Ordering::Relaxed),
            success_exits: self.success_exits.load(Ordering::Relaxed),
            error_exits: self.error_exits.load(Ordering::Relaxed),
            peak_depth: self.peak_depth.load(Ordering::Relaxed),
            peak_pending: self.peak_pending.load(Ordering::Relaxed),
            elapsed_secs: self.created_at.elapsed().as_secs_f64(),
            busiest_names: self.busiest_names(10),
        }
    }
}

impl Default for UnwindMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn widen(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

/// Serializable snapshot of unwind metrics.
#[derive(Debug, Clone, Serialize)]
pub struct UnwindMetricsSnapshot {
    pub scopes_opened: u64,
    pub scopes_closed: u64,
    pub cleanups_registered: u64,
    pub cleanups_replayed: u64,
    pub cleanups_failed: u64,
    pub capacity_violations: u64,
    pub success_exits: u64,
    pub error_exits: u64,
    pub peak_depth: u64,
    pub peak_pending: u64,
    pub elapsed_secs: f64,
    pub busiest_names: Vec<(&'static str, u64)>,
}

// ---------------------------------------------------------------------------
// MetricsObserver: observer that records to both metrics and ring buffer
// ---------------------------------------------------------------------------

/// Combined observer that records events to both an [`UnwindMetrics`]
/// aggregator and an [`UnwindRingBuffer`] for detailed logging.
pub struct MetricsObserver {
    metrics: UnwindMetrics,
    log: UnwindRingBuffer,
}

impl MetricsObserver {
    /// Create a new metrics observer with the given ring buffer capacity.
    #[must_use]
    pub fn new(log_capacity: usize) -> Self {
        Self {
            metrics: UnwindMetrics::new(),
            log: UnwindRingBuffer::new(log_capacity),
        }
    }

    /// Access the aggregated metrics.
    #[must_use]
    pub fn metrics(&self) -> &UnwindMetrics {
        &self.metrics
    }

    /// Access the event log ring buffer.
    #[must_use]
    pub fn log(&self) -> &UnwindRingBuffer {
        &self.log
    }

    /// Reset both metrics and log.
    pub fn reset(&self) {
        self.metrics.reset();
        self.log.clear();
    }
}

impl UnwindObserver for MetricsObserver {
    fn on_event(&self, event: &UnwindEvent) {
        self.metrics.record(event);
        self.log.push(event.clone());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
