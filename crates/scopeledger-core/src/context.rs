//! Scope context: the explicit runtime state behind the scope API.
//!
//! A [`ScopeContext`] owns one cleanup ledger, one scope tracker, the runtime
//! mode and the error signal. Calling code threads it by `&mut` through
//! `open_scope` / `declare` / `close_scope` and finally consumes it with
//! [`ScopeContext::exit`] or [`ScopeContext::finish`].
//!
//! - Declarations push a continuation onto the ledger. Nothing re-enters the
//!   declaration site; the continuation already holds the cleanup logic and
//!   the bound value.
//! - `close_scope` replays the ledger tail down to the innermost bookmark, so
//!   an inner scope is fully released before its enclosing scope resumes.
//! - The exit drains whatever is still pending, then reads the error signal
//!   exactly once to pick the success or the error block.
//!
//! The context is `!Send`: each thread or independent flow builds its own.
//! Pending cleanups are lost only when the context is dropped without an
//! exit; a warning is logged. A cleanup that panics leaves the context in
//! Replaying mode with the remaining entries still pending. Declarations are
//! refused until a later close or exit replays them.
//!
//! A close never runs a cleanup whose value is borrowed through its
//! [`Declared`] handle. It stops there with [`LedgerError::BindingBorrowed`]
//! and leaves that entry and its scope in place. The exit cannot wait, so it
//! skips such an entry and reports it as a [`CleanupFailure`].

use std::convert::Infallible;
use std::fmt;
use std::mem;

use scopeledger_error::{LedgerError, Result};
use scopeledger_observability::{
    CapacityLimit, ExitPath, NoOpObserver, UnwindEvent, UnwindObserver,
};

use crate::binding::Declared;
use crate::config::LedgerConfig;
use crate::ledger::{CleanupEntry, CleanupLedger};
use crate::signal::ErrorSignal;
use crate::tracker::{Bookmark, ScopeTracker};

// ---------------------------------------------------------------------------
// RuntimeMode
// ---------------------------------------------------------------------------

/// Whether the context is accepting declarations or replaying cleanups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RuntimeMode {
    /// Forward execution: declarations register cleanups.
    #[default]
    Registering,
    /// A scope close or exit is popping and running cleanups.
    Replaying,
}

// ---------------------------------------------------------------------------
// Exit types
// ---------------------------------------------------------------------------

/// A fallible cleanup that reported failure during unwind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    pub name: &'static str,
    pub message: String,
}

impl fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cleanup '{}' failed: {}", self.name, self.message)
    }
}

/// Result of the top-level exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    /// Which block the dispatch selected.
    pub path: ExitPath,
    /// Cleanups replayed by the exit itself because scopes were left open.
    pub drained: usize,
    /// Failures collected from fallible cleanups, in replay order.
    pub failures: Vec<CleanupFailure>,
}

impl ExitReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.path.is_error()
    }
}

/// What one pass of the replay engine did.
#[derive(Debug, Default)]
struct Unwound {
    released: usize,
    /// Label of the tail entry the pass stopped at because its value is
    /// borrowed.
    blocked: Option<&'static str>,
}

// ---------------------------------------------------------------------------
// ScopeContext
// ---------------------------------------------------------------------------

/// Ledger, scope tracker, mode and error signal for one logical flow.
pub struct ScopeContext<O: UnwindObserver = NoOpObserver> {
    config: LedgerConfig,
    ledger: CleanupLedger,
    tracker: ScopeTracker,
    mode: RuntimeMode,
    signal: ErrorSignal,
    failures: Vec<CleanupFailure>,
    observer: O,
}

impl ScopeContext {
    /// Create a context with the default capacities and no observer.
    #[must_use]
    pub fn new() -> Self {
        Self::build(LedgerConfig::default(), NoOpObserver)
    }

    /// Create an unobserved context with explicit capacities.
    pub fn with_config(config: LedgerConfig) -> Result<Self> {
        Self::with_observer(config, NoOpObserver)
    }
}

impl Default for ScopeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: UnwindObserver> ScopeContext<O> {
    /// Create a context that reports every register/replay to `observer`.
    pub fn with_observer(config: LedgerConfig, observer: O) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, observer))
    }

    fn build(config: LedgerConfig, observer: O) -> Self {
        Self {
            config,
            ledger: CleanupLedger::new(config.ledger_capacity),
            tracker: ScopeTracker::new(config.max_scope_depth),
            mode: RuntimeMode::Registering,
            signal: ErrorSignal::new(),
            failures: Vec::new(),
            observer,
        }
    }

    // -- scope open ----------------------------------------------------------

    /// Open a nested scope, bookmarking the current ledger length.
    pub fn open_scope(&mut self) -> Result<Bookmark> {
        let bookmark = match self.tracker.push(self.ledger.len()) {
            Ok(bookmark) => bookmark,
            Err(err) => return Err(self.refuse(err)),
        };
        let depth = self.tracker.depth();
        tracing::debug!(depth, bookmark = bookmark.get(), "scope opened");
        self.observer.on_event(&UnwindEvent::ScopeOpened {
            depth,
            bookmark: bookmark.get(),
        });
        Ok(bookmark)
    }

    // -- declarations --------------------------------------------------------

    /// Bind `init()` to a handle and register `cleanup` to consume it when
    /// the innermost open scope closes.
    ///
    /// Capacity is checked before `init` runs: when the ledger is full the
    /// initializer is never evaluated and nothing is acquired.
    pub fn declare<T: 'static>(
        &mut self,
        name: &'static str,
        init: impl FnOnce() -> T,
        cleanup: impl FnOnce(T) + 'static,
    ) -> Result<Declared<T>> {
        self.declare_fallible(name, init, move |value| {
            cleanup(value);
            Ok::<(), Infallible>(())
        })
    }

    /// Like [`declare`](Self::declare), but the cleanup may fail.
    ///
    /// A failure does not interrupt the unwind: it raises the error signal
    /// and is collected for the exit report.
    pub fn declare_fallible<T, E>(
        &mut self,
        name: &'static str,
        init: impl FnOnce() -> T,
        cleanup: impl FnOnce(T) -> std::result::Result<(), E> + 'static,
    ) -> Result<Declared<T>>
    where
        T: 'static,
        E: fmt::Display,
    {
        self.check_declarable(name)?;
        let bound = Declared::new(name, init());
        let slot = bound.slot();
        let action = Box::new(move || {
            let taken = match slot.try_borrow_mut() {
                Ok(mut cell) => cell.take(),
                Err(_) => return Err(format!("binding '{name}' is borrowed")),
            };
            let Some(value) = taken else {
                return Err(format!("binding '{name}' was already released"));
            };
            cleanup(value).map_err(|e| e.to_string())
        });
        let guard = bound.slot();
        let entry =
            CleanupEntry::new(name, action).guarded_by(move || guard.try_borrow_mut().is_err());
        self.register(entry)?;
        Ok(bound)
    }

    /// Register a cleanup with no bound value.
    pub fn defer(&mut self, name: &'static str, action: impl FnOnce() + 'static) -> Result<()> {
        self.check_declarable(name)?;
        self.register(CleanupEntry::new(
            name,
            Box::new(move || {
                action();
                Ok(())
            }),
        ))?;
        Ok(())
    }

    fn check_declarable(&self, name: &'static str) -> Result<()> {
        if self.mode == RuntimeMode::Replaying {
            return Err(LedgerError::DeclareDuringReplay { name });
        }
        if self.tracker.depth() == 0 {
            return Err(LedgerError::NoOpenScope);
        }
        self.ledger.ensure_slot().map_err(|err| self.refuse(err))
    }

    fn register(&mut self, entry: CleanupEntry) -> Result<usize> {
        let name = entry.name();
        let slot = self.ledger.push(entry).map_err(|err| self.refuse(err))?;
        let depth = self.tracker.depth();
        tracing::trace!(name, slot, depth, "cleanup registered");
        self.observer
            .on_event(&UnwindEvent::CleanupRegistered { name, slot, depth });
        Ok(slot)
    }

    /// Report a capacity violation before handing the error back.
    fn refuse(&self, err: LedgerError) -> LedgerError {
        let limit = match &err {
            LedgerError::LedgerFull { capacity } => Some((CapacityLimit::Ledger, *capacity)),
            LedgerError::ScopeDepthExceeded { max } => Some((CapacityLimit::ScopeDepth, *max)),
            _ => None,
        };
        if let Some((limit, capacity)) = limit {
            tracing::warn!(
                ?limit,
                capacity,
                depth = self.tracker.depth(),
                pending = self.ledger.len(),
                hint = err.suggestion().unwrap_or_default(),
                "capacity violation"
            );
            self.observer
                .on_event(&UnwindEvent::CapacityViolation { limit, capacity });
        }
        err
    }

    // -- scope close ---------------------------------------------------------

    /// Close the innermost scope, replaying its cleanups newest first.
    ///
    /// Returns the number of cleanups replayed. If a cleanup's value is
    /// still borrowed, the close stops before it with
    /// [`LedgerError::BindingBorrowed`]; cleanups newer than it have run and
    /// the scope stays open.
    pub fn close_scope(&mut self) -> Result<usize> {
        self.close_innermost()
    }

    /// Run `body` inside a fresh scope. The scope (and any scope `body` left
    /// open) is closed whether or not `body` succeeded. An error from `body`
    /// takes precedence over one from the close.
    pub fn scope<R>(&mut self, body: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        self.open_scope()?;
        let depth = self.tracker.depth();
        let result = body(self);
        let mut closed = Ok(());
        while self.tracker.depth() >= depth {
            if let Err(err) = self.close_innermost() {
                closed = Err(err);
                break;
            }
        }
        let value = result?;
        closed.map(|()| value)
    }

    fn close_innermost(&mut self) -> Result<usize> {
        let bookmark = self.tracker.top().ok_or(LedgerError::NoOpenScope)?;
        let depth = self.tracker.depth();
        let unwound = self.unwind_to(bookmark.get());
        if let Some(name) = unwound.blocked {
            tracing::warn!(
                name,
                depth,
                released = unwound.released,
                "scope close stopped at a borrowed binding"
            );
            return Err(LedgerError::BindingBorrowed { name });
        }
        let released = unwound.released;
        self.tracker.pop();
        tracing::debug!(depth, released, "scope closed");
        self.observer
            .on_event(&UnwindEvent::ScopeClosed { depth, released });
        Ok(released)
    }

    /// Replay engine: pop and run entries until the ledger is back at
    /// `bookmark`, or until the tail entry's value is borrowed. Mode is
    /// Replaying for exactly the duration of the loop.
    fn unwind_to(&mut self, bookmark: usize) -> Unwound {
        self.mode = RuntimeMode::Replaying;
        let depth = self.tracker.depth();
        let mut unwound = Unwound::default();
        while self.ledger.len() > bookmark {
            if let Some(entry) = self.ledger.last().filter(|entry| entry.is_in_use()) {
                unwound.blocked = Some(entry.name());
                break;
            }
            let Some(entry) = self.ledger.pop() else {
                break;
            };
            let slot = self.ledger.len();
            let name = entry.name();
            let outcome = entry.run();
            unwound.released += 1;
            tracing::trace!(name, slot, depth, "cleanup replayed");
            self.observer
                .on_event(&UnwindEvent::CleanupReplayed { name, slot, depth });
            if let Err(message) = outcome {
                tracing::warn!(name, slot, %message, "cleanup failed");
                self.record_failure(name, slot, message);
            }
        }
        self.mode = RuntimeMode::Registering;
        unwound
    }

    fn record_failure(&mut self, name: &'static str, slot: usize, message: String) {
        self.observer.on_event(&UnwindEvent::CleanupFailed {
            name,
            slot,
            message: message.clone(),
        });
        self.signal.raise();
        self.failures.push(CleanupFailure { name, message });
    }

    /// Drop the tail entry without running it. Only the exit does this, when
    /// the entry's value is still borrowed and no later close can run it.
    fn abandon_last(&mut self, name: &'static str) {
        let slot = self.ledger.len().saturating_sub(1);
        drop(self.ledger.pop());
        tracing::warn!(name, slot, "cleanup skipped at exit: value still borrowed");
        self.record_failure(name, slot, "value still borrowed at exit".to_owned());
    }

    // -- error signal --------------------------------------------------------

    /// Mark this flow as failed. Cleanups still run; only the exit dispatch
    /// is affected.
    pub fn signal_error(&self) {
        tracing::debug!(depth = self.tracker.depth(), "error signaled");
        self.signal.raise();
    }

    /// Handle to the error signal, for cleanup closures to capture.
    #[must_use]
    pub fn error_signal(&self) -> ErrorSignal {
        self.signal.clone()
    }

    #[must_use]
    pub fn is_error_signaled(&self) -> bool {
        self.signal.is_raised()
    }

    // -- exit ----------------------------------------------------------------

    /// Drain every pending cleanup, then dispatch on the error signal.
    ///
    /// A cleanup whose value is still borrowed cannot run. It is skipped and
    /// reported as a [`CleanupFailure`], which selects the error path.
    pub fn finish(mut self) -> ExitReport {
        let pending = self.ledger.len();
        let mut skipped = 0;
        loop {
            match self.close_innermost() {
                Ok(_) => {}
                Err(LedgerError::BindingBorrowed { name }) => {
                    self.abandon_last(name);
                    skipped += 1;
                }
                Err(_) => break,
            }
        }
        while !self.ledger.is_empty() {
            if let Some(name) = self.unwind_to(0).blocked {
                self.abandon_last(name);
                skipped += 1;
            }
        }
        let drained = pending - skipped;

        let path = if self.signal.is_raised() {
            ExitPath::Error
        } else {
            ExitPath::Success
        };
        tracing::debug!(?path, drained, failures = self.failures.len(), "exit dispatched");
        self.observer
            .on_event(&UnwindEvent::ExitDispatched { path, drained });

        ExitReport {
            path,
            drained,
            failures: mem::take(&mut self.failures),
        }
    }

    /// Drain every pending cleanup, then run exactly one of the two blocks.
    ///
    /// `on_error` receives the failures collected from fallible cleanups; it
    /// is empty when the error came from [`signal_error`](Self::signal_error).
    pub fn exit<R>(
        self,
        on_success: impl FnOnce() -> R,
        on_error: impl FnOnce(&[CleanupFailure]) -> R,
    ) -> R {
        let report = self.finish();
        match report.path {
            ExitPath::Success => on_success(),
            ExitPath::Error => on_error(&report.failures),
        }
    }

    // -- inspection ----------------------------------------------------------

    #[must_use]
    pub fn mode(&self) -> RuntimeMode {
        self.mode
    }

    /// Number of open scopes.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.tracker.depth()
    }

    /// Number of cleanups waiting in the ledger.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.ledger.len()
    }

    /// Labels of pending cleanups, oldest first.
    pub fn pending_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.ledger.pending_names()
    }

    #[must_use]
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    #[must_use]
    pub fn observer(&self) -> &O {
        &self.observer
    }
}

impl<O: UnwindObserver> Drop for ScopeContext<O> {
    fn drop(&mut self) {
        if !self.ledger.is_empty() {
            tracing::warn!(
                pending = self.ledger.len(),
                depth = self.tracker.depth(),
                "scope context dropped with pending cleanups; they will not run"
            );
        }
    }
}

impl<O: UnwindObserver> fmt::Debug for ScopeContext<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeContext")
            .field("config", &self.config)
            .field("mode", &self.mode)
            .field("depth", &self.tracker.depth())
            .field("pending", &self.ledger.len())
            .field("error_signaled", &self.signal.is_raised())
            .finish_non_exhaustive()
    }
}
