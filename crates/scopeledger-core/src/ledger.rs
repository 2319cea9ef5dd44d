//! Cleanup ledger: the bounded LIFO of pending cleanup continuations.

use std::fmt;

use scopeledger_error::{LedgerError, Result};

/// Outcome of running one cleanup. `Err` carries a rendered failure message
/// from a fallible cleanup.
pub(crate) type CleanupOutcome = std::result::Result<(), String>;

/// A pending cleanup: the label it was declared under plus the continuation
/// that releases the resource. The continuation owns everything it needs.
///
/// An entry may carry an in-use check. While it reports `true` the entry
/// must not be run, because its bound value is borrowed by the caller.
pub struct CleanupEntry {
    name: &'static str,
    action: Box<dyn FnOnce() -> CleanupOutcome>,
    in_use: Option<Box<dyn Fn() -> bool>>,
}

impl CleanupEntry {
    pub(crate) fn new(name: &'static str, action: Box<dyn FnOnce() -> CleanupOutcome>) -> Self {
        Self {
            name,
            action,
            in_use: None,
        }
    }

    /// Attach the check consulted before the entry is replayed.
    pub(crate) fn guarded_by(mut self, in_use: impl Fn() -> bool + 'static) -> Self {
        self.in_use = Some(Box::new(in_use));
        self
    }

    /// Whether the entry's bound value is currently borrowed.
    #[must_use]
    pub fn is_in_use(&self) -> bool {
        self.in_use.as_ref().is_some_and(|check| check())
    }

    /// Label given at the declaration site.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Consume the entry and run its cleanup.
    pub(crate) fn run(self) -> CleanupOutcome {
        (self.action)()
    }
}

impl fmt::Debug for CleanupEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupEntry")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Ordered, fixed-capacity record of pending cleanups.
///
/// Entries are appended at the tail and popped from the tail only. The
/// backing storage is reserved once, so the ledger never reallocates.
#[derive(Debug)]
pub struct CleanupLedger {
    entries: Vec<CleanupEntry>,
    capacity: usize,
}

impl CleanupLedger {
    /// Create an empty ledger holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Fail with [`LedgerError::LedgerFull`] if no slot is free.
    pub fn ensure_slot(&self) -> Result<()> {
        if self.is_full() {
            return Err(LedgerError::LedgerFull {
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Append an entry, returning the slot it landed in.
    pub fn push(&mut self, entry: CleanupEntry) -> Result<usize> {
        self.ensure_slot()?;
        let slot = self.entries.len();
        self.entries.push(entry);
        Ok(slot)
    }

    /// Remove the most recently pushed entry.
    pub fn pop(&mut self) -> Option<CleanupEntry> {
        self.entries.pop()
    }

    /// Most recently pushed entry, left in place.
    #[must_use]
    pub fn last(&self) -> Option<&CleanupEntry> {
        self.entries.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Labels of pending entries, oldest first.
    pub fn pending_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(CleanupEntry::name)
    }
}
