//! Scope tracker: one bookmark per open scope.

use std::fmt;

use scopeledger_error::{LedgerError, Result};

/// Ledger length recorded when a scope opened. Entries at or above this
/// index belong to that scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bookmark(usize);

impl Bookmark {
    /// Ledger length at the time the scope opened.
    #[inline]
    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for Bookmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bounded stack of bookmarks. Depth equals the number of open scopes.
#[derive(Debug)]
pub struct ScopeTracker {
    bookmarks: Vec<Bookmark>,
    max_depth: usize,
}

impl ScopeTracker {
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            bookmarks: Vec::with_capacity(max_depth),
            max_depth,
        }
    }

    /// Record `ledger_len` as the bookmark of a newly opened scope.
    ///
    /// Bookmarks never decrease from bottom to top; a regression means the
    /// ledger was popped past an open scope.
    pub fn push(&mut self, ledger_len: usize) -> Result<Bookmark> {
        if self.bookmarks.len() >= self.max_depth {
            return Err(LedgerError::ScopeDepthExceeded {
                max: self.max_depth,
            });
        }
        if let Some(top) = self.top() {
            if ledger_len < top.get() {
                return Err(LedgerError::internal(format!(
                    "bookmark {ledger_len} below enclosing bookmark {top}"
                )));
            }
        }
        let bookmark = Bookmark(ledger_len);
        self.bookmarks.push(bookmark);
        Ok(bookmark)
    }

    /// Bookmark of the innermost open scope.
    #[must_use]
    pub fn top(&self) -> Option<Bookmark> {
        self.bookmarks.last().copied()
    }

    pub fn pop(&mut self) -> Option<Bookmark> {
        self.bookmarks.pop()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.bookmarks.len()
    }
}
