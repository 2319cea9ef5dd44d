//! Scope-bounded cleanup runtime.
//!
//! Cleanups are recorded in a bounded ledger as they are declared and
//! replayed newest-first when their scope closes. Nested scopes are tracked
//! by bookmarks into the ledger, so an inner scope never releases anything
//! its enclosing scope declared.

pub mod binding;
pub mod config;
pub mod context;
pub mod ledger;
pub mod signal;
pub mod tracker;

pub use binding::Declared;
pub use config::{DEFAULT_LEDGER_CAPACITY, DEFAULT_MAX_SCOPE_DEPTH, LedgerConfig};
pub use context::{CleanupFailure, ExitReport, RuntimeMode, ScopeContext};
pub use ledger::{CleanupEntry, CleanupLedger};
pub use signal::ErrorSignal;
pub use tracker::{Bookmark, ScopeTracker};
