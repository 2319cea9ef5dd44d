//! Public API facade for scopeledger.
//!
//! Bind a resource and its release at one declaration site; the release runs
//! exactly once, newest first, when the enclosing scope closes.
//!
//! ```
//! use scopeledger::{ScopeContext, declare};
//!
//! fn run(ctx: &mut ScopeContext) -> scopeledger::Result<Vec<&'static str>> {
//!     let released = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
//!     ctx.open_scope()?;
//!     let (a, b) = (released.clone(), released.clone());
//!     declare!(ctx, googol = vec![10_i32] => move |_| a.borrow_mut().push("googol"));
//!     declare!(ctx, pi = vec![3_i32] => move |_| b.borrow_mut().push("pi"));
//!     assert_eq!(googol.with(|v| v[0]), Some(10));
//!     assert_eq!(pi.with(|v| v[0]), Some(3));
//!     ctx.close_scope()?;
//!     let order = released.borrow().clone();
//!     Ok(order)
//! }
//!
//! let mut ctx = ScopeContext::new();
//! assert_eq!(run(&mut ctx).unwrap(), vec!["pi", "googol"]);
//! assert_eq!(ctx.exit(|| 0, |_| 1), 0);
//! ```

pub use scopeledger_core::{
    Bookmark, CleanupFailure, DEFAULT_LEDGER_CAPACITY, DEFAULT_MAX_SCOPE_DEPTH, Declared,
    ErrorSignal, ExitReport, LedgerConfig, RuntimeMode, ScopeContext,
};
pub use scopeledger_error::{ErrorKind, LedgerError, Result};
pub use scopeledger_observability as observability;
pub use scopeledger_observability::{ExitPath, UnwindEvent, UnwindObserver};

/// Declare a resource in the innermost open scope of a [`ScopeContext`].
///
/// `declare!(ctx, name = init => cleanup)` evaluates `init`, binds the
/// resulting [`Declared`] handle to `name`, and registers `cleanup` under the
/// label `"name"`. Errors propagate with `?`, so the macro must be used in a
/// function returning a `Result` whose error converts from [`LedgerError`].
#[macro_export]
macro_rules! declare {
    ($ctx:expr, $name:ident = $init:expr => $cleanup:expr $(,)?) => {
        let $name = $ctx.declare(::core::stringify!($name), || $init, $cleanup)?;
    };
}
