use std::cell::Cell;
use std::rc::Rc;

/// The single "an error occurred" flag of a scope context.
///
/// Cloning yields another handle to the same flag, so cleanup closures can
/// capture one and raise it while the ledger is replaying. Once raised the
/// flag stays raised for the lifetime of the context.
#[derive(Debug, Clone, Default)]
pub struct ErrorSignal(Rc<Cell<bool>>);

impl ErrorSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the enclosing flow as failed.
    pub fn raise(&self) {
        self.0.set(true);
    }

    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.get()
    }
}
