use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// The name bound at a declaration site.
///
/// Holds the initializer's value for the remainder of the declaring scope.
/// When the scope unwinds, the cleanup takes the value out by move; from then
/// on the handle is no longer live and accessors return `None`.
pub struct Declared<T> {
    name: &'static str,
    slot: Rc<RefCell<Option<T>>>,
}

impl<T> Declared<T> {
    pub(crate) fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            slot: Rc::new(RefCell::new(Some(value))),
        }
    }

    /// Shared cell the cleanup continuation takes the value from.
    pub(crate) fn slot(&self) -> Rc<RefCell<Option<T>>> {
        Rc::clone(&self.slot)
    }

    /// Label given at the declaration site.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the cleanup has not yet consumed the value.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Borrow the bound value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.slot.borrow().as_ref().map(f)
    }

    /// Mutably borrow the bound value.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.slot.borrow_mut().as_mut().map(f)
    }

    /// Copy of the bound value.
    #[must_use]
    pub fn get(&self) -> Option<T>
    where
        T: Clone,
    {
        self.slot.borrow().clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for Declared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Declared")
            .field("name", &self.name)
            .field("value", &self.slot.borrow())
            .finish()
    }
}
