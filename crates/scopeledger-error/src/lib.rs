use thiserror::Error;

/// Primary error type for scopeledger operations.
///
/// Two families matter to callers: capacity violations, which mean the
/// configured ledger or nesting bound was too small for the program, and
/// misuse of the scope API (declaring or closing with no open scope).
/// Neither is retried by the runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // === Capacity Errors ===
    /// The cleanup ledger already holds `capacity` pending cleanups.
    #[error("cleanup ledger is full (capacity {capacity})")]
    LedgerFull { capacity: usize },

    /// Opening another scope would exceed the configured nesting depth.
    #[error("scope nesting too deep (max {max})")]
    ScopeDepthExceeded { max: usize },

    // === Misuse Errors ===
    /// A declaration or close was attempted with no scope open.
    #[error("no scope is open")]
    NoOpenScope,

    /// A declaration was attempted while cleanups are being replayed.
    #[error("cannot declare '{name}' while cleanups are replaying")]
    DeclareDuringReplay { name: &'static str },

    /// A scope close reached a cleanup whose bound value is still borrowed
    /// through its `Declared` handle. The cleanup stays pending.
    #[error("cannot release '{name}' while its value is borrowed")]
    BindingBorrowed { name: &'static str },

    // === Configuration Errors ===
    /// Configuration rejected when building a context.
    #[error("invalid ledger configuration: {detail}")]
    InvalidConfig { detail: String },

    // === Internal Errors ===
    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of [`LedgerError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorKind {
    /// Ledger or scope tracker bound exceeded.
    Capacity = 1,
    /// Scope API called out of order.
    Misuse = 2,
    /// Configuration rejected.
    Config = 3,
    /// Broken internal invariant.
    Internal = 4,
}

impl LedgerError {
    /// Classify this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::LedgerFull { .. } | Self::ScopeDepthExceeded { .. } => ErrorKind::Capacity,
            Self::NoOpenScope | Self::DeclareDuringReplay { .. } | Self::BindingBorrowed { .. } => {
                ErrorKind::Misuse
            }
            Self::InvalidConfig { .. } => ErrorKind::Config,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether this error is a ledger or nesting capacity violation.
    pub const fn is_capacity_violation(&self) -> bool {
        matches!(self.kind(), ErrorKind::Capacity)
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::LedgerFull { .. } => {
                Some("Raise ledger_capacity or close scopes before declaring more resources")
            }
            Self::ScopeDepthExceeded { .. } => {
                Some("Raise max_scope_depth or flatten the nested scopes")
            }
            Self::NoOpenScope => Some("Call open_scope before declaring resources"),
            Self::BindingBorrowed { .. } => {
                Some("End the borrow of the declared value before closing its scope")
            }
            Self::InvalidConfig { .. } => Some("Both capacities must be at least 1"),
            Self::DeclareDuringReplay { .. } | Self::Internal(_) => None,
        }
    }

    /// Stable numeric code of this error's kind, usable as a process status.
    pub const fn exit_code(&self) -> i32 {
        self.kind() as i32
    }

    /// Create a configuration error.
    pub fn invalid_config(detail: impl Into<String>) -> Self {
        Self::InvalidConfig {
            detail: detail.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using `LedgerError`.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = LedgerError::LedgerFull { capacity: 100 };
        assert_eq!(err.to_string(), "cleanup ledger is full (capacity 100)");

        let err = LedgerError::ScopeDepthExceeded { max: 10 };
        assert_eq!(err.to_string(), "scope nesting too deep (max 10)");

        let err = LedgerError::DeclareDuringReplay { name: "googol" };
        assert_eq!(
            err.to_string(),
            "cannot declare 'googol' while cleanups are replaying"
        );

        let err = LedgerError::BindingBorrowed { name: "pi" };
        assert_eq!(err.to_string(), "cannot release 'pi' while its value is borrowed");
    }

    #[test]
    fn capacity_classification() {
        assert!(LedgerError::LedgerFull { capacity: 1 }.is_capacity_violation());
        assert!(LedgerError::ScopeDepthExceeded { max: 1 }.is_capacity_violation());
        assert!(!LedgerError::NoOpenScope.is_capacity_violation());
        assert!(!LedgerError::internal("bug").is_capacity_violation());
    }

    #[test]
    fn kind_mapping() {
        assert_eq!(LedgerError::NoOpenScope.kind(), ErrorKind::Misuse);
        assert_eq!(
            LedgerError::BindingBorrowed { name: "buf" }.kind(),
            ErrorKind::Misuse
        );
        assert_eq!(
            LedgerError::invalid_config("zero").kind(),
            ErrorKind::Config
        );
        assert_eq!(LedgerError::internal("x").kind(), ErrorKind::Internal);
    }

    #[test]
    fn suggestions() {
        assert!(LedgerError::LedgerFull { capacity: 1 }.suggestion().is_some());
        assert!(LedgerError::NoOpenScope.suggestion().is_some());
        assert!(LedgerError::internal("x").suggestion().is_none());
    }

    #[test]
    fn exit_code() {
        assert_eq!(LedgerError::LedgerFull { capacity: 1 }.exit_code(), 1);
        assert_eq!(LedgerError::NoOpenScope.exit_code(), 2);
        assert_eq!(LedgerError::invalid_config("x").exit_code(), 3);
        assert_eq!(LedgerError::internal("x").exit_code(), 4);
    }

    #[test]
    fn convenience_constructors() {
        let err = LedgerError::invalid_config("ledger_capacity must be > 0");
        assert!(matches!(
            err,
            LedgerError::InvalidConfig { detail } if detail == "ledger_capacity must be > 0"
        ));

        let err = LedgerError::internal("bookmark regressed");
        assert!(matches!(err, LedgerError::Internal(msg) if msg == "bookmark regressed"));
    }
}
