//! Capacity configuration for a scope context.

use scopeledger_error::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Default ledger capacity (C).
pub const DEFAULT_LEDGER_CAPACITY: usize = 100;

/// Default scope nesting depth (D).
pub const DEFAULT_MAX_SCOPE_DEPTH: usize = 10;

/// Fixed bounds for one scope context.
///
/// Both values are read once when the context is built. Neither bound can
/// change for the lifetime of that context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Maximum number of pending cleanups across all open scopes.
    ///
    /// Default: 100.
    pub ledger_capacity: usize,

    /// Maximum number of simultaneously open scopes.
    ///
    /// Default: 10.
    pub max_scope_depth: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
            max_scope_depth: DEFAULT_MAX_SCOPE_DEPTH,
        }
    }
}

impl LedgerConfig {
    /// Build an explicit-capacity configuration.
    #[must_use]
    pub const fn new(ledger_capacity: usize, max_scope_depth: usize) -> Self {
        Self {
            ledger_capacity,
            max_scope_depth,
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| LedgerError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject bounds that could never hold a single cleanup or scope.
    pub fn validate(&self) -> Result<()> {
        if self.ledger_capacity == 0 {
            return Err(LedgerError::invalid_config("ledger_capacity must be > 0"));
        }
        if self.max_scope_depth == 0 {
            return Err(LedgerError::invalid_config("max_scope_depth must be > 0"));
        }
        Ok(())
    }
}
