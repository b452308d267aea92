//! Currency identification
//!
//! Currencies are identified by their ISO 4217 code. Two currencies are the
//! same currency if and only if their codes match, regardless of their
//! numeric IDs (the ID only matters to an external persistence layer).

use serde::{Deserialize, Serialize};
use std::fmt;

/// The reserved ID of the default (locale) currency
pub const DEFAULT_CURRENCY_ID: u32 = 1;

/// An ISO 4217 currency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Currency {
    /// Persistence identifier; ID 1 is the redefinable default currency
    pub id: u32,

    /// ISO 4217 code (e.g., "USD")
    pub code: String,
}

impl Currency {
    /// Create a currency with the given ISO 4217 code and an unpersisted ID
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            id: 0,
            code: code.into(),
        }
    }

    /// Create a currency with an explicit persistence ID
    pub fn with_id(id: u32, code: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
        }
    }

    /// The ISO 4217 code of this currency
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Whether this is the redefinable default currency slot
    pub fn is_default_slot(&self) -> bool {
        self.id == DEFAULT_CURRENCY_ID
    }
}

impl Default for Currency {
    /// The locale default currency
    fn default() -> Self {
        Self::with_id(DEFAULT_CURRENCY_ID, "USD")
    }
}

// Equality is by code only; the numeric ID is a storage detail.
impl PartialEq for Currency {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for Currency {}

impl std::hash::Hash for Currency {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.code.hash(state);
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

impl From<&str> for Currency {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}
