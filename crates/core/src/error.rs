//! Error types for privacy loss accounting.

/// Errors surfaced by PLD construction, composition, and serialization.
#[derive(Debug, thiserror::Error)]
pub enum AccountingError {
    /// Mechanism or constructor parameter outside its feasible domain.
    #[error("invalid parameter: {msg}")]
    InvalidParameter {
        /// Human-readable error description.
        msg: String,
    },

    /// Two distributions cannot be composed with each other.
    #[error("incompatible privacy loss distributions: {msg}")]
    IncompatiblePlds {
        /// Human-readable error description.
        msg: String,
    },

    /// Operation restricted to pessimistic estimates.
    #[error("unsupported estimate type: {msg}")]
    UnsupportedEstimateType {
        /// Human-readable error description.
        msg: String,
    },

    /// An index or mass left the representable range.
    #[error("numeric overflow: {msg}")]
    NumericOverflow {
        /// Human-readable error description.
        msg: String,
    },

    /// Malformed external representation.
    #[error("deserialization failed: {msg}")]
    Deserialization {
        /// Human-readable error description.
        msg: String,
    },
}

/// Result type for accounting operations.
pub type Result<T> = std::result::Result<T, AccountingError>;

impl AccountingError {
    /// Create an invalid parameter error.
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameter { msg: msg.into() }
    }

    /// Create an incompatible distributions error.
    pub fn incompatible<S: Into<String>>(msg: S) -> Self {
        Self::IncompatiblePlds { msg: msg.into() }
    }

    /// Create an unsupported estimate type error.
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedEstimateType { msg: msg.into() }
    }

    /// Create a numeric overflow error.
    pub fn overflow<S: Into<String>>(msg: S) -> Self {
        Self::NumericOverflow { msg: msg.into() }
    }

    /// Create a deserialization error.
    pub fn deserialization<S: Into<String>>(msg: S) -> Self {
        Self::Deserialization { msg: msg.into() }
    }
}
