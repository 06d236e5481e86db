//! Error types and handling for `data_hub`.
//!
//! The result taxonomy is fixed by the routing core's external
//! interfaces: every fallible tree, resource, or observation operation
//! returns one of these variants. Internal invariant violations (an
//! unexpected entry kind in a match, a ref-count underflow) are
//! programmer errors and are only reachable via `debug_assert!` in
//! debug builds; in release they collapse to `Fault`.

use thiserror::Error;

/// Primary error type for `data_hub` operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HubError {
    /// Type or units mismatch on a same-kind create, or a routing
    /// change that would introduce a source/destination cycle.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Allocation failure during coercion or sample construction.
    #[error("no memory")]
    NoMemory,

    /// Malformed path, bad JSON, or another caller-supplied value that
    /// fails validation before any state is mutated.
    #[error("bad parameter: {0}")]
    BadParameter(String),

    /// The requested entry, path, or extraction target does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The resource has no current value to read.
    #[error("unavailable")]
    Unavailable,

    /// A caller-supplied buffer is too small to hold the result.
    #[error("overflow")]
    Overflow,

    /// The operation is not valid in the current state: an unpaired
    /// `StartUpdate`/`EndUpdate` call, or a caller-enforced namespace
    /// policy rejecting the request.
    #[error("not permitted: {0}")]
    NotPermitted(String),

    /// An internal invariant was violated. Reaching this in release
    /// means a debug assertion in the same code path would have fired.
    #[error("internal fault: {0}")]
    Fault(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HubError>;

impl HubError {
    #[must_use]
    pub fn duplicate(msg: impl Into<String>) -> Self {
        Self::Duplicate(msg.into())
    }

    #[must_use]
    pub fn bad_parameter(msg: impl Into<String>) -> Self {
        Self::BadParameter(msg.into())
    }

    #[must_use]
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    #[must_use]
    pub fn fault(msg: impl Into<String>) -> Self {
        Self::Fault(msg.into())
    }

    #[must_use]
    pub fn not_permitted(msg: impl Into<String>) -> Self {
        Self::NotPermitted(msg.into())
    }
}
