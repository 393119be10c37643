// ============================================================================
// spark-observe - Errors
// ============================================================================

use thiserror::Error;

/// Errors raised by observation, binding and composition.
///
/// Configuration and invariant errors are returned at the call site and are
/// expected to abort the current bind/attach operation. Idempotent operations
/// (double unbind, double unsubscribe) never produce an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------
    #[error("no value converter named '{0}' is registered")]
    MissingValueConverter(String),

    #[error("no binding behavior named '{0}' is registered")]
    MissingBindingBehavior(String),

    #[error("binding behavior '{0}' is already applied to this binding")]
    BehaviorAlreadyApplied(String),

    #[error("expression of kind {0} is not assignable")]
    NonAssignableExpression(&'static str),

    #[error("invalid view cache size '{0}'")]
    InvalidCacheSize(String),

    #[error("frames per check must be greater than zero")]
    InvalidFramesPerCheck,

    // -------------------------------------------------------------------------
    // Scope
    // -------------------------------------------------------------------------
    #[error("scope is null")]
    NullScope,

    #[error("binding has no scope, it is not bound")]
    UndefinedScope,

    // -------------------------------------------------------------------------
    // Invariants
    // -------------------------------------------------------------------------
    #[error("view factory requires a non-empty name")]
    UnnamedViewFactory,

    #[error("cannot assign property '{key}' on a value of kind {kind}")]
    NotAnObject { kind: &'static str, key: String },

    #[error("property '{0}' has a setter but no getter and cannot be observed")]
    SetterOnlyProperty(String),

    // -------------------------------------------------------------------------
    // Unobservable properties
    // -------------------------------------------------------------------------
    #[error("property '{0}' can only be observed through dirty checking")]
    UnobservableProperty(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
