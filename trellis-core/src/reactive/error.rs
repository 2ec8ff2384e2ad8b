//! Error types for the reactivity engine.
//!
//! Recoverable conditions are `Result`-shaped; the only user-visible failure
//! class is an effect body panic, which is reported through the runtime's
//! error hook rather than propagated.

use thiserror::Error;

use super::value::NodeKind;

/// Errors produced by wrapper operations.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A collection built-in was handed a wrapped receiver. Recovered
    /// internally by retrying against the raw node; callers only see this if
    /// they invoke the built-in layer directly.
    #[error("{method} called on incompatible receiver")]
    IncompatibleReceiver { method: &'static str },

    /// A built-in was invoked on a node kind that does not support it.
    #[error("{method} is not supported on a {kind:?} node")]
    UnsupportedMethod {
        method: &'static str,
        kind: NodeKind,
    },

    /// A built-in needed a scalar key argument and got something else.
    #[error("{method} requires a scalar key argument")]
    BadKey { method: &'static str },
}

/// Failures reported through the runtime's error side channel.
#[derive(Debug, Error)]
pub enum EffectError {
    /// An effect body panicked. The panic is caught at the scheduler
    /// boundary; tracking state for other effects is unaffected.
    #[error("effect panicked: {0}")]
    Panicked(String),
}
