//! Stochastic first-order update rules and the iterative-method protocol.
//!
//! The central type is [`SgdOptimizer`]: one update contract
//! (`set_theta` / `update_params` / `get_update` / `time_step`) over five
//! variants selected by [`Method`]. Variant-specific accumulators live inside
//! the selected variant, so illegal two-variants-at-once states cannot be
//! represented.
//!
//! For callers that drive optimization through a generic iterative-minimizer
//! protocol, [`MethodAdapter`] wraps a rule behind the
//! [`IterativeMethod`] init/iterate/needs contract, and [`driver::minimize`]
//! is a minimal local-minimization loop speaking that protocol.

pub mod driver;

mod adapter;
mod sgd;
mod store;

pub use adapter::{IterativeMethod, Location, MethodAdapter, Needs, Operation};
pub use sgd::{Method, SgdOptimizer};
pub use store::ParameterStore;

/// Structural errors raised by the optimizer core.
///
/// Shape and configuration problems fail fast before any numeric work starts.
/// Numerical non-convergence is never an error; it is reported through
/// [`FitResult::converged`](crate::training::FitResult).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptimError {
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("unknown optimizer {name:?}, expected one of sgd|adagrad|adadelta|rmsprop|adam")]
    UnknownMethod { name: String },

    #[error("size mismatch: expected {expected:?} parameters, got a vector of length {got}")]
    SizeMismatch { expected: (usize, usize), got: usize },

    #[error("optimizer is not bound to a parameter shape; call set_theta or bind first")]
    NotBound,
}
