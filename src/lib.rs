//! linfit: a pluggable first-order optimization engine for linear parametric models.
//!
//! This crate provides a family of stochastic gradient update rules sharing one
//! update contract, and the training loops that drive them:
//!
//! - [`SgdOptimizer`] - plain/momentum SGD, Adagrad, RMSProp, Adadelta and Adam,
//!   selected by a tagged [`Method`] so exactly one variant is ever active
//! - [`SgdTrainer`] - epoch/mini-batch training loop with convergence tracking
//!   and best-objective snapshotting
//! - a concurrent per-output orchestrator for problems that decompose
//!   column-wise (see [`SgdTrainer::train_with_method`])
//! - [`MethodAdapter`] - exposes the update rules through a generic
//!   init/iterate/needs protocol so external iterative minimization drivers can
//!   treat them as a plug-in method
//!
//! # Example
//!
//! ```ignore
//! use linfit::{FitParams, SgdOptimizer, SgdTrainer};
//!
//! let trainer = SgdTrainer::new(FitParams::default());
//! let result = trainer.train(x, y, SgdOptimizer::adam())?;
//! println!("converged={} rmse={}", result.converged, result.rmse);
//! ```

pub mod optim;
pub mod training;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use optim::{
    IterativeMethod, Location, Method, MethodAdapter, Needs, Operation, OptimError,
    ParameterStore, SgdOptimizer,
};
pub use training::{
    ActivationFn, FitParams, FitResult, Identity, Loss, SgdTrainer, SquareLoss, ThetaInit,
    TrainingLogger, Verbosity,
};
