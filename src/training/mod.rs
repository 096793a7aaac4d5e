//! Training loops for linear parametric models.
//!
//! Core types:
//!
//! - [`SgdTrainer`]: epoch/mini-batch training loop around an
//!   [`SgdOptimizer`](crate::optim::SgdOptimizer), plus the method-driven
//!   per-output and whole-matrix paths
//! - [`FitParams`] / [`FitResult`]: configuration and outcome of one fit
//! - [`Loss`] / [`ActivationFn`]: the loss/gradient contract the loops consume
//! - [`TrainingLogger`] / [`Verbosity`]: training output

mod logger;
mod metric;
mod parallel;
mod trainer;

pub mod loss;

pub use logger::{TrainingLogger, Verbosity};
pub use loss::{ActivationFn, Identity, Loss, SquareLoss};
pub use metric::mean_squared_error;
pub use trainer::{FitParams, FitResult, SgdTrainer, ThetaInit};
