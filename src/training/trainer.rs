//! Mini-batch training loop for linear parametric models.
//!
//! [`SgdTrainer`] drives one [`SgdOptimizer`] to convergence over a fixed
//! dataset: per epoch it shuffles the rows, walks the mini-batches feeding
//! gradients to the rule, then recomputes the full-dataset objective for
//! convergence testing and best-so-far tracking. Mini-batch losses never gate
//! convergence.

use ndarray::{s, Array2};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::optim::{OptimError, SgdOptimizer};
use crate::utils::shuffle_rows;

use super::logger::{TrainingLogger, Verbosity};
use super::loss::{ActivationFn, Identity, Loss, SquareLoss};
use super::metric::mean_squared_error;

// =============================================================================
// Configuration
// =============================================================================

/// Theta initialization strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThetaInit {
    /// Small uniform random entries in `[0, 0.01)`.
    #[default]
    UniformSmall,
    /// All zeros.
    Zeros,
}

/// Parameters for the training loops.
#[derive(Debug, Clone)]
pub struct FitParams {
    /// Epoch budget for the mini-batch loop, or evaluation budget for the
    /// method-driven paths. 0 derives the original defaults:
    /// `1e6 / n_samples` epochs and `4e6 / n_samples` evaluations.
    pub epochs: usize,

    /// Mini-batch size. 0 derives `sqrt(n_samples)` clamped to `[1, 100]`;
    /// the value is always re-clamped to `[1, n_samples]`.
    pub mini_batch_size: usize,

    /// Convergence tolerance, compared against `sqrt(rmse)`.
    pub tol: f64,

    /// Elastic-net regularization weight.
    pub alpha: f64,

    /// L1 share of the elastic-net penalty (0 = ridge-like, 1 = lasso-like).
    pub l1_ratio: f64,

    /// Theta initialization for the mini-batch loop.
    pub theta_init: ThetaInit,

    /// Seed for the shuffle/initialization RNG.
    pub seed: u64,

    /// When fitting with an external method, run one minimization per output
    /// column concurrently instead of one over the whole matrix.
    pub per_output: bool,

    /// Verbosity level for training output.
    pub verbosity: Verbosity,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            epochs: 0,
            mini_batch_size: 0,
            tol: 1e-6,
            alpha: 0.0,
            l1_ratio: 0.0,
            theta_init: ThetaInit::default(),
            seed: 42,
            per_output: true,
            verbosity: Verbosity::default(),
        }
    }
}

/// Outcome of one fit.
///
/// `theta` is the best-objective snapshot seen across all epochs, not
/// necessarily the final-epoch parameters: later epochs may diverge on
/// ill-conditioned or regularized problems.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Whether the tolerance test passed on the terminating epoch.
    pub converged: bool,
    /// Full-dataset RMSE at the terminating epoch.
    pub rmse: f64,
    /// Best full-dataset objective observed.
    pub j: f64,
    /// Epochs actually run (or evaluations, for the method-driven paths).
    pub epoch: usize,
    /// Fitted parameters, `(n_features, n_outputs)`.
    pub theta: Array2<f64>,
}

// =============================================================================
// SgdTrainer
// =============================================================================

/// Epoch/mini-batch trainer around a pluggable loss and activation.
#[derive(Debug, Clone)]
pub struct SgdTrainer<L: Loss, A: ActivationFn> {
    pub(crate) loss: L,
    pub(crate) activation: A,
    pub(crate) params: FitParams,
}

impl SgdTrainer<SquareLoss, Identity> {
    /// Squared-error trainer with the identity activation.
    pub fn new(params: FitParams) -> Self {
        Self {
            loss: SquareLoss,
            activation: Identity,
            params,
        }
    }
}

impl<L: Loss, A: ActivationFn> SgdTrainer<L, A> {
    /// Trainer with a custom loss and activation.
    pub fn with_loss(loss: L, activation: A, params: FitParams) -> Self {
        Self {
            loss,
            activation,
            params,
        }
    }

    pub fn params(&self) -> &FitParams {
        &self.params
    }

    /// Fits Theta by mini-batch gradient descent.
    ///
    /// `x` is `(n_samples, n_features)`, `y` is `(n_samples, n_outputs)`;
    /// both are taken by value because epochs shuffle them in place. The
    /// solver is consumed: its parameter state lives exactly as long as this
    /// fit.
    pub fn train(
        &self,
        mut x: Array2<f64>,
        mut y: Array2<f64>,
        mut solver: SgdOptimizer,
    ) -> Result<FitResult, OptimError> {
        let (n_samples, n_features) = x.dim();
        let (y_rows, n_outputs) = y.dim();
        if y_rows != n_samples {
            return Err(OptimError::ShapeMismatch {
                expected: (n_samples, n_outputs),
                got: (y_rows, n_outputs),
            });
        }
        assert!(n_samples > 0, "training requires at least one sample");

        let epochs = if self.params.epochs > 0 {
            self.params.epochs
        } else {
            ((1e6 / n_samples as f64) as usize).max(1)
        };
        let batch = derive_batch_size(self.params.mini_batch_size, n_samples);

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.params.seed);
        let theta = init_theta(
            (n_features, n_outputs),
            self.params.theta_init,
            &mut rng,
        );
        solver.set_theta(theta);

        let mut grad = Array2::zeros((n_features, n_outputs));
        let mut y_pred_mini = Array2::zeros((batch, n_outputs));
        let mut y_diff_mini = Array2::zeros((batch, n_outputs));
        let mut y_pred = Array2::zeros((n_samples, n_outputs));
        let mut y_diff = Array2::zeros((n_samples, n_outputs));

        let logger = TrainingLogger::new(self.params.verbosity);
        logger.start_training(solver.name(), epochs);

        let mut best_j = f64::INFINITY;
        let mut best_theta = solver.theta().ok_or(OptimError::NotBound)?.clone();
        let mut rmse = f64::INFINITY;
        let mut converged = false;
        let mut epochs_run = 0;

        for epoch in 1..=epochs {
            epochs_run = epoch;
            shuffle_rows(&mut x, &mut y, &mut rng);

            let mut start = 0;
            while start < n_samples {
                let end = (start + batch).min(n_samples);
                let rows = end - start;
                self.loss.loss(
                    y.slice(s![start..end, ..]),
                    x.slice(s![start..end, ..]),
                    solver.theta().ok_or(OptimError::NotBound)?,
                    y_pred_mini.slice_mut(s![..rows, ..]),
                    y_diff_mini.slice_mut(s![..rows, ..]),
                    Some(&mut grad),
                    self.params.alpha,
                    self.params.l1_ratio,
                    n_samples,
                    &self.activation,
                );
                solver.update_params(grad.view())?;
                start = end;
            }

            // Convergence and best-so-far tracking use the full dataset, not
            // the last mini-batch.
            let j = self.loss.loss(
                y.view(),
                x.view(),
                solver.theta().ok_or(OptimError::NotBound)?,
                y_pred.view_mut(),
                y_diff.view_mut(),
                Some(&mut grad),
                self.params.alpha,
                self.params.l1_ratio,
                n_samples,
                &self.activation,
            );
            if j < best_j {
                best_j = j;
                best_theta.assign(solver.theta().ok_or(OptimError::NotBound)?);
            }
            rmse = mean_squared_error(y.view(), y_pred.view()).sqrt();
            logger.log_epoch(epoch, j, rmse);

            // Historical quirk kept on purpose: the tolerance is compared
            // against sqrt(rmse), not rmse itself.
            converged = rmse.sqrt() < self.params.tol;
            if converged {
                break;
            }
        }

        logger.finish_training(converged, epochs_run, rmse);
        Ok(FitResult {
            converged,
            rmse,
            j: best_j,
            epoch: epochs_run,
            theta: best_theta,
        })
    }
}

fn derive_batch_size(requested: usize, n_samples: usize) -> usize {
    let batch = if requested > 0 {
        requested
    } else {
        ((n_samples as f64).sqrt() as usize).clamp(1, 100)
    };
    batch.clamp(1, n_samples)
}

pub(crate) fn init_theta<R: Rng + ?Sized>(
    shape: (usize, usize),
    init: ThetaInit,
    rng: &mut R,
) -> Array2<f64> {
    match init {
        ThetaInit::UniformSmall => {
            let mut theta = Array2::zeros(shape);
            theta.mapv_inplace(|_| 0.01 * rng.gen::<f64>());
            theta
        }
        ThetaInit::Zeros => Array2::zeros(shape),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_batch_size_defaults() {
        assert_eq!(derive_batch_size(0, 200), 14);
        assert_eq!(derive_batch_size(0, 2), 1);
        assert_eq!(derive_batch_size(0, 100_000), 100);
        // Explicit sizes are clamped to the sample count.
        assert_eq!(derive_batch_size(500, 20), 20);
        assert_eq!(derive_batch_size(8, 20), 8);
    }

    #[test]
    fn init_theta_is_small_and_nonnegative() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let theta = init_theta((5, 3), ThetaInit::UniformSmall, &mut rng);
        assert!(theta.iter().all(|&t| (0.0..0.01).contains(&t)));
        let zeros = init_theta((5, 3), ThetaInit::Zeros, &mut rng);
        assert!(zeros.iter().all(|&t| t == 0.0));
    }

    #[test]
    fn mismatched_row_counts_fail_fast() {
        let trainer = SgdTrainer::new(FitParams {
            verbosity: Verbosity::Silent,
            ..FitParams::default()
        });
        let x = Array2::zeros((10, 2));
        let y = Array2::zeros((8, 1));
        let err = trainer.train(x, y, SgdOptimizer::adam()).unwrap_err();
        assert!(matches!(err, OptimError::ShapeMismatch { .. }));
    }
}
