//! Method-driven fitting, including the concurrent per-output orchestrator.
//!
//! When the minimization is delegated to an external iterative method instead
//! of the built-in mini-batch loop, and the problem decomposes column-wise,
//! one full minimization runs per output column on its own worker. Workers
//! share nothing mutable: each owns its parameter sub-vector, method instance
//! and prediction/residual scratch buffers, and reports through an mpsc
//! channel keyed by output index. The reducer writes columns by index, so the
//! assembled Theta is deterministic regardless of scheduling.

use std::sync::mpsc;

use ndarray::{s, Array2, ArrayView1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::optim::driver::{minimize, Problem, Settings, Status};
use crate::optim::{IterativeMethod, OptimError};

use super::loss::{ActivationFn, Loss};
use super::trainer::{FitResult, SgdTrainer};

/// Regularized regression objective over a fixed (sub-)problem, with owned
/// scratch buffers so evaluations never allocate.
struct RegressionProblem<'a, L, A> {
    x: ArrayView2<'a, f64>,
    y: ArrayView2<'a, f64>,
    theta: Array2<f64>,
    y_pred: Array2<f64>,
    y_diff: Array2<f64>,
    grad: Array2<f64>,
    alpha: f64,
    l1_ratio: f64,
    n_samples: usize,
    loss: &'a L,
    activation: &'a A,
}

impl<'a, L: Loss, A: ActivationFn> RegressionProblem<'a, L, A> {
    fn new(
        x: ArrayView2<'a, f64>,
        y: ArrayView2<'a, f64>,
        alpha: f64,
        l1_ratio: f64,
        loss: &'a L,
        activation: &'a A,
    ) -> Self {
        let (n_samples, n_features) = x.dim();
        let n_outputs = y.ncols();
        Self {
            x,
            y,
            theta: Array2::zeros((n_features, n_outputs)),
            y_pred: Array2::zeros((n_samples, n_outputs)),
            y_diff: Array2::zeros((n_samples, n_outputs)),
            grad: Array2::zeros((n_features, n_outputs)),
            alpha,
            l1_ratio,
            n_samples,
            loss,
            activation,
        }
    }

    fn load_theta(&mut self, flat: &[f64]) {
        self.theta
            .as_slice_mut()
            .expect("theta scratch is contiguous")
            .copy_from_slice(flat);
    }

    /// Frobenius norm of the residuals from the latest evaluation.
    fn residual_norm(&self) -> f64 {
        self.y_diff.iter().map(|d| d * d).sum::<f64>().sqrt()
    }
}

impl<L: Loss, A: ActivationFn> Problem for RegressionProblem<'_, L, A> {
    fn value(&mut self, x: &[f64]) -> f64 {
        self.load_theta(x);
        self.loss.loss(
            self.y,
            self.x,
            &self.theta,
            self.y_pred.view_mut(),
            self.y_diff.view_mut(),
            None,
            self.alpha,
            self.l1_ratio,
            self.n_samples,
            self.activation,
        )
    }

    fn gradient(&mut self, grad: &mut [f64], x: &[f64]) {
        self.load_theta(x);
        self.loss.loss(
            self.y,
            self.x,
            &self.theta,
            self.y_pred.view_mut(),
            self.y_diff.view_mut(),
            Some(&mut self.grad),
            self.alpha,
            self.l1_ratio,
            self.n_samples,
            self.activation,
        );
        grad.copy_from_slice(self.grad.as_slice().expect("grad scratch is contiguous"));
    }
}

impl<L: Loss + Sync, A: ActivationFn + Sync> SgdTrainer<L, A> {
    /// Fits Theta by delegating to an external iterative method.
    ///
    /// `make_method` builds one fresh method per minimization (the per-output
    /// path runs one minimization per column, each on its own worker). The
    /// evaluation budget is `params.epochs`, defaulting to
    /// `4e6 / n_samples`, and the function threshold is `tol^2`.
    ///
    /// Non-convergence, budget exhaustion and per-column method failures are
    /// folded into `FitResult::converged`; only structural errors from the
    /// method protocol itself are returned as `Err`.
    pub fn train_with_method<M, F>(
        &self,
        x: &Array2<f64>,
        y: &Array2<f64>,
        make_method: F,
    ) -> Result<FitResult, OptimError>
    where
        M: IterativeMethod,
        F: Fn() -> M + Sync,
    {
        let (n_samples, n_features) = x.dim();
        let (y_rows, n_outputs) = y.dim();
        if y_rows != n_samples {
            return Err(OptimError::ShapeMismatch {
                expected: (n_samples, n_outputs),
                got: (y_rows, n_outputs),
            });
        }
        assert!(n_samples > 0, "training requires at least one sample");
        assert!(n_outputs > 0, "training requires at least one output");

        let evaluations = if self.params.epochs > 0 {
            self.params.epochs
        } else {
            ((4e6 / n_samples as f64) as usize).max(1)
        };
        let settings = Settings {
            max_evaluations: evaluations,
            function_threshold: self.params.tol * self.params.tol,
            gradient_threshold: 1e-12,
        };

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.params.seed);
        let mut theta = Array2::zeros((n_features, n_outputs));
        theta.mapv_inplace(|_| 0.01 * rng.sample::<f64, _>(StandardNormal));

        if self.params.per_output {
            self.fit_per_output(x, y, theta, &settings, &make_method)
        } else {
            self.fit_whole(x, y, theta, &settings, &make_method)
        }
    }

    /// One concurrent minimization per output column.
    fn fit_per_output<M, F>(
        &self,
        x: &Array2<f64>,
        y: &Array2<f64>,
        mut theta: Array2<f64>,
        settings: &Settings,
        make_method: &F,
    ) -> Result<FitResult, OptimError>
    where
        M: IterativeMethod,
        F: Fn() -> M + Sync,
    {
        let n_outputs = theta.ncols();
        let loss = &self.loss;
        let activation = &self.activation;
        let alpha = self.params.alpha;
        let l1_ratio = self.params.l1_ratio;

        let (tx, rx) = mpsc::channel();
        rayon::scope(|scope| {
            for o in 0..n_outputs {
                let tx = tx.clone();
                let theta0 = theta.column(o).to_vec();
                scope.spawn(move |_| {
                    let mut problem = RegressionProblem::new(
                        x.view(),
                        y.slice(s![.., o..o + 1]),
                        alpha,
                        l1_ratio,
                        loss,
                        activation,
                    );
                    let mut method = make_method();
                    let outcome = minimize(&mut problem, theta0, settings, &mut method);
                    // The consumer collects exactly one message per column.
                    let _ = tx.send((o, outcome));
                });
            }
        });
        drop(tx);

        let mut converged = true;
        let mut objective_sum = 0.0;
        let mut evaluations = 0;
        for _ in 0..n_outputs {
            let (o, outcome) = rx
                .recv()
                .expect("every column worker reports exactly once");
            match outcome {
                Ok(res) => {
                    theta.column_mut(o).assign(&ArrayView1::from(&res.x[..]));
                    objective_sum += res.f;
                    evaluations += res.evaluations;
                    converged = converged && res.status == Status::Converged;
                }
                // A failing column never aborts its siblings.
                Err(_) => converged = false,
            }
        }

        let rmse = objective_sum.sqrt() / n_outputs as f64;
        Ok(FitResult {
            converged,
            rmse,
            j: objective_sum,
            epoch: evaluations,
            theta,
        })
    }

    /// Single minimization over the whole flattened parameter matrix.
    fn fit_whole<M, F>(
        &self,
        x: &Array2<f64>,
        y: &Array2<f64>,
        theta: Array2<f64>,
        settings: &Settings,
        make_method: &F,
    ) -> Result<FitResult, OptimError>
    where
        M: IterativeMethod,
        F: Fn() -> M + Sync,
    {
        let shape = theta.dim();
        let n_outputs = shape.1;
        let mut problem = RegressionProblem::new(
            x.view(),
            y.view(),
            self.params.alpha,
            self.params.l1_ratio,
            &self.loss,
            &self.activation,
        );
        let x0: Vec<f64> = theta.iter().copied().collect();
        let mut method = make_method();
        let res = minimize(&mut problem, x0, settings, &mut method)?;

        let theta =
            Array2::from_shape_vec(shape, res.x).expect("minimizer preserves the parameter length");
        // This reduction is not numerically equivalent to the per-output one.
        let rmse = problem.residual_norm() / n_outputs as f64;
        Ok(FitResult {
            converged: res.status == Status::Converged,
            rmse,
            j: res.f,
            epoch: res.evaluations,
            theta,
        })
    }
}
