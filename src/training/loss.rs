//! Loss/gradient contract consumed by the training loops.
//!
//! A [`Loss`] fills caller-owned prediction and residual buffers, optionally
//! the gradient of the regularized loss with respect to Theta, and returns the
//! scalar regularized loss. Regularization is elastic-net style, controlled by
//! the weight `alpha` and the L1/L2 mix `l1_ratio` (0 = pure L2, 1 = pure L1),
//! scaled by `1/n_samples`. Mini-batch callers pass the full-dataset
//! `n_samples` so batch gradients stay on the same scale as the full loss.

use ndarray::linalg::general_mat_mul;
use ndarray::{Array2, ArrayView2, ArrayViewMut2, Zip};

/// Element-wise activation applied to the linear predictor before the loss.
pub trait ActivationFn {
    fn apply(&self, z: f64) -> f64;
}

/// The default activation: passes the linear predictor through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl ActivationFn for Identity {
    fn apply(&self, z: f64) -> f64 {
        z
    }
}

/// Regularized loss with a first-order oracle.
pub trait Loss {
    /// Fills `y_pred` with `activation(x . theta)` and `y_diff` with
    /// `y_pred - y_true`; when `grad` is supplied, fills it with the gradient
    /// of the regularized loss with respect to `theta`. Returns the scalar
    /// regularized loss.
    #[allow(clippy::too_many_arguments)]
    fn loss(
        &self,
        y_true: ArrayView2<'_, f64>,
        x: ArrayView2<'_, f64>,
        theta: &Array2<f64>,
        y_pred: ArrayViewMut2<'_, f64>,
        y_diff: ArrayViewMut2<'_, f64>,
        grad: Option<&mut Array2<f64>>,
        alpha: f64,
        l1_ratio: f64,
        n_samples: usize,
        activation: &dyn ActivationFn,
    ) -> f64;
}

/// Squared-error loss with elastic-net regularization.
///
/// ```text
/// J = sum(d^2) / (2n) + alpha*l1_ratio*sum(|t|)/n + alpha*(1-l1_ratio)*sum(t^2)/(2n)
/// dJ/dt = (X' d + alpha*l1_ratio*sign(t) + alpha*(1-l1_ratio)*t) / n
/// ```
///
/// The gradient assumes the identity activation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SquareLoss;

impl Loss for SquareLoss {
    #[allow(clippy::too_many_arguments)]
    fn loss(
        &self,
        y_true: ArrayView2<'_, f64>,
        x: ArrayView2<'_, f64>,
        theta: &Array2<f64>,
        mut y_pred: ArrayViewMut2<'_, f64>,
        mut y_diff: ArrayViewMut2<'_, f64>,
        grad: Option<&mut Array2<f64>>,
        alpha: f64,
        l1_ratio: f64,
        n_samples: usize,
        activation: &dyn ActivationFn,
    ) -> f64 {
        let n = n_samples as f64;

        general_mat_mul(1.0, &x, theta, 0.0, &mut y_pred);
        y_pred.mapv_inplace(|z| activation.apply(z));
        Zip::from(&mut y_diff)
            .and(&y_pred)
            .and(&y_true)
            .for_each(|d, &p, &t| *d = p - t);

        let mut j = y_diff.iter().map(|d| d * d).sum::<f64>() / (2.0 * n);
        if alpha > 0.0 {
            let l1 = alpha * l1_ratio / n;
            let l2 = alpha * (1.0 - l1_ratio) / (2.0 * n);
            j += theta.iter().map(|&t| l1 * t.abs() + l2 * t * t).sum::<f64>();
        }

        if let Some(grad) = grad {
            let xt = x.t();
            general_mat_mul(1.0 / n, &xt, &y_diff.view(), 0.0, grad);
            if alpha > 0.0 {
                let l1 = alpha * l1_ratio / n;
                let l2 = alpha * (1.0 - l1_ratio) / n;
                grad.zip_mut_with(theta, |g, &t| *g += l1 * sign(t) + l2 * t);
            }
        }
        j
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}
