//! Owned parameter storage for the duration of one fit.

use ndarray::{Array2, ArrayView2};

/// Owns the parameter matrix (Theta) while an update rule is driving it.
///
/// Theta has shape `(n_features, n_outputs)`. The store is created when the
/// rule is bound to a problem and handed back (or dropped) when the fit ends;
/// there is no cross-fit reuse.
#[derive(Debug, Clone)]
pub struct ParameterStore {
    theta: Array2<f64>,
}

impl ParameterStore {
    pub fn new(theta: Array2<f64>) -> Self {
        Self { theta }
    }

    /// Shape as `(n_features, n_outputs)`.
    pub fn dim(&self) -> (usize, usize) {
        self.theta.dim()
    }

    /// Read access for loss/gradient evaluation.
    pub fn theta(&self) -> &Array2<f64> {
        &self.theta
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.theta.view()
    }

    /// Adds an update matrix into Theta in place.
    pub fn apply_update(&mut self, update: &Array2<f64>) {
        self.theta.zip_mut_with(update, |t, &u| *t += u);
    }

    /// Shape-preserving copy with independent storage, used for
    /// best-objective snapshots.
    pub fn snapshot(&self) -> Array2<f64> {
        self.theta.clone()
    }

    /// Hands Theta back to the caller, consuming the store.
    pub fn into_theta(self) -> Array2<f64> {
        self.theta
    }
}
