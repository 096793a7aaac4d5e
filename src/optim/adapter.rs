//! Iterative-method protocol and the update-rule adapter.
//!
//! External minimization drivers see an optimizer as three operations:
//! `init` prepares the method and asks for the first evaluation, `iterate`
//! performs one step and requests the next operation, and `needs` declares
//! which derivatives the method consumes. [`MethodAdapter`] implements that
//! protocol on top of [`SgdOptimizer`], keeping parameters in the driver-owned
//! [`Location`] rather than in the rule itself.

use ndarray::ArrayView2;

use super::sgd::SgdOptimizer;
use super::OptimError;

// =============================================================================
// Protocol types
// =============================================================================

/// Driver-owned optimization state: the current point, its objective value and
/// gradient. Parameter matrices are flattened row-major, feature-first.
#[derive(Debug, Clone)]
pub struct Location {
    pub x: Vec<f64>,
    pub f: f64,
    pub gradient: Vec<f64>,
}

impl Location {
    pub fn new(x: Vec<f64>) -> Self {
        let gradient = vec![0.0; x.len()];
        Self {
            x,
            f: f64::INFINITY,
            gradient,
        }
    }
}

/// Operation a method requests from its driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Evaluate the objective and its gradient at `location.x`.
    Evaluate,
    /// A major iteration completed; the driver may test convergence.
    MajorIteration,
}

/// Derivative information a method requires from the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Needs {
    pub gradient: bool,
    pub hessian: bool,
}

/// Generic iterative local-minimization method.
pub trait IterativeMethod {
    /// Prepares the method for the initial location and returns the first
    /// operation to carry out.
    fn init(&mut self, loc: &mut Location) -> Result<Operation, OptimError>;

    /// Performs one step of the method, updating `loc`, and returns the next
    /// operation.
    fn iterate(&mut self, loc: &mut Location) -> Result<Operation, OptimError>;

    /// Declares the derivative information the method consumes.
    fn needs(&self) -> Needs;
}

// =============================================================================
// MethodAdapter
// =============================================================================

/// What the adapter will request from the driver next.
///
/// Each iterate applies one update step; requests then alternate between a
/// fresh evaluation and a major-iteration checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingEvaluation,
    AwaitingMajorIteration,
}

/// Drives an [`SgdOptimizer`] through the [`IterativeMethod`] protocol.
///
/// Without an explicit shape the parameter vector is treated as a single
/// column; use [`with_shape`](Self::with_shape) when the flattened vector
/// packs a multi-output matrix, so gradient clipping sees the true columns.
#[derive(Debug, Clone)]
pub struct MethodAdapter {
    rule: SgdOptimizer,
    shape: Option<(usize, usize)>,
    phase: Phase,
}

impl MethodAdapter {
    pub fn new(rule: SgdOptimizer) -> Self {
        Self {
            rule,
            shape: None,
            phase: Phase::AwaitingEvaluation,
        }
    }

    /// Declares the `(n_features, n_outputs)` shape packed into the flattened
    /// parameter vector; `init` validates the vector length against it.
    pub fn with_shape(rule: SgdOptimizer, n_features: usize, n_outputs: usize) -> Self {
        Self {
            rule,
            shape: Some((n_features, n_outputs)),
            phase: Phase::AwaitingEvaluation,
        }
    }

    pub fn rule(&self) -> &SgdOptimizer {
        &self.rule
    }
}

impl IterativeMethod for MethodAdapter {
    fn init(&mut self, loc: &mut Location) -> Result<Operation, OptimError> {
        let (n_features, n_outputs) = match self.shape {
            Some(shape) => shape,
            None => {
                let shape = (loc.x.len(), 1);
                self.shape = Some(shape);
                shape
            }
        };
        if loc.x.len() != n_features * n_outputs {
            return Err(OptimError::SizeMismatch {
                expected: (n_features, n_outputs),
                got: loc.x.len(),
            });
        }
        self.rule.bind(n_features, n_outputs);
        self.phase = Phase::AwaitingEvaluation;
        Ok(Operation::Evaluate)
    }

    fn iterate(&mut self, loc: &mut Location) -> Result<Operation, OptimError> {
        let (n_features, n_outputs) = self.shape.ok_or(OptimError::NotBound)?;
        let grad = ArrayView2::from_shape((n_features, n_outputs), &loc.gradient[..]).map_err(
            |_| OptimError::SizeMismatch {
                expected: (n_features, n_outputs),
                got: loc.gradient.len(),
            },
        )?;
        let update = self.rule.step_update(grad)?;
        for (x, u) in loc.x.iter_mut().zip(update.iter()) {
            *x += u;
        }
        let op = match self.phase {
            Phase::AwaitingEvaluation => {
                self.phase = Phase::AwaitingMajorIteration;
                Operation::Evaluate
            }
            Phase::AwaitingMajorIteration => {
                self.phase = Phase::AwaitingEvaluation;
                Operation::MajorIteration
            }
        };
        Ok(op)
    }

    fn needs(&self) -> Needs {
        Needs {
            gradient: true,
            hessian: false,
        }
    }
}
