//! Minimal driver for [`IterativeMethod`] implementations.
//!
//! Runs the evaluate/iterate loop of a generic first-order local minimizer:
//! the method requests operations, the driver services them against a
//! caller-supplied [`Problem`] and tests convergence at major iterations.
//! Budget exhaustion is not an error; it is reported through
//! [`MinimizeResult::status`].

use super::adapter::{IterativeMethod, Location, Operation};
use super::OptimError;

/// Objective with a first-order oracle.
///
/// Methods take `&mut self` so implementations can reuse internal scratch
/// buffers across evaluations.
pub trait Problem {
    fn value(&mut self, x: &[f64]) -> f64;
    fn gradient(&mut self, grad: &mut [f64], x: &[f64]);
}

/// Driver termination settings.
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    /// Maximum number of function+gradient evaluations.
    pub max_evaluations: usize,
    /// Converged when the objective drops below this at a major iteration.
    pub function_threshold: f64,
    /// Converged when the gradient sup-norm drops below this at a major
    /// iteration.
    pub gradient_threshold: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_evaluations: 1000,
            function_threshold: 1e-12,
            gradient_threshold: 1e-12,
        }
    }
}

/// Why the driver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// A convergence threshold was met at a major iteration.
    Converged,
    /// The evaluation budget ran out first.
    EvaluationLimit,
    /// The objective became non-finite.
    Failed,
}

/// Terminal state of one minimization.
#[derive(Debug, Clone)]
pub struct MinimizeResult {
    pub x: Vec<f64>,
    pub f: f64,
    pub evaluations: usize,
    pub status: Status,
}

/// Minimizes `problem` from `x0` by driving `method` until convergence,
/// budget exhaustion or a non-finite objective.
pub fn minimize<P, M>(
    problem: &mut P,
    x0: Vec<f64>,
    settings: &Settings,
    method: &mut M,
) -> Result<MinimizeResult, OptimError>
where
    P: Problem,
    M: IterativeMethod,
{
    let mut loc = Location::new(x0);
    let mut op = method.init(&mut loc)?;
    let mut evaluations = 0;

    let status = loop {
        match op {
            Operation::Evaluate => {
                loc.f = problem.value(&loc.x);
                problem.gradient(&mut loc.gradient, &loc.x);
                evaluations += 1;
                if !loc.f.is_finite() {
                    break Status::Failed;
                }
            }
            Operation::MajorIteration => {
                if loc.f < settings.function_threshold {
                    break Status::Converged;
                }
                let grad_max = loc.gradient.iter().fold(0.0f64, |acc, g| acc.max(g.abs()));
                if grad_max < settings.gradient_threshold {
                    break Status::Converged;
                }
            }
        }
        if evaluations >= settings.max_evaluations {
            break Status::EvaluationLimit;
        }
        op = method.iterate(&mut loc)?;
    };

    Ok(MinimizeResult {
        x: loc.x,
        f: loc.f,
        evaluations,
        status,
    })
}
