//! Stochastic gradient update rules.
//!
//! One contract, five variants:
//!
//! - plain/momentum SGD with a time-decayed learning rate
//! - Adagrad: per-parameter rates from accumulated squared gradients
//! - RMSProp: per-parameter rates from a decayed squared-gradient average
//! - Adadelta: rate-free updates from matched update/gradient averages
//! - Adam: bias-corrected first/second moment estimates
//!
//! All variants operate elementwise on a `(n_features, n_outputs)` parameter
//! matrix, with output columns treated independently. Gradient clipping, when
//! enabled, bounds each gradient column's L2 norm before any variant-specific
//! computation.

use std::fmt;

use ndarray::{Array2, ArrayView2, Zip};

use super::store::ParameterStore;
use super::OptimError;

// =============================================================================
// Method selection
// =============================================================================

/// Update-rule variant. Exactly one is active per optimizer.
///
/// Variant-specific hyperparameters travel with the variant; the shared ones
/// (step size, momentum, clipping, epsilon) live on [`SgdOptimizer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Method {
    /// Plain SGD; combine with `momentum > 0` for momentum SGD.
    Sgd,
    /// Adagrad with non-decaying squared-gradient accumulation.
    Adagrad,
    /// RMSProp with decay factor `gamma`.
    RmsProp { gamma: f64 },
    /// Adadelta with decay factor `gamma`.
    Adadelta { gamma: f64 },
    /// Adam with exponential moment decay rates `beta1`, `beta2`.
    Adam { beta1: f64, beta2: f64 },
}

/// Per-variant accumulators, allocated by `bind` and sized like Theta.
#[derive(Debug, Clone)]
enum MethodState {
    Sgd,
    Adagrad {
        grad_sq: Array2<f64>,
    },
    RmsProp {
        gamma: f64,
        grad_sq: Array2<f64>,
    },
    Adadelta {
        gamma: f64,
        grad_sq: Array2<f64>,
        update_sq: Array2<f64>,
    },
    Adam {
        beta1: f64,
        beta2: f64,
        m: Array2<f64>,
        v: Array2<f64>,
    },
}

/// Shared scalar hyperparameters, copied out of the optimizer so the bound
/// state can advance without borrowing it.
#[derive(Debug, Clone, Copy)]
struct Hyper {
    step_size: f64,
    momentum: f64,
    gradient_clipping: f64,
    epsilon: f64,
}

// =============================================================================
// Bound state
// =============================================================================

/// Buffers allocated when the rule is bound to a parameter shape.
#[derive(Debug, Clone)]
struct BoundState {
    n_features: usize,
    n_outputs: usize,
    /// Number of updates applied so far. Kept as f64 because it feeds the
    /// decayed learning rate and Adam's bias-correction exponents directly.
    time_step: f64,
    prev_update: Array2<f64>,
    update: Array2<f64>,
    accum: MethodState,
}

impl BoundState {
    fn check_grad_shape(&self, got: (usize, usize)) -> Result<(), OptimError> {
        let expected = (self.n_features, self.n_outputs);
        if got != expected {
            return Err(OptimError::ShapeMismatch { expected, got });
        }
        Ok(())
    }

    /// One update step: advances the time step, fills `self.update` and
    /// refreshes the variant accumulators and the momentum buffer.
    fn advance(&mut self, grad: ArrayView2<'_, f64>, hp: Hyper) {
        self.time_step += 1.0;
        let t = self.time_step;
        let (n_features, n_outputs) = (self.n_features, self.n_outputs);

        // Time-decayed rate used by plain SGD and Adadelta's first step.
        let eta = hp.step_size * 100.0 / (100.0 + t);

        let col_norms: Option<Vec<f64>> = (hp.gradient_clipping > 0.0).then(|| {
            (0..n_outputs)
                .map(|o| grad.column(o).iter().map(|g| g * g).sum::<f64>().sqrt())
                .collect()
        });
        // Scales an entry so its column's L2 norm stays within the clip value.
        let clipped = |j: usize, o: usize| -> f64 {
            let g = grad[[j, o]];
            match &col_norms {
                Some(norms) if norms[o] > hp.gradient_clipping => {
                    g * hp.gradient_clipping / norms[o]
                }
                _ => g,
            }
        };

        match &mut self.accum {
            MethodState::Sgd => {
                let scale = eta / t.sqrt();
                for j in 0..n_features {
                    for o in 0..n_outputs {
                        self.update[[j, o]] = -scale * clipped(j, o);
                    }
                }
            }
            MethodState::Adagrad { grad_sq } => {
                for j in 0..n_features {
                    for o in 0..n_outputs {
                        let g = clipped(j, o);
                        let mut eta_jo = hp.step_size;
                        if t > 1.0 {
                            eta_jo /= grad_sq[[j, o]].sqrt() + hp.epsilon;
                        }
                        self.update[[j, o]] = -eta_jo * g;
                        grad_sq[[j, o]] += g * g;
                    }
                }
            }
            MethodState::RmsProp { gamma, grad_sq } => {
                // The update uses the pre-decay accumulator; the decay is
                // applied afterwards.
                for j in 0..n_features {
                    for o in 0..n_outputs {
                        let g = clipped(j, o);
                        let g_sq = grad_sq[[j, o]];
                        let mut eta_jo = hp.step_size;
                        if t > 1.0 && g_sq.abs() > 1.0 {
                            eta_jo /= (g_sq + hp.epsilon).sqrt();
                        }
                        self.update[[j, o]] = -eta_jo * g;
                        grad_sq[[j, o]] = *gamma * g_sq + (1.0 - *gamma) * g * g;
                    }
                }
            }
            MethodState::Adadelta { gamma, grad_sq, update_sq } => {
                for j in 0..n_features {
                    for o in 0..n_outputs {
                        let g = clipped(j, o);
                        grad_sq[[j, o]] = *gamma * grad_sq[[j, o]] + (1.0 - *gamma) * g * g;
                        // The update-magnitude average is not meaningful before
                        // the first update has been seen, so step 1 falls back
                        // to the time-decayed rate.
                        let eta_jo = if t > 1.0 {
                            update_sq[[j, o]].sqrt() / (grad_sq[[j, o]] + hp.epsilon).sqrt()
                        } else {
                            eta
                        };
                        let u = -eta_jo * g;
                        self.update[[j, o]] = u;
                        update_sq[[j, o]] = *gamma * update_sq[[j, o]] + (1.0 - *gamma) * u * u;
                    }
                }
            }
            MethodState::Adam { beta1, beta2, m, v } => {
                let bias1 = 1.0 - beta1.powf(t);
                let bias2 = 1.0 - beta2.powf(t);
                for j in 0..n_features {
                    for o in 0..n_outputs {
                        let g = clipped(j, o);
                        let m_jo = *beta1 * m[[j, o]] + (1.0 - *beta1) * g;
                        let v_jo = *beta2 * v[[j, o]] + (1.0 - *beta2) * g * g;
                        m[[j, o]] = m_jo;
                        v[[j, o]] = v_jo;
                        let m_hat = m_jo / bias1;
                        let v_hat = v_jo / bias2;
                        self.update[[j, o]] = -hp.step_size * m_hat / (v_hat.sqrt() + hp.epsilon);
                    }
                }
            }
        }

        if hp.momentum > 0.0 {
            Zip::from(&mut self.update)
                .and(&self.prev_update)
                .for_each(|u, &p| *u += hp.momentum * p);
        }
        self.prev_update.assign(&self.update);
    }
}

// =============================================================================
// SgdOptimizer
// =============================================================================

/// Stateful per-parameter update rule over a `(n_features, n_outputs)` matrix.
///
/// Lifecycle: construct via a factory ([`SgdOptimizer::adam`] etc.), hand it
/// Theta with [`set_theta`](Self::set_theta) (which binds the rule to Theta's
/// shape and allocates all variant buffers), then call
/// [`update_params`](Self::update_params) once per gradient. Binding resets the
/// time step and every accumulator, so a rule value can be reused across fits
/// by rebinding.
#[derive(Debug, Clone)]
pub struct SgdOptimizer {
    /// Base learning rate, used by every variant.
    pub step_size: f64,
    /// Momentum blend applied to the previous update; meaningful for plain SGD.
    pub momentum: f64,
    /// If > 0, gradient columns are clipped to this L2 norm before use.
    pub gradient_clipping: f64,
    /// Division-by-zero guard for the adaptive variants.
    pub epsilon: f64,
    /// Active variant.
    pub method: Method,

    state: Option<BoundState>,
    store: Option<ParameterStore>,
}

impl SgdOptimizer {
    fn with_method(method: Method) -> Self {
        Self {
            step_size: 1e-4,
            momentum: 0.9,
            gradient_clipping: 0.0,
            epsilon: 1e-8,
            method,
            state: None,
            store: None,
        }
    }

    /// Plain/momentum SGD: step size 1e-4, momentum 0.9.
    pub fn sgd() -> Self {
        Self::with_method(Method::Sgd)
    }

    /// Adagrad: step size 0.5, no momentum, gradient clipping at 10.
    pub fn adagrad() -> Self {
        let mut s = Self::with_method(Method::Adagrad);
        s.step_size = 0.5;
        s.momentum = 0.0;
        s.gradient_clipping = 10.0;
        s
    }

    /// Adadelta: decay 0.9, no momentum. The step size only matters for the
    /// first update, before the update-magnitude average is populated.
    pub fn adadelta() -> Self {
        let mut s = Self::with_method(Method::Adadelta { gamma: 0.9 });
        s.momentum = 0.0;
        s
    }

    /// RMSProp: step size 0.05, decay 0.9, no momentum.
    pub fn rmsprop() -> Self {
        let mut s = Self::with_method(Method::RmsProp { gamma: 0.9 });
        s.step_size = 0.05;
        s.momentum = 0.0;
        s
    }

    /// Adam: step size 0.5, beta1 0.9, beta2 0.999.
    pub fn adam() -> Self {
        let mut s = Self::with_method(Method::Adam {
            beta1: 0.9,
            beta2: 0.999,
        });
        s.step_size = 0.5;
        s.momentum = 0.0;
        s
    }

    /// Constructs a variant by name: `sgd`, `adagrad`, `adadelta`, `rmsprop`
    /// or `adam`.
    pub fn from_name(name: &str) -> Result<Self, OptimError> {
        match name {
            "sgd" => Ok(Self::sgd()),
            "adagrad" => Ok(Self::adagrad()),
            "adadelta" => Ok(Self::adadelta()),
            "rmsprop" => Ok(Self::rmsprop()),
            "adam" => Ok(Self::adam()),
            _ => Err(OptimError::UnknownMethod {
                name: name.to_owned(),
            }),
        }
    }

    /// Variant name without hyperparameters.
    pub fn name(&self) -> &'static str {
        match self.method {
            Method::Sgd => "sgd",
            Method::Adagrad => "adagrad",
            Method::RmsProp { .. } => "rmsprop",
            Method::Adadelta { .. } => "adadelta",
            Method::Adam { .. } => "adam",
        }
    }

    // -------------------------------------------------------------------------
    // Binding and parameter ownership
    // -------------------------------------------------------------------------

    /// Two-phase initialization: allocates every buffer the active variant
    /// needs for the given shape and resets the time step.
    ///
    /// Adagrad-family squared-gradient accumulators start at `epsilon` and
    /// Adadelta's update-magnitude accumulator starts at 1, so their first
    /// normalized steps are well defined.
    pub fn bind(&mut self, n_features: usize, n_outputs: usize) {
        let shape = (n_features, n_outputs);
        let accum = match self.method {
            Method::Sgd => MethodState::Sgd,
            Method::Adagrad => MethodState::Adagrad {
                grad_sq: Array2::from_elem(shape, self.epsilon),
            },
            Method::RmsProp { gamma } => MethodState::RmsProp {
                gamma,
                grad_sq: Array2::from_elem(shape, self.epsilon),
            },
            Method::Adadelta { gamma } => MethodState::Adadelta {
                gamma,
                grad_sq: Array2::from_elem(shape, self.epsilon),
                update_sq: Array2::from_elem(shape, 1.0),
            },
            Method::Adam { beta1, beta2 } => MethodState::Adam {
                beta1,
                beta2,
                m: Array2::zeros(shape),
                v: Array2::zeros(shape),
            },
        };
        self.state = Some(BoundState {
            n_features,
            n_outputs,
            time_step: 0.0,
            prev_update: Array2::zeros(shape),
            update: Array2::zeros(shape),
            accum,
        });
    }

    /// Takes ownership of Theta and binds the rule to its shape.
    ///
    /// Must be called before the first [`update_params`](Self::update_params).
    pub fn set_theta(&mut self, theta: Array2<f64>) {
        let (n_features, n_outputs) = theta.dim();
        self.bind(n_features, n_outputs);
        self.store = Some(ParameterStore::new(theta));
    }

    /// Read access to Theta, available any time after `set_theta`.
    pub fn theta(&self) -> Option<&Array2<f64>> {
        self.store.as_ref().map(ParameterStore::theta)
    }

    /// Hands Theta back to the caller, ending this fit's parameter ownership.
    pub fn take_theta(&mut self) -> Option<Array2<f64>> {
        self.store.take().map(ParameterStore::into_theta)
    }

    /// Number of updates applied since the last bind.
    pub fn time_step(&self) -> u64 {
        self.state.as_ref().map_or(0, |s| s.time_step as u64)
    }

    fn hyper(&self) -> Hyper {
        Hyper {
            step_size: self.step_size,
            momentum: self.momentum,
            gradient_clipping: self.gradient_clipping,
            epsilon: self.epsilon,
        }
    }

    // -------------------------------------------------------------------------
    // Updates
    // -------------------------------------------------------------------------

    /// Computes the update the next [`update_params`](Self::update_params)
    /// call would apply, without touching Theta, the accumulators or the time
    /// step. Calling it repeatedly with the same gradient yields identical
    /// results.
    pub fn get_update(
        &self,
        update: &mut Array2<f64>,
        grad: ArrayView2<'_, f64>,
    ) -> Result<(), OptimError> {
        let hp = self.hyper();
        let state = self.state.as_ref().ok_or(OptimError::NotBound)?;
        state.check_grad_shape(grad.dim())?;
        state.check_grad_shape(update.dim())?;
        let mut probe = state.clone();
        probe.advance(grad, hp);
        update.assign(&probe.update);
        Ok(())
    }

    /// Computes the update for `grad` and adds it into Theta in place,
    /// advancing the time step and the variant accumulators.
    pub fn update_params(&mut self, grad: ArrayView2<'_, f64>) -> Result<(), OptimError> {
        let hp = self.hyper();
        let state = self.state.as_mut().ok_or(OptimError::NotBound)?;
        let store = self.store.as_mut().ok_or(OptimError::NotBound)?;
        state.check_grad_shape(grad.dim())?;
        state.advance(grad, hp);
        store.apply_update(&state.update);
        Ok(())
    }

    /// Advances the rule one step without owning Theta and exposes the
    /// computed update, for drivers that keep parameters externally (the
    /// iterative-method adapter).
    pub(crate) fn step_update(
        &mut self,
        grad: ArrayView2<'_, f64>,
    ) -> Result<&Array2<f64>, OptimError> {
        let hp = self.hyper();
        let state = self.state.as_mut().ok_or(OptimError::NotBound)?;
        state.check_grad_shape(grad.dim())?;
        state.advance(grad, hp);
        Ok(&state.update)
    }
}

impl fmt::Display for SgdOptimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.method {
            Method::Sgd => write!(
                f,
                "sgd step_size:{} momentum:{}",
                self.step_size, self.momentum
            ),
            Method::Adagrad => write!(f, "adagrad"),
            Method::RmsProp { gamma } => write!(f, "rmsprop gamma:{gamma}"),
            Method::Adadelta { gamma } => write!(f, "adadelta gamma:{gamma}"),
            Method::Adam { .. } => write!(f, "adam"),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::Array2;

    use super::*;

    fn bound(mut opt: SgdOptimizer, shape: (usize, usize)) -> SgdOptimizer {
        opt.set_theta(Array2::zeros(shape));
        opt
    }

    #[test]
    fn update_before_bind_fails() {
        let mut opt = SgdOptimizer::sgd();
        let grad = Array2::from_elem((2, 1), 1.0);
        assert_eq!(opt.update_params(grad.view()), Err(OptimError::NotBound));
    }

    #[test]
    fn grad_shape_mismatch_fails_fast() {
        let mut opt = bound(SgdOptimizer::adam(), (3, 2));
        let grad = Array2::from_elem((2, 3), 1.0);
        let err = opt.update_params(grad.view()).unwrap_err();
        assert_eq!(
            err,
            OptimError::ShapeMismatch {
                expected: (3, 2),
                got: (2, 3),
            }
        );
        // The failed call must not have advanced the rule.
        assert_eq!(opt.time_step(), 0);
    }

    #[test]
    fn from_name_rejects_unknown() {
        assert!(SgdOptimizer::from_name("adam").is_ok());
        let err = SgdOptimizer::from_name("lbfgs").unwrap_err();
        assert_eq!(
            err,
            OptimError::UnknownMethod {
                name: "lbfgs".to_owned(),
            }
        );
    }

    #[test]
    fn display_names_variants() {
        assert_eq!(SgdOptimizer::adagrad().to_string(), "adagrad");
        assert_eq!(SgdOptimizer::rmsprop().to_string(), "rmsprop gamma:0.9");
        assert_eq!(SgdOptimizer::adam().to_string(), "adam");
        assert!(SgdOptimizer::sgd().to_string().starts_with("sgd step_size:"));
    }

    #[test]
    fn first_sgd_update_uses_decayed_rate() {
        let mut opt = SgdOptimizer::sgd();
        opt.step_size = 1.0;
        opt.momentum = 0.0;
        let mut opt = bound(opt, (1, 1));
        let grad = Array2::from_elem((1, 1), 2.0);
        opt.update_params(grad.view()).unwrap();
        // -step * 100/(100+1) * g / sqrt(1)
        let expected = -1.0 * 100.0 / 101.0 * 2.0;
        assert_relative_eq!(opt.theta().unwrap()[[0, 0]], expected, max_relative = 1e-12);
    }

    #[test]
    fn momentum_blends_previous_update() {
        let mut opt = SgdOptimizer::sgd();
        opt.step_size = 1.0;
        opt.momentum = 0.5;
        opt.bind(1, 1);
        let grad = Array2::from_elem((1, 1), 1.0);
        let mut u1 = Array2::zeros((1, 1));
        opt.get_update(&mut u1, grad.view()).unwrap();
        opt.set_theta(Array2::zeros((1, 1)));
        opt.update_params(grad.view()).unwrap();
        let first = opt.theta().unwrap()[[0, 0]];
        assert_relative_eq!(first, u1[[0, 0]], max_relative = 1e-12);

        opt.update_params(grad.view()).unwrap();
        let second_update = opt.theta().unwrap()[[0, 0]] - first;
        // raw second step plus momentum * first update
        let raw = -(100.0 / 102.0) / 2.0_f64.sqrt();
        assert_relative_eq!(second_update, raw + 0.5 * first, max_relative = 1e-12);
    }

    #[test]
    fn adagrad_accumulates_squared_gradients() {
        let mut opt = bound(SgdOptimizer::adagrad(), (1, 1));
        let grad = Array2::from_elem((1, 1), 2.0);
        // Step 1: no normalization yet.
        opt.update_params(grad.view()).unwrap();
        let theta1 = opt.theta().unwrap()[[0, 0]];
        assert_relative_eq!(theta1, -0.5 * 2.0, max_relative = 1e-12);
        // Step 2: rate divided by sqrt(accumulated g^2) + eps.
        opt.update_params(grad.view()).unwrap();
        let step2 = opt.theta().unwrap()[[0, 0]] - theta1;
        let accum: f64 = 1e-8 + 4.0;
        let expected = -(0.5 / (accum.sqrt() + 1e-8)) * 2.0;
        assert_relative_eq!(step2, expected, max_relative = 1e-9);
    }

    #[test]
    fn rmsprop_keeps_flat_rate_for_small_accumulator() {
        let mut opt = bound(SgdOptimizer::rmsprop(), (1, 1));
        let grad = Array2::from_elem((1, 1), 0.5);
        opt.update_params(grad.view()).unwrap();
        opt.update_params(grad.view()).unwrap();
        // Accumulator stays below 1, so both steps use the raw step size.
        let expected = 2.0 * -0.05 * 0.5;
        assert_relative_eq!(opt.theta().unwrap()[[0, 0]], expected, max_relative = 1e-9);
    }

    #[test]
    fn get_update_is_pure_and_repeatable() {
        let mut opt = bound(SgdOptimizer::adam(), (2, 2));
        let grad = Array2::from_elem((2, 2), 0.3);
        let mut u1 = Array2::zeros((2, 2));
        let mut u2 = Array2::zeros((2, 2));
        opt.get_update(&mut u1, grad.view()).unwrap();
        opt.get_update(&mut u2, grad.view()).unwrap();
        assert_eq!(u1, u2);
        assert_eq!(opt.time_step(), 0);

        // The preview matches the applied update exactly.
        opt.update_params(grad.view()).unwrap();
        assert_eq!(opt.time_step(), 1);
        let theta = opt.theta().unwrap();
        for (t, u) in theta.iter().zip(u1.iter()) {
            assert_eq!(t, u);
        }
    }

    #[test]
    fn rebind_resets_state() {
        let mut opt = bound(SgdOptimizer::adagrad(), (2, 1));
        let grad = Array2::from_elem((2, 1), 1.0);
        opt.update_params(grad.view()).unwrap();
        assert_eq!(opt.time_step(), 1);
        opt.set_theta(Array2::zeros((2, 1)));
        assert_eq!(opt.time_step(), 0);
    }
}
