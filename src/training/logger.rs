//! Structured training output with verbosity levels.

/// How much training progress to print.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// No output. Use this in tests and benchmarks.
    Silent,
    /// Start/finish summary and convergence events.
    #[default]
    Info,
    /// Per-epoch objective and RMSE.
    Debug,
}

/// Prints training progress according to the configured verbosity.
#[derive(Debug, Clone)]
pub struct TrainingLogger {
    verbosity: Verbosity,
}

impl TrainingLogger {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    pub fn start_training(&self, solver: &str, epochs: usize) {
        if self.verbosity >= Verbosity::Info {
            println!("[linfit] training with {solver}, epoch budget {epochs}");
        }
    }

    pub fn log_epoch(&self, epoch: usize, j: f64, rmse: f64) {
        if self.verbosity >= Verbosity::Debug {
            println!("[linfit] epoch {epoch}: J={j:.6e} rmse={rmse:.6e}");
        }
    }

    pub fn finish_training(&self, converged: bool, epochs: usize, rmse: f64) {
        if self.verbosity >= Verbosity::Info {
            let outcome = if converged { "converged" } else { "stopped" };
            println!("[linfit] {outcome} after {epochs} epochs, rmse={rmse:.6e}");
        }
    }
}
