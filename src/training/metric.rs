//! Regression metrics used internally by the training loops.

use ndarray::ArrayView2;

/// Mean squared error over every (sample, output) element.
pub fn mean_squared_error(y_true: ArrayView2<'_, f64>, y_pred: ArrayView2<'_, f64>) -> f64 {
    debug_assert_eq!(y_true.dim(), y_pred.dim());
    let n = y_true.len();
    if n == 0 {
        return 0.0;
    }
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(&t, &p)| (p - t) * (p - t))
        .sum::<f64>()
        / n as f64
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::array;

    use super::*;

    #[test]
    fn averages_over_samples_and_outputs() {
        let y_true = array![[1.0, 0.0], [0.0, 2.0]];
        let y_pred = array![[0.0, 0.0], [0.0, 0.0]];
        assert_relative_eq!(mean_squared_error(y_true.view(), y_pred.view()), 1.25);
    }

    #[test]
    fn zero_for_identical_inputs() {
        let y = array![[0.5], [1.5]];
        assert_eq!(mean_squared_error(y.view(), y.view()), 0.0);
    }
}
