//! Shared helpers for the training loops.

use ndarray::Array2;
use rand::Rng;

/// Permutes the rows of `x` and `y` jointly and in place (Fisher-Yates),
/// keeping sample/target pairs aligned.
///
/// The permutation is drawn from the caller-supplied RNG, so epochs differ
/// while a seeded run stays reproducible.
pub fn shuffle_rows<R: Rng + ?Sized>(x: &mut Array2<f64>, y: &mut Array2<f64>, rng: &mut R) {
    let n = x.nrows();
    debug_assert_eq!(n, y.nrows());
    if n < 2 {
        return;
    }
    for i in (1..n).rev() {
        let j = rng.gen_range(0..=i);
        if i != j {
            for k in 0..x.ncols() {
                x.swap([i, k], [j, k]);
            }
            for k in 0..y.ncols() {
                y.swap([i, k], [j, k]);
            }
        }
    }
}
