//! Activation functions and numerically-guarded array math.

use ndarray::{Array1, ArrayView1};

/// ReLU activation: `max(0, x)`.
#[inline]
pub fn relu(x: f32) -> f32 {
    if x > 0.0 {
        x
    } else {
        0.0
    }
}

/// Derivative of ReLU: 1 for positive inputs, 0 otherwise.
#[inline]
pub fn d_relu(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Dot product with saturating accumulation.
///
/// Accumulates `sum += w_i * x_i` term by term. If a partial sum turns
/// non-finite (overflow to ±∞, or NaN from a pathological product), it is
/// replaced by `f32::MAX` when the preceding partial sum was non-negative and
/// `f32::MIN` when it was negative, and accumulation continues from that
/// clamped value. Callers therefore always receive a finite number.
///
/// # Panics
///
/// Panics if the two views have different lengths; layer shapes are fixed at
/// construction, so mismatched lengths indicate a programming error.
pub fn saturating_dot(row: ArrayView1<f32>, x: ArrayView1<f32>) -> f32 {
    assert_eq!(row.len(), x.len(), "dot product length mismatch");

    let mut sum = 0.0f32;
    for (&w, &v) in row.iter().zip(x.iter()) {
        let prev = sum;
        sum += w * v;
        if !sum.is_finite() {
            sum = if prev >= 0.0 { f32::MAX } else { f32::MIN };
        }
    }
    sum
}

/// Numerically stable softmax: subtract the row max before exponentiating,
/// then normalize by the sum.
///
/// The max subtraction keeps the exponentials in range even when the
/// pre-activations have been clamped to `f32::MAX` by [`saturating_dot`];
/// the largest exponent is always `exp(0) = 1`, so the sum is at least 1.
pub fn softmax(z: ArrayView1<f32>) -> Array1<f32> {
    let max = z.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut out = z.mapv(|v| (v - max).exp());
    let sum: f32 = out.sum();
    out /= sum;
    out
}

/// Index of the maximum value; on ties, the first occurrence wins.
pub fn argmax_first(v: ArrayView1<f32>) -> usize {
    let mut best = 0;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &val) in v.iter().enumerate() {
        if val > best_val {
            best = i;
            best_val = val;
        }
    }
    best
}

/// One-hot vector of the given width with a 1.0 at `index`.
pub fn one_hot(index: usize, width: usize) -> Array1<f32> {
    let mut v = Array1::zeros(width);
    v[index] = 1.0;
    v
}
