//! Cosine similarity and distance.
//!
//! Every distance in the crate goes through these functions. Quantized
//! vectors are upcast to f32 by the store before they reach here. Sums are
//! accumulated in f64 so squared norms of large finite components cannot
//! overflow.

/// Cosine similarity between two vectors.
///
/// Returns 0.0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

    let mut dot_product = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot_product / (norm_a.sqrt() * norm_b.sqrt())) as f32
    }
}

/// Cosine distance, `1 - cosine_similarity(a, b)`.
///
/// Lies in `[0, 2]`; identical directions give 0 and a zero vector gives 1.
/// A NaN input yields NaN rather than a fabricated distance.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    // Rounding can push similarity a hair past 1.0
    (1.0 - cosine_similarity(a, b)).clamp(0.0, 2.0)
}

/// Scales a vector to unit length in place. Zero vectors are left unchanged.
pub fn normalize(vector: &mut [f32]) {
    let magnitude = vector
        .iter()
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        .sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value = (f64::from(*value) / magnitude) as f32;
        }
    }
}
