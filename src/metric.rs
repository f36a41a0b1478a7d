//! Distance between feature vectors.

use crate::error::{ClusterError, ClusterResult};

/// Euclidean distance between two equal-length vectors.
///
/// Fails with [`ClusterError::DimensionMismatch`] when the lengths differ.
pub fn distance(a: &[f32], b: &[f32]) -> ClusterResult<f64> {
    if a.len() != b.len() {
        return Err(ClusterError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(euclidean(a, b))
}

/// Unchecked variant for callers that validated dimensions up front.
pub(crate) fn euclidean(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Index of the closest candidate. Ties keep the lowest index: a later
/// candidate only wins with a strictly smaller distance.
pub(crate) fn nearest<'a, I>(vector: &[f32], candidates: I) -> Option<(usize, f64)>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut best: Option<(usize, f64)> = None;
    for (idx, candidate) in candidates.into_iter().enumerate() {
        let d = euclidean(candidate, vector);
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((idx, d)),
        }
    }
    best
}
