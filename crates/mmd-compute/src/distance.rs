//! Pairwise Euclidean distances.

use mmd_core::{DenseFeatures, Error, Result};
use nalgebra::DMatrix;

/// Full `n x n` Euclidean distance matrix over the rows of `features`.
pub fn euclidean_distance_matrix(features: &DenseFeatures) -> Result<DMatrix<f32>> {
    let n = features.num_vectors();
    if n == 0 {
        return Err(Error::Computation("cannot compute distances over an empty block".to_string()));
    }
    let mut out = DMatrix::<f32>::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = features.sq_distance(i, j).sqrt() as f32;
            out[(i, j)] = d;
            out[(j, i)] = d;
        }
    }
    Ok(out)
}

/// Strictly upper-triangular entries (`i < j`) of a square matrix, row by row.
pub fn upper_triangle(matrix: &DMatrix<f32>) -> Vec<f32> {
    let n = matrix.nrows();
    let mut out = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            out.push(matrix[(i, j)]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_distance_matrix() {
        let f = DenseFeatures::from_rows(&[vec![0.0, 0.0], vec![3.0, 4.0], vec![0.0, 1.0]]).unwrap();
        let d = euclidean_distance_matrix(&f).unwrap();
        assert_relative_eq!(d[(0, 1)], 5.0);
        assert_relative_eq!(d[(1, 0)], 5.0);
        assert_eq!(d[(2, 2)], 0.0);
        assert_eq!(upper_triangle(&d).len(), 3);
    }

    #[test]
    fn test_empty_block_rejected() {
        let f = DenseFeatures::from_rows(&[]).unwrap();
        assert!(euclidean_distance_matrix(&f).is_err());
    }
}
