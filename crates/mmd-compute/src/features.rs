//! Feature utilities: merging a P block with its paired Q block.

use mmd_core::{DenseFeatures, Error, Result};
use nalgebra::DMatrix;

/// Concatenate `p` and `q` row-wise: P samples first, then Q samples.
///
/// The estimators rely on this layout: rows `0..n_p` of the merged block are
/// the P block and the remaining rows are the Q block.
pub fn merge(p: &DenseFeatures, q: &DenseFeatures) -> Result<DenseFeatures> {
    if p.dim() != q.dim() && p.num_vectors() > 0 && q.num_vectors() > 0 {
        return Err(Error::Config(format!(
            "cannot merge blocks of different dimension ({} vs {})",
            p.dim(),
            q.dim()
        )));
    }
    let (np, nq) = (p.num_vectors(), q.num_vectors());
    let dim = p.dim().max(q.dim());
    let (pm, qm) = (p.matrix(), q.matrix());
    let merged = DMatrix::from_fn(np + nq, dim, |i, j| if i < np { pm[(i, j)] } else { qm[(i - np, j)] });
    Ok(DenseFeatures::new(merged))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_layout() {
        let p = DenseFeatures::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let q = DenseFeatures::from_rows(&[vec![5.0, 6.0]]).unwrap();
        let m = merge(&p, &q).unwrap();
        assert_eq!(m.num_vectors(), 3);
        assert_eq!(m.matrix()[(0, 1)], 2.0);
        assert_eq!(m.matrix()[(2, 0)], 5.0);
    }

    #[test]
    fn test_merge_dimension_mismatch() {
        let p = DenseFeatures::from_rows(&[vec![1.0, 2.0]]).unwrap();
        let q = DenseFeatures::from_rows(&[vec![5.0]]).unwrap();
        assert!(merge(&p, &q).is_err());
    }
}
