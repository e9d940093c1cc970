use nalgebra::{DMatrix, DVector, Matrix6};

use crate::error::GraphError;

/// Block-sparse symmetric system with 6x6 blocks in compressed-row layout.
///
/// Each pose-graph edge touches at most four blocks, so a closed loop of `n`
/// scans fills `3n` blocks instead of `n^2`.
#[derive(Clone, Debug)]
pub struct BlockCsr6x6 {
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<Matrix6<f64>>,
    nrows: usize,
}

impl BlockCsr6x6 {
    pub fn new(nrows: usize) -> Self {
        Self {
            row_ptr: vec![0; nrows.saturating_add(1)],
            col_idx: Vec::new(),
            values: Vec::new(),
            nrows,
        }
    }

    /// Number of block rows.
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Scalar dimension of the system.
    pub fn dim(&self) -> usize {
        self.nrows * 6
    }

    pub fn nnz_blocks(&self) -> usize {
        self.values.len()
    }

    pub fn add_to(&mut self, row: usize, col: usize, block: &Matrix6<f64>) -> Result<(), GraphError> {
        if row >= self.nrows || col >= self.nrows {
            return Err(GraphError::BlockIndexOutOfBounds {
                row,
                col,
                nrows: self.nrows,
            });
        }
        match self.find_index(row, col) {
            Some(idx) => self.values[idx] += block,
            None => self.insert_new(row, col, *block),
        }
        Ok(())
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Matrix6<f64>> {
        let idx = self.find_index(row, col)?;
        Some(&self.values[idx])
    }

    /// `y = H * x`.
    pub fn spmv(&self, x: &DVector<f64>, y: &mut DVector<f64>) -> Result<(), GraphError> {
        let dim = self.dim();
        if x.len() != dim {
            return Err(GraphError::DimensionMismatch {
                expected: dim,
                actual: x.len(),
            });
        }
        if y.len() != dim {
            return Err(GraphError::DimensionMismatch {
                expected: dim,
                actual: y.len(),
            });
        }
        y.fill(0.0);
        for row in 0..self.nrows {
            let start = self.row_ptr[row];
            let end = self.row_ptr[row + 1];
            for idx in start..end {
                let col = self.col_idx[idx];
                let product = self.values[idx] * x.fixed_rows::<6>(col * 6);
                let mut out = y.fixed_rows_mut::<6>(row * 6);
                out += product;
            }
        }
        Ok(())
    }

    pub fn diagonal_blocks(&self) -> Vec<Matrix6<f64>> {
        (0..self.nrows)
            .map(|row| self.get(row, row).copied().unwrap_or_else(Matrix6::zeros))
            .collect()
    }

    /// Expand into a dense matrix for direct factorisation.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let dim = self.dim();
        let mut dense = DMatrix::zeros(dim, dim);
        for row in 0..self.nrows {
            for idx in self.row_ptr[row]..self.row_ptr[row + 1] {
                let col = self.col_idx[idx];
                dense
                    .fixed_view_mut::<6, 6>(row * 6, col * 6)
                    .copy_from(&self.values[idx]);
            }
        }
        dense
    }

    fn find_index(&self, row: usize, col: usize) -> Option<usize> {
        if row >= self.nrows || col >= self.nrows {
            return None;
        }
        let start = self.row_ptr[row];
        let end = self.row_ptr[row + 1];
        (start..end).find(|&idx| self.col_idx[idx] == col)
    }

    fn insert_new(&mut self, row: usize, col: usize, block: Matrix6<f64>) {
        let start = self.row_ptr[row];
        let end = self.row_ptr[row + 1];
        let insert_at = (start..end)
            .find(|&idx| self.col_idx[idx] > col)
            .unwrap_or(end);

        self.col_idx.insert(insert_at, col);
        self.values.insert(insert_at, block);
        for ptr in self.row_ptr.iter_mut().skip(row + 1) {
            *ptr += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BlockCsr6x6;
    use crate::error::GraphError;
    use nalgebra::{DVector, Matrix6};

    fn scalar_block(diagonal: f64) -> Matrix6<f64> {
        Matrix6::identity() * diagonal
    }

    #[test]
    fn add_to_accumulates() {
        let mut h = BlockCsr6x6::new(3);
        h.add_to(1, 2, &scalar_block(2.0)).unwrap();
        h.add_to(1, 2, &scalar_block(3.0)).unwrap();
        assert_eq!(h.get(1, 2), Some(&scalar_block(5.0)));
        assert_eq!(h.nnz_blocks(), 1);
        assert!(h.get(2, 1).is_none());
    }

    #[test]
    fn add_to_rejects_out_of_bounds() {
        let mut h = BlockCsr6x6::new(2);
        assert_eq!(
            h.add_to(0, 2, &scalar_block(1.0)),
            Err(GraphError::BlockIndexOutOfBounds { row: 0, col: 2, nrows: 2 })
        );
    }

    #[test]
    fn spmv_matches_dense_reference() {
        let mut h = BlockCsr6x6::new(2);
        h.add_to(1, 1, &scalar_block(3.0)).unwrap();
        h.add_to(0, 1, &scalar_block(1.0)).unwrap();
        h.add_to(0, 0, &scalar_block(2.0)).unwrap();
        h.add_to(1, 0, &scalar_block(-1.0)).unwrap();

        let x = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0]);
        let mut y_sparse = DVector::zeros(12);
        h.spmv(&x, &mut y_sparse).unwrap();

        let y_dense = h.to_dense() * &x;
        for i in 0..12 {
            assert!(
                (y_sparse[i] - y_dense[i]).abs() < 1e-12,
                "mismatch at {i}: sparse={}, dense={}",
                y_sparse[i],
                y_dense[i]
            );
        }
    }

    #[test]
    fn spmv_checks_lengths() {
        let h = BlockCsr6x6::new(2);
        let x = DVector::zeros(6);
        let mut y = DVector::zeros(12);
        assert_eq!(
            h.spmv(&x, &mut y),
            Err(GraphError::DimensionMismatch { expected: 12, actual: 6 })
        );
    }

    #[test]
    fn diagonal_extraction_returns_only_diagonal_blocks() {
        let mut h = BlockCsr6x6::new(3);
        h.add_to(0, 0, &scalar_block(1.0)).unwrap();
        h.add_to(0, 1, &scalar_block(5.0)).unwrap();
        h.add_to(2, 0, &scalar_block(7.0)).unwrap();
        h.add_to(2, 2, &scalar_block(3.0)).unwrap();

        let diag = h.diagonal_blocks();
        assert_eq!(diag.len(), 3);
        assert_eq!(diag[0], scalar_block(1.0));
        assert_eq!(diag[1], Matrix6::zeros());
        assert_eq!(diag[2], scalar_block(3.0));
    }
}
