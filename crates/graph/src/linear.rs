use nalgebra::{Cholesky, DVector, Matrix6};

use crate::error::GraphError;
use crate::sparse::BlockCsr6x6;

/// Near-zero threshold for PCG curvature terms.
const NEAR_ZERO: f64 = 1e-18;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PcgResult {
    pub iterations: usize,
    pub residual_norm: f64,
    pub converged: bool,
}

/// Solve `H x = b` by Cholesky factorisation of the assembled system.
///
/// The block-sparse `H` is expanded to a dense `6n x 6n` matrix before
/// factoring, so the cost is `O((6n)^3)` in the number of free nodes. That
/// is fine for loops of a few hundred scans; [`solve_pcg`] works on the
/// block-sparse form directly and scales to larger loops.
///
/// Returns `None` when `H` is not positive definite or `b` has the wrong
/// length.
pub fn solve_cholesky(h: &BlockCsr6x6, b: &DVector<f64>) -> Option<DVector<f64>> {
    if b.len() != h.dim() {
        return None;
    }
    let chol = Cholesky::new(h.to_dense())?;
    Some(chol.solve(b))
}

/// Block-Jacobi preconditioned conjugate gradient on the block-sparse system.
///
/// `x` holds the initial guess and receives the solution. A diagonal block
/// that cannot be inverted, or a direction with non-positive curvature, means
/// `H` is not positive definite and yields `None` in the outer `Option`.
pub fn solve_pcg(
    h: &BlockCsr6x6,
    b: &DVector<f64>,
    x: &mut DVector<f64>,
    max_iters: usize,
    tol: f64,
) -> Result<Option<PcgResult>, GraphError> {
    let dim = h.dim();
    if b.len() != dim {
        return Err(GraphError::DimensionMismatch {
            expected: dim,
            actual: b.len(),
        });
    }
    if x.len() != dim {
        return Err(GraphError::DimensionMismatch {
            expected: dim,
            actual: x.len(),
        });
    }

    let Some(diag_inv) = invert_diagonal_blocks(&h.diagonal_blocks()) else {
        return Ok(None);
    };

    let mut hx = DVector::zeros(dim);
    h.spmv(x, &mut hx)?;
    let mut r = b - &hx;
    let mut residual_norm = r.norm();
    if residual_norm <= tol {
        return Ok(Some(PcgResult {
            iterations: 0,
            residual_norm,
            converged: true,
        }));
    }

    let mut z = apply_preconditioner(&diag_inv, &r);
    let mut p = z.clone();
    let mut rz_old = r.dot(&z);
    let mut hp = DVector::zeros(dim);

    for iter in 0..max_iters {
        h.spmv(&p, &mut hp)?;
        let curvature = p.dot(&hp);
        if curvature <= NEAR_ZERO {
            return Ok(None);
        }

        let alpha = rz_old / curvature;
        x.axpy(alpha, &p, 1.0);
        r.axpy(-alpha, &hp, 1.0);
        residual_norm = r.norm();
        if residual_norm <= tol {
            return Ok(Some(PcgResult {
                iterations: iter + 1,
                residual_norm,
                converged: true,
            }));
        }

        z = apply_preconditioner(&diag_inv, &r);
        let rz_new = r.dot(&z);
        if rz_old.abs() < NEAR_ZERO {
            break;
        }
        let beta = rz_new / rz_old;
        p = &z + &p * beta;
        rz_old = rz_new;
    }

    Ok(Some(PcgResult {
        iterations: max_iters,
        residual_norm,
        converged: false,
    }))
}

fn apply_preconditioner(diag_inv: &[Matrix6<f64>], r: &DVector<f64>) -> DVector<f64> {
    let mut z = DVector::zeros(r.len());
    for (block_idx, inv) in diag_inv.iter().enumerate() {
        let base = block_idx * 6;
        z.fixed_rows_mut::<6>(base)
            .copy_from(&(inv * r.fixed_rows::<6>(base)));
    }
    z
}

fn invert_diagonal_blocks(diag: &[Matrix6<f64>]) -> Option<Vec<Matrix6<f64>>> {
    diag.iter().map(|block| block.cholesky().map(|c| c.inverse())).collect()
}
