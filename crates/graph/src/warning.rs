use std::fmt;

use crate::graph::EdgeKind;

/// An edge whose correspondence set was too small to constrain it properly.
/// The edge is kept with a reduced (possibly zero) information weight.
#[derive(Debug, Clone, PartialEq)]
pub struct DegenerateEdgeWarning {
    pub source: usize,
    pub target: usize,
    pub kind: EdgeKind,
    pub correspondences: usize,
    pub min_required: usize,
}

/// The solver hit its iteration cap before the correction norm dropped below
/// the convergence threshold. The poses are still usable.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceWarning {
    pub iterations: usize,
    pub correction_norm: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelaxationWarning {
    DegenerateEdge(DegenerateEdgeWarning),
    Convergence(ConvergenceWarning),
}

impl fmt::Display for DegenerateEdgeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "degenerate {} edge {}->{}: {} correspondences (minimum {})",
            self.kind, self.source, self.target, self.correspondences, self.min_required
        )
    }
}

impl fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "relaxation stopped after {} iterations with correction norm {:.3e} (threshold {:.3e})",
            self.iterations, self.correction_norm, self.threshold
        )
    }
}

impl fmt::Display for RelaxationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelaxationWarning::DegenerateEdge(w) => w.fmt(f),
            RelaxationWarning::Convergence(w) => w.fmt(f),
        }
    }
}
