//! Gauss-Newton relaxation of a closed-loop pose graph.
//!
//! The relaxation minimises
//!
//! ```text
//! F(x) = Σ e(Ti, Tj, Zij)^T * Ωij * e(Ti, Tj, Zij)
//! ```
//!
//! over every node except the anchor. Each iteration linearises all edges
//! around the current poses, solves
//!
//! ```text
//! H * Δx = -b
//! ```
//!
//! and applies `Ti <- exp(Δi) * Ti` to each free node.

use log::{debug, info, warn};
use lumgraph_core::Pose;
use nalgebra::{DVector, Isometry3, Matrix6, Vector6};

use crate::config::{LinearSolverKind, SolverConfig};
use crate::error::GraphError;
use crate::graph::{EdgeKind, PoseGraph, PoseGraphEdge};
use crate::linear::{solve_cholesky, solve_pcg};
use crate::residual::{chi_squared, edge_error, edge_jacobians, retract};
use crate::sparse::BlockCsr6x6;
use crate::warning::{ConvergenceWarning, RelaxationWarning};

/// Where the solver is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverState {
    #[default]
    Idle,
    Iterating { iteration: usize },
    /// Correction norm fell below the threshold.
    Converged { iterations: usize },
    /// Iteration cap hit first. Poses are still returned.
    MaxIterationsReached { iterations: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaxationStatus {
    Converged,
    /// Stopped at the iteration cap; see [`ConvergenceWarning`].
    ConvergenceWarning,
}

/// Residual of one edge at the final poses.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeResidual {
    pub source: usize,
    pub target: usize,
    pub kind: EdgeKind,
    pub translation_norm: f64,
    /// Rotation-vector norm, radians.
    pub rotation_norm: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelaxationReport {
    pub status: RelaxationStatus,
    pub iterations: usize,
    /// Norm of the last correction vector applied.
    pub final_correction_norm: f64,
    /// Weighted chi-squared error before the first iteration.
    pub initial_error: f64,
    /// Weighted chi-squared error at the returned poses.
    pub final_error: f64,
    pub edge_residuals: Vec<EdgeResidual>,
    pub warnings: Vec<RelaxationWarning>,
}

/// Iterative global relaxation with node 0 held fixed.
#[derive(Debug, Clone, Default)]
pub struct GlobalRelaxation {
    config: SolverConfig,
    state: SolverState,
}

impl GlobalRelaxation {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            state: SolverState::Idle,
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Current state. After a failed run this is the iteration that failed.
    pub fn state(&self) -> SolverState {
        self.state
    }

    /// Relax `graph` in place.
    ///
    /// Only non-fixed node poses are written, and only once the run has
    /// succeeded; on error the graph is left untouched.
    pub fn run(&mut self, graph: &mut PoseGraph) -> Result<RelaxationReport, GraphError> {
        let node_count = graph.node_count();
        if node_count < 2 {
            return Err(GraphError::InsufficientScans { count: node_count });
        }

        // Nodes with no weighted path to the anchor leave H singular, which
        // PCG does not always detect.
        if !graph.is_connected() {
            self.state = SolverState::Iterating { iteration: 1 };
            warn!("pose graph has nodes with no weighted path to the anchor");
            return Err(GraphError::SingularSystem { iteration: 1 });
        }

        // Free nodes get consecutive block indices; fixed nodes get none.
        let mut var_index = Vec::with_capacity(node_count);
        let mut num_vars = 0;
        for node in graph.nodes() {
            if node.fixed {
                var_index.push(None);
            } else {
                var_index.push(Some(num_vars));
                num_vars += 1;
            }
        }

        let mut poses: Vec<Isometry3<f64>> =
            graph.nodes().iter().map(|n| n.pose.to_isometry()).collect();
        let initial_error = total_error(graph.edges(), &poses);

        info!(
            "relaxing {} nodes ({} free), {} edges, initial error {:.6e}",
            node_count,
            num_vars,
            graph.edge_count(),
            initial_error
        );

        let mut iterations = 0;
        let mut correction_norm = 0.0;
        let mut converged = num_vars == 0;

        while !converged && iterations < self.config.max_iterations {
            iterations += 1;
            self.state = SolverState::Iterating { iteration: iterations };

            let (h, b) = linearize(graph.edges(), &poses, &var_index, num_vars)?;
            let delta = self.solve(&h, &(-b), iterations)?;

            for (pose, var) in poses.iter_mut().zip(&var_index) {
                if let Some(v) = var {
                    let step: Vector6<f64> = delta.fixed_rows::<6>(v * 6).into_owned();
                    *pose = retract(&step, pose);
                }
            }

            correction_norm = delta.norm();
            info!(
                "iteration {}: correction norm {:.6e}, error {:.6e}",
                iterations,
                correction_norm,
                total_error(graph.edges(), &poses)
            );
            converged = correction_norm < self.config.convergence_threshold;
        }

        let mut warnings = Vec::new();
        let status = if converged {
            self.state = SolverState::Converged { iterations };
            RelaxationStatus::Converged
        } else {
            self.state = SolverState::MaxIterationsReached { iterations };
            let w = ConvergenceWarning {
                iterations,
                correction_norm,
                threshold: self.config.convergence_threshold,
            };
            warn!("{w}");
            warnings.push(RelaxationWarning::Convergence(w));
            RelaxationStatus::ConvergenceWarning
        };

        for (node, pose) in graph.nodes_mut().iter_mut().zip(&poses) {
            if !node.fixed {
                node.pose = Pose::from_isometry(pose);
            }
        }

        let final_error = total_error(graph.edges(), &poses);
        let edge_residuals = graph
            .edges()
            .iter()
            .map(|edge| {
                let e = edge_error(&edge.measurement, &poses[edge.source], &poses[edge.target]);
                EdgeResidual {
                    source: edge.source,
                    target: edge.target,
                    kind: edge.kind,
                    translation_norm: e.fixed_rows::<3>(0).norm(),
                    rotation_norm: e.fixed_rows::<3>(3).norm(),
                }
            })
            .collect();

        info!(
            "relaxation finished after {} iterations ({:?}), error {:.6e} -> {:.6e}",
            iterations, status, initial_error, final_error
        );

        Ok(RelaxationReport {
            status,
            iterations,
            final_correction_norm: correction_norm,
            initial_error,
            final_error,
            edge_residuals,
            warnings,
        })
    }

    fn solve(
        &self,
        h: &BlockCsr6x6,
        rhs: &DVector<f64>,
        iteration: usize,
    ) -> Result<DVector<f64>, GraphError> {
        match self.config.linear_solver {
            LinearSolverKind::Cholesky => {
                solve_cholesky(h, rhs).ok_or(GraphError::SingularSystem { iteration })
            }
            LinearSolverKind::ConjugateGradient => {
                let mut x = DVector::zeros(h.dim());
                let result = solve_pcg(
                    h,
                    rhs,
                    &mut x,
                    self.config.pcg_max_iterations,
                    self.config.pcg_tolerance,
                )?
                .ok_or(GraphError::SingularSystem { iteration })?;
                if !result.converged {
                    debug!(
                        "pcg stopped after {} iterations, residual {:.3e}",
                        result.iterations, result.residual_norm
                    );
                }
                Ok(x)
            }
        }
    }
}

/// Accumulate `H = Σ J^T Ω J` and `b = Σ J^T Ω e` over the free nodes.
/// Edges with zero weight contribute nothing.
fn linearize(
    edges: &[PoseGraphEdge],
    poses: &[Isometry3<f64>],
    var_index: &[Option<usize>],
    num_vars: usize,
) -> Result<(BlockCsr6x6, DVector<f64>), GraphError> {
    let mut h = BlockCsr6x6::new(num_vars);
    let mut b = DVector::zeros(num_vars * 6);

    for edge in edges.iter().filter(|e| e.weight > 0.0) {
        let source = &poses[edge.source];
        let target = &poses[edge.target];
        let error = edge_error(&edge.measurement, source, target);
        let (j_source, j_target) = edge_jacobians(&edge.measurement, source, target);
        let omega: &Matrix6<f64> = &edge.information;

        let jt_omega_source = j_source.transpose() * omega;
        let jt_omega_target = j_target.transpose() * omega;

        if let Some(i) = var_index[edge.source] {
            h.add_to(i, i, &(jt_omega_source * j_source))?;
            let mut bi = b.fixed_rows_mut::<6>(i * 6);
            bi += jt_omega_source * error;
        }
        if let Some(j) = var_index[edge.target] {
            h.add_to(j, j, &(jt_omega_target * j_target))?;
            let mut bj = b.fixed_rows_mut::<6>(j * 6);
            bj += jt_omega_target * error;
        }
        if let (Some(i), Some(j)) = (var_index[edge.source], var_index[edge.target]) {
            h.add_to(i, j, &(jt_omega_source * j_target))?;
            h.add_to(j, i, &(jt_omega_target * j_source))?;
        }
    }

    Ok((h, b))
}

fn total_error(edges: &[PoseGraphEdge], poses: &[Isometry3<f64>]) -> f64 {
    edges
        .iter()
        .map(|edge| {
            let e = edge_error(&edge.measurement, &poses[edge.source], &poses[edge.target]);
            chi_squared(&e, &edge.information)
        })
        .sum()
}
