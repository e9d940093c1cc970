//! Pose graph construction and Lu-Milios style global relaxation.
//!
//! A [`PoseGraphBuilder`] turns an ordered [`ScanSet`](lumgraph_core::ScanSet)
//! into a closed loop of relative-pose constraints, one per adjacent scan pair
//! plus one loop closure from the last scan back to the first. The
//! [`GlobalRelaxation`] solver then adjusts every pose except the anchor
//! (node 0) jointly until the corrections vanish.

#![forbid(unsafe_code)]

pub mod builder;
pub mod config;
pub mod error;
pub mod graph;
pub mod linear;
pub mod residual;
pub mod solver;
pub mod sparse;
pub mod warning;

pub use builder::{information_weight, BuiltGraph, PoseGraphBuilder};
pub use config::{CorrespondenceConfig, LinearSolverKind, RelaxationConfig, SolverConfig};
pub use error::{ConfigError, GraphError};
pub use graph::{EdgeKind, PoseGraph, PoseGraphEdge, PoseGraphNode, ANCHOR_NODE};
pub use linear::{solve_cholesky, solve_pcg, PcgResult};
pub use residual::{edge_error, edge_jacobians, retract};
pub use solver::{
    EdgeResidual, GlobalRelaxation, RelaxationReport, RelaxationStatus, SolverState,
};
pub use sparse::BlockCsr6x6;
pub use warning::{ConvergenceWarning, DegenerateEdgeWarning, RelaxationWarning};
