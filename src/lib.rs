//! Lu-Milios global relaxation of closed-loop range scans.
//!
//! Give [`relax_scans`] an ordered set of scans that start and end at the same
//! place, together with rough initial poses, and it returns corrected poses
//! that agree with every pairwise scan alignment around the loop, including
//! the closing one. The first pose is the anchor and is returned unchanged.
//!
//! ```no_run
//! use lumgraph::{relax_scans, PointCloud, Pose, RelaxationConfig, ScanSet};
//!
//! # fn scans() -> Vec<(PointCloud, Pose)> { Vec::new() }
//! let scans: ScanSet = scans().into_iter().collect();
//! let output = relax_scans(&scans, &RelaxationConfig::default())?;
//! for pose in &output.poses {
//!     println!("{pose}");
//! }
//! # Ok::<(), lumgraph::LumError>(())
//! ```

#![forbid(unsafe_code)]

use log::info;

pub use lumgraph_core::{wrap_angle, PointCloud, PointXYZ, Pose, ScanSet, ScanSetError};
pub use lumgraph_graph::{
    BuiltGraph, ConfigError, ConvergenceWarning, CorrespondenceConfig, DegenerateEdgeWarning,
    EdgeKind, EdgeResidual, GlobalRelaxation, GraphError, LinearSolverKind, PoseGraph,
    PoseGraphBuilder, PoseGraphEdge, PoseGraphNode, RelaxationConfig, RelaxationReport,
    RelaxationStatus, RelaxationWarning, SolverConfig, SolverState, ANCHOR_NODE,
};
pub use lumgraph_registration::{Correspondence, CorrespondenceEstimator};
pub use lumgraph_spatial::KdTree;

#[derive(Debug, thiserror::Error)]
pub enum LumError {
    #[error(transparent)]
    ScanSet(#[from] ScanSetError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// One scan and its initial pose estimate.
#[derive(Debug, Clone)]
pub struct ScanInput {
    pub cloud: PointCloud,
    pub pose: Pose,
}

/// Corrected poses, index-aligned with the input scans.
#[derive(Debug, Clone)]
pub struct RelaxationOutput {
    pub poses: Vec<Pose>,
    pub status: RelaxationStatus,
    pub report: RelaxationReport,
    /// Degenerate-edge warnings from graph construction followed by any
    /// solver warnings.
    pub warnings: Vec<RelaxationWarning>,
}

/// Build the closed-loop pose graph for `scans` and relax it.
pub fn relax_scans(
    scans: &ScanSet,
    config: &RelaxationConfig,
) -> Result<RelaxationOutput, LumError> {
    config.validate()?;

    let BuiltGraph {
        mut graph,
        mut warnings,
    } = PoseGraphBuilder::new(config.correspondence.clone()).build(scans)?;

    let report = GlobalRelaxation::new(config.solver.clone()).run(&mut graph)?;
    warnings.extend(report.warnings.iter().cloned());

    info!(
        "relaxed {} scans: {:?} after {} iterations, {} warnings",
        scans.len(),
        report.status,
        report.iterations,
        warnings.len()
    );

    Ok(RelaxationOutput {
        poses: graph.poses(),
        status: report.status,
        report,
        warnings,
    })
}

/// [`relax_scans`] over a slice of `(cloud, pose)` inputs.
pub fn relax(inputs: &[ScanInput], config: &RelaxationConfig) -> Result<RelaxationOutput, LumError> {
    let scans: ScanSet = inputs
        .iter()
        .map(|input| (input.cloud.clone(), input.pose))
        .collect();
    relax_scans(&scans, config)
}
