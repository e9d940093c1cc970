//! Caller-supplied relaxation parameters.
//!
//! Every field has a default, so a YAML file only needs the values it wants
//! to change:
//!
//! ```yaml
//! correspondence:
//!   max_correspondence_distance: 0.5
//!   min_correspondences: 10
//! solver:
//!   max_iterations: 50
//!   convergence_threshold: 1.0e-8
//!   linear_solver: conjugate_gradient
//! ```

use std::path::Path;

use lumgraph_registration::AlignmentParams;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How each edge's correspondences and information weight are derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrespondenceConfig {
    /// Matches farther apart than this (in cloud units) are discarded.
    pub max_correspondence_distance: f32,
    /// Edges with fewer correspondences are flagged degenerate and down-weighted.
    pub min_correspondences: usize,
    /// Correspondence/alignment rounds per edge. 1 means a single pass.
    pub refinement_iterations: usize,
    /// Stop refining an edge once its RMSE changes by less than this.
    pub refinement_tolerance: f32,
    /// Weight multiplier for edges below `min_correspondences`.
    pub degenerate_weight_scale: f64,
    /// Lower bound on the residual variance used in the weight, so perfectly
    /// aligned pairs do not get infinite weight.
    pub variance_floor: f64,
}

impl Default for CorrespondenceConfig {
    fn default() -> Self {
        Self {
            max_correspondence_distance: 1.0,
            min_correspondences: 3,
            refinement_iterations: 1,
            refinement_tolerance: 1e-6,
            degenerate_weight_scale: 1e-3,
            variance_floor: 1e-4,
        }
    }
}

impl CorrespondenceConfig {
    pub fn alignment_params(&self) -> AlignmentParams {
        AlignmentParams {
            max_correspondence_distance: self.max_correspondence_distance,
            refinement_iterations: self.refinement_iterations,
            tolerance: self.refinement_tolerance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearSolverKind {
    /// Cholesky factorisation of the assembled normal equations.
    #[default]
    Cholesky,
    /// Block-Jacobi preconditioned conjugate gradient on the block-sparse system.
    ConjugateGradient,
}

/// Iteration control for the global relaxation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub max_iterations: usize,
    /// Iteration stops once the norm of the full correction vector is below this.
    pub convergence_threshold: f64,
    pub linear_solver: LinearSolverKind,
    pub pcg_max_iterations: usize,
    pub pcg_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            convergence_threshold: 1e-6,
            linear_solver: LinearSolverKind::Cholesky,
            pcg_max_iterations: 200,
            pcg_tolerance: 1e-10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaxationConfig {
    pub correspondence: CorrespondenceConfig,
    pub solver: SolverConfig,
}

impl RelaxationConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.correspondence;
        if c.max_correspondence_distance.is_nan() || c.max_correspondence_distance <= 0.0 {
            return Err(invalid(
                "correspondence.max_correspondence_distance",
                format!("must be positive, got {}", c.max_correspondence_distance),
            ));
        }
        if c.refinement_iterations == 0 {
            return Err(invalid(
                "correspondence.refinement_iterations",
                "must be at least 1".to_string(),
            ));
        }
        if !(c.degenerate_weight_scale >= 0.0 && c.degenerate_weight_scale <= 1.0) {
            return Err(invalid(
                "correspondence.degenerate_weight_scale",
                format!("must lie in [0, 1], got {}", c.degenerate_weight_scale),
            ));
        }
        if !(c.variance_floor.is_finite() && c.variance_floor > 0.0) {
            return Err(invalid(
                "correspondence.variance_floor",
                format!("must be positive and finite, got {}", c.variance_floor),
            ));
        }

        let s = &self.solver;
        if s.max_iterations == 0 {
            return Err(invalid("solver.max_iterations", "must be at least 1".to_string()));
        }
        if !(s.convergence_threshold.is_finite() && s.convergence_threshold > 0.0) {
            return Err(invalid(
                "solver.convergence_threshold",
                format!("must be positive and finite, got {}", s.convergence_threshold),
            ));
        }
        if s.linear_solver == LinearSolverKind::ConjugateGradient && s.pcg_max_iterations == 0 {
            return Err(invalid(
                "solver.pcg_max_iterations",
                "must be at least 1 for the conjugate gradient solver".to_string(),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}
