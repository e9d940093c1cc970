use std::path::PathBuf;

use thiserror::Error;

/// Structural failures of graph construction or relaxation.
///
/// Recoverable conditions (degenerate edges, hitting the iteration cap) are
/// reported as [`RelaxationWarning`](crate::RelaxationWarning)s instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("at least 2 scans are required to build a pose graph, got {count}")]
    InsufficientScans { count: usize },

    #[error("normal equations are not positive definite at iteration {iteration}; the pose graph is disconnected or has a node without information")]
    SingularSystem { iteration: usize },

    #[error("edge {from}->{to} references a node outside 0..{node_count}")]
    EdgeOutOfBounds {
        from: usize,
        to: usize,
        node_count: usize,
    },

    #[error("block index out of bounds: row={row}, col={col}, nrows={nrows}")]
    BlockIndexOutOfBounds { row: usize, col: usize, nrows: usize },

    #[error("vector length mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}
