use std::fmt;

use lumgraph_core::Pose;
use nalgebra::{Isometry3, Matrix6};

use crate::error::GraphError;

/// Node whose pose is held fixed to remove the global gauge freedom.
pub const ANCHOR_NODE: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Scan `i` to scan `i + 1`.
    Sequential,
    /// Last scan back to the first.
    LoopClosure,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Sequential => f.write_str("sequential"),
            EdgeKind::LoopClosure => f.write_str("loop-closure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoseGraphNode {
    pub index: usize,
    pub pose: Pose,
    pub fixed: bool,
}

/// A relative-pose constraint between two scans.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseGraphEdge {
    pub source: usize,
    pub target: usize,
    pub kind: EdgeKind,
    /// Pose of the target scan expressed in the source scan frame.
    pub measurement: Isometry3<f64>,
    pub weight: f64,
    /// `weight * I6`, ordered translation then rotation.
    pub information: Matrix6<f64>,
    pub correspondence_count: usize,
    pub rmse: f32,
    pub degenerate: bool,
}

impl PoseGraphEdge {
    pub fn new(
        source: usize,
        target: usize,
        kind: EdgeKind,
        measurement: Isometry3<f64>,
        weight: f64,
    ) -> Self {
        Self {
            source,
            target,
            kind,
            measurement,
            weight,
            information: Matrix6::identity() * weight,
            correspondence_count: 0,
            rmse: 0.0,
            degenerate: false,
        }
    }
}

/// Nodes and edges for one relaxation run.
///
/// Node 0 is the anchor. Node poses are only changed by the solver.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseGraph {
    nodes: Vec<PoseGraphNode>,
    edges: Vec<PoseGraphEdge>,
}

impl PoseGraph {
    /// One node per pose, node 0 fixed.
    pub fn new(poses: &[Pose]) -> Self {
        let nodes = poses
            .iter()
            .enumerate()
            .map(|(index, pose)| PoseGraphNode {
                index,
                pose: *pose,
                fixed: index == ANCHOR_NODE,
            })
            .collect();
        Self {
            nodes,
            edges: Vec::new(),
        }
    }

    pub fn add_edge(&mut self, edge: PoseGraphEdge) -> Result<(), GraphError> {
        let node_count = self.nodes.len();
        if edge.source >= node_count || edge.target >= node_count {
            return Err(GraphError::EdgeOutOfBounds {
                from: edge.source,
                to: edge.target,
                node_count,
            });
        }
        self.edges.push(edge);
        Ok(())
    }

    pub fn nodes(&self) -> &[PoseGraphNode] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [PoseGraphNode] {
        &mut self.nodes
    }

    pub fn edges(&self) -> &[PoseGraphEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn poses(&self) -> Vec<Pose> {
        self.nodes.iter().map(|n| n.pose).collect()
    }

    /// True when every node is reachable from the anchor through edges with
    /// non-zero weight.
    pub fn is_connected(&self) -> bool {
        let n = self.nodes.len();
        if n == 0 {
            return true;
        }
        let mut adjacency = vec![Vec::new(); n];
        for edge in self.edges.iter().filter(|e| e.weight > 0.0) {
            adjacency[edge.source].push(edge.target);
            adjacency[edge.target].push(edge.source);
        }

        let mut visited = vec![false; n];
        let mut stack = vec![ANCHOR_NODE];
        visited[ANCHOR_NODE] = true;
        while let Some(node) = stack.pop() {
            for &next in &adjacency[node] {
                if !visited[next] {
                    visited[next] = true;
                    stack.push(next);
                }
            }
        }
        visited.into_iter().all(|v| v)
    }
}
