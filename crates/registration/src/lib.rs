#![forbid(unsafe_code)]

pub mod alignment;
pub mod correspondence;

pub use alignment::{
    align_pair, apply_transform, compute_rmse, estimate_rigid_transform, AlignmentParams,
    PairAlignment,
};
pub use correspondence::{find_correspondences, Correspondence, CorrespondenceEstimator};
