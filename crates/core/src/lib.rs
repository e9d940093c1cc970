#![forbid(unsafe_code)]

pub mod cloud;
pub mod error;
pub mod point;
pub mod pose;
pub mod scan_set;

pub use cloud::PointCloud;
pub use error::ScanSetError;
pub use point::PointXYZ;
pub use pose::{wrap_angle, Pose};
pub use scan_set::ScanSet;
