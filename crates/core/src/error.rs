use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanSetError {
    #[error("scan set has {clouds} point clouds but {poses} poses")]
    LengthMismatch { clouds: usize, poses: usize },
}
