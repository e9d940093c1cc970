use crate::{PointCloud, Pose, ScanSetError};

/// Ordered scans with their initial pose estimates, index-aligned.
///
/// Owns every cloud exclusively; everything downstream refers to a scan by its
/// index into this set.
#[derive(Debug, Clone, Default)]
pub struct ScanSet {
    clouds: Vec<PointCloud>,
    poses: Vec<Pose>,
}

impl ScanSet {
    pub fn new(clouds: Vec<PointCloud>, poses: Vec<Pose>) -> Result<Self, ScanSetError> {
        if clouds.len() != poses.len() {
            return Err(ScanSetError::LengthMismatch {
                clouds: clouds.len(),
                poses: poses.len(),
            });
        }
        Ok(Self { clouds, poses })
    }

    pub fn push(&mut self, cloud: PointCloud, pose: Pose) {
        self.clouds.push(cloud);
        self.poses.push(pose);
    }

    pub fn len(&self) -> usize {
        self.clouds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clouds.is_empty()
    }

    pub fn cloud(&self, index: usize) -> Option<&PointCloud> {
        self.clouds.get(index)
    }

    pub fn pose(&self, index: usize) -> Option<&Pose> {
        self.poses.get(index)
    }

    pub fn clouds(&self) -> &[PointCloud] {
        &self.clouds
    }

    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PointCloud, &Pose)> + '_ {
        self.clouds.iter().zip(&self.poses)
    }

    /// Total number of points across all scans.
    pub fn total_points(&self) -> usize {
        self.clouds.iter().map(PointCloud::len).sum()
    }
}

impl FromIterator<(PointCloud, Pose)> for ScanSet {
    fn from_iter<I: IntoIterator<Item = (PointCloud, Pose)>>(iter: I) -> Self {
        let (clouds, poses) = iter.into_iter().unzip();
        Self { clouds, poses }
    }
}
