use crate::PointXYZ;

/// A single range scan stored as structure-of-arrays coordinates.
///
/// Clouds are read-only inputs to the relaxation: nothing downstream mutates
/// them, and the pose graph refers to a cloud only by its scan index.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub z: Vec<f32>,
}

impl PointCloud {
    pub fn new() -> Self {
        Self {
            x: Vec::new(),
            y: Vec::new(),
            z: Vec::new(),
        }
    }

    pub fn from_xyz(x: Vec<f32>, y: Vec<f32>, z: Vec<f32>) -> Self {
        assert_eq!(x.len(), y.len(), "x and y must have same length");
        assert_eq!(x.len(), z.len(), "x and z must have same length");

        Self { x, y, z }
    }

    pub fn from_points(points: &[PointXYZ]) -> Self {
        let mut x = Vec::with_capacity(points.len());
        let mut y = Vec::with_capacity(points.len());
        let mut z = Vec::with_capacity(points.len());

        for p in points {
            x.push(p.x);
            y.push(p.y);
            z.push(p.z);
        }

        Self { x, y, z }
    }

    pub fn len(&self) -> usize {
        debug_assert_eq!(self.x.len(), self.y.len());
        debug_assert_eq!(self.x.len(), self.z.len());
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn point(&self, i: usize) -> [f32; 3] {
        [self.x[i], self.y[i], self.z[i]]
    }

    pub fn iter_points(&self) -> impl Iterator<Item = [f32; 3]> + '_ {
        self.x
            .iter()
            .zip(&self.y)
            .zip(&self.z)
            .map(|((x, y), z)| [*x, *y, *z])
    }

    pub fn push(&mut self, p: PointXYZ) {
        self.x.push(p.x);
        self.y.push(p.y);
        self.z.push(p.z);
    }
}

impl Default for PointCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<PointXYZ> for PointCloud {
    fn from_iter<I: IntoIterator<Item = PointXYZ>>(iter: I) -> Self {
        let mut cloud = Self::new();
        for p in iter {
            cloud.push(p);
        }
        cloud
    }
}
