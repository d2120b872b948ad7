//! Dense voxelized point cloud with running-mean aggregation.

use std::collections::HashMap;

use nalgebra::Vector3;

use crate::core::types::{PointCloud, Transform};

use super::{voxel_key, VoxelKey};

/// Running aggregate of the points that fell into one voxel.
///
/// Sums are stored instead of means so that merging two aggregates (after
/// a transform re-buckets the grid) stays exact.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregatedVoxel {
    position_sum: Vector3<f64>,
    normal_sum: Vector3<f64>,
    color_sum: Vector3<f64>,
    count: usize,
}

impl AggregatedVoxel {
    /// Mean position of the contributing points.
    pub fn position(&self) -> Vector3<f64> {
        self.position_sum / self.count.max(1) as f64
    }

    /// Mean normal; zero when no contributing point carried one.
    pub fn normal(&self) -> Vector3<f64> {
        self.normal_sum / self.count.max(1) as f64
    }

    /// Mean color; zero when no contributing point carried one.
    pub fn color(&self) -> Vector3<f64> {
        self.color_sum / self.count.max(1) as f64
    }

    /// Number of aggregated points.
    pub fn count(&self) -> usize {
        self.count
    }

    fn add(&mut self, position: &Vector3<f64>, normal: Option<&Vector3<f64>>, color: Option<&Vector3<f64>>) {
        self.position_sum += position;
        if let Some(n) = normal {
            self.normal_sum += n;
        }
        if let Some(c) = color {
            self.color_sum += c;
        }
        self.count += 1;
    }

    fn merge(&mut self, other: &AggregatedVoxel) {
        self.position_sum += other.position_sum;
        self.normal_sum += other.normal_sum;
        self.color_sum += other.color_sum;
        self.count += other.count;
    }
}

/// Mapping from voxel keys to aggregated point attributes.
///
/// The reported representative of a voxel is the running mean of its
/// members, which by construction lies inside the voxel; a transform
/// re-buckets representatives so the invariant survives.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelizedCloud {
    voxel_size: f64,
    voxels: HashMap<VoxelKey, AggregatedVoxel>,
}

impl VoxelizedCloud {
    /// Create an empty grid with the given voxel size (must be positive;
    /// enforced upstream by parameter validation).
    pub fn new(voxel_size: f64) -> Self {
        Self {
            voxel_size,
            voxels: HashMap::new(),
        }
    }

    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    /// Number of occupied voxels.
    #[inline]
    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    /// Merge every point of a cloud into its voxel bucket.
    pub fn insert(&mut self, cloud: &PointCloud) {
        for (i, p) in cloud.points.iter().enumerate() {
            let key = voxel_key(p, self.voxel_size);
            let normal = cloud.normals.as_ref().map(|n| &n[i]);
            let color = cloud.colors.as_ref().map(|c| &c[i]);
            self.voxels.entry(key).or_default().add(p, normal, color);
        }
    }

    /// Drop one voxel. Returns whether the key was occupied.
    pub fn remove_key(&mut self, key: &VoxelKey) -> bool {
        self.voxels.remove(key).is_some()
    }

    /// Look up one voxel.
    pub fn voxel(&self, key: &VoxelKey) -> Option<&AggregatedVoxel> {
        self.voxels.get(key)
    }

    /// Rigid-transform the aggregated contents and rebuild the key grid
    /// from the new positions. Colliding buckets are merged.
    pub fn transform(&mut self, t: &Transform) {
        let old = std::mem::take(&mut self.voxels);
        for (_, mut voxel) in old {
            // Sums are linear in the points, so they transform directly:
            // Σ(R·p + t) = R·Σp + n·t, Σ(R·n) = R·Σn.
            voxel.position_sum =
                t.rotation * voxel.position_sum + t.translation.vector * voxel.count as f64;
            voxel.normal_sum = t.rotation * voxel.normal_sum;
            let key = voxel_key(&voxel.position(), self.voxel_size);
            self.voxels
                .entry(key)
                .and_modify(|existing| existing.merge(&voxel))
                .or_insert(voxel);
        }
    }

    /// Iterate over occupied voxels.
    pub fn entries(&self) -> impl Iterator<Item = (&VoxelKey, &AggregatedVoxel)> {
        self.voxels.iter()
    }

    /// Voxel representatives (means) as a point cloud with normal and
    /// color channels.
    pub fn to_point_cloud(&self) -> PointCloud {
        let mut points = Vec::with_capacity(self.voxels.len());
        let mut normals = Vec::with_capacity(self.voxels.len());
        let mut colors = Vec::with_capacity(self.voxels.len());
        for voxel in self.voxels.values() {
            points.push(voxel.position());
            normals.push(voxel.normal());
            colors.push(voxel.color());
        }
        PointCloud::from_parts(points, Some(normals), Some(colors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::translation;
    use approx::assert_relative_eq;

    fn grid_with(points: Vec<Vector3<f64>>, voxel_size: f64) -> VoxelizedCloud {
        let mut grid = VoxelizedCloud::new(voxel_size);
        grid.insert(&PointCloud::from_points(points));
        grid
    }

    #[test]
    fn test_insert_aggregates_running_mean() {
        let grid = grid_with(
            vec![Vector3::new(0.2, 0.2, 0.2), Vector3::new(0.4, 0.4, 0.4)],
            1.0,
        );
        assert_eq!(grid.len(), 1);
        let voxel = grid.voxel(&[0, 0, 0]).unwrap();
        assert_eq!(voxel.count(), 2);
        assert_relative_eq!(voxel.position().x, 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_representative_stays_inside_voxel() {
        let grid = grid_with(
            vec![
                Vector3::new(0.1, 0.0, 0.0),
                Vector3::new(0.9, 0.0, 0.0),
                Vector3::new(0.5, 0.0, 0.0),
            ],
            1.0,
        );
        let voxel = grid.voxel(&[0, 0, 0]).unwrap();
        let p = voxel.position();
        assert_eq!(voxel_key(&p, 1.0), [0, 0, 0]);
    }

    #[test]
    fn test_remove_key() {
        let mut grid = grid_with(vec![Vector3::new(0.5, 0.5, 0.5)], 1.0);
        assert!(grid.remove_key(&[0, 0, 0]));
        assert!(!grid.remove_key(&[0, 0, 0]));
        assert!(grid.is_empty());
    }

    #[test]
    fn test_transform_rebuckets() {
        let mut grid = grid_with(vec![Vector3::new(0.5, 0.5, 0.5)], 1.0);
        grid.transform(&translation(2.0, 0.0, 0.0));
        assert!(grid.voxel(&[0, 0, 0]).is_none());
        let voxel = grid.voxel(&[2, 0, 0]).unwrap();
        assert_relative_eq!(voxel.position().x, 2.5, epsilon = 1e-12);
        // The moved representative is inside its new voxel.
        assert_eq!(voxel_key(&voxel.position(), 1.0), [2, 0, 0]);
    }

    #[test]
    fn test_transform_merges_colliding_buckets() {
        let mut grid = grid_with(
            vec![Vector3::new(0.9, 0.0, 0.0), Vector3::new(1.1, 0.0, 0.0)],
            1.0,
        );
        assert_eq!(grid.len(), 2);
        // Shift by +0.05: 0.95 and 1.15 still straddle the boundary, but
        // shifting by -0.4 puts both means (0.5, 0.7) into voxel 0.
        grid.transform(&translation(-0.4, 0.0, 0.0));
        assert_eq!(grid.len(), 1);
        let voxel = grid.voxel(&[0, 0, 0]).unwrap();
        assert_eq!(voxel.count(), 2);
        assert_relative_eq!(voxel.position().x, 0.6, epsilon = 1e-12);
    }

    #[test]
    fn test_to_point_cloud_roundtrip_count() {
        let grid = grid_with(
            vec![Vector3::new(0.5, 0.5, 0.5), Vector3::new(5.5, 0.5, 0.5)],
            1.0,
        );
        let cloud = grid.to_point_cloud();
        assert_eq!(cloud.len(), 2);
        assert!(cloud.has_normals());
        assert!(cloud.has_colors());
    }
}
