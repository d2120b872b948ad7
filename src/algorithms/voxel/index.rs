//! Sparse voxel index over a referenced point cloud.
//!
//! Maps voxel keys to the indices of the owning cloud's points inside that
//! voxel, grouped into named layers. The index is rebuilt from scratch on
//! each feature-computation cycle rather than patched incrementally, so it
//! never holds back-references into the cloud.

use std::collections::HashMap;

use crate::core::types::PointCloud;

use super::{voxel_key, VoxelKey};

/// Sparse mapping from voxel keys to point indices, per layer.
#[derive(Debug, Clone, Default)]
pub struct VoxelMap {
    voxel_size: f64,
    layers: HashMap<String, HashMap<VoxelKey, Vec<usize>>>,
}

impl VoxelMap {
    /// Layer used by the submap for its map cloud.
    pub const MAP_LAYER: &'static str = "map";

    /// Create an empty index with the given (expanded) voxel size.
    pub fn new(voxel_size: f64) -> Self {
        Self {
            voxel_size,
            layers: HashMap::new(),
        }
    }

    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }

    /// Drop all layers.
    pub fn clear(&mut self) {
        self.layers.clear();
    }

    /// Whether no layer holds any indices.
    pub fn is_empty(&self) -> bool {
        self.layers.values().all(|layer| layer.is_empty())
    }

    /// Index every point of the cloud by voxel key under the named layer.
    ///
    /// A non-positive voxel size (voxelization disabled upstream)
    /// degenerates to a single global voxel at the origin key.
    pub fn insert_cloud(&mut self, layer: &str, cloud: &PointCloud) {
        let size = if self.voxel_size > 0.0 {
            self.voxel_size
        } else {
            f64::INFINITY
        };
        let entries = self.layers.entry(layer.to_string()).or_default();
        for (i, p) in cloud.points.iter().enumerate() {
            entries.entry(voxel_key(p, size)).or_default().push(i);
        }
    }

    /// Point indices stored in one voxel of a layer; empty when absent.
    pub fn indices_in_voxel(&self, layer: &str, key: &VoxelKey) -> &[usize] {
        self.layers
            .get(layer)
            .and_then(|entries| entries.get(key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of occupied voxels in a layer.
    pub fn voxel_count(&self, layer: &str) -> usize {
        self.layers.get(layer).map_or(0, HashMap::len)
    }

    /// The 26-neighborhood of a key (the key itself excluded).
    pub fn keys_near(key: &VoxelKey) -> Vec<VoxelKey> {
        let mut out = Vec::with_capacity(26);
        for di in -1..=1 {
            for dj in -1..=1 {
                for dk in -1..=1 {
                    if di == 0 && dj == 0 && dk == 0 {
                        continue;
                    }
                    out.push([key[0] + di, key[1] + dj, key[2] + dk]);
                }
            }
        }
        out
    }

    /// Point indices of a layer found in the 26-neighborhood of a key
    /// (center voxel included) — the adjacency query used for neighbor
    /// lookups at expanded resolution.
    pub fn indices_near(&self, layer: &str, key: &VoxelKey) -> Vec<usize> {
        let mut out = Vec::new();
        out.extend_from_slice(self.indices_in_voxel(layer, key));
        for neighbor in Self::keys_near(key) {
            out.extend_from_slice(self.indices_in_voxel(layer, &neighbor));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn indexed_map() -> VoxelMap {
        let cloud = PointCloud::from_points(vec![
            Vector3::new(0.1, 0.1, 0.1),
            Vector3::new(0.2, 0.2, 0.2),
            Vector3::new(1.5, 0.1, 0.1),
        ]);
        let mut map = VoxelMap::new(1.0);
        map.insert_cloud(VoxelMap::MAP_LAYER, &cloud);
        map
    }

    #[test]
    fn test_insert_and_lookup() {
        let map = indexed_map();
        assert_eq!(map.indices_in_voxel(VoxelMap::MAP_LAYER, &[0, 0, 0]), &[0, 1]);
        assert_eq!(map.indices_in_voxel(VoxelMap::MAP_LAYER, &[1, 0, 0]), &[2]);
        assert!(map.indices_in_voxel(VoxelMap::MAP_LAYER, &[9, 9, 9]).is_empty());
        assert_eq!(map.voxel_count(VoxelMap::MAP_LAYER), 2);
    }

    #[test]
    fn test_missing_layer_is_empty() {
        let map = indexed_map();
        assert!(map.indices_in_voxel("other", &[0, 0, 0]).is_empty());
        assert_eq!(map.voxel_count("other"), 0);
    }

    #[test]
    fn test_layers_are_independent() {
        let mut map = indexed_map();
        let other = PointCloud::from_points(vec![Vector3::new(0.5, 0.5, 0.5)]);
        map.insert_cloud("scan", &other);
        assert_eq!(map.indices_in_voxel("scan", &[0, 0, 0]), &[0]);
        assert_eq!(map.indices_in_voxel(VoxelMap::MAP_LAYER, &[0, 0, 0]), &[0, 1]);
    }

    #[test]
    fn test_keys_near_is_26_neighborhood() {
        let keys = VoxelMap::keys_near(&[0, 0, 0]);
        assert_eq!(keys.len(), 26);
        assert!(!keys.contains(&[0, 0, 0]));
        assert!(keys.contains(&[-1, -1, -1]));
        assert!(keys.contains(&[1, 1, 1]));
    }

    #[test]
    fn test_indices_near_spans_adjacent_voxels() {
        let map = indexed_map();
        let mut near = map.indices_near(VoxelMap::MAP_LAYER, &[0, 0, 0]);
        near.sort_unstable();
        assert_eq!(near, vec![0, 1, 2]);
    }

    #[test]
    fn test_non_positive_size_degenerates_to_one_voxel() {
        let cloud = PointCloud::from_points(vec![
            Vector3::new(-50.0, 0.0, 0.0),
            Vector3::new(50.0, 0.0, 0.0),
        ]);
        let mut map = VoxelMap::new(0.0);
        map.insert_cloud(VoxelMap::MAP_LAYER, &cloud);
        assert_eq!(map.indices_in_voxel(VoxelMap::MAP_LAYER, &[0, 0, 0]), &[0, 1]);
    }

    #[test]
    fn test_clear() {
        let mut map = indexed_map();
        assert!(!map.is_empty());
        map.clear();
        assert!(map.is_empty());
    }
}
