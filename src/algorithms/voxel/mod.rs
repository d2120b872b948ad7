//! Voxel-grid structures: integer lattice keys, the dense aggregated
//! cloud and the sparse point index.

mod dense;
mod index;

pub use dense::{AggregatedVoxel, VoxelizedCloud};
pub use index::VoxelMap;

use nalgebra::Vector3;

/// Integer lattice coordinate of a voxel.
pub type VoxelKey = [i32; 3];

/// Voxel key of a point: component-wise floor division by the voxel size.
#[inline]
pub fn voxel_key(point: &Vector3<f64>, voxel_size: f64) -> VoxelKey {
    [
        (point.x / voxel_size).floor() as i32,
        (point.y / voxel_size).floor() as i32,
        (point.z / voxel_size).floor() as i32,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voxel_key_floors() {
        assert_eq!(voxel_key(&Vector3::new(0.05, 0.0, -0.05), 0.1), [0, 0, -1]);
        assert_eq!(voxel_key(&Vector3::new(1.0, 2.5, -3.7), 1.0), [1, 2, -4]);
    }

    #[test]
    fn test_voxel_key_boundary_belongs_to_upper_cell() {
        // A point exactly on the lattice plane floors into the upper cell.
        assert_eq!(voxel_key(&Vector3::new(0.1, 0.0, 0.0), 0.1), [1, 0, 0]);
    }
}
