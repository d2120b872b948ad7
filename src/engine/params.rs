//! Mapper parameter tree.
//!
//! Aggregates the per-algorithm parameter blocks into the record consumed
//! by [`Submap`](super::submap::Submap). All blocks deserialize with
//! defaults so partial configuration files stay valid.

use serde::{Deserialize, Serialize};

pub use crate::algorithms::carving::SpaceCarvingParameters;
pub use crate::algorithms::cropping::CropperParameters;
pub use crate::algorithms::features::PlaceRecognitionParameters;

use crate::error::{MeruError, Result};

/// Objective of the external scan matcher. `PointToPlane` requires map
/// normals, which the submap estimates on insertion when missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IcpObjective {
    PointToPoint,
    PointToPlane,
}

/// Scan-matcher-facing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanMatcherParameters {
    /// Neighbor count for on-insertion normal estimation.
    pub knn_normal_estimation: usize,

    /// Matching objective of the outer registration stage.
    pub icp_objective: IcpObjective,
}

impl Default for ScanMatcherParameters {
    fn default() -> Self {
        Self {
            knn_normal_estimation: 5,
            icp_objective: IcpObjective::PointToPoint,
        }
    }
}

/// Map-builder parameters, shared by the working map and the dense map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapBuilderParameters {
    /// Voxel size of the crop-bounded map voxelization; non-positive
    /// disables voxelization (working map only — the dense map needs a
    /// positive size for its grid).
    pub map_voxel_size: f64,

    /// Cropping volume anchored at the sensor pose.
    #[serde(default)]
    pub cropper: CropperParameters,

    /// Space carving parameters and gate interval.
    #[serde(default)]
    pub carving: SpaceCarvingParameters,
}

impl Default for MapBuilderParameters {
    fn default() -> Self {
        Self {
            map_voxel_size: 0.1,
            cropper: CropperParameters::default(),
            carving: SpaceCarvingParameters::default(),
        }
    }
}

/// Submap lifecycle parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmapParameters {
    /// Feature recomputation gate in seconds.
    pub min_seconds_between_feature_computation: f64,
}

impl Default for SubmapParameters {
    fn default() -> Self {
        Self {
            min_seconds_between_feature_computation: 5.0,
        }
    }
}

/// The full parameter record consumed by a submap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MapperParameters {
    #[serde(default)]
    pub map_builder: MapBuilderParameters,

    #[serde(default)]
    pub dense_map_builder: MapBuilderParameters,

    #[serde(default)]
    pub scan_matcher: ScanMatcherParameters,

    #[serde(default)]
    pub place_recognition: PlaceRecognitionParameters,

    #[serde(default)]
    pub submaps: SubmapParameters,
}

impl MapperParameters {
    /// Reject values the engine cannot operate with. A non-positive
    /// working-map voxel size is legal (it disables voxelization).
    pub fn validate(&self) -> Result<()> {
        if self.dense_map_builder.map_voxel_size <= 0.0 {
            return Err(MeruError::InvalidParameter(
                "dense_map_builder.map_voxel_size must be positive".to_string(),
            ));
        }
        for (label, builder) in [
            ("map_builder", &self.map_builder),
            ("dense_map_builder", &self.dense_map_builder),
        ] {
            if builder.cropper.radius <= 0.0 {
                return Err(MeruError::InvalidParameter(format!(
                    "{}.cropper.radius must be positive",
                    label
                )));
            }
            if builder.carving.step_size <= 0.0 {
                return Err(MeruError::InvalidParameter(format!(
                    "{}.carving.step_size must be positive",
                    label
                )));
            }
            if builder.carving.voxel_size_ray <= 0.0 {
                return Err(MeruError::InvalidParameter(format!(
                    "{}.carving.voxel_size_ray must be positive",
                    label
                )));
            }
        }
        if self.place_recognition.feature_voxel_size <= 0.0 {
            return Err(MeruError::InvalidParameter(
                "place_recognition.feature_voxel_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
