//! Place-recognition feature extraction: sparse downsampling, normal
//! estimation and FPFH descriptors.

pub mod fpfh;
pub mod normals;

use serde::{Deserialize, Serialize};

use crate::core::types::PointCloud;

use self::fpfh::{compute_fpfh_features, FpfhFeatures};
use self::normals::{estimate_normals, NormalSearch};

/// Parameters of the place-recognition feature pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecognitionParameters {
    /// Voxel size of the sparse feature cloud.
    pub feature_voxel_size: f64,

    /// Radius of the hybrid normal-estimation search.
    pub normal_estimation_radius: f64,

    /// Neighbor cap of the hybrid normal-estimation search.
    pub normal_knn: usize,

    /// Radius of the hybrid descriptor search.
    pub feature_radius: f64,

    /// Neighbor cap of the hybrid descriptor search.
    pub feature_knn: usize,
}

impl Default for PlaceRecognitionParameters {
    fn default() -> Self {
        Self {
            feature_voxel_size: 0.5,
            normal_estimation_radius: 1.0,
            normal_knn: 10,
            feature_radius: 2.5,
            feature_knn: 100,
        }
    }
}

/// Sparse feature cloud with oriented normals, paired with its FPFH
/// descriptors.
pub fn extract_place_recognition_features(
    map_cloud: &PointCloud,
    params: &PlaceRecognitionParameters,
) -> (PointCloud, FpfhFeatures) {
    let mut sparse = map_cloud.voxel_down_sample(params.feature_voxel_size);
    estimate_normals(
        &mut sparse,
        NormalSearch::Hybrid {
            radius: params.normal_estimation_radius,
            max_nn: params.normal_knn,
        },
    );
    sparse.normalize_normals();
    sparse.orient_normals_towards_camera_location(&nalgebra::Vector3::zeros());
    let features = compute_fpfh_features(&sparse, params.feature_radius, params.feature_knn);
    (sparse, features)
}
