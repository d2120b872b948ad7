//! Pose-anchored cropping volumes.
//!
//! A cropping volume is a spatial predicate with a pose, used to bound the
//! working region of map updates. Points are tested in the volume's local
//! frame; points exactly on the boundary are inside.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::core::types::{transform_point, PointCloud, Transform};
use crate::error::{MeruError, Result};

/// Configuration for a cropping volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropperParameters {
    /// Volume discriminator: `box`, `cylinder`, `sphere` or `max-radius`.
    pub name: String,

    /// Radius in meters (half-extent in x/y for `box`).
    pub radius: f64,

    /// Lower z bound in meters (`box` and `cylinder` only).
    pub min_z: f64,

    /// Upper z bound in meters (`box` and `cylinder` only).
    pub max_z: f64,
}

impl Default for CropperParameters {
    fn default() -> Self {
        Self {
            name: "max-radius".to_string(),
            radius: 30.0,
            min_z: -10.0,
            max_z: 10.0,
        }
    }
}

/// The supported volume shapes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CroppingVolumeKind {
    /// Axis-aligned box in the volume frame: |x|, |y| within the half
    /// extent, z within [min_z, max_z].
    Box {
        half_extent_xy: f64,
        min_z: f64,
        max_z: f64,
    },
    /// z-axis cylinder in the volume frame.
    Cylinder { radius: f64, min_z: f64, max_z: f64 },
    /// Ball around the volume origin.
    Sphere { radius: f64 },
    /// Maximum distance from the volume origin (rotation-invariant).
    MaxRadius { radius: f64 },
}

/// A pose-bearing spatial predicate over 3D points.
#[derive(Debug, Clone)]
pub struct CroppingVolume {
    kind: CroppingVolumeKind,
    pose: Transform,
    inverse_pose: Transform,
}

impl CroppingVolume {
    /// Create a volume at the identity pose.
    pub fn new(kind: CroppingVolumeKind) -> Self {
        Self {
            kind,
            pose: Transform::identity(),
            inverse_pose: Transform::identity(),
        }
    }

    /// Build a volume from its configuration.
    ///
    /// Unknown discriminator names are a configuration error.
    pub fn from_parameters(params: &CropperParameters) -> Result<Self> {
        let kind = match params.name.as_str() {
            "box" => CroppingVolumeKind::Box {
                half_extent_xy: params.radius,
                min_z: params.min_z,
                max_z: params.max_z,
            },
            "cylinder" => CroppingVolumeKind::Cylinder {
                radius: params.radius,
                min_z: params.min_z,
                max_z: params.max_z,
            },
            "sphere" => CroppingVolumeKind::Sphere {
                radius: params.radius,
            },
            "max-radius" => CroppingVolumeKind::MaxRadius {
                radius: params.radius,
            },
            other => {
                return Err(MeruError::Config(format!(
                    "unknown cropping volume name: {}",
                    other
                )))
            }
        };
        Ok(Self::new(kind))
    }

    /// The volume shape.
    pub fn kind(&self) -> &CroppingVolumeKind {
        &self.kind
    }

    /// Anchor the volume at a new pose.
    pub fn set_pose(&mut self, pose: &Transform) {
        self.pose = *pose;
        self.inverse_pose = pose.inverse();
    }

    /// Current pose.
    pub fn pose(&self) -> &Transform {
        &self.pose
    }

    /// Whether a world-frame point is inside (boundary included).
    pub fn contains(&self, point: &Vector3<f64>) -> bool {
        let local = transform_point(&self.inverse_pose, point);
        match self.kind {
            CroppingVolumeKind::Box {
                half_extent_xy,
                min_z,
                max_z,
            } => {
                local.x.abs() <= half_extent_xy
                    && local.y.abs() <= half_extent_xy
                    && local.z >= min_z
                    && local.z <= max_z
            }
            CroppingVolumeKind::Cylinder {
                radius,
                min_z,
                max_z,
            } => {
                local.fixed_rows::<2>(0).norm() <= radius && local.z >= min_z && local.z <= max_z
            }
            CroppingVolumeKind::Sphere { radius } => local.norm() <= radius,
            CroppingVolumeKind::MaxRadius { radius } => {
                (point - self.pose.translation.vector).norm() <= radius
            }
        }
    }

    /// Ascending, unique indices of the cloud's points inside the volume.
    pub fn indices_within(&self, cloud: &PointCloud) -> Vec<usize> {
        cloud
            .points
            .iter()
            .enumerate()
            .filter(|(_, p)| self.contains(p))
            .map(|(i, _)| i)
            .collect()
    }

    /// New cloud holding only the points inside the volume, attributes
    /// preserved.
    pub fn crop(&self, cloud: &PointCloud) -> PointCloud {
        cloud.select_by_index(&self.indices_within(cloud))
    }
}
