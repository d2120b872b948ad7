//! Point cloud and transform types for 3D mapping.

mod cloud;
mod transform;

pub use cloud::PointCloud;
pub use transform::{transform_point, translation, Transform};

/// Monotonic timestamp in nanoseconds since epoch.
pub type Time = u64;
