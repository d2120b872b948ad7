//! Space carving: removal of map geometry invalidated by newer range
//! observations.
//!
//! A fresh scan proves that the space between the sensor and each return
//! is empty. Map points (or dense-map voxels) that lie on such a ray,
//! closer to the sensor than the scan's first return by more than one ray
//! voxel, are carved.
//!
//! # Algorithm
//!
//! The world-frame scan is hashed into a voxel occupancy set at
//! `voxel_size_ray`. For each candidate the ray from the sensor origin
//! through the candidate is walked in `step_size` increments; the first
//! occupied voxel along the walk is the scan's first return in that
//! direction. The candidate is carved when it sits strictly in front of
//! that return.

use std::collections::HashSet;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::core::types::PointCloud;

use super::voxel::{voxel_key, VoxelKey, VoxelizedCloud};

/// Space carving parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceCarvingParameters {
    /// Candidates farther than this from the sensor are never carved.
    pub max_range: f64,

    /// Voxel size of the scan occupancy hash; doubles as the carve
    /// tolerance (a candidate must be more than one ray voxel in front of
    /// the first return).
    pub voxel_size_ray: f64,

    /// Ray-walk increment in meters. Must not exceed `voxel_size_ray` or
    /// the walk can step over occupied voxels.
    pub step_size: f64,

    /// Minimum |cos| between the view direction and the candidate's
    /// normal. Grazing observations do not carve. Ignored when the target
    /// carries no normals.
    pub min_dot_threshold: f64,

    /// Seconds between carve runs on one target (the gate lives in the
    /// submap, next to the per-target timers).
    pub carve_space_every_n_sec: f64,
}

impl Default for SpaceCarvingParameters {
    fn default() -> Self {
        Self {
            max_range: 30.0,
            voxel_size_ray: 0.1,
            step_size: 0.05,
            min_dot_threshold: 0.5,
            carve_space_every_n_sec: 1.0,
        }
    }
}

/// Indices of `map` points (restricted to `candidates`) carved by the
/// world-frame scan observed from `sensor_position`.
pub fn carved_point_indices(
    scan_world: &PointCloud,
    map: &PointCloud,
    sensor_position: &Vector3<f64>,
    candidates: &[usize],
    params: &SpaceCarvingParameters,
) -> Vec<usize> {
    if scan_world.is_empty() || map.is_empty() {
        return Vec::new();
    }
    let occupancy = scan_occupancy(scan_world, params);
    let normals = map.normals.as_deref().filter(|n| !n.is_empty());

    let mut carved = Vec::new();
    for &idx in candidates {
        let normal = normals.map(|n| n[idx]);
        if is_carved(&map.points[idx], normal, sensor_position, &occupancy, params) {
            carved.push(idx);
        }
    }
    carved
}

/// Keys of dense-map voxels whose representatives are carved by the
/// world-frame scan.
pub fn carved_voxel_keys(
    scan_world: &PointCloud,
    dense: &VoxelizedCloud,
    sensor_position: &Vector3<f64>,
    params: &SpaceCarvingParameters,
) -> Vec<VoxelKey> {
    if scan_world.is_empty() || dense.is_empty() {
        return Vec::new();
    }
    let occupancy = scan_occupancy(scan_world, params);

    let mut carved = Vec::new();
    for (key, voxel) in dense.entries() {
        let normal = voxel.normal();
        let normal = (normal.norm_squared() > 0.0).then_some(normal);
        if is_carved(&voxel.position(), normal, sensor_position, &occupancy, params) {
            carved.push(*key);
        }
    }
    carved
}

fn scan_occupancy(scan_world: &PointCloud, params: &SpaceCarvingParameters) -> HashSet<VoxelKey> {
    scan_world
        .points
        .iter()
        .map(|p| voxel_key(p, params.voxel_size_ray))
        .collect()
}

/// Ray-consistency test for one candidate position.
fn is_carved(
    position: &Vector3<f64>,
    normal: Option<Vector3<f64>>,
    sensor_position: &Vector3<f64>,
    occupancy: &HashSet<VoxelKey>,
    params: &SpaceCarvingParameters,
) -> bool {
    let to_candidate = position - sensor_position;
    let range = to_candidate.norm();
    if range <= f64::EPSILON || range > params.max_range {
        return false;
    }
    let direction = to_candidate / range;
    if let Some(n) = normal {
        if direction.dot(&n).abs() < params.min_dot_threshold {
            return false;
        }
    }
    match first_return_along(sensor_position, &direction, occupancy, params) {
        Some(first_return) => first_return > range + params.voxel_size_ray,
        None => false,
    }
}

/// Distance to the first scan return along a ray, walked in `step_size`
/// increments up to `max_range`.
fn first_return_along(
    origin: &Vector3<f64>,
    direction: &Vector3<f64>,
    occupancy: &HashSet<VoxelKey>,
    params: &SpaceCarvingParameters,
) -> Option<f64> {
    let mut t = params.step_size;
    while t <= params.max_range {
        let probe = origin + direction * t;
        if occupancy.contains(&voxel_key(&probe, params.voxel_size_ray)) {
            return Some(t);
        }
        t += params.step_size;
    }
    None
}
