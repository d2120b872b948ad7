//! Fast Point Feature Histograms for place recognition.
//!
//! Each point gets a 33-dimensional descriptor: three Darboux-frame pair
//! angles binned into 11 bins each. A Simplified PFH (SPFH) histogram is
//! first accumulated per point from its neighborhood, then each point's
//! final descriptor is its own SPFH plus the distance-weighted SPFHs of
//! its neighbors, normalized to 100 per 11-bin block.

use std::f64::consts::PI;

use nalgebra::Vector3;

use crate::core::types::PointCloud;

use super::normals::{build_kdtree, search_hybrid};

/// Bins per pair-feature angle.
const BINS: usize = 11;

/// Descriptor dimensionality.
pub const FPFH_DIMENSION: usize = 3 * BINS;

/// Histogram mass per 11-bin block.
const HIST_MAX: f64 = 100.0;

/// FPFH descriptors of a point cloud, one row of 33 values per point.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FpfhFeatures {
    data: Vec<[f64; FPFH_DIMENSION]>,
}

impl FpfhFeatures {
    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Descriptor of one point.
    pub fn descriptor(&self, index: usize) -> &[f64; FPFH_DIMENSION] {
        &self.data[index]
    }

    /// Iterate over descriptors in point order.
    pub fn iter(&self) -> impl Iterator<Item = &[f64; FPFH_DIMENSION]> {
        self.data.iter()
    }
}

/// Compute FPFH descriptors for a cloud with normals, using a hybrid
/// radius + k search for both the SPFH and the weighting pass.
///
/// # Panics
///
/// Panics if a non-empty cloud carries no normal channel; the feature
/// pipeline estimates normals first.
pub fn compute_fpfh_features(cloud: &PointCloud, radius: f64, max_nn: usize) -> FpfhFeatures {
    if cloud.is_empty() {
        return FpfhFeatures::default();
    }
    let normals = match &cloud.normals {
        Some(n) if n.len() == cloud.len() => n,
        _ => panic!("FPFH requires normals; estimate them before computing descriptors"),
    };
    let tree = build_kdtree(cloud);

    // Pass 1: SPFH per point.
    let mut spfh = vec![[0.0; FPFH_DIMENSION]; cloud.len()];
    let mut neighborhoods = Vec::with_capacity(cloud.len());
    for (i, p) in cloud.points.iter().enumerate() {
        let neighbors = search_hybrid(&tree, p, radius, max_nn);
        point_spfh(i, &neighbors, &cloud.points, normals, &mut spfh[i]);
        neighborhoods.push(neighbors);
    }

    // Pass 2: distance-weighted accumulation over the same neighborhoods.
    let mut data = vec![[0.0; FPFH_DIMENSION]; cloud.len()];
    for (i, neighbors) in neighborhoods.iter().enumerate() {
        let fpfh = &mut data[i];
        let mut block_sum = [0.0; 3];
        for &(k, distance) in neighbors {
            if k == i || distance <= 0.0 {
                continue;
            }
            let weight = 1.0 / distance;
            for (j, value) in spfh[k].iter().enumerate() {
                let weighted = value * weight;
                block_sum[j / BINS] += weighted;
                fpfh[j] += weighted;
            }
        }
        for (j, value) in fpfh.iter_mut().enumerate() {
            let sum = block_sum[j / BINS];
            if sum > 0.0 {
                *value = *value / sum * HIST_MAX;
            }
        }
        for (j, value) in fpfh.iter_mut().enumerate() {
            *value += spfh[i][j];
        }
    }

    FpfhFeatures { data }
}

/// Accumulate one point's SPFH histogram from its neighborhood.
fn point_spfh(
    pivot: usize,
    neighbors: &[(usize, f64)],
    points: &[Vector3<f64>],
    normals: &[Vector3<f64>],
    hist: &mut [f64; FPFH_DIMENSION],
) {
    if neighbors.len() < 2 {
        return;
    }
    let increment = HIST_MAX / (neighbors.len() - 1) as f64;
    for &(k, _) in neighbors {
        if k == pivot {
            continue;
        }
        let (theta, alpha, phi) = match pair_features(
            &points[pivot],
            &normals[pivot],
            &points[k],
            &normals[k],
        ) {
            Some(f) => f,
            None => continue,
        };
        hist[bin_index(theta, -PI, PI)] += increment;
        hist[BINS + bin_index(alpha, -1.0, 1.0)] += increment;
        hist[2 * BINS + bin_index(phi, -1.0, 1.0)] += increment;
    }
}

#[inline]
fn bin_index(value: f64, min: f64, max: f64) -> usize {
    let scaled = (value - min) / (max - min) * BINS as f64;
    (scaled.floor() as isize).clamp(0, BINS as isize - 1) as usize
}

/// Darboux-frame pair angles (θ, α, φ) between two oriented points.
///
/// The frame source is the point whose normal is better aligned with the
/// connecting line. Returns `None` for coincident points or degenerate
/// normals.
fn pair_features(
    p1: &Vector3<f64>,
    n1: &Vector3<f64>,
    p2: &Vector3<f64>,
    n2: &Vector3<f64>,
) -> Option<(f64, f64, f64)> {
    let mut dp = p2 - p1;
    let distance = dp.norm();
    if distance <= 0.0 {
        return None;
    }
    let mut ns = *n1;
    let mut nt = *n2;
    let angle1 = ns.dot(&dp) / distance;
    let angle2 = nt.dot(&dp) / distance;
    let phi = if angle1.abs() < angle2.abs() {
        std::mem::swap(&mut ns, &mut nt);
        dp = -dp;
        angle2
    } else {
        angle1
    };

    let v = dp.cross(&ns);
    let v_norm = v.norm();
    if v_norm <= 0.0 {
        return None;
    }
    let v = v / v_norm;
    let w = ns.cross(&v);

    let alpha = v.dot(&nt);
    let theta = w.dot(&nt).atan2(ns.dot(&nt));
    Some((theta, alpha, phi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::features::normals::{estimate_normals, NormalSearch};
    use approx::assert_relative_eq;

    fn oriented_plane() -> PointCloud {
        let mut points = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                points.push(Vector3::new(i as f64 * 0.1, j as f64 * 0.1, 0.0));
            }
        }
        let mut cloud = PointCloud::from_points(points);
        estimate_normals(&mut cloud, NormalSearch::Knn(8));
        cloud.normalize_normals();
        cloud
    }

    #[test]
    fn test_descriptor_shape() {
        let cloud = oriented_plane();
        let features = compute_fpfh_features(&cloud, 0.5, 15);
        assert_eq!(features.len(), cloud.len());
        assert_eq!(features.descriptor(0).len(), FPFH_DIMENSION);
    }

    #[test]
    fn test_descriptors_are_deterministic() {
        let cloud = oriented_plane();
        let a = compute_fpfh_features(&cloud, 0.5, 15);
        let b = compute_fpfh_features(&cloud, 0.5, 15);
        assert_eq!(a, b);
    }

    #[test]
    fn test_descriptor_mass_is_bounded() {
        // Own SPFH carries 100 per block and the weighted neighbor term
        // another 100, so each block sums to at most 200.
        let cloud = oriented_plane();
        let features = compute_fpfh_features(&cloud, 0.5, 15);
        for descriptor in features.iter() {
            for block in 0..3 {
                let sum: f64 = descriptor[block * BINS..(block + 1) * BINS].iter().sum();
                assert!(sum <= 200.0 + 1e-9, "block sum {} out of range", sum);
            }
        }
    }

    #[test]
    fn test_empty_cloud_empty_features() {
        let features = compute_fpfh_features(&PointCloud::new(), 1.0, 10);
        assert!(features.is_empty());
    }

    #[test]
    fn test_pair_features_direction_independent_frame() {
        // With normals perpendicular to the connecting line the frame
        // source choice is direction-independent, so swapping the points
        // gives the same angles.
        let p1 = Vector3::new(0.0, 0.0, 0.0);
        let n1 = Vector3::new(0.0, 0.0, 1.0);
        let p2 = Vector3::new(1.0, 0.0, 0.0);
        let n2 = Vector3::new(0.0, 0.70710678, 0.70710678);
        let (t_a, a_a, p_a) = pair_features(&p1, &n1, &p2, &n2).unwrap();
        let (t_b, a_b, p_b) = pair_features(&p2, &n2, &p1, &n1).unwrap();
        assert_relative_eq!(t_a, t_b, epsilon = 1e-9);
        assert_relative_eq!(a_a, a_b, epsilon = 1e-9);
        assert_relative_eq!(p_a, p_b, epsilon = 1e-9);
    }

    #[test]
    fn test_coincident_points_skip_pair() {
        let p = Vector3::zeros();
        let n = Vector3::new(0.0, 0.0, 1.0);
        assert!(pair_features(&p, &n, &p, &n).is_none());
    }
}
