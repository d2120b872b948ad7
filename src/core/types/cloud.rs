//! 3D point cloud with optional per-point attributes.
//!
//! Points are stored in a plain vector with optional parallel vectors for
//! normals and RGB colors. When an attribute channel is present it has
//! exactly one entry per point; this invariant is maintained by every
//! mutating operation and asserted on raw construction.
//!
//! The frame of reference is not encoded; it is tracked by the owner.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::transform::{transform_point, Transform};

/// A 3D point cloud with optional normals and colors.
///
/// Every operation is total on an empty cloud.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PointCloud {
    /// Point positions in meters.
    pub points: Vec<Vector3<f64>>,
    /// Optional unit (or unset, zero) normals, one per point.
    pub normals: Option<Vec<Vector3<f64>>>,
    /// Optional RGB colors in [0, 1], one per point.
    pub colors: Option<Vec<Vector3<f64>>>,
}

impl PointCloud {
    /// Create an empty point cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a point cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            normals: None,
            colors: None,
        }
    }

    /// Create from positions only.
    pub fn from_points(points: Vec<Vector3<f64>>) -> Self {
        Self {
            points,
            normals: None,
            colors: None,
        }
    }

    /// Create from positions and optional attribute channels.
    ///
    /// # Panics
    ///
    /// Panics if a present attribute channel does not have exactly one
    /// entry per point.
    pub fn from_parts(
        points: Vec<Vector3<f64>>,
        normals: Option<Vec<Vector3<f64>>>,
        colors: Option<Vec<Vector3<f64>>>,
    ) -> Self {
        if let Some(ref n) = normals {
            assert_eq!(n.len(), points.len(), "normals length must match points");
        }
        if let Some(ref c) = colors {
            assert_eq!(c.len(), points.len(), "colors length must match points");
        }
        Self {
            points,
            normals,
            colors,
        }
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether a normal channel is present and non-empty.
    #[inline]
    pub fn has_normals(&self) -> bool {
        self.normals.as_ref().is_some_and(|n| !n.is_empty())
    }

    /// Whether a color channel is present and non-empty.
    #[inline]
    pub fn has_colors(&self) -> bool {
        self.colors.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Clear all points and attributes.
    pub fn clear(&mut self) {
        self.points.clear();
        if let Some(ref mut n) = self.normals {
            n.clear();
        }
        if let Some(ref mut c) = self.colors {
            c.clear();
        }
    }

    /// Add a point. Present attribute channels receive a zero entry.
    #[inline]
    pub fn push(&mut self, point: Vector3<f64>) {
        self.points.push(point);
        if let Some(ref mut n) = self.normals {
            n.push(Vector3::zeros());
        }
        if let Some(ref mut c) = self.colors {
            c.push(Vector3::zeros());
        }
    }

    /// Apply a rigid transform, returning a new cloud.
    ///
    /// Points receive the full isometry; normals receive the rotation only;
    /// colors are untouched.
    pub fn transform(&self, t: &Transform) -> PointCloud {
        let mut out = self.clone();
        out.transform_mut(t);
        out
    }

    /// In-place variant of [`transform`](Self::transform).
    pub fn transform_mut(&mut self, t: &Transform) {
        for p in &mut self.points {
            *p = transform_point(t, p);
        }
        if let Some(ref mut normals) = self.normals {
            for n in normals.iter_mut() {
                *n = t.rotation * *n;
            }
        }
    }

    /// Concatenate another cloud onto this one.
    ///
    /// An attribute channel survives only when both clouds carry it (an
    /// empty receiver adopts the other cloud wholesale).
    pub fn append(&mut self, other: &PointCloud) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = other.clone();
            return;
        }
        self.normals = match (self.normals.take(), &other.normals) {
            (Some(mut a), Some(b)) => {
                a.extend_from_slice(b);
                Some(a)
            }
            _ => None,
        };
        self.colors = match (self.colors.take(), &other.colors) {
            (Some(mut a), Some(b)) => {
                a.extend_from_slice(b);
                Some(a)
            }
            _ => None,
        };
        self.points.extend_from_slice(&other.points);
    }

    /// Return a new cloud containing the given point indices, attributes
    /// preserved. Out-of-range indices are a programmer error.
    pub fn select_by_index(&self, indices: &[usize]) -> PointCloud {
        let points = indices.iter().map(|&i| self.points[i]).collect();
        let normals = self
            .normals
            .as_ref()
            .map(|n| indices.iter().map(|&i| n[i]).collect());
        let colors = self
            .colors
            .as_ref()
            .map(|c| indices.iter().map(|&i| c[i]).collect());
        PointCloud {
            points,
            normals,
            colors,
        }
    }

    /// Remove the given point indices in place, attributes kept in sync.
    pub fn remove_by_index(&mut self, indices: &[usize]) {
        if indices.is_empty() {
            return;
        }
        let mut keep = vec![true; self.len()];
        for &i in indices {
            keep[i] = false;
        }
        retain_by_mask(&mut self.points, &keep);
        if let Some(ref mut n) = self.normals {
            retain_by_mask(n, &keep);
        }
        if let Some(ref mut c) = self.colors {
            retain_by_mask(c, &keep);
        }
    }

    /// Voxel-downsample: one point per occupied voxel, at the mean of the
    /// voxel's members. Present attribute channels are averaged as well.
    ///
    /// A non-positive voxel size disables downsampling and returns a copy.
    pub fn voxel_down_sample(&self, voxel_size: f64) -> PointCloud {
        if !(voxel_size > 0.0) || self.is_empty() {
            return self.clone();
        }

        struct Accum {
            position: Vector3<f64>,
            normal: Vector3<f64>,
            color: Vector3<f64>,
            count: usize,
        }

        let mut buckets: HashMap<[i32; 3], Accum> = HashMap::new();
        for (i, p) in self.points.iter().enumerate() {
            let key = [
                (p.x / voxel_size).floor() as i32,
                (p.y / voxel_size).floor() as i32,
                (p.z / voxel_size).floor() as i32,
            ];
            let acc = buckets.entry(key).or_insert_with(|| Accum {
                position: Vector3::zeros(),
                normal: Vector3::zeros(),
                color: Vector3::zeros(),
                count: 0,
            });
            acc.position += p;
            if let Some(ref n) = self.normals {
                acc.normal += n[i];
            }
            if let Some(ref c) = self.colors {
                acc.color += c[i];
            }
            acc.count += 1;
        }

        let mut out = PointCloud::with_capacity(buckets.len());
        out.normals = self.normals.as_ref().map(|_| Vec::with_capacity(buckets.len()));
        out.colors = self.colors.as_ref().map(|_| Vec::with_capacity(buckets.len()));
        for acc in buckets.into_values() {
            let inv = 1.0 / acc.count as f64;
            out.points.push(acc.position * inv);
            if let Some(ref mut n) = out.normals {
                n.push(acc.normal * inv);
            }
            if let Some(ref mut c) = out.colors {
                c.push(acc.color * inv);
            }
        }
        out
    }

    /// Centroid of the cloud, `None` when empty.
    pub fn centroid(&self) -> Option<Vector3<f64>> {
        if self.is_empty() {
            return None;
        }
        let sum: Vector3<f64> = self.points.iter().sum();
        Some(sum / self.len() as f64)
    }

    /// Rescale all normals to unit length. Zero (unset) normals are left
    /// untouched.
    pub fn normalize_normals(&mut self) {
        if let Some(ref mut normals) = self.normals {
            for n in normals.iter_mut() {
                let norm = n.norm();
                if norm > 0.0 {
                    *n /= norm;
                }
            }
        }
    }

    /// Flip normals so each has a non-negative dot product with the
    /// direction from its point toward `camera`.
    pub fn orient_normals_towards_camera_location(&mut self, camera: &Vector3<f64>) {
        if let Some(ref mut normals) = self.normals {
            for (n, p) in normals.iter_mut().zip(&self.points) {
                if n.dot(&(camera - p)) < 0.0 {
                    *n = -*n;
                }
            }
        }
    }

    /// Keep only points whose color is finite and within [0, 1].
    ///
    /// Clouds without a color channel pass through unchanged.
    pub fn filter_by_valid_color(&self) -> PointCloud {
        let colors = match &self.colors {
            Some(c) => c,
            None => return self.clone(),
        };
        let valid_indices: Vec<usize> = colors
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                c.iter()
                    .all(|v| v.is_finite() && (0.0..=1.0).contains(v))
            })
            .map(|(i, _)| i)
            .collect();
        self.select_by_index(&valid_indices)
    }
}

/// Keep `items[i]` where `mask[i]` is true, preserving order.
fn retain_by_mask<T>(items: &mut Vec<T>, mask: &[bool]) {
    let mut i = 0;
    items.retain(|_| {
        let keep = mask[i];
        i += 1;
        keep
    });
}
