//! Normal estimation by local plane fitting.
//!
//! The normal of a point is the eigenvector of the smallest eigenvalue of
//! the covariance of its neighborhood. Neighborhoods come from a k-d tree,
//! either plain knn or a hybrid search (all neighbors within a radius,
//! capped at a maximum count).

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Matrix3, SymmetricEigen, Vector3};

use crate::core::types::PointCloud;

/// Neighborhood selection for normal estimation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormalSearch {
    /// The k nearest neighbors.
    Knn(usize),
    /// Neighbors within `radius`, at most `max_nn` of them.
    Hybrid { radius: f64, max_nn: usize },
}

/// Estimate a normal per point by plane fit over its neighborhood.
///
/// Points with fewer than 3 neighbors (the point itself included) keep a
/// zero (unset) normal. The whole cloud receives a normal channel, so an
/// empty cloud ends up with an empty one.
pub fn estimate_normals(cloud: &mut PointCloud, search: NormalSearch) {
    let n = cloud.len();
    let mut normals = vec![Vector3::zeros(); n];
    if n >= 3 {
        let tree = build_kdtree(cloud);
        for (i, p) in cloud.points.iter().enumerate() {
            let neighbors = search_neighbors(&tree, p, &search, n);
            if neighbors.len() < 3 {
                continue;
            }
            if let Some(normal) = plane_normal(&cloud.points, &neighbors) {
                normals[i] = normal;
            }
        }
    }
    cloud.normals = Some(normals);
}

/// Build a k-d tree over a cloud's points, indexed by point position.
pub fn build_kdtree(cloud: &PointCloud) -> KdTree<f64, 3> {
    let mut tree: KdTree<f64, 3> = KdTree::new();
    for (i, p) in cloud.points.iter().enumerate() {
        tree.add(&[p.x, p.y, p.z], i as u64);
    }
    tree
}

/// Neighbor indices of a query point under the given search, sorted by
/// ascending distance.
pub fn search_neighbors(
    tree: &KdTree<f64, 3>,
    query: &Vector3<f64>,
    search: &NormalSearch,
    num_points: usize,
) -> Vec<usize> {
    let q = [query.x, query.y, query.z];
    match *search {
        NormalSearch::Knn(k) => tree
            .nearest_n::<SquaredEuclidean>(&q, k.min(num_points))
            .iter()
            .map(|nb| nb.item as usize)
            .collect(),
        NormalSearch::Hybrid { radius, max_nn } => {
            let mut found = tree.within::<SquaredEuclidean>(&q, radius * radius);
            found.truncate(max_nn);
            found.iter().map(|nb| nb.item as usize).collect()
        }
    }
}

/// Hybrid neighbor search returning (index, distance) pairs.
pub fn search_hybrid(
    tree: &KdTree<f64, 3>,
    query: &Vector3<f64>,
    radius: f64,
    max_nn: usize,
) -> Vec<(usize, f64)> {
    let q = [query.x, query.y, query.z];
    let mut found = tree.within::<SquaredEuclidean>(&q, radius * radius);
    found.truncate(max_nn);
    found
        .iter()
        .map(|nb| (nb.item as usize, nb.distance.sqrt()))
        .collect()
}

/// Smallest-eigenvalue eigenvector of the neighborhood covariance, or
/// `None` for a degenerate neighborhood.
fn plane_normal(points: &[Vector3<f64>], neighbors: &[usize]) -> Option<Vector3<f64>> {
    let inv = 1.0 / neighbors.len() as f64;
    let mut mean = Vector3::zeros();
    for &j in neighbors {
        mean += points[j];
    }
    mean *= inv;

    let mut covariance = Matrix3::zeros();
    for &j in neighbors {
        let d = points[j] - mean;
        covariance += d * d.transpose();
    }
    covariance *= inv;

    let eigen = SymmetricEigen::new(covariance);
    let mut min_index = 0;
    for k in 1..3 {
        if eigen.eigenvalues[k] < eigen.eigenvalues[min_index] {
            min_index = k;
        }
    }
    let normal: Vector3<f64> = eigen.eigenvectors.column(min_index).into_owned();
    let norm = normal.norm();
    (norm > 0.0).then(|| normal / norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn xy_plane_cloud() -> PointCloud {
        let mut points = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                points.push(Vector3::new(i as f64 * 0.1, j as f64 * 0.1, 0.0));
            }
        }
        PointCloud::from_points(points)
    }

    #[test]
    fn test_plane_normals_along_z() {
        let mut cloud = xy_plane_cloud();
        estimate_normals(&mut cloud, NormalSearch::Knn(8));
        for n in cloud.normals.as_ref().unwrap() {
            assert_relative_eq!(n.z.abs(), 1.0, epsilon = 1e-9);
            assert_relative_eq!(n.x, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_hybrid_matches_plane() {
        let mut cloud = xy_plane_cloud();
        estimate_normals(
            &mut cloud,
            NormalSearch::Hybrid {
                radius: 0.3,
                max_nn: 12,
            },
        );
        for n in cloud.normals.as_ref().unwrap() {
            assert_relative_eq!(n.z.abs(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_too_few_points_leaves_normals_unset() {
        let mut cloud = PointCloud::from_points(vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
        ]);
        estimate_normals(&mut cloud, NormalSearch::Knn(5));
        let normals = cloud.normals.as_ref().unwrap();
        assert_eq!(normals.len(), 2);
        assert!(normals.iter().all(|n| n.norm() == 0.0));
    }

    #[test]
    fn test_empty_cloud_gets_empty_channel() {
        let mut cloud = PointCloud::new();
        estimate_normals(&mut cloud, NormalSearch::Knn(5));
        assert_eq!(cloud.normals.as_ref().unwrap().len(), 0);
    }

    #[test]
    fn test_hybrid_radius_excludes_far_points() {
        // Two tight clusters far apart: hybrid search must not bridge them.
        let mut points = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.1, 0.0, 0.0),
            Vector3::new(0.0, 0.1, 0.0),
        ];
        points.push(Vector3::new(100.0, 0.0, 0.0));
        let cloud = PointCloud::from_points(points);
        let tree = build_kdtree(&cloud);
        let neighbors = search_neighbors(
            &tree,
            &cloud.points[0],
            &NormalSearch::Hybrid {
                radius: 1.0,
                max_nn: 10,
            },
            cloud.len(),
        );
        assert_eq!(neighbors.len(), 3);
        assert!(!neighbors.contains(&3));
    }
}
