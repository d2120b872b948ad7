//! Submap: a bounded, locally-consistent map fragment.
//!
//! A submap owns four representations of the same region, all expressed in
//! the world frame: the working map cloud, its sparse feature-downsampled
//! copy, a dense voxelized cloud built from raw scans, and a sparse voxel
//! index for adjacency queries. Scan insertion, space carving, feature
//! computation and rigid realignment by the outer optimizer keep the four
//! in sync.
//!
//! # Concurrency
//!
//! The submap is mutated by one mapping thread and one feature thread and
//! read concurrently through the lock-guarded getters. Two mutexes guard
//! the heavy collections:
//!
//! - the map mutex protects the map cloud and, transitively, the sparse
//!   map while it is being assigned;
//! - the dense mutex protects the dense voxelized cloud.
//!
//! Lock order when both are needed: map before dense (`transform` takes
//! both, so it appears atomic to readers that do the same). Pose,
//! parameters, index, features and timers are light metadata behind their
//! own locks; readers of those coordinate through the copy getters.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use nalgebra::Vector3;
use parking_lot::{
    MappedMutexGuard, MappedRwLockReadGuard, Mutex, MutexGuard, RwLock, RwLockReadGuard,
};

use crate::algorithms::carving::{
    carved_point_indices, carved_voxel_keys, SpaceCarvingParameters,
};
use crate::algorithms::cropping::CroppingVolume;
use crate::algorithms::features::fpfh::FpfhFeatures;
use crate::algorithms::features::normals::{estimate_normals, NormalSearch};
use crate::algorithms::features::extract_place_recognition_features;
use crate::algorithms::voxel::{VoxelMap, VoxelizedCloud};
use crate::core::types::{transform_point, PointCloud, Time, Transform};
use crate::engine::params::{IcpObjective, MapperParameters};
use crate::error::Result;
use crate::utils::timer::{GateTimer, TimingStats};

/// Expansion applied to the map voxel size for the adjacency index.
const VOXEL_EXPANSION_FACTOR: f64 = 1.5;

/// The dense-map cropper runs slightly wider than configured so carving
/// candidates are not clipped at the insertion boundary.
const DENSE_CROPPER_RADIUS_INFLATION: f64 = 1.2;

/// Wall-clock window between carve telemetry reports, seconds.
const CARVE_STATS_REPORT_WINDOW_SEC: f64 = 20.0;

/// The two cloud representations guarded by the map mutex.
struct MapState {
    map_cloud: PointCloud,
    sparse_map: PointCloud,
}

/// Pose-level metadata, single-writer from the mapping thread.
struct PoseState {
    map_to_submap: Transform,
    map_to_range_sensor: Transform,
    submap_center: Option<Vector3<f64>>,
    creation_time: Option<Time>,
}

struct Croppers {
    map_builder: CroppingVolume,
    dense_map: CroppingVolume,
}

struct Timers {
    carving: GateTimer,
    dense_carving: GateTimer,
    feature: GateTimer,
    carving_stats: TimingStats,
}

/// A local map fragment with its own origin transform and lifecycle.
///
/// Created empty, filled by [`insert_scan`](Self::insert_scan) and
/// [`insert_scan_dense_map`](Self::insert_scan_dense_map), periodically
/// refreshed by [`compute_features`](Self::compute_features), realigned by
/// [`transform`](Self::transform), and read by the outer system until a
/// successor submap takes over.
pub struct Submap {
    id: u64,
    parent_id: u64,
    params: RwLock<MapperParameters>,
    pose: RwLock<PoseState>,
    map_state: Mutex<MapState>,
    dense_map: Mutex<VoxelizedCloud>,
    voxel_map: RwLock<VoxelMap>,
    features: RwLock<Option<FpfhFeatures>>,
    croppers: Mutex<Croppers>,
    timers: Mutex<Timers>,
    first_dense_scan: AtomicBool,
}

impl Submap {
    /// Create an empty submap. `parent_id` links to the predecessor when a
    /// new submap is spawned (a root submap is its own parent).
    pub fn new(id: u64, parent_id: u64, params: MapperParameters) -> Result<Self> {
        params.validate()?;
        let croppers = Self::build_croppers(&params)?;
        let dense_map = VoxelizedCloud::new(params.dense_map_builder.map_voxel_size);
        let voxel_map = VoxelMap::new(params.map_builder.map_voxel_size * VOXEL_EXPANSION_FACTOR);
        Ok(Self {
            id,
            parent_id,
            params: RwLock::new(params),
            pose: RwLock::new(PoseState {
                map_to_submap: Transform::identity(),
                map_to_range_sensor: Transform::identity(),
                submap_center: None,
                creation_time: None,
            }),
            map_state: Mutex::new(MapState {
                map_cloud: PointCloud::new(),
                sparse_map: PointCloud::new(),
            }),
            dense_map: Mutex::new(dense_map),
            voxel_map: RwLock::new(voxel_map),
            features: RwLock::new(None),
            croppers: Mutex::new(croppers),
            timers: Mutex::new(Timers {
                carving: GateTimer::new(),
                dense_carving: GateTimer::new(),
                feature: GateTimer::new(),
                carving_stats: TimingStats::new(),
            }),
            first_dense_scan: AtomicBool::new(true),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn parent_id(&self) -> u64 {
        self.parent_id
    }

    /// Integrate a registered scan into the working map.
    ///
    /// The preprocessed scan (sensor frame) is transformed by
    /// `map_to_range_sensor`, given normals when the matcher objective
    /// needs them, appended to the map cloud and re-voxelized inside the
    /// sensor-anchored cropping volume. With `perform_carving`, map points
    /// proven stale by the raw scan are removed first, under the carve
    /// gate timer.
    ///
    /// An empty preprocessed scan is a silent success: no state changes,
    /// not even the sensor pose.
    pub fn insert_scan(
        &self,
        raw_scan: &PointCloud,
        preprocessed_scan: &PointCloud,
        map_to_range_sensor: &Transform,
        time: Time,
        perform_carving: bool,
    ) -> bool {
        if preprocessed_scan.is_empty() {
            return true;
        }
        let params = self.params.read().clone();

        let mut transformed = preprocessed_scan.transform(map_to_range_sensor);
        self.estimate_normals_if_needed(&params, &mut transformed);

        let mut map_state = self.map_state.lock();
        {
            let mut pose = self.pose.write();
            if map_state.map_cloud.is_empty() && pose.creation_time.is_none() {
                pose.creation_time = Some(time);
            }
            pose.map_to_range_sensor = *map_to_range_sensor;
        }

        let mut croppers = self.croppers.lock();
        if perform_carving {
            let mut timers = self.timers.lock();
            let stopwatch = Instant::now();
            Self::carve_map_cloud(
                raw_scan,
                map_to_range_sensor,
                &croppers.map_builder,
                &params.map_builder.carving,
                &mut map_state.map_cloud,
                &mut timers.carving,
            );
            timers
                .carving_stats
                .add_measurement_msec(stopwatch.elapsed().as_secs_f64() * 1e3);
            Self::report_carve_stats_if_due(&mut timers.carving_stats);
        }

        map_state.map_cloud.append(&transformed);
        croppers.map_builder.set_pose(map_to_range_sensor);
        voxelize_within_cropping_volume(
            &croppers.map_builder,
            params.map_builder.map_voxel_size,
            &mut map_state.map_cloud,
        );
        true
    }

    /// Integrate a raw scan into the dense voxelized map.
    ///
    /// The scan is color-filtered and cropped in the sensor frame, then
    /// transformed to the world frame and merged into the dense grid; with
    /// `perform_carving`, stale voxels are removed under the dense carve
    /// gate. The very first dense scan is skipped and reports `false`.
    pub fn insert_scan_dense_map(
        &self,
        raw_scan: &PointCloud,
        map_to_range_sensor: &Transform,
        _time: Time,
        perform_carving: bool,
    ) -> bool {
        if self.first_dense_scan.swap(false, Ordering::AcqRel) {
            return false;
        }
        let params = self.params.read().clone();

        let filtered = raw_scan.filter_by_valid_color();
        let cropped = {
            let mut croppers = self.croppers.lock();
            croppers.dense_map.set_pose(&Transform::identity());
            croppers.dense_map.crop(&filtered)
        };
        let transformed = cropped.transform(map_to_range_sensor);

        let mut dense = self.dense_map.lock();
        dense.insert(&transformed);
        if perform_carving {
            let mut timers = self.timers.lock();
            Self::carve_dense_map(
                raw_scan,
                map_to_range_sensor,
                &params.dense_map_builder.carving,
                &mut dense,
                &mut timers.dense_carving,
            );
        }
        true
    }

    /// Rigidly realign the whole submap by `t`.
    ///
    /// Advances the sparse map, the map cloud, the dense map and the
    /// cached center together, and right-composes the sensor pose. Both
    /// collection locks are held for the duration, so a reader taking both
    /// observes the move atomically.
    pub fn transform(&self, t: &Transform) {
        let mut map_state = self.map_state.lock();
        let mut dense = self.dense_map.lock();
        map_state.sparse_map.transform_mut(t);
        map_state.map_cloud.transform_mut(t);
        dense.transform(t);
        let mut pose = self.pose.write();
        pose.map_to_range_sensor = pose.map_to_range_sensor * t;
        if let Some(center) = pose.submap_center.as_mut() {
            *center = transform_point(t, center);
        }
    }

    /// Replace the parameters; rebuilds both cropping volumes and discards
    /// the dense map and the voxel index so they restart at the new voxel
    /// sizes.
    pub fn set_parameters(&self, params: &MapperParameters) -> Result<()> {
        params.validate()?;
        let croppers = Self::build_croppers(params)?;
        *self.params.write() = params.clone();
        *self.croppers.lock() = croppers;
        *self.dense_map.lock() = VoxelizedCloud::new(params.dense_map_builder.map_voxel_size);
        *self.voxel_map.write() =
            VoxelMap::new(params.map_builder.map_voxel_size * VOXEL_EXPANSION_FACTOR);
        log::debug!(
            "Submap {}: rebuilt croppers and voxel grids from new parameters",
            self.id
        );
        Ok(())
    }

    /// Recompute the sparse feature cloud, its FPFH descriptors and the
    /// voxel index from a snapshot of the map cloud.
    ///
    /// The index rebuild runs on a worker thread overlapped with the
    /// descriptor pipeline and is joined before results are installed.
    /// Once features exist, recomputation is gated by
    /// `min_seconds_between_feature_computation`; a gated call changes
    /// nothing and returns `false`.
    pub fn compute_features(&self) -> bool {
        let params = self.params.read().clone();
        {
            let timers = self.timers.lock();
            if self.features.read().is_some()
                && timers.feature.elapsed_sec()
                    < params.submaps.min_seconds_between_feature_computation
            {
                return false;
            }
        }
        let snapshot = self.map_state.lock().map_cloud.clone();

        let mut rebuilt_index =
            VoxelMap::new(params.map_builder.map_voxel_size * VOXEL_EXPANSION_FACTOR);
        let mut sparse = PointCloud::new();
        let mut descriptors = FpfhFeatures::default();
        thread::scope(|scope| {
            let index_worker = scope.spawn(|| {
                rebuilt_index.insert_cloud(VoxelMap::MAP_LAYER, &snapshot);
            });
            let (sparse_cloud, computed) =
                extract_place_recognition_features(&snapshot, &params.place_recognition);
            sparse = sparse_cloud;
            descriptors = computed;
            index_worker
                .join()
                .expect("voxel-map rebuild worker panicked");
        });

        self.map_state.lock().sparse_map = sparse;
        *self.voxel_map.write() = rebuilt_index;
        *self.features.write() = Some(descriptors);
        self.timers.lock().feature.reset();
        true
    }

    /// Cache the centroid of the map cloud as the submap center.
    pub fn compute_submap_center(&self) {
        let center = self
            .map_state
            .lock()
            .map_cloud
            .centroid()
            .unwrap_or_else(Vector3::zeros);
        self.pose.write().submap_center = Some(center);
    }

    /// Submap origin in the world frame.
    pub fn map_to_submap_origin(&self) -> Transform {
        self.pose.read().map_to_submap
    }

    pub fn set_map_to_submap_origin(&self, t: &Transform) {
        self.pose.write().map_to_submap = *t;
    }

    /// Cached center when computed, otherwise the origin translation.
    pub fn map_to_submap_center(&self) -> Vector3<f64> {
        let pose = self.pose.read();
        pose.submap_center
            .unwrap_or_else(|| pose.map_to_submap.translation.vector)
    }

    /// Most recent sensor pose recorded by `insert_scan`.
    pub fn map_to_range_sensor(&self) -> Transform {
        self.pose.read().map_to_range_sensor
    }

    /// Time of the first insertion that produced a non-empty map.
    pub fn creation_time(&self) -> Option<Time> {
        self.pose.read().creation_time
    }

    /// The working map cloud, behind the map mutex. The guard blocks the
    /// mapping thread; hold it briefly or use
    /// [`map_point_cloud_copy`](Self::map_point_cloud_copy).
    pub fn map_point_cloud(&self) -> MappedMutexGuard<'_, PointCloud> {
        MutexGuard::map(self.map_state.lock(), |s| &mut s.map_cloud)
    }

    /// Deep copy of the working map cloud taken under the map mutex.
    pub fn map_point_cloud_copy(&self) -> PointCloud {
        self.map_state.lock().map_cloud.clone()
    }

    /// The sparse feature cloud as of the last `compute_features`.
    pub fn sparse_map_point_cloud(&self) -> MappedMutexGuard<'_, PointCloud> {
        MutexGuard::map(self.map_state.lock(), |s| &mut s.sparse_map)
    }

    /// The dense voxelized map, behind the dense mutex.
    pub fn dense_map(&self) -> MutexGuard<'_, VoxelizedCloud> {
        self.dense_map.lock()
    }

    /// Deep copy of the dense map taken under the dense mutex.
    pub fn dense_map_copy(&self) -> VoxelizedCloud {
        self.dense_map.lock().clone()
    }

    /// The sparse voxel index as of the last `compute_features`.
    pub fn voxel_map(&self) -> RwLockReadGuard<'_, VoxelMap> {
        self.voxel_map.read()
    }

    /// FPFH descriptors of the sparse map.
    ///
    /// # Panics
    ///
    /// Panics when called before the first successful
    /// [`compute_features`](Self::compute_features); that is a programmer
    /// error, not a runtime condition.
    pub fn features(&self) -> MappedRwLockReadGuard<'_, FpfhFeatures> {
        RwLockReadGuard::map(self.features.read(), |f| {
            f.as_ref()
                .expect("submap features requested before compute_features")
        })
    }

    /// Whether `compute_features` has ever completed.
    pub fn features_computed(&self) -> bool {
        self.features.read().is_some()
    }

    /// Whether the working map holds no points.
    pub fn is_empty(&self) -> bool {
        self.map_state.lock().map_cloud.is_empty()
    }

    /// Snapshot of the current parameters.
    pub fn parameters(&self) -> MapperParameters {
        self.params.read().clone()
    }

    fn estimate_normals_if_needed(&self, params: &MapperParameters, cloud: &mut PointCloud) {
        if params.scan_matcher.icp_objective == IcpObjective::PointToPlane && !cloud.has_normals()
        {
            estimate_normals(
                cloud,
                NormalSearch::Knn(params.scan_matcher.knn_normal_estimation),
            );
            cloud.normalize_normals();
        }
    }

    /// Point-cloud carve under the gate timer: no-op on an empty map or
    /// before the interval has elapsed. Candidates are restricted to the
    /// cropping volume (still anchored at the previous sensor pose).
    fn carve_map_cloud(
        raw_scan: &PointCloud,
        map_to_range_sensor: &Transform,
        cropper: &CroppingVolume,
        params: &SpaceCarvingParameters,
        map: &mut PointCloud,
        timer: &mut GateTimer,
    ) {
        if map.is_empty() || !timer.has_elapsed(params.carve_space_every_n_sec) {
            return;
        }
        let scan_world = raw_scan.transform(map_to_range_sensor);
        let candidates = cropper.indices_within(map);
        let carved = carved_point_indices(
            &scan_world,
            map,
            &map_to_range_sensor.translation.vector,
            &candidates,
            params,
        );
        map.remove_by_index(&carved);
        timer.reset();
    }

    /// Voxel carve under its own gate timer.
    fn carve_dense_map(
        raw_scan: &PointCloud,
        map_to_range_sensor: &Transform,
        params: &SpaceCarvingParameters,
        dense: &mut VoxelizedCloud,
        timer: &mut GateTimer,
    ) {
        if dense.is_empty() || !timer.has_elapsed(params.carve_space_every_n_sec) {
            return;
        }
        let scan_world = raw_scan.transform(map_to_range_sensor);
        let keys = carved_voxel_keys(
            &scan_world,
            dense,
            &map_to_range_sensor.translation.vector,
            params,
        );
        for key in &keys {
            dense.remove_key(key);
        }
        timer.reset();
    }

    fn report_carve_stats_if_due(stats: &mut TimingStats) {
        if stats.elapsed_sec() > CARVE_STATS_REPORT_WINDOW_SEC {
            let avg = stats.avg_measurement_msec();
            if avg > 0.0 {
                log::info!(
                    "Space carving timing stats: Avg execution time: {} msec , frequency: {} Hz",
                    avg,
                    1e3 / avg
                );
            }
            stats.reset();
        }
    }

    fn build_croppers(params: &MapperParameters) -> Result<Croppers> {
        let map_builder = CroppingVolume::from_parameters(&params.map_builder.cropper)?;
        let mut dense_cropper = params.dense_map_builder.cropper.clone();
        dense_cropper.radius *= DENSE_CROPPER_RADIUS_INFLATION;
        let dense_map = CroppingVolume::from_parameters(&dense_cropper)?;
        Ok(Croppers {
            map_builder,
            dense_map,
        })
    }
}

/// Voxel-downsample only the part of the map inside the cropping volume,
/// leaving the rest untouched. Disabled by a non-positive voxel size.
fn voxelize_within_cropping_volume(
    cropper: &CroppingVolume,
    voxel_size: f64,
    map: &mut PointCloud,
) {
    if voxel_size <= 0.0 || map.is_empty() {
        return;
    }
    let inside = cropper.indices_within(map);
    if inside.is_empty() {
        return;
    }
    let voxelized = map.select_by_index(&inside).voxel_down_sample(voxel_size);
    map.remove_by_index(&inside);
    map.append(&voxelized);
}
