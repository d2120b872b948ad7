//! MeruMap - Submap-based 3D LiDAR mapping engine
//!
//! A submap is a bounded, locally-consistent 3D map fragment assembled
//! incrementally from range-sensor scans registered into a common frame.
//! This crate owns the logic for integrating new scans into the map,
//! removing stale geometry via space carving, keeping sparse and dense
//! representations in sync under mutation, and producing FPFH
//! place-recognition features for an outer loop-closure layer.
//!
//! # Architecture
//!
//! The crate is organized into 4 logical layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Orchestration
//! │              (submap, parameters)                   │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                  algorithms/                        │  ← Core algorithms
//! │     (cropping, voxel grids, carving, features)      │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │               (cloud, transform)                    │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    utils/                           │  ← Timers, stats
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Data flow per scan
//!
//! `preprocessed scan + raw scan + pose → (carve) → transform + append →
//! crop-bounded voxelize → map cloud`. Periodically the map cloud is
//! downsampled into a sparse feature cloud with oriented normals and FPFH
//! descriptors, overlapped with a rebuild of the sparse voxel index. Raw
//! scans additionally feed a dense voxelized cloud through their own
//! cropping volume and carving gate.
//!
//! # Concurrency
//!
//! A [`Submap`](engine::Submap) is mutated by a mapping thread and a
//! feature thread and read concurrently through lock-guarded getters. Two
//! mutexes guard the two heavy collections (map cloud and dense map);
//! everything else is light metadata behind read-write locks. See the
//! `engine::submap` module docs for the lock order.

// ============================================================================
// Layer 0: Utilities (no internal deps)
// ============================================================================
pub mod utils;

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Algorithms (depends on core)
// ============================================================================
pub mod algorithms;

// ============================================================================
// Layer 3: Mapping engine (depends on core, algorithms)
// ============================================================================
pub mod engine;

mod error;

pub use error::{MeruError, Result};

// Core types
pub use crate::core::types::{PointCloud, Time, Transform};

// Algorithms
pub use algorithms::cropping::{CroppingVolume, CroppingVolumeKind};
pub use algorithms::features::fpfh::FpfhFeatures;
pub use algorithms::features::normals::NormalSearch;
pub use algorithms::voxel::{VoxelKey, VoxelMap, VoxelizedCloud};

// Engine
pub use engine::params::{
    CropperParameters, IcpObjective, MapBuilderParameters, MapperParameters,
    PlaceRecognitionParameters, ScanMatcherParameters, SpaceCarvingParameters, SubmapParameters,
};
pub use engine::submap::Submap;
