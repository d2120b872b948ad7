//! Core foundation types: point clouds and rigid transforms.

pub mod types;
