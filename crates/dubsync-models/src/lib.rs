//! Shared data models for the dubsync pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Face bounding-box geometry and padding
//! - Report events emitted to a supervising process
//! - Inference device selection

pub mod device;
pub mod events;
pub mod geometry;

// Re-export common types
pub use device::{Device, DeviceParseError};
pub use events::{DubSummary, ReportEvent};
pub use geometry::{BoundingBox, CropRect, PadSpec};
