//! aot-classify - managed-module classification for native AOT publishing
//!
//! Given the closure of managed binary modules a build produced, this crate
//! decides for each one whether it should be handed to the ahead-of-time
//! native compiler and whether it should be dropped from the ordinary
//! publish output. It classifies; it never compiles, modifies, or resolves
//! anything. The caller feeds `managed_assemblies` to the native compiler
//! and removes `assemblies_to_skip_publish` from the publish directory.

pub mod classify;
pub mod metadata;
pub mod types;

pub use classify::ClassificationEngine;
pub use metadata::{inspect, ModuleMetadata};
pub use types::*;
