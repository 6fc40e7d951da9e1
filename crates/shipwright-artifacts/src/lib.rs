//! Shipwright Artifacts
//!
//! Write-once, read-many artifact channel scoped to a single run. Each
//! committed slot is an immutable tar+zstd bundle addressed by
//! (run, slot key, producer).

pub mod archiver;
pub mod digest;
pub mod store;

pub use store::{ArtifactEntry, ArtifactStore};
