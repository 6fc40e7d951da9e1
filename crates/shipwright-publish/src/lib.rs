//! Shipwright Publish
//!
//! Terminal publish operation: merge committed artifact slots and push
//! each file to a package index with skip-existing semantics.

pub mod index;
pub mod publisher;

pub use index::DirIndex;
pub use publisher::{PublishOutcome, PublishReport, PublishStatus, Publisher};
