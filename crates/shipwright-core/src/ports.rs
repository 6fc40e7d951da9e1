//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the core domain and external
//! adapters.

use crate::Result;
use crate::events::Event;
use async_trait::async_trait;
use std::path::Path;

/// Sink for run lifecycle events.
///
/// Sinks are fire-and-forget observers; emitting must never block a run.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Sink that drops every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

/// Destination package index with skip-existing semantics.
///
/// The index is append-only: an artifact's file name is its identity, and
/// storing the same identity twice is defined to be safe.
#[async_trait]
pub trait PackageIndex: Send + Sync {
    /// Whether an artifact of this identity is already present.
    async fn contains(&self, name: &str) -> Result<bool>;

    /// Store an artifact under its file name.
    async fn store(&self, path: &Path) -> Result<()>;
}
