//! Shipwright Scheduler
//!
//! Expands the job graph for a triggering event and walks it to
//! completion: trigger evaluation, matrix expansion, dependency gating,
//! and per-instance fan-out.

pub mod coordinator;
pub mod dag;
pub mod matrix;
pub mod triggers;

pub use coordinator::{CoordinatorConfig, RunCoordinator};
pub use dag::{DagBuilder, DagError, JobDag};
pub use matrix::{MatrixCombination, MatrixExpander};
pub use triggers::{TriggerEvent, TriggerMatcher};
