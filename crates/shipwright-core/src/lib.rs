//! Shipwright Core
//!
//! Core domain types, traits, and error handling for Shipwright.
//! This crate has minimal dependencies and defines the shared vocabulary
//! used across all other crates.

pub mod credentials;
pub mod error;
pub mod events;
pub mod ids;
pub mod interpolation;
pub mod patterns;
pub mod pipeline;
pub mod ports;
pub mod run;

pub use error::{Error, Result};
pub use ids::*;
