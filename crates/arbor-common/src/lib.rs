//! Arbor common types, errors, and utilities.
//!
//! This crate provides shared definitions used across all Arbor components.

pub mod config;
pub mod error;
pub mod probe;

pub use config::IndexConfig;
pub use error::{ArborError, Result};
pub use probe::{Phase, Probe, ProbeSink, TraceEvent};
