//! Job types as seen by the lock layer
//!
//! This module provides:
//! - `JobDescriptor`: the lock configuration a job type declares
//! - `Job`: the execution hook a worker invokes
//! - Capability sets and the registration-time lint over them
//! - `JobRegistry` for registering job types up front

mod model;
mod registry;

pub use model::*;
pub use registry::*;
