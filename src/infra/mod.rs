//! Infrastructure adapters and runtime bootstrap.

pub mod capabilities;
pub mod config_source;
pub mod engine;
pub mod error;
pub mod memory;
pub mod telemetry;
