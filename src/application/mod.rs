//! Core of the engine: the orchestrator and everything it is wired against.

pub mod dispatch;
pub mod error;
pub mod options;
pub mod registry;
pub mod rendition;
pub mod repos;
pub mod tx;
