//! Domain layer: identifiers, content descriptors, fingerprints and definitions.

pub mod content;
pub mod definitions;
pub mod error;
pub mod fingerprint;
pub mod types;
