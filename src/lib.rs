//! Asynchronous rendition orchestration for a versioned content repository.
//!
//! Requests made inside a transaction are dispatched to transform engines
//! after it commits. Results are applied to rendition nodes only while the
//! source content is still the content they were produced from.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;

mod util;
