use bytes::Bytes;
use dashmap::DashMap;
use uuid::Uuid;

use crate::application::repos::{ContentStore, StoreError};

pub const LOCATOR_SCHEME: &str = "store://";

/// Write-once blob store; every write gets a fresh locator.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: DashMap<String, Bytes>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl ContentStore for MemoryContentStore {
    fn read(&self, locator: &str) -> Result<Bytes, StoreError> {
        self.blobs
            .get(locator)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::ContentNotFound(locator.to_string()))
    }

    fn write(&self, bytes: &[u8]) -> Result<String, StoreError> {
        let locator = format!("{LOCATOR_SCHEME}{}", Uuid::new_v4());
        self.blobs
            .insert(locator.clone(), Bytes::copy_from_slice(bytes));
        Ok(locator)
    }
}
