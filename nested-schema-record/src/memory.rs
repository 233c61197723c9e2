//! In-memory blob store

use std::collections::HashMap;

use nested_schema_core::BlobRef;
use thiserror::Error;

use crate::storage::{StorageAllocator, StorageReader, StorageWriter};

/// Errors reported by [`MemoryStore`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No blob is registered under this name
    #[error("Blob not found: {0}")]
    NotFound(String),

    /// A blob with this name was already created
    #[error("Blob already exists: {0}")]
    AlreadyExists(String),

    /// The blob was created but nothing was written to it
    #[error("Blob is empty: {0}")]
    Empty(String),
}

/// Blob store keeping every value in a hash map keyed by blob name
#[derive(Debug, Clone)]
pub struct MemoryStore<V> {
    blobs: HashMap<BlobRef, Option<V>>,
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self {
            blobs: HashMap::new(),
        }
    }
}

impl<V> MemoryStore<V> {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered blobs
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Check if no blob is registered
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Check if a blob is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.blobs.contains_key(&BlobRef::new(name))
    }

    /// Get the value written behind `handle`, if any
    pub fn get(&self, handle: &BlobRef) -> Option<&V> {
        self.blobs.get(handle).and_then(Option::as_ref)
    }

    /// Remove a blob and return its value
    pub fn remove(&mut self, handle: &BlobRef) -> Option<V> {
        self.blobs.remove(handle).flatten()
    }
}

impl<V: Clone> StorageReader<BlobRef> for MemoryStore<V> {
    type Value = V;
    type Error = StoreError;

    fn read(&self, handle: &BlobRef) -> Result<V, StoreError> {
        match self.blobs.get(handle) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => Err(StoreError::Empty(handle.name().to_string())),
            None => Err(StoreError::NotFound(handle.name().to_string())),
        }
    }
}

impl<V: Clone> StorageWriter<BlobRef, V> for MemoryStore<V> {
    type Error = StoreError;

    fn write(&mut self, handle: &BlobRef, value: &V) -> Result<(), StoreError> {
        self.blobs.insert(handle.clone(), Some(value.clone()));
        Ok(())
    }
}

impl<V> StorageAllocator for MemoryStore<V> {
    type Handle = BlobRef;
    type Error = StoreError;

    fn create(&mut self, name: &str) -> Result<BlobRef, StoreError> {
        let handle = BlobRef::new(name);
        if self.blobs.contains_key(&handle) {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        self.blobs.insert(handle.clone(), None);
        Ok(handle)
    }
}
