//! Traits for the external storage a record is bound to

/// Resolves storage handles to the data they reference
pub trait StorageReader<H> {
    /// The concrete data stored behind a handle
    type Value;

    /// The error type reported by this reader
    type Error: std::error::Error + 'static;

    /// Read the data behind `handle`. May block.
    fn read(&self, handle: &H) -> Result<Self::Value, Self::Error>;
}

/// Writes data behind storage handles
pub trait StorageWriter<H, V> {
    /// The error type reported by this writer
    type Error: std::error::Error + 'static;

    /// Store `value` behind `handle`. May block.
    fn write(&mut self, handle: &H, value: &V) -> Result<(), Self::Error>;
}

/// Creates fresh storage handles
pub trait StorageAllocator {
    /// The handle type produced by this allocator
    type Handle;

    /// The error type reported by this allocator
    type Error: std::error::Error + 'static;

    /// Register a new handle under `name`
    fn create(&mut self, name: &str) -> Result<Self::Handle, Self::Error>;
}

/// Produces names that are unique within some scope
pub trait NameGenerator {
    /// Get an unused name derived from `prefix`
    fn next_name(&mut self, prefix: &str) -> String;
}

impl<F> NameGenerator for F
where
    F: FnMut(&str) -> String,
{
    fn next_name(&mut self, prefix: &str) -> String {
        self(prefix)
    }
}
