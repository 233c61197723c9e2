//! Records: schema trees whose leaves are bound to external storage
//!
//! Storage is reached only through the traits in [`storage`]. The crate ships
//! an in-memory store and a name scope for tests and small tools.

#![warn(missing_docs)]

pub mod binding;
pub mod error;
pub mod memory;
pub mod naming;
pub mod storage;

pub use binding::{
    allocate, bind, const_record, init_empty_record, materialize, persist, AllocateOptions,
    LeafValues,
};
#[cfg(feature = "parallel")]
pub use binding::materialize_par;
pub use error::{Error, Result};
pub use memory::{MemoryStore, StoreError};
pub use naming::NameScope;
pub use storage::{NameGenerator, StorageAllocator, StorageReader, StorageWriter};
