//! Infrastructure adapters for task stores and log buckets.

pub mod bucket;
pub mod store;
pub use bucket::{DirectoryBucket, InMemoryBucket};
pub use store::{FileTaskStore, InMemoryTaskStore};
