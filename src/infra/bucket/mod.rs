//! Bucket backends receiving shipped task logs.

pub mod directory;
pub mod memory;

pub use directory::DirectoryBucket;
pub use memory::InMemoryBucket;
