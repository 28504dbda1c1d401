//! In-memory bucket backend.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{Bucket, SchedulerError};

/// Stored object container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// MIME type supplied on upload.
    pub content_type: String,
    /// Object bytes.
    pub bytes: Vec<u8>,
    /// Upload timestamp milliseconds.
    pub uploaded_at_ms: u128,
}

/// Simple in-memory bucket for development/testing.
#[derive(Debug, Default)]
pub struct InMemoryBucket {
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl InMemoryBucket {
    /// Create an empty bucket.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch an object by destination path.
    #[must_use]
    pub fn get(&self, destination: &str) -> Option<StoredObject> {
        self.objects.lock().get(destination).cloned()
    }

    /// Destination paths of every stored object, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl Bucket for InMemoryBucket {
    async fn upload(
        &self,
        content_type: &str,
        destination: &str,
        bytes: Vec<u8>,
    ) -> Result<(), SchedulerError> {
        self.objects.lock().insert(
            destination.to_string(),
            StoredObject {
                content_type: content_type.to_string(),
                bytes,
                uploaded_at_ms: crate::util::clock::now_ms(),
            },
        );
        Ok(())
    }
}
