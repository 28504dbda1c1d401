//! Tests for bucket backends

use prometheus_job_scheduler::core::{Bucket, LOG_CONTENT_TYPE};
use prometheus_job_scheduler::infra::{DirectoryBucket, InMemoryBucket};

#[tokio::test]
async fn test_in_memory_bucket_stores_objects() {
    let bucket = InMemoryBucket::new();
    bucket
        .upload(LOG_CONTENT_TYPE, "logs/a.log", b"hello".to_vec())
        .await
        .unwrap();

    let object = bucket.get("logs/a.log").unwrap();
    assert_eq!(object.bytes, b"hello");
    assert_eq!(object.content_type, LOG_CONTENT_TYPE);
    assert_eq!(bucket.keys(), vec!["logs/a.log".to_string()]);
    assert!(bucket.get("logs/b.log").is_none());
}

#[tokio::test]
async fn test_directory_bucket_writes_below_root() {
    let root = std::env::temp_dir().join(format!("pjs-bucket-{}", uuid::Uuid::new_v4()));
    let bucket = DirectoryBucket::new(&root);
    bucket
        .upload(LOG_CONTENT_TYPE, "logs/task.log", b"line\n".to_vec())
        .await
        .unwrap();
    assert_eq!(std::fs::read(root.join("logs/task.log")).unwrap(), b"line\n");

    let escape = bucket
        .upload(LOG_CONTENT_TYPE, "../outside.log", Vec::new())
        .await;
    assert!(escape.is_err());
}
