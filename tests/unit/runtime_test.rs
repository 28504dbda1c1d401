//! Tests for tokio spawner utilities

use prometheus_job_scheduler::core::Spawn;
use prometheus_job_scheduler::runtime::tokio_spawner::TokioSpawner;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[tokio::test]
async fn test_current_spawner_inside_runtime() {
    assert!(TokioSpawner::current().is_ok());
}

#[test]
fn test_current_spawner_outside_runtime() {
    assert!(TokioSpawner::current().is_err());
}

#[test]
fn test_owned_runtime() {
    let (runtime, spawner) = TokioSpawner::runtime(Some(2)).expect("runtime");
    let (tx, rx) = std::sync::mpsc::channel();
    spawner.spawn(async move {
        tx.send("done").unwrap();
    });
    assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap(), "done");
    drop(runtime);
}
