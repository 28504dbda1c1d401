//! Tests for audit sink

use prometheus_job_scheduler::core::{
    build_audit_event, AuditAction, AuditSink, InMemoryAuditSink, TracingAuditSink,
};
use uuid::Uuid;

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);
    let task_id = Uuid::new_v4();

    let event = build_audit_event(task_id, "alpha", AuditAction::Claim, Some("detail".to_string()));

    sink.record(event.clone());
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0], event);
    assert_eq!(events[0].task_id, task_id);
    assert_eq!(events[0].action, AuditAction::Claim);
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);
    let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();

    for id in &ids {
        sink.record(build_audit_event(*id, "alpha", AuditAction::Claim, None));
    }

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].task_id, ids[1]); // First one popped
    assert_eq!(events[1].task_id, ids[2]);
}

#[test]
fn test_clones_share_events() {
    let reader = InMemoryAuditSink::new(10);
    let mut writer: Box<dyn AuditSink> = Box::new(reader.clone());
    let task_id = Uuid::new_v4();

    writer.record(build_audit_event(task_id, "alpha", AuditAction::Claim, None));
    writer.record(build_audit_event(task_id, "alpha", AuditAction::Complete, None));

    assert_eq!(
        reader.actions_for(task_id),
        vec![AuditAction::Claim, AuditAction::Complete]
    );
    assert!(reader.actions_for(Uuid::new_v4()).is_empty());
}

#[test]
fn test_build_audit_event() {
    let task_id = Uuid::new_v4();
    let event = build_audit_event(
        task_id,
        "alpha",
        AuditAction::Timeout,
        Some("exceeded 10s".to_string()),
    );

    assert!(event.event_id.starts_with(&format!("{task_id}-timeout-")));
    assert_eq!(event.instance, "alpha");
    assert_eq!(event.action.as_str(), "timeout");
    assert_eq!(event.detail, Some("exceeded 10s".to_string()));
    assert!(event.created_at_ms > 0);

    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["action"], "timeout");
}

#[test]
fn test_tracing_sink_accepts_events() {
    let mut sink = TracingAuditSink;
    sink.record(build_audit_event(Uuid::new_v4(), "alpha", AuditAction::Recover, None));
}
