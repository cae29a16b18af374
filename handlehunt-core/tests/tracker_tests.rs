// Tests for the task lifecycle tracker

use handlehunt_core::tracker::{Admission, TaskState, TaskTracker};
use handlehunt_scanner::SiteDefinition;
use std::sync::Arc;

fn site(name: &str) -> SiteDefinition {
    SiteDefinition::new(name, format!("https://{}.test/{{account}}", name.to_lowercase()), "social")
}

fn admitted(admission: Admission) -> handlehunt_core::SearchTask {
    match admission {
        Admission::Admitted(task) => task,
        Admission::AlreadyRunning(task) => panic!("expected admission, task {} already running", task.id),
    }
}

// ============================================================================
// Admission Tests
// ============================================================================

#[tokio::test]
async fn test_admit_creates_pending_task() {
    let tracker = TaskTracker::new();

    let task = admitted(tracker.admit("carol", 3).await);

    assert_eq!(task.handle, "carol");
    assert_eq!(task.state, TaskState::Pending);
    assert_eq!(task.total_sites, 3);
    assert!(task.found_sites.is_empty());
    assert!(task.error.is_none());
}

#[tokio::test]
async fn test_admit_is_single_flight() {
    let tracker = TaskTracker::new();

    let first = admitted(tracker.admit("carol", 1).await);
    match tracker.admit("carol", 1).await {
        Admission::AlreadyRunning(task) => assert_eq!(task.id, first.id),
        Admission::Admitted(_) => panic!("second admission must not create a task"),
    }

    tracker.begin("carol").await;
    assert!(matches!(tracker.admit("carol", 1).await, Admission::AlreadyRunning(_)));
}

#[tokio::test]
async fn test_concurrent_admissions_admit_exactly_one() {
    let tracker = Arc::new(TaskTracker::new());

    let mut handles = Vec::new();
    for _ in 0..16 {
        let tracker = tracker.clone();
        handles.push(tokio::spawn(async move { tracker.admit("carol", 1).await }));
    }

    let mut admitted_count = 0;
    for handle in handles {
        if let Admission::Admitted(_) = handle.await.unwrap() {
            admitted_count += 1;
        }
    }
    assert_eq!(admitted_count, 1);
}

#[tokio::test]
async fn test_terminal_task_is_replaced_with_new_identity() {
    let tracker = TaskTracker::new();

    let first = admitted(tracker.admit("carol", 1).await);
    tracker.begin("carol").await;
    tracker.complete("carol").await;

    let second = admitted(tracker.admit("carol", 1).await);
    assert_ne!(first.id, second.id);
    assert_eq!(second.state, TaskState::Pending);
}

#[tokio::test]
async fn test_handles_are_independent() {
    let tracker = TaskTracker::new();

    admitted(tracker.admit("carol", 1).await);
    admitted(tracker.admit("dave", 1).await);
    assert!(tracker.is_active("carol").await);
    assert!(tracker.is_active("dave").await);
    assert!(!tracker.is_active("erin").await);
}

// ============================================================================
// Transition Tests
// ============================================================================

#[tokio::test]
async fn test_begin_only_from_pending() {
    let tracker = TaskTracker::new();

    assert!(!tracker.begin("carol").await);

    admitted(tracker.admit("carol", 1).await);
    assert!(tracker.begin("carol").await);
    assert!(!tracker.begin("carol").await);
    assert_eq!(tracker.get("carol").await.unwrap().state, TaskState::InProgress);
}

#[tokio::test]
async fn test_record_found_is_cumulative() {
    let tracker = TaskTracker::new();
    admitted(tracker.admit("carol", 2).await);
    tracker.begin("carol").await;

    let after_first = tracker.record_found("carol", site("Alpha")).await.unwrap();
    let after_second = tracker.record_found("carol", site("Gamma")).await.unwrap();

    assert_eq!(after_first, vec![site("Alpha")]);
    assert_eq!(after_second, vec![site("Alpha"), site("Gamma")]);
}

#[tokio::test]
async fn test_record_found_requires_in_progress() {
    let tracker = TaskTracker::new();

    assert!(tracker.record_found("carol", site("Alpha")).await.is_none());

    admitted(tracker.admit("carol", 1).await);
    assert!(tracker.record_found("carol", site("Alpha")).await.is_none());

    tracker.begin("carol").await;
    tracker.complete("carol").await;
    assert!(tracker.record_found("carol", site("Alpha")).await.is_none());
    assert!(tracker.get("carol").await.unwrap().found_sites.is_empty());
}

#[tokio::test]
async fn test_concurrent_record_found_loses_nothing() {
    let tracker = Arc::new(TaskTracker::new());
    admitted(tracker.admit("carol", 50).await);
    tracker.begin("carol").await;

    let mut handles = Vec::new();
    for i in 0..50 {
        let tracker = tracker.clone();
        handles.push(tokio::spawn(async move {
            tracker.record_found("carol", site(&format!("Site{}", i))).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_some());
    }

    assert_eq!(tracker.get("carol").await.unwrap().found_sites.len(), 50);
}

#[tokio::test]
async fn test_complete_is_idempotent() {
    let tracker = TaskTracker::new();
    admitted(tracker.admit("carol", 1).await);
    tracker.begin("carol").await;

    assert!(tracker.complete("carol").await.is_some());
    assert!(tracker.complete("carol").await.is_none());
    assert!(tracker.fail("carol", "late failure").await.is_none());

    let task = tracker.get("carol").await.unwrap();
    assert_eq!(task.state, TaskState::Completed);
    assert!(task.error.is_none());
}

#[tokio::test]
async fn test_fail_records_error() {
    let tracker = TaskTracker::new();
    admitted(tracker.admit("carol", 1).await);
    tracker.begin("carol").await;

    let task = tracker.fail("carol", "boom").await.unwrap();
    assert_eq!(task.state, TaskState::Failed);
    assert_eq!(task.error.as_deref(), Some("boom"));

    assert!(tracker.complete("carol").await.is_none());
    assert_eq!(tracker.get("carol").await.unwrap().state, TaskState::Failed);
    assert!(!tracker.is_active("carol").await);
}

#[tokio::test]
async fn test_get_unknown_handle() {
    let tracker = TaskTracker::new();
    assert!(tracker.get("nobody").await.is_none());
}

#[test]
fn test_state_names() {
    assert_eq!(TaskState::Pending.as_str(), "pending");
    assert_eq!(TaskState::InProgress.as_str(), "in_progress");
    assert!(TaskState::Completed.is_terminal());
    assert!(TaskState::Failed.is_terminal());
    assert!(TaskState::InProgress.is_active());
}
