//! Scheduler worker: claim semantics, delayed actions, deadline reminders,
//! and the stale-row reaper, driven by a manual clock.

mod common;

use chrono::Duration;
use common::{fixture, t0};
use std::sync::Arc;
use taskmesh_engine::models::{
    ActionKind, NewDependencyAction, NotificationPreferences, ProjectRole, ScheduledKind,
    ScheduledStatus, TaskStatus,
};
use taskmesh_engine::{
    ActionDispatch, Clock, CreateTask, NotificationKind, Scheduler, SchedulerConfig, Store,
};

#[tokio::test]
async fn delayed_action_executes_exactly_once() {
    let fx = fixture().await;
    let ivan = fx.member("ivan", ProjectRole::developer()).await;

    let a = fx.task("A").await;
    let b = fx
        .engine
        .create_task(
            fx.owner.id,
            CreateTask::new(fx.project.id, "B").with_assignee(ivan.id),
        )
        .await
        .unwrap();
    let edge = fx.edge(&a, &b).await;
    fx.engine
        .add_dependency_action(
            fx.owner.id,
            NewDependencyAction::new(edge.id, ActionKind::NotifyCustom)
                .with_target_user(ivan.id)
                .with_template("Delayed: {task_name}")
                .with_delay_minutes(30),
        )
        .await
        .unwrap();

    // completing A only schedules the action
    let change = fx
        .engine
        .change_task_status(a.id, TaskStatus::Completed, fx.owner.id)
        .await
        .unwrap();
    assert_eq!(change.actions_executed.len(), 1);
    assert_eq!(change.actions_executed[0].status, ActionDispatch::Scheduled);
    assert_eq!(
        change.actions_executed[0].scheduled_for,
        Some(t0() + Duration::minutes(30))
    );
    assert_eq!(fx.notifier.sent_count().await, 0);

    let rows = fx.store.task_scheduled(b.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kind, ScheduledKind::DelayedNotification);
    assert_eq!(rows[0].status, ScheduledStatus::Pending);

    let scheduler = Scheduler::new(Arc::clone(&fx.engine));

    // a tick before the due time claims nothing
    assert!(scheduler.tick().await.is_empty());

    // past the due time the action fires once
    fx.clock.advance(Duration::minutes(31));
    let outcomes = scheduler.tick().await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, ScheduledStatus::Completed);

    let sent = fx.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, ivan.id);
    assert_eq!(sent[0].payload["message"], "Delayed: B");

    let row = fx.store.scheduled(rows[0].id).await.unwrap().unwrap();
    assert_eq!(row.status, ScheduledStatus::Completed);
    assert_eq!(row.executed_at, Some(t0() + Duration::minutes(31)));
    let result = row.payload.unwrap();
    assert_eq!(result["trigger_event"], "task_completed");
    assert_eq!(result["result"]["status"], "executed");

    // a further tick does nothing
    assert!(scheduler.tick().await.is_empty());
    assert_eq!(fx.notifier.sent_count().await, 1);
}

#[tokio::test]
async fn deadline_reminder_respects_preferences() {
    let fx = fixture().await;
    let ivan = fx.member("ivan", ProjectRole::developer()).await;
    let muted = fx
        .member_with_prefs(
            "mira",
            ProjectRole::developer(),
            NotificationPreferences::muted(),
        )
        .await;

    for (name, assignee) in [("loud", ivan.id), ("quiet", muted.id)] {
        fx.engine
            .create_task(
                fx.owner.id,
                CreateTask::new(fx.project.id, name)
                    .with_assignee(assignee)
                    .with_deadline(t0() + Duration::hours(25)),
            )
            .await
            .unwrap();
    }

    let scheduler = Scheduler::new(Arc::clone(&fx.engine));
    fx.clock.advance(Duration::hours(2));
    let outcomes = scheduler.tick().await;

    // both T-24h reminders are due and complete, but only one notifies
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes
        .iter()
        .all(|o| o.status == ScheduledStatus::Completed));

    let sent = fx.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, ivan.id);
    assert_eq!(sent[0].kind, NotificationKind::DeadlineApproaching);
    assert_eq!(sent[0].payload["hours_left"], "24");
}

#[tokio::test]
async fn tick_respects_batch_size_and_due_order() {
    let fx = fixture().await;
    let ivan = fx.member("ivan", ProjectRole::developer()).await;

    // five tasks with staggered deadlines; the T-24h reminders fall in the
    // past and are skipped, leaving one T-1h reminder each
    for hour in 1..=5 {
        fx.engine
            .create_task(
                fx.owner.id,
                CreateTask::new(fx.project.id, format!("t{}", hour))
                    .with_assignee(ivan.id)
                    .with_deadline(t0() + Duration::hours(hour + 1)),
            )
            .await
            .unwrap();
    }

    let scheduler = Scheduler::with_config(
        Arc::clone(&fx.engine),
        SchedulerConfig::default().with_batch_size(2),
    );

    fx.clock.advance(Duration::hours(10));
    let first = scheduler.tick().await;
    assert_eq!(first.len(), 2);
    let second = scheduler.tick().await;
    assert_eq!(second.len(), 2);
    let third = scheduler.tick().await;
    assert_eq!(third.len(), 1);
    assert!(scheduler.tick().await.is_empty());

    assert_eq!(fx.notifier.sent_count().await, 5);
}

#[tokio::test]
async fn failed_dispatch_marks_row_failed() {
    let fx = fixture().await;
    let ivan = fx.member("ivan", ProjectRole::developer()).await;

    fx.engine
        .create_task(
            fx.owner.id,
            CreateTask::new(fx.project.id, "doomed")
                .with_assignee(ivan.id)
                .with_deadline(t0() + Duration::hours(25)),
        )
        .await
        .unwrap();

    fx.notifier.fail_with("transport down").await;
    let scheduler = Scheduler::new(Arc::clone(&fx.engine));
    fx.clock.advance(Duration::hours(2));

    let outcomes = scheduler.tick().await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, ScheduledStatus::Failed);
    assert!(outcomes[0].error.as_deref().unwrap().contains("transport down"));

    // the failed row keeps its executed_at and is not re-claimed
    assert!(scheduler.tick().await.is_empty());
}

#[tokio::test]
async fn reaper_returns_stranded_rows_to_pending() {
    let fx = fixture().await;
    let ivan = fx.member("ivan", ProjectRole::developer()).await;

    let task = fx
        .engine
        .create_task(
            fx.owner.id,
            CreateTask::new(fx.project.id, "t")
                .with_assignee(ivan.id)
                .with_deadline(t0() + Duration::hours(25)),
        )
        .await
        .unwrap();

    // simulate a crashed worker: claim without finishing
    fx.clock.advance(Duration::hours(2));
    let claimed = fx
        .store
        .claim_due(fx.clock.now(), 10)
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].status, ScheduledStatus::Processing);

    let scheduler = Scheduler::with_config(
        Arc::clone(&fx.engine),
        SchedulerConfig::default().with_stale_after(std::time::Duration::from_secs(600)),
    );

    // too fresh to reap
    assert_eq!(scheduler.reap_stale().await, 0);

    // past the bound the row is requeued and the next tick delivers it
    fx.clock.advance(Duration::hours(1));
    assert_eq!(scheduler.reap_stale().await, 1);
    let row = fx.store.scheduled(claimed[0].id).await.unwrap().unwrap();
    assert_eq!(row.status, ScheduledStatus::Pending);

    let outcomes = scheduler.tick().await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, ScheduledStatus::Completed);
    assert_eq!(fx.notifier.sent_count().await, 1);

    let _ = task;
}

#[tokio::test]
async fn delayed_change_status_cascades_on_execution() {
    let fx = fixture().await;
    let ivan = fx.member("ivan", ProjectRole::developer()).await;

    let a = fx.task("A").await;
    let b = fx.task("B").await;
    let c = fx
        .engine
        .create_task(
            fx.owner.id,
            CreateTask::new(fx.project.id, "C").with_assignee(ivan.id),
        )
        .await
        .unwrap();
    let ab = fx.edge(&a, &b).await;
    let bc = fx.edge(&b, &c).await;

    fx.engine
        .add_dependency_action(
            fx.owner.id,
            NewDependencyAction::new(ab.id, ActionKind::ChangeStatus)
                .with_target_status(TaskStatus::Completed)
                .with_delay_minutes(15),
        )
        .await
        .unwrap();
    fx.engine
        .add_dependency_action(
            fx.owner.id,
            NewDependencyAction::new(bc.id, ActionKind::NotifyAssignee),
        )
        .await
        .unwrap();

    fx.engine
        .change_task_status(a.id, TaskStatus::Completed, fx.owner.id)
        .await
        .unwrap();
    assert_eq!(fx.notifier.sent_count().await, 0);
    assert_eq!(
        fx.store.task(b.id).await.unwrap().unwrap().status,
        TaskStatus::Todo
    );

    let scheduler = Scheduler::new(Arc::clone(&fx.engine));
    fx.clock.advance(Duration::minutes(16));
    let outcomes = scheduler.tick().await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, ScheduledStatus::Completed);

    // the delayed completion of B fired the downstream notify action
    assert_eq!(
        fx.store.task(b.id).await.unwrap().unwrap().status,
        TaskStatus::Completed
    );
    let sent = fx.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, ivan.id);
    assert_eq!(sent[0].kind, NotificationKind::TaskReady);
}

#[tokio::test]
async fn worker_loop_stops_on_shutdown() {
    let fx = fixture().await;
    let scheduler = Scheduler::with_config(
        Arc::clone(&fx.engine),
        SchedulerConfig::default()
            .with_tick_interval(std::time::Duration::from_millis(10)),
    );

    let (tx, rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(async move { scheduler.run(rx).await });

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    tx.send(true).unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(1), handle)
        .await
        .expect("worker did not stop on shutdown")
        .unwrap();
}
