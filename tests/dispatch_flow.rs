use std::sync::Arc;
use std::time::Duration;

use vmwork::app::App;
use vmwork::config::AppConfig;
use vmwork::dispatch::{AsyncJobDispatcher, FaultKind, FaultReport};
use vmwork::events::{PUBLISH_RESOURCE_STATE_EVENTS, TransitionPhase};
use vmwork::handlers::{VM_MANAGER, VOLUME_SERVICE};
use vmwork::job::{JobRecord, JobStatus, RESULT_CODE_NONE};
use vmwork::work::{MigrateParams, StartParams, TakeVolumeSnapshotParams, VmWork};

fn app() -> App {
    App::with_latency(&AppConfig::default(), Duration::ZERO)
}

fn snapshot_job(id: u64) -> JobRecord {
    VmWork::new(
        9,
        2,
        2,
        VOLUME_SERVICE,
        TakeVolumeSnapshotParams {
            volume_id: 90,
            snapshot_id: 900 + id,
            policy_id: Some(1),
            quiesce_vm: false,
        },
    )
    .into_job(id)
    .unwrap()
}

#[tokio::test]
async fn mixed_batch_reports_one_completion_per_job() {
    let app = app();
    let jobs = vec![
        VmWork::new(1, 2, 2, VM_MANAGER, StartParams::default())
            .into_job(1)
            .unwrap(),
        VmWork::new(
            2,
            2,
            2,
            VM_MANAGER,
            MigrateParams {
                src_host_id: 5,
                dest_host_id: 5,
            },
        )
        .into_job(2)
        .unwrap(),
        JobRecord::new(3, "VmWorkResize", "{}"),
        JobRecord::new(4, StartParams::WORK_TYPE, "{"),
        VmWork::new(5, 2, 2, "NetworkManagerImpl", StartParams::default())
            .into_job(5)
            .unwrap(),
        snapshot_job(6),
    ];

    let completions = app.dispatch_all(jobs, 3).await.unwrap();

    assert_eq!(completions.len(), 6);
    assert!(completions.iter().all(|c| c.result_code == RESULT_CODE_NONE));

    let status: Vec<_> = completions.iter().map(|c| c.status).collect();
    assert_eq!(
        status,
        vec![
            JobStatus::Succeeded,
            JobStatus::Failed,
            JobStatus::Failed,
            JobStatus::Failed,
            JobStatus::Failed,
            JobStatus::Succeeded,
        ]
    );

    let report: FaultReport = serde_json::from_str(&completions[1].message).unwrap();
    assert_eq!(report.kind, FaultKind::InvalidParameter);
    assert_eq!(completions[2].message, "VM work class VmWorkResize is not found");
    assert_eq!(completions[3].message, "Unable to deserialize VM work");
    assert_eq!(
        completions[4].message,
        "Unable to find work job handler: NetworkManagerImpl"
    );
}

#[tokio::test]
async fn snapshot_work_emits_state_events_when_enabled() {
    let app = app();
    let mut events = app.bus.subscribe();

    app.dispatch_all(vec![snapshot_job(1)], 1).await.unwrap();
    assert!(events.try_recv().is_err());

    app.config_store.set(PUBLISH_RESOURCE_STATE_EVENTS, "true");
    let completions = app.dispatch_all(vec![snapshot_job(2)], 1).await.unwrap();
    assert_eq!(completions[0].status, JobStatus::Succeeded);

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    // Four transitions, each seen before and after.
    assert_eq!(received.len(), 8);
    assert!(received.iter().all(|e| e.resource_uuid == completions[0].message));
    assert_eq!(received[0].phase, TransitionPhase::PreStateTransitionEvent);
    assert_eq!(received[7].phase, TransitionPhase::PostStateTransitionEvent);
    assert_eq!(received[7].new_state(), Some("BackedUp"));
}

#[tokio::test]
async fn dispatcher_is_usable_behind_the_job_trait() {
    let app = app();
    let dispatcher: Arc<dyn AsyncJobDispatcher> = app.dispatcher.clone();
    assert_eq!(dispatcher.name(), "VmWorkJobDispatcher");

    let job = VmWork::new(3, 2, 2, VM_MANAGER, StartParams::default())
        .into_job(42)
        .unwrap();
    dispatcher.run_job(&job).await;

    let completions = app.completions.for_job(42);
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].message, "vm 3 started");
}
