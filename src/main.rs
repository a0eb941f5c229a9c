use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::info;

use vmwork::app::App;
use vmwork::cli::{Cli, Command};
use vmwork::config::AppConfig;
use vmwork::events::{PUBLISH_RESOURCE_STATE_EVENTS, ResourceStateEvent};
use vmwork::fsm::{Snapshot, SnapshotEvent};
use vmwork::handlers::{VM_MANAGER, VOLUME_SERVICE};
use vmwork::job::JobRecord;
use vmwork::logging;
use vmwork::ui::Report;
use vmwork::work::{
    MigrateParams, RebootParams, StartParams, StopParams, TakeVolumeSnapshotParams,
    VmWork, WorkTypeRegistry,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .context("failed to load configuration")?;
    logging::init(&config, cli.verbose)?;

    match cli.command {
        Command::Dispatch {
            file,
            concurrency,
            publish,
        } => {
            let app = App::new(&config);
            if publish {
                app.config_store.set(PUBLISH_RESOURCE_STATE_EVENTS, "true");
            }
            let result = run_dispatch(&app, &file, concurrency).await;
            app.shutdown().await;
            result
        }
        Command::Sample => print_sample(),
        Command::Snapshot {
            volume_id,
            fail_backup,
            publish,
        } => {
            let app = App::new(&config);
            if publish {
                app.config_store.set(PUBLISH_RESOURCE_STATE_EVENTS, "true");
            }
            let result = run_snapshot(&app, volume_id, fail_backup);
            app.shutdown().await;
            result
        }
        Command::WorkTypes => {
            for name in WorkTypeRegistry::standard().names() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

async fn run_dispatch(app: &App, file: &Path, concurrency: usize) -> Result<()> {
    let contents = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let jobs: Vec<JobRecord> = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a JSON array of jobs", file.display()))?;
    info!(jobs = jobs.len(), concurrency, "dispatching jobs");

    let mut events = app.bus.subscribe();
    let completions = app.dispatch_all(jobs, concurrency).await?;

    let report = Report::new();
    report.heading("Completions");
    for completion in &completions {
        report.completion(completion);
    }
    print_events(&report, &mut events);
    report.summary(&completions);
    Ok(())
}

fn run_snapshot(app: &App, volume_id: u64, fail_backup: bool) -> Result<()> {
    use SnapshotEvent::*;

    let mut events = app.bus.subscribe();
    let mut snapshot = Snapshot::new(1, volume_id, format!("vol{volume_id}-manual"));
    let backup_outcome = if fail_backup { OperationFailed } else { OperationSucceeded };

    for event in [
        CreateRequested,
        OperationSucceeded,
        BackupToSecondary,
        backup_outcome,
        DestroyRequested,
        OperationSucceeded,
    ] {
        let state = app
            .lifecycle
            .transit(&mut snapshot, event)
            .with_context(|| format!("snapshot {} failed on {event}", snapshot.uuid))?;
        info!(snapshot = %snapshot.uuid, %event, %state, "snapshot transitioned");
    }

    let report = Report::new();
    print_events(&report, &mut events);
    println!();
    println!("snapshot {} ended in {}", snapshot.uuid, snapshot.state);
    Ok(())
}

fn print_events(report: &Report, events: &mut broadcast::Receiver<ResourceStateEvent>) {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    if drained.is_empty() {
        return;
    }
    report.heading("Resource state events");
    for event in &drained {
        report.event(event);
    }
}

/// One job per outcome the dispatcher can report.
fn print_sample() -> Result<()> {
    let mut start = StartParams {
        planner: Some("FirstFitPlanner".into()),
        params: BTreeMap::new(),
    };
    start.params.insert("BootIntoSetup".into(), "false".into());

    let jobs = vec![
        VmWork::new(101, 2, 2, VM_MANAGER, start).into_job(1)?,
        VmWork::new(102, 2, 2, VM_MANAGER, StopParams { cleanup: true }).into_job(2)?,
        VmWork::new(
            103,
            3,
            3,
            VM_MANAGER,
            MigrateParams {
                src_host_id: 4,
                dest_host_id: 4,
            },
        )
        .into_job(3)?,
        VmWork::new(
            104,
            3,
            3,
            VOLUME_SERVICE,
            TakeVolumeSnapshotParams {
                volume_id: 40,
                snapshot_id: 400,
                policy_id: None,
                quiesce_vm: true,
            },
        )
        .into_job(4)?
        .with_related("vm-104-snapshots"),
        VmWork::new(105, 2, 2, "NetworkManagerImpl", RebootParams::default()).into_job(5)?,
        JobRecord::new(6, "VmWorkResize", "{}"),
        JobRecord::new(7, StartParams::WORK_TYPE, "not json"),
    ];
    println!("{}", serde_json::to_string_pretty(&jobs)?);
    Ok(())
}
