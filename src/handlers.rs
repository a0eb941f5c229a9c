//! Simulated work handlers used by the command-line front end.
//!
//! They stand in for the real VM and volume services: they sleep instead of
//! talking to a hypervisor, and the volume service walks snapshots through
//! the snapshot state machine so its listeners fire.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::time::sleep;
use tracing::info;

use crate::dispatch::{CallContext, HandlerRegistry, WorkHandler};
use crate::error::HandlerError;
use crate::fsm::{Snapshot, SnapshotEvent, SnapshotStateMachine};
use crate::job::JobOutcome;
use crate::work::{TakeVolumeSnapshotParams, VmWork, WorkPayload};

pub const VM_MANAGER: &str = "VirtualMachineManagerImpl";
pub const VOLUME_SERVICE: &str = "VolumeApiServiceImpl";

/// Power and placement operations on a VM.
pub struct SimulatedVmManager {
    latency: Duration,
}

impl SimulatedVmManager {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl WorkHandler for SimulatedVmManager {
    async fn handle_vm_work(
        &self,
        context: &CallContext,
        work: &VmWork,
    ) -> Result<JobOutcome, HandlerError> {
        info!(
            vm_id = work.vm_id,
            user_id = context.user_id,
            work_type = work.work_type(),
            "handling VM work"
        );
        let message = match &work.payload {
            WorkPayload::Start(params) => match &params.planner {
                Some(planner) => format!("vm {} started via {planner}", work.vm_id),
                None => format!("vm {} started", work.vm_id),
            },
            WorkPayload::Stop(params) if params.cleanup => {
                format!("vm {} stopped and cleaned up", work.vm_id)
            }
            WorkPayload::Stop(_) => format!("vm {} stopped", work.vm_id),
            WorkPayload::Reboot(_) => format!("vm {} rebooted", work.vm_id),
            WorkPayload::Migrate(params) => {
                if params.src_host_id == params.dest_host_id {
                    return Err(HandlerError::invalid_parameter(format!(
                        "vm {} is already on host {}",
                        work.vm_id, params.dest_host_id
                    )));
                }
                format!(
                    "vm {} migrated from host {} to host {}",
                    work.vm_id, params.src_host_id, params.dest_host_id
                )
            }
            WorkPayload::TakeVolumeSnapshot(_) => {
                return Err(HandlerError::invalid_parameter(format!(
                    "{} cannot take volume snapshots",
                    VM_MANAGER
                )));
            }
        };
        sleep(self.latency).await;
        Ok(JobOutcome::succeeded(message))
    }
}

/// Volume snapshots, driven through the snapshot lifecycle.
pub struct SimulatedVolumeService {
    lifecycle: Arc<SnapshotStateMachine>,
}

impl SimulatedVolumeService {
    pub fn new(lifecycle: Arc<SnapshotStateMachine>) -> Self {
        Self { lifecycle }
    }

    fn take_snapshot(&self, work: &VmWork, params: &TakeVolumeSnapshotParams) -> anyhow::Result<Snapshot> {
        let name = format!("vm{}-vol{}", work.vm_id, params.volume_id);
        let mut snapshot = Snapshot::new(params.snapshot_id, params.volume_id, name);
        for event in [
            SnapshotEvent::CreateRequested,
            SnapshotEvent::OperationSucceeded,
            SnapshotEvent::BackupToSecondary,
            SnapshotEvent::OperationSucceeded,
        ] {
            self.lifecycle
                .transit(&mut snapshot, event)
                .with_context(|| format!("snapshot {} on {event}", snapshot.uuid))?;
        }
        Ok(snapshot)
    }
}

#[async_trait]
impl WorkHandler for SimulatedVolumeService {
    async fn handle_vm_work(
        &self,
        context: &CallContext,
        work: &VmWork,
    ) -> Result<JobOutcome, HandlerError> {
        let WorkPayload::TakeVolumeSnapshot(params) = &work.payload else {
            return Err(HandlerError::invalid_parameter(format!(
                "{} only handles {}",
                VOLUME_SERVICE,
                TakeVolumeSnapshotParams::WORK_TYPE
            )));
        };
        info!(
            vm_id = work.vm_id,
            volume_id = params.volume_id,
            account_id = context.account_id,
            quiesce = params.quiesce_vm,
            "taking volume snapshot"
        );
        let snapshot = self.take_snapshot(work, params)?;
        Ok(JobOutcome::succeeded(snapshot.uuid))
    }
}

/// Registry with both simulated handlers under their service names.
pub fn simulated_handlers(lifecycle: Arc<SnapshotStateMachine>, latency: Duration) -> HandlerRegistry {
    HandlerRegistry::builder()
        .register(VM_MANAGER, SimulatedVmManager::new(latency))
        .register(VOLUME_SERVICE, SimulatedVolumeService::new(lifecycle))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::SnapshotState;
    use crate::work::{MigrateParams, StartParams};

    fn ctx() -> CallContext {
        CallContext::new(2, 3, 1)
    }

    #[tokio::test]
    async fn vm_manager_starts_vm() {
        let handler = SimulatedVmManager::new(Duration::ZERO);
        let work = VmWork::new(5, 2, 3, VM_MANAGER, StartParams::default());
        let outcome = handler.handle_vm_work(&ctx(), &work).await.unwrap();
        assert_eq!(outcome, JobOutcome::succeeded("vm 5 started"));
    }

    #[tokio::test]
    async fn vm_manager_rejects_migration_to_same_host() {
        let handler = SimulatedVmManager::new(Duration::ZERO);
        let work = VmWork::new(
            5,
            2,
            3,
            VM_MANAGER,
            MigrateParams {
                src_host_id: 4,
                dest_host_id: 4,
            },
        );
        let err = handler.handle_vm_work(&ctx(), &work).await.unwrap_err();
        assert!(matches!(err, HandlerError::InvalidParameter(ref m) if m.contains("host 4")));
    }

    #[tokio::test]
    async fn volume_service_walks_snapshot_to_backed_up() {
        let handler = SimulatedVolumeService::new(Arc::new(SnapshotStateMachine::snapshot_lifecycle()));
        let params = TakeVolumeSnapshotParams {
            volume_id: 8,
            snapshot_id: 30,
            policy_id: None,
            quiesce_vm: false,
        };
        let work = VmWork::new(5, 2, 3, VOLUME_SERVICE, params.clone());

        let snapshot = handler.take_snapshot(&work, &params).unwrap();
        assert_eq!(snapshot.state, SnapshotState::BackedUp);
        assert_eq!(snapshot.name, "vm5-vol8");

        let outcome = handler.handle_vm_work(&ctx(), &work).await.unwrap();
        assert_eq!(outcome.status, crate::job::JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn volume_service_refuses_other_work() {
        let handler = SimulatedVolumeService::new(Arc::new(SnapshotStateMachine::snapshot_lifecycle()));
        let work = VmWork::new(5, 2, 3, VOLUME_SERVICE, StartParams::default());
        assert!(matches!(
            handler.handle_vm_work(&ctx(), &work).await,
            Err(HandlerError::InvalidParameter(_))
        ));
    }

    #[test]
    fn registry_contains_both_services() {
        let registry = simulated_handlers(
            Arc::new(SnapshotStateMachine::snapshot_lifecycle()),
            Duration::ZERO,
        );
        assert_eq!(registry.names(), vec![VM_MANAGER, VOLUME_SERVICE]);
    }
}
