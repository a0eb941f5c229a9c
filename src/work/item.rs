use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::job::{JobId, JobRecord};

/// One unit of deferred VM work, decoded from a job record at dispatch time.
///
/// The common header says who asked for the work and which handler should
/// run it; `payload` carries the fields specific to the work type. On the
/// wire both are flattened into a single JSON object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmWork {
    pub vm_id: u64,
    pub user_id: u64,
    pub account_id: u64,
    pub handler_name: String,
    #[serde(flatten)]
    pub payload: WorkPayload,
}

impl VmWork {
    pub fn new(
        vm_id: u64,
        user_id: u64,
        account_id: u64,
        handler_name: impl Into<String>,
        payload: impl Into<WorkPayload>,
    ) -> Self {
        Self {
            vm_id,
            user_id,
            account_id,
            handler_name: handler_name.into(),
            payload: payload.into(),
        }
    }

    /// Work-type discriminator this item is persisted under.
    pub fn work_type(&self) -> &'static str {
        self.payload.work_type()
    }

    /// Serialize into the `cmd_info` form stored on a job record.
    pub fn to_cmd_info(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Package the work as a fresh job record.
    pub fn into_job(self, id: JobId) -> serde_json::Result<JobRecord> {
        Ok(JobRecord::new(id, self.work_type(), self.to_cmd_info()?))
    }
}

/// Fields shared by every work type, as they appear on the wire.
#[derive(Debug, Clone, Deserialize)]
pub(super) struct WorkHeader {
    pub vm_id: u64,
    pub user_id: u64,
    pub account_id: u64,
    pub handler_name: String,
}

impl WorkHeader {
    pub(super) const FIELDS: [&'static str; 4] = ["vm_id", "user_id", "account_id", "handler_name"];

    pub(super) fn with_payload(self, payload: WorkPayload) -> VmWork {
        VmWork {
            vm_id: self.vm_id,
            user_id: self.user_id,
            account_id: self.account_id,
            handler_name: self.handler_name,
            payload,
        }
    }
}

/// Type-specific part of a work item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WorkPayload {
    Start(StartParams),
    Stop(StopParams),
    Reboot(RebootParams),
    Migrate(MigrateParams),
    TakeVolumeSnapshot(TakeVolumeSnapshotParams),
}

impl WorkPayload {
    pub fn work_type(&self) -> &'static str {
        match self {
            WorkPayload::Start(_) => StartParams::WORK_TYPE,
            WorkPayload::Stop(_) => StopParams::WORK_TYPE,
            WorkPayload::Reboot(_) => RebootParams::WORK_TYPE,
            WorkPayload::Migrate(_) => MigrateParams::WORK_TYPE,
            WorkPayload::TakeVolumeSnapshot(_) => TakeVolumeSnapshotParams::WORK_TYPE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartParams {
    #[serde(default)]
    pub planner: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl StartParams {
    pub const WORK_TYPE: &'static str = "VmWorkStart";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StopParams {
    #[serde(default)]
    pub cleanup: bool,
}

impl StopParams {
    pub const WORK_TYPE: &'static str = "VmWorkStop";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RebootParams {
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl RebootParams {
    pub const WORK_TYPE: &'static str = "VmWorkReboot";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrateParams {
    pub src_host_id: u64,
    pub dest_host_id: u64,
}

impl MigrateParams {
    pub const WORK_TYPE: &'static str = "VmWorkMigrate";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TakeVolumeSnapshotParams {
    pub volume_id: u64,
    pub snapshot_id: u64,
    #[serde(default)]
    pub policy_id: Option<u64>,
    #[serde(default)]
    pub quiesce_vm: bool,
}

impl TakeVolumeSnapshotParams {
    pub const WORK_TYPE: &'static str = "VmWorkTakeVolumeSnapshot";
}

impl From<StartParams> for WorkPayload {
    fn from(p: StartParams) -> Self {
        WorkPayload::Start(p)
    }
}

impl From<StopParams> for WorkPayload {
    fn from(p: StopParams) -> Self {
        WorkPayload::Stop(p)
    }
}

impl From<RebootParams> for WorkPayload {
    fn from(p: RebootParams) -> Self {
        WorkPayload::Reboot(p)
    }
}

impl From<MigrateParams> for WorkPayload {
    fn from(p: MigrateParams) -> Self {
        WorkPayload::Migrate(p)
    }
}

impl From<TakeVolumeSnapshotParams> for WorkPayload {
    fn from(p: TakeVolumeSnapshotParams) -> Self {
        WorkPayload::TakeVolumeSnapshot(p)
    }
}
