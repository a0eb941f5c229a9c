use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::machine::{StateEntity, StateMachine};

/// Lifecycle states of a volume snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnapshotState {
    Allocated,
    Creating,
    CreatedOnPrimary,
    BackingUp,
    BackedUp,
    Copying,
    Destroying,
    Destroyed,
    Error,
}

impl fmt::Display for SnapshotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SnapshotState::Allocated => "Allocated",
            SnapshotState::Creating => "Creating",
            SnapshotState::CreatedOnPrimary => "CreatedOnPrimary",
            SnapshotState::BackingUp => "BackingUp",
            SnapshotState::BackedUp => "BackedUp",
            SnapshotState::Copying => "Copying",
            SnapshotState::Destroying => "Destroying",
            SnapshotState::Destroyed => "Destroyed",
            SnapshotState::Error => "Error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnapshotEvent {
    CreateRequested,
    OperationNotPerformed,
    BackupToSecondary,
    OperationSucceeded,
    OperationFailed,
    CopyingRequested,
    DestroyRequested,
}

impl fmt::Display for SnapshotEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SnapshotEvent::CreateRequested => "CreateRequested",
            SnapshotEvent::OperationNotPerformed => "OperationNotPerformed",
            SnapshotEvent::BackupToSecondary => "BackupToSecondary",
            SnapshotEvent::OperationSucceeded => "OperationSucceeded",
            SnapshotEvent::OperationFailed => "OperationFailed",
            SnapshotEvent::CopyingRequested => "CopyingRequested",
            SnapshotEvent::DestroyRequested => "DestroyRequested",
        };
        f.write_str(name)
    }
}

/// A point-in-time copy of a volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: u64,
    pub uuid: String,
    pub volume_id: u64,
    pub name: String,
    pub state: SnapshotState,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(id: u64, volume_id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            uuid: Uuid::new_v4().to_string(),
            volume_id,
            name: name.into(),
            state: SnapshotState::Allocated,
            created_at: Utc::now(),
        }
    }
}

impl StateEntity<SnapshotState> for Snapshot {
    fn state(&self) -> SnapshotState {
        self.state
    }

    fn set_state(&mut self, state: SnapshotState) {
        self.state = state;
    }

    fn uuid(&self) -> &str {
        &self.uuid
    }
}

pub type SnapshotStateMachine = StateMachine<SnapshotState, SnapshotEvent, Snapshot>;

impl StateMachine<SnapshotState, SnapshotEvent, Snapshot> {
    /// The snapshot lifecycle: create on primary storage, back up to
    /// secondary, optionally copy, then destroy.
    pub fn snapshot_lifecycle() -> Self {
        use SnapshotEvent::*;
        use SnapshotState::*;

        let mut fsm = Self::new();
        fsm.add_transition(Allocated, CreateRequested, Creating)
            .add_transition(Creating, OperationSucceeded, CreatedOnPrimary)
            .add_transition(Creating, OperationNotPerformed, BackedUp)
            .add_transition(Creating, OperationFailed, Error)
            .add_transition(CreatedOnPrimary, BackupToSecondary, BackingUp)
            .add_transition(CreatedOnPrimary, OperationNotPerformed, BackedUp)
            .add_transition(BackingUp, OperationSucceeded, BackedUp)
            .add_transition(BackingUp, OperationFailed, Error)
            .add_transition(BackedUp, CopyingRequested, Copying)
            .add_transition(BackedUp, DestroyRequested, Destroying)
            .add_transition(Copying, OperationSucceeded, BackedUp)
            .add_transition(Copying, OperationFailed, BackedUp)
            .add_transition(Destroying, OperationSucceeded, Destroyed)
            .add_transition(Destroying, OperationFailed, BackedUp)
            .add_transition(Error, DestroyRequested, Destroying);
        fsm
    }
}
