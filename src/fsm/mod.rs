mod machine;
mod snapshot;

pub use machine::{FsmError, StateEntity, StateListener, StateMachine, Transition};
pub use snapshot::{Snapshot, SnapshotEvent, SnapshotState, SnapshotStateMachine};
