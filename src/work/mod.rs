//! Typed VM work items and the table that maps a job's work-type
//! discriminator onto the decoder for its payload.

mod item;
mod registry;

pub use item::{
    MigrateParams, RebootParams, StartParams, StopParams, TakeVolumeSnapshotParams, VmWork,
    WorkPayload,
};
pub use registry::{WorkDecoder, WorkType, WorkTypeRegistry, WorkTypeRegistryBuilder};
