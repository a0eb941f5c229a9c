//! Resource state-change events: the event record, the distributors it is
//! published to, and the state-machine listener that publishes it.

mod distributor;
mod error;
mod event;
mod notifier;

pub use distributor::{DistributorProvider, EventBus, EventDistributor, WebhookDistributor};
pub use error::PublishError;
pub use event::{
    MANAGEMENT_SERVER, RESOURCE_STATE_CHANGE_EVENT, ResourceStateEvent, TransitionPhase,
};
pub use notifier::{PUBLISH_RESOURCE_STATE_EVENTS, ResourceStateNotifier};
