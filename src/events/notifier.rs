use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::{debug, warn};

use super::distributor::{DistributorProvider, EventDistributor};
use super::event::{ResourceStateEvent, TransitionPhase};
use crate::config::ConfigStore;
use crate::fsm::{StateEntity, StateListener, Transition};

/// Configuration key of the runtime toggle for resource state events.
pub const PUBLISH_RESOURCE_STATE_EVENTS: &str = "publish.resource.state.events";

/// Publishes a [`ResourceStateEvent`] for every transition of the state
/// machine it listens on, while the `publish.resource.state.events` toggle
/// is on.
///
/// The notifier only observes: both hooks always let the transition
/// proceed, and publishing failures are logged and dropped. Pre-transition
/// events are published before the new state is persisted, so a transition
/// rejected afterwards still leaves its pre event on the bus.
pub struct ResourceStateNotifier {
    config: Arc<dyn ConfigStore>,
    provider: Option<Arc<dyn DistributorProvider>>,
    distributor: RwLock<Option<Arc<dyn EventDistributor>>>,
}

impl ResourceStateNotifier {
    pub fn new(config: Arc<dyn ConfigStore>) -> Self {
        Self {
            config,
            provider: None,
            distributor: RwLock::new(None),
        }
    }

    /// Resolve the distributor through `provider` the first time an event
    /// needs publishing.
    pub fn with_provider(mut self, provider: Arc<dyn DistributorProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn set_event_distributor(&self, distributor: Arc<dyn EventDistributor>) {
        let mut slot = self.distributor.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(distributor);
    }

    pub fn publishing_enabled(&self) -> bool {
        self.config
            .get_value(PUBLISH_RESOURCE_STATE_EVENTS)
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }

    fn event_distributor(&self) -> Option<Arc<dyn EventDistributor>> {
        if let Some(bound) = self
            .distributor
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            return Some(bound.clone());
        }
        let resolved = self.provider.as_ref()?.event_distributor()?;
        let mut slot = self.distributor.write().unwrap_or_else(|e| e.into_inner());
        Some(slot.get_or_insert(resolved).clone())
    }

    fn publish_on_event_bus<S, V>(
        &self,
        event: &dyn fmt::Display,
        phase: TransitionPhase,
        entity: &V,
        old_state: S,
        new_state: S,
    ) where
        S: fmt::Display,
        V: StateEntity<S>,
    {
        if !self.publishing_enabled() {
            return;
        }
        let Some(distributor) = self.event_distributor() else {
            warn!(
                resource = V::resource_kind(),
                id = entity.uuid(),
                "no event distributor available, dropping resource state event"
            );
            return;
        };

        let message = ResourceStateEvent::state_change(
            event.to_string(),
            V::resource_kind(),
            entity.uuid(),
            &old_state.to_string(),
            &new_state.to_string(),
            phase,
            Utc::now(),
        );
        debug!(
            resource = V::resource_kind(),
            id = entity.uuid(),
            %phase,
            "publishing {old_state} -> {new_state}"
        );
        if let Err(err) = distributor.publish(message) {
            warn!(
                resource = V::resource_kind(),
                id = entity.uuid(),
                "failed to publish resource state event: {err}"
            );
        }
    }
}

impl<S, E, V> StateListener<S, E, V> for ResourceStateNotifier
where
    S: Copy + fmt::Display,
    E: Copy + fmt::Display,
    V: StateEntity<S>,
{
    fn pre_state_transition(&self, old_state: S, event: E, new_state: S, entity: &V) -> bool {
        self.publish_on_event_bus(
            &event,
            TransitionPhase::PreStateTransitionEvent,
            entity,
            old_state,
            new_state,
        );
        true
    }

    fn post_state_transition(
        &self,
        transition: &Transition<S, E>,
        entity: &V,
        _status: bool,
    ) -> bool {
        self.publish_on_event_bus(
            &transition.event,
            TransitionPhase::PostStateTransitionEvent,
            entity,
            transition.current_state,
            transition.to_state,
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::InMemoryConfigStore;
    use crate::events::PublishError;
    use crate::fsm::{FsmError, Snapshot, SnapshotEvent, SnapshotState, SnapshotStateMachine};

    #[derive(Default)]
    struct Captured {
        events: Mutex<Vec<ResourceStateEvent>>,
        fail: bool,
    }

    impl Captured {
        fn events(&self) -> Vec<ResourceStateEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventDistributor for Captured {
        fn publish(&self, event: ResourceStateEvent) -> Result<(), PublishError> {
            self.events.lock().unwrap().push(event);
            if self.fail {
                Err(PublishError::NoRuntime)
            } else {
                Ok(())
            }
        }
    }

    fn store(enabled: &str) -> Arc<InMemoryConfigStore> {
        let store = InMemoryConfigStore::new();
        store.set(PUBLISH_RESOURCE_STATE_EVENTS, enabled);
        Arc::new(store)
    }

    fn wired(
        config: Arc<InMemoryConfigStore>,
        sink: Arc<Captured>,
    ) -> (SnapshotStateMachine, Arc<ResourceStateNotifier>) {
        let notifier = Arc::new(ResourceStateNotifier::new(config));
        notifier.set_event_distributor(sink);
        let mut fsm = SnapshotStateMachine::snapshot_lifecycle();
        fsm.register_listener(notifier.clone());
        (fsm, notifier)
    }

    #[test]
    fn disabled_toggle_never_publishes() {
        let sink = Arc::new(Captured::default());
        let (fsm, _) = wired(store("false"), sink.clone());
        let mut snap = Snapshot::new(1, 10, "daily");

        fsm.transit(&mut snap, SnapshotEvent::CreateRequested).unwrap();
        fsm.transit(&mut snap, SnapshotEvent::OperationSucceeded).unwrap();

        assert!(sink.events().is_empty());
    }

    #[test]
    fn missing_or_odd_toggle_values_are_false() {
        let empty = ResourceStateNotifier::new(Arc::new(InMemoryConfigStore::new()));
        assert!(!empty.publishing_enabled());
        assert!(!ResourceStateNotifier::new(store("yes")).publishing_enabled());
        assert!(!ResourceStateNotifier::new(store(" true")).publishing_enabled());
        assert!(ResourceStateNotifier::new(store("TRUE")).publishing_enabled());
    }

    #[test]
    fn enabled_toggle_publishes_once_per_hook() {
        let sink = Arc::new(Captured::default());
        let (fsm, _) = wired(store("true"), sink.clone());
        let mut snap = Snapshot::new(1, 10, "daily");

        fsm.transit(&mut snap, SnapshotEvent::CreateRequested).unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].phase, TransitionPhase::PreStateTransitionEvent);
        assert_eq!(events[1].phase, TransitionPhase::PostStateTransitionEvent);
        for event in &events {
            assert_eq!(event.event_type, "CreateRequested");
            assert_eq!(event.resource_type, "Snapshot");
            assert_eq!(event.resource_uuid, snap.uuid);
            assert_eq!(event.description["id"], snap.uuid);
            assert_eq!(event.old_state(), Some("Allocated"));
            assert_eq!(event.new_state(), Some("Creating"));
        }
    }

    #[test]
    fn toggle_is_read_on_every_transition() {
        let config = store("false");
        let sink = Arc::new(Captured::default());
        let (fsm, _) = wired(config.clone(), sink.clone());
        let mut snap = Snapshot::new(1, 10, "daily");

        fsm.transit(&mut snap, SnapshotEvent::CreateRequested).unwrap();
        config.set(PUBLISH_RESOURCE_STATE_EVENTS, "true");
        fsm.transit(&mut snap, SnapshotEvent::OperationSucceeded).unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].old_state(), Some("Creating"));
        assert_eq!(events[0].new_state(), Some("CreatedOnPrimary"));
    }

    #[test]
    fn publish_failure_does_not_block_transition() {
        let sink = Arc::new(Captured {
            fail: true,
            ..Default::default()
        });
        let (fsm, _) = wired(store("true"), sink.clone());
        let mut snap = Snapshot::new(1, 10, "daily");

        assert_eq!(
            fsm.transit(&mut snap, SnapshotEvent::CreateRequested),
            Ok(SnapshotState::Creating)
        );
        assert_eq!(sink.events().len(), 2);
    }

    #[test]
    fn rejected_transition_still_publishes_pre_event() {
        let sink = Arc::new(Captured::default());
        let (fsm, _) = wired(store("true"), sink.clone());
        let mut snap = Snapshot::new(1, 10, "daily");

        let result = fsm.transit_with(&mut snap, SnapshotEvent::CreateRequested, |_, _| false);

        assert!(matches!(result, Err(FsmError::Rejected { .. })));
        assert_eq!(snap.state, SnapshotState::Allocated);
        let phases: Vec<_> = sink.events().iter().map(|e| e.phase).collect();
        assert_eq!(
            phases,
            vec![
                TransitionPhase::PreStateTransitionEvent,
                TransitionPhase::PostStateTransitionEvent
            ]
        );
    }

    #[test]
    fn distributor_is_resolved_lazily_once() {
        let sink = Arc::new(Captured::default());
        let lookups = Arc::new(AtomicUsize::new(0));
        let provider = {
            let sink: Arc<dyn EventDistributor> = sink.clone();
            let lookups = lookups.clone();
            move || {
                lookups.fetch_add(1, Ordering::SeqCst);
                Some(sink.clone())
            }
        };
        let config = store("false");
        let notifier = Arc::new(
            ResourceStateNotifier::new(config.clone()).with_provider(Arc::new(provider)),
        );
        let mut fsm = SnapshotStateMachine::snapshot_lifecycle();
        fsm.register_listener(notifier);
        let mut snap = Snapshot::new(1, 10, "daily");

        fsm.transit(&mut snap, SnapshotEvent::CreateRequested).unwrap();
        assert_eq!(lookups.load(Ordering::SeqCst), 0);

        config.set(PUBLISH_RESOURCE_STATE_EVENTS, "true");
        fsm.transit(&mut snap, SnapshotEvent::OperationSucceeded).unwrap();
        fsm.transit(&mut snap, SnapshotEvent::BackupToSecondary).unwrap();

        assert_eq!(lookups.load(Ordering::SeqCst), 1);
        assert_eq!(sink.events().len(), 4);
    }

    #[test]
    fn missing_distributor_is_tolerated() {
        let notifier = Arc::new(ResourceStateNotifier::new(store("true")));
        let mut fsm = SnapshotStateMachine::snapshot_lifecycle();
        fsm.register_listener(notifier);
        let mut snap = Snapshot::new(1, 10, "daily");

        assert!(fsm.transit(&mut snap, SnapshotEvent::CreateRequested).is_ok());
    }
}
