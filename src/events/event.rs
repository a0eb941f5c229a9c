use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source reported on every event published by this service.
pub const MANAGEMENT_SERVER: &str = "management-server";

/// Event category for resource state changes.
pub const RESOURCE_STATE_CHANGE_EVENT: &str = "ResourceStateEvent";

/// Layout of the `eventDateTime` description entry.
const EVENT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Which side of a transition an event was raised on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransitionPhase {
    PreStateTransitionEvent,
    PostStateTransitionEvent,
}

impl fmt::Display for TransitionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionPhase::PreStateTransitionEvent => write!(f, "preStateTransitionEvent"),
            TransitionPhase::PostStateTransitionEvent => write!(f, "postStateTransitionEvent"),
        }
    }
}

/// A resource changed, or is about to change, state.
///
/// `description` carries the flat key/value view consumers of the event bus
/// read: `resource`, `id`, `old-state`, `new-state` and `eventDateTime`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStateEvent {
    pub source: String,
    pub category: String,
    pub event_type: String,
    pub resource_type: String,
    pub resource_uuid: String,
    pub phase: TransitionPhase,
    pub description: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl ResourceStateEvent {
    pub fn state_change(
        event_type: impl Into<String>,
        resource_type: &str,
        resource_uuid: &str,
        old_state: &str,
        new_state: &str,
        phase: TransitionPhase,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let description = BTreeMap::from([
            ("resource".to_string(), resource_type.to_string()),
            ("id".to_string(), resource_uuid.to_string()),
            ("old-state".to_string(), old_state.to_string()),
            ("new-state".to_string(), new_state.to_string()),
            (
                "eventDateTime".to_string(),
                timestamp.format(EVENT_DATE_FORMAT).to_string(),
            ),
        ]);
        Self {
            source: MANAGEMENT_SERVER.to_string(),
            category: RESOURCE_STATE_CHANGE_EVENT.to_string(),
            event_type: event_type.into(),
            resource_type: resource_type.to_string(),
            resource_uuid: resource_uuid.to_string(),
            phase,
            description,
            timestamp,
        }
    }

    pub fn old_state(&self) -> Option<&str> {
        self.description.get("old-state").map(String::as_str)
    }

    pub fn new_state(&self) -> Option<&str> {
        self.description.get("new-state").map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn state_change_fills_description() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 5).unwrap();
        let event = ResourceStateEvent::state_change(
            "CreateRequested",
            "Snapshot",
            "6f1c",
            "Allocated",
            "Creating",
            TransitionPhase::PreStateTransitionEvent,
            at,
        );

        assert_eq!(event.source, "management-server");
        assert_eq!(event.category, "ResourceStateEvent");
        assert_eq!(event.old_state(), Some("Allocated"));
        assert_eq!(event.new_state(), Some("Creating"));
        assert_eq!(event.description["resource"], "Snapshot");
        assert_eq!(event.description["id"], "6f1c");
        assert_eq!(event.description["eventDateTime"], "2024-03-01 08:30:05 +0000");
    }

    #[test]
    fn phase_serializes_as_hook_name() {
        assert_eq!(
            serde_json::to_string(&TransitionPhase::PostStateTransitionEvent).unwrap(),
            r#""postStateTransitionEvent""#
        );
        assert_eq!(
            TransitionPhase::PreStateTransitionEvent.to_string(),
            "preStateTransitionEvent"
        );
    }
}
