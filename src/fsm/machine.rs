use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use thiserror::Error;

/// An entity whose lifecycle is driven by a [`StateMachine`].
pub trait StateEntity<S> {
    fn state(&self) -> S;

    fn set_state(&mut self, state: S);

    /// Stable external identifier.
    fn uuid(&self) -> &str;

    /// Resource kind reported in lifecycle events: the short name of the
    /// implementing type, e.g. `Snapshot`.
    fn resource_kind() -> &'static str
    where
        Self: Sized,
    {
        short_type_name(type_name::<Self>())
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// One edge of the transition table, as seen by listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<S, E> {
    pub current_state: S,
    pub event: E,
    pub to_state: S,
}

/// Observer of a state machine's transitions.
///
/// Both hooks return whether the transition may proceed. The post hook's
/// `status` tells whether the new state was actually persisted.
pub trait StateListener<S, E, V>: Send + Sync {
    fn pre_state_transition(&self, old_state: S, event: E, new_state: S, entity: &V) -> bool;

    fn post_state_transition(&self, transition: &Transition<S, E>, entity: &V, status: bool)
    -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsmError {
    #[error("no transition from {state} on {event}")]
    NoTransition { state: String, event: String },

    #[error("transition from {state} on {event} was vetoed by a listener")]
    Vetoed { state: String, event: String },

    #[error("transition from {state} to {to_state} was not persisted")]
    Rejected { state: String, to_state: String },
}

/// Table-driven state machine with transition listeners.
///
/// Listeners registered here fire for every transition of every entity the
/// machine drives. Pre hooks fire before the new state is persisted, so a
/// pre notification does not guarantee the transition happened.
pub struct StateMachine<S, E, V> {
    transitions: HashMap<(S, E), S>,
    listeners: Vec<Arc<dyn StateListener<S, E, V>>>,
}

impl<S, E, V> Default for StateMachine<S, E, V> {
    fn default() -> Self {
        Self {
            transitions: HashMap::new(),
            listeners: Vec::new(),
        }
    }
}

impl<S, E, V> StateMachine<S, E, V>
where
    S: Copy + Eq + Hash + fmt::Display,
    E: Copy + Eq + Hash + fmt::Display,
    V: StateEntity<S>,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_transition(&mut self, from: S, event: E, to: S) -> &mut Self {
        self.transitions.insert((from, event), to);
        self
    }

    pub fn register_listener(&mut self, listener: Arc<dyn StateListener<S, E, V>>) {
        self.listeners.push(listener);
    }

    pub fn next_state(&self, current: S, event: E) -> Option<S> {
        self.transitions.get(&(current, event)).copied()
    }

    /// Move `entity` along `event`, persisting the new state with
    /// `set_state`.
    pub fn transit(&self, entity: &mut V, event: E) -> Result<S, FsmError> {
        self.transit_with(entity, event, |entity, next| {
            entity.set_state(next);
            true
        })
    }

    /// Move `entity` along `event`. `persist` applies the new state and
    /// returns false when the update was rejected, e.g. because another
    /// writer moved the entity first.
    pub fn transit_with<F>(&self, entity: &mut V, event: E, persist: F) -> Result<S, FsmError>
    where
        F: FnOnce(&mut V, S) -> bool,
    {
        let current = entity.state();
        let next = self
            .next_state(current, event)
            .ok_or_else(|| FsmError::NoTransition {
                state: current.to_string(),
                event: event.to_string(),
            })?;

        for listener in &self.listeners {
            if !listener.pre_state_transition(current, event, next, entity) {
                return Err(FsmError::Vetoed {
                    state: current.to_string(),
                    event: event.to_string(),
                });
            }
        }

        let persisted = persist(entity, next);

        let transition = Transition {
            current_state: current,
            event,
            to_state: next,
        };
        for listener in &self.listeners {
            listener.post_state_transition(&transition, entity, persisted);
        }

        if persisted {
            Ok(next)
        } else {
            Err(FsmError::Rejected {
                state: current.to_string(),
                to_state: next.to_string(),
            })
        }
    }
}
