//! Client-side events, subscription filters and wait conditions.

use std::fmt;
use std::sync::Arc;

use indiwire_message::State;
use indiwire_property::{BusEvent, EventKind, Value};

use crate::mirror::RemoteVector;

/// Something changed in the mirror.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A vector was defined or redefined.
    Definition { vector: RemoteVector },
    StateUpdate {
        device: String,
        vector: String,
        old: State,
        new: State,
    },
    /// An element value changed; `old` is `None` when first defined.
    ValueUpdate {
        device: String,
        vector: String,
        element: String,
        old: Option<Value>,
        new: Value,
    },
}

impl ClientEvent {
    pub fn device(&self) -> &str {
        match self {
            ClientEvent::Definition { vector } => &vector.device,
            ClientEvent::StateUpdate { device, .. } | ClientEvent::ValueUpdate { device, .. } => {
                device
            }
        }
    }

    pub fn vector(&self) -> &str {
        match self {
            ClientEvent::Definition { vector } => &vector.name,
            ClientEvent::StateUpdate { vector, .. } | ClientEvent::ValueUpdate { vector, .. } => {
                vector
            }
        }
    }

    pub fn element(&self) -> Option<&str> {
        match self {
            ClientEvent::ValueUpdate { element, .. } => Some(element),
            _ => None,
        }
    }
}

impl BusEvent for ClientEvent {
    fn kind(&self) -> EventKind {
        match self {
            ClientEvent::Definition { .. } => EventKind::Definition,
            ClientEvent::StateUpdate { .. } => EventKind::StateUpdate,
            ClientEvent::ValueUpdate { .. } => EventKind::Change,
        }
    }
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientEvent::Definition { vector } => {
                write!(f, "define {}.{} ({})", vector.device, vector.name, vector.kind)
            }
            ClientEvent::StateUpdate {
                device,
                vector,
                old,
                new,
            } => write!(f, "state {device}.{vector} {old} -> {new}"),
            ClientEvent::ValueUpdate {
                device,
                vector,
                element,
                old,
                new,
            } => match old {
                Some(old) => write!(f, "value {device}.{vector}.{element} {old} -> {new}"),
                None => write!(f, "value {device}.{vector}.{element} = {new}"),
            },
        }
    }
}

/// Selects events by origin and kind. Unset fields match anything; a set
/// `element` never matches events that carry no element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub device: Option<String>,
    pub vector: Option<String>,
    pub element: Option<String>,
    pub kind: Option<EventKind>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn vector(mut self, vector: impl Into<String>) -> Self {
        self.vector = Some(vector.into());
        self
    }

    pub fn element(mut self, element: impl Into<String>) -> Self {
        self.element = Some(element.into());
        self
    }

    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn matches(&self, event: &ClientEvent) -> bool {
        self.kind.is_none_or(|k| k == event.kind())
            && self.device.as_deref().is_none_or(|d| d == event.device())
            && self.vector.as_deref().is_none_or(|v| v == event.vector())
            && self
                .element
                .as_deref()
                .is_none_or(|e| Some(e) == event.element())
    }

    /// Event kinds the filter can match.
    pub(crate) fn kinds(&self) -> Vec<EventKind> {
        match self.kind {
            Some(kind) => vec![kind],
            None => vec![EventKind::Definition, EventKind::StateUpdate, EventKind::Change],
        }
    }
}

/// Target of an [`Condition::Expect`] or [`Condition::Initial`] test.
#[derive(Debug, Clone, PartialEq)]
pub enum Expected {
    /// Compared with the new value of a `ValueUpdate`.
    Value(Value),
    /// Compared with the new state of a `StateUpdate`.
    State(State),
}

/// When a `wait_for_event` call resolves.
#[derive(Clone)]
pub enum Condition {
    /// Arbitrary predicate.
    Check(Arc<dyn Fn(&ClientEvent) -> bool + Send + Sync>),
    /// The new value or state equals the target.
    Expect(Expected),
    /// The new value or state differs from the target.
    Initial(Expected),
}

impl Condition {
    pub fn check<F>(predicate: F) -> Self
    where
        F: Fn(&ClientEvent) -> bool + Send + Sync + 'static,
    {
        Condition::Check(Arc::new(predicate))
    }

    pub fn value_equals(value: impl Into<Value>) -> Self {
        Condition::Expect(Expected::Value(value.into()))
    }

    pub fn state_equals(state: State) -> Self {
        Condition::Expect(Expected::State(state))
    }

    pub fn value_differs(value: impl Into<Value>) -> Self {
        Condition::Initial(Expected::Value(value.into()))
    }

    pub fn state_differs(state: State) -> Self {
        Condition::Initial(Expected::State(state))
    }

    pub fn matches(&self, event: &ClientEvent) -> bool {
        match self {
            Condition::Check(predicate) => predicate(event),
            Condition::Expect(expected) => compare(expected, event).unwrap_or(false),
            Condition::Initial(expected) => compare(expected, event).is_some_and(|same| !same),
        }
    }
}

/// `Some(equal)` when the event carries something comparable to `expected`.
fn compare(expected: &Expected, event: &ClientEvent) -> Option<bool> {
    match (expected, event) {
        (Expected::Value(target), ClientEvent::ValueUpdate { new, .. }) => Some(new == target),
        (Expected::State(target), ClientEvent::StateUpdate { new, .. }) => Some(new == target),
        _ => None,
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Check(_) => f.write_str("Check(..)"),
            Condition::Expect(expected) => f.debug_tuple("Expect").field(expected).finish(),
            Condition::Initial(expected) => f.debug_tuple("Initial").field(expected).finish(),
        }
    }
}
