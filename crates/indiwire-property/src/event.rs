//! Events raised by the device-side property tree.
//!
//! Element events are raised on the element first and then bubble to its
//! vector, group and driver, so a handler can observe a single element or a
//! whole device. Vector events start at the vector.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indiwire_message::State;

use crate::bus::{BusEvent, EventKind};
use crate::element::Element;
use crate::value::Value;
use crate::vector::Vector;

/// Shared cancellation flag of a [`PropertyEvent::Write`].
///
/// Once any handler calls [`prevent`](Self::prevent) the proposed value is
/// not committed; the handler becomes responsible for calling
/// [`Element::update`] when the device is done.
#[derive(Debug, Clone, Default)]
pub struct PreventDefault(Arc<AtomicBool>);

impl PreventDefault {
    pub fn prevent(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_prevented(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub enum PropertyEvent {
    /// The element's value is about to be read.
    Read { element: Element },
    /// A client asked to change the element's value.
    Write {
        element: Element,
        new_value: Value,
        prevent_default: PreventDefault,
    },
    /// The committed value changed.
    Change {
        element: Element,
        old: Value,
        new: Value,
    },
    /// The vector's state changed.
    StateUpdate {
        vector: Vector,
        old: State,
        new: State,
    },
}

impl PropertyEvent {
    /// Element the event concerns, if any.
    pub fn element(&self) -> Option<&Element> {
        match self {
            PropertyEvent::Read { element }
            | PropertyEvent::Write { element, .. }
            | PropertyEvent::Change { element, .. } => Some(element),
            PropertyEvent::StateUpdate { .. } => None,
        }
    }

    pub fn vector(&self) -> &Vector {
        match self {
            PropertyEvent::Read { element }
            | PropertyEvent::Write { element, .. }
            | PropertyEvent::Change { element, .. } => element.vector(),
            PropertyEvent::StateUpdate { vector, .. } => vector,
        }
    }
}

impl BusEvent for PropertyEvent {
    fn kind(&self) -> EventKind {
        match self {
            PropertyEvent::Read { .. } => EventKind::Read,
            PropertyEvent::Write { .. } => EventKind::Write,
            PropertyEvent::Change { .. } => EventKind::Change,
            PropertyEvent::StateUpdate { .. } => EventKind::StateUpdate,
        }
    }
}
