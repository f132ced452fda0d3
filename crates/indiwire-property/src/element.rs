use std::fmt;
use std::sync::atomic::Ordering;

use indiwire_message::PropertyKind;

use crate::bus::{EventBus, EventKind, SubscriptionId};
use crate::error::{PropertyError, Result};
use crate::event::{PreventDefault, PropertyEvent};
use crate::value::Value;
use crate::vector::{ElementSlot, Vector};

/// Handle to one element of a [`Vector`].
#[derive(Clone)]
pub struct Element {
    vector: Vector,
    index: usize,
}

impl Element {
    pub(crate) fn new(vector: Vector, index: usize) -> Self {
        Self { vector, index }
    }

    pub(crate) fn slot(&self) -> &ElementSlot {
        self.vector.slot(self.index)
    }

    pub fn name(&self) -> &str {
        &self.slot().def.name
    }

    /// Label shown by clients; the name when none was given.
    pub fn label(&self) -> &str {
        self.slot().def.label.as_deref().unwrap_or(self.name())
    }

    pub fn kind(&self) -> PropertyKind {
        self.slot().def.kind
    }

    pub fn vector(&self) -> &Vector {
        &self.vector
    }

    /// Read the value, giving `Read` handlers a chance to refresh it with
    /// [`reset_value`](Self::reset_value) first.
    pub fn value(&self) -> Value {
        self.vector
            .bubble(Some(self.index), &PropertyEvent::Read { element: self.clone() });
        self.current()
    }

    /// The committed value, without raising `Read`.
    pub fn current(&self) -> Value {
        self.vector.current(self.index)
    }

    /// Handle a write request from a client.
    ///
    /// `Write` handlers see the proposed value. Unless one of them calls
    /// [`PreventDefault::prevent`], the value is committed with
    /// [`update`](Self::update).
    pub fn set_value(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.check_kind(&value)?;
        let prevent_default = PreventDefault::default();
        self.vector.bubble(
            Some(self.index),
            &PropertyEvent::Write {
                element: self.clone(),
                new_value: value.clone(),
                prevent_default: prevent_default.clone(),
            },
        );
        if prevent_default.is_prevented() {
            tracing::debug!(device = %self.vector.device_name(), vector = %self.vector.name(), element = %self.name(), "write handled by driver");
            return Ok(());
        }
        self.update(value)
    }

    /// Commit a value from the driver side.
    ///
    /// The switch rule is applied, the vector's `set*Vector` is sent and a
    /// `Change` event is raised for every element whose value moved. A
    /// rejected switch transition still sends the unchanged values.
    pub fn update(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.check_kind(&value)?;
        let outcome = self.vector.commit(self.index, value);
        self.vector.send_update();
        for (index, old, new) in outcome? {
            let element = Element::new(self.vector.clone(), index);
            self.vector
                .bubble(Some(index), &PropertyEvent::Change { element, old, new });
        }
        Ok(())
    }

    /// Store a value without events or messages. Meant for `Read` handlers.
    pub fn reset_value(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.check_kind(&value)?;
        self.vector.commit(self.index, value).map(|_| ())
    }

    pub fn enabled(&self) -> bool {
        self.slot().enabled.load(Ordering::SeqCst)
    }

    /// Include or omit the element from future definitions and updates.
    pub fn set_enabled(&self, enabled: bool) {
        self.slot().enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn events(&self) -> &EventBus<PropertyEvent> {
        &self.slot().bus
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&PropertyEvent) + Send + Sync + 'static,
    {
        self.slot().bus.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.slot().bus.unsubscribe(id)
    }

    pub(crate) fn wire_number(&self) -> String {
        let value = self.value().as_number().unwrap_or_default();
        self.vector.format_number(self.index, value)
    }

    fn check_kind(&self, value: &Value) -> Result<()> {
        if value.kind() != self.kind() {
            return Err(PropertyError::KindMismatch {
                element: self.name().to_string(),
                expected: self.kind(),
                found: value.kind(),
            });
        }
        Ok(())
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.vector.same(&other.vector)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("device", &self.vector.device_name())
            .field("vector", &self.vector.name())
            .field("name", &self.name())
            .field("value", &self.current())
            .finish()
    }
}
