//! Live property vectors.
//!
//! A [`Vector`] is a cheap handle over shared state. Element values live in
//! one mutex per vector so a switch rule sees and updates all siblings
//! atomically; the lock is never held while events are raised or messages
//! are sent, so handlers may freely call back into the tree.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use indiwire_message::number::{format_number, parse_number};
use indiwire_message::{
    now, Blob, DefBlob, DefElements, DefLight, DefNumber, DefSwitch, DefText, DefVector,
    DelProperty, Message, NewElements, NewVector, OneBlob, OneElements, OneLight, OneNumber,
    OneSwitch, OneText, Permission, PropertyKind, SetVector, State, SwitchRule, SwitchState,
};
use tracing::debug;

use crate::bus::{EventBus, EventKind, SubscriptionId};
use crate::definition::{ElementDef, VectorDef};
use crate::element::Element;
use crate::error::{PropertyError, Result};
use crate::event::PropertyEvent;
use crate::group::GroupShared;
use crate::lock;
use crate::value::Value;

pub(crate) struct ElementSlot {
    pub(crate) def: ElementDef,
    pub(crate) enabled: AtomicBool,
    pub(crate) bus: EventBus<PropertyEvent>,
}

/// Element value transition produced by a commit: `(index, old, new)`.
pub(crate) type Transition = (usize, Value, Value);

pub(crate) struct VectorInner {
    name: String,
    label: String,
    kind: PropertyKind,
    perm: Permission,
    rule: SwitchRule,
    timeout: f64,
    group: Arc<GroupShared>,
    state: Mutex<State>,
    enabled: AtomicBool,
    values: Mutex<Vec<Value>>,
    slots: Vec<ElementSlot>,
    index: HashMap<String, usize>,
    bus: EventBus<PropertyEvent>,
}

#[derive(Clone)]
pub struct Vector {
    inner: Arc<VectorInner>,
}

impl Vector {
    pub(crate) fn new(def: VectorDef, group: Arc<GroupShared>) -> Self {
        let mut values = Vec::with_capacity(def.elements.len());
        let mut slots = Vec::with_capacity(def.elements.len());
        let mut index = HashMap::new();
        for (i, element) in def.elements.into_iter().enumerate() {
            index.insert(element.name.clone(), i);
            values.push(element.default.clone());
            slots.push(ElementSlot {
                enabled: AtomicBool::new(element.enabled),
                def: element,
                bus: EventBus::new(),
            });
        }
        let label = def.label.unwrap_or_else(|| def.name.clone());
        Self {
            inner: Arc::new(VectorInner {
                name: def.name,
                label,
                kind: def.kind,
                perm: def.perm,
                rule: def.rule,
                timeout: def.timeout,
                group,
                state: Mutex::new(def.state),
                enabled: AtomicBool::new(def.enabled),
                values: Mutex::new(values),
                slots,
                index,
                bus: EventBus::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn kind(&self) -> PropertyKind {
        self.inner.kind
    }

    pub fn perm(&self) -> Permission {
        self.inner.perm
    }

    pub fn rule(&self) -> SwitchRule {
        self.inner.rule
    }

    pub fn timeout(&self) -> f64 {
        self.inner.timeout
    }

    pub fn device_name(&self) -> &str {
        &self.inner.group.device.name
    }

    pub fn group_name(&self) -> &str {
        &self.inner.group.name
    }

    pub fn state(&self) -> State {
        *lock(&self.inner.state)
    }

    /// Set the vector state. The `set*Vector` message is sent even when the
    /// state is unchanged; a `StateUpdate` event only when it differs.
    pub fn set_state(&self, state: State) {
        let old = std::mem::replace(&mut *lock(&self.inner.state), state);
        self.send_update();
        if old != state {
            self.bubble(
                None,
                &PropertyEvent::StateUpdate {
                    vector: self.clone(),
                    old,
                    new: state,
                },
            );
        }
    }

    /// Visible to clients: the vector's own flag and its group's.
    pub fn enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst) && self.inner.group.enabled()
    }

    /// Show or hide the vector, re-emitting its definition and values.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
        self.send_definition();
        self.send_update();
    }

    pub fn len(&self) -> usize {
        self.inner.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.slots.is_empty()
    }

    pub fn element(&self, name: &str) -> Option<Element> {
        self.inner
            .index
            .get(name)
            .map(|&index| Element::new(self.clone(), index))
    }

    pub fn elements(&self) -> Vec<Element> {
        (0..self.len())
            .map(|index| Element::new(self.clone(), index))
            .collect()
    }

    pub fn events(&self) -> &EventBus<PropertyEvent> {
        &self.inner.bus
    }

    /// Observe this vector's state updates and the events of its elements.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&PropertyEvent) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.bus.unsubscribe(id)
    }

    /// Names of the switches currently `On`.
    pub fn selected(&self) -> Vec<String> {
        let values = lock(&self.inner.values);
        self.inner
            .slots
            .iter()
            .zip(values.iter())
            .filter(|(_, value)| value.is_on())
            .map(|(slot, _)| slot.def.name.clone())
            .collect()
    }

    /// Turn exactly `name` on, going through the switch rule.
    pub fn select(&self, name: &str) -> Result<()> {
        self.select_values(&[name])
    }

    /// Turn the named switches on and every other one off, emitting events
    /// and messages for each element that changes.
    pub fn select_values(&self, names: &[&str]) -> Result<()> {
        self.check_names(names)?;
        let wanted = |i: usize| names.contains(&self.inner.slots[i].def.name.as_str());
        // Turn the new selection on first so OneOfMany never sees zero On.
        let mut order: Vec<usize> = (0..self.len()).filter(|&i| wanted(i)).collect();
        order.extend((0..self.len()).filter(|&i| !wanted(i)));
        for i in order {
            let target = SwitchState::from(wanted(i));
            if self.current(i).as_switch() != Some(target) {
                Element::new(self.clone(), i).update(target)?;
            }
        }
        Ok(())
    }

    /// Silently set the selection, without rule checks, events or messages.
    pub fn reset_selected(&self, names: &[&str]) -> Result<()> {
        self.check_names(names)?;
        let mut values = lock(&self.inner.values);
        for (slot, value) in self.inner.slots.iter().zip(values.iter_mut()) {
            *value = Value::Switch(names.contains(&slot.def.name.as_str()).into());
        }
        Ok(())
    }

    fn check_names(&self, names: &[&str]) -> Result<()> {
        if self.inner.kind != PropertyKind::Switch {
            return Err(PropertyError::KindMismatch {
                element: self.inner.name.clone(),
                expected: PropertyKind::Switch,
                found: self.inner.kind,
            });
        }
        match names.iter().find(|n| !self.inner.index.contains_key(**n)) {
            Some(missing) => Err(self.unknown_element(missing)),
            None => Ok(()),
        }
    }

    fn lookup(&self, name: &str) -> Result<Element> {
        self.element(name).ok_or_else(|| self.unknown_element(name))
    }

    fn unknown_element(&self, name: &str) -> PropertyError {
        PropertyError::UnknownElement {
            vector: self.inner.name.clone(),
            element: name.to_string(),
        }
    }

    /// Definition of the vector, or `delProperty` when it is hidden.
    /// Values are read through [`Element::value`], so `Read` handlers run.
    pub fn to_def_message(&self) -> Message {
        if !self.enabled() {
            return Message::DelProperty(DelProperty {
                device: self.device_name().to_string(),
                name: Some(self.inner.name.clone()),
                timestamp: Some(now()),
                message: None,
            });
        }

        let visible = self.visible_elements();
        let elements = match self.inner.kind {
            PropertyKind::Number => DefElements::Number(
                visible
                    .iter()
                    .map(|el| {
                        let spec = &el.slot().def.number;
                        DefNumber {
                            name: el.name().to_string(),
                            label: Some(el.label().to_string()),
                            format: spec.format.clone(),
                            min: spec.min,
                            max: spec.max(),
                            step: spec.step,
                            value: el.wire_number(),
                        }
                    })
                    .collect(),
            ),
            PropertyKind::Text => DefElements::Text(
                visible
                    .iter()
                    .map(|el| DefText {
                        name: el.name().to_string(),
                        label: Some(el.label().to_string()),
                        value: el.value().as_text().unwrap_or_default().to_string(),
                    })
                    .collect(),
            ),
            PropertyKind::Switch => DefElements::Switch(
                visible
                    .iter()
                    .map(|el| DefSwitch {
                        name: el.name().to_string(),
                        label: Some(el.label().to_string()),
                        value: el.value().as_switch().unwrap_or_default(),
                    })
                    .collect(),
            ),
            PropertyKind::Light => DefElements::Light(
                visible
                    .iter()
                    .map(|el| DefLight {
                        name: el.name().to_string(),
                        label: Some(el.label().to_string()),
                        value: el.value().as_light().unwrap_or_default(),
                    })
                    .collect(),
            ),
            PropertyKind::Blob => DefElements::Blob(
                visible
                    .iter()
                    .map(|el| DefBlob {
                        name: el.name().to_string(),
                        label: Some(el.label().to_string()),
                    })
                    .collect(),
            ),
        };

        let light = self.inner.kind == PropertyKind::Light;
        Message::Def(DefVector {
            device: self.device_name().to_string(),
            name: self.inner.name.clone(),
            label: Some(self.inner.label.clone()),
            group: Some(self.group_name().to_string()),
            state: self.state(),
            perm: (!light).then_some(self.inner.perm),
            rule: (self.inner.kind == PropertyKind::Switch).then_some(self.inner.rule),
            timeout: (!light).then_some(self.inner.timeout),
            timestamp: Some(now()),
            message: None,
            elements,
        })
    }

    /// Current values of the enabled elements, `None` while hidden.
    pub fn to_set_message(&self) -> Option<Message> {
        if !self.enabled() {
            return None;
        }

        let visible = self.visible_elements();
        let elements = match self.inner.kind {
            PropertyKind::Number => OneElements::Number(
                visible
                    .iter()
                    .map(|el| OneNumber {
                        name: el.name().to_string(),
                        value: el.wire_number(),
                    })
                    .collect(),
            ),
            PropertyKind::Text => OneElements::Text(
                visible
                    .iter()
                    .map(|el| OneText {
                        name: el.name().to_string(),
                        value: el.value().as_text().unwrap_or_default().to_string(),
                    })
                    .collect(),
            ),
            PropertyKind::Switch => OneElements::Switch(
                visible
                    .iter()
                    .map(|el| OneSwitch {
                        name: el.name().to_string(),
                        value: el.value().as_switch().unwrap_or_default(),
                    })
                    .collect(),
            ),
            PropertyKind::Light => OneElements::Light(
                visible
                    .iter()
                    .map(|el| OneLight {
                        name: el.name().to_string(),
                        value: el.value().as_light().unwrap_or_default(),
                    })
                    .collect(),
            ),
            PropertyKind::Blob => OneElements::Blob(
                visible
                    .iter()
                    .map(|el| OneBlob {
                        name: el.name().to_string(),
                        blob: el
                            .value()
                            .as_blob()
                            .cloned()
                            .unwrap_or_else(|| Blob::new("", Vec::new())),
                    })
                    .collect(),
            ),
        };

        Some(Message::Set(SetVector {
            device: self.device_name().to_string(),
            name: self.inner.name.clone(),
            state: self.state(),
            timeout: (self.inner.kind != PropertyKind::Light).then_some(self.inner.timeout),
            timestamp: Some(now()),
            message: None,
            elements,
        }))
    }

    pub fn send_definition(&self) {
        self.inner.group.device.send(self.to_def_message());
    }

    pub fn send_update(&self) {
        if let Some(msg) = self.to_set_message() {
            self.inner.group.device.send(msg);
        }
    }

    /// Apply a client's `new*Vector`.
    ///
    /// Every child is checked before any is applied; each one then goes
    /// through [`Element::set_value`], so `Write` handlers decide whether
    /// it is committed.
    pub fn apply_new(&self, msg: &NewVector) -> Result<()> {
        if !self.inner.perm.is_writable() {
            return Err(PropertyError::ReadOnly(self.inner.name.clone()));
        }
        if msg.elements.kind() != self.inner.kind {
            return Err(PropertyError::KindMismatch {
                element: self.inner.name.clone(),
                expected: self.inner.kind,
                found: msg.elements.kind(),
            });
        }

        let mut pending: Vec<(Element, Value)> = Vec::new();
        match &msg.elements {
            NewElements::Number(items) => {
                for item in items {
                    let element = self.lookup(&item.name)?;
                    let format = &element.slot().def.number.format;
                    let value = parse_number(&item.value, format).ok_or_else(|| {
                        PropertyError::InvalidValue {
                            element: item.name.clone(),
                            value: item.value.clone(),
                        }
                    })?;
                    pending.push((element, Value::Number(value)));
                }
            }
            NewElements::Text(items) => {
                for item in items {
                    pending.push((self.lookup(&item.name)?, Value::Text(item.value.clone())));
                }
            }
            NewElements::Switch(items) => {
                // On before Off, so a OneOfMany vector always has one switch on.
                let (on, off): (Vec<_>, Vec<_>) =
                    items.iter().partition(|item| item.value == SwitchState::On);
                for item in on.into_iter().chain(off) {
                    pending.push((self.lookup(&item.name)?, Value::Switch(item.value)));
                }
            }
            NewElements::Blob(items) => {
                for item in items {
                    pending.push((self.lookup(&item.name)?, Value::from(item.blob.clone())));
                }
            }
        }

        debug!(device = %self.device_name(), vector = %self.inner.name, count = pending.len(), "applying client write");
        let mut first_error = None;
        for (element, value) in pending {
            if let Err(err) = element.set_value(value) {
                tracing::warn!(device = %self.device_name(), vector = %self.inner.name, element = %element.name(), error = %err, "client write rejected");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn visible_elements(&self) -> Vec<Element> {
        self.elements()
            .into_iter()
            .filter(|el| el.enabled())
            .collect()
    }

    pub(crate) fn slot(&self, index: usize) -> &ElementSlot {
        &self.inner.slots[index]
    }

    pub(crate) fn current(&self, index: usize) -> Value {
        lock(&self.inner.values)[index].clone()
    }

    /// Store `value` at `index`, enforcing the switch rule. Returns every
    /// transition, the target element first.
    pub(crate) fn commit(&self, index: usize, value: Value) -> Result<Vec<Transition>> {
        let mut values = lock(&self.inner.values);
        let mut transitions = Vec::new();

        if let Value::Switch(target) = value {
            let rule = self.inner.rule;
            match target {
                SwitchState::On if rule != SwitchRule::AnyOfMany => {
                    for (i, current) in values.iter_mut().enumerate() {
                        if i != index && current.is_on() {
                            let old = std::mem::replace(current, Value::Switch(SwitchState::Off));
                            transitions.push((i, old, Value::Switch(SwitchState::Off)));
                        }
                    }
                }
                SwitchState::Off if rule == SwitchRule::OneOfMany => {
                    let others_on = values
                        .iter()
                        .enumerate()
                        .any(|(i, current)| i != index && current.is_on());
                    if !others_on {
                        return Err(PropertyError::RuleViolation {
                            vector: self.inner.name.clone(),
                            element: self.inner.slots[index].def.name.clone(),
                        });
                    }
                }
                _ => {}
            }
        }

        let old = std::mem::replace(&mut values[index], value.clone());
        if old != value {
            transitions.insert(0, (index, old, value));
        }
        Ok(transitions)
    }

    /// Raise `event` on the element at `origin` (if any), then on the
    /// vector, its group and its device.
    pub(crate) fn bubble(&self, origin: Option<usize>, event: &PropertyEvent) {
        if let Some(index) = origin {
            self.inner.slots[index].bus.raise(event);
        }
        self.inner.bus.raise(event);
        self.inner.group.bus.raise(event);
        self.inner.group.device.bus.raise(event);
    }

    pub(crate) fn format_number(&self, index: usize, value: f64) -> String {
        format_number(value, &self.inner.slots[index].def.number.format)
    }

    pub(crate) fn same(&self, other: &Vector) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vector")
            .field("device", &self.device_name())
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .field("state", &self.state())
            .finish()
    }
}
