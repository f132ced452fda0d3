//! Local copy of remote device state, built from `def*`, `set*` and
//! `delProperty` messages.

use std::collections::BTreeMap;

use indiwire_message::number::parse_number;
use indiwire_message::{
    DefElements, DefVector, DelProperty, OneElements, Permission, PropertyKind, SetVector, State,
    SwitchRule,
};
use indiwire_property::Value;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::event::ClientEvent;

/// Number attributes from a `defNumber`.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberAttrs {
    pub format: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteElement {
    pub name: String,
    pub label: Option<String>,
    pub value: Value,
    /// Value staged with `Client::set_new_value`, sent on `submit`.
    pub pending: Option<Value>,
    /// Present for number elements only.
    pub number: Option<NumberAttrs>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteVector {
    pub device: String,
    pub name: String,
    pub label: Option<String>,
    pub group: Option<String>,
    pub kind: PropertyKind,
    pub state: State,
    pub perm: Option<Permission>,
    pub rule: Option<SwitchRule>,
    pub timeout: Option<f64>,
    pub timestamp: Option<String>,
    pub message: Option<String>,
    pub elements: Vec<RemoteElement>,
}

impl RemoteVector {
    pub fn element(&self, name: &str) -> Option<&RemoteElement> {
        self.elements.iter().find(|e| e.name == name)
    }

    pub(crate) fn element_mut(&mut self, name: &str) -> Option<&mut RemoteElement> {
        self.elements.iter_mut().find(|e| e.name == name)
    }

    /// Clients may write the vector: not a light and not read-only.
    pub fn is_writable(&self) -> bool {
        self.kind.is_client_writable() && self.perm.is_some_and(Permission::is_writable)
    }

    fn from_def(def: &DefVector) -> Result<Self> {
        let elements = match &def.elements {
            DefElements::Number(items) => items
                .iter()
                .map(|item| {
                    let value = parse_number(&item.value, &item.format).ok_or_else(|| {
                        ClientError::InvalidNumber {
                            element: item.name.clone(),
                            value: item.value.clone(),
                        }
                    })?;
                    Ok(RemoteElement {
                        name: item.name.clone(),
                        label: item.label.clone(),
                        value: Value::Number(value),
                        pending: None,
                        number: Some(NumberAttrs {
                            format: item.format.clone(),
                            min: item.min,
                            max: item.max,
                            step: item.step,
                        }),
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            DefElements::Text(items) => items
                .iter()
                .map(|item| plain(&item.name, &item.label, Value::Text(item.value.clone())))
                .collect(),
            DefElements::Switch(items) => items
                .iter()
                .map(|item| plain(&item.name, &item.label, Value::Switch(item.value)))
                .collect(),
            DefElements::Light(items) => items
                .iter()
                .map(|item| plain(&item.name, &item.label, Value::Light(item.value)))
                .collect(),
            DefElements::Blob(items) => items
                .iter()
                .map(|item| plain(&item.name, &item.label, Value::Blob(None)))
                .collect(),
        };

        Ok(Self {
            device: def.device.clone(),
            name: def.name.clone(),
            label: def.label.clone(),
            group: def.group.clone(),
            kind: def.elements.kind(),
            state: def.state,
            perm: def.perm,
            rule: def.rule,
            timeout: def.timeout,
            timestamp: def.timestamp.clone(),
            message: def.message.clone(),
            elements,
        })
    }

    /// New values from a `set*Vector`, as `(element, value)` pairs.
    fn incoming(&self, set: &SetVector) -> Result<Vec<(String, Value)>> {
        let mut out = Vec::new();
        match &set.elements {
            OneElements::Number(items) => {
                for item in items {
                    let format = self
                        .element(&item.name)
                        .and_then(|e| e.number.as_ref())
                        .map_or("%g", |n| n.format.as_str());
                    let value = parse_number(&item.value, format).ok_or_else(|| {
                        ClientError::InvalidNumber {
                            element: item.name.clone(),
                            value: item.value.clone(),
                        }
                    })?;
                    out.push((item.name.clone(), Value::Number(value)));
                }
            }
            OneElements::Text(items) => {
                out.extend(items.iter().map(|i| (i.name.clone(), Value::Text(i.value.clone()))));
            }
            OneElements::Switch(items) => {
                out.extend(items.iter().map(|i| (i.name.clone(), Value::Switch(i.value))));
            }
            OneElements::Light(items) => {
                out.extend(items.iter().map(|i| (i.name.clone(), Value::Light(i.value))));
            }
            OneElements::Blob(items) => {
                out.extend(items.iter().map(|i| (i.name.clone(), Value::from(i.blob.clone()))));
            }
        }
        Ok(out)
    }
}

fn plain(name: &str, label: &Option<String>, value: Value) -> RemoteElement {
    RemoteElement {
        name: name.to_string(),
        label: label.clone(),
        value,
        pending: None,
        number: None,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteDevice {
    pub name: String,
    /// In definition order.
    pub vectors: Vec<RemoteVector>,
}

impl RemoteDevice {
    pub fn vector(&self, name: &str) -> Option<&RemoteVector> {
        self.vectors.iter().find(|v| v.name == name)
    }

    pub(crate) fn vector_mut(&mut self, name: &str) -> Option<&mut RemoteVector> {
        self.vectors.iter_mut().find(|v| v.name == name)
    }
}

/// Result of applying one message to the mirror.
#[derive(Debug, Default)]
pub struct Applied {
    /// Events to raise, in order.
    pub events: Vec<ClientEvent>,
    /// Set when the message introduced a device not seen before.
    pub new_device: Option<String>,
}

#[derive(Debug, Default)]
pub struct Mirror {
    devices: BTreeMap<String, RemoteDevice>,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn devices(&self) -> impl Iterator<Item = &RemoteDevice> {
        self.devices.values()
    }

    pub fn device(&self, name: &str) -> Option<&RemoteDevice> {
        self.devices.get(name)
    }

    pub(crate) fn device_mut(&mut self, name: &str) -> Option<&mut RemoteDevice> {
        self.devices.get_mut(name)
    }

    pub fn vector(&self, device: &str, name: &str) -> Option<&RemoteVector> {
        self.devices.get(device)?.vector(name)
    }

    /// Define (or redefine) a vector. Every element is reported as a value
    /// update from nothing, followed by the definition itself.
    pub fn apply_def(&mut self, def: &DefVector) -> Result<Applied> {
        let mut vector = RemoteVector::from_def(def)?;
        let mut applied = Applied::default();

        let device = self.devices.entry(def.device.clone()).or_insert_with(|| {
            applied.new_device = Some(def.device.clone());
            RemoteDevice {
                name: def.device.clone(),
                vectors: Vec::new(),
            }
        });

        // Staged values survive a redefinition while their element does.
        if let Some(existing) = device.vector(&def.name) {
            if existing.kind == vector.kind {
                for old in &existing.elements {
                    if let Some(element) = vector.element_mut(&old.name) {
                        element.pending = old.pending.clone();
                    }
                }
            }
        }

        for element in &vector.elements {
            applied.events.push(ClientEvent::ValueUpdate {
                device: def.device.clone(),
                vector: def.name.clone(),
                element: element.name.clone(),
                old: None,
                new: element.value.clone(),
            });
        }
        applied.events.push(ClientEvent::Definition {
            vector: vector.clone(),
        });

        match device.vector_mut(&def.name) {
            Some(existing) => *existing = vector,
            None => device.vectors.push(vector),
        }
        Ok(applied)
    }

    /// Apply new state and values; only actual changes produce events.
    pub fn apply_set(&mut self, set: &SetVector) -> Result<Applied> {
        let mut applied = Applied::default();
        let Some(vector) = self
            .devices
            .get_mut(&set.device)
            .and_then(|d| d.vector_mut(&set.name))
        else {
            debug!(device = %set.device, vector = %set.name, "set for undefined vector ignored");
            return Ok(applied);
        };
        if vector.kind != set.elements.kind() {
            return Err(indiwire_property::PropertyError::KindMismatch {
                element: set.name.clone(),
                expected: vector.kind,
                found: set.elements.kind(),
            }
            .into());
        }

        let incoming = vector.incoming(set)?;

        if vector.state != set.state {
            applied.events.push(ClientEvent::StateUpdate {
                device: set.device.clone(),
                vector: set.name.clone(),
                old: vector.state,
                new: set.state,
            });
            vector.state = set.state;
        }
        if set.timeout.is_some() {
            vector.timeout = set.timeout;
        }
        vector.timestamp = set.timestamp.clone();
        vector.message = set.message.clone();

        for (name, value) in incoming {
            let Some(element) = vector.element_mut(&name) else {
                debug!(device = %set.device, vector = %set.name, element = %name, "unknown element ignored");
                continue;
            };
            if element.value != value {
                let old = std::mem::replace(&mut element.value, value.clone());
                applied.events.push(ClientEvent::ValueUpdate {
                    device: set.device.clone(),
                    vector: set.name.clone(),
                    element: name,
                    old: Some(old),
                    new: value,
                });
            }
        }
        Ok(applied)
    }

    /// Remove one vector, or the whole device when no name is given.
    pub fn apply_del(&mut self, del: &DelProperty) {
        match &del.name {
            Some(name) => {
                if let Some(device) = self.devices.get_mut(&del.device) {
                    device.vectors.retain(|v| &v.name != name);
                }
            }
            None => {
                self.devices.remove(&del.device);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use indiwire_message::{DefNumber, DefSwitch, OneNumber, OneSwitch, SwitchState};
    use indiwire_property::BusEvent;

    use super::*;

    fn def_connection() -> DefVector {
        DefVector {
            device: "CCD".into(),
            name: "CONNECTION".into(),
            label: None,
            group: Some("Main".into()),
            state: State::Idle,
            perm: Some(Permission::ReadWrite),
            rule: Some(SwitchRule::OneOfMany),
            timeout: Some(0.0),
            timestamp: None,
            message: None,
            elements: DefElements::Switch(vec![
                DefSwitch {
                    name: "CONNECT".into(),
                    label: None,
                    value: SwitchState::Off,
                },
                DefSwitch {
                    name: "DISCONNECT".into(),
                    label: None,
                    value: SwitchState::On,
                },
            ]),
        }
    }

    fn set_connect(state: State) -> SetVector {
        SetVector {
            device: "CCD".into(),
            name: "CONNECTION".into(),
            state,
            timeout: None,
            timestamp: None,
            message: None,
            elements: OneElements::Switch(vec![
                OneSwitch {
                    name: "CONNECT".into(),
                    value: SwitchState::On,
                },
                OneSwitch {
                    name: "DISCONNECT".into(),
                    value: SwitchState::Off,
                },
            ]),
        }
    }

    #[test]
    fn definition_creates_device_and_reports_values() {
        let mut mirror = Mirror::new();
        let applied = mirror.apply_def(&def_connection()).expect("def");
        assert_eq!(applied.new_device.as_deref(), Some("CCD"));
        assert_eq!(applied.events.len(), 3);
        assert!(matches!(
            &applied.events[0],
            ClientEvent::ValueUpdate { element, old: None, .. } if element == "CONNECT"
        ));
        assert!(matches!(applied.events[2], ClientEvent::Definition { .. }));

        let again = mirror.apply_def(&def_connection()).expect("redefine");
        assert_eq!(again.new_device, None);
        assert_eq!(mirror.device("CCD").expect("device").vectors.len(), 1);
    }

    #[test]
    fn redefinition_keeps_pending_values_of_surviving_elements() {
        let mut mirror = Mirror::new();
        mirror.apply_def(&def_connection()).expect("def");
        for name in ["CONNECT", "DISCONNECT"] {
            mirror
                .device_mut("CCD")
                .and_then(|d| d.vector_mut("CONNECTION"))
                .and_then(|v| v.element_mut(name))
                .expect("element")
                .pending = Some(Value::Switch(SwitchState::On));
        }

        let mut narrowed = def_connection();
        if let DefElements::Switch(items) = &mut narrowed.elements {
            items.retain(|item| item.name == "CONNECT");
        }
        mirror.apply_def(&narrowed).expect("redefine");

        let vector = mirror.vector("CCD", "CONNECTION").expect("vector");
        assert_eq!(vector.elements.len(), 1);
        assert_eq!(
            vector.element("CONNECT").expect("element").pending,
            Some(Value::Switch(SwitchState::On))
        );
    }

    #[test]
    fn set_reports_only_changes() {
        let mut mirror = Mirror::new();
        mirror.apply_def(&def_connection()).expect("def");

        let applied = mirror.apply_set(&set_connect(State::Ok)).expect("set");
        let kinds: Vec<_> = applied.events.iter().map(ClientEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![
                indiwire_property::EventKind::StateUpdate,
                indiwire_property::EventKind::Change,
                indiwire_property::EventKind::Change,
            ]
        );

        let repeat = mirror.apply_set(&set_connect(State::Ok)).expect("set");
        assert!(repeat.events.is_empty());

        let vector = mirror.vector("CCD", "CONNECTION").expect("vector");
        assert_eq!(vector.state, State::Ok);
        assert!(vector.element("CONNECT").expect("element").value.is_on());
    }

    #[test]
    fn set_for_unknown_vector_is_ignored() {
        let mut mirror = Mirror::new();
        let applied = mirror.apply_set(&set_connect(State::Ok)).expect("set");
        assert!(applied.events.is_empty());
    }

    #[test]
    fn numbers_parse_with_declared_format() {
        let mut mirror = Mirror::new();
        let def = DefVector {
            device: "Mount".into(),
            name: "EQUATORIAL_EOD_COORD".into(),
            label: None,
            group: None,
            state: State::Ok,
            perm: Some(Permission::ReadWrite),
            rule: None,
            timeout: Some(60.0),
            timestamp: None,
            message: None,
            elements: DefElements::Number(vec![DefNumber {
                name: "RA".into(),
                label: None,
                format: "%10.6m".into(),
                min: 0.0,
                max: 24.0,
                step: 0.0,
                value: "12:30:00".into(),
            }]),
        };
        mirror.apply_def(&def).expect("def");
        let set = SetVector {
            device: "Mount".into(),
            name: "EQUATORIAL_EOD_COORD".into(),
            state: State::Busy,
            timeout: None,
            timestamp: None,
            message: None,
            elements: OneElements::Number(vec![OneNumber {
                name: "RA".into(),
                value: "6:15:00".into(),
            }]),
        };
        mirror.apply_set(&set).expect("set");
        let ra = mirror
            .vector("Mount", "EQUATORIAL_EOD_COORD")
            .and_then(|v| v.element("RA"))
            .expect("RA");
        assert_eq!(ra.value, Value::Number(6.25));
    }

    #[test]
    fn delete_vector_or_device() {
        let mut mirror = Mirror::new();
        mirror.apply_def(&def_connection()).expect("def");
        mirror.apply_del(&DelProperty {
            device: "CCD".into(),
            name: Some("CONNECTION".into()),
            timestamp: None,
            message: None,
        });
        assert!(mirror.device("CCD").expect("device").vectors.is_empty());

        mirror.apply_del(&DelProperty {
            device: "CCD".into(),
            name: None,
            timestamp: None,
            message: None,
        });
        assert!(mirror.device("CCD").is_none());
    }

    #[test]
    fn writability() {
        let mut mirror = Mirror::new();
        mirror.apply_def(&def_connection()).expect("def");
        assert!(mirror
            .vector("CCD", "CONNECTION")
            .expect("vector")
            .is_writable());
    }
}
