//! Typed protocol messages.
//!
//! Every tag the protocol defines maps to exactly one variant of [`Message`].
//! Vector messages hold their children in a kind-specific collection so a
//! `defNumberVector` can only ever contain `defNumber` parts.

use crate::blob::Blob;
use crate::tags;
use crate::types::{
    BlobEnable, Permission, PropertyKind, State, SwitchRule, SwitchState, PROTOCOL_VERSION,
};

/// `getProperties`: ask for definitions, optionally narrowed to one device
/// or one vector. Drivers also send it to snoop on other devices.
#[derive(Debug, Clone, PartialEq)]
pub struct GetProperties {
    pub version: String,
    pub device: Option<String>,
    pub name: Option<String>,
}

impl GetProperties {
    pub fn new(device: Option<String>, name: Option<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            device,
            name,
        }
    }

    pub fn all() -> Self {
        Self::new(None, None)
    }
}

/// `enableBLOB`: set the sender's BLOB delivery policy for a device.
#[derive(Debug, Clone, PartialEq)]
pub struct EnableBlob {
    pub device: String,
    pub name: Option<String>,
    pub value: BlobEnable,
}

/// `delProperty`: a vector (or, without a name, the whole device) is gone.
#[derive(Debug, Clone, PartialEq)]
pub struct DelProperty {
    pub device: String,
    pub name: Option<String>,
    pub timestamp: Option<String>,
    pub message: Option<String>,
}

/// `message`: free-form notice from a device, or a global one without a device.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub device: Option<String>,
    pub timestamp: Option<String>,
    pub message: Option<String>,
}

/// `pingRequest` / `pingReply` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Ping {
    pub uid: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefNumber {
    pub name: String,
    pub label: Option<String>,
    pub format: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    /// Formatted value text, decimal or sexagesimal.
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefText {
    pub name: String,
    pub label: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefSwitch {
    pub name: String,
    pub label: Option<String>,
    pub value: SwitchState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefLight {
    pub name: String,
    pub label: Option<String>,
    pub value: State,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefBlob {
    pub name: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OneNumber {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OneText {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OneSwitch {
    pub name: String,
    pub value: SwitchState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OneLight {
    pub name: String,
    pub value: State,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OneBlob {
    pub name: String,
    pub blob: Blob,
}

/// Children of a `def*Vector`.
#[derive(Debug, Clone, PartialEq)]
pub enum DefElements {
    Number(Vec<DefNumber>),
    Text(Vec<DefText>),
    Switch(Vec<DefSwitch>),
    Light(Vec<DefLight>),
    Blob(Vec<DefBlob>),
}

/// Children of a `set*Vector`.
#[derive(Debug, Clone, PartialEq)]
pub enum OneElements {
    Number(Vec<OneNumber>),
    Text(Vec<OneText>),
    Switch(Vec<OneSwitch>),
    Light(Vec<OneLight>),
    Blob(Vec<OneBlob>),
}

/// Children of a `new*Vector`. Lights are never written by clients.
#[derive(Debug, Clone, PartialEq)]
pub enum NewElements {
    Number(Vec<OneNumber>),
    Text(Vec<OneText>),
    Switch(Vec<OneSwitch>),
    Blob(Vec<OneBlob>),
}

macro_rules! element_names {
    ($self:ident, $($variant:ident),+) => {
        match $self {
            $(Self::$variant(items) => items.iter().map(|item| item.name.as_str()).collect(),)+
        }
    };
}

impl DefElements {
    pub fn kind(&self) -> PropertyKind {
        match self {
            DefElements::Number(_) => PropertyKind::Number,
            DefElements::Text(_) => PropertyKind::Text,
            DefElements::Switch(_) => PropertyKind::Switch,
            DefElements::Light(_) => PropertyKind::Light,
            DefElements::Blob(_) => PropertyKind::Blob,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        element_names!(self, Number, Text, Switch, Light, Blob)
    }

    pub fn len(&self) -> usize {
        self.names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OneElements {
    pub fn kind(&self) -> PropertyKind {
        match self {
            OneElements::Number(_) => PropertyKind::Number,
            OneElements::Text(_) => PropertyKind::Text,
            OneElements::Switch(_) => PropertyKind::Switch,
            OneElements::Light(_) => PropertyKind::Light,
            OneElements::Blob(_) => PropertyKind::Blob,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        element_names!(self, Number, Text, Switch, Light, Blob)
    }
}

impl NewElements {
    pub fn kind(&self) -> PropertyKind {
        match self {
            NewElements::Number(_) => PropertyKind::Number,
            NewElements::Text(_) => PropertyKind::Text,
            NewElements::Switch(_) => PropertyKind::Switch,
            NewElements::Blob(_) => PropertyKind::Blob,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        element_names!(self, Number, Text, Switch, Blob)
    }
}

/// `def*Vector`: full definition of a property vector.
///
/// `perm` is required on the wire for every kind except Light, `rule` for
/// Switch only.
#[derive(Debug, Clone, PartialEq)]
pub struct DefVector {
    pub device: String,
    pub name: String,
    pub label: Option<String>,
    pub group: Option<String>,
    pub state: State,
    pub perm: Option<Permission>,
    pub rule: Option<SwitchRule>,
    pub timeout: Option<f64>,
    pub timestamp: Option<String>,
    pub message: Option<String>,
    pub elements: DefElements,
}

/// `set*Vector`: current state and values from a device.
#[derive(Debug, Clone, PartialEq)]
pub struct SetVector {
    pub device: String,
    pub name: String,
    pub state: State,
    pub timeout: Option<f64>,
    pub timestamp: Option<String>,
    pub message: Option<String>,
    pub elements: OneElements,
}

/// `new*Vector`: a client asks the device to change values.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVector {
    pub device: String,
    pub name: String,
    pub timestamp: Option<String>,
    pub elements: NewElements,
}

/// Direction a message may legally travel in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    FromDevice,
    FromClient,
    Both,
}

/// Any protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    GetProperties(GetProperties),
    EnableBlob(EnableBlob),
    DelProperty(DelProperty),
    Notice(Notice),
    PingRequest(Ping),
    PingReply(Ping),
    Def(DefVector),
    Set(SetVector),
    New(NewVector),
}

impl Message {
    /// Root element name on the wire.
    pub fn tag_name(&self) -> &'static str {
        match self {
            Message::GetProperties(_) => tags::GET_PROPERTIES,
            Message::EnableBlob(_) => tags::ENABLE_BLOB,
            Message::DelProperty(_) => tags::DEL_PROPERTY,
            Message::Notice(_) => tags::MESSAGE,
            Message::PingRequest(_) => tags::PING_REQUEST,
            Message::PingReply(_) => tags::PING_REPLY,
            Message::Def(def) => tags::def_vector(def.elements.kind()),
            Message::Set(set) => tags::set_vector(set.elements.kind()),
            Message::New(new) => tags::new_vector(new.elements.kind()),
        }
    }

    /// Target device, if the message is addressed.
    pub fn device(&self) -> Option<&str> {
        match self {
            Message::GetProperties(m) => m.device.as_deref(),
            Message::EnableBlob(m) => Some(&m.device),
            Message::DelProperty(m) => Some(&m.device),
            Message::Notice(m) => m.device.as_deref(),
            Message::PingRequest(_) | Message::PingReply(_) => None,
            Message::Def(m) => Some(&m.device),
            Message::Set(m) => Some(&m.device),
            Message::New(m) => Some(&m.device),
        }
    }

    /// Vector name, if the message carries one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Message::GetProperties(m) => m.name.as_deref(),
            Message::EnableBlob(m) => m.name.as_deref(),
            Message::DelProperty(m) => m.name.as_deref(),
            Message::Notice(_) | Message::PingRequest(_) | Message::PingReply(_) => None,
            Message::Def(m) => Some(&m.name),
            Message::Set(m) => Some(&m.name),
            Message::New(m) => Some(&m.name),
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Message::GetProperties(_) => Direction::Both,
            Message::EnableBlob(_) | Message::PingReply(_) | Message::New(_) => {
                Direction::FromClient
            }
            Message::DelProperty(_)
            | Message::Notice(_)
            | Message::PingRequest(_)
            | Message::Def(_)
            | Message::Set(_) => Direction::FromDevice,
        }
    }

    pub fn from_device(&self) -> bool {
        matches!(self.direction(), Direction::FromDevice | Direction::Both)
    }

    pub fn from_client(&self) -> bool {
        matches!(self.direction(), Direction::FromClient | Direction::Both)
    }

    /// True for BLOB-bearing vectors, in either direction.
    pub fn is_blob(&self) -> bool {
        match self {
            Message::Set(m) => m.elements.kind() == PropertyKind::Blob,
            Message::New(m) => m.elements.kind() == PropertyKind::Blob,
            _ => false,
        }
    }

    /// Property kind of a vector message.
    pub fn kind(&self) -> Option<PropertyKind> {
        match self {
            Message::Def(m) => Some(m.elements.kind()),
            Message::Set(m) => Some(m.elements.kind()),
            Message::New(m) => Some(m.elements.kind()),
            _ => None,
        }
    }
}

/// Current UTC time in the protocol's `YYYY-MM-DDTHH:MM:SS` form.
pub fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn switch_set() -> Message {
        Message::Set(SetVector {
            device: "CAMERA".into(),
            name: "CONNECTION".into(),
            state: State::Ok,
            timeout: None,
            timestamp: None,
            message: None,
            elements: OneElements::Switch(vec![OneSwitch {
                name: "CONNECT".into(),
                value: SwitchState::On,
            }]),
        })
    }

    #[test]
    fn accessors() {
        let msg = switch_set();
        assert_eq!(msg.tag_name(), "setSwitchVector");
        assert_eq!(msg.device(), Some("CAMERA"));
        assert_eq!(msg.name(), Some("CONNECTION"));
        assert_eq!(msg.kind(), Some(PropertyKind::Switch));
        assert!(msg.from_device());
        assert!(!msg.from_client());
        assert!(!msg.is_blob());
    }

    #[test]
    fn get_properties_travels_both_ways() {
        let msg = Message::GetProperties(GetProperties::all());
        assert!(msg.from_device());
        assert!(msg.from_client());
        assert_eq!(msg.device(), None);
    }

    #[test]
    fn new_blob_vector_is_blob() {
        let msg = Message::New(NewVector {
            device: "CAMERA".into(),
            name: "UPLOAD".into(),
            timestamp: None,
            elements: NewElements::Blob(vec![OneBlob {
                name: "FILE".into(),
                blob: Blob::new(".txt", &b"abc"[..]),
            }]),
        });
        assert!(msg.is_blob());
        assert!(msg.from_client());
        assert_eq!(msg.tag_name(), "newBLOBVector");
    }

    #[test]
    fn timestamp_shape() {
        let ts = now();
        assert_eq!(ts.len(), 19);
        assert_eq!(&ts[10..11], "T");
    }
}
