use std::fmt;

use indiwire_message::{Blob, PropertyKind, State, SwitchState};

/// Typed value held by an element.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Switch(SwitchState),
    Light(State),
    /// `None` until a payload has been produced.
    Blob(Option<Blob>),
}

impl Value {
    /// Default value for a freshly defined element of `kind`.
    pub fn default_for(kind: PropertyKind) -> Self {
        match kind {
            PropertyKind::Number => Value::Number(0.0),
            PropertyKind::Text => Value::Text(String::new()),
            PropertyKind::Switch => Value::Switch(SwitchState::Off),
            PropertyKind::Light => Value::Light(State::Ok),
            PropertyKind::Blob => Value::Blob(None),
        }
    }

    pub fn kind(&self) -> PropertyKind {
        match self {
            Value::Number(_) => PropertyKind::Number,
            Value::Text(_) => PropertyKind::Text,
            Value::Switch(_) => PropertyKind::Switch,
            Value::Light(_) => PropertyKind::Light,
            Value::Blob(_) => PropertyKind::Blob,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_switch(&self) -> Option<SwitchState> {
        match self {
            Value::Switch(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_light(&self) -> Option<State> {
        match self {
            Value::Light(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Value::Blob(b) => b.as_ref(),
            _ => None,
        }
    }

    /// True for a switch that is `On`.
    pub fn is_on(&self) -> bool {
        self.as_switch() == Some(SwitchState::On)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(t) => f.write_str(t),
            Value::Switch(s) => f.write_str(s.as_str()),
            Value::Light(s) => f.write_str(s.as_str()),
            Value::Blob(Some(b)) => write!(f, "<{} bytes {}>", b.size(), b.format),
            Value::Blob(None) => f.write_str("<empty>"),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(t: &str) -> Self {
        Value::Text(t.to_string())
    }
}

impl From<String> for Value {
    fn from(t: String) -> Self {
        Value::Text(t)
    }
}

impl From<SwitchState> for Value {
    fn from(s: SwitchState) -> Self {
        Value::Switch(s)
    }
}

impl From<State> for Value {
    fn from(s: State) -> Self {
        Value::Light(s)
    }
}

impl From<Blob> for Value {
    fn from(b: Blob) -> Self {
        Value::Blob(Some(b))
    }
}
