//! Declarative driver layout.
//!
//! A [`DriverDef`] describes groups, vectors and elements with their static
//! attributes and default values. [`DriverDef::build`] turns it into a live
//! [`Driver`](crate::Driver).

use std::collections::HashSet;

use indiwire_message::{MessageSink, Permission, PropertyKind, State, SwitchRule, SwitchState};

use crate::driver::Driver;
use crate::error::{PropertyError, Result};
use crate::value::Value;

/// Static attributes of a number element.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberSpec {
    pub format: String,
    pub min: f64,
    /// Defaults to `min` when unset.
    pub max: Option<f64>,
    pub step: f64,
}

impl Default for NumberSpec {
    fn default() -> Self {
        Self {
            format: "%f".to_string(),
            min: 0.0,
            max: None,
            step: 0.0,
        }
    }
}

impl NumberSpec {
    pub fn max(&self) -> f64 {
        self.max.unwrap_or(self.min)
    }
}

#[derive(Debug, Clone)]
pub struct ElementDef {
    pub name: String,
    pub label: Option<String>,
    pub kind: PropertyKind,
    pub default: Value,
    pub enabled: bool,
    pub number: NumberSpec,
}

impl ElementDef {
    fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            label: None,
            kind,
            default: Value::default_for(kind),
            enabled: true,
            number: NumberSpec::default(),
        }
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Number)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Text)
    }

    pub fn switch(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Switch)
    }

    pub fn light(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Light)
    }

    pub fn blob(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Blob)
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    /// printf-style or sexagesimal format of a number element.
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.number.format = format.into();
        self
    }

    pub fn range(mut self, min: f64, max: f64, step: f64) -> Self {
        self.number.min = min;
        self.number.max = Some(max);
        self.number.step = step;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.default.kind() != self.kind {
            return Err(PropertyError::KindMismatch {
                element: self.name.clone(),
                expected: self.kind,
                found: self.default.kind(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct VectorDef {
    pub name: String,
    pub label: Option<String>,
    pub kind: PropertyKind,
    pub state: State,
    pub perm: Permission,
    pub rule: SwitchRule,
    pub timeout: f64,
    pub enabled: bool,
    pub elements: Vec<ElementDef>,
}

impl VectorDef {
    fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            label: None,
            kind,
            state: State::Ok,
            perm: if kind == PropertyKind::Light {
                Permission::ReadOnly
            } else {
                Permission::ReadWrite
            },
            rule: SwitchRule::OneOfMany,
            timeout: 0.0,
            enabled: true,
            elements: Vec::new(),
        }
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Number)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Text)
    }

    pub fn switch(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Switch)
    }

    pub fn light(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Light)
    }

    pub fn blob(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Blob)
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    pub fn perm(mut self, perm: Permission) -> Self {
        self.perm = perm;
        self
    }

    pub fn rule(mut self, rule: SwitchRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn timeout(mut self, timeout: f64) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn element(mut self, element: ElementDef) -> Self {
        self.elements.push(element);
        self
    }

    /// Switch the named elements `On` by default and every other one `Off`.
    pub fn default_on(mut self, names: &[&str]) -> Self {
        for element in &mut self.elements {
            if element.kind == PropertyKind::Switch {
                element.default = Value::Switch(names.contains(&element.name.as_str()).into());
            }
        }
        self
    }

    fn validate(&self) -> Result<()> {
        if self.elements.is_empty() {
            return Err(PropertyError::EmptyVector(self.name.clone()));
        }
        let mut seen = HashSet::new();
        for element in &self.elements {
            if element.kind != self.kind {
                return Err(PropertyError::KindMismatch {
                    element: element.name.clone(),
                    expected: self.kind,
                    found: element.kind,
                });
            }
            element.validate()?;
            if !seen.insert(element.name.as_str()) {
                return Err(PropertyError::DuplicateName {
                    what: "element",
                    name: element.name.clone(),
                });
            }
        }
        if self.kind == PropertyKind::Switch && self.rule == SwitchRule::OneOfMany {
            let on = self
                .elements
                .iter()
                .filter(|e| e.default == Value::Switch(SwitchState::On))
                .count();
            if on > 1 {
                tracing::warn!(vector = %self.name, on, "OneOfMany vector defaults to several On switches");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GroupDef {
    pub name: String,
    pub enabled: bool,
    pub vectors: Vec<VectorDef>,
}

impl GroupDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            vectors: Vec::new(),
        }
    }

    pub fn vector(mut self, vector: VectorDef) -> Self {
        self.vectors.push(vector);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct DriverDef {
    pub name: String,
    pub groups: Vec<GroupDef>,
}

impl DriverDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
        }
    }

    pub fn group(mut self, group: GroupDef) -> Self {
        self.groups.push(group);
        self
    }

    /// Check names and kinds. Vector names are unique across the whole
    /// device because clients address vectors by name only.
    pub fn validate(&self) -> Result<()> {
        let mut groups = HashSet::new();
        let mut vectors = HashSet::new();
        for group in &self.groups {
            if !groups.insert(group.name.as_str()) {
                return Err(PropertyError::DuplicateName {
                    what: "group",
                    name: group.name.clone(),
                });
            }
            for vector in &group.vectors {
                vector.validate()?;
                if !vectors.insert(vector.name.as_str()) {
                    return Err(PropertyError::DuplicateName {
                        what: "vector",
                        name: vector.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Instantiate the driver. Outgoing messages go to `sink`.
    pub fn build(self, sink: MessageSink) -> Result<Driver> {
        Driver::new(self, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_on_sets_switches() {
        let def = VectorDef::switch("CONNECTION")
            .element(ElementDef::switch("CONNECT"))
            .element(ElementDef::switch("DISCONNECT"))
            .default_on(&["DISCONNECT"]);
        assert_eq!(def.elements[0].default, Value::Switch(SwitchState::Off));
        assert_eq!(def.elements[1].default, Value::Switch(SwitchState::On));
    }

    #[test]
    fn light_vectors_are_read_only() {
        assert_eq!(VectorDef::light("STATUS").perm, Permission::ReadOnly);
        assert_eq!(VectorDef::text("INFO").perm, Permission::ReadWrite);
    }

    #[test]
    fn number_max_defaults_to_min() {
        let el = ElementDef::number("X");
        assert_eq!(el.number.max(), 0.0);
        let el = ElementDef::number("X").range(-5.0, 5.0, 0.5);
        assert_eq!(el.number.max(), 5.0);
    }

    #[test]
    fn validation_rejects_bad_layouts() {
        let mixed = DriverDef::new("Dev").group(
            GroupDef::new("Main").vector(
                VectorDef::text("T")
                    .element(ElementDef::text("A"))
                    .element(ElementDef::number("B")),
            ),
        );
        assert!(matches!(
            mixed.validate(),
            Err(PropertyError::KindMismatch { .. })
        ));

        let empty =
            DriverDef::new("Dev").group(GroupDef::new("Main").vector(VectorDef::text("T")));
        assert!(matches!(empty.validate(), Err(PropertyError::EmptyVector(_))));

        let duplicate = DriverDef::new("Dev")
            .group(GroupDef::new("A").vector(VectorDef::text("T").element(ElementDef::text("X"))))
            .group(GroupDef::new("B").vector(VectorDef::text("T").element(ElementDef::text("Y"))));
        assert!(matches!(
            duplicate.validate(),
            Err(PropertyError::DuplicateName { what: "vector", .. })
        ));

        let bad_default = DriverDef::new("Dev").group(GroupDef::new("Main").vector(
            VectorDef::number("N").element(ElementDef::number("X").default_value("text")),
        ));
        assert!(matches!(
            bad_default.validate(),
            Err(PropertyError::KindMismatch { .. })
        ));
    }
}
