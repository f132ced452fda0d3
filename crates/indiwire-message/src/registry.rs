//! Tag-to-decoder registry.
//!
//! Root tags and child part tags are registered explicitly, once, into a
//! process-wide table. Lookup is by the exact tag name.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::blob::Blob;
use crate::error::{CodecError, Result};
use crate::message::{
    DefBlob, DefElements, DefLight, DefNumber, DefSwitch, DefText, DefVector, DelProperty,
    EnableBlob, GetProperties, Message, NewElements, NewVector, Notice, OneBlob, OneElements,
    OneLight, OneNumber, OneSwitch, OneText, Ping, SetVector,
};
use crate::number;
use crate::tags;
use crate::types::{PropertyKind, PROTOCOL_VERSION};
use crate::xml::XmlNode;

type MessageDecoder = fn(&XmlNode) -> Result<Message>;
type PartDecoder = fn(&XmlNode) -> Result<Part>;

/// A decoded child element of a vector message.
#[derive(Debug)]
pub(crate) enum Part {
    DefNumber(DefNumber),
    DefText(DefText),
    DefSwitch(DefSwitch),
    DefLight(DefLight),
    DefBlob(DefBlob),
    OneNumber(OneNumber),
    OneText(OneText),
    OneSwitch(OneSwitch),
    OneLight(OneLight),
    OneBlob(OneBlob),
}

/// Registry of root message decoders and child part decoders.
pub struct TagRegistry {
    messages: HashMap<&'static str, MessageDecoder>,
    parts: HashMap<&'static str, PartDecoder>,
}

static REGISTRY: OnceLock<TagRegistry> = OnceLock::new();

/// The process-wide registry.
pub fn registry() -> &'static TagRegistry {
    REGISTRY.get_or_init(TagRegistry::builtin)
}

impl TagRegistry {
    fn builtin() -> Self {
        let mut messages: HashMap<&'static str, MessageDecoder> = HashMap::new();
        messages.insert(tags::GET_PROPERTIES, decode_get_properties);
        messages.insert(tags::ENABLE_BLOB, decode_enable_blob);
        messages.insert(tags::DEL_PROPERTY, decode_del_property);
        messages.insert(tags::MESSAGE, decode_notice);
        messages.insert(tags::PING_REQUEST, |node| {
            decode_ping(node).map(Message::PingRequest)
        });
        messages.insert(tags::PING_REPLY, |node| {
            decode_ping(node).map(Message::PingReply)
        });

        messages.insert(tags::def_vector(PropertyKind::Number), |n| {
            decode_def_vector(n, PropertyKind::Number)
        });
        messages.insert(tags::def_vector(PropertyKind::Text), |n| {
            decode_def_vector(n, PropertyKind::Text)
        });
        messages.insert(tags::def_vector(PropertyKind::Switch), |n| {
            decode_def_vector(n, PropertyKind::Switch)
        });
        messages.insert(tags::def_vector(PropertyKind::Light), |n| {
            decode_def_vector(n, PropertyKind::Light)
        });
        messages.insert(tags::def_vector(PropertyKind::Blob), |n| {
            decode_def_vector(n, PropertyKind::Blob)
        });

        messages.insert(tags::set_vector(PropertyKind::Number), |n| {
            decode_set_vector(n, PropertyKind::Number)
        });
        messages.insert(tags::set_vector(PropertyKind::Text), |n| {
            decode_set_vector(n, PropertyKind::Text)
        });
        messages.insert(tags::set_vector(PropertyKind::Switch), |n| {
            decode_set_vector(n, PropertyKind::Switch)
        });
        messages.insert(tags::set_vector(PropertyKind::Light), |n| {
            decode_set_vector(n, PropertyKind::Light)
        });
        messages.insert(tags::set_vector(PropertyKind::Blob), |n| {
            decode_set_vector(n, PropertyKind::Blob)
        });

        messages.insert(tags::new_vector(PropertyKind::Number), |n| {
            decode_new_vector(n, PropertyKind::Number)
        });
        messages.insert(tags::new_vector(PropertyKind::Text), |n| {
            decode_new_vector(n, PropertyKind::Text)
        });
        messages.insert(tags::new_vector(PropertyKind::Switch), |n| {
            decode_new_vector(n, PropertyKind::Switch)
        });
        messages.insert(tags::new_vector(PropertyKind::Blob), |n| {
            decode_new_vector(n, PropertyKind::Blob)
        });

        let mut parts: HashMap<&'static str, PartDecoder> = HashMap::new();
        parts.insert(tags::def_element(PropertyKind::Number), decode_def_number);
        parts.insert(tags::def_element(PropertyKind::Text), |n| {
            Ok(Part::DefText(DefText {
                name: n.required("name")?.to_string(),
                label: n.opt_string("label"),
                value: n.text.clone(),
            }))
        });
        parts.insert(tags::def_element(PropertyKind::Switch), |n| {
            Ok(Part::DefSwitch(DefSwitch {
                name: n.required("name")?.to_string(),
                label: n.opt_string("label"),
                value: n.text_enum()?,
            }))
        });
        parts.insert(tags::def_element(PropertyKind::Light), |n| {
            Ok(Part::DefLight(DefLight {
                name: n.required("name")?.to_string(),
                label: n.opt_string("label"),
                value: n.text_enum()?,
            }))
        });
        parts.insert(tags::def_element(PropertyKind::Blob), |n| {
            Ok(Part::DefBlob(DefBlob {
                name: n.required("name")?.to_string(),
                label: n.opt_string("label"),
            }))
        });
        parts.insert(tags::one_element(PropertyKind::Number), |n| {
            Ok(Part::OneNumber(OneNumber {
                name: n.required("name")?.to_string(),
                value: number_text(n)?,
            }))
        });
        parts.insert(tags::one_element(PropertyKind::Text), |n| {
            Ok(Part::OneText(OneText {
                name: n.required("name")?.to_string(),
                value: n.text.clone(),
            }))
        });
        parts.insert(tags::one_element(PropertyKind::Switch), |n| {
            Ok(Part::OneSwitch(OneSwitch {
                name: n.required("name")?.to_string(),
                value: n.text_enum()?,
            }))
        });
        parts.insert(tags::one_element(PropertyKind::Light), |n| {
            Ok(Part::OneLight(OneLight {
                name: n.required("name")?.to_string(),
                value: n.text_enum()?,
            }))
        });
        parts.insert(tags::one_element(PropertyKind::Blob), decode_one_blob);

        Self { messages, parts }
    }

    /// True if `tag` has a registered root decoder.
    pub fn is_message_tag(&self, tag: &str) -> bool {
        self.messages.contains_key(tag)
    }

    /// Registered root tags, unordered.
    pub fn message_tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.messages.keys().copied()
    }

    pub(crate) fn decode_message(&self, node: &XmlNode) -> Result<Message> {
        let decode = self
            .messages
            .get(node.name.as_str())
            .ok_or_else(|| CodecError::UnknownTag(node.name.clone()))?;
        decode(node)
    }

    fn decode_part(&self, parent: &XmlNode, node: &XmlNode) -> Result<Part> {
        let decode = self
            .parts
            .get(node.name.as_str())
            .ok_or_else(|| CodecError::UnknownChild {
                parent: parent.name.clone(),
                child: node.name.clone(),
            })?;
        decode(node)
    }

    fn decode_parts(&self, node: &XmlNode) -> Result<Vec<Part>> {
        node.children
            .iter()
            .map(|child| self.decode_part(node, child))
            .collect()
    }
}

fn decode_get_properties(node: &XmlNode) -> Result<Message> {
    Ok(Message::GetProperties(GetProperties {
        version: node
            .attr("version")
            .unwrap_or(PROTOCOL_VERSION)
            .to_string(),
        device: node.opt_string("device"),
        name: node.opt_string("name"),
    }))
}

fn decode_enable_blob(node: &XmlNode) -> Result<Message> {
    Ok(Message::EnableBlob(EnableBlob {
        device: node.required("device")?.to_string(),
        name: node.opt_string("name"),
        value: node.text_enum()?,
    }))
}

fn decode_del_property(node: &XmlNode) -> Result<Message> {
    Ok(Message::DelProperty(DelProperty {
        device: node.required("device")?.to_string(),
        name: node.opt_string("name"),
        timestamp: node.opt_string("timestamp"),
        message: node.opt_string("message"),
    }))
}

fn decode_notice(node: &XmlNode) -> Result<Message> {
    Ok(Message::Notice(Notice {
        device: node.opt_string("device"),
        timestamp: node.opt_string("timestamp"),
        message: node.opt_string("message"),
    }))
}

fn decode_ping(node: &XmlNode) -> Result<Ping> {
    Ok(Ping {
        uid: node.required("uid")?.to_string(),
    })
}

fn number_text(node: &XmlNode) -> Result<String> {
    if number::parse_any(&node.text).is_none() {
        return Err(node.invalid("value", &node.text));
    }
    Ok(node.text.clone())
}

fn decode_def_number(node: &XmlNode) -> Result<Part> {
    Ok(Part::DefNumber(DefNumber {
        name: node.required("name")?.to_string(),
        label: node.opt_string("label"),
        format: node.required("format")?.to_string(),
        min: node.required_f64("min")?,
        max: node.required_f64("max")?,
        step: node.required_f64("step")?,
        value: number_text(node)?,
    }))
}

fn decode_one_blob(node: &XmlNode) -> Result<Part> {
    let name = node.required("name")?;
    let format = node.required("format")?;
    let raw_size = node.required("size")?;
    let size = raw_size
        .trim()
        .parse::<usize>()
        .map_err(|_| node.invalid("size", raw_size))?;
    Ok(Part::OneBlob(OneBlob {
        name: name.to_string(),
        blob: Blob::from_base64(name, format, size, &node.text)?,
    }))
}

fn mismatch(parent: &XmlNode, expected: PropertyKind, found: &Part) -> CodecError {
    let child = match found {
        Part::DefNumber(_) => tags::def_element(PropertyKind::Number),
        Part::DefText(_) => tags::def_element(PropertyKind::Text),
        Part::DefSwitch(_) => tags::def_element(PropertyKind::Switch),
        Part::DefLight(_) => tags::def_element(PropertyKind::Light),
        Part::DefBlob(_) => tags::def_element(PropertyKind::Blob),
        Part::OneNumber(_) => tags::one_element(PropertyKind::Number),
        Part::OneText(_) => tags::one_element(PropertyKind::Text),
        Part::OneSwitch(_) => tags::one_element(PropertyKind::Switch),
        Part::OneLight(_) => tags::one_element(PropertyKind::Light),
        Part::OneBlob(_) => tags::one_element(PropertyKind::Blob),
    };
    tracing::trace!(parent = %parent.name, %expected, child, "child kind mismatch");
    CodecError::ChildTypeMismatch {
        parent: parent.name.clone(),
        child: child.to_string(),
    }
}

macro_rules! collect_parts {
    ($node:expr, $parts:expr, $kind:expr, $variant:ident) => {
        $parts
            .into_iter()
            .map(|part| match part {
                Part::$variant(item) => Ok(item),
                other => Err(mismatch($node, $kind, &other)),
            })
            .collect::<Result<Vec<_>>>()?
    };
}

fn decode_def_vector(node: &XmlNode, kind: PropertyKind) -> Result<Message> {
    let parts = registry().decode_parts(node)?;
    let elements = match kind {
        PropertyKind::Number => DefElements::Number(collect_parts!(node, parts, kind, DefNumber)),
        PropertyKind::Text => DefElements::Text(collect_parts!(node, parts, kind, DefText)),
        PropertyKind::Switch => DefElements::Switch(collect_parts!(node, parts, kind, DefSwitch)),
        PropertyKind::Light => DefElements::Light(collect_parts!(node, parts, kind, DefLight)),
        PropertyKind::Blob => DefElements::Blob(collect_parts!(node, parts, kind, DefBlob)),
    };

    let perm = match kind {
        PropertyKind::Light => None,
        _ => Some(node.required_enum("perm")?),
    };
    let rule = match kind {
        PropertyKind::Switch => Some(node.required_enum("rule")?),
        _ => None,
    };
    let timeout = match kind {
        PropertyKind::Light => None,
        _ => node.optional_f64("timeout")?,
    };

    Ok(Message::Def(DefVector {
        device: node.required("device")?.to_string(),
        name: node.required("name")?.to_string(),
        label: node.opt_string("label"),
        group: node.opt_string("group"),
        state: node.required_enum("state")?,
        perm,
        rule,
        timeout,
        timestamp: node.opt_string("timestamp"),
        message: node.opt_string("message"),
        elements,
    }))
}

fn decode_set_vector(node: &XmlNode, kind: PropertyKind) -> Result<Message> {
    let parts = registry().decode_parts(node)?;
    let elements = match kind {
        PropertyKind::Number => OneElements::Number(collect_parts!(node, parts, kind, OneNumber)),
        PropertyKind::Text => OneElements::Text(collect_parts!(node, parts, kind, OneText)),
        PropertyKind::Switch => OneElements::Switch(collect_parts!(node, parts, kind, OneSwitch)),
        PropertyKind::Light => OneElements::Light(collect_parts!(node, parts, kind, OneLight)),
        PropertyKind::Blob => OneElements::Blob(collect_parts!(node, parts, kind, OneBlob)),
    };

    Ok(Message::Set(SetVector {
        device: node.required("device")?.to_string(),
        name: node.required("name")?.to_string(),
        state: node
            .optional_enum("state")?
            .unwrap_or_default(),
        timeout: node.optional_f64("timeout")?,
        timestamp: node.opt_string("timestamp"),
        message: node.opt_string("message"),
        elements,
    }))
}

fn decode_new_vector(node: &XmlNode, kind: PropertyKind) -> Result<Message> {
    let parts = registry().decode_parts(node)?;
    let elements = match kind {
        PropertyKind::Number => NewElements::Number(collect_parts!(node, parts, kind, OneNumber)),
        PropertyKind::Text => NewElements::Text(collect_parts!(node, parts, kind, OneText)),
        PropertyKind::Switch => NewElements::Switch(collect_parts!(node, parts, kind, OneSwitch)),
        PropertyKind::Blob => NewElements::Blob(collect_parts!(node, parts, kind, OneBlob)),
        PropertyKind::Light => {
            return Err(CodecError::UnknownTag(node.name.clone()));
        }
    };

    Ok(Message::New(NewVector {
        device: node.required("device")?.to_string(),
        name: node.required("name")?.to_string(),
        timestamp: node.opt_string("timestamp"),
        elements,
    }))
}
