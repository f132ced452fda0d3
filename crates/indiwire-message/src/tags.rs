//! Root and child tag names.

use crate::types::PropertyKind;

pub const GET_PROPERTIES: &str = "getProperties";
pub const ENABLE_BLOB: &str = "enableBLOB";
pub const DEL_PROPERTY: &str = "delProperty";
pub const MESSAGE: &str = "message";
pub const PING_REQUEST: &str = "pingRequest";
pub const PING_REPLY: &str = "pingReply";

/// Every root tag the decoder recognises as the start of a message.
pub const MESSAGE_TAGS: &[&str] = &[
    GET_PROPERTIES,
    ENABLE_BLOB,
    DEL_PROPERTY,
    MESSAGE,
    PING_REQUEST,
    PING_REPLY,
    "defNumberVector",
    "defTextVector",
    "defSwitchVector",
    "defLightVector",
    "defBLOBVector",
    "setNumberVector",
    "setTextVector",
    "setSwitchVector",
    "setLightVector",
    "setBLOBVector",
    "newNumberVector",
    "newTextVector",
    "newSwitchVector",
    "newBLOBVector",
];

pub fn def_vector(kind: PropertyKind) -> &'static str {
    match kind {
        PropertyKind::Number => "defNumberVector",
        PropertyKind::Text => "defTextVector",
        PropertyKind::Switch => "defSwitchVector",
        PropertyKind::Light => "defLightVector",
        PropertyKind::Blob => "defBLOBVector",
    }
}

pub fn set_vector(kind: PropertyKind) -> &'static str {
    match kind {
        PropertyKind::Number => "setNumberVector",
        PropertyKind::Text => "setTextVector",
        PropertyKind::Switch => "setSwitchVector",
        PropertyKind::Light => "setLightVector",
        PropertyKind::Blob => "setBLOBVector",
    }
}

/// `new*Vector` tag. Light has no client-side write message; the set tag is
/// returned so callers never get an empty name.
pub fn new_vector(kind: PropertyKind) -> &'static str {
    match kind {
        PropertyKind::Number => "newNumberVector",
        PropertyKind::Text => "newTextVector",
        PropertyKind::Switch => "newSwitchVector",
        PropertyKind::Light => "setLightVector",
        PropertyKind::Blob => "newBLOBVector",
    }
}

pub fn def_element(kind: PropertyKind) -> &'static str {
    match kind {
        PropertyKind::Number => "defNumber",
        PropertyKind::Text => "defText",
        PropertyKind::Switch => "defSwitch",
        PropertyKind::Light => "defLight",
        PropertyKind::Blob => "defBLOB",
    }
}

pub fn one_element(kind: PropertyKind) -> &'static str {
    match kind {
        PropertyKind::Number => "oneNumber",
        PropertyKind::Text => "oneText",
        PropertyKind::Switch => "oneSwitch",
        PropertyKind::Light => "oneLight",
        PropertyKind::Blob => "oneBLOB",
    }
}

/// Returns true if `tag` names a top-level message.
pub fn is_message_tag(tag: &str) -> bool {
    MESSAGE_TAGS.contains(&tag)
}

/// If `src` begins with a message tag name followed by a delimiter, return
/// that tag. Used to spot message starts inside a raw byte stream.
pub fn message_tag_at(src: &[u8]) -> Option<&'static str> {
    MESSAGE_TAGS.iter().copied().find(|tag| {
        let tag = tag.as_bytes();
        src.len() > tag.len()
            && src.starts_with(tag)
            && matches!(src[tag.len()], b' ' | b'\t' | b'\r' | b'\n' | b'/' | b'>')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_tags_are_unique() {
        let mut tags = MESSAGE_TAGS.to_vec();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), MESSAGE_TAGS.len());
    }

    #[test]
    fn tag_lookup_requires_delimiter() {
        assert_eq!(message_tag_at(b"message device=\"X\"/>"), Some("message"));
        assert_eq!(message_tag_at(b"messages/>"), None);
        assert_eq!(message_tag_at(b"getProperties"), None);
        assert_eq!(message_tag_at(b"getProperties/"), Some(GET_PROPERTIES));
    }

    #[test]
    fn kind_tags() {
        assert_eq!(def_vector(PropertyKind::Blob), "defBLOBVector");
        assert_eq!(one_element(PropertyKind::Light), "oneLight");
        assert!(is_message_tag(set_vector(PropertyKind::Number)));
        assert!(!is_message_tag(def_element(PropertyKind::Number)));
    }
}
