//! Message encoding and single-fragment decoding.
//!
//! Encoded form:
//! ```text
//! <?xml version="1.0"?>
//! <setNumberVector device="Telescope" name="EQ" state="Ok">...</setNumberVector>
//! ```
//! Attributes are emitted sorted by name, element values become text nodes
//! and every message is terminated by a newline.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Result;
use crate::message::{
    DefElements, DefVector, Message, NewElements, OneBlob, OneElements, OneLight, OneNumber,
    OneSwitch, OneText,
};
use crate::number;
use crate::registry::registry;
use crate::tags;
use crate::types::PropertyKind;
use crate::xml::{parse_fragment, ElementWriter};

/// Declaration written before every encoded message.
pub const XML_DECLARATION: &str = "<?xml version=\"1.0\"?>\n";

/// Encode a message into its canonical wire form.
pub fn encode_message(msg: &Message, dst: &mut BytesMut) {
    dst.put_slice(XML_DECLARATION.as_bytes());
    match msg {
        Message::GetProperties(m) => {
            let mut el = ElementWriter::start(dst, tags::GET_PROPERTIES);
            el.opt_attr("device", m.device.as_deref())
                .opt_attr("name", m.name.as_deref())
                .attr("version", &m.version);
            el.empty();
        }
        Message::EnableBlob(m) => {
            let mut el = ElementWriter::start(dst, tags::ENABLE_BLOB);
            el.attr("device", &m.device)
                .opt_attr("name", m.name.as_deref());
            el.text(m.value.as_str());
        }
        Message::DelProperty(m) => {
            let mut el = ElementWriter::start(dst, tags::DEL_PROPERTY);
            el.attr("device", &m.device)
                .opt_attr("message", m.message.as_deref())
                .opt_attr("name", m.name.as_deref())
                .opt_attr("timestamp", m.timestamp.as_deref());
            el.empty();
        }
        Message::Notice(m) => {
            let mut el = ElementWriter::start(dst, tags::MESSAGE);
            el.opt_attr("device", m.device.as_deref())
                .opt_attr("message", m.message.as_deref())
                .opt_attr("timestamp", m.timestamp.as_deref());
            el.empty();
        }
        Message::PingRequest(m) => {
            let mut el = ElementWriter::start(dst, tags::PING_REQUEST);
            el.attr("uid", &m.uid);
            el.empty();
        }
        Message::PingReply(m) => {
            let mut el = ElementWriter::start(dst, tags::PING_REPLY);
            el.attr("uid", &m.uid);
            el.empty();
        }
        Message::Def(m) => encode_def_vector(m, dst),
        Message::Set(m) => {
            let timeout = m.timeout.map(fmt_f64);
            let mut el = ElementWriter::start(dst, tags::set_vector(m.elements.kind()));
            el.attr("device", &m.device)
                .opt_attr("message", m.message.as_deref())
                .attr("name", &m.name)
                .attr("state", m.state.as_str())
                .opt_attr("timeout", timeout.as_deref())
                .opt_attr("timestamp", m.timestamp.as_deref());
            el.children(|dst| encode_one_elements(&m.elements, dst));
        }
        Message::New(m) => {
            let mut el = ElementWriter::start(dst, tags::new_vector(m.elements.kind()));
            el.attr("device", &m.device)
                .attr("name", &m.name)
                .opt_attr("timestamp", m.timestamp.as_deref());
            el.children(|dst| match &m.elements {
                NewElements::Number(items) => items.iter().for_each(|i| one_number(i, dst)),
                NewElements::Text(items) => items.iter().for_each(|i| one_text(i, dst)),
                NewElements::Switch(items) => items.iter().for_each(|i| one_switch(i, dst)),
                NewElements::Blob(items) => items.iter().for_each(|i| one_blob(i, dst)),
            });
        }
    }
    dst.put_u8(b'\n');
}

/// Encode into a fresh buffer.
pub fn to_bytes(msg: &Message) -> Bytes {
    let mut dst = BytesMut::new();
    encode_message(msg, &mut dst);
    dst.freeze()
}

/// Decode one complete, well-formed fragment.
///
/// The fragment may be preceded by an XML declaration.
pub fn decode_message(src: &[u8]) -> Result<Message> {
    let node = parse_fragment(src)?;
    registry().decode_message(&node)
}

fn fmt_f64(value: f64) -> String {
    value.to_string()
}

fn encode_def_vector(m: &DefVector, dst: &mut BytesMut) {
    let kind = m.elements.kind();
    let timeout = m.timeout.map(fmt_f64);
    let perm = m.perm.map(|p| p.as_str());
    let rule = m.rule.map(|r| r.as_str());
    let mut el = ElementWriter::start(dst, tags::def_vector(kind));
    el.attr("device", &m.device)
        .opt_attr("group", m.group.as_deref())
        .opt_attr("label", m.label.as_deref())
        .opt_attr("message", m.message.as_deref())
        .attr("name", &m.name);
    if kind != PropertyKind::Light {
        el.opt_attr("perm", perm);
    }
    if kind == PropertyKind::Switch {
        el.opt_attr("rule", rule);
    }
    el.attr("state", m.state.as_str());
    if kind != PropertyKind::Light {
        el.opt_attr("timeout", timeout.as_deref());
    }
    el.opt_attr("timestamp", m.timestamp.as_deref());

    el.children(|dst| match &m.elements {
        DefElements::Number(items) => {
            for item in items {
                let mut part = ElementWriter::start(dst, tags::def_element(kind));
                part.attr("format", &item.format)
                    .opt_attr("label", item.label.as_deref())
                    .attr("max", &fmt_f64(item.max))
                    .attr("min", &fmt_f64(item.min))
                    .attr("name", &item.name)
                    .attr("step", &fmt_f64(item.step));
                part.text(&item.value);
            }
        }
        DefElements::Text(items) => {
            for item in items {
                let mut part = ElementWriter::start(dst, tags::def_element(kind));
                part.opt_attr("label", item.label.as_deref())
                    .attr("name", &item.name);
                part.text(&item.value);
            }
        }
        DefElements::Switch(items) => {
            for item in items {
                let mut part = ElementWriter::start(dst, tags::def_element(kind));
                part.opt_attr("label", item.label.as_deref())
                    .attr("name", &item.name);
                part.text(item.value.as_str());
            }
        }
        DefElements::Light(items) => {
            for item in items {
                let mut part = ElementWriter::start(dst, tags::def_element(kind));
                part.opt_attr("label", item.label.as_deref())
                    .attr("name", &item.name);
                part.text(item.value.as_str());
            }
        }
        DefElements::Blob(items) => {
            for item in items {
                let mut part = ElementWriter::start(dst, tags::def_element(kind));
                part.opt_attr("label", item.label.as_deref())
                    .attr("name", &item.name);
                part.empty();
            }
        }
    });
}

fn encode_one_elements(elements: &OneElements, dst: &mut BytesMut) {
    match elements {
        OneElements::Number(items) => items.iter().for_each(|i| one_number(i, dst)),
        OneElements::Text(items) => items.iter().for_each(|i| one_text(i, dst)),
        OneElements::Switch(items) => items.iter().for_each(|i| one_switch(i, dst)),
        OneElements::Light(items) => items.iter().for_each(|i| one_light(i, dst)),
        OneElements::Blob(items) => items.iter().for_each(|i| one_blob(i, dst)),
    }
}

fn one_number(item: &OneNumber, dst: &mut BytesMut) {
    let mut el = ElementWriter::start(dst, tags::one_element(PropertyKind::Number));
    el.attr("name", &item.name);
    el.text(&item.value);
}

fn one_text(item: &OneText, dst: &mut BytesMut) {
    let mut el = ElementWriter::start(dst, tags::one_element(PropertyKind::Text));
    el.attr("name", &item.name);
    el.text(&item.value);
}

fn one_switch(item: &OneSwitch, dst: &mut BytesMut) {
    let mut el = ElementWriter::start(dst, tags::one_element(PropertyKind::Switch));
    el.attr("name", &item.name);
    el.text(item.value.as_str());
}

fn one_light(item: &OneLight, dst: &mut BytesMut) {
    let mut el = ElementWriter::start(dst, tags::one_element(PropertyKind::Light));
    el.attr("name", &item.name);
    el.text(item.value.as_str());
}

fn one_blob(item: &OneBlob, dst: &mut BytesMut) {
    let size = item.blob.size().to_string();
    let mut el = ElementWriter::start(dst, tags::one_element(PropertyKind::Blob));
    el.attr("format", &item.blob.format)
        .attr("name", &item.name)
        .attr("size", &size);
    el.text(&item.blob.to_base64());
}

/// Format a number value for the wire using the element's format string.
pub fn number_value(value: f64, format: &str) -> String {
    number::format_number(value, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::Blob;
    use crate::error::CodecError;
    use crate::message::{
        DefNumber, DefSwitch, DefText, EnableBlob, GetProperties, NewVector, Notice, SetVector,
    };
    use crate::types::{BlobEnable, Permission, State, SwitchRule, SwitchState};

    fn encoded(msg: &Message) -> String {
        String::from_utf8(to_bytes(msg).to_vec()).expect("utf-8 output")
    }

    #[test]
    fn get_properties_canonical_form() {
        let msg = Message::GetProperties(GetProperties::new(Some("CAMERA".into()), None));
        assert_eq!(
            encoded(&msg),
            "<?xml version=\"1.0\"?>\n<getProperties device=\"CAMERA\" version=\"1.7\"/>\n"
        );
    }

    #[test]
    fn enable_blob_value_is_text() {
        let msg = Message::EnableBlob(EnableBlob {
            device: "CAMERA".into(),
            name: None,
            value: BlobEnable::Also,
        });
        assert_eq!(
            encoded(&msg),
            "<?xml version=\"1.0\"?>\n<enableBLOB device=\"CAMERA\">Also</enableBLOB>\n"
        );
    }

    #[test]
    fn decodes_reference_messages() {
        let msg = decode_message(b"<getProperties device=\"CAMERA\" version=\"1.7\" />")
            .expect("valid");
        assert_eq!(
            msg,
            Message::GetProperties(GetProperties {
                version: "1.7".into(),
                device: Some("CAMERA".into()),
                name: None,
            })
        );

        let msg = decode_message(
            b"<defTextVector device=\"CAMERA\" name=\"EXPOSE\" perm=\"ro\" state=\"Busy\">\
              <defText name=\"EXPOSE_TIME\">2.0</defText></defTextVector>",
        )
        .expect("valid");
        let Message::Def(def) = msg else {
            panic!("expected definition");
        };
        assert_eq!(def.perm, Some(Permission::ReadOnly));
        assert_eq!(def.state, State::Busy);
        assert_eq!(
            def.elements,
            DefElements::Text(vec![DefText {
                name: "EXPOSE_TIME".into(),
                label: None,
                value: "2.0".into(),
            }])
        );
    }

    #[test]
    fn declaration_prefix_is_accepted() {
        let msg = decode_message(b"<?xml version=\"1.0\"?>\n<message device=\"A\" message=\"hi\"/>")
            .expect("valid");
        assert_eq!(
            msg,
            Message::Notice(Notice {
                device: Some("A".into()),
                timestamp: None,
                message: Some("hi".into()),
            })
        );
    }

    #[test]
    fn def_switch_vector_roundtrip() {
        let msg = Message::Def(DefVector {
            device: "Dev".into(),
            name: "CONNECTION".into(),
            label: Some("Connection".into()),
            group: Some("Main".into()),
            state: State::Idle,
            perm: Some(Permission::ReadWrite),
            rule: Some(SwitchRule::OneOfMany),
            timeout: Some(60.0),
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
        });
        let wire = encoded(&msg);
        assert!(wire.contains(
            "<defSwitchVector device=\"Dev\" group=\"Main\" label=\"Connection\" name=\"CONNECTION\" perm=\"rw\" rule=\"OneOfMany\" state=\"Idle\" timeout=\"60\">"
        ));
        assert_eq!(decode_message(wire.as_bytes()).expect("roundtrip"), msg);
    }

    #[test]
    fn def_number_attributes() {
        let msg = Message::Def(DefVector {
            device: "Scope".into(),
            name: "EQ".into(),
            label: None,
            group: None,
            state: State::Ok,
            perm: Some(Permission::ReadOnly),
            rule: None,
            timeout: None,
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
        });
        let wire = encoded(&msg);
        assert!(wire.contains(
            "<defNumber format=\"%10.6m\" max=\"24\" min=\"0\" name=\"RA\" step=\"0\">12:30:00</defNumber>"
        ));
        assert_eq!(decode_message(wire.as_bytes()).expect("roundtrip"), msg);
    }

    #[test]
    fn blob_roundtrip_preserves_payload() {
        let msg = Message::New(NewVector {
            device: "CCD".into(),
            name: "UPLOAD".into(),
            timestamp: None,
            elements: NewElements::Blob(vec![OneBlob {
                name: "FILE".into(),
                blob: Blob::new(".bin", vec![0u8, 1, 2, 255]),
            }]),
        });
        let wire = encoded(&msg);
        assert!(wire.contains("size=\"4\""));
        assert_eq!(decode_message(wire.as_bytes()).expect("roundtrip"), msg);
    }

    #[test]
    fn set_vector_uses_text_values() {
        let msg = Message::Set(SetVector {
            device: "CAMERA".into(),
            name: "EXPOSE".into(),
            state: State::Alert,
            timeout: None,
            timestamp: None,
            message: None,
            elements: OneElements::Text(vec![OneText {
                name: "EXPOSE_TIME".into(),
                value: "2.0".into(),
            }]),
        });
        assert_eq!(
            encoded(&msg),
            "<?xml version=\"1.0\"?>\n<setTextVector device=\"CAMERA\" name=\"EXPOSE\" state=\"Alert\"><oneText name=\"EXPOSE_TIME\">2.0</oneText></setTextVector>\n"
        );
    }

    #[test]
    fn unknown_root_tag() {
        let err = decode_message(b"<aaaa/>").unwrap_err();
        assert!(matches!(err, CodecError::UnknownTag(tag) if tag == "aaaa"));
    }

    #[test]
    fn unknown_child_tag() {
        let err = decode_message(
            b"<setTextVector device=\"A\" name=\"B\" state=\"Ok\"><oneBogus name=\"x\"/></setTextVector>",
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::UnknownChild { .. }));
    }

    #[test]
    fn child_kind_mismatch() {
        let err = decode_message(
            b"<setTextVector device=\"A\" name=\"B\" state=\"Ok\"><oneSwitch name=\"x\">On</oneSwitch></setTextVector>",
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::ChildTypeMismatch { .. }));
    }

    #[test]
    fn missing_perm_on_writable_definition() {
        let err = decode_message(
            b"<defTextVector device=\"A\" name=\"B\" state=\"Ok\"><defText name=\"x\"/></defTextVector>",
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::MissingField { field: "perm", .. }));
    }

    #[test]
    fn light_definition_needs_no_perm() {
        let msg = decode_message(
            b"<defLightVector device=\"A\" name=\"B\" state=\"Ok\"><defLight name=\"x\">Busy</defLight></defLightVector>",
        )
        .expect("valid");
        assert_eq!(msg.kind(), Some(PropertyKind::Light));
    }

    #[test]
    fn invalid_enum_values() {
        let err = decode_message(
            b"<setSwitchVector device=\"A\" name=\"B\" state=\"Ok\"><oneSwitch name=\"x\">Maybe</oneSwitch></setSwitchVector>",
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::InvalidField { field: "value", .. }));

        let err = decode_message(b"<enableBLOB device=\"A\">Sometimes</enableBLOB>").unwrap_err();
        assert!(matches!(err, CodecError::InvalidField { .. }));
    }

    #[test]
    fn invalid_number_text() {
        let err = decode_message(
            b"<setNumberVector device=\"A\" name=\"B\" state=\"Ok\"><oneNumber name=\"x\">fast</oneNumber></setNumberVector>",
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::InvalidField { field: "value", .. }));
    }

    #[test]
    fn sexagesimal_number_text_is_valid() {
        let msg = decode_message(
            b"<newNumberVector device=\"A\" name=\"B\"><oneNumber name=\"RA\">5:30:00</oneNumber></newNumberVector>",
        )
        .expect("valid");
        assert!(msg.from_client());
    }

    #[test]
    fn number_value_formats() {
        assert_eq!(number_value(1.5, "%.2f"), "1.50");
        assert_eq!(number_value(5.5, "%6.3m"), "  5:30");
    }

    #[test]
    fn padded_number_text_survives_roundtrip() {
        let msg = Message::Set(SetVector {
            device: "Mount".into(),
            name: "EQUATORIAL_EOD_COORD".into(),
            state: State::Ok,
            timeout: None,
            timestamp: None,
            message: None,
            elements: OneElements::Number(vec![OneNumber {
                name: "RA".into(),
                value: number_value(5.5, "%6.3m"),
            }]),
        });
        assert!(encoded(&msg).contains(">  5:30</oneNumber>"));
        assert_eq!(decode_message(&to_bytes(&msg)).expect("roundtrip"), msg);
    }

    #[test]
    fn text_whitespace_survives_roundtrip() {
        let msg = Message::Set(SetVector {
            device: "CCD".into(),
            name: "FITS_HEADER".into(),
            state: State::Idle,
            timeout: None,
            timestamp: None,
            message: None,
            elements: OneElements::Text(vec![OneText {
                name: "OBSERVER".into(),
                value: "  indented ".into(),
            }]),
        });
        assert_eq!(decode_message(&to_bytes(&msg)).expect("roundtrip"), msg);
    }

    #[test]
    fn blob_vector_with_wrong_size_is_rejected() {
        let err = decode_message(
            b"<setBLOBVector device=\"CCD\" name=\"CCD1\" state=\"Ok\"><oneBLOB name=\"CCD1\" size=\"4\" format=\".fits\">aGVsbG8=</oneBLOB></setBLOBVector>",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CodecError::BlobSizeMismatch { ref name, declared: 4, actual: 5 } if name == "CCD1"
        ));
    }
}
