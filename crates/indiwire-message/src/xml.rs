//! Minimal XML tree used between the byte stream and typed messages.

use std::str::FromStr;

use bytes::{BufMut, BytesMut};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{CodecError, Result};
use crate::types::ParseEnumError;

/// One parsed element: name, attributes in document order, verbatim text and
/// child elements.
///
/// Text is kept exactly as sent; callers trim where they parse a token.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct XmlNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn opt_string(&self, key: &str) -> Option<String> {
        self.attr(key).map(str::to_string)
    }

    pub fn required(&self, key: &'static str) -> Result<&str> {
        self.attr(key).ok_or_else(|| CodecError::MissingField {
            tag: self.name.clone(),
            field: key,
        })
    }

    pub fn required_enum<T>(&self, key: &'static str) -> Result<T>
    where
        T: FromStr<Err = ParseEnumError>,
    {
        let raw = self.required(key)?;
        raw.parse().map_err(|_| self.invalid(key, raw))
    }

    pub fn optional_enum<T>(&self, key: &'static str) -> Result<Option<T>>
    where
        T: FromStr<Err = ParseEnumError>,
    {
        match self.attr(key) {
            Some(raw) => raw.parse().map(Some).map_err(|_| self.invalid(key, raw)),
            None => Ok(None),
        }
    }

    pub fn required_f64(&self, key: &'static str) -> Result<f64> {
        let raw = self.required(key)?;
        parse_f64(raw).ok_or_else(|| self.invalid(key, raw))
    }

    pub fn optional_f64(&self, key: &'static str) -> Result<Option<f64>> {
        match self.attr(key) {
            Some(raw) => parse_f64(raw)
                .map(Some)
                .ok_or_else(|| self.invalid(key, raw)),
            None => Ok(None),
        }
    }

    pub fn text_enum<T>(&self) -> Result<T>
    where
        T: FromStr<Err = ParseEnumError>,
    {
        self.text
            .trim()
            .parse()
            .map_err(|_| self.invalid("value", &self.text))
    }

    pub fn invalid(&self, field: &'static str, value: &str) -> CodecError {
        CodecError::InvalidField {
            tag: self.name.clone(),
            field,
            value: value.to_string(),
        }
    }
}

fn parse_f64(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse one complete XML fragment into a tree.
pub(crate) fn parse_fragment(src: &[u8]) -> Result<XmlNode> {
    let mut reader = Reader::from_reader(src);

    let mut buf = Vec::new();
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) => {
                if root.is_some() {
                    return Err(malformed("content after root element"));
                }
                stack.push(node_from(&start)?);
            }
            Ok(Event::Empty(start)) => {
                let node = node_from(&start)?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| malformed("unexpected end tag"))?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::Text(text)) => {
                let text = text
                    .unescape()
                    .map_err(|err| CodecError::Malformed(err.to_string()))?;
                match stack.last_mut() {
                    Some(top) => top.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err(malformed("text outside root element")),
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(CodecError::Malformed(err.to_string())),
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(malformed("unclosed element"));
    }
    root.ok_or_else(|| malformed("empty fragment"))
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }
    if root.is_some() {
        return Err(malformed("multiple root elements"));
    }
    *root = Some(node);
    Ok(())
}

fn node_from(start: &BytesStart<'_>) -> Result<XmlNode> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|_| malformed("non UTF-8 tag name"))?
        .to_string();

    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|err| CodecError::Malformed(err.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|_| malformed("non UTF-8 attribute name"))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| CodecError::Malformed(err.to_string()))?
            .into_owned();
        attrs.push((key, value));
    }

    Ok(XmlNode {
        name,
        attrs,
        text: String::new(),
        children: Vec::new(),
    })
}

fn malformed(reason: &str) -> CodecError {
    CodecError::Malformed(reason.to_string())
}

/// Streaming element writer.
///
/// Attributes must be pushed in the order they should appear; the codec
/// pushes them sorted by name so output is deterministic.
pub(crate) struct ElementWriter<'a> {
    dst: &'a mut BytesMut,
    name: &'static str,
}

impl<'a> ElementWriter<'a> {
    pub fn start(dst: &'a mut BytesMut, name: &'static str) -> Self {
        dst.put_u8(b'<');
        dst.put_slice(name.as_bytes());
        Self { dst, name }
    }

    pub fn attr(&mut self, key: &str, value: &str) -> &mut Self {
        self.dst.put_u8(b' ');
        self.dst.put_slice(key.as_bytes());
        self.dst.put_slice(b"=\"");
        self.dst.put_slice(escape(value).as_bytes());
        self.dst.put_u8(b'"');
        self
    }

    pub fn opt_attr(&mut self, key: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value {
            self.attr(key, value);
        }
        self
    }

    /// Close as `<tag .../>`.
    pub fn empty(self) {
        self.dst.put_slice(b"/>");
    }

    /// Close with a text body, or as an empty element when `text` is empty.
    pub fn text(self, text: &str) {
        if text.is_empty() {
            return self.empty();
        }
        self.dst.put_u8(b'>');
        self.dst.put_slice(escape(text).as_bytes());
        self.close_tag();
    }

    /// Write children through `body`, then close.
    pub fn children(self, body: impl FnOnce(&mut BytesMut)) {
        self.dst.put_u8(b'>');
        body(&mut *self.dst);
        self.close_tag();
    }

    fn close_tag(self) {
        self.dst.put_slice(b"</");
        self.dst.put_slice(self.name.as_bytes());
        self.dst.put_u8(b'>');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_fragment() {
        let node = parse_fragment(
            b"<setTextVector device=\"A &amp; B\" name=\"T\"><oneText name=\"X\">\n  hi &lt;there&gt;\n</oneText></setTextVector>",
        )
        .expect("well-formed");
        assert_eq!(node.name, "setTextVector");
        assert_eq!(node.attr("device"), Some("A & B"));
        assert_eq!(node.children.len(), 1);
        assert_eq!(node.children[0].text, "\n  hi <there>\n");
    }

    #[test]
    fn enum_text_tolerates_surrounding_whitespace() {
        let node = parse_fragment(b"<oneSwitch name=\"CONNECT\">\n  On\n</oneSwitch>")
            .expect("well-formed");
        let state: crate::types::SwitchState = node.text_enum().expect("switch state");
        assert_eq!(state, crate::types::SwitchState::On);
    }

    #[test]
    fn rejects_mismatched_end_tag() {
        let err = parse_fragment(b"<a><b></a>").unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn rejects_unclosed_root() {
        let err = parse_fragment(b"<a><b/>").unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn writer_escapes_and_closes() {
        let mut dst = BytesMut::new();
        let mut el = ElementWriter::start(&mut dst, "oneText");
        el.attr("name", "a\"b");
        el.text("x < y");
        assert_eq!(&dst[..], b"<oneText name=\"a&quot;b\">x &lt; y</oneText>");

        let mut dst = BytesMut::new();
        ElementWriter::start(&mut dst, "defBLOB").empty();
        assert_eq!(&dst[..], b"<defBLOB/>");
    }
}
