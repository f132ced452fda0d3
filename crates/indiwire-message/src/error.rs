/// Errors that can occur while encoding, decoding or transporting messages.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The fragment is not well-formed XML.
    #[error("malformed XML: {0}")]
    Malformed(String),

    /// The root element is not a known message tag.
    #[error("unknown message tag <{0}>")]
    UnknownTag(String),

    /// A vector message contains a child element that is not a known part.
    #[error("unknown child <{child}> in <{parent}>")]
    UnknownChild { parent: String, child: String },

    /// An attribute or text value does not parse into its declared type.
    #[error("invalid {field} on <{tag}>: \"{value}\"")]
    InvalidField {
        tag: String,
        field: &'static str,
        value: String,
    },

    /// A required attribute is absent.
    #[error("missing required {field} on <{tag}>")]
    MissingField { tag: String, field: &'static str },

    /// A vector carries children of a different property kind.
    #[error("<{parent}> may not contain <{child}>")]
    ChildTypeMismatch { parent: String, child: String },

    /// A BLOB payload does not match its declared size.
    #[error("BLOB {name} declares {declared} bytes but carries {actual}")]
    BlobSizeMismatch {
        name: String,
        declared: usize,
        actual: usize,
    },

    /// A BLOB payload is not valid base64.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// An I/O error occurred while reading or writing messages.
    #[error("message I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before another message was received.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Coarse classification used when deciding how to react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bytes did not form a well-formed fragment.
    Decode,
    /// Well-formed fragment with an unrecognised tag.
    UnknownMessage,
    /// Recognised message that failed type or field checks.
    Validation,
    /// The peer went away or the transport failed.
    ConnectionClosed,
}

impl CodecError {
    /// Classify this error. Everything except [`ErrorClass::ConnectionClosed`]
    /// is recoverable: the offending message is dropped and the stream continues.
    pub fn class(&self) -> ErrorClass {
        match self {
            CodecError::Malformed(_) => ErrorClass::Decode,
            CodecError::UnknownTag(_) | CodecError::UnknownChild { .. } => {
                ErrorClass::UnknownMessage
            }
            CodecError::InvalidField { .. }
            | CodecError::MissingField { .. }
            | CodecError::ChildTypeMismatch { .. }
            | CodecError::BlobSizeMismatch { .. }
            | CodecError::Base64(_) => ErrorClass::Validation,
            CodecError::Io(_) | CodecError::ConnectionClosed => ErrorClass::ConnectionClosed,
        }
    }

    /// True when the stream can keep going after this error.
    pub fn is_recoverable(&self) -> bool {
        self.class() != ErrorClass::ConnectionClosed
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(
            CodecError::Malformed("eof".into()).class(),
            ErrorClass::Decode
        );
        assert_eq!(
            CodecError::UnknownTag("foo".into()).class(),
            ErrorClass::UnknownMessage
        );
        assert_eq!(
            CodecError::MissingField {
                tag: "defTextVector".into(),
                field: "perm"
            }
            .class(),
            ErrorClass::Validation
        );
        assert!(!CodecError::ConnectionClosed.is_recoverable());
        assert!(CodecError::UnknownTag("foo".into()).is_recoverable());
    }
}
