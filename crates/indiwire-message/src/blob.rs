use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;

use crate::error::{CodecError, Result};

/// Binary payload of a BLOB element.
///
/// `format` is the producer's file-type hint (".fits", ".jpg", ...). The
/// declared size on the wire is always the length of the decoded payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Blob {
    pub format: String,
    pub data: Bytes,
}

impl Blob {
    pub fn new(format: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            format: format.into(),
            data: data.into(),
        }
    }

    /// Decoded payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Base64 text carried on the wire.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    /// Decode wire text, ignoring the line breaks some producers insert, and
    /// check the payload against the declared size.
    pub fn from_base64(name: &str, format: &str, declared: usize, text: &str) -> Result<Self> {
        let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let data = STANDARD.decode(compact)?;
        if data.len() != declared {
            return Err(CodecError::BlobSizeMismatch {
                name: name.to_string(),
                declared,
                actual: data.len(),
            });
        }
        Ok(Self {
            format: format.to_string(),
            data: Bytes::from(data),
        })
    }
}
