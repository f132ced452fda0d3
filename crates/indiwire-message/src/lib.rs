//! INDI wire messages: typed model, XML codec and stream decoding.
//!
//! Messages are XML fragments sent back to back over a byte stream with no
//! framing. This crate turns that stream into typed [`Message`] values and
//! back:
//! - [`codec`] encodes one message and decodes one complete fragment
//! - [`StreamDecoder`] extracts complete messages from arbitrarily chunked,
//!   possibly noisy input
//! - [`MessageReader`] / [`MessageWriter`] wrap blocking `Read` / `Write`
//! - `IndiCodec` (feature `async`) plugs the same logic into `tokio_util`
//!
//! Number formats, including sexagesimal `%<w>.<f>m`, live in [`number`].

pub mod blob;
pub mod codec;
pub mod decoder;
pub mod error;
#[cfg(feature = "async")]
pub mod framed;
pub mod message;
pub mod number;
pub mod reader;
pub mod registry;
pub mod sink;
pub mod tags;
pub mod types;
pub mod writer;

mod xml;

pub use blob::Blob;
pub use codec::{decode_message, encode_message, to_bytes, XML_DECLARATION};
pub use decoder::{DecoderConfig, StreamDecoder, DEFAULT_MAX_PENDING};
pub use error::{CodecError, ErrorClass, Result};
#[cfg(feature = "async")]
pub use framed::IndiCodec;
pub use message::{
    now, DefBlob, DefElements, DefLight, DefNumber, DefSwitch, DefText, DefVector, DelProperty,
    Direction, EnableBlob, GetProperties, Message, NewElements, NewVector, Notice, OneBlob,
    OneElements, OneLight, OneNumber, OneSwitch, OneText, Ping, SetVector,
};
pub use reader::MessageReader;
pub use registry::{registry, TagRegistry};
pub use sink::MessageSink;
pub use types::{
    BlobEnable, ParseEnumError, Permission, PropertyKind, State, SwitchRule, SwitchState,
    PROTOCOL_VERSION,
};
pub use writer::MessageWriter;
