use std::time::Duration;

use indiwire_message::CodecError;
use indiwire_property::PropertyError;

/// Errors that can occur on the client side.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// `wait_for_event` did not see a matching event in time.
    #[error("no matching event within {0:?}")]
    Timeout(Duration),

    /// The connection to the server is gone.
    #[error("connection closed")]
    ConnectionClosed,

    /// Wire-level error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown device {0}")]
    UnknownDevice(String),

    #[error("unknown vector {vector} on device {device}")]
    UnknownVector { device: String, vector: String },

    #[error("unknown element {element} in vector {vector}")]
    UnknownElement { vector: String, element: String },

    /// A number element's wire text does not parse with its format.
    #[error("invalid number \"{value}\" for element {element}")]
    InvalidNumber { element: String, value: String },

    /// Clients cannot write read-only or light vectors.
    #[error("vector {0} is not writable")]
    ReadOnly(String),

    /// Value typing error shared with the property model.
    #[error(transparent)]
    Property(#[from] PropertyError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
