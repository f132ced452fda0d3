use std::net::SocketAddr;

/// Errors that can occur while routing or serving connections.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Wire-level error.
    #[error("codec error: {0}")]
    Codec(#[from] indiwire_message::CodecError),

    /// Socket I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Driver model error.
    #[error(transparent)]
    Property(#[from] indiwire_property::PropertyError),
}

pub type Result<T> = std::result::Result<T, RouterError>;
