use std::io::{ErrorKind, Read};

use crate::decoder::{DecoderConfig, StreamDecoder};
use crate::error::{CodecError, Result};
use crate::message::Message;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete messages from any `Read` stream.
///
/// Partial reads, glued messages and inter-message noise are handled
/// internally. Callers always get whole, valid messages.
pub struct MessageReader<T> {
    inner: T,
    decoder: StreamDecoder,
}

impl<T: Read> MessageReader<T> {
    /// Create a new message reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, DecoderConfig::default())
    }

    /// Create a new message reader with explicit configuration.
    pub fn with_config(inner: T, config: DecoderConfig) -> Self {
        Self {
            inner,
            decoder: StreamDecoder::with_config(config),
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(CodecError::ConnectionClosed)` when EOF is reached.
    pub fn read_message(&mut self) -> Result<Message> {
        loop {
            if let Some(msg) = self.decoder.next_message() {
                return Ok(msg);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(CodecError::Io(err)),
            };

            if read == 0 {
                return Err(CodecError::ConnectionClosed);
            }

            self.decoder.feed(&chunk[..read]);
        }
    }

    /// Number of fragments dropped so far because they failed to decode.
    pub fn rejected(&self) -> u64 {
        self.decoder.rejected()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current decoder configuration.
    pub fn config(&self) -> &DecoderConfig {
        self.decoder.config()
    }
}

impl<T: Read> Iterator for MessageReader<T> {
    type Item = Result<Message>;

    /// Yields messages until EOF. I/O errors are yielded once; EOF ends
    /// iteration.
    fn next(&mut self) -> Option<Self::Item> {
        match self.read_message() {
            Ok(msg) => Some(Ok(msg)),
            Err(CodecError::ConnectionClosed) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
