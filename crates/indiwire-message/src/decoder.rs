//! Chunk-tolerant stream decoder.
//!
//! A connection delivers an unframed byte stream that may split messages at
//! any byte, glue several together, or carry noise between them. The decoder
//! accumulates bytes and yields every complete, valid message exactly once,
//! in order. Output depends only on the concatenated input, never on how it
//! was chunked.
//!
//! Extraction works in two steps:
//! 1. Resynchronise: drop everything before the earliest `<tag` that names a
//!    known message. Without one, keep only the suffix starting at the last
//!    `<` (a tag may still be arriving); without any `<`, drop everything.
//! 2. Scan the fragment starting at the front with a resumable tag scanner.
//!    A balanced fragment is handed to the codec; a fragment that turns out
//!    to be broken is discarded up to the point where it broke.

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use crate::codec::decode_message;
use crate::error::CodecError;
use crate::message::Message;
use crate::tags::{message_tag_at, MESSAGE_TAGS};

/// Default cap on bytes held while waiting for a message to complete: 16 MiB.
pub const DEFAULT_MAX_PENDING: usize = 16 * 1024 * 1024;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Configuration for the stream decoder.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Maximum number of buffered bytes a single pending message may occupy.
    /// When exceeded, the decoder drops one leading byte and resynchronises.
    /// Default: 16 MiB.
    pub max_pending: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

/// Incremental decoder for one inbound byte stream.
#[derive(Debug)]
pub struct StreamDecoder {
    buf: BytesMut,
    scanner: FragmentScanner,
    /// Front of `buf` is known to start a message tag.
    anchored: bool,
    /// Bytes before this offset hold no message tag start.
    searched: usize,
    rejected: u64,
    config: DecoderConfig,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::with_config(DecoderConfig::default())
    }

    pub fn with_config(config: DecoderConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            scanner: FragmentScanner::default(),
            anchored: false,
            searched: 0,
            rejected: 0,
            config,
        }
    }

    /// Append received bytes.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Extract the next complete message, or `None` when more bytes are needed.
    ///
    /// Malformed, unknown and invalid messages are logged and skipped.
    pub fn next_message(&mut self) -> Option<Message> {
        loop {
            self.resync();
            if self.buf.is_empty() {
                return None;
            }

            let limit = self.buf.len().min(self.config.max_pending);
            match self.scanner.scan(&self.buf[..limit]) {
                Scan::Complete(end) => {
                    let fragment = self.buf.split_to(end);
                    self.front_moved();
                    match decode_message(&fragment) {
                        Ok(msg) => return Some(msg),
                        Err(err) => self.reject(&err, &fragment),
                    }
                }
                Scan::Reject(skip) => {
                    debug!(skip, "discarding broken fragment prefix");
                    self.buf.advance(skip.clamp(1, self.buf.len()));
                    self.front_moved();
                }
                Scan::Pending => {
                    if self.buf.len() < self.config.max_pending {
                        return None;
                    }
                    warn!(
                        pending = self.buf.len(),
                        max = self.config.max_pending,
                        "pending message exceeds limit, resynchronising"
                    );
                    self.buf.advance(1);
                    self.front_moved();
                }
            }
        }
    }

    /// Feed a chunk and collect every message it completes.
    pub fn decode_chunk(&mut self, chunk: &[u8]) -> Vec<Message> {
        self.feed(chunk);
        std::iter::from_fn(|| self.next_message()).collect()
    }

    /// Bytes currently buffered.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Number of complete fragments dropped because they failed to decode.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    fn reject(&mut self, err: &CodecError, fragment: &[u8]) {
        self.rejected += 1;
        let preview = String::from_utf8_lossy(&fragment[..fragment.len().min(80)]);
        warn!(class = ?err.class(), error = %err, fragment = %preview, "dropping message");
    }

    fn front_moved(&mut self) {
        self.scanner.reset();
        self.anchored = false;
        self.searched = 0;
    }

    fn resync(&mut self) {
        if self.anchored || self.buf.is_empty() {
            return;
        }

        if let Some(start) = find_message_start(&self.buf, self.searched) {
            if start > 0 {
                debug!(skipped = start, "skipping bytes before message");
                self.buf.advance(start);
                self.front_moved();
            }
            self.anchored = true;
            return;
        }

        // A tag straddling the end of the buffer may still complete.
        self.searched = self.buf.len().saturating_sub(MAX_TAG_LEN + 1);

        match self.buf.iter().rposition(|&b| b == b'<') {
            Some(0) => {}
            Some(last) => {
                self.buf.advance(last);
                self.front_moved();
            }
            None => {
                self.buf.clear();
                self.front_moved();
            }
        }
    }
}

const MAX_TAG_LEN: usize = 16;

fn find_message_start(buf: &[u8], from: usize) -> Option<usize> {
    let mut pos = from.min(buf.len());
    while let Some(rel) = buf[pos..].iter().position(|&b| b == b'<') {
        let at = pos + rel;
        if message_tag_at(&buf[at + 1..]).is_some() {
            return Some(at);
        }
        pos = at + 1;
    }
    None
}

/// Result of scanning the fragment at the front of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scan {
    /// The root element closes at this offset (exclusive).
    Complete(usize),
    /// More bytes are needed.
    Pending,
    /// The fragment is broken; discard this many leading bytes.
    Reject(usize),
}

/// Resumable scanner tracking open elements of the front fragment.
///
/// Every decision depends only on bytes already seen, so scanning a prefix
/// and resuming later reaches the same verdict as scanning everything at once.
#[derive(Debug, Default)]
pub(crate) struct FragmentScanner {
    pos: usize,
    stack: Vec<Vec<u8>>,
}

impl FragmentScanner {
    pub fn reset(&mut self) {
        self.pos = 0;
        self.stack.clear();
    }

    pub fn scan(&mut self, buf: &[u8]) -> Scan {
        loop {
            let Some(rel) = buf[self.pos..].iter().position(|&b| b == b'<') else {
                self.pos = buf.len();
                return Scan::Pending;
            };
            let start = self.pos + rel;
            if self.stack.is_empty() && start > 0 {
                return Scan::Reject(start);
            }

            let rest = &buf[start..];
            if rest.len() < 2 {
                self.pos = start;
                return Scan::Pending;
            }

            match rest[1] {
                b'/' => {
                    let Some(gt) = rest.iter().position(|&b| b == b'>') else {
                        self.pos = start;
                        return Scan::Pending;
                    };
                    let name = rest[2..gt].trim_ascii();
                    match self.stack.pop() {
                        Some(open) if open == name => {}
                        _ => return Scan::Reject(1),
                    }
                    let end = start + gt + 1;
                    if self.stack.is_empty() {
                        return Scan::Complete(end);
                    }
                    self.pos = end;
                }
                b'?' | b'!' => {
                    let terminator: &[u8] = if rest.starts_with(b"<!--") {
                        b"-->"
                    } else if rest.starts_with(b"<![CDATA[") {
                        b"]]>"
                    } else if rest[1] == b'?' {
                        b"?>"
                    } else if b"<![CDATA[".starts_with(&rest[..rest.len().min(9)])
                        || b"<!--".starts_with(&rest[..rest.len().min(4)])
                    {
                        // Not enough bytes yet to tell which construct this is.
                        self.pos = start;
                        return Scan::Pending;
                    } else {
                        b">"
                    };
                    let Some(close) = find(&rest[2..], terminator) else {
                        self.pos = start;
                        return Scan::Pending;
                    };
                    let end = start + 2 + close + terminator.len();
                    if self.stack.is_empty() {
                        return Scan::Reject(end);
                    }
                    self.pos = end;
                }
                _ => {
                    let gt = match tag_end(rest) {
                        TagEnd::Found(gt) => gt,
                        TagEnd::Pending => {
                            self.pos = start;
                            return Scan::Pending;
                        }
                        TagEnd::Broken => return Scan::Reject(1),
                    };
                    let inner = &rest[1..gt];
                    let self_closing = inner.last() == Some(&b'/');
                    let name_len = inner
                        .iter()
                        .position(|b| b.is_ascii_whitespace() || *b == b'/')
                        .unwrap_or(inner.len());
                    let name = &inner[..name_len];
                    if name.is_empty() {
                        return Scan::Reject(1);
                    }
                    if !self.stack.is_empty() && is_message_name(name) {
                        // A new message starts inside an unterminated one.
                        return Scan::Reject(start);
                    }

                    let end = start + gt + 1;
                    if self_closing {
                        if self.stack.is_empty() {
                            return Scan::Complete(end);
                        }
                    } else {
                        self.stack.push(name.to_vec());
                    }
                    self.pos = end;
                }
            }
        }
    }
}

enum TagEnd {
    Found(usize),
    Pending,
    Broken,
}

/// Locate the `>` closing the start tag at `rest[0]`, honouring quoted
/// attribute values. A `<` before the close means the tag is broken.
fn tag_end(rest: &[u8]) -> TagEnd {
    let mut quote: Option<u8> = None;
    for (i, &b) in rest.iter().enumerate().skip(1) {
        match (quote, b) {
            (_, b'<') => return TagEnd::Broken,
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(b),
            (None, b'>') => return TagEnd::Found(i),
            (None, _) => {}
        }
    }
    TagEnd::Pending
}

fn is_message_name(name: &[u8]) -> bool {
    MESSAGE_TAGS.iter().any(|tag| tag.as_bytes() == name)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
