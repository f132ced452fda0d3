//! Outbound message sinks.
//!
//! Property trees and client mirrors do not own a transport. They hand
//! outgoing messages to a [`MessageSink`], which is whatever the host wires
//! up: a router dispatch, a connection mailbox or a test recorder.

use std::sync::{Arc, Mutex};

use crate::message::Message;

/// Shared, thread-safe outbound message callback.
pub type MessageSink = Arc<dyn Fn(Message) + Send + Sync>;

/// A sink that drops everything.
pub fn discard() -> MessageSink {
    Arc::new(|_msg| {})
}

/// A sink that forwards into an unbounded tokio channel. Sends after the
/// receiver is gone are dropped.
#[cfg(feature = "async")]
pub fn channel(tx: tokio::sync::mpsc::UnboundedSender<Message>) -> MessageSink {
    Arc::new(move |msg| {
        if tx.send(msg).is_err() {
            tracing::debug!("outbound channel closed, dropping message");
        }
    })
}

/// Records every message sent through it. Useful in tests and for dry runs.
#[derive(Clone, Default)]
pub struct Recorder {
    messages: Arc<Mutex<Vec<Message>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> MessageSink {
        let messages = Arc::clone(&self.messages);
        Arc::new(move |msg| {
            if let Ok(mut messages) = messages.lock() {
                messages.push(msg);
            }
        })
    }

    /// Drain everything recorded so far.
    pub fn take(&self) -> Vec<Message> {
        match self.messages.lock() {
            Ok(mut messages) => std::mem::take(&mut *messages),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
