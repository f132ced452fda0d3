//! INDI client.
//!
//! A [`Client`] keeps a mirror of every device the server announces and
//! raises [`ClientEvent`]s as definitions, states and values change. Code
//! can subscribe with an [`EventFilter`], block on a [`Condition`] with
//! [`Client::wait_for_event`], or stage element values and send them as one
//! `new*Vector` with [`Client::submit`].
//!
//! The client itself is transport-free: it writes through a
//! [`MessageSink`](indiwire_message::MessageSink) and is fed with
//! [`Client::process_message`]. [`connect`] wires it to a TCP server.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod client;
pub mod connector;
pub mod error;
pub mod event;
pub mod mirror;

pub use client::{Client, PollingConfig, WaitOptions};
pub use connector::{connect, connect_with_config, ClientConfig, Connection, DEFAULT_PORT};
pub use error::{ClientError, Result};
pub use event::{ClientEvent, Condition, EventFilter, Expected};
pub use mirror::{Mirror, NumberAttrs, RemoteDevice, RemoteElement, RemoteVector};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
